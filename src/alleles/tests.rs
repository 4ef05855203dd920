use super::*;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

//-----------------------------------------------------------------------------

const BASES: [&str; 4] = ["A", "C", "G", "T"];

fn random_allele(rng: &mut StdRng) -> String {
    let len = rng.gen_range(1..4);
    (0..len).map(|_| BASES[rng.gen_range(0..BASES.len())]).collect()
}

//-----------------------------------------------------------------------------

#[test]
fn first_seen_order() {
    let mut table = AllelePositionTable::new();
    assert_eq!(table.assign(17, 43044295, "A>G"), 0);
    assert_eq!(table.assign(17, 43044295, "A>T"), 1);
    assert_eq!(table.assign(17, 43044295, "A>G"), 0, "Repeated key got a new index");
    assert_eq!(table.assign(17, 43044295, "AC>A"), 2);
    assert_eq!(table.len(), 3);
    assert_eq!(table.positions(), 1);
}

#[test]
fn counters_are_per_position() {
    let mut table = AllelePositionTable::new();
    assert_eq!(table.assign(1, 100, "A>G"), 0);
    assert_eq!(table.assign(1, 101, "A>G"), 0);
    assert_eq!(table.assign(2, 100, "A>G"), 0);
    assert_eq!(table.assign(1, 100, "A>C"), 1);
    assert_eq!(table.positions(), 3);
    assert_eq!(table.get(1, 100, "A>C"), Some(1));
    assert_eq!(table.get(1, 100, "A>T"), None);
}

#[test]
fn random_sequences_get_dense_indexes() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..50 {
        let mut table = AllelePositionTable::new();
        let mut first_seen: Vec<String> = Vec::new();
        for _ in 0..rng.gen_range(1..40) {
            let key = AllelePositionTable::allele_key(&random_allele(&mut rng), &random_allele(&mut rng));
            let index = table.assign(3, 5000, &key) as usize;
            match first_seen.iter().position(|x| *x == key) {
                Some(expected) => assert_eq!(index, expected, "Wrong index for repeated key {}", key),
                None => {
                    assert_eq!(index, first_seen.len(), "Index for new key {} is not the next free one", key);
                    first_seen.push(key);
                }
            }
        }
        assert_eq!(table.len(), first_seen.len());
    }
}

#[test]
fn release_chromosome() {
    let mut table = AllelePositionTable::new();
    table.assign(1, 10, "A>G");
    table.assign(1, 10, "A>T");
    table.assign(1, 20, "C>G");
    table.assign(2, 10, "A>G");
    assert_eq!(table.release_chromosome(1), 3);
    assert_eq!(table.len(), 1);
    assert_eq!(table.positions(), 1);
    assert_eq!(table.get(2, 10, "A>G"), Some(0));
    assert_eq!(table.release_chromosome(1), 0);
    assert_eq!(table.assign(1, 10, "A>T"), 0, "Released position should start from zero");
}

//-----------------------------------------------------------------------------
