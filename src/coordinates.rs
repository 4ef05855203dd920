//! Mapping between chromosome labels and the bounded integer coordinate space.
//!
//! Every stored cell is addressed by a [`GenomicCoordinate`]: a chromosome number, a 1-based position, and a third
//! index that disambiguates cells sharing a position (an allele index, a feature identifier, ...).
//!
//! Chromosomes `1`..`22` map to themselves, `X` to 23, `Y` to 24, and `MT` / `M` to 25.
//! An optional `chr` prefix is ignored.
//! The mapping is pure and total over the accepted labels; [`int_to_chrom`] is its inverse for display.
//!
//! Unrecognized labels are handled according to a [`ChromPolicy`].
//! Clinical and population data reject them, while gene annotations map them to [`UNPLACED_CHROM`].
//! The sentinel is outside the array domain, so such records are counted but never reach the store.

use std::fmt;

use serde::Serialize;

use crate::{Error, Result};

//-----------------------------------------------------------------------------

/// Smallest chromosome number.
pub const MIN_CHROM: u8 = 1;

/// Largest chromosome number (`MT`).
pub const MAX_CHROM: u8 = 25;

/// Smallest position.
pub const MIN_POS: u32 = 1;

/// Largest position.
pub const MAX_POS: u32 = 300_000_000;

/// Chromosome number used for unrecognized contigs under [`ChromPolicy::Sentinel`].
pub const UNPLACED_CHROM: u8 = 0;

/// Unique key of a stored cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GenomicCoordinate {
    /// Chromosome number.
    pub chrom: u8,
    /// 1-based position.
    pub pos: u32,
    /// Allele index, feature identifier, or another array-specific disambiguator.
    pub index: u32,
}

impl GenomicCoordinate {
    /// Creates a new coordinate.
    pub fn new(chrom: u8, pos: u32, index: u32) -> Self {
        GenomicCoordinate { chrom, pos, index }
    }
}

impl fmt::Display for GenomicCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}[{}]", int_to_chrom(self.chrom), self.pos, self.index)
    }
}

//-----------------------------------------------------------------------------

/// What to do with chromosome labels outside the supported set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChromPolicy {
    /// Fail with [`Error::UnsupportedChromosome`].
    Reject,
    /// Map to [`UNPLACED_CHROM`].
    Sentinel,
}

/// Converts a chromosome label to an integer in `MIN_CHROM..=MAX_CHROM`.
///
/// Returns [`None`] if the label is not supported.
pub fn chrom_to_int(label: &str) -> Option<u8> {
    let name = label.strip_prefix("chr").unwrap_or(label);
    match name {
        "X" => Some(23),
        "Y" => Some(24),
        "MT" | "M" => Some(25),
        _ => {
            // Reject signs, leading zeros, and other forms `parse` would accept.
            if name.is_empty() || name.starts_with('0') || !name.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let value: u8 = name.parse().ok()?;
            if (1..=22).contains(&value) { Some(value) } else { None }
        }
    }
}

/// Converts a chromosome label to an integer using the given policy.
pub fn chrom_to_int_with(label: &str, policy: ChromPolicy) -> Result<u8> {
    match (chrom_to_int(label), policy) {
        (Some(value), _) => Ok(value),
        (None, ChromPolicy::Sentinel) => Ok(UNPLACED_CHROM),
        (None, ChromPolicy::Reject) => Err(Error::UnsupportedChromosome(label.to_string())),
    }
}

/// Converts a chromosome number to its canonical `chr`-prefixed label.
///
/// Numbers outside the domain are rendered as plain numbers.
pub fn int_to_chrom(value: u8) -> String {
    match value {
        1..=22 => format!("chr{}", value),
        23 => String::from("chrX"),
        24 => String::from("chrY"),
        25 => String::from("chrMT"),
        _ => value.to_string(),
    }
}

/// Returns `true` if the chromosome and the position are within the fixed domains.
pub fn in_domain(chrom: u8, pos: u32) -> bool {
    (MIN_CHROM..=MAX_CHROM).contains(&chrom) && (MIN_POS..=MAX_POS).contains(&pos)
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn all_labels() -> Vec<String> {
        let mut result: Vec<String> = (1..=22).map(|x| x.to_string()).collect();
        for name in ["X", "Y", "MT", "M"] {
            result.push(name.to_string());
        }
        result
    }

    #[test]
    fn round_trip_to_canonical_label() {
        for label in all_labels() {
            let canonical = if label == "M" { String::from("chrMT") } else { format!("chr{}", label) };
            for form in [label.clone(), format!("chr{}", label)] {
                let value = chrom_to_int(&form);
                assert!(value.is_some(), "Label {} was not recognized", form);
                assert_eq!(int_to_chrom(value.unwrap()), canonical, "Wrong canonical label for {}", form);
            }
        }
    }

    #[test]
    fn specific_values() {
        assert_eq!(chrom_to_int("chr1"), Some(1));
        assert_eq!(chrom_to_int("22"), Some(22));
        assert_eq!(chrom_to_int("chrX"), Some(23));
        assert_eq!(chrom_to_int("Y"), Some(24));
        assert_eq!(chrom_to_int("chrM"), Some(25));
        assert_eq!(chrom_to_int("MT"), Some(25));
    }

    #[test]
    fn unsupported_labels() {
        for label in ["", "chr", "0", "23", "chr23", "01", "+1", "-1", "chrUn_gl000220", "NT_187361.1", "GL000194.1", "x"] {
            assert_eq!(chrom_to_int(label), None, "Label {:?} should not be recognized", label);
        }
    }

    #[test]
    fn policies() {
        assert!(matches!(chrom_to_int_with("KI270728.1", ChromPolicy::Reject), Err(Error::UnsupportedChromosome(_))));
        assert_eq!(chrom_to_int_with("KI270728.1", ChromPolicy::Sentinel).unwrap(), UNPLACED_CHROM);
        assert_eq!(chrom_to_int_with("chr7", ChromPolicy::Reject).unwrap(), 7);
        assert_eq!(chrom_to_int_with("chr7", ChromPolicy::Sentinel).unwrap(), 7);
        assert!(!in_domain(UNPLACED_CHROM, 100));
    }

    #[test]
    fn domain_bounds() {
        assert!(in_domain(1, 1));
        assert!(in_domain(25, MAX_POS));
        assert!(!in_domain(26, 1));
        assert!(!in_domain(1, 0));
        assert!(!in_domain(1, MAX_POS + 1));
    }

    #[test]
    fn display_coordinate() {
        let coord = GenomicCoordinate::new(17, 43044295, 1);
        assert_eq!(coord.to_string(), "chr17:43044295[1]");
    }
}

//-----------------------------------------------------------------------------
