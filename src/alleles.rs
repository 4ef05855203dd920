//! Allele disambiguation at shared positions.
//!
//! Sparse arrays require a unique coordinate for every cell, but a genomic position can carry any number of
//! alternate alleles.
//! [`AllelePositionTable`] assigns a third coordinate to every distinct allele key seen at a
//! (chromosome, position) pair: the first key gets 0, the next distinct key 1, and so on.
//! A repeated key reuses its original index.
//!
//! The table lives for one ingestion run and is never shared between runs or threads.
//! The indexes are deterministic only for a fixed input order.
//! Memory grows with the number of distinct (position, allele) pairs seen so far.

use std::collections::HashMap;

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// Run-scoped mapping from position to (allele key -> assigned index).
#[derive(Clone, Debug, Default)]
pub struct AllelePositionTable {
    positions: HashMap<(u8, u32), HashMap<String, u32>>,
    keys: usize,
}

impl AllelePositionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical allele key for a reference / alternate pair.
    pub fn allele_key(reference: &str, alternate: &str) -> String {
        format!("{}>{}", reference, alternate)
    }

    /// Returns the index for the key at the given position, assigning the next free index on first encounter.
    pub fn assign(&mut self, chrom: u8, pos: u32, key: &str) -> u32 {
        let alleles = self.positions.entry((chrom, pos)).or_default();
        if let Some(index) = alleles.get(key) {
            return *index;
        }
        let index = alleles.len() as u32;
        alleles.insert(key.to_string(), index);
        self.keys += 1;
        index
    }

    /// Returns the index previously assigned to the key, or [`None`] if the key has not been seen.
    pub fn get(&self, chrom: u8, pos: u32, key: &str) -> Option<u32> {
        self.positions.get(&(chrom, pos)).and_then(|alleles| alleles.get(key).copied())
    }

    /// Forgets every position on the chromosome.
    ///
    /// Only safe when the input is sorted by chromosome and the chromosome cannot reappear.
    /// Returns the number of forgotten allele keys.
    pub fn release_chromosome(&mut self, chrom: u8) -> usize {
        let mut released = 0;
        self.positions.retain(|(c, _), alleles| {
            if *c == chrom {
                released += alleles.len();
                false
            } else {
                true
            }
        });
        self.keys -= released;
        released
    }

    /// Returns the number of distinct positions in the table.
    pub fn positions(&self) -> usize {
        self.positions.len()
    }

    /// Returns the number of distinct (position, allele key) pairs in the table.
    pub fn len(&self) -> usize {
        self.keys
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.keys == 0
    }
}

//-----------------------------------------------------------------------------
