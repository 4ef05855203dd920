//! Utility functions and structures.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::{Error, Result};

//-----------------------------------------------------------------------------

/// Returns the full file name for a specific test file.
pub fn get_test_data(filename: &'static str) -> PathBuf {
    let mut buf = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    buf.push("test-data");
    buf.push(filename);
    buf
}

//-----------------------------------------------------------------------------

// Utilities for working with files.

const SIZE_UNITS: [(f64, &str); 6] = [
    (1.0, "B"),
    (1024.0, "KiB"),
    (1024.0 * 1024.0, "MiB"),
    (1024.0 * 1024.0 * 1024.0, "GiB"),
    (1024.0 * 1024.0 * 1024.0 * 1024.0, "TiB"),
    (1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0, "PiB"),
];

/// Returns a human-readable representation of the given number of bytes.
pub fn human_readable_size(bytes: u64) -> String {
    let mut unit = 0;
    let value = bytes as f64;
    while unit + 1 < SIZE_UNITS.len() && value >= SIZE_UNITS[unit + 1].0 {
        unit += 1;
    }
    format!("{:.1} {}", value / SIZE_UNITS[unit].0, SIZE_UNITS[unit].1)
}

/// Returns a human-readable size of the file.
pub fn file_size<P: AsRef<Path>>(filename: P) -> Option<String> {
    let metadata = fs::metadata(filename).ok()?;
    Some(human_readable_size(metadata.len()))
}

/// Returns the total size of all files under the directory in bytes.
///
/// Unreadable entries are ignored.
pub fn directory_size<P: AsRef<Path>>(path: P) -> u64 {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    let mut total = 0;
    for entry in entries.flatten() {
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        if metadata.is_dir() {
            total += directory_size(entry.path());
        } else {
            total += metadata.len();
        }
    }
    total
}

/// Returns `true` if the file exists.
pub fn file_exists<P: AsRef<Path>>(filename: P) -> bool {
    fs::metadata(filename).is_ok()
}

/// Returns `true` if the file appears to be gzip-compressed.
pub fn is_gzipped<P: AsRef<Path>>(filename: P) -> bool {
    let file = match File::open(filename) {
        Ok(file) => file,
        Err(_) => return false,
    };
    let mut reader = BufReader::new(file);
    let mut magic = [0; 2];
    let len = reader.read(&mut magic).ok();
    len == Some(2) && magic == [0x1F, 0x8B]
}

/// Returns a buffered reader for the file, which may be gzip- or bgzip-compressed.
///
/// Returns [`Error::InputNotFound`] if the file does not exist.
pub fn open_file<P: AsRef<Path>>(filename: P) -> Result<Box<dyn BufRead>> {
    let filename = filename.as_ref();
    if !file_exists(filename) {
        return Err(Error::InputNotFound(filename.to_path_buf()));
    }
    let file = File::open(filename)?;
    let inner = BufReader::new(file);
    if is_gzipped(filename) {
        let inner = MultiGzDecoder::new(inner);
        Ok(Box::new(BufReader::new(inner)))
    } else {
        Ok(Box::new(inner))
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_readable_sizes() {
        assert_eq!(human_readable_size(0), "0.0 B");
        assert_eq!(human_readable_size(1023), "1023.0 B");
        assert_eq!(human_readable_size(1536), "1.5 KiB");
        assert_eq!(human_readable_size(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn plain_and_compressed_inputs() {
        for name in ["clinvar.vcf", "clinvar.vcf.gz"] {
            let filename = get_test_data(name);
            let reader = open_file(&filename);
            assert!(reader.is_ok(), "Failed to open {}: {}", name, reader.err().unwrap());
            let lines: Vec<String> = reader.unwrap().lines().map(|x| x.unwrap()).collect();
            assert!(lines[0].starts_with("##fileformat=VCF"), "Wrong first line in {}", name);
        }
        assert!(!is_gzipped(get_test_data("clinvar.vcf")));
        assert!(is_gzipped(get_test_data("clinvar.vcf.gz")));
    }

    #[test]
    fn missing_input() {
        let result = open_file(get_test_data("no-such-file.vcf"));
        assert!(matches!(result, Err(Error::InputNotFound(_))));
    }
}

//-----------------------------------------------------------------------------
