//! Line-level parsing of the supported text formats.
//!
//! ### VCF
//!
//! [`VcfRecord::parse`] turns a data line of a VCF file into a record with the eight fixed columns and optional
//! sample columns.
//! Meta-information lines (`##`) and the header line (`#CHROM`) are recognized but not parsed into records;
//! [`sample_names`] extracts the sample names from the header line.
//! See the [VCF 4.3 format](https://samtools.github.io/hts-specs/VCFv4.3.pdf) for details.
//!
//! ### GTF
//!
//! [`GtfRecord::parse`] turns a line of a GTF / GENCODE annotation file into a record.
//! Attributes are `key "value";` pairs; later duplicates of a key are ignored by [`GtfRecord::attribute`].
//!
//! Both parsers work on single lines and report problems as [`Error::MalformedRecord`] with the given line number.

use crate::{Error, Result};

use std::str::FromStr;

use serde_json::{Map, Value as JsonValue};


//-----------------------------------------------------------------------------

/// Returns `true` if the line is a VCF or GTF header, comment, or empty line.
pub fn is_header_line(line: &str) -> bool {
    line.starts_with('#') || line.trim().is_empty()
}

/// Returns the sample names from a VCF `#CHROM` header line.
///
/// Returns an empty vector for other lines.
pub fn sample_names(line: &str) -> Vec<String> {
    if !line.starts_with("#CHROM") {
        return Vec::new();
    }
    line.trim_end().split('\t').skip(9).map(|x| x.to_string()).collect()
}

//-----------------------------------------------------------------------------

/// A data line of a VCF file.
#[derive(Clone, Debug, PartialEq)]
pub struct VcfRecord {
    /// Contig name as written in the file.
    pub chrom: String,
    /// 1-based position.
    pub pos: u32,
    /// Identifier, `.` if missing.
    pub id: String,
    /// Reference allele.
    pub reference: String,
    /// Alternate alleles.
    pub alternates: Vec<String>,
    /// Quality, [`None`] if missing.
    pub qual: Option<f64>,
    /// Filters; empty if missing.
    pub filter: Vec<String>,
    /// INFO entries in file order; flags have no value.
    pub info: Vec<(String, Option<String>)>,
    /// FORMAT keys.
    pub format: Vec<String>,
    /// Sample columns, each split at `:`.
    pub samples: Vec<Vec<String>>,
}

impl VcfRecord {
    /// Parses a VCF line.
    ///
    /// Returns [`None`] for header and empty lines.
    ///
    /// # Arguments
    ///
    /// * `line`: The line without the trailing newline.
    /// * `line_num`: 1-based line number for error messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRecord`] if the line has fewer than eight columns or the position or quality is not a
    /// number.
    pub fn parse(line: &str, line_num: usize) -> Result<Option<Self>> {
        if is_header_line(line) {
            return Ok(None);
        }
        let fields: Vec<&str> = line.trim_end_matches(|c: char| c == '\r' || c == '\n').split('\t').collect();
        if fields.len() < 8 {
            return Err(Error::malformed(line_num, format!("Expected at least 8 columns, found {}", fields.len())));
        }

        let pos: u32 = fields[1].parse().map_err(|_| {
            Error::malformed(line_num, format!("Invalid position: {}", fields[1]))
        })?;
        let alternates = if fields[4] == "." {
            Vec::new()
        } else {
            fields[4].split(',').map(|x| x.to_string()).collect()
        };
        let qual = match fields[5] {
            "." => None,
            value => Some(value.parse::<f64>().map_err(|_| {
                Error::malformed(line_num, format!("Invalid quality: {}", value))
            })?),
        };
        let filter = match fields[6] {
            "." => Vec::new(),
            value => value.split(';').map(|x| x.to_string()).collect(),
        };
        let info = parse_info(fields[7]);

        let format: Vec<String> = match fields.get(8) {
            Some(value) if *value != "." => value.split(':').map(|x| x.to_string()).collect(),
            _ => Vec::new(),
        };
        let samples: Vec<Vec<String>> = fields.iter().skip(9).map(|sample| {
            sample.split(':').map(|x| x.to_string()).collect()
        }).collect();

        Ok(Some(VcfRecord {
            chrom: fields[0].to_string(),
            pos,
            id: fields[2].to_string(),
            reference: fields[3].to_string(),
            alternates,
            qual,
            filter,
            info,
            format,
            samples,
        }))
    }

    /// Returns the value of the INFO key, or [`None`] if the key is missing or a flag.
    pub fn info(&self, key: &str) -> Option<&str> {
        self.info.iter().find(|(k, _)| k == key).and_then(|(_, v)| v.as_deref())
    }

    /// Returns `true` if the INFO key is present, with or without a value.
    pub fn has_info(&self, key: &str) -> bool {
        self.info.iter().any(|(k, _)| k == key)
    }

    /// Returns the INFO field as a JSON object; flags become `true`.
    pub fn info_json(&self) -> JsonValue {
        let mut map = Map::new();
        for (key, value) in self.info.iter() {
            let value = match value {
                Some(value) => JsonValue::String(value.clone()),
                None => JsonValue::Bool(true),
            };
            map.insert(key.clone(), value);
        }
        JsonValue::Object(map)
    }

    /// Returns the sample columns as a JSON object mapping sample name to {FORMAT key: value}.
    ///
    /// Samples without a name are ignored, and missing trailing values are omitted.
    pub fn samples_json(&self, names: &[String]) -> JsonValue {
        let mut result = Map::new();
        for (name, values) in names.iter().zip(self.samples.iter()) {
            let fields: Map<String, JsonValue> = self.format.iter().zip(values.iter())
                .map(|(key, value)| (key.clone(), JsonValue::String(value.clone())))
                .collect();
            result.insert(name.clone(), JsonValue::Object(fields));
        }
        JsonValue::Object(result)
    }

    /// Returns `true` if the record passed all filters.
    pub fn is_pass(&self) -> bool {
        self.filter.is_empty() || self.filter.iter().all(|x| x == "PASS")
    }
}

fn parse_info(field: &str) -> Vec<(String, Option<String>)> {
    if field == "." {
        return Vec::new();
    }
    field.split(';').filter(|x| !x.is_empty()).map(|item| {
        match item.split_once('=') {
            Some((key, value)) => (key.to_string(), Some(value.to_string())),
            None => (item.to_string(), None),
        }
    }).collect()
}

/// Returns per-allele values for an INFO field.
///
/// A value containing a comma is split into one entry per allele.
/// A value without a comma applies to every allele.
/// A missing value is replaced with `default`.
///
/// # Errors
///
/// Returns [`Error::MalformedRecord`] if an entry cannot be parsed.
pub fn per_allele_values<T: FromStr + Clone>(
    value: Option<&str>,
    alleles: usize,
    default: T,
    line_num: usize,
) -> Result<Vec<T>> {
    let parse = |x: &str| -> Result<T> {
        x.parse::<T>().map_err(|_| Error::malformed(line_num, format!("Invalid INFO value: {}", x)))
    };
    match value {
        Some(value) if value.contains(',') => value.split(',').map(parse).collect(),
        Some(value) => Ok(vec![parse(value)?; alleles]),
        None => Ok(vec![default; alleles]),
    }
}

/// Splits a comma-joined free-text field and returns the segment for the given allele.
///
/// Falls back to the first segment if the allele index is out of range.
pub fn allele_segment(value: &str, allele: usize) -> &str {
    let mut segments = value.split(',');
    let first = segments.next().unwrap_or("");
    if allele == 0 {
        return first;
    }
    segments.nth(allele - 1).unwrap_or(first)
}

//-----------------------------------------------------------------------------

/// A line of a GTF file.
#[derive(Clone, Debug, PartialEq)]
pub struct GtfRecord {
    /// Contig name as written in the file.
    pub seqname: String,
    /// Annotation source.
    pub source: String,
    /// Feature type.
    pub feature: String,
    /// 1-based start position.
    pub start: u32,
    /// 1-based inclusive end position.
    pub end: u32,
    /// Strand: `+`, `-`, or `.`.
    pub strand: String,
    /// Attributes in file order.
    pub attributes: Vec<(String, String)>,
}

impl GtfRecord {
    /// Parses a GTF line.
    ///
    /// Returns [`None`] for header and empty lines.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRecord`] if the line has fewer than nine columns or the coordinates are not numbers.
    pub fn parse(line: &str, line_num: usize) -> Result<Option<Self>> {
        if is_header_line(line) {
            return Ok(None);
        }
        let fields: Vec<&str> = line.trim_end_matches(|c: char| c == '\r' || c == '\n').split('\t').collect();
        if fields.len() < 9 {
            return Err(Error::malformed(line_num, format!("Expected 9 columns, found {}", fields.len())));
        }
        let start: u32 = fields[3].parse().map_err(|_| {
            Error::malformed(line_num, format!("Invalid start position: {}", fields[3]))
        })?;
        let end: u32 = fields[4].parse().map_err(|_| {
            Error::malformed(line_num, format!("Invalid end position: {}", fields[4]))
        })?;

        let mut attributes: Vec<(String, String)> = Vec::new();
        for attr in fields[8].split(';') {
            let attr = attr.trim();
            if let Some((key, value)) = attr.split_once(' ') {
                attributes.push((key.to_string(), value.trim().trim_matches('"').to_string()));
            }
        }

        Ok(Some(GtfRecord {
            seqname: fields[0].to_string(),
            source: fields[1].to_string(),
            feature: fields[2].to_string(),
            start,
            end,
            strand: fields[6].to_string(),
            attributes,
        }))
    }

    /// Returns the first value of the attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

//-----------------------------------------------------------------------------
