//! Wire protocol of the query daemon.
//!
//! A client connects, writes one JSON object, and reads one JSON object terminated by a newline.
//! The request ends at its closing brace, so the client may keep its write side open.
//! Anything after the request, such as a terminating newline, is ignored.
//! The request is `{"operation": name, "params": {...}}`.
//! Errors are reported inside the response as an `"error"` field.

use crate::coordinates::{self, MAX_POS, MIN_POS};
use crate::{Error, Result};

use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

//-----------------------------------------------------------------------------

/// Maximum size of a request in bytes.
pub const MAX_REQUEST_SIZE: usize = 1 << 20;

/// Operations supported by the daemon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Range query over the variants array.
    QueryVariants,
    /// Summary statistics of the variants array.
    GetStats,
    /// Alternate allele frequency among the samples of the variants array.
    AlleleFrequency,
    /// Point lookup in the population frequency array.
    PopulationFrequencyLookup,
    /// Common and rare variant counts in the population frequency array.
    PopulationFrequencyStats,
    /// Liveness check.
    Ping,
    /// Point lookup in the clinical significance array.
    ClinicalSignificanceLookup,
    /// Genes overlapping an interval.
    GenesInRegion,
}

impl Operation {
    /// All operations.
    pub const ALL: [Operation; 8] = [
        Operation::QueryVariants,
        Operation::GetStats,
        Operation::AlleleFrequency,
        Operation::PopulationFrequencyLookup,
        Operation::PopulationFrequencyStats,
        Operation::Ping,
        Operation::ClinicalSignificanceLookup,
        Operation::GenesInRegion,
    ];

    /// Returns the name used in requests.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::QueryVariants => "query_variants",
            Operation::GetStats => "get_stats",
            Operation::AlleleFrequency => "allele_frequency",
            Operation::PopulationFrequencyLookup => "population_frequency_lookup",
            Operation::PopulationFrequencyStats => "population_frequency_stats",
            Operation::Ping => "ping",
            Operation::ClinicalSignificanceLookup => "clinical_significance_lookup",
            Operation::GenesInRegion => "genes_in_region",
        }
    }

    /// Returns the operation with the given name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    /// Returns the response for a failed operation.
    ///
    /// The response has the same shape as a successful one, with an added `"error"` field.
    pub fn error_response(&self, error: &Error) -> JsonValue {
        let mut response = error_response(error);
        match self {
            Operation::QueryVariants | Operation::PopulationFrequencyLookup | Operation::ClinicalSignificanceLookup => {
                response["variants"] = json!([]);
            },
            Operation::GenesInRegion => response["genes"] = json!([]),
            Operation::AlleleFrequency => response["frequency"] = json!(0.0),
            Operation::PopulationFrequencyStats => response["array_available"] = json!(false),
            Operation::GetStats | Operation::Ping => {},
        }
        response
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Returns a response consisting only of the error message.
pub fn error_response(error: &Error) -> JsonValue {
    json!({ "error": error.to_string() })
}

//-----------------------------------------------------------------------------

/// A request to the daemon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Operation name.
    pub operation: String,
    /// Operation parameters as a JSON object.
    #[serde(default)]
    pub params: JsonValue,
}

impl Request {
    /// Creates a request.
    pub fn new(operation: &str, params: JsonValue) -> Self {
        Request { operation: operation.to_string(), params }
    }

    /// Parses a request from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the request is not valid JSON or lacks the operation.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let request: Request = serde_json::from_slice(data).map_err(|err| Error::Protocol(err.to_string()))?;
        request.validated()
    }

    /// Converts a parsed JSON value into a request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the value is not a request object.
    pub fn from_value(value: JsonValue) -> Result<Self> {
        let request: Request = serde_json::from_value(value).map_err(|err| Error::Protocol(err.to_string()))?;
        request.validated()
    }

    fn validated(self) -> Result<Self> {
        if !self.params.is_null() && !self.params.is_object() {
            return Err(Error::Protocol(String::from("params must be an object")));
        }
        Ok(self)
    }

    /// Returns the parameters.
    pub fn params(&self) -> Params<'_> {
        Params { map: self.params.as_object() }
    }
}

/// Typed access to request parameters.
///
/// A parameter with value `null` is treated as missing.
#[derive(Clone, Copy, Debug)]
pub struct Params<'a> {
    map: Option<&'a Map<String, JsonValue>>,
}

impl<'a> Params<'a> {
    fn get(&self, key: &str) -> Option<&'a JsonValue> {
        self.map?.get(key).filter(|value| !value.is_null())
    }

    fn invalid(key: &str, expected: &str) -> Error {
        Error::Protocol(format!("Parameter {} must be {}", key, expected))
    }

    fn missing(key: &str) -> Error {
        Error::Protocol(format!("Missing parameter {}", key))
    }

    /// Returns an optional string parameter.
    pub fn opt_str(&self, key: &str) -> Result<Option<&'a str>> {
        match self.get(key) {
            Some(value) => value.as_str().map(Some).ok_or_else(|| Self::invalid(key, "a string")),
            None => Ok(None),
        }
    }

    /// Returns a required string parameter.
    pub fn str(&self, key: &str) -> Result<&'a str> {
        self.opt_str(key)?.ok_or_else(|| Self::missing(key))
    }

    /// Returns an optional non-negative integer parameter.
    ///
    /// Floating point numbers with no fractional part are accepted.
    pub fn opt_u64(&self, key: &str) -> Result<Option<u64>> {
        let value = match self.get(key) {
            Some(value) => value,
            None => return Ok(None),
        };
        if let Some(value) = value.as_u64() {
            return Ok(Some(value));
        }
        match value.as_f64() {
            Some(x) if x >= 0.0 && x.fract() == 0.0 && x <= u64::MAX as f64 => Ok(Some(x as u64)),
            _ => Err(Self::invalid(key, "a non-negative integer")),
        }
    }

    /// Returns an optional number parameter.
    pub fn opt_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            Some(value) => value.as_f64().map(Some).ok_or_else(|| Self::invalid(key, "a number")),
            None => Ok(None),
        }
    }

    /// Returns an optional position parameter.
    ///
    /// Positions beyond the domain are clamped to one past the largest position.
    pub fn opt_position(&self, key: &str) -> Result<Option<u32>> {
        Ok(self.opt_u64(key)?.map(|value| value.min(MAX_POS as u64 + 1) as u32))
    }

    /// Returns a required position parameter.
    pub fn position(&self, key: &str) -> Result<u32> {
        self.opt_position(key)?.ok_or_else(|| Self::missing(key))
    }

    /// Returns an optional chromosome parameter as an integer.
    ///
    /// An empty string is treated as missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedChromosome`] if the label is not supported.
    pub fn opt_chrom(&self, key: &str) -> Result<Option<u8>> {
        match self.opt_str(key)? {
            Some(label) if !label.is_empty() => {
                let chrom = coordinates::chrom_to_int(label).ok_or_else(|| Error::UnsupportedChromosome(label.to_string()))?;
                Ok(Some(chrom))
            },
            _ => Ok(None),
        }
    }

    /// Returns a required chromosome parameter as an integer.
    pub fn chrom(&self, key: &str) -> Result<u8> {
        self.opt_chrom(key)?.ok_or_else(|| Self::missing(key))
    }
}

//-----------------------------------------------------------------------------

/// Parameters of `query_variants`.
#[derive(Clone, Debug, PartialEq)]
pub struct VariantQuery {
    /// Chromosome, or all chromosomes if [`None`].
    pub chrom: Option<u8>,
    /// First position.
    pub start: u32,
    /// One past the last position.
    pub end: u32,
    /// Maximum number of matching variants.
    pub limit: usize,
    /// Minimum quality; variants without quality do not match.
    pub min_qual: Option<f64>,
    /// Exact reference allele.
    pub reference: Option<String>,
    /// Alternate allele that must be in the ALT list.
    pub alt: Option<String>,
}

impl VariantQuery {
    /// Default maximum number of variants.
    pub const LIMIT: usize = 100;

    /// Default end position.
    pub const END: u32 = MAX_POS;

    /// Extracts the query from request parameters.
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(VariantQuery {
            chrom: params.opt_chrom("chrom")?,
            start: params.opt_position("start")?.unwrap_or(MIN_POS),
            end: params.opt_position("end")?.unwrap_or(Self::END),
            limit: params.opt_u64("limit")?.map(|x| x as usize).unwrap_or(Self::LIMIT),
            min_qual: params.opt_f64("minQual")?,
            reference: params.opt_str("ref")?.filter(|x| !x.is_empty()).map(String::from),
            alt: params.opt_str("alt")?.filter(|x| !x.is_empty()).map(String::from),
        })
    }
}

impl Default for VariantQuery {
    fn default() -> Self {
        VariantQuery {
            chrom: None,
            start: MIN_POS,
            end: Self::END,
            limit: Self::LIMIT,
            min_qual: None,
            reference: None,
            alt: None,
        }
    }
}

/// Parameters of a point lookup for a specific allele.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlleleQuery {
    /// Chromosome label as given in the request.
    pub label: String,
    /// Chromosome.
    pub chrom: u8,
    /// Position.
    pub pos: u32,
    /// Reference allele.
    pub reference: String,
    /// Alternate allele.
    pub alt: String,
}

impl AlleleQuery {
    /// Extracts the query from request parameters.
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(AlleleQuery {
            label: params.str("chrom")?.to_string(),
            chrom: params.chrom("chrom")?,
            pos: params.position("pos")?,
            reference: params.str("ref")?.to_string(),
            alt: params.str("alt")?.to_string(),
        })
    }
}

/// Parameters of a region query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionQuery {
    /// Chromosome.
    pub chrom: u8,
    /// First position.
    pub start: u32,
    /// One past the last position.
    pub end: u32,
}

impl RegionQuery {
    /// Extracts the query from request parameters.
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(RegionQuery {
            chrom: params.chrom("chrom")?,
            start: params.opt_position("start")?.unwrap_or(MIN_POS),
            end: params.opt_position("end")?.unwrap_or(MAX_POS),
        })
    }
}

//-----------------------------------------------------------------------------

/// Reads a request of at most [`MAX_REQUEST_SIZE`] bytes.
///
/// Reading stops after the first complete JSON value, so the request does not need a terminator.
/// A read timeout set on the stream bounds the wait for a client that never finishes its request.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the request is too large, incomplete, or not a request object.
/// Passes through I/O errors, including timeouts.
pub fn read_request<R: Read>(reader: R) -> Result<Request> {
    let mut limited = BufReader::new(reader.take(MAX_REQUEST_SIZE as u64));
    let value = serde_json::Deserializer::from_reader(&mut limited).into_iter::<JsonValue>().next();
    let exhausted = limited.get_ref().limit() == 0;
    match value {
        Some(Ok(value)) => Request::from_value(value),
        Some(Err(err)) if err.is_io() => Err(Error::Io(err.into())),
        Some(Err(err)) if !(err.is_eof() && exhausted) => Err(Error::Protocol(err.to_string())),
        None if !exhausted => Err(Error::Protocol(String::from("Empty request"))),
        _ => Err(Error::Protocol(format!("Request exceeds {} bytes", MAX_REQUEST_SIZE))),
    }
}

/// Writes a response followed by a newline.
pub fn write_response<W: Write>(mut writer: W, response: &JsonValue) -> Result<()> {
    serde_json::to_writer(&mut writer, response)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Sends a request to the daemon listening at the socket and returns the response.
///
/// # Errors
///
/// Returns an error if the connection fails or the response is not valid JSON.
pub fn send_request<P: AsRef<Path>>(socket: P, request: &Request) -> Result<JsonValue> {
    let mut stream = UnixStream::connect(socket)?;
    serde_json::to_writer(&mut stream, request)?;
    stream.write_all(b"\n")?;
    stream.shutdown(Shutdown::Write)?;

    let mut response = String::new();
    BufReader::new(stream).read_line(&mut response)?;
    let value = serde_json::from_str(&response)?;
    Ok(value)
}

//-----------------------------------------------------------------------------
