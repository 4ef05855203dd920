//! Query operations over the arrays of a workspace.

use super::cache::StatsCache;
use super::protocol::{AlleleQuery, Operation, RegionQuery, Request, VariantQuery};

use crate::coordinates;
use crate::datasets::SampleVariants;
use crate::store::{ArrayHandle, ArraySchema, SparseArray, Subarray, Value};
use crate::workspace::{ArrayKind, Workspace};
use crate::{utils, Error, Result};

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value as JsonValue};

//-----------------------------------------------------------------------------

/// Read-only query service over the arrays of a workspace.
///
/// The service is shared by all connection workers.
/// Arrays that are missing or cannot be opened stay unavailable, and the operations using them return a
/// structured error or an empty result.
#[derive(Debug)]
pub struct QueryService {
    arrays: BTreeMap<ArrayKind, ArrayHandle>,
    cache: StatsCache,
    population_estimate_limit: usize,
    started: Instant,
}

impl QueryService {
    /// Number of cells sampled for estimating population statistics.
    pub const POPULATION_SAMPLE_CELLS: usize = 100_000;

    /// Opens every array in the workspace that exists.
    pub fn open(workspace: &Workspace, cache_ttl: Duration, population_estimate_limit: usize) -> Self {
        let mut arrays = BTreeMap::new();
        for kind in ArrayKind::ALL {
            let path = workspace.array_path(kind);
            if !SparseArray::exists(&path) {
                log::info!("{} array not found at {}", kind, path.display());
                continue;
            }
            match ArrayHandle::open(&path) {
                Ok(handle) => {
                    log::info!("Opened {} array at {}", kind, path.display());
                    arrays.insert(kind, handle);
                },
                Err(err) => log::error!("Cannot open {} array at {}: {}", kind, path.display(), err),
            }
        }
        QueryService {
            arrays,
            cache: StatsCache::new(cache_ttl),
            population_estimate_limit,
            started: Instant::now(),
        }
    }

    /// Returns `true` if the array is open.
    pub fn is_available(&self, kind: ArrayKind) -> bool {
        self.arrays.contains_key(&kind)
    }

    fn handle(&self, kind: ArrayKind) -> Result<&ArrayHandle> {
        self.arrays.get(&kind).ok_or_else(|| Error::StoreUnavailable(kind.name().to_string()))
    }

    /// Closes the idle connections of all arrays.
    ///
    /// Calling this more than once is harmless.
    pub fn close(&self) {
        for (kind, handle) in self.arrays.iter() {
            handle.close();
            log::debug!("Closed {} array", kind);
        }
        self.cache.clear();
    }

    //-------------------------------------------------------------------------

    /// Parses and executes a serialized request.
    pub fn handle_request(&self, data: &[u8]) -> JsonValue {
        match Request::parse(data) {
            Ok(request) => self.execute(&request),
            Err(err) => {
                log::warn!("Invalid request: {}", err);
                super::protocol::error_response(&err)
            },
        }
    }

    /// Executes a request and returns the response.
    pub fn execute(&self, request: &Request) -> JsonValue {
        let operation = match Operation::from_name(&request.operation) {
            Some(operation) => operation,
            None => return json!({ "error": format!("Unknown operation: {}", request.operation) }),
        };
        let params = request.params();
        let result = match operation {
            Operation::QueryVariants => VariantQuery::from_params(&params).and_then(|query| self.query_variants(&query)),
            Operation::GetStats => self.stats(),
            Operation::AlleleFrequency => AlleleQuery::from_params(&params)
                .and_then(|query| self.allele_frequency(&query))
                .map(|frequency| json!({ "frequency": frequency })),
            Operation::PopulationFrequencyLookup => AlleleQuery::from_params(&params)
                .and_then(|query| self.lookup(ArrayKind::Population, &query)),
            Operation::PopulationFrequencyStats => self.population_stats(),
            Operation::Ping => Ok(self.ping()),
            Operation::ClinicalSignificanceLookup => AlleleQuery::from_params(&params)
                .and_then(|query| self.lookup(ArrayKind::Clinical, &query)),
            Operation::GenesInRegion => RegionQuery::from_params(&params).and_then(|query| self.genes_in_region(&query)),
        };
        match result {
            Ok(response) => response,
            Err(err) => {
                log::error!("Operation {} failed: {}", operation, err);
                operation.error_response(&err)
            },
        }
    }

    //-------------------------------------------------------------------------

    /// Returns the variants matching the query.
    ///
    /// The quality and allele filters are applied to the cells in the position range, and the limit applies
    /// to the matching variants.
    /// A stored quality of 0 means that the quality is missing.
    pub fn query_variants(&self, query: &VariantQuery) -> Result<JsonValue> {
        let handle = self.handle(ArrayKind::Variants)?;
        let [ref_col, alt_col, qual_col, filter_col, info_col, samples_col] =
            attribute_columns(handle.schema(), ["ref", "alt", "qual", "filter", "info", "samples"])?;

        let mut variants = Vec::new();
        if query.limit > 0 && query.start < query.end {
            let reader = handle.reader()?;
            let subarray = Subarray::interval(query.chrom, query.start..query.end);
            reader.scan(&subarray, |coord, values| {
                let reference = text(values, ref_col);
                let alternates: Vec<&str> = split_list(text(values, alt_col), ',');
                let qual = values[qual_col].as_float().filter(|x| *x > 0.0);
                if let Some(min_qual) = query.min_qual {
                    if qual.map_or(true, |x| x < min_qual) {
                        return true;
                    }
                }
                if query.reference.as_deref().is_some_and(|x| x != reference) {
                    return true;
                }
                if query.alt.as_deref().is_some_and(|x| !alternates.contains(&x)) {
                    return true;
                }
                variants.push(json!({
                    "chrom": coordinates::int_to_chrom(coord.chrom),
                    "pos": coord.pos,
                    "ref": reference,
                    "alt": alternates,
                    "qual": qual,
                    "filter": split_list(text(values, filter_col), ';'),
                    "info": json_object(text(values, info_col)),
                    "samples": json_object(text(values, samples_col)),
                }));
                variants.len() < query.limit
            })?;
        }

        let count = variants.len();
        Ok(json!({ "variants": variants, "count": count }))
    }

    /// Returns summary statistics of the variants array.
    pub fn stats(&self) -> Result<JsonValue> {
        let handle = self.handle(ArrayKind::Variants)?;
        self.cache.get_or_try_insert_with(ArrayKind::Variants, "stats", || {
            let reader = handle.reader()?;
            let total = reader.cell_count()?;
            let sample_count = reader.get_tag(SampleVariants::SAMPLE_COUNT_TAG)?
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(0);
            let mut chromosomes = Vec::new();
            let mut position_range = [0, 0];
            if let Some(domain) = reader.non_empty_domain()? {
                for chrom in domain.chrom.0..=domain.chrom.1 {
                    let found = reader.scan(&Subarray::interval(Some(chrom), 0..u32::MAX), |_, _| false)?;
                    if found > 0 {
                        chromosomes.push(coordinates::int_to_chrom(chrom));
                    }
                }
                position_range = [domain.pos.0, domain.pos.1];
            }
            Ok(json!({
                "totalVariants": total,
                "chromosomes": chromosomes,
                "positionRange": position_range,
                "sampleCount": sample_count,
                "arraySize": utils::human_readable_size(handle.size_bytes()),
            }))
        })
    }

    /// Returns the frequency of the alternate allele among the called genotypes at the site.
    ///
    /// Returns 0.0 if there is no matching variant or no called genotypes.
    pub fn allele_frequency(&self, query: &AlleleQuery) -> Result<f64> {
        let handle = self.handle(ArrayKind::Variants)?;
        let [ref_col, alt_col, samples_col] = attribute_columns(handle.schema(), ["ref", "alt", "samples"])?;

        let mut found: Option<(usize, String)> = None;
        let reader = handle.reader()?;
        reader.scan(&Subarray::point(query.chrom, query.pos), |_, values| {
            if text(values, ref_col) != query.reference {
                return true;
            }
            match text(values, alt_col).split(',').position(|alt| alt == query.alt) {
                Some(index) => {
                    found = Some((index + 1, text(values, samples_col).to_string()));
                    false
                },
                None => true,
            }
        })?;

        match found {
            Some((allele, samples)) => {
                let samples: JsonValue = serde_json::from_str(&samples)?;
                Ok(genotype_frequency(&samples, allele))
            },
            None => Ok(0.0),
        }
    }

    /// Looks up a specific allele in the population or clinical array.
    ///
    /// If the array is not available, the result is empty and marked as unavailable.
    pub fn lookup(&self, kind: ArrayKind, query: &AlleleQuery) -> Result<JsonValue> {
        let handle = match self.arrays.get(&kind) {
            Some(handle) => handle,
            None => return Ok(json!({ "variants": [], "available": false })),
        };
        let schema = handle.schema();
        let [ref_col, alt_col] = attribute_columns(schema, ["ref", "alt"])?;

        let mut variants = Vec::new();
        let reader = handle.reader()?;
        reader.scan(&Subarray::point(query.chrom, query.pos), |_, values| {
            if text(values, ref_col) == query.reference && text(values, alt_col) == query.alt {
                let mut object = cell_object(schema, values);
                object.insert(String::from("chrom"), json!(query.label));
                object.insert(String::from("pos"), json!(query.pos));
                variants.push(JsonValue::Object(object));
                false
            } else {
                true
            }
        })?;
        Ok(json!({ "variants": variants }))
    }

    /// Returns common and rare variant counts in the population array.
    ///
    /// If the array is larger than the estimate limit, the fraction of common variants is measured on the
    /// first cells of chromosome 1 and the result is marked as an estimate.
    pub fn population_stats(&self) -> Result<JsonValue> {
        let handle = self.handle(ArrayKind::Population)?;
        self.cache.get_or_try_insert_with(ArrayKind::Population, "stats", || {
            let [common_col] = attribute_columns(handle.schema(), ["is_common"])?;
            let reader = handle.reader()?;
            let total = reader.cell_count()?;

            let mut common = 0;
            let estimated = total > self.population_estimate_limit;
            if estimated {
                let mut sampled = 0;
                reader.scan(&Subarray::interval(Some(1), 0..u32::MAX), |_, values| {
                    sampled += 1;
                    if values[common_col].as_bool() == Some(true) {
                        common += 1;
                    }
                    sampled < Self::POPULATION_SAMPLE_CELLS
                })?;
                let ratio = if sampled > 0 { common as f64 / sampled as f64 } else { 0.0 };
                common = (total as f64 * ratio).round() as usize;
                log::info!("Estimated population statistics from {} cells", sampled);
            } else {
                reader.scan(&Subarray::all(), |_, values| {
                    if values[common_col].as_bool() == Some(true) {
                        common += 1;
                    }
                    true
                })?;
            }

            let mut result = json!({
                "total_variants": total,
                "common_variants": common,
                "rare_variants": total.saturating_sub(common),
                "array_available": true,
            });
            if estimated {
                result["estimated"] = json!(true);
            }
            Ok(result)
        })
    }

    /// Returns the liveness status and the uptime in seconds.
    pub fn ping(&self) -> JsonValue {
        json!({ "status": "ok", "uptime": self.started.elapsed().as_secs_f64() })
    }

    /// Returns the genes overlapping the half-open interval.
    ///
    /// If the gene regions array is not available, the result is empty and marked as unavailable.
    pub fn genes_in_region(&self, query: &RegionQuery) -> Result<JsonValue> {
        let handle = match self.arrays.get(&ArrayKind::GeneRegions) {
            Some(handle) => handle,
            None => return Ok(json!({ "genes": [], "count": 0, "available": false })),
        };
        let schema = handle.schema();
        let [end_col] = attribute_columns(schema, ["end"])?;

        let mut genes = Vec::new();
        if query.start < query.end {
            let reader = handle.reader()?;
            reader.scan(&Subarray::interval(Some(query.chrom), 0..query.end), |coord, values| {
                let end = values[end_col].as_int().unwrap_or(0);
                if end >= query.start as i64 {
                    let mut object = cell_object(schema, values);
                    object.insert(String::from("chrom"), json!(coordinates::int_to_chrom(coord.chrom)));
                    object.insert(String::from("start"), json!(coord.pos));
                    genes.push(JsonValue::Object(object));
                }
                true
            })?;
        }

        let count = genes.len();
        Ok(json!({ "genes": genes, "count": count }))
    }
}

//-----------------------------------------------------------------------------

/// Returns the fraction of called alleles equal to `allele` in the `GT` fields of a samples object.
///
/// Phased and unphased genotypes are treated the same.
/// Samples without a `GT` field are uncalled.
pub fn genotype_frequency(samples: &JsonValue, allele: usize) -> f64 {
    let mut called = 0;
    let mut matching = 0;
    if let Some(samples) = samples.as_object() {
        for fields in samples.values() {
            let genotype = fields.get("GT").and_then(JsonValue::as_str).unwrap_or("./.");
            for value in genotype.split(|c| c == '/' || c == '|') {
                if value.is_empty() || value == "." {
                    continue;
                }
                called += 1;
                if value.parse::<usize>().ok() == Some(allele) {
                    matching += 1;
                }
            }
        }
    }
    if called == 0 {
        0.0
    } else {
        matching as f64 / called as f64
    }
}

fn attribute_columns<const N: usize>(schema: &ArraySchema, names: [&str; N]) -> Result<[usize; N]> {
    let mut result = [0; N];
    for (column, name) in result.iter_mut().zip(names.iter()) {
        *column = schema.attribute_index(name).ok_or_else(|| {
            Error::Schema(format!("Array has no attribute {}", name))
        })?;
    }
    Ok(result)
}

fn text(values: &[Value], column: usize) -> &str {
    values[column].as_str().unwrap_or("")
}

// Splits a stored list; "." and the empty string are empty lists.
fn split_list(value: &str, separator: char) -> Vec<&str> {
    if value.is_empty() || value == "." {
        Vec::new()
    } else {
        value.split(separator).collect()
    }
}

fn json_object(value: &str) -> JsonValue {
    match serde_json::from_str::<JsonValue>(value) {
        Ok(value) if value.is_object() => value,
        _ => JsonValue::Object(Map::new()),
    }
}

fn cell_object(schema: &ArraySchema, values: &[Value]) -> Map<String, JsonValue> {
    schema.attributes.iter().zip(values.iter())
        .map(|(attr, value)| (attr.name.clone(), serde_json::to_value(value).unwrap_or(JsonValue::Null)))
        .collect()
}

//-----------------------------------------------------------------------------
