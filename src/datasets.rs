//! Dataset kinds: how parsed input becomes cells of a sparse array.
//!
//! Each dataset kind implements [`Dataset`], which tells the ingestion pipeline:
//!
//! * the [`ArraySchema`] of the target array;
//! * how to turn an input line into zero or more records;
//! * the chromosome label and position of a record, and what to do with unsupported labels;
//! * how to derive the third coordinate of a record;
//! * the attribute values of a record;
//! * which per-run tallies to keep.
//!
//! The supported kinds are population frequencies from gnomAD ([`PopulationFrequencies`]), clinical significance
//! from ClinVar ([`ClinicalVariants`]), gene features and gene regions from GENCODE GTF ([`GeneFeatures`],
//! [`GeneRegions`]), and variants with per-sample genotypes from any VCF ([`SampleVariants`]).

use crate::alleles::AllelePositionTable;
use crate::classify::{self, ClinicalBucket};
use crate::coordinates::{self, ChromPolicy};
use crate::formats::{self, GtfRecord, VcfRecord};
use crate::store::{ArraySchema, ArrayWriter, Attribute, AttributeType, Dimension, Value};
use crate::{Error, Result};

use std::collections::{HashMap, HashSet};


//-----------------------------------------------------------------------------

/// A kind of input data stored in one sparse array.
pub trait Dataset {
    /// Parsed record type.
    type Record;

    /// Returns a short name for log messages.
    fn name(&self) -> &'static str;

    /// Returns the schema of the target array.
    fn schema(&self) -> ArraySchema;

    /// Returns the policy for chromosome labels outside the supported set.
    fn chrom_policy(&self) -> ChromPolicy {
        ChromPolicy::Reject
    }

    /// Parses an input line into records.
    ///
    /// Header lines produce no records.
    /// One line may produce several records, for example one per alternate allele.
    fn parse_line(&mut self, line: &str, line_num: usize) -> Result<Vec<Self::Record>>;

    /// Returns the chromosome label and the position of the record.
    fn locus<'a>(&self, record: &'a Self::Record) -> (&'a str, u32);

    /// Returns the key that distinguishes records at the same position.
    fn allele_key(&self, record: &Self::Record) -> String;

    /// Returns the third coordinate of the record.
    ///
    /// The default assigns allele indexes in first-seen order at each position.
    fn index(&mut self, record: &Self::Record, chrom: u8, pos: u32, alleles: &mut AllelePositionTable) -> u32 {
        alleles.assign(chrom, pos, &self.allele_key(record))
    }

    /// Returns the attribute values of the record in schema order.
    fn attributes(&self, record: &Self::Record) -> Vec<Value>;

    /// Called once before the run adds cells to an array that may already contain some.
    fn resume(&mut self, _writer: &ArrayWriter) -> Result<()> {
        Ok(())
    }

    /// Updates per-run tallies with a record that was placed in a batch.
    fn tally(&mut self, _record: &Self::Record) {}

    /// Returns the per-run tallies as (label, count) pairs.
    fn counts(&self) -> Vec<(String, usize)> {
        Vec::new()
    }

    /// Returns metadata tags to store in the array at the end of the run.
    fn tags(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

//-----------------------------------------------------------------------------

/// Population allele frequencies of one alternate allele.
///
/// Field names follow the attributes of the population array.
#[derive(Clone, Debug, PartialEq)]
pub struct PopulationFrequency {
    pub chrom: String,
    pub pos: u32,
    pub reference: String,
    pub alt: String,
    pub af_global: f64,
    pub af_afr: f64,
    pub af_amr: f64,
    pub af_asj: f64,
    pub af_eas: f64,
    pub af_fin: f64,
    pub af_nfe: f64,
    pub af_oth: f64,
    pub ac_global: i64,
    pub an_global: i64,
    pub nhomalt_global: i64,
    pub faf95_global: f64,
    pub is_common: bool,
}

/// Population frequencies from a gnomAD sites VCF (joint exome + genome frequencies).
///
/// Alternate alleles with global frequency 0 are not stored.
#[derive(Clone, Debug, Default)]
pub struct PopulationFrequencies {
    common: usize,
    rare: usize,
}

impl PopulationFrequencies {
    /// Population suffixes of the `AF_joint_*` INFO keys in attribute order.
    pub const POPULATIONS: [&'static str; 7] = ["afr", "amr", "asj", "eas", "fin", "nfe", "oth"];

    /// Largest allele index.
    pub const MAX_ALLELE_INDEX: u32 = 1000;

    /// Creates a new dataset.
    pub fn new() -> Self {
        Self::default()
    }
}

// Returns the value for the allele, or the default if there are too few values.
fn value_or<T: Copy>(values: &[T], allele: usize, default: T) -> T {
    values.get(allele).copied().unwrap_or(default)
}

impl Dataset for PopulationFrequencies {
    type Record = PopulationFrequency;

    fn name(&self) -> &'static str {
        "population frequencies"
    }

    fn schema(&self) -> ArraySchema {
        let mut attributes = vec![
            Attribute::new("ref", AttributeType::Text),
            Attribute::new("alt", AttributeType::Text),
            Attribute::new("af_global", AttributeType::Float),
        ];
        for population in Self::POPULATIONS.iter() {
            attributes.push(Attribute::new(&format!("af_{}", population), AttributeType::Float));
        }
        attributes.push(Attribute::new("ac_global", AttributeType::Int));
        attributes.push(Attribute::new("an_global", AttributeType::Int));
        attributes.push(Attribute::new("nhomalt_global", AttributeType::Int));
        attributes.push(Attribute::new("faf95_global", AttributeType::Float));
        attributes.push(Attribute::new("is_common", AttributeType::Bool));
        ArraySchema::new(Dimension::new("allele_idx", 0, Self::MAX_ALLELE_INDEX, 10), attributes)
    }

    fn parse_line(&mut self, line: &str, line_num: usize) -> Result<Vec<Self::Record>> {
        let record = match VcfRecord::parse(line, line_num)? {
            Some(record) => record,
            None => return Ok(Vec::new()),
        };
        let alleles = record.alternates.len();
        let per_allele_f64 = |key: &str| formats::per_allele_values::<f64>(record.info(key), alleles, 0.0, line_num);
        let per_allele_i64 = |key: &str| formats::per_allele_values::<i64>(record.info(key), alleles, 0, line_num);

        let af_global = per_allele_f64("AF_joint")?;
        let mut af_populations: Vec<Vec<f64>> = Vec::with_capacity(Self::POPULATIONS.len());
        for population in Self::POPULATIONS.iter() {
            af_populations.push(per_allele_f64(&format!("AF_joint_{}", population))?);
        }
        let ac_global = per_allele_i64("AC_joint")?;
        let an_global: i64 = match record.info("AN_joint") {
            Some(value) => value.parse().map_err(|_| {
                Error::malformed(line_num, format!("Invalid AN_joint: {}", value))
            })?,
            None => 0,
        };
        let nhomalt_global = per_allele_i64("nhomalt_joint")?;
        let faf95_global = per_allele_f64("faf95_joint")?;

        let mut result = Vec::with_capacity(alleles);
        for (i, alt) in record.alternates.iter().enumerate() {
            let af = match af_global.get(i) {
                Some(af) => *af,
                None => return Err(Error::malformed(
                    line_num, format!("No AF_joint value for allele {} at {}:{}", alt, record.chrom, record.pos)
                )),
            };
            if af == 0.0 {
                continue;
            }
            let pop = |j: usize| value_or(&af_populations[j], i, 0.0);
            result.push(PopulationFrequency {
                chrom: record.chrom.clone(),
                pos: record.pos,
                reference: record.reference.clone(),
                alt: alt.clone(),
                af_global: af,
                af_afr: pop(0),
                af_amr: pop(1),
                af_asj: pop(2),
                af_eas: pop(3),
                af_fin: pop(4),
                af_nfe: pop(5),
                af_oth: pop(6),
                ac_global: value_or(&ac_global, i, 0),
                an_global,
                nhomalt_global: value_or(&nhomalt_global, i, 0),
                faf95_global: value_or(&faf95_global, i, af),
                is_common: classify::is_common(af),
            });
        }
        Ok(result)
    }

    fn locus<'a>(&self, record: &'a Self::Record) -> (&'a str, u32) {
        (&record.chrom, record.pos)
    }

    fn allele_key(&self, record: &Self::Record) -> String {
        AllelePositionTable::allele_key(&record.reference, &record.alt)
    }

    fn attributes(&self, record: &Self::Record) -> Vec<Value> {
        vec![
            Value::from(record.reference.as_str()),
            Value::from(record.alt.as_str()),
            Value::Float(record.af_global),
            Value::Float(record.af_afr),
            Value::Float(record.af_amr),
            Value::Float(record.af_asj),
            Value::Float(record.af_eas),
            Value::Float(record.af_fin),
            Value::Float(record.af_nfe),
            Value::Float(record.af_oth),
            Value::Int(record.ac_global),
            Value::Int(record.an_global),
            Value::Int(record.nhomalt_global),
            Value::Float(record.faf95_global),
            Value::Bool(record.is_common),
        ]
    }

    fn tally(&mut self, record: &Self::Record) {
        if record.is_common {
            self.common += 1;
        } else {
            self.rare += 1;
        }
    }

    fn counts(&self) -> Vec<(String, usize)> {
        vec![(String::from("common"), self.common), (String::from("rare"), self.rare)]
    }
}

//-----------------------------------------------------------------------------

/// Clinical interpretation of one alternate allele.
///
/// Free-text fields have underscores replaced with spaces.
#[derive(Clone, Debug, PartialEq)]
pub struct ClinicalVariant {
    pub chrom: String,
    pub pos: u32,
    pub variant_id: String,
    pub reference: String,
    pub alt: String,
    pub clinical_significance: String,
    pub review_status: String,
    pub condition: String,
    pub gene_symbol: String,
    pub molecular_consequence: String,
    pub origin: String,
    pub hgvs: String,
    pub url: String,
}

/// Clinical significance from a ClinVar VCF.
#[derive(Clone, Debug, Default)]
pub struct ClinicalVariants {
    buckets: HashMap<ClinicalBucket, usize>,
    clinical_gene_hits: usize,
}

impl ClinicalVariants {
    /// Largest allele index.
    pub const MAX_ALLELE_INDEX: u32 = 100;

    /// Creates a new dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ClinVar page for the variation.
    pub fn variation_url(variant_id: &str) -> String {
        format!("https://www.ncbi.nlm.nih.gov/clinvar/variation/{}/", variant_id)
    }
}

impl Dataset for ClinicalVariants {
    type Record = ClinicalVariant;

    fn name(&self) -> &'static str {
        "clinical variants"
    }

    fn schema(&self) -> ArraySchema {
        let mut attributes = vec![Attribute::new("variant_id", AttributeType::Text)];
        for name in [
            "ref", "alt", "clinical_significance", "review_status", "condition",
            "gene_symbol", "molecular_consequence", "origin", "hgvs", "url",
        ] {
            attributes.push(Attribute::new(name, AttributeType::Text));
        }
        ArraySchema::new(Dimension::new("allele_idx", 0, Self::MAX_ALLELE_INDEX, 10), attributes)
    }

    fn parse_line(&mut self, line: &str, line_num: usize) -> Result<Vec<Self::Record>> {
        let record = match VcfRecord::parse(line, line_num)? {
            Some(record) => record,
            None => return Ok(Vec::new()),
        };

        let significance = record.info("CLNSIG").unwrap_or("not_provided");
        let review_status = record.info("CLNREVSTAT").unwrap_or("not_provided").replace('_', " ");
        let condition = record.info("CLNDN").unwrap_or("not_provided").replace('_', " ").replace('|', "; ");
        let gene_symbol = match record.info("GENEINFO") {
            Some(value) if !value.is_empty() => value.split(':').next().unwrap_or(value).to_string(),
            _ => String::from("unknown"),
        };
        let molecular_consequence = record.info("MC").unwrap_or("unknown").replace('_', " ");
        let origin = record.info("ORIGIN").unwrap_or("unknown").replace('_', " ");
        let hgvs = record.info("CLNHGVS").unwrap_or("unknown").to_string();
        let url = Self::variation_url(&record.id);

        let result = record.alternates.iter().enumerate().map(|(i, alt)| ClinicalVariant {
            chrom: record.chrom.clone(),
            pos: record.pos,
            variant_id: record.id.clone(),
            reference: record.reference.clone(),
            alt: alt.clone(),
            clinical_significance: formats::allele_segment(significance, i).replace('_', " "),
            review_status: review_status.clone(),
            condition: condition.clone(),
            gene_symbol: gene_symbol.clone(),
            molecular_consequence: molecular_consequence.clone(),
            origin: origin.clone(),
            hgvs: hgvs.clone(),
            url: url.clone(),
        }).collect();
        Ok(result)
    }

    fn locus<'a>(&self, record: &'a Self::Record) -> (&'a str, u32) {
        (&record.chrom, record.pos)
    }

    fn allele_key(&self, record: &Self::Record) -> String {
        AllelePositionTable::allele_key(&record.reference, &record.alt)
    }

    fn attributes(&self, record: &Self::Record) -> Vec<Value> {
        [
            &record.variant_id, &record.reference, &record.alt, &record.clinical_significance,
            &record.review_status, &record.condition, &record.gene_symbol, &record.molecular_consequence,
            &record.origin, &record.hgvs, &record.url,
        ].iter().map(|x| Value::from(x.as_str())).collect()
    }

    fn tally(&mut self, record: &Self::Record) {
        *self.buckets.entry(classify::clinical_bucket(&record.clinical_significance)).or_default() += 1;
        if classify::is_clinical_gene(&record.gene_symbol) {
            self.clinical_gene_hits += 1;
        }
    }

    fn counts(&self) -> Vec<(String, usize)> {
        let mut result: Vec<(String, usize)> = ClinicalBucket::ALL.iter()
            .map(|bucket| (bucket.label().to_string(), self.buckets.get(bucket).copied().unwrap_or(0)))
            .collect();
        result.push((String::from("clinical_genes"), self.clinical_gene_hits));
        result
    }
}

//-----------------------------------------------------------------------------

/// Feature types kept from GTF files.
pub const GTF_FEATURES: [&str; 6] = ["gene", "transcript", "exon", "CDS", "five_prime_UTR", "three_prime_UTR"];

/// Returns the normalized feature type: both UTR types become `UTR`.
pub fn normalize_feature_type(feature: &str) -> &str {
    match feature {
        "five_prime_UTR" | "three_prime_UTR" => "UTR",
        other => other,
    }
}

/// A gene annotation feature.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneFeature {
    pub chrom: String,
    pub start: u32,
    pub end: u32,
    pub gene_id: String,
    pub gene_name: String,
    pub gene_type: String,
    pub transcript_id: Option<String>,
    pub feature_type: String,
    pub strand: String,
    pub exon_number: Option<u32>,
    pub source: String,
}

impl GeneFeature {
    /// Builds a feature from a GTF record, or returns [`None`] if the feature type is not kept.
    pub fn from_gtf(record: GtfRecord) -> Option<Self> {
        if !GTF_FEATURES.contains(&record.feature.as_str()) {
            return None;
        }
        let gene_id = record.attribute("gene_id").unwrap_or("").to_string();
        let gene_name = record.attribute("gene_name").map(|x| x.to_string()).unwrap_or_else(|| gene_id.clone());
        let gene_type = record.attribute("gene_type")
            .or_else(|| record.attribute("gene_biotype"))
            .unwrap_or("unknown")
            .to_string();
        let transcript_id = record.attribute("transcript_id").map(|x| x.to_string());
        let exon_number = record.attribute("exon_number").and_then(|x| x.parse().ok());
        let feature_type = normalize_feature_type(&record.feature).to_string();
        Some(GeneFeature {
            chrom: record.seqname,
            start: record.start,
            end: record.end,
            gene_id,
            gene_name,
            gene_type,
            transcript_id,
            feature_type,
            strand: record.strand,
            exon_number,
            source: record.source,
        })
    }
}

/// A gene with its extent and transcript count, derived from gene features.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneRegion {
    pub chrom: String,
    pub start: u32,
    pub end: u32,
    pub gene_name: String,
    pub gene_id: String,
    pub gene_type: String,
    pub strand: String,
    pub transcript_count: usize,
    pub condition: Option<&'static str>,
}

/// Gene features from a GTF file.
///
/// Feature identifiers are assigned sequentially from 1 in input order.
/// The dataset also collects the genes, which become [`GeneRegions`] after the run.
#[derive(Clone, Debug, Default)]
pub struct GeneFeatures {
    next_id: u32,
    features: HashMap<String, usize>,
    genes: Vec<GeneRegion>,
    gene_index: HashMap<(String, String), usize>,
    transcripts: HashMap<(String, String), HashSet<String>>,
}

impl GeneFeatures {
    /// Largest feature identifier.
    pub const MAX_FEATURE_ID: u32 = 10_000_000;

    /// Creates a new dataset.
    pub fn new() -> Self {
        GeneFeatures { next_id: 1, ..Self::default() }
    }

    /// Returns the gene regions seen so far, sorted by chromosome, start, and name.
    ///
    /// Transcript counts are the numbers of distinct transcript identifiers per (gene name, chromosome).
    pub fn regions(&self) -> Vec<GeneRegion> {
        let mut result = self.genes.clone();
        for gene in result.iter_mut() {
            let key = (gene.gene_name.clone(), gene.chrom.clone());
            gene.transcript_count = self.transcripts.get(&key).map(|x| x.len()).unwrap_or(0);
        }
        result.sort_by(|a, b| {
            let a_key = (coordinates::chrom_to_int(&a.chrom), a.start, &a.gene_name);
            let b_key = (coordinates::chrom_to_int(&b.chrom), b.start, &b.gene_name);
            a_key.cmp(&b_key)
        });
        result
    }
}

impl Dataset for GeneFeatures {
    type Record = GeneFeature;

    fn name(&self) -> &'static str {
        "gene features"
    }

    fn schema(&self) -> ArraySchema {
        let attributes = vec![
            Attribute::new("gene_name", AttributeType::Text),
            Attribute::new("gene_id", AttributeType::Text),
            Attribute::new("transcript_id", AttributeType::Text),
            Attribute::new("feature_type", AttributeType::Text),
            Attribute::new("end", AttributeType::Int),
            Attribute::new("strand", AttributeType::Text),
            Attribute::new("exon_number", AttributeType::Int),
            Attribute::new("source", AttributeType::Text),
        ];
        ArraySchema::new(Dimension::new("feature_id", 1, Self::MAX_FEATURE_ID, 10_000), attributes)
    }

    fn chrom_policy(&self) -> ChromPolicy {
        ChromPolicy::Sentinel
    }

    fn parse_line(&mut self, line: &str, line_num: usize) -> Result<Vec<Self::Record>> {
        let record = GtfRecord::parse(line, line_num)?;
        Ok(record.and_then(GeneFeature::from_gtf).into_iter().collect())
    }

    fn locus<'a>(&self, record: &'a Self::Record) -> (&'a str, u32) {
        (&record.chrom, record.start)
    }

    fn allele_key(&self, record: &Self::Record) -> String {
        format!("{}:{}", record.feature_type, record.transcript_id.as_deref().unwrap_or(&record.gene_id))
    }

    fn index(&mut self, _record: &Self::Record, _chrom: u8, _pos: u32, _alleles: &mut AllelePositionTable) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // New features get ids after the largest stored id.
    fn resume(&mut self, writer: &ArrayWriter) -> Result<()> {
        if let Some(domain) = writer.non_empty_domain()? {
            let next_id = domain.index.1.saturating_add(1);
            if next_id > self.next_id {
                log::info!("Array {} already has features; continuing from id {}", writer.path().display(), next_id);
                self.next_id = next_id;
            }
        }
        Ok(())
    }

    fn attributes(&self, record: &Self::Record) -> Vec<Value> {
        vec![
            Value::from(record.gene_name.as_str()),
            Value::from(record.gene_id.as_str()),
            Value::from(record.transcript_id.as_deref().unwrap_or("")),
            Value::from(record.feature_type.as_str()),
            Value::Int(record.end as i64),
            Value::from(record.strand.as_str()),
            Value::Int(record.exon_number.unwrap_or(0) as i64),
            Value::from(record.source.as_str()),
        ]
    }

    fn tally(&mut self, record: &Self::Record) {
        *self.features.entry(record.feature_type.clone()).or_default() += 1;
        let key = (record.gene_name.clone(), record.chrom.clone());
        match record.feature_type.as_str() {
            "gene" => {
                if !self.gene_index.contains_key(&key) {
                    self.gene_index.insert(key, self.genes.len());
                    self.genes.push(GeneRegion {
                        chrom: record.chrom.clone(),
                        start: record.start,
                        end: record.end,
                        gene_name: record.gene_name.clone(),
                        gene_id: record.gene_id.clone(),
                        gene_type: record.gene_type.clone(),
                        strand: record.strand.clone(),
                        transcript_count: 0,
                        condition: classify::clinical_gene(&record.gene_name).map(|x| x.condition),
                    });
                }
            },
            "transcript" => {
                let transcripts = self.transcripts.entry(key).or_default();
                if let Some(id) = record.transcript_id.as_ref() {
                    transcripts.insert(id.clone());
                }
            },
            _ => {},
        }
    }

    fn counts(&self) -> Vec<(String, usize)> {
        let mut result = vec![(String::from("features"), self.features.values().sum())];
        for feature in ["gene", "transcript", "exon", "CDS", "UTR"] {
            result.push((feature.to_string(), self.features.get(feature).copied().unwrap_or(0)));
        }
        result
    }
}

//-----------------------------------------------------------------------------

/// Gene regions derived from [`GeneFeatures`].
///
/// Records are supplied directly instead of being parsed from text.
/// Genes starting at the same position get indexes in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct GeneRegions {
    genes: usize,
    clinical_genes: usize,
}

impl GeneRegions {
    /// Largest gene index at one position.
    pub const MAX_GENE_INDEX: u32 = 100;

    /// Creates a new dataset.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dataset for GeneRegions {
    type Record = GeneRegion;

    fn name(&self) -> &'static str {
        "gene regions"
    }

    fn schema(&self) -> ArraySchema {
        let attributes = vec![
            Attribute::new("gene_name", AttributeType::Text),
            Attribute::new("gene_id", AttributeType::Text),
            Attribute::new("gene_type", AttributeType::Text),
            Attribute::new("end", AttributeType::Int),
            Attribute::new("strand", AttributeType::Text),
            Attribute::new("transcript_count", AttributeType::Int),
            Attribute::new("clinical_significance", AttributeType::Text),
            Attribute::new("is_clinical", AttributeType::Bool),
        ];
        ArraySchema::new(Dimension::new("gene_idx", 0, Self::MAX_GENE_INDEX, 10), attributes)
    }

    fn chrom_policy(&self) -> ChromPolicy {
        ChromPolicy::Sentinel
    }

    fn parse_line(&mut self, _line: &str, _line_num: usize) -> Result<Vec<Self::Record>> {
        Ok(Vec::new())
    }

    fn locus<'a>(&self, record: &'a Self::Record) -> (&'a str, u32) {
        (&record.chrom, record.start)
    }

    fn allele_key(&self, record: &Self::Record) -> String {
        record.gene_name.clone()
    }

    fn attributes(&self, record: &Self::Record) -> Vec<Value> {
        vec![
            Value::from(record.gene_name.as_str()),
            Value::from(record.gene_id.as_str()),
            Value::from(record.gene_type.as_str()),
            Value::Int(record.end as i64),
            Value::from(record.strand.as_str()),
            Value::Int(record.transcript_count as i64),
            Value::from(record.condition.unwrap_or("")),
            Value::Bool(record.condition.is_some()),
        ]
    }

    fn tally(&mut self, record: &Self::Record) {
        self.genes += 1;
        if record.condition.is_some() {
            self.clinical_genes += 1;
        }
    }

    fn counts(&self) -> Vec<(String, usize)> {
        vec![(String::from("genes"), self.genes), (String::from("clinical_genes"), self.clinical_genes)]
    }
}

//-----------------------------------------------------------------------------

/// Variants with per-sample genotypes from a VCF file.
///
/// There is one cell per input line.
/// Lines at the same position are distinguished by their REF and ALT list.
#[derive(Clone, Debug, Default)]
pub struct SampleVariants {
    samples: Vec<String>,
    pass: usize,
    filtered: usize,
}

impl SampleVariants {
    /// Largest allele index.
    pub const MAX_ALLELE_INDEX: u32 = 100;

    /// Tag storing the number of samples.
    pub const SAMPLE_COUNT_TAG: &'static str = "sample_count";

    /// Creates a new dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sample names from the header.
    pub fn samples(&self) -> &[String] {
        &self.samples
    }
}

impl Dataset for SampleVariants {
    type Record = VcfRecord;

    fn name(&self) -> &'static str {
        "variants"
    }

    fn schema(&self) -> ArraySchema {
        let attributes = vec![
            Attribute::new("ref", AttributeType::Text),
            Attribute::new("alt", AttributeType::Text),
            Attribute::new("qual", AttributeType::Float),
            Attribute::new("filter", AttributeType::Text),
            Attribute::new("info", AttributeType::Text),
            Attribute::new("samples", AttributeType::Text),
        ];
        ArraySchema::new(Dimension::new("allele_idx", 0, Self::MAX_ALLELE_INDEX, 10), attributes)
    }

    fn parse_line(&mut self, line: &str, line_num: usize) -> Result<Vec<Self::Record>> {
        if line.starts_with("#CHROM") {
            self.samples = formats::sample_names(line);
        }
        Ok(VcfRecord::parse(line, line_num)?.into_iter().collect())
    }

    fn locus<'a>(&self, record: &'a Self::Record) -> (&'a str, u32) {
        (&record.chrom, record.pos)
    }

    fn allele_key(&self, record: &Self::Record) -> String {
        AllelePositionTable::allele_key(&record.reference, &record.alternates.join(","))
    }

    fn attributes(&self, record: &Self::Record) -> Vec<Value> {
        let filter = if record.filter.is_empty() { String::from(".") } else { record.filter.join(";") };
        vec![
            Value::from(record.reference.as_str()),
            Value::from(record.alternates.join(",")),
            Value::Float(record.qual.unwrap_or(0.0)),
            Value::from(filter),
            Value::from(record.info_json().to_string()),
            Value::from(record.samples_json(&self.samples).to_string()),
        ]
    }

    fn tally(&mut self, record: &Self::Record) {
        if record.is_pass() {
            self.pass += 1;
        } else {
            self.filtered += 1;
        }
    }

    fn counts(&self) -> Vec<(String, usize)> {
        vec![(String::from("pass"), self.pass), (String::from("filtered"), self.filtered)]
    }

    fn tags(&self) -> Vec<(String, String)> {
        vec![(Self::SAMPLE_COUNT_TAG.to_string(), self.samples.len().to_string())]
    }
}

//-----------------------------------------------------------------------------
