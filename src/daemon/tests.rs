use super::*;

use crate::datasets::{ClinicalVariants, Dataset, GeneFeatures, GeneRegions, PopulationFrequencies, SampleVariants};
use crate::ingest::{self, IngestParams};
use crate::store::{ArrayWriter, SparseArray};
use crate::workspace::ArrayKind;

use super::protocol::{AlleleQuery, RegionQuery, VariantQuery};

use std::io::{BufRead, BufReader, Write};
use std::net::Shutdown;
use std::time::Instant;

use serde_json::{json, Value as JsonValue};
use tempfile::TempDir;

//-----------------------------------------------------------------------------

fn line(fields: &[&str]) -> String {
    let mut result = fields.join("\t");
    result.push('\n');
    result
}

fn samples_header(samples: usize) -> String {
    let mut fields = vec!["#CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER", "INFO", "FORMAT"];
    let names: Vec<String> = (1..=samples).map(|i| format!("S{}", i)).collect();
    fields.extend(names.iter().map(|x| x.as_str()));
    line(&fields)
}

fn variant_line(site: &[&str; 8], genotypes: &[&str]) -> String {
    let mut fields: Vec<&str> = site.to_vec();
    fields.push("GT");
    fields.extend_from_slice(genotypes);
    line(&fields)
}

const FIRST_SITE: [&str; 8] = ["chr1", "1000", "rs1", "A", "G", "50", "PASS", "DP=30;DB"];

// Alternate allele count 3 + 4 out of 12 called alleles.
const FIRST_GENOTYPES: [&str; 10] = ["0/1", "0|1", "0/1", "1/1", "1|1", "0/0", "./.", "./.", ".|.", "./."];

fn variants_vcf() -> String {
    let mut vcf = String::from("##fileformat=VCFv4.2\n");
    vcf.push_str(&samples_header(10));
    vcf.push_str(&variant_line(&FIRST_SITE, &FIRST_GENOTYPES));
    vcf.push_str(&variant_line(
        &["chr1", "2000", ".", "C", "T,A", "20", "LowQual", "DP=5"],
        &["0/1", "0/2", "2/2", "1/1", "0/0", "0/0", "0/0", "0/0", "0/0", "./."],
    ));
    vcf.push_str(&variant_line(&["chr2", "500", ".", "G", "GA", ".", "PASS", "."], &["0/0"; 10]));
    vcf.push_str(&variant_line(&["chrX", "100", ".", "T", "C", "99", "PASS", "AC=1"], &["0/1"; 10]));
    vcf
}

fn single_variant_vcf() -> String {
    let mut vcf = String::from("##fileformat=VCFv4.2\n");
    vcf.push_str(&samples_header(10));
    vcf.push_str(&variant_line(&FIRST_SITE, &FIRST_GENOTYPES));
    vcf
}

fn gnomad_vcf() -> String {
    let mut vcf = String::from("##fileformat=VCFv4.2\n");
    vcf.push_str(&line(&[
        "chr1", "1000", ".", "A", "G,T", ".", "PASS",
        "AF_joint=0.02,0.001;AC_joint=20,1;AN_joint=1000;nhomalt_joint=1,0;faf95_joint=0.015,0.0005;AF_joint_nfe=0.03,0.002",
    ]));
    vcf.push_str(&line(&["chr2", "5000", ".", "C", "T", ".", "PASS", "AF_joint=0.5;AC_joint=500;AN_joint=1000"]));
    vcf
}

fn clinvar_vcf() -> String {
    let mut vcf = String::from("##fileformat=VCFv4.1\n");
    vcf.push_str(&line(&[
        "13", "32315474", "52055", "G", "A", ".", ".",
        "CLNSIG=Pathogenic;CLNREVSTAT=reviewed_by_expert_panel;CLNDN=Hereditary_breast_ovarian_cancer_syndrome;GENEINFO=BRCA2:675",
    ]));
    vcf
}

fn gtf() -> String {
    let mut gtf = String::from("##provider: GENCODE\n");
    gtf.push_str(&line(&[
        "chr13", "HAVANA", "gene", "32299122", "32315363", ".", "-", ".",
        "gene_id \"ENSG00000189167.14\"; gene_type \"protein_coding\"; gene_name \"ZAR1L\";",
    ]));
    gtf.push_str(&line(&[
        "chr13", "HAVANA", "gene", "32315508", "32400268", ".", "+", ".",
        "gene_id \"ENSG00000139618.19\"; gene_type \"protein_coding\"; gene_name \"BRCA2\";",
    ]));
    gtf.push_str(&line(&[
        "chr13", "HAVANA", "transcript", "32315508", "32400268", ".", "+", ".",
        "gene_id \"ENSG00000139618.19\"; transcript_id \"ENST00000380152.8\"; gene_type \"protein_coding\"; gene_name \"BRCA2\";",
    ]));
    gtf.push_str(&line(&[
        "chr13", "HAVANA", "exon", "32315508", "32315667", ".", "+", ".",
        "gene_id \"ENSG00000139618.19\"; transcript_id \"ENST00000380152.8\"; gene_type \"protein_coding\"; gene_name \"BRCA2\"; exon_number 1;",
    ]));
    gtf
}

//-----------------------------------------------------------------------------

fn ingest_text<D: Dataset>(path: &Path, dataset: &mut D, text: &str) {
    if !SparseArray::exists(path) {
        let result = SparseArray::create(path, &dataset.schema());
        assert!(result.is_ok(), "Failed to create {}: {}", path.display(), result.unwrap_err());
    }
    let mut writer = ArrayWriter::open(path).unwrap();
    let report = ingest::ingest_reader(dataset, text.as_bytes(), &mut writer, IngestParams::default());
    assert!(report.is_ok(), "Failed to ingest {}: {}", dataset.name(), report.unwrap_err());
    assert_eq!(report.unwrap().batches_dropped, 0, "Dropped batches for {}", dataset.name());
}

fn create_variants(workspace: &Workspace, vcf: &str) {
    ingest_text(&workspace.array_path(ArrayKind::Variants), &mut SampleVariants::new(), vcf);
}

fn create_full_workspace(dir: &TempDir) -> Workspace {
    let workspace = Workspace::new(dir.path());
    create_variants(&workspace, &variants_vcf());
    ingest_text(&workspace.array_path(ArrayKind::Population), &mut PopulationFrequencies::new(), &gnomad_vcf());
    ingest_text(&workspace.array_path(ArrayKind::Clinical), &mut ClinicalVariants::new(), &clinvar_vcf());

    let mut features = GeneFeatures::new();
    ingest_text(&workspace.array_path(ArrayKind::GeneFeatures), &mut features, &gtf());
    let path = workspace.array_path(ArrayKind::GeneRegions);
    let mut regions = GeneRegions::new();
    assert!(SparseArray::create(&path, &regions.schema()).is_ok());
    let mut writer = ArrayWriter::open(&path).unwrap();
    let lines = features.regions().into_iter().map(|region| Ok(vec![region]));
    let report = ingest::ingest_records(&mut regions, lines, &mut writer, IngestParams::default());
    assert!(report.is_ok(), "Failed to ingest gene regions: {}", report.unwrap_err());

    workspace
}

fn service(workspace: &Workspace) -> QueryService {
    QueryService::open(workspace, DaemonConfig::CACHE_TTL, DaemonConfig::POPULATION_ESTIMATE_LIMIT)
}

fn allele(chrom: &str, pos: u32, reference: &str, alt: &str) -> AlleleQuery {
    AlleleQuery {
        label: chrom.to_string(),
        chrom: crate::coordinates::chrom_to_int(chrom).unwrap(),
        pos,
        reference: reference.to_string(),
        alt: alt.to_string(),
    }
}

fn query(service: &QueryService, query: &VariantQuery) -> JsonValue {
    let result = service.query_variants(query);
    assert!(result.is_ok(), "Variant query failed: {}", result.unwrap_err());
    result.unwrap()
}

fn positions(response: &JsonValue) -> Vec<(String, u64)> {
    response["variants"].as_array().unwrap().iter().map(|variant| {
        (variant["chrom"].as_str().unwrap().to_string(), variant["pos"].as_u64().unwrap())
    }).collect()
}

//-----------------------------------------------------------------------------

#[test]
fn single_record_query() {
    let dir = TempDir::new().unwrap();
    let workspace = Workspace::new(dir.path());
    create_variants(&workspace, &single_variant_vcf());
    let service = service(&workspace);

    let params = json!({ "start": 1, "end": 300_000_000, "limit": 1 });
    let response = service.execute(&Request::new("query_variants", params));
    assert_eq!(response["count"], json!(1));
    let variants = response["variants"].as_array().unwrap();
    assert_eq!(variants.len(), 1);
    let variant = &variants[0];
    assert_eq!(variant["chrom"], json!("chr1"));
    assert_eq!(variant["pos"], json!(1000));
    assert_eq!(variant["ref"], json!("A"));
    assert_eq!(variant["alt"], json!(["G"]));
    assert_eq!(variant["qual"], json!(50.0));
    assert_eq!(variant["filter"], json!(["PASS"]));
    assert_eq!(variant["info"], json!({ "DP": "30", "DB": true }));
    assert_eq!(variant["samples"]["S1"], json!({ "GT": "0/1" }));
    assert_eq!(variant["samples"].as_object().unwrap().len(), 10);
}

#[test]
fn variant_filters() {
    let dir = TempDir::new().unwrap();
    let workspace = create_full_workspace(&dir);
    let service = service(&workspace);

    let all = query(&service, &VariantQuery::default());
    assert_eq!(all["count"], json!(4));
    assert_eq!(positions(&all), vec![
        (String::from("chr1"), 1000), (String::from("chr1"), 2000),
        (String::from("chr2"), 500), (String::from("chrX"), 100),
    ]);
    assert_eq!(all["variants"][2]["qual"], JsonValue::Null, "Missing quality should decode as null");
    assert_eq!(all["variants"][2]["info"], json!({}));

    let chr1 = query(&service, &VariantQuery { chrom: Some(1), ..VariantQuery::default() });
    assert_eq!(chr1["count"], json!(2));

    let half_open = query(&service, &VariantQuery { chrom: Some(1), start: 1000, end: 2000, ..VariantQuery::default() });
    assert_eq!(positions(&half_open), vec![(String::from("chr1"), 1000)]);

    let min_qual = query(&service, &VariantQuery { min_qual: Some(30.0), ..VariantQuery::default() });
    assert_eq!(positions(&min_qual), vec![(String::from("chr1"), 1000), (String::from("chrX"), 100)]);

    let by_alt = query(&service, &VariantQuery { alt: Some(String::from("A")), ..VariantQuery::default() });
    assert_eq!(positions(&by_alt), vec![(String::from("chr1"), 2000)]);
    assert_eq!(by_alt["variants"][0]["alt"], json!(["T", "A"]));
    assert_eq!(by_alt["variants"][0]["filter"], json!(["LowQual"]));

    let by_ref = query(&service, &VariantQuery { reference: Some(String::from("G")), ..VariantQuery::default() });
    assert_eq!(positions(&by_ref), vec![(String::from("chr2"), 500)]);

    // The limit applies to matching variants.
    let limited = query(&service, &VariantQuery { min_qual: Some(30.0), limit: 1, ..VariantQuery::default() });
    assert_eq!(positions(&limited), vec![(String::from("chr1"), 1000)]);
    let skipped = query(&service, &VariantQuery { chrom: Some(23), min_qual: Some(30.0), limit: 1, ..VariantQuery::default() });
    assert_eq!(positions(&skipped), vec![(String::from("chrX"), 100)]);

    let empty = query(&service, &VariantQuery { limit: 0, ..VariantQuery::default() });
    assert_eq!(empty["count"], json!(0));
}

#[test]
fn request_parameters() {
    let dir = TempDir::new().unwrap();
    let workspace = create_full_workspace(&dir);
    let service = service(&workspace);

    let response = service.execute(&Request::new("query_variants", json!({ "chrom": "X", "minQual": 10 })));
    assert_eq!(response["count"], json!(1));
    let response = service.execute(&Request::new("query_variants", json!({ "chrom": "", "ref": null })));
    assert_eq!(response["count"], json!(4), "Empty chromosome should mean all chromosomes");
    let response = service.execute(&Request::new("query_variants", JsonValue::Null));
    assert_eq!(response["count"], json!(4), "Missing params should use defaults");

    let response = service.execute(&Request::new("query_variants", json!({ "chrom": "chr99" })));
    assert!(response["error"].as_str().unwrap().contains("chr99"), "Unexpected response: {}", response);
    assert_eq!(response["variants"], json!([]));

    let response = service.execute(&Request::new("query_variants", json!({ "start": "one" })));
    assert!(response["error"].is_string(), "Invalid start was accepted");
    let response = service.execute(&Request::new("allele_frequency", json!({ "chrom": "1", "pos": 1000 })));
    assert!(response["error"].as_str().unwrap().contains("ref"), "Unexpected response: {}", response);
    assert_eq!(response["frequency"], json!(0.0));

    let response = service.execute(&Request::new("frobnicate", json!({})));
    assert_eq!(response, json!({ "error": "Unknown operation: frobnicate" }));

    let response = service.handle_request(b"not json");
    assert!(response["error"].is_string(), "Malformed request was accepted");
    let response = service.handle_request(br#"{"params": {}}"#);
    assert!(response["error"].is_string(), "Request without operation was accepted");
    let response = service.handle_request(br#"{"operation": "ping", "params": [1, 2]}"#);
    assert!(response["error"].is_string(), "Non-object params were accepted");
}

#[test]
fn allele_frequencies() {
    let dir = TempDir::new().unwrap();
    let workspace = create_full_workspace(&dir);
    let service = service(&workspace);

    let frequency = service.allele_frequency(&allele("chr1", 1000, "A", "G")).unwrap();
    assert!((frequency - 7.0 / 12.0).abs() < 1e-9, "Wrong frequency {}", frequency);

    // The second ALT counts genotype value 2.
    let frequency = service.allele_frequency(&allele("1", 2000, "C", "A")).unwrap();
    assert!((frequency - 3.0 / 18.0).abs() < 1e-9, "Wrong frequency {}", frequency);

    assert_eq!(service.allele_frequency(&allele("chr2", 500, "G", "GA")).unwrap(), 0.0);
    assert_eq!(service.allele_frequency(&allele("chr1", 1000, "A", "C")).unwrap(), 0.0);
    assert_eq!(service.allele_frequency(&allele("chr1", 1001, "A", "G")).unwrap(), 0.0);

    let response = service.execute(&Request::new("allele_frequency", json!({ "chrom": "chr1", "pos": 1000, "ref": "A", "alt": "G" })));
    assert!((response["frequency"].as_f64().unwrap() - 7.0 / 12.0).abs() < 1e-9);
}

#[test]
fn genotype_frequency_values() {
    let samples = json!({
        "a": { "GT": "0/1" },
        "b": { "GT": "1|1" },
        "c": { "GT": "./1" },
        "d": { "DP": "10" },
        "e": { "GT": "." },
    });
    assert!((operations::genotype_frequency(&samples, 1) - 4.0 / 5.0).abs() < 1e-9);
    assert_eq!(operations::genotype_frequency(&samples, 2), 0.0);
    assert_eq!(operations::genotype_frequency(&json!({}), 1), 0.0);
}

#[test]
fn variant_statistics() {
    let dir = TempDir::new().unwrap();
    let workspace = create_full_workspace(&dir);
    let service = service(&workspace);

    let stats = service.execute(&Request::new("get_stats", json!({})));
    assert_eq!(stats["totalVariants"], json!(4));
    assert_eq!(stats["chromosomes"], json!(["chr1", "chr2", "chrX"]));
    assert_eq!(stats["positionRange"], json!([100, 2000]));
    assert_eq!(stats["sampleCount"], json!(10));
    assert!(!stats["arraySize"].as_str().unwrap().is_empty());

    // A new record is not visible until the cached value expires.
    let mut extra = samples_header(10);
    extra.push_str(&variant_line(&["chrY", "5000", ".", "A", "T", "10", "PASS", "."], &["0/1"; 10]));
    create_variants(&workspace, &extra);
    let cached = service.stats().unwrap();
    assert_eq!(cached["totalVariants"], json!(4));

    let uncached = QueryService::open(&workspace, Duration::ZERO, DaemonConfig::POPULATION_ESTIMATE_LIMIT);
    let fresh = uncached.stats().unwrap();
    assert_eq!(fresh["totalVariants"], json!(5));
    assert_eq!(fresh["chromosomes"], json!(["chr1", "chr2", "chrX", "chrY"]));
}

#[test]
fn population_lookup() {
    let dir = TempDir::new().unwrap();
    let workspace = create_full_workspace(&dir);
    let service = service(&workspace);

    let response = service.lookup(ArrayKind::Population, &allele("chr1", 1000, "A", "G")).unwrap();
    let variants = response["variants"].as_array().unwrap();
    assert_eq!(variants.len(), 1);
    let variant = &variants[0];
    assert_eq!(variant["chrom"], json!("chr1"));
    assert_eq!(variant["pos"], json!(1000));
    assert_eq!(variant["ref"], json!("A"));
    assert_eq!(variant["alt"], json!("G"));
    assert_eq!(variant["af_global"], json!(0.02));
    assert_eq!(variant["af_nfe"], json!(0.03));
    assert_eq!(variant["af_afr"], json!(0.0));
    assert_eq!(variant["ac_global"], json!(20));
    assert_eq!(variant["an_global"], json!(1000));
    assert_eq!(variant["nhomalt_global"], json!(1));
    assert_eq!(variant["faf95_global"], json!(0.015));
    assert_eq!(variant["is_common"], json!(true));

    let rare = service.lookup(ArrayKind::Population, &allele("1", 1000, "A", "T")).unwrap();
    assert_eq!(rare["variants"][0]["is_common"], json!(false));
    assert_eq!(rare["variants"][0]["chrom"], json!("1"), "The chromosome label should be echoed");

    let missing = service.lookup(ArrayKind::Population, &allele("chr1", 1000, "A", "C")).unwrap();
    assert_eq!(missing, json!({ "variants": [] }));
}

#[test]
fn population_statistics() {
    let dir = TempDir::new().unwrap();
    let workspace = create_full_workspace(&dir);

    let exact = service(&workspace).population_stats().unwrap();
    assert_eq!(exact, json!({
        "total_variants": 3,
        "common_variants": 2,
        "rare_variants": 1,
        "array_available": true,
    }));

    // One of the two cells on chromosome 1 is common.
    let estimating = QueryService::open(&workspace, DaemonConfig::CACHE_TTL, 0);
    let estimate = estimating.population_stats().unwrap();
    assert_eq!(estimate["estimated"], json!(true));
    assert_eq!(estimate["total_variants"], json!(3));
    assert_eq!(estimate["common_variants"], json!(2));
    assert_eq!(estimate["rare_variants"], json!(1));
}

#[test]
fn clinical_lookup() {
    let dir = TempDir::new().unwrap();
    let workspace = create_full_workspace(&dir);
    let service = service(&workspace);

    let params = json!({ "chrom": "chr13", "pos": 32315474, "ref": "G", "alt": "A" });
    let response = service.execute(&Request::new("clinical_significance_lookup", params));
    let variant = &response["variants"][0];
    assert_eq!(variant["clinical_significance"], json!("Pathogenic"));
    assert_eq!(variant["review_status"], json!("reviewed by expert panel"));
    assert_eq!(variant["condition"], json!("Hereditary breast ovarian cancer syndrome"));
    assert_eq!(variant["gene_symbol"], json!("BRCA2"));
    assert_eq!(variant["url"], json!(ClinicalVariants::variation_url("52055")));
}

#[test]
fn genes_in_region() {
    let dir = TempDir::new().unwrap();
    let workspace = create_full_workspace(&dir);
    let service = service(&workspace);
    let names = |start: u32, end: u32| -> Vec<String> {
        let response = service.genes_in_region(&RegionQuery { chrom: 13, start, end }).unwrap();
        response["genes"].as_array().unwrap().iter().map(|gene| gene["gene_name"].as_str().unwrap().to_string()).collect()
    };

    assert_eq!(names(32_320_000, 32_330_000), vec![String::from("BRCA2")]);
    assert_eq!(names(32_290_000, 32_300_000), vec![String::from("ZAR1L")]);
    assert_eq!(names(32_315_000, 32_315_508), vec![String::from("ZAR1L")], "The interval is half-open");
    assert_eq!(names(32_315_000, 32_315_509), vec![String::from("ZAR1L"), String::from("BRCA2")]);
    assert!(names(32_400_269, 32_500_000).is_empty());

    let params = json!({ "chrom": "chr13", "start": 32320000, "end": 32330000 });
    let response = service.execute(&Request::new("genes_in_region", params));
    assert_eq!(response["count"], json!(1));
    let gene = &response["genes"][0];
    assert_eq!(gene["chrom"], json!("chr13"));
    assert_eq!(gene["start"], json!(32315508));
    assert_eq!(gene["end"], json!(32400268));
    assert_eq!(gene["transcript_count"], json!(1));
    assert_eq!(gene["is_clinical"], json!(true));
}

#[test]
fn missing_arrays() {
    let dir = TempDir::new().unwrap();
    let workspace = Workspace::new(dir.path());
    create_variants(&workspace, &variants_vcf());
    let service = service(&workspace);
    assert!(service.is_available(ArrayKind::Variants));
    assert!(!service.is_available(ArrayKind::Population));

    let params = json!({ "chrom": "chr1", "pos": 1000, "ref": "A", "alt": "G" });
    let response = service.execute(&Request::new("population_frequency_lookup", params.clone()));
    assert_eq!(response, json!({ "variants": [], "available": false }));
    let response = service.execute(&Request::new("clinical_significance_lookup", params));
    assert_eq!(response, json!({ "variants": [], "available": false }));
    let response = service.execute(&Request::new("genes_in_region", json!({ "chrom": "chr13" })));
    assert_eq!(response["available"], json!(false));

    let response = service.execute(&Request::new("population_frequency_stats", json!({})));
    assert_eq!(response["error"], json!("Population frequency array not available"));
    assert_eq!(response["array_available"], json!(false));

    let empty = QueryService::open(&Workspace::new(dir.path().join("empty")), DaemonConfig::CACHE_TTL, 0);
    let response = empty.execute(&Request::new("query_variants", json!({})));
    assert_eq!(response["error"], json!("Variants array not available"));
    assert_eq!(response["variants"], json!([]));
    let response = empty.execute(&Request::new("get_stats", json!({})));
    assert!(response["error"].is_string());
}

//-----------------------------------------------------------------------------

fn start_daemon(config: DaemonConfig) -> (ShutdownHandle, JoinHandle<Result<()>>) {
    let mut daemon = QueryDaemon::new(config);
    assert_eq!(daemon.state(), DaemonState::Init);
    let result = daemon.bind();
    assert!(result.is_ok(), "Failed to bind: {}", result.unwrap_err());
    assert_eq!(daemon.state(), DaemonState::Listening);
    let handle = daemon.shutdown_handle();
    let server = thread::spawn(move || daemon.run());
    (handle, server)
}

fn send(socket: &Path, operation: &str, params: JsonValue) -> JsonValue {
    let response = protocol::send_request(socket, &Request::new(operation, params));
    assert!(response.is_ok(), "Request {} failed: {}", operation, response.unwrap_err());
    response.unwrap()
}

#[test]
fn daemon_lifecycle() {
    let dir = TempDir::new().unwrap();
    let workspace = Workspace::new(dir.path().join("workspace"));
    create_variants(&workspace, &variants_vcf());
    let socket = dir.path().join("daemon.sock");
    let (handle, server) = start_daemon(DaemonConfig::new(workspace.root(), &socket));
    assert!(socket.exists(), "Socket was not created");

    let ping = send(&socket, "ping", json!({}));
    assert_eq!(ping["status"], json!("ok"));
    assert!(ping["uptime"].as_f64().unwrap() >= 0.0);

    let variants = send(&socket, "query_variants", json!({ "limit": 1 }));
    assert_eq!(variants["count"], json!(1));

    let lookup = send(&socket, "population_frequency_lookup", json!({ "chrom": "chr1", "pos": 1000, "ref": "A", "alt": "G" }));
    assert_eq!(lookup, json!({ "variants": [], "available": false }));

    let unknown = send(&socket, "frobnicate", json!({}));
    assert_eq!(unknown["error"], json!("Unknown operation: frobnicate"));

    // Raw request terminated by closing the write side.
    let mut stream = UnixStream::connect(&socket).unwrap();
    stream.write_all(b"{\"operation\": ").unwrap();
    stream.shutdown(Shutdown::Write).unwrap();
    let mut response = String::new();
    BufReader::new(stream).read_line(&mut response).unwrap();
    let response: JsonValue = serde_json::from_str(&response).unwrap();
    assert!(response["error"].is_string(), "Truncated request was accepted");

    handle.shutdown();
    handle.shutdown();
    let result = server.join().unwrap();
    assert!(result.is_ok(), "Daemon failed: {}", result.unwrap_err());
    assert_eq!(handle.state(), DaemonState::Exited);
    assert!(!socket.exists(), "Socket was not removed");
    assert!(protocol::send_request(&socket, &Request::new("ping", json!({}))).is_err());
}

#[test]
fn concurrent_clients() {
    let dir = TempDir::new().unwrap();
    let workspace = create_full_workspace(&dir);
    let socket = dir.path().join("daemon.sock");
    let (handle, server) = start_daemon(DaemonConfig::new(workspace.root(), &socket));

    let clients: Vec<_> = (0..8).map(|i| {
        let socket = socket.clone();
        thread::spawn(move || {
            let mut results = Vec::new();
            for _ in 0..5 {
                let response = if i % 2 == 0 {
                    send(&socket, "query_variants", json!({ "chrom": "chr1" }))["count"].clone()
                } else {
                    send(&socket, "allele_frequency", json!({ "chrom": "chr1", "pos": 1000, "ref": "A", "alt": "G" }))["frequency"].clone()
                };
                results.push(response);
            }
            results
        })
    }).collect();
    for (i, client) in clients.into_iter().enumerate() {
        let results = client.join().unwrap();
        for result in results {
            if i % 2 == 0 {
                assert_eq!(result, json!(2));
            } else {
                assert!((result.as_f64().unwrap() - 7.0 / 12.0).abs() < 1e-9);
            }
        }
    }

    handle.shutdown();
    assert!(server.join().unwrap().is_ok());
    assert_eq!(handle.state(), DaemonState::Exited);
}

#[test]
fn shutdown_before_run() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("daemon.sock");
    let mut daemon = QueryDaemon::new(DaemonConfig::new(dir.path(), &socket));
    let handle = daemon.shutdown_handle();
    handle.shutdown();
    assert!(handle.is_shutdown());
    assert!(daemon.run().is_ok());
    assert_eq!(daemon.state(), DaemonState::Exited);
    assert!(!socket.exists());
    assert!(daemon.bind().is_err(), "Bound a socket after shutdown");
}

#[test]
fn stale_socket_is_replaced() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("daemon.sock");
    std::fs::write(&socket, b"").unwrap();
    let (handle, server) = start_daemon(DaemonConfig::new(dir.path(), &socket));
    assert_eq!(send(&socket, "ping", json!({}))["status"], json!("ok"));
    handle.shutdown();
    assert!(server.join().unwrap().is_ok());
    assert!(!socket.exists());
}

#[test]
fn request_without_terminator() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("daemon.sock");
    let (handle, server) = start_daemon(DaemonConfig::new(dir.path(), &socket));

    // The client keeps its write side open while it waits for the response.
    let mut stream = UnixStream::connect(&socket).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    stream.write_all(b"{\"operation\": \"ping\", \"params\": {}}").unwrap();
    let mut response = String::new();
    let result = BufReader::new(&stream).read_line(&mut response);
    assert!(result.is_ok(), "No response to a complete request: {}", result.unwrap_err());
    let response: JsonValue = serde_json::from_str(&response).unwrap();
    assert_eq!(response["status"], json!("ok"));
    drop(stream);

    handle.shutdown();
    assert!(server.join().unwrap().is_ok());
}

#[test]
fn stalled_clients_do_not_block_shutdown() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("daemon.sock");
    let mut config = DaemonConfig::new(dir.path(), &socket);
    config.client_timeout = Duration::from_millis(200);
    let (handle, server) = start_daemon(config);

    let idle = UnixStream::connect(&socket).unwrap();
    let mut partial = UnixStream::connect(&socket).unwrap();
    partial.write_all(b"{\"operation\": \"pi").unwrap();
    // Connections are accepted in order, so both have a worker after this.
    assert_eq!(send(&socket, "ping", json!({}))["status"], json!("ok"));

    let start = Instant::now();
    handle.shutdown();
    let result = server.join().unwrap();
    assert!(result.is_ok(), "Daemon failed: {}", result.unwrap_err());
    assert_eq!(handle.state(), DaemonState::Exited);
    assert!(start.elapsed() < Duration::from_secs(10), "Draining waited for stalled clients");

    let mut response = String::new();
    BufReader::new(&partial).read_line(&mut response).unwrap();
    let response: JsonValue = serde_json::from_str(&response).unwrap();
    assert!(response["error"].is_string(), "Stalled client did not get an error response");
    drop(idle);
}

#[test]
fn request_framing() {
    let request = protocol::read_request(&b"{\"operation\": \"ping\"}\n{\"ignored\": 1}"[..]).unwrap();
    assert_eq!(request.operation, "ping");
    let request = protocol::read_request(&b"  {\"operation\": \"get_stats\", \"params\": {}}"[..]).unwrap();
    assert_eq!(request.operation, "get_stats");

    let invalid: [&[u8]; 4] = [
        &b""[..],
        &b"{\"operation\": "[..],
        &b"[1, 2]"[..],
        &b"{\"operation\": \"ping\", \"params\": 3}"[..],
    ];
    for data in invalid {
        let result = protocol::read_request(data);
        assert!(matches!(result, Err(Error::Protocol(_))), "Accepted {:?}", String::from_utf8_lossy(data));
    }

    let large = vec![b' '; protocol::MAX_REQUEST_SIZE + 1];
    match protocol::read_request(&large[..]) {
        Err(Error::Protocol(message)) => assert!(message.contains("exceeds"), "Wrong error: {}", message),
        _ => panic!("Oversized request was accepted"),
    }
    let suffix = b"\"}}";
    let mut exact = b"{\"operation\": \"ping\", \"params\": {\"padding\": \"".to_vec();
    exact.resize(protocol::MAX_REQUEST_SIZE - suffix.len(), b'x');
    exact.extend_from_slice(suffix);
    exact.push(b'\n');
    let request = protocol::read_request(&exact[..]);
    assert!(request.is_ok(), "Request of the maximum size was rejected: {}", request.unwrap_err());
    assert_eq!(request.unwrap().operation, "ping");
}

#[test]
fn operation_names() {
    for operation in Operation::ALL {
        assert_eq!(Operation::from_name(operation.name()), Some(operation));
    }
    assert_eq!(Operation::from_name("Ping"), None);
}

//-----------------------------------------------------------------------------
