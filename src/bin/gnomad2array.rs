use genome_base::{ingest, logging, maintenance, utils};
use genome_base::{ArrayKind, Dataset, IngestParams, PopulationFrequencies, Workspace};

use std::path::PathBuf;
use std::time::Instant;
use std::{env, process};

use getopts::Options;

//-----------------------------------------------------------------------------

fn main() -> Result<(), String> {
    let start_time = Instant::now();

    // Parse arguments.
    let config = Config::new();
    logging::init_logger(config.verbose);

    // Find the input files.
    let workspace = Workspace::new(&config.workspace);
    let inputs = if config.inputs.is_empty() {
        config.chromosome_files(&workspace)
    } else {
        config.inputs.clone()
    };
    if inputs.is_empty() {
        return Err(format!("No gnomAD files found in {}", config.data_dir(&workspace).display()));
    }
    eprintln!("Processing {} gnomAD file(s)", inputs.len());

    // Ingest the files as a single run.
    let mut dataset = PopulationFrequencies::new();
    let path = workspace.array_path(ArrayKind::Population);
    let mut writer = ingest::open_array(&path, &dataset.schema(), config.overwrite)?;
    let report = ingest::ingest_files(&mut dataset, &inputs, &mut writer, config.params.clone())?;
    drop(writer);
    for line in report.summary() {
        eprintln!("{}", line);
    }

    if config.optimize {
        let fragments = maintenance::optimize_array(&path)?;
        eprintln!("Merged {} fragments", fragments);
    }
    let info = maintenance::array_info(&path)?;
    eprintln!("Array {} has {} cells in {} fragments ({})", path.display(), info.cells, info.fragment_count, info.size);

    let end_time = Instant::now();
    let seconds = end_time.duration_since(start_time).as_secs_f64();
    eprintln!("Used {:.3} seconds", seconds);

    if let Some(error) = report.read_error {
        return Err(format!("Input ended early: {}", error));
    }
    Ok(())
}

//-----------------------------------------------------------------------------

struct Config {
    workspace: PathBuf,
    inputs: Vec<PathBuf>,
    data_dir: Option<PathBuf>,
    chromosomes: Vec<String>,
    params: IngestParams,
    overwrite: bool,
    optimize: bool,
    verbose: bool,
}

impl Config {
    const DATA_DIR: &'static str = "gnomad_data";

    fn new() -> Config {
        let args: Vec<String> = env::args().collect();
        let program = args[0].clone();

        let mut opts = Options::new();
        opts.optflag("h", "help", "print this help");
        opts.optopt("d", "data-dir", "directory of per-chromosome files (default: <workspace>/gnomad_data)", "DIR");
        opts.optopt("c", "chromosomes", "comma-separated chromosomes to process (default: all available)", "LIST");
        opts.optopt("b", "batch-size", &format!("cells per write (default: {})", IngestParams::BATCH_SIZE), "INT");
        opts.optflag("", "release", "forget allele indexes of finished chromosomes (sorted input only)");
        opts.optflag("", "overwrite", "replace the array if it exists");
        opts.optflag("", "optimize", "consolidate the array after ingestion");
        opts.optflag("v", "verbose", "print progress information");
        let header = format!("Usage: {} [options] workspace [sites.vcf.gz ...]", program);
        let matches = match opts.parse(&args[1..]) {
            Ok(m) => m,
            Err(f) => {
                eprintln!("{}", f);
                process::exit(1);
            }
        };
        if matches.opt_present("h") {
            eprint!("{}", opts.usage(&header));
            process::exit(0);
        }

        let mut params = IngestParams::default();
        if let Some(s) = matches.opt_str("b") {
            match s.parse::<usize>() {
                Ok(n) if n > 0 => params.batch_size = n,
                _ => {
                    eprintln!("--batch-size: invalid value {}", s);
                    process::exit(1);
                }
            }
        }
        params.release_finished_chromosomes = matches.opt_present("release");

        let chromosomes = match matches.opt_str("c") {
            Some(s) => s.split(',').map(|x| x.trim().trim_start_matches("chr").to_string()).filter(|x| !x.is_empty()).collect(),
            None => Vec::new(),
        };

        let workspace = if let Some(s) = matches.free.first() {
            PathBuf::from(s)
        } else {
            eprint!("{}", opts.usage(&header));
            process::exit(1);
        };
        let inputs = matches.free.iter().skip(1).map(PathBuf::from).collect();

        Config {
            workspace,
            inputs,
            data_dir: matches.opt_str("d").map(PathBuf::from),
            chromosomes,
            params,
            overwrite: matches.opt_present("overwrite"),
            optimize: matches.opt_present("optimize"),
            verbose: matches.opt_present("v"),
        }
    }

    fn data_dir(&self, workspace: &Workspace) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| workspace.root().join(Self::DATA_DIR))
    }

    // Per-chromosome files in the data directory, in chromosome order.
    fn chromosome_files(&self, workspace: &Workspace) -> Vec<PathBuf> {
        let chromosomes: Vec<String> = if self.chromosomes.is_empty() {
            (1..=22).map(|x| x.to_string()).chain(["X", "Y"].iter().map(|x| x.to_string())).collect()
        } else {
            self.chromosomes.clone()
        };
        let dir = self.data_dir(workspace);
        let mut result = Vec::new();
        for chrom in chromosomes {
            let filename = dir.join(format!("gnomad.joint.v4.1.sites.chr{}.vcf.bgz", chrom));
            if utils::file_exists(&filename) {
                result.push(filename);
            } else if !self.chromosomes.is_empty() {
                eprintln!("Warning: no file for chromosome {}: {}", chrom, filename.display());
            }
        }
        result
    }
}

//-----------------------------------------------------------------------------
