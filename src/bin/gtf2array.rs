use genome_base::{ingest, logging, maintenance};
use genome_base::{ArrayKind, Dataset, GeneFeatures, GeneRegions, IngestParams, Workspace};

use std::path::{Path, PathBuf};
use std::time::Instant;
use std::{env, fs, process};

use getopts::Options;

//-----------------------------------------------------------------------------

fn main() -> Result<(), String> {
    let start_time = Instant::now();

    // Parse arguments.
    let config = Config::new();
    logging::init_logger(config.verbose);

    let workspace = Workspace::new(&config.workspace);
    let input = match config.input.clone() {
        Some(input) => input,
        None => find_gtf(&workspace.root().join("gene_annotations"))?,
    };
    eprintln!("Processing GTF file {}", input.display());

    // Gene features.
    let mut features = GeneFeatures::new();
    let features_path = workspace.array_path(ArrayKind::GeneFeatures);
    let mut writer = ingest::open_array(&features_path, &features.schema(), config.overwrite)?;
    let report = ingest::ingest_file(&mut features, &input, &mut writer, config.params.clone())?;
    drop(writer);
    let read_error = report.read_error.clone();
    eprintln!("Gene features:");
    for line in report.summary() {
        eprintln!("  {}", line);
    }

    // Gene regions collected from the features.
    let mut regions = GeneRegions::new();
    let regions_path = workspace.array_path(ArrayKind::GeneRegions);
    let mut writer = ingest::open_array(&regions_path, &regions.schema(), config.overwrite)?;
    let records = features.regions().into_iter().map(|region| Ok(vec![region]));
    let report = ingest::ingest_records(&mut regions, records, &mut writer, config.params.clone())?;
    drop(writer);
    eprintln!("Gene regions:");
    for line in report.summary() {
        eprintln!("  {}", line);
    }

    for path in [&features_path, &regions_path] {
        if config.optimize {
            maintenance::optimize_array(path)?;
        }
        let info = maintenance::array_info(path)?;
        eprintln!("Array {} has {} cells in {} fragments ({})", path.display(), info.cells, info.fragment_count, info.size);
    }

    let end_time = Instant::now();
    let seconds = end_time.duration_since(start_time).as_secs_f64();
    eprintln!("Used {:.3} seconds", seconds);

    if let Some(error) = read_error {
        return Err(format!("Input ended early: {}", error));
    }
    Ok(())
}

// Returns the first GTF file in the directory by name.
fn find_gtf(dir: &Path) -> Result<PathBuf, String> {
    let entries = fs::read_dir(dir).map_err(|x| format!("Cannot read {}: {}", dir.display(), x))?;
    let mut candidates: Vec<PathBuf> = entries.flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            let name = path.file_name().map(|x| x.to_string_lossy().to_string()).unwrap_or_default();
            name.ends_with(".gtf") || name.ends_with(".gtf.gz")
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next().ok_or(format!("No GTF files found in {}", dir.display()))
}

//-----------------------------------------------------------------------------

struct Config {
    workspace: PathBuf,
    input: Option<PathBuf>,
    params: IngestParams,
    overwrite: bool,
    optimize: bool,
    verbose: bool,
}

impl Config {
    fn new() -> Config {
        let args: Vec<String> = env::args().collect();
        let program = args[0].clone();

        let mut opts = Options::new();
        opts.optflag("h", "help", "print this help");
        opts.optopt("b", "batch-size", &format!("cells per write (default: {})", IngestParams::BATCH_SIZE), "INT");
        opts.optflag("", "append", "add to existing arrays instead of replacing them");
        opts.optflag("", "optimize", "consolidate the arrays after ingestion");
        opts.optflag("v", "verbose", "print progress information");
        let header = format!("Usage: {} [options] workspace [annotation.gtf.gz]", program);
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

        let workspace = if let Some(s) = matches.free.first() {
            PathBuf::from(s)
        } else {
            eprint!("{}", opts.usage(&header));
            process::exit(1);
        };

        Config {
            workspace,
            input: matches.free.get(1).map(PathBuf::from),
            params,
            overwrite: !matches.opt_present("append"),
            optimize: matches.opt_present("optimize"),
            verbose: matches.opt_present("v"),
        }
    }
}

//-----------------------------------------------------------------------------
