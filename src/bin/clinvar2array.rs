use genome_base::{ingest, logging, maintenance};
use genome_base::{ArrayKind, ClinicalVariants, Dataset, IngestParams, Workspace};

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

    let workspace = Workspace::new(&config.workspace);
    let input = config.input.clone().unwrap_or_else(|| workspace.root().join("clinvar_data").join("clinvar.vcf.gz"));
    eprintln!("Processing ClinVar file {}", input.display());

    let mut dataset = ClinicalVariants::new();
    let path = workspace.array_path(ArrayKind::Clinical);
    let mut writer = ingest::open_array(&path, &dataset.schema(), config.overwrite)?;
    let report = ingest::ingest_file(&mut dataset, &input, &mut writer, config.params.clone())?;
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
        opts.optflag("", "overwrite", "replace the array if it exists");
        opts.optflag("", "optimize", "consolidate the array after ingestion");
        opts.optflag("v", "verbose", "print progress information");
        let header = format!("Usage: {} [options] workspace [clinvar.vcf.gz]", program);
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
            overwrite: matches.opt_present("overwrite"),
            optimize: matches.opt_present("optimize"),
            verbose: matches.opt_present("v"),
        }
    }
}

//-----------------------------------------------------------------------------
