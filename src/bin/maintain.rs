use genome_base::maintenance::{self, ArrayInfo};
use genome_base::store::SparseArray;
use genome_base::{logging, Workspace};

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
    if !workspace.root().is_dir() {
        return Err(format!("Workspace {} does not exist", workspace.root().display()));
    }

    let failed = match &config.command {
        Command::Info => info(&workspace, config.json)?,
        Command::Optimize => optimize(&workspace, config.json)?,
        Command::Array(relative) => {
            let path = workspace.root().join(relative);
            let mut info = maintenance::array_info(&path)?;
            info.name = relative.display().to_string();
            if config.json {
                println!("{}", serde_json::to_string_pretty(&info).map_err(|x| x.to_string())?);
            } else {
                print_info(&info);
            }
            false
        },
        Command::Unlock(relative) => {
            let path = workspace.root().join(relative);
            match SparseArray::unlock(&path)? {
                Some(owner) => println!("{}: removed a lock held by process {}", relative.display(), owner),
                None => println!("{}: not locked", relative.display()),
            }
            false
        },
    };

    let end_time = Instant::now();
    let seconds = end_time.duration_since(start_time).as_secs_f64();
    eprintln!("Used {:.3} seconds", seconds);

    if failed {
        process::exit(1);
    }
    Ok(())
}

// Returns `true` if some arrays could not be read.
fn info(workspace: &Workspace, json: bool) -> Result<bool, String> {
    let summary = maintenance::workspace_summary(workspace)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary).map_err(|x| x.to_string())?);
    } else {
        if summary.arrays.is_empty() && summary.errors.is_empty() {
            println!("No arrays found in {}", workspace.root().display());
        }
        for info in summary.arrays.iter() {
            print_info(info);
        }
        for (name, message) in summary.errors.iter() {
            println!("{}: {}", name, message);
        }
        println!("Total size: {}", genome_base::utils::human_readable_size(summary.total_bytes));
    }
    Ok(!summary.errors.is_empty())
}

// Returns `true` if some arrays could not be optimized.
fn optimize(workspace: &Workspace, json: bool) -> Result<bool, String> {
    let results = maintenance::optimize_workspace(workspace)?;
    let failures = results.iter().filter(|x| !x.success).count();
    if json {
        println!("{}", serde_json::to_string_pretty(&results).map_err(|x| x.to_string())?);
    } else {
        for result in results.iter() {
            if let Some(error) = result.error.as_ref() {
                println!("{}: failed: {}", result.name, error);
                continue;
            }
            match (result.before.as_ref(), result.after.as_ref()) {
                (Some(before), Some(after)) => println!(
                    "{}: {} fragments -> {}, {} -> {}",
                    result.name, before.fragment_count, after.fragment_count, before.size, after.size
                ),
                _ => println!("{}: optimized", result.name),
            }
        }
        println!("Optimized {} of {} arrays", results.len() - failures, results.len());
    }
    Ok(failures > 0)
}

fn print_info(info: &ArrayInfo) {
    println!("{}", info.name);
    println!("  Size:       {}", info.size);
    println!("  Fragments:  {}", info.fragment_count);
    println!("  Dimensions: {}", info.dimensions);
    println!("  Attributes: {}", info.attributes);
    println!("  Cells:      {}", info.cells);
}

//-----------------------------------------------------------------------------

enum Command {
    Info,
    Optimize,
    Array(PathBuf),
    Unlock(PathBuf),
}

struct Config {
    workspace: PathBuf,
    command: Command,
    json: bool,
    verbose: bool,
}

impl Config {
    fn new() -> Config {
        let args: Vec<String> = env::args().collect();
        let program = args[0].clone();

        let mut opts = Options::new();
        opts.optflag("h", "help", "print this help");
        opts.optflag("j", "json", "print the report as JSON");
        opts.optflag("v", "verbose", "print progress information");
        let header = format!(
            "Usage: {} [options] workspace [info | optimize | array path | unlock path]\n\n\
            info      report all arrays in the workspace (default)\n\
            optimize  consolidate and vacuum all arrays\n\
            array     report the array at the path relative to the workspace\n\
            unlock    remove the writer lock left behind by a crashed writer",
            program
        );
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

        let free: Vec<&str> = matches.free.iter().map(|x| x.as_str()).collect();
        let command = match free.get(1..) {
            Some([]) | Some(["info"]) => Command::Info,
            Some(["optimize"]) => Command::Optimize,
            Some(["array", path]) => Command::Array(PathBuf::from(*path)),
            Some(["unlock", path]) => Command::Unlock(PathBuf::from(*path)),
            _ => {
                eprint!("{}", opts.usage(&header));
                process::exit(1);
            }
        };

        Config {
            workspace: PathBuf::from(free[0]),
            command,
            json: matches.opt_present("j"),
            verbose: matches.opt_present("v"),
        }
    }
}

//-----------------------------------------------------------------------------
