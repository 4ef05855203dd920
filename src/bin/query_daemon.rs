use genome_base::daemon::DaemonState;
use genome_base::workspace::ArrayKind;
use genome_base::{logging, DaemonConfig, QueryDaemon};

use std::path::PathBuf;
use std::time::{Duration, Instant};
use std::{env, process, thread};

use getopts::Options;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

//-----------------------------------------------------------------------------

fn main() -> Result<(), String> {
    let start_time = Instant::now();

    // Parse arguments.
    let config = Config::new();
    logging::init_logger(true);

    let mut daemon_config = DaemonConfig::new(&config.workspace, &config.socket);
    if let Some(ttl) = config.cache_ttl {
        daemon_config.cache_ttl = ttl;
    }
    if let Some(limit) = config.population_estimate_limit {
        daemon_config.population_estimate_limit = limit;
    }
    if let Some(timeout) = config.client_timeout {
        daemon_config.client_timeout = timeout;
    }

    let mut daemon = QueryDaemon::new(daemon_config);
    for kind in ArrayKind::ALL {
        if daemon.service().is_available(kind) {
            log::info!("{} array available", kind);
        } else {
            log::warn!("{} array not available", kind);
        }
    }

    // Drain on SIGINT / SIGTERM.
    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|x| format!("Cannot install signal handlers: {}", x))?;
    let handle = daemon.shutdown_handle();
    thread::spawn(move || {
        for signal in signals.forever() {
            log::info!("Received signal {}, shutting down", signal);
            handle.shutdown();
        }
    });

    daemon.run()?;
    if daemon.state() != DaemonState::Exited {
        return Err(String::from("The daemon did not shut down cleanly"));
    }

    let end_time = Instant::now();
    let seconds = end_time.duration_since(start_time).as_secs_f64();
    eprintln!("Used {:.3} seconds", seconds);

    Ok(())
}

//-----------------------------------------------------------------------------

struct Config {
    workspace: PathBuf,
    socket: PathBuf,
    cache_ttl: Option<Duration>,
    population_estimate_limit: Option<usize>,
    client_timeout: Option<Duration>,
}

impl Config {
    fn new() -> Config {
        let args: Vec<String> = env::args().collect();
        let program = args[0].clone();

        let mut opts = Options::new();
        opts.optflag("h", "help", "print this help");
        let ttl_desc = format!("cache statistics for N seconds (default: {})", DaemonConfig::CACHE_TTL.as_secs());
        opts.optopt("t", "ttl", &ttl_desc, "N");
        let limit_desc = format!(
            "estimate population statistics above N cells (default: {})",
            DaemonConfig::POPULATION_ESTIMATE_LIMIT
        );
        opts.optopt("e", "estimate-limit", &limit_desc, "N");
        let timeout_desc = format!(
            "drop clients that stall for N seconds, 0 to wait forever (default: {})",
            DaemonConfig::CLIENT_TIMEOUT.as_secs()
        );
        opts.optopt("c", "client-timeout", &timeout_desc, "N");
        let header = format!("Usage: {} [options] workspace socket", program);
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

        let cache_ttl = matches.opt_str("t").map(|s| match s.parse::<u64>() {
            Ok(n) => Duration::from_secs(n),
            Err(f) => {
                eprintln!("--ttl: {}", f);
                process::exit(1);
            }
        });
        let population_estimate_limit = matches.opt_str("e").map(|s| match s.parse::<usize>() {
            Ok(n) => n,
            Err(f) => {
                eprintln!("--estimate-limit: {}", f);
                process::exit(1);
            }
        });
        let client_timeout = matches.opt_str("c").map(|s| match s.parse::<u64>() {
            Ok(n) => Duration::from_secs(n),
            Err(f) => {
                eprintln!("--client-timeout: {}", f);
                process::exit(1);
            }
        });

        if matches.free.len() != 2 {
            eprint!("{}", opts.usage(&header));
            process::exit(1);
        }

        Config {
            workspace: PathBuf::from(&matches.free[0]),
            socket: PathBuf::from(&matches.free[1]),
            cache_ttl,
            population_estimate_limit,
            client_timeout,
        }
    }
}

//-----------------------------------------------------------------------------
