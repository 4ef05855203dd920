use genome_base::daemon::{protocol, Operation, Request};

use std::path::PathBuf;
use std::{env, process};

use getopts::Options;
use serde_json::{Map, Value as JsonValue};

//-----------------------------------------------------------------------------

fn main() -> Result<(), String> {
    // Parse arguments.
    let config = Config::new()?;

    let request = Request::new(&config.operation, config.params.clone());
    let response = protocol::send_request(&config.socket, &request)?;
    let output = if config.compact {
        serde_json::to_string(&response)
    } else {
        serde_json::to_string_pretty(&response)
    };
    println!("{}", output.map_err(|x| x.to_string())?);

    if response.get("error").is_some() {
        process::exit(2);
    }
    Ok(())
}

//-----------------------------------------------------------------------------

struct Config {
    socket: PathBuf,
    operation: String,
    params: JsonValue,
    compact: bool,
}

impl Config {
    fn new() -> Result<Config, String> {
        let args: Vec<String> = env::args().collect();
        let program = args[0].clone();

        let mut opts = Options::new();
        opts.optflag("h", "help", "print this help");
        opts.optopt("j", "json", "request parameters as a JSON object", "JSON");
        opts.optflag("c", "compact", "print the response on a single line");
        let operations: Vec<&str> = Operation::ALL.iter().map(|x| x.name()).collect();
        let header = format!(
            "Usage: {} [options] socket operation [key=value ...]\n\nOperations: {}",
            program, operations.join(", ")
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

        if matches.free.len() < 2 {
            eprint!("{}", opts.usage(&header));
            process::exit(1);
        }

        let mut params = match matches.opt_str("j") {
            Some(s) => match serde_json::from_str::<JsonValue>(&s) {
                Ok(JsonValue::Object(map)) => map,
                Ok(_) => return Err(String::from("--json: parameters must be a JSON object")),
                Err(f) => return Err(format!("--json: {}", f)),
            },
            None => Map::new(),
        };
        for arg in matches.free.iter().skip(2) {
            let (key, value) = arg.split_once('=').ok_or(format!("Invalid parameter {}, expected key=value", arg))?;
            params.insert(key.to_string(), parse_value(key, value));
        }

        Ok(Config {
            socket: PathBuf::from(&matches.free[0]),
            operation: matches.free[1].clone(),
            params: JsonValue::Object(params),
            compact: matches.opt_present("c"),
        })
    }
}

// Chromosomes and alleles are always strings.
const STRING_PARAMS: [&str; 3] = ["chrom", "ref", "alt"];

fn parse_value(key: &str, value: &str) -> JsonValue {
    if STRING_PARAMS.contains(&key) {
        JsonValue::from(value)
    } else if let Ok(n) = value.parse::<u64>() {
        JsonValue::from(n)
    } else if let Ok(x) = value.parse::<f64>() {
        JsonValue::from(x)
    } else {
        JsonValue::from(value)
    }
}

//-----------------------------------------------------------------------------
