use clap::{Arg, ArgAction, Command};
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

const DEFAULT_CONFIG: &str = "config/salesmart.toml";

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .default_value(DEFAULT_CONFIG)
        .help("Sets a custom config file")
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let matches = Command::new("Sales Mart Pipeline")
        .version("1.0")
        .about("Builds the weekly sales mart from point-of-sale tables")
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("run")
                .about("Load, validate, normalize, curate, aggregate and publish")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("validate")
                .about("Load the source tables and run the fact quality checks")
                .arg(config_arg()),
        )
        .get_matches();

    init_tracing(matches.get_flag("json-logs"));

    let (command, sub_matches) = match matches.subcommand() {
        Some((name, sub)) => (name, sub),
        None => {
            eprintln!("No subcommand specified. Use --help for usage information.");
            process::exit(1);
        }
    };

    let config_path = sub_matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or(DEFAULT_CONFIG);
    info!(command, config = config_path, "Starting salesmart");

    let result = match command {
        "run" => salesmart::run_sales_pipeline(config_path).await,
        "validate" => salesmart::run_validation(config_path).await,
        other => {
            eprintln!("Unknown subcommand {}", other);
            process::exit(1);
        }
    };

    match result {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!(error = %e, "Failed to render run report");
                process::exit(1);
            }
        },
        Err(e) => {
            error!(error = %e, "Pipeline failed");
            process::exit(e.exit_code());
        }
    }
}
