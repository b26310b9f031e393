//! Broker binary
//!
//! Usage: `topicast -p <pub_port> -s <sub_port>`
//!
//! Flags may appear in either order; both are required. Everything beyond
//! argument parsing, log setup, and signal wiring lives in the library.

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use topicast::{Broker, BrokerConfig};

const USAGE: &str = "Broker runs as follows: topicast -p <pub_port> -s <sub_port>";

fn parse_args(args: &[String]) -> Result<BrokerConfig, String> {
    if args.len() != 4 {
        return Err("Invalid arguments".to_string());
    }

    let mut pub_port: Option<u16> = None;
    let mut sub_port: Option<u16> = None;

    for pair in args.chunks(2) {
        let (flag, value) = (&pair[0], &pair[1]);
        let port: u16 = value
            .parse()
            .map_err(|_| format!("Value '{}' is not a valid port", value))?;
        match flag.as_str() {
            "-p" => pub_port = Some(port),
            "-s" => sub_port = Some(port),
            other => return Err(format!("Unknown argument: '{}'", other)),
        }
    }

    match (pub_port, sub_port) {
        (Some(p), Some(s)) => Ok(BrokerConfig::with_ports(p, s)),
        _ => Err("Invalid arguments".to_string()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match parse_args(&args) {
        Ok(config) => config,
        Err(reason) => {
            eprintln!("{}", reason);
            eprintln!("{}", USAGE);
            return ExitCode::FAILURE;
        }
    };

    let bound = match Broker::new(config).bind().await {
        Ok(bound) => bound,
        Err(e) => {
            tracing::error!(error = %e, "Broker startup failed");
            return ExitCode::FAILURE;
        }
    };

    let result = bound
        .run_until(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Broker stopped with error");
            ExitCode::FAILURE
        }
    }
}
