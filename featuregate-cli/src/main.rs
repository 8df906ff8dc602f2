//! FeatureGate license tool
//!
//! Inspects license state on the current machine:
//!   featuregate fingerprint          print this machine's fingerprint
//!   featuregate verify               run the verification pipeline
//!   featuregate canonicalize <file>  print the signed payload of a license
//!   featuregate gate <features.json> show which features would load
//!   featuregate rehost --out <file>  write a rehost request after a hardware change
//!
//! Log output goes to stderr so `--json` output can be piped.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use featuregate_cli::{
    canonicalize_file, fingerprint_report, gate_report, load_descriptors, verify_report,
    write_rehost,
};
use featuregate_license::{LicensingConfig, LicensingService};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "featuregate")]
#[command(about = "Offline license verification and feature gating tool")]
struct Args {
    /// Licensing config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the fingerprint of this machine
    Fingerprint,
    /// Verify the installed license
    Verify,
    /// Print the canonical payload of a license file
    Canonicalize {
        /// License file
        file: PathBuf,
    },
    /// Gate a JSON array of feature descriptors against the installed license
    Gate {
        /// Descriptor file
        descriptors: PathBuf,
    },
    /// Write a rehost request if this machine is not licensed
    Rehost {
        /// Why the hardware changed
        #[arg(short, long, default_value = "hardware change")]
        reason: String,
        /// Output file
        #[arg(short, long, default_value = "rehost-request.json")]
        out: PathBuf,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<LicensingConfig> {
    let path = args.config.clone().unwrap_or_else(LicensingConfig::default_path);
    debug!("Using licensing config {}", path.display());
    LicensingConfig::load_from(&path).with_context(|| format!("loading {}", path.display()))
}

fn service(args: &Args) -> Result<LicensingService> {
    let config = load_config(args)?;
    LicensingService::from_config(&config).context("building licensing service")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(args: &Args) -> Result<ExitCode> {
    match &args.command {
        Command::Fingerprint => {
            let provider = load_config(args)?.fingerprint_provider();
            let report = fingerprint_report(&provider);
            if args.json {
                print_json(&report)?;
            } else {
                println!("MG    {}", report.machine_guid.as_deref().unwrap_or("-"));
                println!("UUID  {}", report.bios_uuid.as_deref().unwrap_or("-"));
                println!("MB    {}", report.baseboard_serial.as_deref().unwrap_or("-"));
                println!("digest {}", report.digest);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify => {
            let report = verify_report(&service(args)?);
            if args.json {
                print_json(&report)?;
            } else {
                println!("status   {}", report.status);
                println!("message  {}", report.message);
                if let Some(id) = &report.license_id {
                    println!("license  {id}");
                }
                if let Some(until) = &report.valid_until {
                    println!("until    {until}");
                }
                if report.is_valid() {
                    println!("features {}", report.entitled_features.join(", "));
                }
            }
            Ok(if report.is_valid() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
        Command::Canonicalize { file } => {
            let payload = canonicalize_file(file)?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&payload)?;
            stdout.write_all(b"\n")?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Gate { descriptors } => {
            let descriptors = load_descriptors(descriptors)?;
            let report = gate_report(&service(args)?, &descriptors);
            if args.json {
                print_json(&report)?;
            } else {
                for decision in report.allowed.iter().chain(&report.blocked) {
                    let verdict = if decision.allowed { "allow" } else { "deny " };
                    println!(
                        "{verdict} {:<24} {:<22} {}",
                        decision.feature_code,
                        decision.reason.as_str(),
                        decision.message
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Rehost { reason, out } => {
            let service = service(args)?;
            match write_rehost(&service, reason, out)? {
                Some(request) => {
                    if args.json {
                        print_json(&request)?;
                    } else {
                        println!("Rehost request {} written to {}", request.request_id, out.display());
                    }
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!(
                        "No rehost needed: license status is {}",
                        service.cached_status()
                    );
                    Ok(ExitCode::from(2))
                }
            }
        }
    }
}
