use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storekeep::config::Config;
use storekeep::models::FollowUpAction;
use storekeep::validator::{LoggingDelegate, ReceiptValidator, ValidationReport};

#[derive(Parser, Debug)]
#[command(name = "storekeep")]
#[command(about = "Validate an in-app purchase receipt against a validation server")]
struct Cli {
    /// Receipt file to validate (overrides STOREKEEP_RECEIPT_PATH)
    #[arg(long)]
    receipt: Option<PathBuf>,

    /// Validation endpoint URL (overrides STOREKEEP_VALIDATION_URL)
    #[arg(long)]
    endpoint: Option<String>,

    /// Application bundle identifier (overrides STOREKEEP_BUNDLE_ID)
    #[arg(long)]
    bundle_id: Option<String>,

    /// Validate against the sandbox environment
    #[arg(long)]
    sandbox: bool,

    /// Report as part of a restore
    #[arg(long)]
    restoring: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn override_for(&self, key: &str) -> Option<String> {
        match key {
            "STOREKEEP_RECEIPT_PATH" => self.receipt.as_ref().map(|p| p.display().to_string()),
            "STOREKEEP_VALIDATION_URL" => self.endpoint.clone(),
            "STOREKEEP_BUNDLE_ID" => self.bundle_id.clone(),
            "STOREKEEP_SANDBOX" if self.sandbox => Some("true".to_string()),
            _ => None,
        }
    }
}

fn exit_code(report: &ValidationReport) -> ExitCode {
    match report.action {
        FollowUpAction::Pass | FollowUpAction::Tolerate => ExitCode::SUCCESS,
        FollowUpAction::Terminate => ExitCode::from(1),
        FollowUpAction::ReRun => ExitCode::from(2),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storekeep=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();
    let lookup = |key: &str| cli.override_for(key).or_else(|| env::var(key).ok());
    let config = match Config::from_lookup(lookup) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return ExitCode::from(64);
        }
    };

    let validator = match ReceiptValidator::new(config.validation, Arc::new(LoggingDelegate)) {
        Ok(validator) => validator,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return ExitCode::from(70);
        }
    };

    tracing::info!(
        "Validating receipt against {} (sandbox: {})",
        validator.config().endpoint,
        validator.config().sandbox
    );
    let report = validator.validate(cli.restoring).await;

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("ERROR: {}", e);
                return ExitCode::from(70);
            }
        }
    } else {
        println!("outcome:        {}", report.outcome);
        println!("action:         {}", report.action);
        println!("should_refresh: {}", report.should_refresh);
        if let Some(hint) = &report.presentation_hint {
            println!("message:        {}", hint);
        }
    }

    exit_code(&report)
}
