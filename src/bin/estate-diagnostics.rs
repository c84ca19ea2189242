//! Check that the configured Firebase project is reachable
//!
//! Reads `NEXT_PUBLIC_FIREBASE_*` from the environment (and `.env` if
//! present), prints the configuration with the API key masked, runs every
//! diagnostic check and exits non-zero if any check failed.

use estate_firebase::{run_diagnostics, FirebaseApp, FirebaseConfig};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,estate_firebase=debug";

#[tokio::main]
async fn main() -> ExitCode {
    let config = FirebaseConfig::from_dotenv();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(env_filter)
        .init();

    println!("Firebase configuration");
    println!("  project:     {}", config.project_id);
    println!("  api key:     {}", config.masked_api_key());
    println!("  auth domain: {}", config.auth_domain);
    println!("  bucket:      {}", config.storage_bucket);
    println!(
        "  database:    {}",
        config.realtime_database_url().unwrap_or_else(|| "-".to_string())
    );
    println!("  environment: {:?}", config.environment);
    println!();

    let app = FirebaseApp::with_default_services(config);
    let report = run_diagnostics(&app).await;
    print!("{}", report);

    if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
