//! Report export example
//!
//! This example demonstrates the core functionality of report-dl:
//! - Configuring the job service and download directory
//! - Creating a runner
//! - Subscribing to run state
//! - Launching a report job from form input
//! - Cancelling on Ctrl+C, unless the result is already downloading
//!
//! Usage:
//!
//! ```text
//! REPORT_DL_API_URL=http://localhost:8000 \
//!     cargo run --example export_report -- <user> <password> <start> <end> [processed|raw]
//! ```

use report_dl::{Config, JobRequest, JobRunner, Phase, run_until_signal};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 4 {
        eprintln!("usage: export_report <user> <password> <start> <end> [processed|raw]");
        std::process::exit(2);
    }
    let output = args.get(4).map(String::as_str).unwrap_or("processed");

    // Service URL and token come from the environment, the rest is set here
    let mut config = Config::from_env();
    config.polling.interval = Duration::from_secs(2);
    config.output.download_dir = "downloads".into();

    let runner = JobRunner::from_config(config)?;

    // Subscribe to state changes
    let mut states = runner.subscribe();
    tokio::spawn(async move {
        while let Ok(state) = states.recv().await {
            match state.phase {
                Phase::Idle => {}
                Phase::Starting | Phase::Polling => {
                    println!("⏳ {:>3}% {}", state.progress, state.message);
                }
                Phase::Downloading => {
                    println!("⬇ {}", state.message);
                }
                Phase::Succeeded => {
                    println!("✓ {}", state.message);
                }
                Phase::Failed => {
                    println!("✗ {}", state.error.as_deref().unwrap_or("failed"));
                }
                Phase::Cancelled => {
                    println!("⊘ Cancelled");
                }
            }
        }
    });

    // Invalid form input is reported without contacting the service
    let request = JobRequest::from_form(&args[0], &args[1], &args[2], &args[3], output)?;
    let handle = runner.start(request).await?;
    println!("Job {} accepted, press Ctrl+C to cancel", handle);

    let finished = run_until_signal(&runner).await;
    if finished.phase != Phase::Succeeded {
        std::process::exit(1);
    }

    Ok(())
}
