use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use kindle_relay::channels::{UploadHandler, cli};
use kindle_relay::config::RelayConfig;
use kindle_relay::pipeline::JobOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut json = false;
    let mut paths: Vec<PathBuf> = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            "-h" | "--help" => {
                print_usage();
                return Ok(());
            }
            _ => paths.push(PathBuf::from(arg)),
        }
    }
    if paths.is_empty() {
        print_usage();
        std::process::exit(2);
    }

    let config = RelayConfig::from_env().context("loading KINDLE_RELAY_* configuration")?;

    eprintln!("📚 Kindle Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   SMTP: {}:{} ({:?})",
        config.smtp.host, config.smtp.port, config.smtp.tls
    );
    eprintln!(
        "   Recipients: {}",
        config
            .recipients
            .iter()
            .map(|r| r.address.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    eprintln!("   Converter: {}", config.converter.program);
    eprintln!("   Work dir: {}\n", config.work_dir.display());

    let orchestrator = Arc::new(JobOrchestrator::from_config(&config));
    let handler = Arc::new(UploadHandler::new(orchestrator, config.work_dir.clone()));

    let total = paths.len();
    let results = cli::submit_files(handler, paths).await;
    let reports: Vec<_> = results.iter().filter_map(|r| r.report.as_ref()).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    let failed: Vec<_> = results.iter().filter(|r| r.report.is_none()).collect();
    if !failed.is_empty() || results.len() < total {
        eprintln!("\n{} of {total} uploads failed", total - reports.len());
        for result in failed {
            eprintln!("   {}", result.path.display());
        }
        std::process::exit(1);
    }
    Ok(())
}

fn print_usage() {
    eprintln!("Usage: kindle-relay [--json] <file>...");
    eprintln!();
    eprintln!("Converts each file to EPUB (unless it already is one) and mails it");
    eprintln!("to every address in KINDLE_RELAY_RECIPIENTS.");
}
