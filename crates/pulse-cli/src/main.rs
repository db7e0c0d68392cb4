use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;

use cli::args::Cli;
use cli::commands::{dispatch, exit_codes, resolve_config};

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries command output only
    fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();

    let cfg = match resolve_config(&cli.global) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("config error: {e:#}");
            std::process::exit(exit_codes::CONFIG_ERROR);
        }
    };

    init_logging(&cfg.log_level);
    for key in &cfg.unknown_fields {
        tracing::warn!(event = "config.unknown_field", key = %key);
    }

    let code = match dispatch(cli, cfg).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:?}");
            exit_codes::CONFIG_ERROR
        }
    };
    std::process::exit(code);
}
