use super::args::*;
use anyhow::Context;
use pulse_core::config::{load_config, PulseConfig};
use pulse_core::errors::PulseError;
use pulse_core::storage::Store;
use serde::Serialize;

pub mod analytics;
pub mod analyze;
pub mod flaky;
pub mod ingest;
pub mod project;
pub mod runs;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const NOT_FOUND: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

/// File config, then `PULSE_*` environment, then command-line flags.
pub fn resolve_config(global: &GlobalArgs) -> anyhow::Result<PulseConfig> {
    let mut cfg = match &global.config {
        Some(path) => load_config(path, global.strict_config)?,
        None => PulseConfig::default(),
    };
    cfg.apply_env();
    if let Some(db) = &global.db {
        cfg.db = db.clone();
    }
    if let Some(level) = &global.log_level {
        cfg.log_level = level.clone();
    }
    Ok(cfg)
}

pub async fn dispatch(cli: Cli, cfg: PulseConfig) -> anyhow::Result<i32> {
    let res = match cli.cmd {
        Command::Project(args) => project::cmd_project(args, &cfg),
        Command::Ingest(args) => ingest::cmd_ingest(args, &cfg),
        Command::Runs(args) => runs::cmd_runs(args, &cfg),
        Command::Trends(args) => analytics::cmd_trends(args, &cfg),
        Command::Failures(args) => analytics::cmd_failures(args, &cfg),
        Command::Patterns(args) => analytics::cmd_patterns(args, &cfg),
        Command::Flaky(args) => flaky::cmd_flaky(args, &cfg),
        Command::Analyze(args) => analyze::cmd_analyze(args, &cfg).await,
        Command::Stats => open_store(&cfg)
            .and_then(|store| Ok(store.stats_best_effort()?))
            .and_then(|stats| print_json(&stats))
            .map(|_| exit_codes::OK),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    };

    match res {
        Err(e) if is_not_found(&e) => {
            eprintln!("not found: {}", e);
            Ok(exit_codes::NOT_FOUND)
        }
        other => other,
    }
}

fn is_not_found(e: &anyhow::Error) -> bool {
    e.chain()
        .filter_map(|cause| cause.downcast_ref::<PulseError>())
        .any(PulseError::is_not_found)
}

pub(crate) fn open_store(cfg: &PulseConfig) -> anyhow::Result<Store> {
    if let Some(parent) = cfg.db.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let store = Store::open(&cfg.db)
        .with_context(|| format!("failed to open database {}", cfg.db.display()))?;
    store.init_schema()?;
    Ok(store)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
