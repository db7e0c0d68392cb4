use super::exit_codes;
use super::{open_store, print_json};
use crate::cli::args::IngestArgs;
use anyhow::Context;
use pulse_core::config::PulseConfig;
use pulse_core::errors::PulseError;
use pulse_core::ingest::Coordinator;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct IngestedFile {
    file: PathBuf,
    run_id: i64,
}

pub fn cmd_ingest(args: IngestArgs, cfg: &PulseConfig) -> anyhow::Result<i32> {
    let documents = args
        .files
        .iter()
        .map(|p| std::fs::read(p).with_context(|| format!("failed to read {}", p.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let store = open_store(cfg)?;
    let coordinator = Coordinator::from_config(store, &cfg.ingest)?;
    let run_ids = coordinator.ingest(args.project, &documents).map_err(|e| {
        let file = match &e {
            PulseError::Parse { index, .. } => args.files.get(*index).map(|p| p.display().to_string()),
            _ => None,
        };
        match file {
            Some(file) => anyhow::Error::new(e).context(format!("failed to parse {}", file)),
            None => anyhow::Error::new(e),
        }
    })?;

    let out: Vec<IngestedFile> = args
        .files
        .into_iter()
        .zip(run_ids)
        .map(|(file, run_id)| IngestedFile { file, run_id })
        .collect();
    print_json(&out)?;
    Ok(exit_codes::OK)
}
