use super::exit_codes;
use super::{open_store, print_json};
use crate::cli::args::AnalyzeArgs;
use pulse_core::analysis::AnalysisService;
use pulse_core::config::PulseConfig;

pub async fn cmd_analyze(args: AnalyzeArgs, cfg: &PulseConfig) -> anyhow::Result<i32> {
    let mut analysis = cfg.analysis.clone();
    if let Some(secs) = args.timeout_secs {
        analysis.timeout_secs = secs;
    }

    let service = AnalysisService::from_config(open_store(cfg)?, &analysis);
    let outcome = service.spawn(args.run_id).wait().await?;
    // a failed analysis is still a successful command; the marker says why
    print_json(&outcome)?;
    Ok(exit_codes::OK)
}
