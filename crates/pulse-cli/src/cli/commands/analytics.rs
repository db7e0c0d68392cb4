use super::exit_codes;
use super::{open_store, print_json};
use crate::cli::args::{FailuresArgs, WindowArgs};
use pulse_core::analytics::AnalyticsEngine;
use pulse_core::config::PulseConfig;

fn engine(cfg: &PulseConfig) -> anyhow::Result<AnalyticsEngine> {
    Ok(AnalyticsEngine::new(open_store(cfg)?))
}

pub fn cmd_trends(args: WindowArgs, cfg: &PulseConfig) -> anyhow::Result<i32> {
    print_json(&engine(cfg)?.trends(args.project, args.days)?)?;
    Ok(exit_codes::OK)
}

pub fn cmd_failures(args: FailuresArgs, cfg: &PulseConfig) -> anyhow::Result<i32> {
    let top = engine(cfg)?.top_failures(args.window.project, args.window.days, args.limit)?;
    print_json(&top)?;
    Ok(exit_codes::OK)
}

pub fn cmd_patterns(args: WindowArgs, cfg: &PulseConfig) -> anyhow::Result<i32> {
    print_json(&engine(cfg)?.failure_patterns(args.project, args.days)?)?;
    Ok(exit_codes::OK)
}
