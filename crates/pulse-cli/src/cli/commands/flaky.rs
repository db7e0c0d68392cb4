use super::exit_codes;
use super::{open_store, print_json};
use crate::cli::args::{FlakyArgs, FlakySub};
use pulse_core::analytics::AnalyticsEngine;
use pulse_core::config::PulseConfig;
use pulse_core::model::FlakyStatusUpdate;

pub fn cmd_flaky(args: FlakyArgs, cfg: &PulseConfig) -> anyhow::Result<i32> {
    let engine = AnalyticsEngine::new(open_store(cfg)?);
    match args.cmd {
        FlakySub::List { window, threshold } => {
            print_json(&engine.flaky_tests(window.project, window.days, threshold)?)?;
        }
        FlakySub::Update {
            class_name,
            test_name,
            acknowledged,
            status,
            assignee,
            notes,
        } => {
            let update = FlakyStatusUpdate {
                acknowledged,
                status,
                assignee,
                notes,
            };
            print_json(&engine.update_flaky_status(&class_name, &test_name, &update)?)?;
        }
    }
    Ok(exit_codes::OK)
}
