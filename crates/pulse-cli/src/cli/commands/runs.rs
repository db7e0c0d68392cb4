use super::exit_codes;
use super::{open_store, print_json};
use crate::cli::args::{RunsArgs, RunsSub};
use chrono::Utc;
use pulse_core::config::PulseConfig;
use pulse_core::storage::Window;
use serde_json::json;

pub fn cmd_runs(args: RunsArgs, cfg: &PulseConfig) -> anyhow::Result<i32> {
    let store = open_store(cfg)?;
    match args.cmd {
        RunsSub::List {
            project,
            limit,
            days,
        } => {
            let since = days.map(|d| Window::last_days(d, Utc::now()).since);
            print_json(&store.list_runs(project, limit, since)?)?;
        }
        RunsSub::Show { run_id } => print_json(&store.run_detail(run_id)?)?,
        RunsSub::Delete { run_id } => {
            store.delete_run(run_id)?;
            print_json(&json!({ "deleted": [run_id] }))?;
        }
        RunsSub::DeleteDay { project, date } => {
            let n = store.delete_runs_on(project, date)?;
            print_json(&json!({ "project": project, "date": date, "deletedRuns": n }))?;
        }
    }
    Ok(exit_codes::OK)
}
