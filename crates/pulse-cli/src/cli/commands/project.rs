use super::exit_codes;
use super::{open_store, print_json};
use crate::cli::args::{ProjectArgs, ProjectSub};
use pulse_core::config::PulseConfig;

pub fn cmd_project(args: ProjectArgs, cfg: &PulseConfig) -> anyhow::Result<i32> {
    let store = open_store(cfg)?;
    match args.cmd {
        ProjectSub::Add { name, description } => {
            let project = store.create_project(&name, description.as_deref())?;
            tracing::info!(event = "project.created", project_id = project.id, name = %project.name);
            print_json(&project)?;
        }
        ProjectSub::List => print_json(&store.list_projects()?)?,
    }
    Ok(exit_codes::OK)
}
