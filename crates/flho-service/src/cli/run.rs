//! `flho run ...` commands.

use serde_json::json;

use flho_types::run::AdvanceRequest;

use super::{RunCommand, print_json};
use crate::state::AppState;

pub async fn handle(state: &AppState, action: RunCommand) -> anyhow::Result<()> {
    let orchestrator = &state.orchestrator;
    match action {
        RunCommand::Start { workflow, step } => {
            let run_id = orchestrator.start_run(&workflow, step).await?;
            print_json(&json!({ "runUniqueId": run_id }))
        }
        RunCommand::Advance {
            workflow,
            run,
            step,
            expected_version,
        } => {
            let run = orchestrator
                .advance_run(&AdvanceRequest {
                    workflow_id: workflow,
                    run_id: run,
                    step,
                    expected_version,
                })
                .await?;
            print_json(&run)
        }
        RunCommand::Show { run } => print_json(&orchestrator.get_run(&run).await?),
        RunCommand::History { run } => print_json(&orchestrator.run_history(&run).await?),
    }
}
