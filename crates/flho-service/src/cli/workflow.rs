//! `flho workflow ...` commands.

use std::path::Path;

use anyhow::Context;
use serde_json::json;
use uuid::Uuid;

use flho_types::page::Filters;
use flho_types::workflow::{CreateWorkflowRequest, UpdateWorkflowRequest};

use super::{WorkflowCommand, print_json};
use crate::state::AppState;

pub async fn handle(state: &AppState, action: WorkflowCommand) -> anyhow::Result<()> {
    match action {
        WorkflowCommand::Create { owner, file } => create(state, &owner, &file).await,
        WorkflowCommand::Show { id } => show(state, &id).await,
        WorkflowCommand::List {
            owner,
            page,
            page_size,
            sort,
        } => {
            let filters = Filters {
                page,
                page_size,
                sort,
            };
            let (workflows, metadata) = state.workflow_service.list_workflows(&owner, &filters).await?;
            print_json(&json!({ "workflows": workflows, "metadata": metadata }))
        }
        WorkflowCommand::Rename { id, name, version } => {
            let workflow = state
                .workflow_service
                .update_workflow(
                    &id,
                    UpdateWorkflowRequest {
                        name: Some(name),
                        version,
                    },
                )
                .await?;
            print_json(&workflow)
        }
        WorkflowCommand::Delete { id } => {
            state.workflow_service.delete_workflow(&id).await?;
            print_json(&json!({ "deleted": id }))
        }
    }
}

async fn create(state: &AppState, owner: &str, file: &Path) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let request: CreateWorkflowRequest = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a workflow definition", file.display()))?;

    let workflow = state.workflow_service.create_workflow(owner, request).await?;
    print_json(&workflow)
}

async fn show(state: &AppState, id: &Uuid) -> anyhow::Result<()> {
    let workflow = state.workflow_service.get_workflow(id).await?;
    let breaker = state.breakers.snapshot(id);
    print_json(&json!({ "workflow": workflow, "breaker": breaker }))
}
