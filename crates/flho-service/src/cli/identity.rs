//! `flho identity ...` commands.

use super::{IdentityCommand, print_json};
use crate::state::AppState;

pub async fn handle(state: &AppState, action: IdentityCommand) -> anyhow::Result<()> {
    match action {
        IdentityCommand::Upsert { uuid, inactive } => {
            let record = state.upsert_identity(&uuid, !inactive).await?;
            tracing::info!(uuid = %record.uuid, version = record.version, "identity saved");
            print_json(&record)
        }
        IdentityCommand::Show { uuid } => print_json(&state.identity(&uuid).await?),
    }
}
