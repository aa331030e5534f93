//! Workflow definition service.
//!
//! Creates, reads, updates, deletes and lists workflow definitions on
//! behalf of an owner identity. Ownership is resolved through the local
//! identity mirror. Successful writes publish `workflow.*` lifecycle
//! events.

use chrono::Utc;
use uuid::Uuid;

use flho_types::error::FlowError;
use flho_types::event::{EventAction, entity};
use flho_types::page::{Filters, PageMetadata, WORKFLOW_SORT_SAFELIST};
use flho_types::workflow::{CreateWorkflowRequest, UpdateWorkflowRequest, Workflow};

use crate::breaker::BreakerRegistry;
use crate::event::EventBus;
use crate::repository::identity::IdentityRepository;
use crate::repository::workflow::WorkflowRepository;

use super::validation;

/// Service managing workflow definitions.
///
/// Generic over repository traits -- flho-core never depends on flho-infra.
pub struct WorkflowService<W: WorkflowRepository, I: IdentityRepository> {
    workflows: W,
    identities: I,
    breakers: BreakerRegistry,
    bus: EventBus,
}

impl<W: WorkflowRepository, I: IdentityRepository> WorkflowService<W, I> {
    pub fn new(workflows: W, identities: I, breakers: BreakerRegistry, bus: EventBus) -> Self {
        Self {
            workflows,
            identities,
            breakers,
            bus,
        }
    }

    /// Create a workflow owned by `owner`.
    ///
    /// The owner must be a known, active identity. New workflows start
    /// active at version 1.
    pub async fn create_workflow(
        &self,
        owner: &str,
        request: CreateWorkflowRequest,
    ) -> Result<Workflow, FlowError> {
        validation::validate_definition(
            &request.name,
            &request.states,
            request.circuit_breaker.as_ref(),
        )?;
        self.require_identity(owner).await?;

        let now = Utc::now();
        let workflow = Workflow {
            id: 0,
            unique_id: Uuid::now_v7(),
            owner: owner.to_string(),
            name: request.name.trim().to_string(),
            states: request.states,
            circuit_breaker: request.circuit_breaker,
            active: true,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let workflow = self
            .workflows
            .insert(&workflow)
            .await
            .map_err(|e| FlowError::from_repository("workflow", e))?;

        tracing::info!(workflow_id = %workflow.unique_id, owner = %owner, states = workflow.states.len(), "workflow created");
        self.bus
            .publish(entity::WORKFLOW, EventAction::Create, &workflow)
            .await;
        Ok(workflow)
    }

    pub async fn get_workflow(&self, id: &Uuid) -> Result<Workflow, FlowError> {
        self.workflows
            .get(id)
            .await
            .map_err(|e| FlowError::from_repository("workflow", e))?
            .ok_or(FlowError::NotFound("workflow"))
    }

    /// Apply a metadata update if `request.version` matches the stored one.
    pub async fn update_workflow(
        &self,
        id: &Uuid,
        request: UpdateWorkflowRequest,
    ) -> Result<Workflow, FlowError> {
        let mut workflow = self.get_workflow(id).await?;
        if workflow.version != request.version {
            return Err(FlowError::EditConflict);
        }

        if let Some(name) = request.name {
            let mut errors = Default::default();
            validation::validate_name(&name, &mut errors);
            validation::into_result(errors)?;
            workflow.name = name.trim().to_string();
        }

        let workflow = self
            .workflows
            .update(&workflow)
            .await
            .map_err(|e| FlowError::from_repository("workflow", e))?;

        tracing::info!(workflow_id = %workflow.unique_id, version = workflow.version, "workflow updated");
        self.bus
            .publish(entity::WORKFLOW, EventAction::Update, &workflow)
            .await;
        Ok(workflow)
    }

    pub async fn delete_workflow(&self, id: &Uuid) -> Result<(), FlowError> {
        let workflow = self.get_workflow(id).await?;
        let existed = self
            .workflows
            .delete(id)
            .await
            .map_err(|e| FlowError::from_repository("workflow", e))?;
        if !existed {
            return Err(FlowError::NotFound("workflow"));
        }
        self.breakers.forget(id);

        tracing::info!(workflow_id = %id, "workflow deleted");
        self.bus
            .publish(entity::WORKFLOW, EventAction::Delete, &workflow)
            .await;
        Ok(())
    }

    /// One page of the owner's workflows.
    pub async fn list_workflows(
        &self,
        owner: &str,
        filters: &Filters,
    ) -> Result<(Vec<Workflow>, PageMetadata), FlowError> {
        validation::into_result(filters.validate(WORKFLOW_SORT_SAFELIST))?;
        self.require_identity(owner).await?;

        let (workflows, total) = self
            .workflows
            .list_by_owner(owner, filters)
            .await
            .map_err(|e| FlowError::from_repository("workflow", e))?;

        let metadata = PageMetadata::calculate(total, filters.page, filters.page_size);
        Ok((workflows, metadata))
    }

    async fn require_identity(&self, owner: &str) -> Result<(), FlowError> {
        match self
            .identities
            .get(owner)
            .await
            .map_err(|e| FlowError::from_repository("identity", e))?
        {
            Some(identity) if identity.active => Ok(()),
            _ => Err(FlowError::NotFound("identity")),
        }
    }
}
