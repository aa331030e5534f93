//! Application state wiring all services together.
//!
//! Services are generic over repository traits; `AppState` pins them to the
//! SQLite implementations and the in-process broker.

use std::sync::Arc;

use flho_core::breaker::BreakerRegistry;
use flho_core::event::{BoxBroker, EventBus, EventDispatcher, Topology};
use flho_core::identity::{IdentityEventHandler, upsert_identity};
use flho_core::repository::identity::IdentityRepository;
use flho_core::run::{BoxRetryInvoker, RunOrchestrator};
use flho_core::worker::WorkerPool;
use flho_core::workflow::WorkflowService;
use flho_infra::broker::InProcessBroker;
use flho_infra::http::HttpRetryInvoker;
use flho_infra::sqlite::{
    DatabasePool, SqliteIdentityRepository, SqliteRunRepository, SqliteWorkflowRepository,
};
use flho_types::config::ServiceConfig;
use flho_types::error::FlowError;
use flho_types::event::entity;
use flho_types::identity::IdentityRecord;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteWorkflowService = WorkflowService<SqliteWorkflowRepository, SqliteIdentityRepository>;

pub type ConcreteOrchestrator = RunOrchestrator<SqliteWorkflowRepository, SqliteRunRepository>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub broker: BoxBroker,
    pub topology: Topology,
    pub workflow_service: Arc<ConcreteWorkflowService>,
    pub orchestrator: ConcreteOrchestrator,
    pub breakers: BreakerRegistry,
    identities: SqliteIdentityRepository,
}

impl AppState {
    /// Open the database, declare the event topology and wire services.
    pub async fn init(config: ServiceConfig) -> anyhow::Result<Self> {
        let db_pool = DatabasePool::new(&config.database.url).await?;

        let broker = BoxBroker::new(InProcessBroker::new(config.bus.queue_capacity));
        let topology = Topology::from_config(&config);
        topology.declare(&broker).await?;
        let bus = EventBus::new(
            broker.clone(),
            topology.exchange.clone(),
            config.bus.publish_timeout(),
        );

        let breakers = BreakerRegistry::new();
        let identities = SqliteIdentityRepository::new(db_pool.clone());

        let workflow_service = WorkflowService::new(
            SqliteWorkflowRepository::new(db_pool.clone()),
            identities.clone(),
            breakers.clone(),
            bus.clone(),
        );

        let invoker = BoxRetryInvoker::new(HttpRetryInvoker::new(&config.retry)?);
        let pool = WorkerPool::new(config.retry.workers, config.retry.queue_capacity);
        let orchestrator = RunOrchestrator::new(
            SqliteWorkflowRepository::new(db_pool.clone()),
            SqliteRunRepository::new(db_pool),
            breakers.clone(),
            invoker,
            pool,
            bus,
        );

        Ok(Self {
            config: Arc::new(config),
            broker,
            topology,
            workflow_service: Arc::new(workflow_service),
            orchestrator,
            breakers,
            identities,
        })
    }

    /// Dispatcher with a handler for every partner that publishes identity
    /// events. Other partners are bound but their deliveries are dropped.
    pub fn dispatcher(&self) -> EventDispatcher {
        let handler = Arc::new(IdentityEventHandler::new(self.identities.clone()));
        let mut dispatcher = EventDispatcher::new();
        for partner in &self.topology.partners {
            if partner.entities.iter().any(|e| e == entity::IDENTITY) {
                dispatcher.register(partner.exchange.clone(), handler.clone());
            } else {
                tracing::warn!(exchange = %partner.exchange, "no handler for partner, its events will be dropped");
            }
        }
        dispatcher
    }

    /// Register or update an identity outside the event stream.
    pub async fn upsert_identity(&self, uuid: &str, active: bool) -> Result<IdentityRecord, FlowError> {
        upsert_identity(&self.identities, uuid, active).await
    }

    pub async fn identity(&self, uuid: &str) -> Result<IdentityRecord, FlowError> {
        self.identities
            .get(uuid.trim())
            .await
            .map_err(|e| FlowError::from_repository("identity", e))?
            .ok_or(FlowError::NotFound("identity"))
    }

    /// Cancel countdowns and drain in-flight retry calls.
    pub async fn shutdown(&self) {
        self.orchestrator.shutdown().await;
    }
}
