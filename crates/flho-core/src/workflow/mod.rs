pub mod service;
pub mod validation;

pub use service::WorkflowService;
