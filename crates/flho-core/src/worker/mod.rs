pub mod pool;

pub use pool::{PoolError, WorkerPool};
