//! Worker pool that drains an SQS FIFO queue with a fixed number of loops

pub mod config;
pub mod group_gate;
pub mod message_processor;
pub mod observer;
pub mod pool;
pub mod types;

pub use config::WorkerConfig;
pub use group_gate::{GroupGate, GroupPermit};
pub use message_processor::MessageProcessor;
pub use observer::{TracingObserver, WorkerObserver};
pub use pool::WorkerPool;
pub use types::{AckPolicy, PoolState, ProcessResult, WorkerId, WorkerState, WorkerStats};
