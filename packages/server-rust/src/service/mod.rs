//! Call dispatch framework.
//!
//! This module implements the dispatch pipeline:
//!
//! 1. **Registry** (`registry`, `descriptor`): method name -> `MethodDescriptor`
//! 2. **Middleware** (`middleware`): Tower layers (load-shedding, metrics, timeout)
//! 3. **Dispatch** (`dispatcher`): lookup, argument building, invoker selection
//! 4. **Invokers** (`invoke`): blocking-pool and callback execution strategies
//! 5. **Replies** (`reply`): single-assignment result cells

pub mod config;
pub mod descriptor;
pub mod dispatcher;
pub mod invoke;
pub mod message;
pub mod middleware;
pub mod registry;
pub mod reply;
pub mod worker;

// Re-export key types for convenient access.
pub use config::DispatcherConfig;
pub use descriptor::{
    spawn_async, AsyncMethod, BlockingMethod, Callable, MethodDescriptor, MethodMode,
    ResultWrapper, SpawnAsync,
};
pub use dispatcher::{DispatchService, Dispatcher};
pub use invoke::MethodCallback;
pub use message::{InboundCall, ReplyMessage};
pub use middleware::{build_dispatch_pipeline, DispatchPipeline};
pub use registry::{MethodRegistry, MethodRegistryBuilder, RegistryError, ThriftService};
pub use reply::{Reply, ReplyState};
pub use worker::{BlockingPool, PoolError};
