//! callwire server: method registry, call dispatcher, blocking and callback
//! invokers, and the tower middleware around them.

pub mod logging;
pub mod service;

pub use logging::{init_tracing, LogConfig};
pub use service::{
    build_dispatch_pipeline, AsyncMethod, BlockingMethod, BlockingPool, DispatchService,
    Dispatcher, DispatcherConfig, InboundCall, MethodCallback, MethodDescriptor, MethodMode,
    MethodRegistry, MethodRegistryBuilder, RegistryError, Reply, ReplyMessage, ReplyState,
    ThriftService,
};
