//! Pipeline composition: combines all middleware layers into a single service stack.

use std::sync::Arc;

use tower::ServiceBuilder;

use super::load_shed::{LoadShedLayer, LoadShedService};
use super::metrics::{MetricsLayer, MetricsService};
use super::timeout::{TimeoutLayer, TimeoutService};
use crate::service::config::DispatcherConfig;
use crate::service::dispatcher::{DispatchService, Dispatcher};

/// The fully layered dispatch service.
pub type DispatchPipeline = LoadShedService<MetricsService<TimeoutService<DispatchService>>>;

/// Build the dispatch pipeline by wrapping the `Dispatcher` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded (fail fast before doing any work)
/// 2. `MetricsLayer` -- record timing and outcome, including timeouts
/// 3. `TimeoutLayer` -- fail replies still pending after `call_timeout_ms`
///
/// The returned service implements `tower::Service<InboundCall>` and resolves
/// once the reply has settled.
#[must_use]
pub fn build_dispatch_pipeline(
    dispatcher: Arc<Dispatcher>,
    config: &DispatcherConfig,
) -> DispatchPipeline {
    ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_concurrent_calls))
        .layer(MetricsLayer)
        .layer(TimeoutLayer)
        .service(DispatchService::new(dispatcher))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use callwire_core::{Args, Call, ReplyError, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::service::descriptor::MethodDescriptor;
    use crate::service::message::InboundCall;
    use crate::service::registry::MethodRegistry;

    fn dispatcher(config: &DispatcherConfig) -> Arc<Dispatcher> {
        let mut builder = MethodRegistry::builder();
        builder
            .interface("Test.Iface")
            .method(MethodDescriptor::blocking("ping", |_args: Args| Ok(Value::Null)))
            .method(MethodDescriptor::blocking("nap", |_args: Args| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(Value::Null)
            }));
        Arc::new(Dispatcher::new(builder.build().unwrap(), config).unwrap())
    }

    fn config() -> DispatcherConfig {
        DispatcherConfig {
            blocking_threads: 2,
            max_concurrent_calls: 100,
            ..DispatcherConfig::default()
        }
    }

    #[tokio::test]
    async fn pipeline_dispatches_through_all_layers() {
        let config = config();
        let svc = build_dispatch_pipeline(dispatcher(&config), &config);
        let inbound = InboundCall::from_config(&config, Call::new(42, "ping", vec![]), Some(1000));
        let reply = svc.oneshot(inbound).await.unwrap();
        assert_eq!(reply.seq_id(), 42);
        assert_eq!(reply.outcome().unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn pipeline_applies_default_timeout() {
        let config = DispatcherConfig {
            default_call_timeout_ms: 20,
            ..config()
        };
        let svc = build_dispatch_pipeline(dispatcher(&config), &config);
        let inbound = InboundCall::from_config(&config, Call::new(5, "nap", vec![]), None);
        let reply = svc.oneshot(inbound).await.unwrap();
        assert!(matches!(
            reply.outcome().unwrap(),
            Err(ReplyError::Timeout { timeout_ms: 20 })
        ));
    }
}
