/// Dispatcher configuration.
///
/// Controls the blocking worker pool, per-call timeouts, and concurrency limits.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Identifier of this server node, copied into request contexts.
    pub node_id: String,
    /// Number of OS threads in the blocking worker pool.
    pub blocking_threads: usize,
    /// Maximum number of queued blocking calls before new ones are rejected.
    pub blocking_queue_capacity: usize,
    /// Prefix for worker thread names (`{prefix}-{index}`).
    pub thread_name_prefix: String,
    /// Default per-call timeout in milliseconds. 0 disables the timeout.
    pub default_call_timeout_ms: u64,
    /// Maximum number of in-flight calls before load shedding.
    pub max_concurrent_calls: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            blocking_threads: 200,
            blocking_queue_capacity: 1024,
            thread_name_prefix: "callwire-blocking".to_string(),
            default_call_timeout_ms: 10_000,
            max_concurrent_calls: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatcher_config_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.blocking_threads, 200);
        assert_eq!(config.blocking_queue_capacity, 1024);
        assert_eq!(config.thread_name_prefix, "callwire-blocking");
        assert_eq!(config.default_call_timeout_ms, 10_000);
        assert_eq!(config.max_concurrent_calls, 1000);
    }
}
