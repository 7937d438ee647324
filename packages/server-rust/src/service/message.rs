//! Request and response types carried through the dispatch pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use callwire_core::{Call, ReplyOutcome, RequestContext};

use super::config::DispatcherConfig;
use super::reply::Reply;

/// A decoded call together with its request context and timeout.
#[derive(Debug, Clone)]
pub struct InboundCall {
    pub ctx: Arc<RequestContext>,
    pub call: Call,
    /// Per-call timeout in milliseconds. 0 disables the timeout.
    pub call_timeout_ms: u64,
}

impl InboundCall {
    /// Wraps `call` in a fresh request context for `node_id`, with a deadline
    /// `call_timeout_ms` from now.
    #[must_use]
    pub fn new(node_id: &str, call: Call, call_timeout_ms: u64) -> Self {
        let mut ctx = RequestContext::new(node_id, call.method.clone(), call.seq_id);
        ctx.deadline = (call_timeout_ms > 0)
            .then(|| Instant::now() + Duration::from_millis(call_timeout_ms));
        Self {
            ctx: Arc::new(ctx),
            call,
            call_timeout_ms,
        }
    }

    /// Like [`new`](Self::new), taking the node id from `config` and falling
    /// back to `config.default_call_timeout_ms` when `call_timeout_ms` is `None`.
    #[must_use]
    pub fn from_config(config: &DispatcherConfig, call: Call, call_timeout_ms: Option<u64>) -> Self {
        Self::new(
            &config.node_id,
            call,
            call_timeout_ms.unwrap_or(config.default_call_timeout_ms),
        )
    }
}

/// A settled reply, ready for the transport to encode.
#[derive(Debug, Clone)]
pub struct ReplyMessage {
    pub seq_id: i32,
    pub outcome: ReplyOutcome,
}

impl ReplyMessage {
    /// Waits for `reply` to settle and captures its outcome.
    pub async fn from_reply(reply: &Reply) -> Self {
        Self {
            seq_id: reply.seq_id(),
            outcome: reply.settled().await,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_call_context_mirrors_call() {
        let inbound = InboundCall::new("node-a", Call::new(4, "echo", vec![]), 500);
        assert_eq!(inbound.ctx.node_id, "node-a");
        assert_eq!(inbound.ctx.method, "echo");
        assert_eq!(inbound.ctx.seq_id, 4);
        assert_eq!(inbound.call_timeout_ms, 500);
        assert!(inbound.ctx.deadline.is_some());
        assert!(!inbound.ctx.is_expired());
    }

    #[test]
    fn from_config_applies_node_id_and_default_timeout() {
        let config = DispatcherConfig {
            node_id: "node-b".to_string(),
            default_call_timeout_ms: 250,
            ..DispatcherConfig::default()
        };
        let inbound = InboundCall::from_config(&config, Call::new(1, "echo", vec![]), None);
        assert_eq!(inbound.ctx.node_id, "node-b");
        assert_eq!(inbound.call_timeout_ms, 250);
        assert!(inbound.ctx.deadline.is_some());

        let explicit = InboundCall::from_config(&config, Call::new(2, "echo", vec![]), Some(0));
        assert_eq!(explicit.call_timeout_ms, 0);
        assert!(explicit.ctx.deadline.is_none());
    }

    #[test]
    fn zero_timeout_has_no_deadline() {
        let inbound = InboundCall::new("node-a", Call::new(4, "echo", vec![]), 0);
        assert!(inbound.ctx.deadline.is_none());
    }

    #[tokio::test]
    async fn reply_message_carries_seq_id_and_outcome() {
        let reply = Reply::pending(11);
        reply.complete(None);
        let msg = ReplyMessage::from_reply(&reply).await;
        assert_eq!(msg.seq_id, 11);
        assert!(msg.is_success());
    }
}
