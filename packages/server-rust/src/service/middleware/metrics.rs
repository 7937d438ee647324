//! Metrics middleware for calls.
//!
//! Records call duration and outcome in a `tracing` span and through the
//! `metrics` facade. Without an installed recorder the `metrics` calls are
//! no-ops.

use std::convert::Infallible;
use std::task::{Context, Poll};
use std::time::Instant;

use callwire_core::{ReplyError, ReplyOutcome};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use super::ReplyFuture;
use crate::service::message::InboundCall;
use crate::service::reply::Reply;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments calls with timing and counting.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that waits for the reply to settle, then records its
/// duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

/// Metric label for a settled outcome.
fn outcome_label(outcome: &ReplyOutcome) -> &'static str {
    match outcome {
        Ok(_) => "ok",
        Err(ReplyError::Timeout { .. }) => "timeout",
        Err(_) => "error",
    }
}

impl<S> Service<InboundCall> for MetricsService<S>
where
    S: Service<InboundCall, Response = Reply, Error = Infallible> + Send,
    S::Future: Send + 'static,
{
    type Response = Reply;
    type Error = Infallible;
    type Future = ReplyFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, inbound: InboundCall) -> Self::Future {
        let method = inbound.call.method.clone();
        let seq_id = inbound.call.seq_id;

        let span = info_span!(
            "call",
            method = %method,
            seq_id = seq_id,
            request_id = %inbound.ctx.request_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(inbound);

        Box::pin(
            async move {
                let start = Instant::now();
                let reply = fut.await?;
                let outcome = reply.settled().await;
                let elapsed = start.elapsed();
                let label = outcome_label(&outcome);

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", label);

                match &outcome {
                    Ok(_) => tracing::info!(
                        method = %method,
                        seq_id,
                        duration_ms,
                        outcome = label,
                        "call complete"
                    ),
                    Err(err) => tracing::info!(
                        method = %method,
                        seq_id,
                        duration_ms,
                        outcome = label,
                        error_kind = ?err.kind(),
                        error = %err,
                        "call complete"
                    ),
                }

                metrics::counter!(
                    "callwire_calls_total",
                    "method" => method.clone(),
                    "outcome" => label
                )
                .increment(1);
                metrics::histogram!("callwire_call_duration_seconds", "method" => method)
                    .record(elapsed.as_secs_f64());

                Ok(reply)
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
