use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;

use crate::metrics::MetricsCollector;
use crate::schemas::{ToolCall, ToolOutcome};

use super::{RateLimiter, ResourceMonitor, ToolError, ToolRegistry};

/// Dispatches parameter-validated tool calls through the policy pipeline:
/// rate limit, resource quota, schema validation, timeout-bounded handler
/// invocation, metrics.
///
/// The router neither knows nor cares which executor produced a call. A
/// failing policy check returns a typed failure without invoking the
/// handler; a panicking handler is caught and reported as a failed
/// outcome, never propagated.
pub struct ToolRouter {
    registry: Arc<ToolRegistry>,
    rate_limiter: RateLimiter,
    resources: ResourceMonitor,
    metrics: Arc<MetricsCollector>,
}

impl ToolRouter {
    pub fn new(
        registry: Arc<ToolRegistry>,
        rate_limiter: RateLimiter,
        resources: ResourceMonitor,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            registry,
            rate_limiter,
            resources,
            metrics,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, call: &ToolCall) -> ToolOutcome {
        let start = Instant::now();
        log::info!("Executing tool: {} with params: {}", call.name, call.params);

        let outcome = self.dispatch_inner(call).await;
        let outcome = outcome.with_duration(start.elapsed());

        self.metrics.record_tool_execution(
            &call.name,
            outcome.duration,
            outcome.success,
            outcome.error.as_deref(),
        );

        if outcome.success {
            log::info!(
                "Tool {} completed in {:.2}s",
                call.name,
                outcome.duration.as_secs_f64()
            );
        } else {
            log::error!(
                "Tool {} failed after {:.2}s: {}",
                call.name,
                outcome.duration.as_secs_f64(),
                outcome.error.as_deref().unwrap_or("unknown")
            );
        }

        outcome
    }

    async fn dispatch_inner(&self, call: &ToolCall) -> ToolOutcome {
        let Some(tool) = self.registry.get(&call.name) else {
            return ToolOutcome::failure(
                &call.name,
                call.params.clone(),
                ToolError::UnknownTool(call.name.clone()).to_string(),
            );
        };

        if !self.rate_limiter.check(&tool.rate_key()) {
            return ToolOutcome::failure(
                &call.name,
                call.params.clone(),
                ToolError::RateLimited(call.name.clone()).to_string(),
            );
        }

        if let Some(violation) = self.resources.check() {
            return ToolOutcome::failure(
                &call.name,
                call.params.clone(),
                ToolError::ResourceExhausted(violation).to_string(),
            );
        }

        if let Err(e) = tool.parameters().validate(&call.params) {
            return ToolOutcome::failure(&call.name, call.params.clone(), e.to_string());
        }

        let timeout = tool.timeout();
        let invocation = std::panic::AssertUnwindSafe(tool.call(call.params.clone())).catch_unwind();

        match tokio::time::timeout(timeout, invocation).await {
            Ok(Ok(Ok(output))) => ToolOutcome::success(
                &call.name,
                call.params.clone(),
                output.message,
                output.data,
            ),
            Ok(Ok(Err(e))) => ToolOutcome::failure(&call.name, call.params.clone(), e.to_string()),
            Ok(Err(_panic)) => ToolOutcome::failure(
                &call.name,
                call.params.clone(),
                ToolError::HandlerPanicked.to_string(),
            ),
            Err(_elapsed) => ToolOutcome::failure(
                &call.name,
                call.params.clone(),
                ToolError::Timeout {
                    tool: call.name.clone(),
                    after: timeout,
                }
                .to_string(),
            ),
        }
    }
}
