use std::fmt::Write as _;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use super::{ChunkStream, GenerateOptions, GenerateRequest, LlmClient, LlmError};

/// Timeout for the warm-up call that forces a model into VRAM.
const WARM_TIMEOUT: Duration = Duration::from_secs(30);

/// The core's view of backend GPU memory: at most one model is considered
/// resident at a time. The backend may evict on its own; we refresh
/// keep_alive to make that less likely but never assume more.
#[derive(Debug, Clone, Default)]
pub struct VramState {
    pub resident: Option<String>,
    pub swap_count: u32,
    pub total_swap_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct ManagerStatus {
    pub resident: Option<String>,
    pub keep_alive: String,
    pub swap_count: u32,
    pub total_swap_seconds: f64,
    pub avg_swap_seconds: f64,
}

/// Per-call overrides for [`ModelManager::call`].
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub temperature: Option<f32>,
    pub num_ctx: Option<u32>,
    pub num_predict: Option<i32>,
    pub timeout: Option<Duration>,
}

/// Owns [`VramState`] and serializes model swaps.
///
/// Swap latency is a first-class observable cost: every swap is measured
/// against the real backend and accumulated, so the adaptive analyzer can
/// weigh routing decisions against what swaps actually cost here.
pub struct ModelManager {
    client: LlmClient,
    keep_alive: String,
    default_timeout: Duration,
    state: Mutex<VramState>,
}

impl ModelManager {
    pub fn new(client: LlmClient, keep_alive: impl Into<String>, default_timeout: Duration) -> Self {
        Self {
            client,
            keep_alive: keep_alive.into(),
            default_timeout,
            state: Mutex::new(VramState::default()),
        }
    }

    /// Ensure `model` is loaded in VRAM, returning the measured swap time
    /// in seconds. Zero when the model is already resident.
    ///
    /// The state lock is held across the warm call: concurrent requests
    /// that need different models serialize here by design, mirroring the
    /// single-resident reality of the backend.
    pub async fn ensure_resident(
        &self,
        model: &str,
        phase: Option<&str>,
    ) -> Result<f64, LlmError> {
        let mut state = self.state.lock().await;

        if state.resident.as_deref() == Some(model) {
            log::debug!("{model} already in VRAM");
            return Ok(0.0);
        }

        let phase_str = phase.map(|p| format!(" for {p}")).unwrap_or_default();
        log::info!("Loading {model} to VRAM{phase_str}...");

        let request = GenerateRequest {
            model: model.to_string(),
            prompt: String::new(),
            stream: false,
            keep_alive: self.keep_alive.clone(),
            options: GenerateOptions {
                num_predict: Some(0),
                ..Default::default()
            },
        };

        let start = Instant::now();
        match self.client.generate(&request, WARM_TIMEOUT).await {
            Ok(_) => {
                let elapsed = start.elapsed().as_secs_f64();
                state.resident = Some(model.to_string());
                state.swap_count += 1;
                state.total_swap_seconds += elapsed;
                log::info!(
                    "Model loaded in {elapsed:.2}s (swap #{})",
                    state.swap_count
                );
                Ok(elapsed)
            }
            Err(e) => {
                log::error!(
                    "Model load failed after {:.2}s: {e}",
                    start.elapsed().as_secs_f64()
                );
                Err(e)
            }
        }
    }

    /// Generate with automatic residency management.
    pub async fn call(
        &self,
        model: &str,
        prompt: &str,
        options: CallOptions,
    ) -> Result<String, LlmError> {
        self.ensure_resident(model, None).await?;

        let request = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
            keep_alive: self.keep_alive.clone(),
            options: GenerateOptions {
                temperature: options.temperature,
                num_ctx: options.num_ctx,
                num_predict: options.num_predict,
            },
        };

        self.client
            .generate(&request, options.timeout.unwrap_or(self.default_timeout))
            .await
    }

    /// Streaming generate with automatic residency management.
    pub async fn call_stream(
        &self,
        model: &str,
        prompt: &str,
        options: CallOptions,
    ) -> Result<ChunkStream, LlmError> {
        self.ensure_resident(model, None).await?;

        let request = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: true,
            keep_alive: self.keep_alive.clone(),
            options: GenerateOptions {
                temperature: options.temperature,
                num_ctx: options.num_ctx,
                num_predict: options.num_predict,
            },
        };

        self.client
            .generate_stream(&request, options.timeout.unwrap_or(self.default_timeout))
            .await
    }

    /// Best-effort keep-alive refresh. Failure only logs; residency is not
    /// updated since nothing was swapped.
    pub async fn refresh_keep_alive(&self, model: &str) {
        let request = GenerateRequest {
            model: model.to_string(),
            prompt: String::new(),
            stream: false,
            keep_alive: self.keep_alive.clone(),
            options: GenerateOptions {
                num_predict: Some(0),
                ..Default::default()
            },
        };
        match self.client.generate(&request, Duration::from_secs(5)).await {
            Ok(_) => log::debug!("Refreshed keep_alive for {model}"),
            Err(e) => log::debug!("Could not refresh keep_alive: {e}"),
        }
    }

    pub async fn status(&self) -> ManagerStatus {
        let state = self.state.lock().await;
        let avg = if state.swap_count > 0 {
            state.total_swap_seconds / state.swap_count as f64
        } else {
            0.0
        };
        ManagerStatus {
            resident: state.resident.clone(),
            keep_alive: self.keep_alive.clone(),
            swap_count: state.swap_count,
            total_swap_seconds: state.total_swap_seconds,
            avg_swap_seconds: avg,
        }
    }

    pub async fn report(&self) -> String {
        let status = self.status().await;
        let mut report = String::new();
        let _ = writeln!(report, "Model Manager Statistics");
        let _ = writeln!(report, "========================");
        let _ = writeln!(
            report,
            "Current VRAM model: {}",
            status.resident.as_deref().unwrap_or("None")
        );
        let _ = writeln!(report, "Keep alive setting: {}", status.keep_alive);
        let _ = writeln!(report);
        let _ = writeln!(report, "Swap statistics:");
        let _ = writeln!(report, "  Total swaps:  {}", status.swap_count);
        let _ = writeln!(report, "  Total time:   {:.2}s", status.total_swap_seconds);
        let _ = writeln!(report, "  Average time: {:.2}s", status.avg_swap_seconds);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn manager(url: String) -> ModelManager {
        ModelManager::new(LlmClient::new(url), "60m", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_ensure_resident_loads_and_tracks() {
        let mut server = mockito::Server::new_async().await;
        let warm = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"response": "", "done": true}"#)
            .expect(1)
            .create_async()
            .await;

        let manager = manager(server.url());
        let elapsed = manager.ensure_resident("qwen2.5-coder:7b", None).await.unwrap();
        assert!(elapsed >= 0.0);

        let status = manager.status().await;
        assert_eq!(status.resident.as_deref(), Some("qwen2.5-coder:7b"));
        assert_eq!(status.swap_count, 1);
        warm.assert_async().await;
    }

    #[tokio::test]
    async fn test_resident_model_is_not_reloaded() {
        let mut server = mockito::Server::new_async().await;
        // Exactly one warm call despite two ensure_resident invocations.
        let warm = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"response": "", "done": true}"#)
            .expect(1)
            .create_async()
            .await;

        let manager = manager(server.url());
        manager.ensure_resident("m1", None).await.unwrap();
        let elapsed = manager.ensure_resident("m1", None).await.unwrap();

        assert_eq!(elapsed, 0.0);
        let status = manager.status().await;
        assert_eq!(status.swap_count, 1);
        warm.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_load_leaves_state_unchanged() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(503)
            .create_async()
            .await;

        let manager = manager(server.url());
        let err = manager.ensure_resident("m1", Some("planning")).await.unwrap_err();
        assert!(matches!(err, LlmError::ApiError { status: 503 }));

        let status = manager.status().await;
        assert!(status.resident.is_none());
        assert_eq!(status.swap_count, 0);
        assert_eq!(status.total_swap_seconds, 0.0);
    }

    #[tokio::test]
    async fn test_swapping_models_counts_each_swap() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"response": "", "done": true}"#)
            .expect(3)
            .create_async()
            .await;

        let manager = manager(server.url());
        assert_ok!(manager.ensure_resident("a", None).await);
        assert_ok!(manager.ensure_resident("b", None).await);
        assert_ok!(manager.ensure_resident("a", None).await);

        let status = manager.status().await;
        assert_eq!(status.swap_count, 3);
        assert_eq!(status.resident.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_call_generates_after_residency() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"response": "generated text", "done": true}"#)
            .expect(2)
            .create_async()
            .await;

        let manager = manager(server.url());
        let text = manager
            .call("m1", "write a haiku", CallOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "generated text");
        assert_eq!(manager.status().await.resident.as_deref(), Some("m1"));
    }
}
