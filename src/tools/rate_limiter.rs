use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitSettings;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding one-minute window per rate key. Keys are usually tool names;
/// per-tool overrides come from `security.rate_limits.<tool>_per_minute`.
pub struct RateLimiter {
    default_limit: u32,
    limits: HashMap<String, u32>,
    executions: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            default_limit: settings.default_per_minute,
            limits: settings.per_tool.clone(),
            executions: Mutex::new(HashMap::new()),
        }
    }

    fn limit_for(&self, key: &str) -> u32 {
        self.limits
            .get(&format!("{key}_per_minute"))
            .copied()
            .unwrap_or(self.default_limit)
    }

    /// Record an execution if the key is under its limit. Returns false
    /// without recording when the limit is exhausted.
    pub fn check(&self, key: &str) -> bool {
        let limit = self.limit_for(key);
        let now = Instant::now();

        let mut executions = self.executions.lock().expect("rate limiter poisoned");
        let timestamps = executions.entry(key.to_string()).or_default();
        timestamps.retain(|ts| now.duration_since(*ts) < WINDOW);

        if timestamps.len() as u32 >= limit {
            log::warn!(
                "Rate limit exceeded for {key}: {}/{limit} per minute",
                timestamps.len()
            );
            return false;
        }

        timestamps.push(now);
        true
    }

    /// Executions recorded per key within the current window.
    pub fn stats(&self) -> HashMap<String, usize> {
        let now = Instant::now();
        let executions = self.executions.lock().expect("rate limiter poisoned");
        executions
            .iter()
            .map(|(key, timestamps)| {
                let recent = timestamps
                    .iter()
                    .filter(|ts| now.duration_since(**ts) < WINDOW)
                    .count();
                (key.clone(), recent)
            })
            .collect()
    }

    pub fn reset(&self, key: Option<&str>) {
        let mut executions = self.executions.lock().expect("rate limiter poisoned");
        match key {
            Some(key) => {
                executions.remove(key);
            }
            None => executions.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(default_per_minute: u32, per_tool: &[(&str, u32)]) -> RateLimitSettings {
        RateLimitSettings {
            default_per_minute,
            per_tool: per_tool
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    #[test]
    fn test_limit_is_enforced() {
        let limiter = RateLimiter::new(&settings(3, &[]));
        assert!(limiter.check("write_file"));
        assert!(limiter.check("write_file"));
        assert!(limiter.check("write_file"));
        assert!(!limiter.check("write_file"));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(&settings(1, &[]));
        assert!(limiter.check("a"));
        assert!(limiter.check("b"));
        assert!(!limiter.check("a"));
    }

    #[test]
    fn test_per_tool_override() {
        let limiter = RateLimiter::new(&settings(100, &[("run_command_per_minute", 1)]));
        assert!(limiter.check("run_command"));
        assert!(!limiter.check("run_command"));
    }

    #[test]
    fn test_reset_clears_key() {
        let limiter = RateLimiter::new(&settings(1, &[]));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        limiter.reset(Some("a"));
        assert!(limiter.check("a"));
    }

    #[test]
    fn test_stats_report_window_counts() {
        let limiter = RateLimiter::new(&settings(10, &[]));
        limiter.check("a");
        limiter.check("a");
        limiter.check("b");
        let stats = limiter.stats();
        assert_eq!(stats["a"], 2);
        assert_eq!(stats["b"], 1);
    }
}
