use crate::recovery::ErrorClassifier;
use crate::schemas::Classification;

use super::{ExecutionHistory, HistoryError, HistorySummary, MisrouteGroup, RoutingStat};

/// Recommendations never exceed this confidence, however strong the data.
const MAX_CONFIDENCE: f64 = 0.9;

/// Groups need at least this many samples before history outweighs the
/// router's heuristics.
const MIN_SAMPLES: i64 = 3;

#[derive(Debug, Clone)]
pub struct RoutingAnalysis {
    pub summary: HistorySummary,
    pub routing_stats: Vec<RoutingStat>,
    pub best_performers: Vec<RoutingStat>,
    pub worst_performers: Vec<RoutingStat>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MisrouteFinding {
    pub group: MisrouteGroup,
    pub recommendation: String,
}

#[derive(Debug, Clone)]
pub struct RouteRecommendation {
    pub mode: String,
    pub model: String,
    pub confidence: f64,
    pub reasoning: String,
    pub historical_success_rate: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorInsights {
    pub total_errors: usize,
    pub by_kind: Vec<(String, usize)>,
    pub recoverable_count: usize,
}

#[derive(Debug, Clone)]
pub struct ThresholdSuggestion {
    pub kind: String,
    pub reason: String,
    pub suggested_action: String,
    pub confidence: f64,
}

/// Read-only analysis over the execution history. Never mutates routing
/// config at runtime; its output is advisory.
pub struct AdaptiveAnalyzer<'a> {
    history: &'a ExecutionHistory,
    classifier: ErrorClassifier,
    execution_model: String,
    planning_model: String,
}

impl<'a> AdaptiveAnalyzer<'a> {
    pub fn new(
        history: &'a ExecutionHistory,
        planning_model: impl Into<String>,
        execution_model: impl Into<String>,
    ) -> Self {
        Self {
            history,
            classifier: ErrorClassifier::new(),
            execution_model: execution_model.into(),
            planning_model: planning_model.into(),
        }
    }

    pub async fn analyze_routing_performance(&self) -> Result<RoutingAnalysis, HistoryError> {
        log::info!("Analyzing routing performance...");

        let summary = self.history.summary().await?;
        let routing_stats = self.history.routing_stats().await?;

        let mut sorted = routing_stats.clone();
        sorted.sort_by(|a, b| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let best_performers: Vec<RoutingStat> = sorted
            .iter()
            .filter(|s| s.success_rate > 0.8 && s.count >= 5)
            .take(3)
            .cloned()
            .collect();
        let worst_performers: Vec<RoutingStat> = sorted
            .iter()
            .rev()
            .filter(|s| s.success_rate < 0.5 && s.count >= MIN_SAMPLES)
            .take(3)
            .cloned()
            .collect();

        let mut recommendations = Vec::new();
        for worst in &worst_performers {
            recommendations.push(format!(
                "Consider alternative routing for {} tasks in {} (only {:.1}% success rate)",
                worst.tier.as_deref().unwrap_or("unclassified"),
                worst.mode,
                worst.success_rate * 100.0
            ));
        }
        for best in &best_performers {
            recommendations.push(format!(
                "Continue using {} for {} tasks ({:.1}% success rate)",
                best.mode,
                best.tier.as_deref().unwrap_or("unclassified"),
                best.success_rate * 100.0
            ));
        }

        Ok(RoutingAnalysis {
            summary,
            routing_stats,
            best_performers,
            worst_performers,
            recommendations,
        })
    }

    pub async fn detect_misroutes(
        &self,
        success_threshold: f64,
        min_samples: i64,
    ) -> Result<Vec<MisrouteFinding>, HistoryError> {
        log::info!(
            "Detecting misroutes (threshold: {success_threshold}, min samples: {min_samples})..."
        );

        let groups = self.history.misroutes(success_threshold, min_samples).await?;
        let findings = groups
            .into_iter()
            .map(|group| {
                let recommendation = recommend_alternative(&group);
                MisrouteFinding {
                    group,
                    recommendation,
                }
            })
            .collect::<Vec<_>>();

        log::info!("Found {} potential misroutes", findings.len());
        Ok(findings)
    }

    /// Recommend an execution mode for a classified task, preferring the
    /// historically best-performing mode for the tier when enough samples
    /// exist, otherwise falling back to the router's own heuristics.
    pub async fn recommend_model_for_task(
        &self,
        classification: &Classification,
    ) -> Result<RouteRecommendation, HistoryError> {
        let tier = classification.tier.as_str();
        let stats = self.history.routing_stats().await?;

        let mut best: Option<&RoutingStat> = None;
        for stat in stats.iter() {
            if stat.tier.as_deref() == Some(tier) && stat.count >= MIN_SAMPLES {
                match best {
                    Some(current) if current.success_rate >= stat.success_rate => {}
                    _ => best = Some(stat),
                }
            }
        }

        if let Some(best) = best {
            return Ok(RouteRecommendation {
                mode: best.mode.clone(),
                model: self.model_for_mode(&best.mode),
                confidence: best.success_rate.min(MAX_CONFIDENCE),
                reasoning: format!(
                    "Based on {tier} tasks in history, {} has {:.1}% success rate",
                    best.mode,
                    best.success_rate * 100.0
                ),
                historical_success_rate: Some(best.success_rate),
            });
        }

        // No usable history: mirror the router's rule, with zero
        // historical confidence.
        let ch = &classification.characteristics;
        let two_phase = tier == "complex" || (tier == "standard" && ch.creative && ch.multi_file);
        let mode = if two_phase { "two-phase" } else { "single-phase" };
        Ok(RouteRecommendation {
            mode: mode.into(),
            model: self.model_for_mode(mode),
            confidence: 0.0,
            reasoning: format!("{mode} recommended by heuristics (no historical data)"),
            historical_success_rate: None,
        })
    }

    pub async fn get_error_insights(&self, limit: i64) -> Result<ErrorInsights, HistoryError> {
        log::info!("Analyzing error patterns...");

        let errors = self.history.errors(limit).await?;
        if errors.is_empty() {
            return Ok(ErrorInsights::default());
        }

        let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        let mut recoverable_count = 0;
        for error in &errors {
            let classification = self.classifier.classify(
                error.error_msg.as_deref().unwrap_or(""),
                error.error_kind.as_deref(),
            );
            *counts
                .entry(classification.kind.as_str().to_string())
                .or_default() += 1;
            if classification.recoverable {
                recoverable_count += 1;
            }
        }

        let mut by_kind: Vec<(String, usize)> = counts.into_iter().collect();
        by_kind.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        by_kind.truncate(5);

        Ok(ErrorInsights {
            total_errors: errors.len(),
            by_kind,
            recoverable_count,
        })
    }

    /// Suggest routing-threshold changes when one mode clearly outperforms
    /// the other (>= 20% gap, >= 5 samples each).
    pub async fn suggest_threshold_adjustments(
        &self,
    ) -> Result<Vec<ThresholdSuggestion>, HistoryError> {
        log::info!("Analyzing threshold effectiveness...");

        let stats = self.history.routing_stats().await?;
        let mut single = (0i64, 0.0f64);
        let mut two = (0i64, 0.0f64);

        for stat in &stats {
            match stat.mode.as_str() {
                "single-phase" => {
                    single.1 = (single.1 * single.0 as f64
                        + stat.success_rate * stat.count as f64)
                        / (single.0 + stat.count) as f64;
                    single.0 += stat.count;
                }
                "two-phase" => {
                    two.1 = (two.1 * two.0 as f64 + stat.success_rate * stat.count as f64)
                        / (two.0 + stat.count) as f64;
                    two.0 += stat.count;
                }
                _ => {}
            }
        }

        let mut suggestions = Vec::new();
        if single.0 >= 5 && two.0 >= 5 {
            if two.1 > single.1 + 0.2 {
                suggestions.push(ThresholdSuggestion {
                    kind: "increase_two_phase_usage".into(),
                    reason: format!(
                        "Two-phase has {:.1}% success vs single-phase {:.1}%",
                        two.1 * 100.0,
                        single.1 * 100.0
                    ),
                    suggested_action: "Lower complexity threshold for two-phase routing".into(),
                    confidence: 0.7,
                });
            } else if single.1 > two.1 + 0.2 {
                suggestions.push(ThresholdSuggestion {
                    kind: "decrease_two_phase_usage".into(),
                    reason: format!(
                        "Single-phase has {:.1}% success vs two-phase {:.1}%",
                        single.1 * 100.0,
                        two.1 * 100.0
                    ),
                    suggested_action: "Raise complexity threshold for two-phase routing".into(),
                    confidence: 0.7,
                });
            }
        }

        Ok(suggestions)
    }

    fn model_for_mode(&self, mode: &str) -> String {
        if mode == "two-phase" {
            format!("{} + {}", self.planning_model, self.execution_model)
        } else {
            self.execution_model.clone()
        }
    }
}

fn recommend_alternative(group: &MisrouteGroup) -> String {
    let tier = group.tier.as_deref().unwrap_or("unclassified");
    if group.mode == "single-phase" {
        format!(
            "Try two-phase execution for {tier} tasks (currently {:.1}% with single-phase)",
            group.success_rate * 100.0
        )
    } else {
        format!(
            "Try single-phase execution for {tier} tasks (currently {:.1}% with two-phase)",
            group.success_rate * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::schemas::{Characteristics, NewExecution, RouteStrategy, Tier};

    use super::*;

    fn analyzer(history: &ExecutionHistory) -> AdaptiveAnalyzer<'_> {
        AdaptiveAnalyzer::new(history, "openthinker3-7b", "qwen2.5-coder:7b")
    }

    fn execution(tier: &str, mode: &str, success: bool) -> NewExecution {
        NewExecution {
            request: "task".into(),
            tier: Some(tier.into()),
            mode: mode.into(),
            success,
            duration_seconds: 1.0,
            ..Default::default()
        }
    }

    fn classification(tier: Tier) -> Classification {
        Classification {
            tier,
            route: RouteStrategy::ExecutorOnly,
            estimated_swap_seconds: 0.0,
            confidence: 0.9,
            reasoning: String::new(),
            characteristics: Characteristics::default(),
        }
    }

    #[tokio::test]
    async fn test_misroute_finding_recommends_two_phase() {
        let history = ExecutionHistory::in_memory().await.unwrap();
        for i in 0..6 {
            history
                .log_execution(&execution("simple", "single-phase", i == 0))
                .await
                .unwrap();
        }

        let findings = analyzer(&history).detect_misroutes(0.5, 3).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].recommendation.contains("two-phase"));
    }

    #[tokio::test]
    async fn test_recommendation_uses_history_when_samples_exist() {
        let history = ExecutionHistory::in_memory().await.unwrap();
        for _ in 0..4 {
            history
                .log_execution(&execution("complex", "two-phase", true))
                .await
                .unwrap();
        }
        for _ in 0..4 {
            history
                .log_execution(&execution("complex", "single-phase", false))
                .await
                .unwrap();
        }

        let rec = analyzer(&history)
            .recommend_model_for_task(&classification(Tier::Complex))
            .await
            .unwrap();
        assert_eq!(rec.mode, "two-phase");
        assert_eq!(rec.historical_success_rate, Some(1.0));
        assert!(rec.confidence <= MAX_CONFIDENCE);
        assert!(rec.model.contains("openthinker3-7b"));
    }

    #[tokio::test]
    async fn test_recommendation_falls_back_to_heuristics_below_min_samples() {
        let history = ExecutionHistory::in_memory().await.unwrap();
        history
            .log_execution(&execution("complex", "two-phase", true))
            .await
            .unwrap();

        let rec = analyzer(&history)
            .recommend_model_for_task(&classification(Tier::Complex))
            .await
            .unwrap();
        assert_eq!(rec.mode, "two-phase");
        assert!(rec.historical_success_rate.is_none());
        assert_eq!(rec.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_error_insights_counts_by_kind() {
        let history = ExecutionHistory::in_memory().await.unwrap();
        for _ in 0..3 {
            let mut failed = execution("simple", "single-phase", false);
            failed.error_kind = Some("rate_limit".into());
            failed.error_msg = Some("rate limit exceeded".into());
            history.log_execution(&failed).await.unwrap();
        }
        let mut failed = execution("simple", "single-phase", false);
        failed.error_kind = Some("timeout".into());
        failed.error_msg = Some("operation timed out".into());
        history.log_execution(&failed).await.unwrap();

        let insights = analyzer(&history).get_error_insights(50).await.unwrap();
        assert_eq!(insights.total_errors, 4);
        assert_eq!(insights.by_kind[0], ("rate_limit".to_string(), 3));
        assert_eq!(insights.recoverable_count, 4);
    }

    #[tokio::test]
    async fn test_threshold_suggestion_when_two_phase_dominates() {
        let history = ExecutionHistory::in_memory().await.unwrap();
        for _ in 0..6 {
            history
                .log_execution(&execution("standard", "two-phase", true))
                .await
                .unwrap();
        }
        for i in 0..6 {
            history
                .log_execution(&execution("standard", "single-phase", i < 2))
                .await
                .unwrap();
        }

        let suggestions = analyzer(&history)
            .suggest_threshold_adjustments()
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].kind, "increase_two_phase_usage");
    }

    #[tokio::test]
    async fn test_no_suggestions_on_sparse_history() {
        let history = ExecutionHistory::in_memory().await.unwrap();
        history
            .log_execution(&execution("simple", "single-phase", true))
            .await
            .unwrap();
        let suggestions = analyzer(&history)
            .suggest_threshold_adjustments()
            .await
            .unwrap();
        assert!(suggestions.is_empty());
    }
}
