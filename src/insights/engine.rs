//! Suggestion engine: a registry of detector predicates plus the stable
//! ranking the dashboard relies on.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::stats::AggregateStats;

/// Suggestion urgency. Ordering is part of the contract: high outranks
/// medium outranks low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

/// A ranked suggestion for the provider's dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub confidence: f64,
}

/// Context passed to each detector. Built per call; nothing outlives `run`.
pub struct DetectorContext {
    pub today: NaiveDate,
}

impl DetectorContext {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }
}

/// Function signature for a detector predicate. Pure: statistics in,
/// suggestions out, no store access.
pub type DetectorFn = fn(&AggregateStats, &DetectorContext) -> Vec<Suggestion>;

/// A registered detector.
pub struct DetectorEntry {
    pub name: &'static str,
    pub detector: DetectorFn,
}

/// The suggestion engine: an ordered detector registry.
#[derive(Default)]
pub struct SuggestionEngine {
    detectors: Vec<DetectorEntry>,
}

impl SuggestionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, detector: DetectorFn) {
        self.detectors.push(DetectorEntry { name, detector });
    }

    /// Run every detector in registration order and rank the result.
    pub fn run(&self, stats: &AggregateStats, ctx: &DetectorContext) -> Vec<Suggestion> {
        let mut suggestions = Vec::new();
        for entry in &self.detectors {
            let found = (entry.detector)(stats, ctx);
            if !found.is_empty() {
                log::debug!("Detector {} emitted {} suggestion(s)", entry.name, found.len());
            }
            suggestions.extend(found);
        }
        rank_suggestions(&mut suggestions);
        suggestions
    }
}

/// Sort by priority (high first), tie-break by confidence descending. The
/// sort is stable, so equal pairs keep their insertion order and the ranking
/// is reproducible run to run.
pub fn rank_suggestions(suggestions: &mut [Suggestion]) {
    suggestions.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then_with(|| b.confidence.total_cmp(&a.confidence))
    });
}

/// Build the default engine with the fixed detector set registered.
pub fn default_engine() -> SuggestionEngine {
    use super::detectors;

    let mut engine = SuggestionEngine::new();
    engine.register("detect_inactivity", detectors::detect_inactivity);
    engine.register("detect_collection_lag", detectors::detect_collection_lag);
    engine.register(
        "detect_category_concentration",
        detectors::detect_category_concentration,
    );
    engine.register("detect_demand_drop", detectors::detect_demand_drop);
    engine.register("detect_demand_surge", detectors::detect_demand_surge);
    engine
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggestion(kind: &str, priority: Priority, confidence: f64) -> Suggestion {
        Suggestion {
            kind: kind.to_string(),
            title: kind.to_string(),
            description: String::new(),
            priority,
            confidence,
        }
    }

    #[test]
    fn ranking_orders_priority_then_confidence() {
        let mut suggestions = vec![
            suggestion("a", Priority::Low, 0.9),
            suggestion("b", Priority::High, 0.6),
            suggestion("c", Priority::Medium, 0.8),
            suggestion("d", Priority::High, 0.9),
        ];
        rank_suggestions(&mut suggestions);

        let kinds: Vec<&str> = suggestions.iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(kinds, vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn equal_pairs_keep_insertion_order() {
        let mut suggestions = vec![
            suggestion("first", Priority::Medium, 0.7),
            suggestion("second", Priority::Medium, 0.7),
            suggestion("third", Priority::Medium, 0.7),
        ];
        rank_suggestions(&mut suggestions);

        let kinds: Vec<&str> = suggestions.iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(kinds, vec!["first", "second", "third"]);
    }

    #[test]
    fn custom_detector_flows_through_run() {
        fn always(_stats: &AggregateStats, _ctx: &DetectorContext) -> Vec<Suggestion> {
            vec![Suggestion {
                kind: "test".to_string(),
                title: "Test".to_string(),
                description: "Detail".to_string(),
                priority: Priority::Low,
                confidence: 0.5,
            }]
        }

        let mut engine = SuggestionEngine::new();
        engine.register("always", always);

        let stats = AggregateStats::default();
        let ctx = DetectorContext::new(chrono::NaiveDate::from_ymd_opt(2026, 3, 15).unwrap());
        let suggestions = engine.run(&stats, &ctx);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].kind, "test");
    }

    #[test]
    fn suggestion_serializes_with_type_key() {
        let json = serde_json::to_value(suggestion("retention", Priority::High, 0.8)).unwrap();
        assert_eq!(json["type"], "retention");
        assert_eq!(json["priority"], "high");
    }
}
