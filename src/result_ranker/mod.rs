//! ResultRanker - shapes raw engine output for display
//!
//! Sorts predictions by probability (highest first, ties keep engine order),
//! drops entries below the confidence threshold and computes the one-decimal
//! display percentage. Probabilities are passed through as-is; nothing here
//! re-normalizes them.

use serde::Serialize;

use crate::inference_engine::Prediction;

/// One row of the ranked result list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub label: String,
    pub probability: f32,
    /// Display percentage with one decimal, clamped to [0, 100]
    pub percent: f32,
    /// Set on the overall highest prediction
    pub is_top: bool,
}

/// Ranking outcome
#[derive(Debug, Clone, PartialEq)]
pub enum RankedResult {
    /// Engine produced nothing
    NoPredictions,
    /// Every prediction fell below the threshold
    BelowThreshold,
    /// Non-empty, sorted descending
    Ranked(Vec<RankedEntry>),
}

impl RankedResult {
    pub fn entries(&self) -> &[RankedEntry] {
        match self {
            RankedResult::Ranked(entries) => entries,
            _ => &[],
        }
    }

    pub fn top(&self) -> Option<&RankedEntry> {
        self.entries().first()
    }
}

/// `round(p * 1000) / 10`, clamped to the bar range
pub fn display_percent(probability: f32) -> f32 {
    if !probability.is_finite() {
        return 0.0;
    }
    ((probability * 1000.0).round() / 10.0).clamp(0.0, 100.0)
}

/// Rank predictions against a confidence threshold
pub fn rank(predictions: &[Prediction], threshold: f32) -> RankedResult {
    if predictions.is_empty() {
        return RankedResult::NoPredictions;
    }

    let mut sorted: Vec<&Prediction> = predictions.iter().collect();
    // sort_by is stable, so equal probabilities keep engine order
    sorted.sort_by(|a, b| b.probability.total_cmp(&a.probability));

    let entries: Vec<RankedEntry> = sorted
        .iter()
        .enumerate()
        .filter(|(_, p)| p.probability >= threshold)
        .map(|(index, p)| RankedEntry {
            label: p.label.clone(),
            probability: p.probability,
            percent: display_percent(p.probability),
            is_top: index == 0,
        })
        .collect();

    if entries.is_empty() {
        RankedResult::BelowThreshold
    } else {
        RankedResult::Ranked(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predictions(items: &[(&str, f32)]) -> Vec<Prediction> {
        items
            .iter()
            .map(|(label, p)| Prediction::new(*label, *p))
            .collect()
    }

    fn labels(result: &RankedResult) -> Vec<&str> {
        result.entries().iter().map(|e| e.label.as_str()).collect()
    }

    #[test]
    fn test_sorts_descending() {
        let result = rank(&predictions(&[("A", 0.1), ("B", 0.7), ("C", 0.2)]), 0.0);
        assert_eq!(labels(&result), vec!["B", "C", "A"]);

        let top = result.top().unwrap();
        assert!(top.is_top);
        assert_eq!(top.percent, 70.0);
        assert!(result.entries()[1..].iter().all(|e| !e.is_top));
    }

    #[test]
    fn test_ties_keep_engine_order() {
        let result = rank(&predictions(&[("A", 0.5), ("B", 0.5)]), 0.0);
        assert_eq!(labels(&result), vec!["A", "B"]);
        assert!(result.entries()[0].is_top);
    }

    #[test]
    fn test_threshold_filters() {
        let result = rank(&predictions(&[("A", 0.1), ("B", 0.7), ("C", 0.2)]), 0.5);
        assert_eq!(labels(&result), vec!["B"]);

        // threshold is inclusive
        let result = rank(&predictions(&[("A", 0.5), ("B", 0.49)]), 0.5);
        assert_eq!(labels(&result), vec!["A"]);
    }

    #[test]
    fn test_empty_input_is_no_predictions() {
        assert_eq!(rank(&[], 0.0), RankedResult::NoPredictions);
        assert_eq!(rank(&[], 0.9), RankedResult::NoPredictions);
    }

    #[test]
    fn test_all_filtered_is_below_threshold() {
        let result = rank(&predictions(&[("A", 0.1), ("B", 0.2)]), 0.5);
        assert_eq!(result, RankedResult::BelowThreshold);
    }

    #[test]
    fn test_display_percent() {
        assert_eq!(display_percent(0.12345), 12.3);
        assert_eq!(display_percent(0.9996), 100.0);
        assert_eq!(display_percent(1.2), 100.0);
        assert_eq!(display_percent(-0.1), 0.0);
        assert_eq!(display_percent(f32::NAN), 0.0);
    }

    #[test]
    fn test_probabilities_not_renormalized() {
        let result = rank(&predictions(&[("A", 0.3), ("B", 0.3)]), 0.0);
        let total: f32 = result.entries().iter().map(|e| e.probability).sum();
        assert!((total - 0.6).abs() < 1e-6);
    }
}
