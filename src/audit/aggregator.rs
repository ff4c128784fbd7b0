//! Reducing per-claim judgments to a faithfulness score.
//!
//! Everything here is a pure function of the verifications and a
//! [`ScoringConfig`], so the same input always produces identical output.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::info;

use super::types::{ClaimVerification, VerificationStatus};

/// Scoring weights and hallucination thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub supported_score: f64,
    pub partially_supported_score: f64,
    pub unsupported_score: f64,
    /// Score for claims that could not be judged
    pub unknown_score: f64,
    /// Floor applied to each claim's confidence weight
    pub min_weight: f64,
    /// An unsupported claim above this confidence flags hallucination
    pub high_confidence_threshold: f64,
    /// A share of unsupported or partial claims above this flags hallucination
    pub problematic_ratio_threshold: f64,
    /// Unsupported claims listed in the trace
    pub max_flagged_examples: usize,
    /// Characters kept per listed claim
    pub example_max_chars: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            supported_score: 1.0,
            partially_supported_score: 0.5,
            unsupported_score: 0.0,
            unknown_score: 0.3,
            min_weight: 0.1,
            high_confidence_threshold: 0.7,
            problematic_ratio_threshold: 0.3,
            max_flagged_examples: 5,
            example_max_chars: 100,
        }
    }
}

impl ScoringConfig {
    pub fn with_high_confidence_threshold(mut self, threshold: f64) -> Self {
        self.high_confidence_threshold = threshold;
        self
    }

    pub fn with_problematic_ratio_threshold(mut self, threshold: f64) -> Self {
        self.problematic_ratio_threshold = threshold;
        self
    }

    pub fn with_unknown_score(mut self, score: f64) -> Self {
        self.unknown_score = score;
        self
    }

    pub fn base_score(&self, status: VerificationStatus) -> f64 {
        match status {
            VerificationStatus::Supported => self.supported_score,
            VerificationStatus::PartiallySupported => self.partially_supported_score,
            VerificationStatus::Unsupported => self.unsupported_score,
            VerificationStatus::Unknown => self.unknown_score,
        }
    }
}

/// Why a response was flagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HallucinationTrigger {
    /// A single unsupported claim judged with high confidence
    HighConfidenceUnsupported { claim_index: usize, confidence: f64 },
    /// Too many claims unsupported or only partially supported
    ProblematicRatio { ratio: f64 },
}

/// Score, flag and explanation for a set of verifications.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOutcome {
    pub score: f64,
    pub hallucination: bool,
    pub trigger: Option<HallucinationTrigger>,
    pub trace: String,
}

/// Confidence-weighted mean of per-status base scores; 0.0 when empty.
pub fn faithfulness_score(verifications: &[ClaimVerification], config: &ScoringConfig) -> f64 {
    let (weighted_sum, total_weight) =
        verifications
            .iter()
            .fold((0.0f64, 0.0f64), |(sum, total), v| {
                let weight = v.confidence.max(config.min_weight);
                (sum + config.base_score(v.status) * weight, total + weight)
            });

    if total_weight <= 0.0 {
        return 0.0;
    }
    (weighted_sum / total_weight).clamp(0.0, 1.0)
}

/// First hallucination condition met, if any.
pub fn detect_hallucination(
    verifications: &[ClaimVerification],
    config: &ScoringConfig,
) -> Option<HallucinationTrigger> {
    if verifications.is_empty() {
        return None;
    }

    if let Some((claim_index, v)) = verifications.iter().enumerate().find(|(_, v)| {
        v.status == VerificationStatus::Unsupported
            && v.confidence > config.high_confidence_threshold
    }) {
        return Some(HallucinationTrigger::HighConfidenceUnsupported {
            claim_index,
            confidence: v.confidence,
        });
    }

    let problematic = verifications
        .iter()
        .filter(|v| v.status.is_problematic())
        .count();
    let ratio = problematic as f64 / verifications.len() as f64;
    (ratio > config.problematic_ratio_threshold)
        .then_some(HallucinationTrigger::ProblematicRatio { ratio })
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Human-readable explanation: score, per-status breakdown, flagged claims.
pub fn reasoning_trace(
    verifications: &[ClaimVerification],
    score: f64,
    config: &ScoringConfig,
) -> String {
    let total = verifications.len();
    let mut trace = String::new();

    let _ = writeln!(trace, "Faithfulness Score: {:.2}/1.00", score);
    let _ = writeln!(trace);
    let _ = writeln!(trace, "Total Claims Analyzed: {}", total);

    for (status, mark) in [
        (VerificationStatus::Supported, '✓'),
        (VerificationStatus::PartiallySupported, '⚠'),
        (VerificationStatus::Unsupported, '✗'),
        (VerificationStatus::Unknown, '?'),
    ] {
        let count = verifications.iter().filter(|v| v.status == status).count();
        let pct = if total == 0 {
            0.0
        } else {
            count as f64 / total as f64 * 100.0
        };
        let _ = writeln!(trace, "  {} {}: {} ({:.1}%)", mark, status.label(), count, pct);
    }

    let unsupported: Vec<&ClaimVerification> = verifications
        .iter()
        .filter(|v| v.status == VerificationStatus::Unsupported)
        .collect();
    if !unsupported.is_empty() {
        let _ = writeln!(trace);
        let _ = writeln!(trace, "Unsupported Claims:");
        for (i, v) in unsupported.iter().take(config.max_flagged_examples).enumerate() {
            let _ = writeln!(
                trace,
                "  {}. {}",
                i + 1,
                truncate_chars(v.claim.as_str(), config.example_max_chars)
            );
        }
        if unsupported.len() > config.max_flagged_examples {
            let _ = writeln!(
                trace,
                "  ... and {} more",
                unsupported.len() - config.max_flagged_examples
            );
        }
    }

    trace.trim_end().to_string()
}

/// Score, flag and explain `verifications`.
pub fn aggregate(verifications: &[ClaimVerification], config: &ScoringConfig) -> AggregateOutcome {
    let score = faithfulness_score(verifications, config);
    let trigger = detect_hallucination(verifications, config);

    match &trigger {
        Some(HallucinationTrigger::HighConfidenceUnsupported {
            claim_index,
            confidence,
        }) => info!(
            claim_index,
            confidence, "Hallucination detected: high-confidence unsupported claim"
        ),
        Some(HallucinationTrigger::ProblematicRatio { ratio }) => info!(
            ratio,
            "Hallucination detected: too many unsupported or partially supported claims"
        ),
        None => {}
    }

    AggregateOutcome {
        score,
        hallucination: trigger.is_some(),
        trigger,
        trace: reasoning_trace(verifications, score, config),
    }
}
