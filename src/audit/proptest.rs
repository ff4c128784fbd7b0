//! Property-based tests for auditing using proptest.
//!
//! Covers the invariants the scoring and parsing code must hold for any
//! input:
//!
//! - Scores stay within [0, 1] and empty input scores 0 without a flag
//! - A high-confidence unsupported claim always flags hallucination
//! - Aggregation is a pure function
//! - Extracted claims are longer than five characters
//! - Merged evidence never repeats a text

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    use crate::audit::aggregator::{aggregate, ScoringConfig};
    use crate::audit::extractor::ClaimExtractor;
    use crate::audit::types::{Claim, ClaimVerification, VerificationStatus};
    use crate::audit::verifier::parse_verification;
    use crate::retrieval::merge_unique;
    use crate::testing::ScriptedClient;

    fn status() -> impl Strategy<Value = VerificationStatus> {
        prop_oneof![
            Just(VerificationStatus::Supported),
            Just(VerificationStatus::PartiallySupported),
            Just(VerificationStatus::Unsupported),
            Just(VerificationStatus::Unknown),
        ]
    }

    fn verification() -> impl Strategy<Value = ClaimVerification> {
        ("[a-z ]{6,40}", status(), 0.0f64..=1.0f64).prop_map(|(text, status, confidence)| {
            ClaimVerification::new(Claim::new(text), status, confidence)
        })
    }

    fn extractor() -> ClaimExtractor {
        ClaimExtractor::new(Arc::new(ScriptedClient::new(Vec::<String>::new())))
    }

    fn verifications() -> impl Strategy<Value = Vec<ClaimVerification>> {
        prop::collection::vec(verification(), 0..12)
    }

    // =========================================================================
    // Aggregation
    // =========================================================================

    proptest! {
        #[test]
        fn score_is_bounded(vs in verifications()) {
            let outcome = aggregate(&vs, &ScoringConfig::default());
            prop_assert!(
                (0.0..=1.0).contains(&outcome.score),
                "score {} out of range",
                outcome.score
            );
        }

        #[test]
        fn unsupported_high_confidence_flags(
            vs in prop::collection::vec(verification(), 1..12),
            idx in any::<prop::sample::Index>(),
            confidence in 0.71f64..=1.0f64,
        ) {
            let mut vs = vs;
            let i = idx.index(vs.len());
            vs[i] = ClaimVerification::new(
                vs[i].claim.clone(),
                VerificationStatus::Unsupported,
                confidence,
            );

            prop_assert!(aggregate(&vs, &ScoringConfig::default()).hallucination);
        }

        #[test]
        fn replacing_supported_never_clears_flag(
            vs in verifications(),
            confidence in 0.71f64..=1.0f64,
        ) {
            let config = ScoringConfig::default();
            let before = aggregate(&vs, &config).hallucination;

            let replaced: Vec<_> = vs
                .iter()
                .map(|v| match v.status {
                    VerificationStatus::Supported => ClaimVerification::new(
                        v.claim.clone(),
                        VerificationStatus::Unsupported,
                        confidence,
                    ),
                    _ => v.clone(),
                })
                .collect();
            let had_supported = vs.iter().any(|v| v.status == VerificationStatus::Supported);
            let after = aggregate(&replaced, &config).hallucination;

            prop_assert!(after || !before);
            if had_supported {
                prop_assert!(after);
            }
        }

        #[test]
        fn aggregation_is_pure(vs in verifications()) {
            let config = ScoringConfig::default();
            let first = aggregate(&vs, &config);
            let second = aggregate(&vs, &config);

            prop_assert_eq!(first.score.to_bits(), second.score.to_bits());
            prop_assert_eq!(first.hallucination, second.hallucination);
            prop_assert_eq!(first.trace, second.trace);
        }

        #[test]
        fn all_supported_never_flags(n in 1usize..12, confidence in 0.0f64..=1.0f64) {
            let vs: Vec<_> = (0..n)
                .map(|i| ClaimVerification::new(
                    Claim::new(format!("supported claim {}", i)),
                    VerificationStatus::Supported,
                    confidence,
                ))
                .collect();
            let outcome = aggregate(&vs, &ScoringConfig::default());

            prop_assert!(!outcome.hallucination);
            prop_assert!((outcome.score - 1.0).abs() < 1e-9);
        }
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    proptest! {
        #[test]
        fn parsed_claims_are_long_enough(items in prop::collection::vec("[ a-zA-Z]{0,20}", 0..10)) {
            let content = serde_json::to_string(&items).unwrap();
            let extractor = extractor();

            let claims = extractor.parse_claims(&content).unwrap();

            for claim in &claims {
                prop_assert!(claim.as_str().trim().chars().count() > 5);
            }
            let expected = items.iter().filter(|s| s.trim().chars().count() > 5).count();
            prop_assert_eq!(claims.len(), expected);
        }

        #[test]
        fn prose_output_is_rejected(text in "[a-zA-Z ,.]{0,80}") {
            let extractor = extractor();
            prop_assert!(extractor.parse_claims(&text).is_none());
        }

        #[test]
        fn parsed_confidence_is_bounded(confidence in -1000.0f64..1000.0f64) {
            let content = format!(r#"{{"status": "SUPPORTED", "confidence": {}}}"#, confidence);
            let v = parse_verification(&Claim::new("Paris is in France"), &content).unwrap();
            prop_assert!((0.0..=1.0).contains(&v.confidence));
        }
    }

    // =========================================================================
    // Evidence merging
    // =========================================================================

    proptest! {
        #[test]
        fn merged_evidence_is_unique(texts in prop::collection::vec("[abc]{1,3}", 0..30)) {
            let merged = merge_unique(texts.clone());

            let unique: HashSet<&String> = merged.iter().collect();
            prop_assert_eq!(unique.len(), merged.len());

            let distinct: HashSet<&String> = texts.iter().collect();
            prop_assert_eq!(merged.len(), distinct.len());
        }
    }
}
