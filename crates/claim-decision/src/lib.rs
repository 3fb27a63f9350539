//! C7 Decision Engine (§4.7): a pure function over `(confidence, fraud_risk,
//! contradictions, missing_evidence)`. No I/O, no clock, no randomness —
//! grounded on the teacher's `LaneThresholds::lane_for`, a pure
//! threshold-table lookup over declarative config.

use claim_core::{DecisionThresholds, Verdict};

/// The outcome of one decision-engine evaluation (§4.7).
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    pub verdict: Verdict,
    pub auto_approved: bool,
    pub human_review_required: bool,
    pub requested_data: Vec<String>,
    pub review_reasons: Vec<String>,
}

/// Inputs the Decision Engine needs, all already computed by upstream
/// stages — it reads, never recomputes, confidence or fraud risk.
pub struct DecisionInput<'a> {
    pub final_confidence: f64,
    pub fraud_risk: f64,
    pub contradictions: &'a [String],
    pub missing_evidence: &'a [String],
    pub evidence_kinds_present: &'a [&'a str],
}

/// Evaluate the rule table R1–R6, top to bottom, first match wins.
pub fn decide(input: &DecisionInput<'_>, thresholds: &DecisionThresholds) -> Decision {
    let c = input.final_confidence;
    let f = input.fraud_risk;
    let k = input.contradictions.len();

    let verdict = if f >= thresholds.fraud_detected_threshold {
        Verdict::FraudDetected
    } else if c >= thresholds.auto_approve_confidence && k == 0 && f < thresholds.auto_approve_fraud_max {
        Verdict::AutoApproved
    } else if c >= thresholds.approved_with_review_min && k == 0 {
        Verdict::ApprovedWithReview
    } else if c >= thresholds.needs_review_min {
        Verdict::NeedsReview
    } else if c >= thresholds.needs_more_data_min {
        Verdict::NeedsMoreData
    } else {
        Verdict::InsufficientData
    };

    let human_review_required = verdict != Verdict::AutoApproved;
    let auto_approved = verdict == Verdict::AutoApproved;

    let requested_data = if matches!(verdict, Verdict::NeedsMoreData | Verdict::InsufficientData) {
        if !input.missing_evidence.is_empty() {
            input.missing_evidence.to_vec()
        } else {
            ["document", "image"]
                .into_iter()
                .filter(|kind| !input.evidence_kinds_present.contains(kind))
                .map(String::from)
                .collect()
        }
    } else {
        Vec::new()
    };

    let mut review_reasons = Vec::new();
    if c < thresholds.auto_approve_confidence {
        review_reasons.push(format!("confidence {c:.2} below auto-approve threshold {:.2}", thresholds.auto_approve_confidence));
    }
    if k >= 1 {
        review_reasons.push(format!("{k} contradiction(s) detected"));
    }
    if f >= thresholds.auto_approve_fraud_max {
        review_reasons.push(format!("fraud risk {f:.2} at or above {:.2}", thresholds.auto_approve_fraud_max));
    }
    if !input.missing_evidence.is_empty() {
        review_reasons.push(format!("missing evidence: {}", input.missing_evidence.join(", ")));
    }

    Decision { verdict, auto_approved, human_review_required, requested_data, review_reasons }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(c: f64, f: f64, k: &'a [String], m: &'a [String], present: &'a [&'a str]) -> DecisionInput<'a> {
        DecisionInput {
            final_confidence: c,
            fraud_risk: f,
            contradictions: k,
            missing_evidence: m,
            evidence_kinds_present: present,
        }
    }

    #[test]
    fn r1_fraud_detected_wins_regardless_of_confidence() {
        let thresholds = DecisionThresholds::default();
        let d = decide(&input(0.99, 0.70, &[], &[], &["document", "image"]), &thresholds);
        assert_eq!(d.verdict, Verdict::FraudDetected);
        assert!(d.human_review_required);
    }

    #[test]
    fn r2_auto_approved_boundary_inclusive() {
        let thresholds = DecisionThresholds::default();
        let d = decide(&input(0.95, 0.29, &[], &[], &["document", "image"]), &thresholds);
        assert_eq!(d.verdict, Verdict::AutoApproved);
        assert!(d.auto_approved);
        assert!(!d.human_review_required);
    }

    #[test]
    fn r2_fails_on_any_contradiction() {
        let thresholds = DecisionThresholds::default();
        let contradictions = vec!["amount mismatch".to_string()];
        let d = decide(&input(0.99, 0.1, &contradictions, &[], &["document", "image"]), &thresholds);
        assert_eq!(d.verdict, Verdict::ApprovedWithReview);
    }

    #[test]
    fn r3_approved_with_review() {
        let thresholds = DecisionThresholds::default();
        let d = decide(&input(0.85, 0.5, &[], &[], &["document", "image"]), &thresholds);
        assert_eq!(d.verdict, Verdict::ApprovedWithReview);
    }

    #[test]
    fn r5_requested_data_defaults_to_missing_evidence_kinds() {
        let thresholds = DecisionThresholds::default();
        let d = decide(&input(0.55, 0.1, &[], &[], &["document"]), &thresholds);
        assert_eq!(d.verdict, Verdict::NeedsMoreData);
        assert_eq!(d.requested_data, vec!["image".to_string()]);
    }

    #[test]
    fn r6_insufficient_data_below_all_thresholds() {
        let thresholds = DecisionThresholds::default();
        let d = decide(&input(0.1, 0.1, &[], &[], &[]), &thresholds);
        assert_eq!(d.verdict, Verdict::InsufficientData);
        assert_eq!(d.requested_data.len(), 2);
    }

    #[test]
    fn determinism_same_input_same_output() {
        let thresholds = DecisionThresholds::default();
        let a = decide(&input(0.72, 0.2, &[], &[], &["document", "image"]), &thresholds);
        let b = decide(&input(0.72, 0.2, &[], &[], &["document", "image"]), &thresholds);
        assert_eq!(a, b);
    }
}
