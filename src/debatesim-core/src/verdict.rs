//! Verdict aggregation across the four judging layers.
//!
//! The anonymized engagement verdict is authoritative for the winner.
//! The rubric, the mechanical tally, and the argument audit corroborate
//! it and supply the margin and the narrative.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::ArgumentAudit;
use crate::engagement::{Consistency, EngagementVerdict};
use crate::error::DebateError;
use crate::rubric::RubricScorecard;
use crate::speaker::Side;
use crate::tally::{Margin, MechanicalTally};
use crate::transcript::Transcript;

/// Which layer ultimately supplied the winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecidedBy {
    Engagement,
    Tally,
    Rubric,
}

/// Per-layer completeness flags. A verdict is never silently partial;
/// any degradation is visible here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LayerCompleteness {
    pub rubric: bool,
    pub tally: bool,
    pub engagement: bool,
    pub one_sided_annotation: bool,
}

impl LayerCompleteness {
    pub fn all(&self) -> bool {
        self.rubric && self.tally && self.engagement && !self.one_sided_annotation
    }
}

/// The merged decision with all layer evidence attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub winner: Side,
    pub margin: Margin,
    pub consistency: Consistency,
    pub decided_by: DecidedBy,
    pub summary: String,
    pub completeness: LayerCompleteness,
    pub rubric: RubricScorecard,
    pub tally: MechanicalTally,
    pub engagement: EngagementVerdict,
    pub audit: ArgumentAudit,
}

/// The serializable product of a full run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateReport {
    pub transcript: Transcript,
    pub verdict: Verdict,
}

/// Merge the four layers into one decision.
///
/// Falls back to the tally, then the rubric, when the engagement panels
/// produced no majority at all; errors only when every layer is empty.
pub fn aggregate(
    rubric: RubricScorecard,
    tally: MechanicalTally,
    engagement: EngagementVerdict,
    audit: ArgumentAudit,
) -> Result<Verdict, DebateError> {
    let (winner, decided_by) = if let Some(side) = engagement.winner {
        (side, DecidedBy::Engagement)
    } else if let Some(side) = tally.winner {
        (side, DecidedBy::Tally)
    } else if let Some(side) = rubric.winner {
        (side, DecidedBy::Rubric)
    } else {
        return Err(DebateError::VerdictUnavailable);
    };

    let contested = engagement.consistency == Consistency::Contested;
    // A contested verdict is by definition a close contest; the tally's
    // margin only applies when the decisive layer held firm.
    let margin = if contested {
        Margin::Narrow
    } else if !tally.claims.is_empty() {
        tally.margin
    } else if !rubric.scores.is_empty() {
        Margin::from_totals(rubric.prop_total, rubric.opp_total)
    } else {
        Margin::Narrow
    };

    let completeness = LayerCompleteness {
        rubric: rubric.complete,
        tally: tally.complete,
        engagement: engagement.complete,
        one_sided_annotation: tally.one_sided_warning,
    };

    let summary = build_summary(
        winner, margin, contested, decided_by, &rubric, &tally, &engagement, &audit,
    );

    info!(
        winner = winner.label(),
        margin = margin.label(),
        contested,
        "verdict aggregated"
    );

    Ok(Verdict {
        winner,
        margin,
        consistency: engagement.consistency,
        decided_by,
        summary,
        completeness,
        rubric,
        tally,
        engagement,
        audit,
    })
}

#[allow(clippy::too_many_arguments)]
fn build_summary(
    winner: Side,
    margin: Margin,
    contested: bool,
    decided_by: DecidedBy,
    rubric: &RubricScorecard,
    tally: &MechanicalTally,
    engagement: &EngagementVerdict,
    audit: &ArgumentAudit,
) -> String {
    let mut lines = Vec::new();

    if contested {
        lines.push(format!(
            "CLOSE CONTEST: the anonymized passes disagreed (pass 1: {}, pass 2: {}). \
             Reporting pass 1's result, {} by a {} margin, with the disagreement on record.",
            engagement
                .pass1
                .winner
                .map_or("no majority".to_string(), |s| s.display_name().to_string()),
            engagement
                .pass2
                .winner
                .map_or("no majority".to_string(), |s| s.display_name().to_string()),
            winner.display_name(),
            margin.label(),
        ));
    } else {
        lines.push(format!(
            "{} wins by a {} margin.",
            winner.display_name(),
            margin.label()
        ));
    }

    match decided_by {
        DecidedBy::Engagement => {
            lines.push(format!(
                "Decided by the anonymized engagement panels ({} + {} votes cast).",
                engagement.pass1.votes.len(),
                engagement.pass2.votes.len()
            ));
        }
        DecidedBy::Tally => {
            lines.push("Decided by the mechanical tally; the engagement panels produced no majority.".to_string());
        }
        DecidedBy::Rubric => {
            lines.push("Decided by rubric totals; neither the engagement panels nor the tally produced a result.".to_string());
        }
    }

    lines.push(format!(
        "Mechanical tally: PROPOSITION {:.1} — OPPOSITION {:.1}{}.",
        tally.prop_total,
        tally.opp_total,
        match tally.winner {
            Some(s) if s == winner => " (corroborates)",
            Some(_) => " (disagrees)",
            None => "",
        }
    ));
    lines.push(format!(
        "Rubric totals: PROPOSITION {:.1} — OPPOSITION {:.1}{}.",
        rubric.prop_total,
        rubric.opp_total,
        match rubric.winner {
            Some(s) if s == winner => " (corroborates)",
            Some(_) => " (disagrees)",
            None => "",
        }
    ));
    lines.push(audit.narrative.clone());

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::audit_argument_graph;
    use crate::engagement::PassResult;
    use crate::tally::compute_tally;

    fn tally_for(prop_claims: usize, opp_claims: usize) -> MechanicalTally {
        let mut claims = Vec::new();
        for _ in 0..prop_claims {
            claims.push(crate::tally::Claim {
                side: Side::Proposition,
                position: 1,
                summary: "p".to_string(),
                claim_type: crate::tally::ClaimType::Principled,
                specific: false,
                status: crate::tally::RebuttalStatus::default(),
            });
        }
        for _ in 0..opp_claims {
            claims.push(crate::tally::Claim {
                side: Side::Opposition,
                position: 2,
                summary: "o".to_string(),
                claim_type: crate::tally::ClaimType::Principled,
                specific: false,
                status: crate::tally::RebuttalStatus::default(),
            });
        }
        compute_tally(claims, Vec::new())
    }

    fn engagement_with(
        pass1: Option<Side>,
        pass2: Option<Side>,
        winner: Option<Side>,
        consistency: Consistency,
    ) -> EngagementVerdict {
        EngagementVerdict {
            pass1: PassResult {
                pass: 1,
                votes: Vec::new(),
                winner: pass1,
            },
            pass2: PassResult {
                pass: 2,
                votes: Vec::new(),
                winner: pass2,
            },
            consistency,
            winner,
            complete: true,
        }
    }

    fn empty_rubric() -> RubricScorecard {
        RubricScorecard {
            scores: Vec::new(),
            prop_total: 0.0,
            opp_total: 0.0,
            winner: None,
            complete: true,
        }
    }

    #[test]
    fn test_engagement_is_authoritative() {
        // The tally favors Proposition but the engagement verdict wins.
        let tally = tally_for(5, 1);
        let audit = audit_argument_graph(&tally);
        let engagement = engagement_with(
            Some(Side::Opposition),
            Some(Side::Opposition),
            Some(Side::Opposition),
            Consistency::Robust,
        );

        let verdict = aggregate(empty_rubric(), tally, engagement, audit).unwrap();
        assert_eq!(verdict.winner, Side::Opposition);
        assert_eq!(verdict.decided_by, DecidedBy::Engagement);
        assert!(verdict.summary.contains("(disagrees)"));
    }

    #[test]
    fn test_contested_verdict_reports_close_contest() {
        let tally = tally_for(6, 1);
        let audit = audit_argument_graph(&tally);
        let engagement = engagement_with(
            Some(Side::Opposition),
            Some(Side::Proposition),
            Some(Side::Opposition),
            Consistency::Contested,
        );

        let verdict = aggregate(empty_rubric(), tally, engagement, audit).unwrap();
        assert_eq!(verdict.winner, Side::Opposition);
        assert_eq!(verdict.consistency, Consistency::Contested);
        // Contested overrides whatever margin the tally suggested.
        assert_eq!(verdict.margin, Margin::Narrow);
        assert!(verdict.summary.contains("CLOSE CONTEST"));
    }

    #[test]
    fn test_fallback_to_tally_when_panels_split() {
        let tally = tally_for(4, 1);
        let audit = audit_argument_graph(&tally);
        let engagement = engagement_with(None, None, None, Consistency::Contested);

        let verdict = aggregate(empty_rubric(), tally, engagement, audit).unwrap();
        assert_eq!(verdict.winner, Side::Proposition);
        assert_eq!(verdict.decided_by, DecidedBy::Tally);
    }

    #[test]
    fn test_unavailable_when_every_layer_empty() {
        let tally = compute_tally(Vec::new(), Vec::new());
        let audit = audit_argument_graph(&tally);
        let engagement = engagement_with(None, None, None, Consistency::Contested);

        let result = aggregate(empty_rubric(), tally, engagement, audit);
        assert!(matches!(result, Err(DebateError::VerdictUnavailable)));
    }

    #[test]
    fn test_completeness_tracks_one_sided_warning() {
        let mut tally = tally_for(3, 2);
        tally.one_sided_warning = true;
        let audit = audit_argument_graph(&tally);
        let engagement = engagement_with(
            Some(Side::Proposition),
            Some(Side::Proposition),
            Some(Side::Proposition),
            Consistency::Robust,
        );

        let verdict = aggregate(empty_rubric(), tally, engagement, audit).unwrap();
        assert!(!verdict.completeness.all());
        assert!(verdict.completeness.rubric);
    }

    #[test]
    fn test_report_round_trips_through_json() {
        let tally = tally_for(3, 2);
        let audit = audit_argument_graph(&tally);
        let engagement = engagement_with(
            Some(Side::Proposition),
            Some(Side::Proposition),
            Some(Side::Proposition),
            Consistency::Robust,
        );
        let verdict = aggregate(empty_rubric(), tally, engagement, audit).unwrap();
        let report = DebateReport {
            transcript: crate::transcript::test_support::six_speech_transcript(
                "This house would archive its debates",
            ),
            verdict,
        };

        let json = serde_json::to_string(&report).unwrap();
        let restored: DebateReport = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.verdict.winner, report.verdict.winner);
        assert_eq!(restored.verdict.summary, report.verdict.summary);
        assert_eq!(
            restored.transcript.formatted(),
            report.transcript.formatted()
        );
    }
}
