//! Layer 3: argument graph audit.
//!
//! A structural survival analysis over Layer 2a's claims and rebuttal
//! links. Informational only; it never decides a winner.

use serde::{Deserialize, Serialize};

use crate::speaker::Side;
use crate::tally::{MechanicalTally, RebuttalClass, RebuttalStatus};

/// One labeled edge in the argument graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEdge {
    pub claim_index: usize,
    pub rebutting_side: Side,
    pub rebutting_position: u8,
    pub class: RebuttalClass,
}

/// Per-side survival counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SurvivalCount {
    pub surviving: usize,
    pub demolished: usize,
}

/// Layer 3 output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentAudit {
    pub edges: Vec<AuditEdge>,
    pub proposition: SurvivalCount,
    pub opposition: SurvivalCount,
    /// Claims no opposing speech engaged at all.
    pub uncontested: Vec<String>,
    pub narrative: String,
}

/// Build the audit from a completed tally. Pure.
pub fn audit_argument_graph(tally: &MechanicalTally) -> ArgumentAudit {
    let edges: Vec<AuditEdge> = tally
        .links
        .iter()
        .map(|l| AuditEdge {
            claim_index: l.claim_index,
            rebutting_side: l.rebutting_side,
            rebutting_position: l.rebutting_position,
            class: l.class(),
        })
        .collect();

    let mut proposition = SurvivalCount::default();
    let mut opposition = SurvivalCount::default();
    let mut uncontested = Vec::new();
    let mut demolished_summaries: Vec<(Side, &str)> = Vec::new();

    for claim in &tally.claims {
        let count = match claim.side {
            Side::Proposition => &mut proposition,
            Side::Opposition => &mut opposition,
        };
        match claim.status {
            RebuttalStatus::Demolished => {
                count.demolished += 1;
                demolished_summaries.push((claim.side, claim.summary.as_str()));
            }
            RebuttalStatus::Unaddressed => {
                count.surviving += 1;
                uncontested.push(claim.summary.clone());
            }
            RebuttalStatus::PartiallyRebutted | RebuttalStatus::Survives => {
                count.surviving += 1;
            }
        }
    }

    let narrative = build_narrative(&edges, &demolished_summaries, &proposition, &opposition);

    ArgumentAudit {
        edges,
        proposition,
        opposition,
        uncontested,
        narrative,
    }
}

fn build_narrative(
    edges: &[AuditEdge],
    demolished: &[(Side, &str)],
    prop: &SurvivalCount,
    opp: &SurvivalCount,
) -> String {
    let mut lines = vec![format!(
        "Claim survival: PROPOSITION {}/{} standing, OPPOSITION {}/{} standing.",
        prop.surviving,
        prop.surviving + prop.demolished,
        opp.surviving,
        opp.surviving + opp.demolished,
    )];

    for side in [Side::Proposition, Side::Opposition] {
        let effective = edges
            .iter()
            .filter(|e| e.rebutting_side == side && e.class != RebuttalClass::NoneEffective)
            .count();
        let demolitions = edges
            .iter()
            .filter(|e| e.rebutting_side == side && e.class == RebuttalClass::Demolition)
            .count();
        if effective > 0 {
            lines.push(format!(
                "{} landed {} effective rebuttals, {} of them demolitions.",
                side.display_name(),
                effective,
                demolitions
            ));
        }
    }

    for (side, summary) in demolished {
        lines.push(format!(
            "Demolished ({}): {}",
            side.display_name(),
            summary
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::{Claim, ClaimType, RebuttalLink, compute_tally};

    fn claim(side: Side, position: u8, summary: &str) -> Claim {
        Claim {
            side,
            position,
            summary: summary.to_string(),
            claim_type: ClaimType::Principled,
            specific: false,
            status: RebuttalStatus::default(),
        }
    }

    fn link(claim_index: usize, side: Side, position: u8, demolition: bool) -> RebuttalLink {
        RebuttalLink {
            claim_index,
            rebutting_side: side,
            rebutting_position: position,
            summary: String::new(),
            addresses_specific_logic: true,
            provides_new_info: false,
            undermines: demolition,
        }
    }

    #[test]
    fn test_survival_counts() {
        let claims = vec![
            claim(Side::Proposition, 1, "safety improves"),
            claim(Side::Proposition, 3, "costs fall"),
            claim(Side::Opposition, 2, "accountability erodes"),
        ];
        let links = vec![
            link(0, Side::Opposition, 2, true),
            link(2, Side::Proposition, 3, false),
        ];
        let tally = compute_tally(claims, links);

        let audit = audit_argument_graph(&tally);
        assert_eq!(audit.proposition.demolished, 1);
        assert_eq!(audit.proposition.surviving, 1);
        assert_eq!(audit.opposition.surviving, 1);
        assert_eq!(audit.opposition.demolished, 0);
    }

    #[test]
    fn test_uncontested_claims_listed() {
        let claims = vec![
            claim(Side::Proposition, 1, "ignored entirely"),
            claim(Side::Opposition, 2, "answered"),
        ];
        let links = vec![link(1, Side::Proposition, 3, false)];
        let tally = compute_tally(claims, links);

        let audit = audit_argument_graph(&tally);
        assert_eq!(audit.uncontested, vec!["ignored entirely".to_string()]);
    }

    #[test]
    fn test_narrative_names_demolitions() {
        let claims = vec![
            claim(Side::Proposition, 1, "the trial generalizes"),
            claim(Side::Opposition, 2, "oversight suffices"),
        ];
        let links = vec![link(0, Side::Opposition, 2, true)];
        let tally = compute_tally(claims, links);

        let audit = audit_argument_graph(&tally);
        assert!(audit.narrative.contains("1 of them demolitions"));
        assert!(audit.narrative.contains("the trial generalizes"));
    }
}
