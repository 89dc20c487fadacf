//! Layer 2a: claim/rebuttal annotation and the mechanical tally.
//!
//! Extraction is the only model-facing part. Once claims and rebuttal
//! links exist, the tally itself is pure arithmetic and deterministic.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::{LanguageClient, extract};
use crate::config::Config;
use crate::speaker::Side;
use crate::transcript::Transcript;

/// How a claim is grounded, in decreasing order of base value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    EvidenceBacked,
    Principled,
    Assertion,
}

impl ClaimType {
    fn base_points(self) -> f64 {
        match self {
            ClaimType::EvidenceBacked => 3.0,
            ClaimType::Principled => 2.0,
            ClaimType::Assertion => 1.0,
        }
    }
}

/// Where a claim ends up once all rebuttals are accounted for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuttalStatus {
    /// No opposing speech engaged the claim at all.
    #[default]
    Unaddressed,
    /// Effectively rebutted, but not destroyed.
    PartiallyRebutted,
    Demolished,
    /// Engaged, and withstood everything thrown at it.
    Survives,
}

/// A substantive claim extracted from one speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub side: Side,
    pub position: u8,
    pub summary: String,
    pub claim_type: ClaimType,
    pub specific: bool,
    /// Assigned by the tally, never by extraction.
    #[serde(default)]
    pub status: RebuttalStatus,
}

impl Claim {
    pub fn base_value(&self) -> f64 {
        self.claim_type.base_points() + if self.specific { 1.0 } else { 0.0 }
    }
}

/// A later opposing speech addressing an earlier claim. The three
/// booleans are independent judgements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuttalLink {
    /// Index into the tally's claim list.
    pub claim_index: usize,
    pub rebutting_side: Side,
    pub rebutting_position: u8,
    /// One-sentence description of the rebuttal.
    #[serde(default)]
    pub summary: String,
    pub addresses_specific_logic: bool,
    pub provides_new_info: bool,
    pub undermines: bool,
}

/// Outcome class of a rebuttal link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuttalClass {
    Demolition,
    Strong,
    Partial,
    NoneEffective,
}

impl RebuttalLink {
    pub fn class(&self) -> RebuttalClass {
        if self.addresses_specific_logic && self.undermines {
            RebuttalClass::Demolition
        } else if self.addresses_specific_logic && self.provides_new_info {
            RebuttalClass::Strong
        } else {
            let met = [
                self.addresses_specific_logic,
                self.provides_new_info,
                self.undermines,
            ]
            .iter()
            .filter(|b| **b)
            .count();
            if met == 1 {
                RebuttalClass::Partial
            } else {
                RebuttalClass::NoneEffective
            }
        }
    }

    pub fn points(&self) -> f64 {
        match self.class() {
            RebuttalClass::Demolition => 2.0,
            RebuttalClass::Strong => 1.5,
            RebuttalClass::Partial => 0.5,
            RebuttalClass::NoneEffective => 0.0,
        }
    }
}

/// How far apart the two sides' totals landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Margin {
    Narrow,
    Clear,
    Landslide,
}

impl Margin {
    pub fn label(self) -> &'static str {
        match self {
            Margin::Narrow => "narrow",
            Margin::Clear => "clear",
            Margin::Landslide => "landslide",
        }
    }

    /// Classify the relative gap between two side totals.
    pub fn from_totals(prop: f64, opp: f64) -> Margin {
        let hi = prop.max(opp);
        let lo = prop.min(opp);
        if hi <= 0.0 {
            return Margin::Narrow;
        }
        let ratio = (hi - lo) / hi;
        if ratio < 0.15 {
            Margin::Narrow
        } else if ratio < 0.40 {
            Margin::Clear
        } else {
            Margin::Landslide
        }
    }
}

/// Complete Layer 2a output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MechanicalTally {
    pub claims: Vec<Claim>,
    pub links: Vec<RebuttalLink>,
    pub prop_total: f64,
    pub opp_total: f64,
    pub winner: Option<Side>,
    pub margin: Margin,
    pub breakdown: String,
    /// Set when one rebuttal direction stayed empty after the repair
    /// attempt while the other was heavily populated.
    pub one_sided_warning: bool,
    pub complete: bool,
}

#[derive(Debug, Deserialize)]
struct ClaimExtraction {
    summary: String,
    claim_type: ClaimType,
    specific: bool,
}

#[derive(Debug, Deserialize)]
struct ClaimList {
    claims: Vec<ClaimExtraction>,
}

#[derive(Debug, Deserialize)]
struct LinkExtraction {
    claim_number: usize,
    rebutting_position: u8,
    #[serde(default)]
    summary: String,
    addresses_specific_logic: bool,
    provides_new_info: bool,
    undermines: bool,
}

#[derive(Debug, Deserialize)]
struct LinkList {
    rebuttals: Vec<LinkExtraction>,
}

/// Extract claims and rebuttal links from the transcript, then run the
/// deterministic tally over them.
pub async fn annotate_and_tally(
    client: &dyn LanguageClient,
    config: &Config,
    transcript: &Transcript,
) -> MechanicalTally {
    let spec = &config.models.analysis;
    let mut complete = true;
    // The frozen framework conditions every annotation call, exactly as
    // it conditions scoring and judging.
    let definitions_context = transcript.definitions_context();

    // Claim extraction fans out per speech; a failed speech degrades to
    // zero claims from that speech.
    let claim_futures = transcript.speeches().iter().map(|speech| {
        let prompt = claim_prompt(
            &transcript.motion,
            &definitions_context,
            &speech.full_text,
            &speech.speaker_name,
        );
        async move {
            match extract::<ClaimList>(client, &prompt, spec).await {
                Ok(list) => Some((speech.side, speech.position, list.claims)),
                Err(e) => {
                    warn!(position = speech.position, error = %e, "claim extraction degraded");
                    None
                }
            }
        }
    });

    let mut claims = Vec::new();
    for result in join_all(claim_futures).await {
        match result {
            Some((side, position, extracted)) => {
                for c in extracted {
                    claims.push(Claim {
                        side,
                        position,
                        summary: c.summary,
                        claim_type: c.claim_type,
                        specific: c.specific,
                        status: RebuttalStatus::default(),
                    });
                }
            }
            None => complete = false,
        }
    }

    let transcript_text = transcript.formatted();
    let mut prop_links = extract_direction(
        client,
        spec,
        &transcript_text,
        &definitions_context,
        &claims,
        Side::Proposition,
        false,
    )
    .await;
    let mut opp_links = extract_direction(
        client,
        spec,
        &transcript_text,
        &definitions_context,
        &claims,
        Side::Opposition,
        false,
    )
    .await;

    // One-directional extraction over a two-sided transcript is a
    // defect in the annotation, not a fact about the debate. One
    // bounded repair attempt with reinforced instructions.
    let mut one_sided_warning = false;
    let both_sides_spoke = transcript
        .speeches()
        .iter()
        .any(|s| s.side == Side::Proposition)
        && transcript
            .speeches()
            .iter()
            .any(|s| s.side == Side::Opposition);
    if both_sides_spoke {
        if prop_links.len() >= 5 && opp_links.is_empty() {
            warn!("no Opposition rebuttals found, re-extracting");
            opp_links = extract_direction(
                client,
                spec,
                &transcript_text,
                &definitions_context,
                &claims,
                Side::Opposition,
                true,
            )
            .await;
            one_sided_warning = opp_links.is_empty();
        } else if opp_links.len() >= 5 && prop_links.is_empty() {
            warn!("no Proposition rebuttals found, re-extracting");
            prop_links = extract_direction(
                client,
                spec,
                &transcript_text,
                &definitions_context,
                &claims,
                Side::Proposition,
                true,
            )
            .await;
            one_sided_warning = prop_links.is_empty();
        }
    }

    let mut links = prop_links;
    links.extend(opp_links);

    let mut tally = compute_tally(claims, links);
    tally.one_sided_warning = one_sided_warning;
    tally.complete = complete;
    tally
}

/// Extract rebuttal links for one rebutting side. Invalid links
/// (out-of-range claim numbers, wrong-side, non-later, or wrong-bench
/// positions) are dropped rather than repaired.
async fn extract_direction(
    client: &dyn LanguageClient,
    spec: &crate::config::ModelSpec,
    transcript_text: &str,
    definitions_context: &str,
    claims: &[Claim],
    rebutting_side: Side,
    reinforced: bool,
) -> Vec<RebuttalLink> {
    let target_side = rebutting_side.opponent();
    let target_claims: Vec<String> = claims
        .iter()
        .enumerate()
        .filter(|(_, c)| c.side == target_side)
        .map(|(i, c)| format!("  [{i}] (speech {}) {}", c.position, c.summary))
        .collect();
    if target_claims.is_empty() {
        return Vec::new();
    }

    let prompt = link_prompt(
        transcript_text,
        definitions_context,
        &target_claims.join("\n"),
        rebutting_side,
        target_side,
        reinforced,
    );

    let extracted = match extract::<LinkList>(client, &prompt, spec).await {
        Ok(list) => list.rebuttals,
        Err(e) => {
            warn!(side = rebutting_side.label(), error = %e, "rebuttal extraction degraded");
            return Vec::new();
        }
    };

    extracted
        .into_iter()
        .filter_map(|l| {
            let claim = claims.get(l.claim_number)?;
            if claim.side != target_side
                || l.rebutting_position <= claim.position
                || Side::at_position(l.rebutting_position) != rebutting_side
            {
                return None;
            }
            Some(RebuttalLink {
                claim_index: l.claim_number,
                rebutting_side,
                rebutting_position: l.rebutting_position,
                summary: l.summary,
                addresses_specific_logic: l.addresses_specific_logic,
                provides_new_info: l.provides_new_info,
                undermines: l.undermines,
            })
        })
        .collect()
}

/// Position of the closing speech. Nothing after it can rebut.
const FINAL_POSITION: u8 = 6;

/// Deterministic arithmetic over extracted claims and links. Pure.
pub fn compute_tally(mut claims: Vec<Claim>, links: Vec<RebuttalLink>) -> MechanicalTally {
    let mut prop_total = 0.0;
    let mut opp_total = 0.0;
    let mut lines = Vec::new();

    for (i, claim) in claims.iter_mut().enumerate() {
        let mut value = claim.base_value();
        let incoming: Vec<&RebuttalLink> =
            links.iter().filter(|l| l.claim_index == i).collect();
        let demolished = incoming
            .iter()
            .any(|l| l.class() == RebuttalClass::Demolition);
        let unrebutted = incoming.is_empty();

        claim.status = if demolished {
            RebuttalStatus::Demolished
        } else if unrebutted {
            RebuttalStatus::Unaddressed
        } else if incoming
            .iter()
            .any(|l| l.class() != RebuttalClass::NoneEffective)
        {
            RebuttalStatus::PartiallyRebutted
        } else {
            RebuttalStatus::Survives
        };

        if demolished {
            value *= 0.5;
            lines.push(format!(
                "  {} claim [{}] demolished, halved to {:.1}: {}",
                claim.side.label(),
                i,
                value,
                claim.summary
            ));
        } else if unrebutted && claim.position == FINAL_POSITION {
            // The closing speaker's fresh claims went unanswered only
            // because nobody could answer them.
            value *= 0.5;
            lines.push(format!(
                "  {} claim [{}] unanswerable (final speech), halved to {:.1}: {}",
                claim.side.label(),
                i,
                value,
                claim.summary
            ));
        }

        match claim.side {
            Side::Proposition => prop_total += value,
            Side::Opposition => opp_total += value,
        }
    }

    for link in &links {
        let points = link.points();
        if points > 0.0 {
            match link.rebutting_side {
                Side::Proposition => prop_total += points,
                Side::Opposition => opp_total += points,
            }
            lines.push(format!(
                "  {} rebuttal of claim [{}] ({:?}): +{:.1}",
                link.rebutting_side.label(),
                link.claim_index,
                link.class(),
                points
            ));
        }
    }

    let winner = if (prop_total - opp_total).abs() < f64::EPSILON {
        None
    } else if prop_total > opp_total {
        Some(Side::Proposition)
    } else {
        Some(Side::Opposition)
    };

    let breakdown = format!(
        "PROPOSITION {:.1} — OPPOSITION {:.1}\n{}",
        prop_total,
        opp_total,
        lines.join("\n")
    );

    MechanicalTally {
        claims,
        links,
        prop_total,
        opp_total,
        winner,
        margin: Margin::from_totals(prop_total, opp_total),
        breakdown,
        one_sided_warning: false,
        complete: true,
    }
}

fn claim_prompt(
    motion: &str,
    definitions_context: &str,
    speech_text: &str,
    speaker_name: &str,
) -> String {
    let defs_block = if definitions_context.is_empty() {
        String::new()
    } else {
        format!(
            "\n{definitions_context}\n\nRead each claim against this framework. A claim that \
             merely restates an agreed definition is not substantive; a claim that explicitly \
             contests a definition is.\n"
        )
    };

    format!(
        r#"Extract every substantive claim from this debate speech.

Motion: "{motion}"
{defs_block}
Speaker: {speaker_name}
Speech:
{speech_text}

For each claim, classify:
- claim_type: "evidence_backed" (cites data, studies, named cases),
  "principled" (grounded in an explicit value or framework), or
  "assertion" (stated without support).
- specific: true if the claim names concrete figures, cases, or
  mechanisms rather than generalities.

Keep each summary to one sentence. Do not extract rhetorical flourishes
or restatements of the motion itself.

Respond as JSON:
{{"claims": [{{"summary": "...", "claim_type": "evidence_backed", "specific": true}}]}}"#
    )
}

fn link_prompt(
    transcript_text: &str,
    definitions_context: &str,
    target_claims: &str,
    rebutting_side: Side,
    target_side: Side,
    reinforced: bool,
) -> String {
    let defs_block = if definitions_context.is_empty() {
        String::new()
    } else {
        format!(
            "\n{definitions_context}\n\nJudge engagement against this framework. Explicitly \
             contesting a definition a claim rests on counts as addressing that claim's \
             logic.\n"
        )
    };

    let reinforcement = if reinforced {
        format!(
            "\nIMPORTANT: a previous extraction found NO {} rebuttals at all. \
             Rebuttals are rarely announced; look for any passage where a {} \
             speaker engages with, qualifies, or pushes back on one of the \
             numbered claims, even implicitly. Report every genuine engagement \
             you find. If there truly are none, return an empty list.\n",
            rebutting_side.display_name(),
            rebutting_side.display_name()
        )
    } else {
        String::new()
    };

    format!(
        r#"Map rebuttals in a debate transcript.
{defs_block}
Transcript:
{transcript_text}

Numbered claims made by the {target} side:
{target_claims}
{reinforcement}
For every numbered claim that a LATER {rebutting} speech addresses,
report one rebuttal record with three independent booleans:
- addresses_specific_logic: the rebuttal engages the claim's actual
  reasoning, not a strawman or a general theme.
- provides_new_info: the rebuttal introduces evidence or considerations
  not already in the claim.
- undermines: after the rebuttal, the claim is materially weaker.

Also report rebutting_position: the speech number (1-6) that delivers
the rebuttal. Only report rebuttals by {rebutting} speakers. Judge each
boolean independently and honestly; most rebuttals do not earn all
three.

Respond as JSON:
{{"rebuttals": [{{"claim_number": 0, "rebutting_position": 2,
"summary": "one sentence on how the claim was attacked",
"addresses_specific_logic": true, "provides_new_info": false,
"undermines": true}}]}}"#,
        target = target_side.display_name(),
        rebutting = rebutting_side.display_name(),
    )
}
