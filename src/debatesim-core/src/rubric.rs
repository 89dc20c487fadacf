//! Layer 1: analytical rubric scoring with force-rank recalibration.
//!
//! Each speech is scored once, independently, on five anchored 1-10
//! dimensions. Recalibration is a pure post-processing step over the
//! six totals with no further model calls.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::{LanguageClient, extract};
use crate::config::Config;
use crate::speaker::Side;
use crate::transcript::{Speech, Transcript};

/// Rubric score for a single speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechScore {
    pub speaker_name: String,
    pub side: Side,
    pub position: u8,
    pub argument_strength: f64,
    pub rebuttal_quality: f64,
    pub evidence_grounding: f64,
    pub rhetorical_effectiveness: f64,
    pub persona_fidelity: f64,
    /// Weighted composite, not a simple average.
    pub overall: f64,
    pub rationale: String,
    /// True when the overall was adjusted by the spread recalibration.
    #[serde(default)]
    pub recalibrated: bool,
}

/// Aggregated Layer 1 output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricScorecard {
    pub scores: Vec<SpeechScore>,
    pub prop_total: f64,
    pub opp_total: f64,
    pub winner: Option<Side>,
    /// False when any individual speech score degraded to absent.
    pub complete: bool,
}

#[derive(Debug, Deserialize)]
struct ScoreExtraction {
    argument_strength: f64,
    rebuttal_quality: f64,
    evidence_grounding: f64,
    rhetorical_effectiveness: f64,
    persona_fidelity: f64,
    overall: f64,
    rationale: String,
}

/// Score all speeches on the rubric, then recalibrate the totals.
///
/// Per-speech calls fan out concurrently; a failed score degrades to
/// absent rather than failing the layer.
pub async fn score_speeches(
    client: &dyn LanguageClient,
    config: &Config,
    transcript: &Transcript,
) -> RubricScorecard {
    let transcript_text = transcript.formatted();
    let definitions_context = transcript.definitions_context();

    let futures = transcript.speeches().iter().map(|speech| {
        let prompt = scoring_prompt(&transcript.motion, &transcript_text, &definitions_context, speech);
        async move {
            match extract::<ScoreExtraction>(client, &prompt, &config.models.judge).await {
                Ok(raw) => Some(SpeechScore {
                    speaker_name: speech.speaker_name.clone(),
                    side: speech.side,
                    position: speech.position,
                    argument_strength: raw.argument_strength,
                    rebuttal_quality: raw.rebuttal_quality,
                    evidence_grounding: raw.evidence_grounding,
                    rhetorical_effectiveness: raw.rhetorical_effectiveness,
                    persona_fidelity: raw.persona_fidelity,
                    overall: raw.overall,
                    rationale: raw.rationale,
                    recalibrated: false,
                }),
                Err(e) => {
                    warn!(position = speech.position, error = %e, "rubric score degraded to absent");
                    None
                }
            }
        }
    });

    let results = join_all(futures).await;
    let complete = results.iter().all(Option::is_some);
    let mut scores: Vec<SpeechScore> = results.into_iter().flatten().collect();

    recalibrate(&mut scores, config.judging.rubric_min_spread);

    let prop_total: f64 = scores
        .iter()
        .filter(|s| s.side == Side::Proposition)
        .map(|s| s.overall)
        .sum();
    let opp_total: f64 = scores
        .iter()
        .filter(|s| s.side == Side::Opposition)
        .map(|s| s.overall)
        .sum();

    let winner = if scores.is_empty() {
        None
    } else if (prop_total - opp_total).abs() > f64::EPSILON {
        Some(if prop_total > opp_total {
            Side::Proposition
        } else {
            Side::Opposition
        })
    } else {
        // Tie on totals: fall back to the two most debate-relevant
        // dimensions.
        let subtotal = |side: Side| -> f64 {
            scores
                .iter()
                .filter(|s| s.side == side)
                .map(|s| s.argument_strength + s.rebuttal_quality)
                .sum()
        };
        Some(if subtotal(Side::Proposition) >= subtotal(Side::Opposition) {
            Side::Proposition
        } else {
            Side::Opposition
        })
    };

    RubricScorecard {
        scores,
        prop_total,
        opp_total,
        winner,
        complete,
    }
}

/// Force-rank recalibration: if the spread between the best and worst
/// overall is below `min_spread`, stretch the totals linearly about
/// their midpoint until it holds, preserving the rank order established
/// by the raw scores (ties broken by speaking position). Pure function.
pub fn recalibrate(scores: &mut [SpeechScore], min_spread: f64) {
    if scores.len() < 2 {
        return;
    }
    let max = scores.iter().map(|s| s.overall).fold(f64::MIN, f64::max);
    let min = scores.iter().map(|s| s.overall).fold(f64::MAX, f64::min);
    let spread = max - min;
    if spread >= min_spread {
        return;
    }

    let mid = (max + min) / 2.0;
    if spread > 1e-9 {
        let factor = min_spread / spread;
        for s in scores.iter_mut() {
            s.overall = mid + (s.overall - mid) * factor;
            s.recalibrated = true;
        }
    } else {
        // All raw totals equal: space evenly by rank. Raw scores give
        // no order, so speaking position breaks the tie.
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .overall
                .partial_cmp(&scores[a].overall)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(scores[a].position.cmp(&scores[b].position))
        });
        let step = min_spread / (scores.len() - 1) as f64;
        for (rank, &idx) in order.iter().enumerate() {
            scores[idx].overall = mid + min_spread / 2.0 - rank as f64 * step;
            scores[idx].recalibrated = true;
        }
    }

    // Keep everything on the 1-10 scale by shifting, never re-compressing.
    let new_max = scores.iter().map(|s| s.overall).fold(f64::MIN, f64::max);
    let new_min = scores.iter().map(|s| s.overall).fold(f64::MAX, f64::min);
    if new_max > 10.0 {
        let shift = new_max - 10.0;
        for s in scores.iter_mut() {
            s.overall -= shift;
        }
    } else if new_min < 1.0 {
        let shift = 1.0 - new_min;
        for s in scores.iter_mut() {
            s.overall += shift;
        }
    }
}

fn scoring_prompt(
    motion: &str,
    transcript_text: &str,
    definitions_context: &str,
    speech: &Speech,
) -> String {
    let defs_block = if definitions_context.is_empty() {
        String::new()
    } else {
        format!(
            "\n{definitions_context}\n\nWhen scoring, consider whether the speaker argues \
             within the agreed definitional framework or effectively contests it. Speakers \
             who silently operate under different definitions should be marked down on \
             ARGUMENT STRENGTH.\n"
        )
    };

    format!(
        r#"You are an expert debate adjudicator scoring a single speech.

CRITICAL: You are evaluating ARGUMENTATIVE SKILL, not whether you agree
with the speaker's position. Score the CRAFT, not the CONTENT.

Motion: "{motion}"
{defs_block}
Full debate transcript (context for evaluating rebuttals):
{transcript_text}

Score THIS speech:
Speaker: {name} ({side})
Speech:
{text}

Score five dimensions on the FULL 1-10 scale with these anchors:
  1-2: Poor — incoherent, irrelevant, or no real arguments
  3-4: Below average — generic, vague, or poorly structured
  5:   Average — competent but unremarkable; makes basic points
  6:   Solid — clear, well-organised, but no distinctive insight
  7:   Strong — sharp arguments, good engagement, persuasive moments
  8:   Excellent — impressive depth, strong evidence, memorable rhetoric
  9:   Outstanding — top-tier debating, exceptional on multiple dimensions
  10:  World-class — near-perfect execution across all dimensions

Dimensions:
1. argument_strength: logical validity and internal consistency of claims.
2. rebuttal_quality: engagement with the STRONGEST opposing arguments
   (score 5 for the very first speaker, who has nothing to rebut — judge
   their pre-emptive framing instead).
3. evidence_grounding: specificity and verifiability of evidence.
4. rhetorical_effectiveness: persuasiveness, structure, clarity.
5. persona_fidelity: does this sound like {name}?

Also provide overall (1-10, weighted composite — weight argument strength
and rhetorical effectiveness most heavily, then rebuttal) and a 2-3
sentence rationale.

USE THE FULL SCALE. Not every speech in a debate is equally good.

Respond as JSON: {{"argument_strength": 0, "rebuttal_quality": 0,
"evidence_grounding": 0, "rhetorical_effectiveness": 0,
"persona_fidelity": 0, "overall": 0, "rationale": "..."}}"#,
        motion = motion,
        defs_block = defs_block,
        transcript_text = transcript_text,
        name = speech.speaker_name,
        side = speech.side.display_name(),
        text = speech.full_text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::{FailingClient, ScriptedClient};
    use crate::transcript::test_support::six_speech_transcript;

    fn score(name: &str, side: Side, position: u8, overall: f64) -> SpeechScore {
        SpeechScore {
            speaker_name: name.to_string(),
            side,
            position,
            argument_strength: overall,
            rebuttal_quality: overall,
            evidence_grounding: overall,
            rhetorical_effectiveness: overall,
            persona_fidelity: overall,
            overall,
            rationale: String::new(),
            recalibrated: false,
        }
    }

    fn rank_order(scores: &[SpeechScore]) -> Vec<String> {
        let mut ordered: Vec<&SpeechScore> = scores.iter().collect();
        ordered.sort_by(|a, b| b.overall.partial_cmp(&a.overall).unwrap());
        ordered.iter().map(|s| s.speaker_name.clone()).collect()
    }

    #[test]
    fn test_recalibration_enforces_spread_and_preserves_rank() {
        let mut scores = vec![
            score("a", Side::Proposition, 1, 7.2),
            score("b", Side::Opposition, 2, 7.0),
            score("c", Side::Proposition, 3, 7.6),
            score("d", Side::Opposition, 4, 7.1),
            score("e", Side::Proposition, 5, 7.4),
            score("f", Side::Opposition, 6, 7.3),
        ];
        let before = rank_order(&scores);
        recalibrate(&mut scores, 2.0);
        let after = rank_order(&scores);

        let max = scores.iter().map(|s| s.overall).fold(f64::MIN, f64::max);
        let min = scores.iter().map(|s| s.overall).fold(f64::MAX, f64::min);
        assert!(max - min >= 2.0 - 1e-9);
        assert_eq!(before, after);
        assert!(scores.iter().all(|s| s.recalibrated));
        assert!(scores.iter().all(|s| (1.0..=10.0).contains(&s.overall)));
    }

    #[test]
    fn test_recalibration_noop_when_spread_sufficient() {
        let mut scores = vec![
            score("a", Side::Proposition, 1, 5.0),
            score("b", Side::Opposition, 2, 8.0),
        ];
        recalibrate(&mut scores, 2.0);
        assert_eq!(scores[0].overall, 5.0);
        assert_eq!(scores[1].overall, 8.0);
        assert!(!scores[0].recalibrated);
    }

    #[test]
    fn test_recalibration_all_equal_breaks_ties_by_position() {
        let mut scores = vec![
            score("a", Side::Proposition, 1, 7.0),
            score("b", Side::Opposition, 2, 7.0),
            score("c", Side::Proposition, 3, 7.0),
        ];
        recalibrate(&mut scores, 2.0);
        let max = scores.iter().map(|s| s.overall).fold(f64::MIN, f64::max);
        let min = scores.iter().map(|s| s.overall).fold(f64::MAX, f64::min);
        assert!(max - min >= 2.0 - 1e-9);
        // Earlier positions rank first when raw scores give no order.
        assert!(scores[0].overall > scores[1].overall);
        assert!(scores[1].overall > scores[2].overall);
    }

    #[test]
    fn test_recalibration_shifts_back_onto_scale() {
        let mut scores = vec![
            score("a", Side::Proposition, 1, 9.8),
            score("b", Side::Opposition, 2, 9.6),
        ];
        recalibrate(&mut scores, 2.0);
        let max = scores.iter().map(|s| s.overall).fold(f64::MIN, f64::max);
        let min = scores.iter().map(|s| s.overall).fold(f64::MAX, f64::min);
        assert!(max <= 10.0 + 1e-9);
        assert!(max - min >= 2.0 - 1e-9);
        assert!(scores[0].overall > scores[1].overall);
    }

    fn score_json(overall: f64) -> String {
        format!(
            r#"{{"argument_strength": {overall}, "rebuttal_quality": {overall},
            "evidence_grounding": {overall}, "rhetorical_effectiveness": {overall},
            "persona_fidelity": {overall}, "overall": {overall}, "rationale": "fine"}}"#
        )
    }

    #[tokio::test]
    async fn test_score_speeches_totals_and_winner() {
        let transcript = six_speech_transcript("Motion");
        let config = Config::default();
        // Prop speeches (positions 1, 3, 5) score higher.
        let client = ScriptedClient::new(vec![
            score_json(8.0),
            score_json(5.0),
            score_json(8.0),
            score_json(5.0),
            score_json(8.0),
            score_json(5.0),
        ]);

        let scorecard = score_speeches(&client, &config, &transcript).await;
        assert!(scorecard.complete);
        assert_eq!(scorecard.scores.len(), 6);
        assert_eq!(scorecard.winner, Some(Side::Proposition));
        assert!(scorecard.prop_total > scorecard.opp_total);
    }

    #[tokio::test]
    async fn test_score_speeches_degrades_to_incomplete() {
        let transcript = six_speech_transcript("Motion");
        let config = Config::default();
        let scorecard = score_speeches(&FailingClient, &config, &transcript).await;
        assert!(!scorecard.complete);
        assert!(scorecard.scores.is_empty());
        assert_eq!(scorecard.winner, None);
    }
}
