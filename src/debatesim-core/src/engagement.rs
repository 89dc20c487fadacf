//! Layer 2b: anonymized dual-pass engagement verdict.
//!
//! Judges never see real names or side labels. The anonymized variant
//! is the only transcript representation this module hands to a judge,
//! and the label assignment is swapped between the two passes so that
//! position bias shows up as disagreement instead of a silent skew.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::{LanguageClient, extract};
use crate::config::Config;
use crate::speaker::Side;
use crate::transcript::Transcript;

/// Neutral team label shown to judges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamLabel {
    A,
    B,
}

impl TeamLabel {
    pub fn display(self) -> &'static str {
        match self {
            TeamLabel::A => "Team A",
            TeamLabel::B => "Team B",
        }
    }
}

/// Bijective substitution from real identities to neutral labels.
///
/// Pass 1 assigns Proposition to Team A; Pass 2 swaps the assignment.
#[derive(Debug, Clone)]
pub struct AnonymizationMap {
    pub pass: u8,
    /// (real token, neutral token) pairs, applied longest-real-first.
    pairs: Vec<(String, String)>,
}

impl AnonymizationMap {
    pub fn build(transcript: &Transcript, pass: u8) -> AnonymizationMap {
        let team_of = |side: Side| match (pass, side) {
            (1, Side::Proposition) | (2, Side::Opposition) => TeamLabel::A,
            _ => TeamLabel::B,
        };

        let mut pairs: Vec<(String, String)> = Vec::new();
        for speech in transcript.speeches() {
            let team = team_of(speech.side);
            let neutral = format!(
                "{} Speaker {}",
                team.display(),
                speech.position.div_ceil(2)
            );
            pairs.push((speech.speaker_name.clone(), neutral));
        }
        for side in [Side::Proposition, Side::Opposition] {
            let team = team_of(side);
            pairs.push((side.label().to_string(), team.display().to_uppercase()));
            pairs.push((side.display_name().to_string(), team.display().to_string()));
        }

        // Longest real token first so no token is clobbered by a
        // substring of itself.
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        AnonymizationMap { pass, pairs }
    }

    /// Replace every real token with its neutral label.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (real, neutral) in &self.pairs {
            out = out.replace(real.as_str(), neutral.as_str());
        }
        out
    }

    /// Undo `apply`. Exact inverse as long as the neutral tokens did
    /// not already occur in the original text.
    pub fn invert(&self, text: &str) -> String {
        let mut pairs: Vec<&(String, String)> = self.pairs.iter().collect();
        pairs.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        let mut out = text.to_string();
        for (real, neutral) in pairs {
            out = out.replace(neutral.as_str(), real.as_str());
        }
        out
    }

    /// Map a judge's team verdict back to the real side.
    pub fn unmap(&self, team: TeamLabel) -> Side {
        match (self.pass, team) {
            (1, TeamLabel::A) | (2, TeamLabel::B) => Side::Proposition,
            _ => Side::Opposition,
        }
    }
}

/// One judge's opinion within a pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementVote {
    pub pass: u8,
    pub judge: usize,
    pub winner: TeamLabel,
    pub rationale: String,
    /// Judge's self-reported confidence in [0, 1].
    pub confidence: f64,
}

/// Outcome of one anonymized pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassResult {
    pub pass: u8,
    pub votes: Vec<EngagementVote>,
    /// Majority winner unmapped to the real side. Absent when the
    /// surviving panel split evenly or every judge degraded.
    pub winner: Option<Side>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    Robust,
    Contested,
}

/// Full Layer 2b output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementVerdict {
    pub pass1: PassResult,
    pub pass2: PassResult,
    pub consistency: Consistency,
    /// Pass 1's result when the passes disagree; the aggregator is
    /// responsible for surfacing the contest, never this field alone.
    pub winner: Option<Side>,
    pub complete: bool,
}

#[derive(Debug, Deserialize)]
struct BallotExtraction {
    winner: String,
    rationale: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

/// Run both anonymized passes and combine them into a consistency-
/// flagged verdict.
pub async fn engagement_verdict(
    client: &dyn LanguageClient,
    config: &Config,
    transcript: &Transcript,
) -> EngagementVerdict {
    let pass1 = run_pass(client, config, transcript, 1).await;
    let pass2 = run_pass(client, config, transcript, 2).await;

    let expected = config.judging.judges_per_pass * 2;
    let complete = pass1.votes.len() + pass2.votes.len() == expected;

    let (consistency, winner) = match (pass1.winner, pass2.winner) {
        (Some(a), Some(b)) if a == b => (Consistency::Robust, Some(a)),
        (Some(a), Some(_)) => (Consistency::Contested, Some(a)),
        // A pass without a majority is itself a disagreement signal.
        (first, second) => (Consistency::Contested, first.or(second)),
    };

    EngagementVerdict {
        pass1,
        pass2,
        consistency,
        winner,
        complete,
    }
}

async fn run_pass(
    client: &dyn LanguageClient,
    config: &Config,
    transcript: &Transcript,
    pass: u8,
) -> PassResult {
    let map = AnonymizationMap::build(transcript, pass);
    let anonymized = map.apply(&transcript.formatted());
    let prompt = judge_prompt(&anonymized);
    let spec = &config.models.engagement;

    let futures = (0..config.judging.judges_per_pass).map(|judge| {
        let prompt = prompt.clone();
        async move {
            match extract::<BallotExtraction>(client, &prompt, spec).await {
                Ok(ballot) => match parse_team(&ballot.winner) {
                    Some(winner) => Some(EngagementVote {
                        pass,
                        judge,
                        winner,
                        rationale: ballot.rationale,
                        confidence: ballot.confidence.clamp(0.0, 1.0),
                    }),
                    None => {
                        warn!(pass, judge, label = %ballot.winner, "unrecognized team label");
                        None
                    }
                },
                Err(e) => {
                    warn!(pass, judge, error = %e, "judge vote degraded to absent");
                    None
                }
            }
        }
    });

    let votes: Vec<EngagementVote> = join_all(futures).await.into_iter().flatten().collect();

    let a = votes.iter().filter(|v| v.winner == TeamLabel::A).count();
    let b = votes.len() - a;
    let winner = if a > b {
        Some(map.unmap(TeamLabel::A))
    } else if b > a {
        Some(map.unmap(TeamLabel::B))
    } else {
        None
    };

    PassResult { pass, votes, winner }
}

fn parse_team(label: &str) -> Option<TeamLabel> {
    let upper = label.to_uppercase();
    if upper.contains('A') && !upper.contains('B') {
        Some(TeamLabel::A)
    } else if upper.contains('B') && !upper.contains('A') {
        Some(TeamLabel::B)
    } else {
        None
    }
}

fn judge_prompt(anonymized_transcript: &str) -> String {
    format!(
        r#"You are judging a formal debate between Team A and Team B. Read the
full transcript and decide which team debated better.

Weight your decision as follows:
- 40% engagement with the opposing team's strongest arguments
- 30% quality and consistency of the team's own arguments
- 20% effectiveness of rebuttals, including responses to interjections
- 10% narrative coherence across the team's speeches

Judge the debating, not the issue. Do NOT treat a cautious or hedged
conclusion as inherently more reasonable, and do NOT penalize a team
for arguing boldly; reward whoever actually engaged and persuaded.

Transcript:
{anonymized_transcript}

Respond as JSON:
{{"winner": "Team A", "rationale": "2-3 sentences", "confidence": 0.8}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::ScriptedClient;
    use crate::transcript::test_support::six_speech_transcript;

    fn ballot(team: &str) -> String {
        format!(r#"{{"winner": "{team}", "rationale": "engaged better"}}"#)
    }

    #[test]
    fn test_anonymization_round_trip() {
        let transcript = six_speech_transcript("This house would test its code");
        let original = transcript.formatted();
        let map = AnonymizationMap::build(&transcript, 1);

        let anonymized = map.apply(&original);
        assert!(!anonymized.contains("Alice Ashworth"));
        assert!(!anonymized.contains("PROPOSITION"));
        assert!(anonymized.contains("Team A Speaker 1"));

        assert_eq!(map.invert(&anonymized), original);
    }

    #[test]
    fn test_pass_assignment_swaps() {
        let transcript = six_speech_transcript("Motion");
        let text = transcript.formatted();

        let pass1 = AnonymizationMap::build(&transcript, 1).apply(&text);
        let pass2 = AnonymizationMap::build(&transcript, 2).apply(&text);

        // Alice opens for the Proposition.
        assert!(pass1.contains("Team A Speaker 1"));
        assert!(pass2.contains("Team B Speaker 1"));
    }

    #[test]
    fn test_unmap_respects_pass() {
        let transcript = six_speech_transcript("Motion");
        let m1 = AnonymizationMap::build(&transcript, 1);
        let m2 = AnonymizationMap::build(&transcript, 2);
        assert_eq!(m1.unmap(TeamLabel::A), Side::Proposition);
        assert_eq!(m1.unmap(TeamLabel::B), Side::Opposition);
        assert_eq!(m2.unmap(TeamLabel::A), Side::Opposition);
        assert_eq!(m2.unmap(TeamLabel::B), Side::Proposition);
    }

    #[test]
    fn test_parse_team_labels() {
        assert_eq!(parse_team("Team A"), Some(TeamLabel::A));
        assert_eq!(parse_team("team b"), Some(TeamLabel::B));
        assert_eq!(parse_team("A"), Some(TeamLabel::A));
        assert_eq!(parse_team("Team A and Team B"), None);
        assert_eq!(parse_team("neither"), None);
    }

    #[tokio::test]
    async fn test_agreeing_passes_are_robust() {
        let transcript = six_speech_transcript("Motion");
        let config = Config::default();
        // Pass 1: Opposition is Team B. Pass 2: Opposition is Team A.
        let client = ScriptedClient::new(vec![
            ballot("Team B"),
            ballot("Team B"),
            ballot("Team B"),
            ballot("Team A"),
            ballot("Team A"),
            ballot("Team A"),
        ]);

        let verdict = engagement_verdict(&client, &config, &transcript).await;
        assert_eq!(verdict.consistency, Consistency::Robust);
        assert_eq!(verdict.winner, Some(Side::Opposition));
        assert!(verdict.complete);
    }

    #[tokio::test]
    async fn test_disagreeing_passes_are_contested() {
        let transcript = six_speech_transcript("Motion");
        let config = Config::default();
        // Pass 1 unmaps to Opposition; Pass 2's Team B unmaps to
        // Proposition. The reported winner stays Pass 1's result.
        let client = ScriptedClient::new(vec![
            ballot("Team B"),
            ballot("Team B"),
            ballot("Team B"),
            ballot("Team B"),
            ballot("Team B"),
            ballot("Team B"),
        ]);

        let verdict = engagement_verdict(&client, &config, &transcript).await;
        assert_eq!(verdict.consistency, Consistency::Contested);
        assert_eq!(verdict.winner, Some(Side::Opposition));
        assert_eq!(verdict.pass2.winner, Some(Side::Proposition));
    }

    #[tokio::test]
    async fn test_degraded_judge_still_finds_majority() {
        let transcript = six_speech_transcript("Motion");
        let config = Config::default();
        let client = ScriptedClient::from_results(vec![
            Ok(ballot("Team B")),
            Err("timeout".to_string()),
            Err("timeout".to_string()),
            Ok(ballot("Team B")),
            Ok(ballot("Team A")),
            Ok(ballot("Team A")),
            Ok(ballot("Team A")),
        ]);

        let verdict = engagement_verdict(&client, &config, &transcript).await;
        assert!(!verdict.complete);
        assert_eq!(verdict.pass1.winner, Some(Side::Opposition));
        assert_eq!(verdict.pass2.winner, Some(Side::Opposition));
        assert_eq!(verdict.consistency, Consistency::Robust);
    }
}
