//! Transcript data model.
//!
//! The transcript is the only shared object during the debate phase.
//! It is append-only, totally ordered by speaking position, and owned
//! exclusively by the sequencer; everything downstream sees `&Transcript`.

use serde::{Deserialize, Serialize};

use crate::definitions::{Contestation, DefinitionsFramework, DefinitionsRecord};
use crate::error::DebateError;
use crate::speaker::Side;

/// A single argument within a speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentPoint {
    /// The core claim being made.
    pub claim: String,
    /// Supporting reasoning / warrant.
    pub reasoning: String,
    #[serde(default)]
    pub evidence: Option<String>,
    /// Is this responding to an opponent?
    #[serde(default)]
    pub is_rebuttal: bool,
    #[serde(default)]
    pub rebuts_speaker: Option<String>,
}

/// A Point of Information offered during a speech.
///
/// Owned by the speech it interrupts; append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poi {
    pub from_speaker: String,
    pub to_speaker: String,
    /// The challenge text (1-2 sentences).
    pub text: String,
    pub accepted: bool,
    /// Speaker's response, present only when accepted.
    pub response: Option<String>,
    /// Index of the argument point this POI follows.
    pub after_argument_index: usize,
}

/// One delivered speech. Immutable once appended to the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Speech {
    pub speaker_id: String,
    pub speaker_name: String,
    pub side: Side,
    /// 1-6 in overall speaking order.
    pub position: u8,
    /// Opening lines, hook and framing.
    pub opening: String,
    /// The 2-4 main argument points.
    pub arguments: Vec<ArgumentPoint>,
    /// Closing lines, the peroration.
    pub closing: String,
    /// The complete speech as delivered, with accepted POI exchanges
    /// spliced in.
    pub full_text: String,
    pub tone: String,
    pub rhetorical_moves: Vec<String>,
    pub word_count: usize,
    /// POIs raised during this speech, ordered by argument index.
    pub pois: Vec<Poi>,
}

/// The complete debate record: motion, ordered speeches, definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub motion: String,
    speeches: Vec<Speech>,
    definitions: Option<DefinitionsRecord>,
}

impl Transcript {
    pub fn new(motion: impl Into<String>) -> Self {
        Self {
            motion: motion.into(),
            speeches: Vec::new(),
            definitions: None,
        }
    }

    pub fn speeches(&self) -> &[Speech] {
        &self.speeches
    }

    pub fn len(&self) -> usize {
        self.speeches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speeches.is_empty()
    }

    pub fn definitions(&self) -> Option<&DefinitionsRecord> {
        self.definitions.as_ref()
    }

    /// Context block for prompt injection, empty before the framework
    /// exists.
    pub fn definitions_context(&self) -> String {
        self.definitions
            .as_ref()
            .map(|d| d.context_block())
            .unwrap_or_default()
    }

    /// Append the next speech. Positions must arrive in strict order.
    pub(crate) fn push(&mut self, speech: Speech) -> Result<(), DebateError> {
        let expected = (self.speeches.len() + 1) as u8;
        if speech.position != expected {
            return Err(DebateError::OutOfTurn {
                expected,
                got: speech.position,
            });
        }
        self.speeches.push(speech);
        Ok(())
    }

    /// Install the framework extracted from speech 1. Rejected once the
    /// contestation window has passed.
    pub(crate) fn install_framework(
        &mut self,
        framework: DefinitionsFramework,
    ) -> Result<(), DebateError> {
        if self.definitions.is_some() || self.speeches.len() > 1 {
            return Err(DebateError::DefinitionsFrozen);
        }
        self.definitions = Some(DefinitionsRecord {
            framework,
            contestation: None,
        });
        Ok(())
    }

    /// Record the Opposition's contestation after speech 2. The record
    /// is frozen from speech 3 onward; amendment attempts fail.
    pub(crate) fn install_contestation(
        &mut self,
        contestation: Contestation,
    ) -> Result<(), DebateError> {
        if self.speeches.len() > 2 {
            return Err(DebateError::DefinitionsFrozen);
        }
        match &mut self.definitions {
            Some(record) if record.contestation.is_none() => {
                record.contestation = Some(contestation);
                Ok(())
            }
            Some(_) => Err(DebateError::DefinitionsFrozen),
            None => Err(DebateError::Config(
                "contestation recorded before framework".to_string(),
            )),
        }
    }

    /// Format the transcript for prompt inclusion, with POIs rendered
    /// inline.
    pub fn formatted(&self) -> String {
        if self.speeches.is_empty() {
            return "(No speeches yet.)".to_string();
        }

        let mut parts = Vec::new();
        for speech in &self.speeches {
            parts.push(format!(
                "--- {} ({}) ---",
                speech.speaker_name,
                speech.side.label()
            ));
            parts.push(speech.full_text.clone());
            for poi in &speech.pois {
                let status = if poi.accepted { "ACCEPTED" } else { "DECLINED" };
                parts.push(format!("\n  [POI from {} — {}]", poi.from_speaker, status));
                parts.push(format!("  \"{}\"", poi.text));
                if let Some(response) = &poi.response {
                    parts.push(format!("  Response: {}", response));
                }
            }
            parts.push(String::new());
        }
        parts.join("\n")
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn speech(position: u8, side: Side, name: &str, full_text: &str) -> Speech {
        Speech {
            speaker_id: name.to_lowercase().replace(' ', "_"),
            speaker_name: name.to_string(),
            side,
            position,
            opening: String::new(),
            arguments: vec![
                ArgumentPoint {
                    claim: format!("{name} claim one"),
                    reasoning: "reasoning".to_string(),
                    evidence: None,
                    is_rebuttal: false,
                    rebuts_speaker: None,
                },
                ArgumentPoint {
                    claim: format!("{name} claim two"),
                    reasoning: "reasoning".to_string(),
                    evidence: None,
                    is_rebuttal: false,
                    rebuts_speaker: None,
                },
            ],
            closing: String::new(),
            full_text: full_text.to_string(),
            tone: "measured".to_string(),
            rhetorical_moves: vec![],
            word_count: full_text.split_whitespace().count(),
            pois: vec![],
        }
    }

    /// A six-speech transcript with alternating sides.
    pub fn six_speech_transcript(motion: &str) -> Transcript {
        let mut transcript = Transcript::new(motion);
        let speakers = [
            ("Alice Ashworth", Side::Proposition),
            ("Bruno Keller", Side::Opposition),
            ("Clara Voss", Side::Proposition),
            ("Dmitri Holt", Side::Opposition),
            ("Elena Marsh", Side::Proposition),
            ("Felix Odum", Side::Opposition),
        ];
        for (i, (name, side)) in speakers.iter().enumerate() {
            transcript
                .push(speech(
                    (i + 1) as u8,
                    *side,
                    name,
                    &format!("Speech by {name} on the motion."),
                ))
                .unwrap();
        }
        transcript
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{six_speech_transcript, speech};
    use super::*;

    #[test]
    fn test_push_enforces_total_order() {
        let mut transcript = Transcript::new("Motion");
        let out_of_turn = speech(2, Side::Opposition, "Bruno Keller", "text");
        match transcript.push(out_of_turn) {
            Err(DebateError::OutOfTurn { expected, got }) => {
                assert_eq!(expected, 1);
                assert_eq!(got, 2);
            }
            other => panic!("expected OutOfTurn, got {other:?}"),
        }
    }

    #[test]
    fn test_positions_are_index_plus_one() {
        let transcript = six_speech_transcript("Motion");
        for (i, s) in transcript.speeches().iter().enumerate() {
            assert_eq!(s.position as usize, i + 1);
        }
    }

    #[test]
    fn test_definitions_freeze_after_speech_two() {
        use crate::definitions::{Contestation, DefinitionsFramework};

        let mut transcript = Transcript::new("Motion");
        transcript
            .push(speech(1, Side::Proposition, "Alice Ashworth", "text"))
            .unwrap();
        transcript
            .install_framework(DefinitionsFramework {
                key_terms: vec![],
                scope: "scope".to_string(),
                exclusions: String::new(),
                framing: "framing".to_string(),
            })
            .unwrap();
        transcript
            .push(speech(2, Side::Opposition, "Bruno Keller", "text"))
            .unwrap();
        transcript
            .install_contestation(Contestation {
                accepts: true,
                contested_terms: vec![],
                counter_framing: String::new(),
                agreed_ground: String::new(),
                silent_divergence: false,
            })
            .unwrap();
        transcript
            .push(speech(3, Side::Proposition, "Clara Voss", "text"))
            .unwrap();

        // Frozen now: any further amendment fails.
        let late = transcript.install_contestation(Contestation {
            accepts: false,
            contested_terms: vec![],
            counter_framing: String::new(),
            agreed_ground: String::new(),
            silent_divergence: false,
        });
        assert!(matches!(late, Err(DebateError::DefinitionsFrozen)));
    }

    #[test]
    fn test_formatted_renders_pois_inline() {
        let mut transcript = Transcript::new("Motion");
        let mut s = speech(1, Side::Proposition, "Alice Ashworth", "The speech text.");
        s.pois.push(Poi {
            from_speaker: "Bruno Keller".to_string(),
            to_speaker: "Alice Ashworth".to_string(),
            text: "On what evidence?".to_string(),
            accepted: true,
            response: Some("The trial data I just cited.".to_string()),
            after_argument_index: 1,
        });
        transcript.push(s).unwrap();

        let formatted = transcript.formatted();
        assert!(formatted.contains("[POI from Bruno Keller — ACCEPTED]"));
        assert!(formatted.contains("Response: The trial data I just cited."));
    }

    #[test]
    fn test_serde_round_trip() {
        let transcript = six_speech_transcript("Motion");
        let json = serde_json::to_string(&transcript).unwrap();
        let back: Transcript = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 6);
        assert_eq!(back.speeches()[5].speaker_name, "Felix Odum");
    }
}
