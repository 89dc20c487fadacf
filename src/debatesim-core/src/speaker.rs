//! Speaker definitions.
//!
//! Static identity of the six debate participants and everything known
//! about them going into the debate.

use serde::{Deserialize, Serialize};

use crate::error::DebateError;

/// Which bench a speaker sits on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Proposition,
    Opposition,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Proposition => Side::Opposition,
            Side::Opposition => Side::Proposition,
        }
    }

    /// Upper-case label used in transcript headers.
    pub fn label(self) -> &'static str {
        match self {
            Side::Proposition => "PROPOSITION",
            Side::Opposition => "OPPOSITION",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Side::Proposition => "Proposition",
            Side::Opposition => "Opposition",
        }
    }

    /// The bench that speaks at a given position. The order alternates,
    /// Proposition first.
    pub fn at_position(position: u8) -> Side {
        if position % 2 == 1 {
            Side::Proposition
        } else {
            Side::Opposition
        }
    }
}

/// Static identity of a debate participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerProfile {
    /// Unique speaker identifier (slug).
    pub id: String,
    /// Full display name.
    pub name: String,
    pub side: Side,
    /// Position 1-6 in the overall speaking order.
    pub position: u8,
    /// Short biographical summary used to condition generation.
    pub bio: String,
}

impl SpeakerProfile {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        side: Side,
        position: u8,
        bio: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            side,
            position,
            bio: bio.into(),
        }
    }

    /// 1st, 2nd, or 3rd speaker on their own bench.
    pub fn bench_position(&self) -> u8 {
        self.position.div_ceil(2)
    }
}

/// Rhetorical style extracted from a speaker's corpus by the external
/// persona capability. Carried opaquely; the engine never interprets it
/// beyond prompt construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StyleProfile {
    pub speech_register: String,
    pub opening_patterns: Vec<String>,
    pub rhetorical_devices: Vec<String>,
    pub disagreement_style: String,
    pub signature_phrases: Vec<String>,
    pub closing_patterns: Vec<String>,
}

/// Everything known about a speaker going into the debate.
///
/// Built once before the first speech; immutable thereafter. In
/// particular `prep_notes` are written without sight of any speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerData {
    pub profile: SpeakerProfile,
    pub style: StyleProfile,
    /// Full system prompt used for this speaker's generation calls.
    pub persona_prompt: String,
    /// Self-prepared argument notes, generated before any speech.
    pub prep_notes: String,
    /// Grounding passages retrieved from the speaker's corpus.
    pub retrieved_passages: Vec<String>,
}

/// Check that a lineup is six speakers in strict alternating order:
/// Prop, Opp, Prop, Opp, Prop, Opp at positions 1-6.
pub fn validate_lineup(lineup: &[SpeakerProfile]) -> Result<(), DebateError> {
    if lineup.len() != 6 {
        return Err(DebateError::InvalidLineup(format!(
            "expected 6 speakers, got {}",
            lineup.len()
        )));
    }
    for (i, profile) in lineup.iter().enumerate() {
        let position = (i + 1) as u8;
        if profile.position != position {
            return Err(DebateError::InvalidLineup(format!(
                "speaker '{}' at index {} has position {}, expected {}",
                profile.name, i, profile.position, position
            )));
        }
        let expected_side = Side::at_position(position);
        if profile.side != expected_side {
            return Err(DebateError::InvalidLineup(format!(
                "position {} must be {}, but '{}' is {}",
                position,
                expected_side.display_name(),
                profile.name,
                profile.side.display_name()
            )));
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::demo_lineup;
    use super::*;

    #[test]
    fn test_valid_lineup_passes() {
        assert!(validate_lineup(&demo_lineup()).is_ok());
    }

    #[test]
    fn test_wrong_count_rejected() {
        let lineup = &demo_lineup()[..4];
        assert!(matches!(
            validate_lineup(lineup),
            Err(DebateError::InvalidLineup(_))
        ));
    }

    #[test]
    fn test_non_alternating_rejected() {
        let mut lineup = demo_lineup();
        lineup[1].side = Side::Proposition;
        assert!(matches!(
            validate_lineup(&lineup),
            Err(DebateError::InvalidLineup(_))
        ));
    }

    #[test]
    fn test_bad_position_rejected() {
        let mut lineup = demo_lineup();
        lineup[3].position = 5;
        assert!(matches!(
            validate_lineup(&lineup),
            Err(DebateError::InvalidLineup(_))
        ));
    }

    #[test]
    fn test_bench_position() {
        let lineup = demo_lineup();
        assert_eq!(lineup[0].bench_position(), 1);
        assert_eq!(lineup[1].bench_position(), 1);
        assert_eq!(lineup[4].bench_position(), 3);
        assert_eq!(lineup[5].bench_position(), 3);
    }

    #[test]
    fn test_side_at_position_alternates() {
        for profile in demo_lineup() {
            assert_eq!(Side::at_position(profile.position), profile.side);
        }
    }
}
