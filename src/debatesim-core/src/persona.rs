//! Persona preparation.
//!
//! Turns a static [`SpeakerProfile`] into the full [`SpeakerData`] the
//! sequencer generates from. Preparation happens once per speaker,
//! before the debate starts, with zero visibility of any speech.

use async_trait::async_trait;

use crate::client::LanguageClient;
use crate::config::Config;
use crate::error::DebateError;
use crate::speaker::{SpeakerData, SpeakerProfile, StyleProfile};

/// Source of persona material for a speaker.
///
/// Implementations may consult an external corpus; the engine only
/// requires that preparation is read-only and happens before speech 1.
#[async_trait]
pub trait PersonaSource: Send + Sync {
    async fn prepare(
        &self,
        client: &dyn LanguageClient,
        config: &Config,
        profile: &SpeakerProfile,
        motion: &str,
    ) -> Result<SpeakerData, DebateError>;
}

/// Persona source that works from the profile's bio alone.
///
/// Builds the persona prompt directly and asks the speaker model for
/// one round of private prep notes. No corpus retrieval.
pub struct BioPersonaSource;

#[async_trait]
impl PersonaSource for BioPersonaSource {
    async fn prepare(
        &self,
        client: &dyn LanguageClient,
        config: &Config,
        profile: &SpeakerProfile,
        motion: &str,
    ) -> Result<SpeakerData, DebateError> {
        let persona_prompt = build_persona_prompt(profile, motion);

        let prep_prompt = format!(
            r#"You are preparing to debate. Motion: "{motion}"

You will speak {bench} for the {side} and must argue {stance} the motion
regardless of your personal views.

Write private prep notes for yourself:
- your 3-4 strongest arguments, each with the best evidence or example
  you can marshal
- the strongest arguments you expect from the other side, and how you
  would answer each
- one framing of the motion that favors your side

Be concrete. These notes are for you alone; no rhetoric needed."#,
            motion = motion,
            bench = ordinal(profile.bench_position()),
            side = profile.side.display_name(),
            stance = match profile.side {
                crate::speaker::Side::Proposition => "FOR",
                crate::speaker::Side::Opposition => "AGAINST",
            },
        );

        let prep_notes = client
            .generate(Some(&persona_prompt), &prep_prompt, &config.models.speaker)
            .await?;

        Ok(SpeakerData {
            profile: profile.clone(),
            style: StyleProfile::default(),
            persona_prompt,
            prep_notes,
            retrieved_passages: Vec::new(),
        })
    }
}

fn build_persona_prompt(profile: &SpeakerProfile, motion: &str) -> String {
    format!(
        r#"You are {name}. Stay fully in character at all times.

About you:
{bio}

You are the {bench} speaker for the {side} in a formal six-speech debate
on the motion: "{motion}". You argue your bench's case with conviction,
in your own voice, drawing on your own experience and manner of
speaking. You never acknowledge being simulated or break character."#,
        name = profile.name,
        bio = profile.bio,
        bench = ordinal(profile.bench_position()),
        side = profile.side.display_name(),
        motion = motion,
    )
}

fn ordinal(n: u8) -> &'static str {
    match n {
        1 => "first",
        2 => "second",
        _ => "third",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::{FailingClient, ScriptedClient};
    use crate::speaker::test_support::demo_lineup;

    #[tokio::test]
    async fn test_prepare_builds_prompt_and_notes() {
        let lineup = demo_lineup();
        let config = Config::default();
        let client = ScriptedClient::new(vec!["1. Strong argument about safety."]);

        let data = BioPersonaSource
            .prepare(&client, &config, &lineup[0], "This house would test")
            .await
            .unwrap();

        assert!(data.persona_prompt.contains("Alice Ashworth"));
        assert!(data.persona_prompt.contains("first speaker"));
        assert!(data.persona_prompt.contains("Proposition"));
        assert_eq!(data.prep_notes, "1. Strong argument about safety.");
    }

    #[tokio::test]
    async fn test_prepare_propagates_failure() {
        let lineup = demo_lineup();
        let config = Config::default();
        let result = BioPersonaSource
            .prepare(&FailingClient, &config, &lineup[3], "Motion")
            .await;
        assert!(result.is_err());
    }
}
