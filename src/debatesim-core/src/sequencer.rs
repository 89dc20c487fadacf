//! Debate turn sequencing.
//!
//! Drives the six-speech state machine and owns the transcript. Each
//! speech is generated with full visibility of everything already
//! delivered and zero visibility of anything not yet spoken. Speech
//! production is two-step: free-text generation under the persona
//! prompt, then a separate structured-metadata extraction call.

use serde::Deserialize;
use tracing::{debug, info};

use crate::client::{LanguageClient, extract, sanitize_response};
use crate::config::Config;
use crate::definitions::{Contestation, DefinitionsFramework};
use crate::error::DebateError;
use crate::speaker::{SpeakerData, Side};
use crate::transcript::{ArgumentPoint, Speech, Transcript};

/// States of the debate. Strictly forward: `AwaitingSpeech(1)` through
/// `AwaitingSpeech(6)`, then `Concluded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebateState {
    AwaitingSpeech(u8),
    Concluded,
}

/// Owns the transcript and enforces turn order. The sole writer of
/// debate state.
pub struct Sequencer {
    transcript: Transcript,
    state: DebateState,
}

/// Structured metadata extracted from a generated speech.
#[derive(Debug, Deserialize)]
struct SpeechMetadata {
    opening: String,
    closing: String,
    arguments: Vec<ArgumentPoint>,
    tone: String,
    #[serde(default)]
    rhetorical_moves: Vec<String>,
}

impl Sequencer {
    pub fn new(motion: impl Into<String>) -> Self {
        Self {
            transcript: Transcript::new(motion),
            state: DebateState::AwaitingSpeech(1),
        }
    }

    pub fn state(&self) -> DebateState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Generate the next speech as a draft. The draft is not part of
    /// the transcript until [`Sequencer::record`] accepts it (the POI
    /// round runs in between).
    pub async fn advance(
        &mut self,
        client: &dyn LanguageClient,
        config: &Config,
        speaker: &SpeakerData,
    ) -> Result<Speech, DebateError> {
        let expected = match self.state {
            DebateState::AwaitingSpeech(n) => n,
            DebateState::Concluded => {
                return Err(DebateError::OutOfTurn {
                    expected: 7,
                    got: speaker.profile.position,
                });
            }
        };
        if speaker.profile.position != expected {
            return Err(DebateError::OutOfTurn {
                expected,
                got: speaker.profile.position,
            });
        }

        let prompt = build_speech_prompt(config, &self.transcript, speaker);
        debug!(position = expected, speaker = %speaker.profile.name, "generating speech");

        // Retry empty or truncated output; the client already retries
        // transient API failures internally.
        let max_attempts = config.debate.max_speech_attempts;
        let mut full_text = String::new();
        for attempt in 0..max_attempts {
            if attempt > 0 {
                tokio::time::sleep(std::time::Duration::from_secs(1 << attempt)).await;
            }
            let raw = client
                .generate(Some(&speaker.persona_prompt), &prompt, &config.models.speaker)
                .await?;
            full_text = sanitize_response(&raw);
            if full_text.split_whitespace().count() >= 50 {
                break;
            }
            info!(
                attempt = attempt + 1,
                speaker = %speaker.profile.name,
                "speech came back empty or truncated, retrying"
            );
            full_text.clear();
        }
        if full_text.is_empty() {
            return Err(DebateError::SpeechFailed {
                position: expected,
                attempts: max_attempts,
            });
        }

        let metadata = extract_speech_metadata(client, config, speaker, &full_text).await?;
        let word_count = full_text.split_whitespace().count();

        Ok(Speech {
            speaker_id: speaker.profile.id.clone(),
            speaker_name: speaker.profile.name.clone(),
            side: speaker.profile.side,
            position: expected,
            opening: metadata.opening,
            arguments: metadata.arguments,
            closing: metadata.closing,
            full_text,
            tone: metadata.tone,
            rhetorical_moves: metadata.rhetorical_moves,
            word_count,
            pois: Vec::new(),
        })
    }

    /// Finalize a speech into the transcript and advance the state
    /// machine. After this the speech is never edited again.
    pub fn record(&mut self, speech: Speech) -> Result<(), DebateError> {
        let position = speech.position;
        self.transcript.push(speech)?;
        self.state = if position >= 6 {
            DebateState::Concluded
        } else {
            DebateState::AwaitingSpeech(position + 1)
        };
        info!(position, "speech recorded");
        Ok(())
    }

    pub fn set_framework(&mut self, framework: DefinitionsFramework) -> Result<(), DebateError> {
        self.transcript.install_framework(framework)
    }

    pub fn set_contestation(&mut self, contestation: Contestation) -> Result<(), DebateError> {
        self.transcript.install_contestation(contestation)
    }

    /// Consume the sequencer, yielding the completed transcript.
    /// Partial transcripts are never released to the verdict engine.
    pub fn into_transcript(self) -> Result<Transcript, DebateError> {
        match self.state {
            DebateState::Concluded => Ok(self.transcript),
            DebateState::AwaitingSpeech(n) => Err(DebateError::SpeechFailed {
                position: n,
                attempts: 0,
            }),
        }
    }
}

async fn extract_speech_metadata(
    client: &dyn LanguageClient,
    config: &Config,
    speaker: &SpeakerData,
    full_text: &str,
) -> Result<SpeechMetadata, DebateError> {
    let prompt = format!(
        r#"Analyse this debate speech and extract its structure.

Speaker: {name}
Side: {side}

Speech:
---
{full_text}
---

Extract:
- opening: the first 2-3 sentences that hook the audience
- closing: the peroration / final appeal
- arguments: the 2-4 main argument points, each with claim, reasoning,
  evidence if cited, is_rebuttal, and rebuts_speaker when it targets a
  specific speaker
- tone: the overall tone, e.g. "measured but firm", "impassioned"
- rhetorical_moves: notable rhetorical devices used

Respond as JSON: {{"opening": "...", "closing": "...", "arguments":
[{{"claim": "...", "reasoning": "...", "evidence": null, "is_rebuttal":
false, "rebuts_speaker": null}}], "tone": "...", "rhetorical_moves": ["..."]}}"#,
        name = speaker.profile.name,
        side = speaker.profile.side.display_name(),
        full_text = full_text,
    );
    extract(client, &prompt, &config.models.analysis).await
}

fn build_speech_prompt(config: &Config, transcript: &Transcript, speaker: &SpeakerData) -> String {
    let position = speaker.profile.position;
    let motion = &transcript.motion;
    let length_instruction = format!(
        "Your speech MUST be approximately {} words (~7 minutes at speaking \
         pace). Write a FULL speech — do not abbreviate or cut short.",
        config.debate.speech_word_target
    );
    let signoff = format!(
        "{length_instruction}\n\nDeliver your speech as {name} would — in \
         their voice, with their characteristic style and argumentation.\n\n\
         Write ONLY the speech text. No metadata, no stage directions, no JSON.",
        name = speaker.profile.name,
    );

    match position {
        1 => format!(
            r#"You are the first speaker for the Proposition.
Open the case for the motion: "{motion}"

Your role:
- Define and frame the motion
- Present your strongest 2-3 arguments
- Set the tone for your side
- You are speaking first; there is nothing to rebut yet.

{signoff}"#
        ),
        2 => {
            let first = &transcript.speeches()[0];
            let defs_block = match transcript.definitions() {
                Some(record) => format!(
                    "\nThe Proposition has set the following definitional framework:\n{}\n\n\
                     You MUST engage with these definitions: accept them and argue within \
                     that framework, or explicitly contest specific definitions and explain \
                     WHY your interpretation is better. Do NOT silently redefine terms.\n",
                    record.context_block()
                ),
                None => String::new(),
            };
            format!(
                r#"You are the first speaker for the Opposition against
the motion: "{motion}"

You have just heard the following speech from {first_name}:
---
{first_text}
---
{defs_block}
Your role:
- Engage with the Proposition's definitions — accept or contest them explicitly
- Respond to the strongest points made by the Proposition
- Present your own 2-3 core arguments against the motion
- You must both rebut AND build your own case

{signoff}"#,
                first_name = first.speaker_name,
                first_text = first.full_text,
            )
        }
        _ => {
            let side_label = speaker.profile.side.display_name();
            let is_final = position == 6;
            let defs_block = match transcript.definitions() {
                Some(record) => format!(
                    "\n{}\n\nYou MUST argue within this agreed framework. If you believe \
                     a definition was set up unfairly, contest it explicitly — but do NOT \
                     silently operate under different assumptions.\n",
                    record.context_block()
                ),
                None => String::new(),
            };
            let role_line = if is_final {
                "This is the FINAL speech of the debate. Drive home the most \
                 compelling case for your side and build to a powerful peroration."
            } else {
                "Build on what your side has established while advancing the debate."
            };
            format!(
                r#"You are speaker {bench} of 3 for the {side_label}.

The motion is: "{motion}"
{defs_block}
The debate so far:
{transcript_text}

Your preparation notes (written before hearing the other speeches):
{prep_notes}

Your role:
- Engage with what has been said — rebut key opposing arguments,
  prioritising the strongest ones your side has not yet answered
- Advance NEW arguments your side has not made yet: drop points your
  teammates already covered, even if worded differently, and develop
  fresh angles instead
- You may briefly reference a teammate's point but must immediately
  move to your own distinct contribution
- {role_line}

{signoff}"#,
                bench = speaker.profile.bench_position(),
                transcript_text = transcript.formatted(),
                prep_notes = speaker.prep_notes,
            )
        }
    }
}
