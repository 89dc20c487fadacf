//! Definitional framework tracking.
//!
//! The first Proposition speech sets the definitional framework; the
//! first Opposition speech accepts or contests it. From speech 3 onward
//! the framework is frozen and injected as shared context into every
//! generation and judging call, so the two sides cannot drift into
//! arguing incompatible framings unnoticed.

use serde::{Deserialize, Serialize};

use crate::client::{LanguageClient, extract};
use crate::config::ModelSpec;
use crate::error::DebateError;
use crate::transcript::Speech;

/// A single key term and how it is defined for the debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermDefinition {
    pub term: String,
    pub definition: String,
}

/// The definitional framework set by the first Proposition speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionsFramework {
    /// 2-4 key terms from the motion and how they are defined.
    pub key_terms: Vec<TermDefinition>,
    /// What is IN scope for this debate.
    pub scope: String,
    /// What is explicitly OUT of scope, if anything.
    #[serde(default)]
    pub exclusions: String,
    /// How the Proposition frames the central question.
    pub framing: String,
}

/// The Opposition's recorded response to the framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contestation {
    pub accepts: bool,
    #[serde(default)]
    pub contested_terms: Vec<TermDefinition>,
    #[serde(default)]
    pub counter_framing: String,
    /// What both sides accept, used to locate the real clash.
    #[serde(default)]
    pub agreed_ground: String,
    /// Set when the Opposition diverges without explicitly contesting
    /// any term. Recorded as a warning, never auto-corrected.
    pub silent_divergence: bool,
}

/// Framework plus contestation record. Frozen once both are in; only
/// readable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionsRecord {
    pub framework: DefinitionsFramework,
    pub contestation: Option<Contestation>,
}

impl DefinitionsRecord {
    /// Render the framework as a context block for speech and judging
    /// prompts.
    pub fn context_block(&self) -> String {
        let mut parts = vec![
            "DEFINITIONAL FRAMEWORK FOR THIS DEBATE".to_string(),
            "=".repeat(45),
            String::new(),
            "The Proposition has defined the key terms as follows:".to_string(),
        ];
        for t in &self.framework.key_terms {
            parts.push(format!("  - {}: {}", t.term, t.definition));
        }
        parts.push(format!("\nScope: {}", self.framework.scope));
        if !self.framework.exclusions.is_empty() {
            parts.push(format!("Exclusions: {}", self.framework.exclusions));
        }
        parts.push(format!(
            "Proposition's framing: {}",
            self.framework.framing
        ));

        if let Some(c) = &self.contestation {
            parts.push(String::new());
            if c.accepts {
                parts.push("The Opposition ACCEPTS these definitions.".to_string());
            } else if c.contested_terms.is_empty() {
                parts.push(
                    "WARNING: The Opposition appears to operate under different \
                     definitions without explicitly contesting any term."
                        .to_string(),
                );
            } else {
                parts.push("The Opposition CONTESTS some definitions:".to_string());
                for t in &c.contested_terms {
                    parts.push(format!("  - {}: {}", t.term, t.definition));
                }
            }
            if !c.counter_framing.is_empty() {
                parts.push(format!("Opposition's counter-framing: {}", c.counter_framing));
            }
            if !c.agreed_ground.is_empty() {
                parts.push(format!("Agreed ground: {}", c.agreed_ground));
            }
        }

        parts.push(String::new());
        parts.push(
            "ALL speakers should argue within this framework. If you disagree \
             with how a term has been defined, contest it explicitly; do NOT \
             silently operate under different definitions."
                .to_string(),
        );

        parts.join("\n")
    }
}

/// Extract the definitional framework from the first Proposition speech.
pub async fn extract_framework(
    client: &dyn LanguageClient,
    spec: &ModelSpec,
    motion: &str,
    first_speech: &Speech,
) -> Result<DefinitionsFramework, DebateError> {
    let prompt = format!(
        r#"You are analysing the opening speech of a formal two-sided debate.

Motion: "{motion}"

The first Proposition speaker ({name}) gave this speech:
---
{text}
---

Extract the DEFINITIONAL FRAMEWORK this speaker has set:

1. key_terms: 2-4 key terms from the motion and how the speaker defines
   each one, explicitly or implicitly. Pay attention to words that could
   be interpreted multiple ways.
2. scope: what is IN scope for this debate according to the speaker.
3. exclusions: what the speaker explicitly puts OUT of scope, if anything.
4. framing: in 1-2 sentences, how the speaker frames the central question.

Be precise. If a term was not explicitly defined, note how the speaker
implicitly interpreted it.

Respond as JSON: {{"key_terms": [{{"term": "...", "definition": "..."}}],
"scope": "...", "exclusions": "...", "framing": "..."}}"#,
        motion = motion,
        name = first_speech.speaker_name,
        text = first_speech.full_text,
    );

    extract(client, &prompt, spec).await
}

#[derive(Debug, Deserialize)]
struct ContestationExtraction {
    accepts: bool,
    #[serde(default)]
    contested_terms: Vec<TermDefinition>,
    #[serde(default)]
    counter_framing: String,
    #[serde(default)]
    agreed_ground: String,
}

/// Extract the Opposition's response to the framework from speech 2.
///
/// Divergence without explicit contestation is flagged, not corrected.
pub async fn extract_contestation(
    client: &dyn LanguageClient,
    spec: &ModelSpec,
    motion: &str,
    framework: &DefinitionsFramework,
    second_speech: &Speech,
) -> Result<Contestation, DebateError> {
    let terms_text: String = framework
        .key_terms
        .iter()
        .map(|t| format!("  - {}: {}", t.term, t.definition))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        r#"You are analysing the first Opposition response in a formal debate.

Motion: "{motion}"

The Proposition defined terms as follows:
{terms_text}
Scope: {scope}
Framing: {framing}

The first Opposition speaker ({name}) responded:
---
{text}
---

Analyse the Opposition's response to the definitions:

1. accepts: do they broadly accept the Proposition's definitions?
   If they implicitly operate under different assumptions without
   explicitly contesting any term, set accepts to false and leave
   contested_terms empty.
2. contested_terms: terms they explicitly contest or redefine, and how.
3. counter_framing: their reframing of the central question, if any.
4. agreed_ground: what both sides accept.

Respond as JSON: {{"accepts": true, "contested_terms": [{{"term": "...",
"definition": "..."}}], "counter_framing": "...", "agreed_ground": "..."}}"#,
        motion = motion,
        terms_text = terms_text,
        scope = framework.scope,
        framing = framework.framing,
        name = second_speech.speaker_name,
        text = second_speech.full_text,
    );

    let raw: ContestationExtraction = extract(client, &prompt, spec).await?;
    // Silent divergence: not accepted, yet nothing explicitly contested.
    let silent_divergence = !raw.accepts && raw.contested_terms.is_empty();
    Ok(Contestation {
        accepts: raw.accepts,
        contested_terms: raw.contested_terms,
        counter_framing: raw.counter_framing,
        agreed_ground: raw.agreed_ground,
        silent_divergence,
    })
}
