//! Error types for the debate engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("OpenAI API error: {0}")]
    Api(#[from] async_openai::error::OpenAIError),

    #[error("malformed structured output: {0}")]
    Malformed(String),

    #[error("speech out of turn: expected position {expected}, got {got}")]
    OutOfTurn { expected: u8, got: u8 },

    #[error("speech {position} could not be produced after {attempts} attempts")]
    SpeechFailed { position: u8, attempts: u32 },

    #[error("definitions framework is frozen and cannot be amended")]
    DefinitionsFrozen,

    #[error("invalid speaker lineup: {0}")]
    InvalidLineup(String),

    #[error("all verdict layers failed; no verdict can be produced")]
    VerdictUnavailable,

    #[error("configuration error: {0}")]
    Config(String),
}
