//! DebateSim Core Library
//!
//! Simulates six-speaker two-sided formal debates and judges them with
//! a bias-resistant multi-layer verdict engine: rubric scoring,
//! mechanical claim tallying, anonymized dual-pass engagement panels,
//! and an argument graph audit.

pub mod audit;
pub mod client;
pub mod config;
pub mod definitions;
pub mod engagement;
pub mod error;
pub mod persona;
pub mod poi;
pub mod rubric;
pub mod runner;
pub mod sequencer;
pub mod speaker;
pub mod tally;
pub mod transcript;
pub mod verdict;

pub use client::{LanguageClient, OpenAiClient};
pub use config::Config;
pub use engagement::Consistency;
pub use error::DebateError;
pub use persona::{BioPersonaSource, PersonaSource};
pub use runner::{DebateEvent, DebateRunner, EventCallback};
pub use speaker::{Side, SpeakerProfile};
pub use tally::Margin;
pub use transcript::Transcript;
pub use verdict::{DebateReport, Verdict};
