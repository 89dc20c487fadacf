//! End-to-end debate orchestration.
//!
//! Owns the debate loop: persona preparation, the six-speech sequence
//! with POI rounds and definitions tracking, then the four judging
//! layers and the aggregated verdict.

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::audit::audit_argument_graph;
use crate::client::LanguageClient;
use crate::config::Config;
use crate::definitions::{extract_contestation, extract_framework};
use crate::engagement::engagement_verdict;
use crate::error::DebateError;
use crate::persona::PersonaSource;
use crate::poi::run_poi_round;
use crate::rubric::score_speeches;
use crate::sequencer::Sequencer;
use crate::speaker::{validate_lineup, Side, SpeakerData, SpeakerProfile};
use crate::tally::{annotate_and_tally, Margin};
use crate::verdict::{aggregate, DebateReport};

/// Progress notifications emitted during a run.
#[derive(Debug, Clone)]
pub enum DebateEvent {
    DebateStarted {
        motion: String,
    },
    PersonasReady,
    SpeechStarted {
        position: u8,
        speaker: String,
        side: Side,
    },
    PoiExchange {
        from: String,
        to: String,
        accepted: bool,
    },
    SpeechCompleted {
        position: u8,
        speaker: String,
        word_count: usize,
        poi_count: usize,
    },
    FrameworkExtracted {
        term_count: usize,
    },
    ContestationExtracted {
        accepts: bool,
        silent_divergence: bool,
    },
    JudgingStarted,
    VerdictReached {
        winner: Side,
        margin: Margin,
        contested: bool,
    },
}

pub type EventCallback = Box<dyn Fn(DebateEvent) + Send + Sync>;

/// Drives a full debate from lineup to verdict.
pub struct DebateRunner {
    config: Config,
    client: Box<dyn LanguageClient>,
    personas: Box<dyn PersonaSource>,
    callback: Option<EventCallback>,
    rng: StdRng,
}

impl DebateRunner {
    pub fn new(
        config: Config,
        client: Box<dyn LanguageClient>,
        personas: Box<dyn PersonaSource>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            client,
            personas,
            callback: None,
            rng,
        }
    }

    /// Register a callback for progress events.
    pub fn with_callback(mut self, callback: EventCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    fn emit(&self, event: DebateEvent) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    /// Run the full debate. Fatal only when a required speech cannot be
    /// produced or no layer yields a winner; everything else degrades.
    pub async fn run(
        &mut self,
        motion: &str,
        lineup: Vec<SpeakerProfile>,
    ) -> Result<DebateReport, DebateError> {
        validate_lineup(&lineup)?;
        self.emit(DebateEvent::DebateStarted {
            motion: motion.to_string(),
        });
        info!(motion, "debate starting");

        // Persona prep is independent per speaker; fan out and block
        // until all six are ready.
        let client = self.client.as_ref();
        let prep_futures = lineup
            .iter()
            .map(|profile| self.personas.prepare(client, &self.config, profile, motion));
        let speakers: Vec<SpeakerData> = join_all(prep_futures)
            .await
            .into_iter()
            .collect::<Result<_, _>>()?;
        self.emit(DebateEvent::PersonasReady);

        let mut sequencer = Sequencer::new(motion);
        let mut framework = None;

        for speaker in &speakers {
            self.emit(DebateEvent::SpeechStarted {
                position: speaker.profile.position,
                speaker: speaker.profile.name.clone(),
                side: speaker.profile.side,
            });

            let mut draft = sequencer.advance(client, &self.config, speaker).await?;

            let opponents: Vec<&SpeakerData> = speakers
                .iter()
                .filter(|s| s.profile.side != speaker.profile.side)
                .collect();
            run_poi_round(
                client,
                &self.config,
                &mut draft,
                &opponents,
                speaker,
                &mut self.rng,
            )
            .await;
            for poi in &draft.pois {
                self.emit(DebateEvent::PoiExchange {
                    from: poi.from_speaker.clone(),
                    to: poi.to_speaker.clone(),
                    accepted: poi.accepted,
                });
            }

            self.emit(DebateEvent::SpeechCompleted {
                position: draft.position,
                speaker: draft.speaker_name.clone(),
                word_count: draft.word_count,
                poi_count: draft.pois.len(),
            });

            let position = draft.position;
            sequencer.record(draft)?;

            // Definitions tracking rides on the first two speeches.
            // Extraction failures degrade; the debate goes on without
            // the framework.
            if position == 1 {
                let first = &sequencer.transcript().speeches()[0];
                match extract_framework(client, &self.config.models.analysis, motion, first).await {
                    Ok(fw) => {
                        self.emit(DebateEvent::FrameworkExtracted {
                            term_count: fw.key_terms.len(),
                        });
                        framework = Some(fw.clone());
                        sequencer.set_framework(fw)?;
                    }
                    Err(e) => warn!(error = %e, "definitions framework extraction degraded"),
                }
            } else if position == 2 {
                if let Some(fw) = &framework {
                    let second = &sequencer.transcript().speeches()[1];
                    match extract_contestation(
                        client,
                        &self.config.models.analysis,
                        motion,
                        fw,
                        second,
                    )
                    .await
                    {
                        Ok(contestation) => {
                            self.emit(DebateEvent::ContestationExtracted {
                                accepts: contestation.accepts,
                                silent_divergence: contestation.silent_divergence,
                            });
                            sequencer.set_contestation(contestation)?;
                        }
                        Err(e) => warn!(error = %e, "contestation extraction degraded"),
                    }
                }
            }
        }

        let transcript = sequencer.into_transcript()?;
        self.emit(DebateEvent::JudgingStarted);
        info!("transcript complete, judging");

        // The three model-facing layers are independent reads of the
        // same immutable transcript.
        let (rubric, tally, engagement) = tokio::join!(
            score_speeches(client, &self.config, &transcript),
            annotate_and_tally(client, &self.config, &transcript),
            engagement_verdict(client, &self.config, &transcript),
        );
        let audit = audit_argument_graph(&tally);

        let verdict = aggregate(rubric, tally, engagement, audit)?;
        self.emit(DebateEvent::VerdictReached {
            winner: verdict.winner,
            margin: verdict.margin,
            contested: verdict.consistency == crate::engagement::Consistency::Contested,
        });

        Ok(DebateReport {
            transcript,
            verdict,
        })
    }
}
