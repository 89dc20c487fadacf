//! Points of Information sub-protocol.
//!
//! Runs once per completed speech, before the speech is finalized.
//! Every interior argument point may attract an opposing interjection;
//! the first and last points are protected time. Offer queries are
//! independent per point and fan out concurrently; results are resolved
//! in argument-index order so the outcome is deterministic given the
//! offers and the RNG stream.

use futures::future::join_all;
use rand::Rng;
use rand::rngs::StdRng;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::client::{LanguageClient, extract, sanitize_response};
use crate::config::{Config, PoiParams};
use crate::speaker::SpeakerData;
use crate::transcript::{Poi, Speech};

/// Argument-point indices where a POI may be raised: interior points
/// only. First and last are protected time.
pub fn eligible_indices(n_points: usize) -> Vec<usize> {
    if n_points < 3 {
        return Vec::new();
    }
    (1..n_points - 1).collect()
}

/// The acceptance gate.
///
/// Probability starts at `base_rate` and decreases with each POI the
/// speaker has already accepted in this speech and with the speaker's
/// ordinal position (later speakers yield less time). Monotonically
/// non-increasing in both, clamped to `[floor, base_rate]`.
pub fn acceptance_probability(params: &PoiParams, accepted_so_far: usize, position: u8) -> f64 {
    let position_steps = position.saturating_sub(1) as f64;
    let p = params.base_rate
        - params.per_accepted_penalty * accepted_so_far as f64
        - params.per_position_penalty * position_steps;
    p.clamp(params.floor, params.base_rate)
}

#[derive(Debug, Deserialize)]
struct PoiOffer {
    offers_poi: bool,
    #[serde(default)]
    from_speaker: String,
    #[serde(default)]
    text: String,
}

/// Run the POI round for a draft speech, splicing accepted exchanges
/// into the speech text. Failures degrade to "no POI at this point";
/// this never aborts the speech.
pub async fn run_poi_round(
    client: &dyn LanguageClient,
    config: &Config,
    speech: &mut Speech,
    opponents: &[&SpeakerData],
    receiver: &SpeakerData,
    rng: &mut StdRng,
) {
    let indices = eligible_indices(speech.arguments.len());
    if indices.is_empty() || opponents.is_empty() {
        return;
    }

    let opponent_names: Vec<&str> = opponents.iter().map(|o| o.profile.name.as_str()).collect();

    // Fan out the per-point offer queries; join_all keeps index order.
    let offer_futures = indices.iter().map(|&i| {
        let argument = &speech.arguments[i];
        let prompt = offer_prompt(
            &speech.speaker_name,
            &argument.claim,
            &argument.reasoning,
            &opponent_names,
        );
        async move {
            match extract::<PoiOffer>(client, &prompt, &config.models.poi).await {
                Ok(offer) => Some(offer),
                Err(e) => {
                    warn!(argument_index = i, error = %e, "POI offer failed, skipping point");
                    None
                }
            }
        }
    });
    let offers = join_all(offer_futures).await;

    // Resolve offers sequentially in argument order.
    let mut accepted_count = 0usize;
    for (&i, offer) in indices.iter().zip(offers) {
        if speech.pois.len() >= config.poi.max_per_speech {
            break;
        }
        let Some(offer) = offer else { continue };
        if !offer.offers_poi || offer.text.is_empty() {
            continue;
        }

        let p = acceptance_probability(&config.poi, accepted_count, speech.position);
        let accepted = rng.gen_bool(p);
        debug!(
            argument_index = i,
            probability = p,
            accepted,
            "POI offered"
        );

        let mut response = None;
        if accepted {
            match generate_response(client, config, speech, receiver, &offer).await {
                Ok(text) => response = Some(text),
                Err(e) => {
                    // Degrade: treat as if nobody rose at this point.
                    warn!(argument_index = i, error = %e, "POI response failed, dropping POI");
                    continue;
                }
            }
            accepted_count += 1;
            splice_exchange(
                speech,
                i,
                &offer.from_speaker,
                &offer.text,
                response.as_deref().unwrap_or_default(),
            );
        }

        speech.pois.push(Poi {
            from_speaker: offer.from_speaker,
            to_speaker: speech.speaker_name.clone(),
            text: offer.text,
            accepted,
            response,
            after_argument_index: i,
        });
    }
}

fn offer_prompt(speaker_name: &str, claim: &str, reasoning: &str, opponents: &[&str]) -> String {
    format!(
        r#"During a formal debate, the current speaker ({speaker_name}) just
made this argument:

"{claim} — {reasoning}"

The opposing speakers are: {opponents}

Should any opposing speaker rise on a Point of Information?

Rules:
- POIs should be brief (1-2 sentences), pointed, and designed to
  wrong-foot the speaker.
- Not every argument warrants a POI. Only rise if there is a genuinely
  sharp, targeted intervention to make.
- At most one speaker rises per argument.
- Roughly a third of arguments attract a POI attempt — most do NOT.

Respond as JSON: {{"offers_poi": false, "from_speaker": "", "text": ""}}"#,
        speaker_name = speaker_name,
        claim = claim,
        reasoning = reasoning,
        opponents = opponents.join(", "),
    )
}

async fn generate_response(
    client: &dyn LanguageClient,
    config: &Config,
    speech: &Speech,
    receiver: &SpeakerData,
    offer: &PoiOffer,
) -> Result<String, crate::error::DebateError> {
    let prompt = format!(
        r#"You are {name}, mid-speech in a formal debate.

You have just been interrupted by a Point of Information from {from}:
"{text}"

You ACCEPTED the POI. Give a sharp, brief response (1-3 sentences) that
deflects, rebuts, or turns the point to your advantage, then indicate
you are resuming your speech.

Respond in character as {name}. Write ONLY the response."#,
        name = speech.speaker_name,
        from = offer.from_speaker,
        text = offer.text,
    );
    let raw = client
        .generate(Some(&receiver.persona_prompt), &prompt, &config.models.poi)
        .await?;
    Ok(sanitize_response(&raw))
}

/// Splice an accepted POI exchange into the speech text immediately
/// after the triggering argument point. Falls back to appending when
/// the claim cannot be located verbatim.
fn splice_exchange(speech: &mut Speech, argument_index: usize, from: &str, text: &str, response: &str) {
    let block = format!(
        "\n\n[POI — {from}]: \"{text}\"\n[{name} responds]: {response}\n",
        name = speech.speaker_name,
    );
    let claim = &speech.arguments[argument_index].claim;
    let insert_at = speech.full_text.find(claim.as_str()).map(|start| {
        let after_claim = start + claim.len();
        speech.full_text[after_claim..]
            .find("\n\n")
            .map(|offset| after_claim + offset)
            .unwrap_or(speech.full_text.len())
    });
    match insert_at {
        Some(at) => speech.full_text.insert_str(at, &block),
        None => speech.full_text.push_str(&block),
    }
}
