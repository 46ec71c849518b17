use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::encoder::EncodedPayload;

pub const GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models/";
pub const API_KEY_HEADER: &str = "x-goog-api-key";

pub const TEMPERATURE: f32 = 0.8;
pub const TOP_K: u32 = 32;
pub const TOP_P: f32 = 0.9;

pub const SYSTEM_INSTRUCTION: &str = "You are a merciless but charming roast comedian. Look at \
    the photo you are given and deliver one savage, genuinely funny roast of it. Rules: a single \
    sentence, two lines at the very most. Never insult anyone's weight, race, gender identity, \
    religion, or disability. No preamble, no explanation, no quotation marks -- output only the \
    roast itself.";

pub const USER_PROMPT: &str = "Roast this image.";

/// Returned verbatim when the service withholds its answer for safety reasons.
pub const SAFETY_FALLBACK: &str = "My safety protocols kicked in. Whatever I was about to say \
    was apparently too spicy even for me. Consider yourself roasted by implication.";

/// Returned verbatim when the service answers successfully but says nothing.
pub const SPEECHLESS_FALLBACK: &str = "I'm speechless... and not in a good way. I've got \
    nothing. Somehow that might be the harshest burn of all.";

const SAFETY_FINISH_REASON: &str = "SAFETY";

// --- Request shape (fixed; one image part, one fixed prompt) ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    system_instruction: SystemInstruction,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
}

// --- Response shape (only what fallback classification needs) ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

// --- Public API ---

/// What came back from the HTTP capability, reduced to the two cases the
/// client distinguishes. Built in the send callback so neither the update
/// function nor the tests ever touch transport types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceOutcome {
    Response {
        status: u16,
        #[serde(with = "serde_bytes")]
        body: Vec<u8>,
    },
    TransportFailure {
        message: String,
    },
}

pub fn endpoint(model: &str) -> Result<String, url::ParseError> {
    let url = Url::parse(&format!("{API_BASE}{model}:generateContent"))?;
    Ok(url.into())
}

#[must_use]
pub fn build_request(payload: &EncodedPayload) -> GenerateRequest {
    GenerateRequest {
        system_instruction: SystemInstruction {
            parts: vec![Part::Text {
                text: SYSTEM_INSTRUCTION.into(),
            }],
        },
        contents: vec![Content {
            role: "user",
            parts: vec![
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: payload.media_type.clone(),
                        data: payload.data.clone(),
                    },
                },
                Part::Text {
                    text: USER_PROMPT.into(),
                },
            ],
        }],
        generation_config: GenerationConfig {
            temperature: TEMPERATURE,
            top_k: TOP_K,
            top_p: TOP_P,
        },
    }
}

pub fn outcome_from(result: crux_http::Result<crux_http::Response<Vec<u8>>>) -> ServiceOutcome {
    match result {
        Ok(mut response) => ServiceOutcome::Response {
            status: u16::from(response.status()),
            body: response.take_body().unwrap_or_default(),
        },
        Err(e) => ServiceOutcome::TransportFailure {
            message: e.to_string(),
        },
    }
}

/// Turn a service outcome into the string shown to the user. Total: every
/// transport failure, bad status, unparseable body, safety refusal, or empty
/// answer becomes a fixed in-persona line. One attempt per invocation; no
/// retries, no timeout.
#[must_use]
pub fn digest(outcome: ServiceOutcome) -> String {
    match outcome {
        ServiceOutcome::TransportFailure { message } => {
            warn!("roast request failed in transit: {message}");
            failure_line(Some(&message))
        }
        ServiceOutcome::Response { status, body } => {
            if !(200..300).contains(&status) {
                warn!("roast service answered HTTP {status}");
                return failure_line(Some(&format!("the service answered HTTP {status}")));
            }

            let response: GenerateResponse = match serde_json::from_slice(&body) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("unreadable roast response: {e}");
                    return failure_line(None);
                }
            };

            let text = extract_text(&response);
            if !text.is_empty() {
                return text;
            }

            if is_safety_withheld(&response) {
                SAFETY_FALLBACK.to_string()
            } else {
                SPEECHLESS_FALLBACK.to_string()
            }
        }
    }
}

/// The in-persona failure line, with the underlying description when there is
/// one.
#[must_use]
pub fn failure_line(detail: Option<&str>) -> String {
    match detail {
        Some(detail) => format!(
            "I tried to roast you, but something else went up in flames instead: {detail}. \
             Give it another shot."
        ),
        None => "I tried to roast you, but my circuits fizzled out instead. \
                 Give it another shot."
            .to_string(),
    }
}

fn extract_text(response: &GenerateResponse) -> String {
    response
        .candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref())
        .flat_map(|content| content.parts.iter())
        .filter_map(|part| part.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn is_safety_withheld(response: &GenerateResponse) -> bool {
    let candidate_blocked = response
        .candidates
        .iter()
        .any(|candidate| candidate.finish_reason.as_deref() == Some(SAFETY_FINISH_REASON));

    let prompt_blocked = response
        .prompt_feedback
        .as_ref()
        .is_some_and(|feedback| feedback.block_reason.is_some());

    candidate_blocked || prompt_blocked
}
