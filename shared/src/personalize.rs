//! Rewriting stored answers into a conversational reply.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime};
use tracing::{error, info, warn};

use crate::backend::Backend;
use crate::dispatcher::AnswerContext;
use crate::models::PersonalizeRequest;
use crate::Error;

/// Substrings the provider leaves in an otherwise successful reply.
const PROVIDER_ERROR_MARKERS: [&str; 3] = ["ERROR:", "Failed to call Gemini API", "NOT_FOUND"];

const DEFAULT_MODEL: &str = "Gemini AI";

pub const PROVIDER_ERROR_NOTE: &str = "I apologize, but I couldn't personalize my answer at this time. Our AI personalization service is temporarily unavailable.";

pub const UNAVAILABLE_NOTE: &str = "Note: Personalization service is currently unavailable.";

pub fn failed_note(error: &str) -> String {
    format!("Error personalizing answer: {}", error)
}

pub fn is_provider_error(text: &str) -> bool {
    PROVIDER_ERROR_MARKERS.iter().any(|m| text.contains(m))
}

/// Result of one personalization attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PersonalizationOutcome {
    Personalized {
        text: String,
        model: Option<String>,
        generated_at: Option<String>,
    },
    ProviderError(String),
    /// Non-2xx or empty reply
    Unavailable,
    /// The request failed or the reply could not be read
    Failed(String),
    Skipped,
}

/// "Personalized by {model} • Generated at: {time}".
pub fn metadata_text(model: Option<&str>, generated_at: Option<&str>) -> String {
    let model = model.filter(|m| !m.is_empty()).unwrap_or(DEFAULT_MODEL);
    let mut parts = vec![format!("Personalized by {}", model)];
    if let Some(at) = generated_at.filter(|s| !s.is_empty()) {
        parts.push(format!("Generated at: {}", display_time(at)));
    }
    parts.join(" • ")
}

fn display_time(raw: &str) -> String {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return at.with_timezone(&Local).format("%H:%M:%S").to_string();
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn context_for(question: &str) -> String {
    format!(
        "The user is asking a question. Your task is to personalize the provided answer to sound more conversational and helpful. Make the answer more engaging and tailored to the specific question: \"{}\".",
        question
    )
}

/// Sends answers through the rewriting endpoint.
#[derive(Clone)]
pub struct Personalizer {
    backend: Arc<dyn Backend>,
}

impl Personalizer {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Build the rewrite request, or `None` when there is nothing to rewrite.
    pub fn build_request(
        question: &str,
        answer: &AnswerContext,
        business_id: Option<&str>,
    ) -> Option<PersonalizeRequest> {
        if question.trim().is_empty() || answer.answer_text.trim().is_empty() {
            return None;
        }

        let similar = answer.question_text.clone().unwrap_or_default();
        let similar_question_from_db = match answer.question_title.as_deref() {
            Some(title) if !title.is_empty() => format!("{}: {}", title, similar),
            _ => similar,
        };

        Some(PersonalizeRequest {
            asked_question: question.to_string(),
            similar_question_from_db,
            answer_from_db: answer.answer_text.clone(),
            context: context_for(question),
            question_id: answer.question_id,
            business_id: business_id.and_then(|id| id.trim().parse().ok()),
        })
    }

    pub async fn personalize(
        &self,
        question: &str,
        answer: &AnswerContext,
        business_id: Option<&str>,
    ) -> PersonalizationOutcome {
        let Some(request) = Self::build_request(question, answer, business_id) else {
            warn!("Skipping personalization: question or answer text missing");
            return PersonalizationOutcome::Skipped;
        };

        info!(
            "Personalizing answer for question {:?}",
            request.question_id
        );
        let reply = match self.backend.personalize(&request).await {
            Ok(reply) => reply,
            Err(e @ Error::Http { .. }) => {
                error!("Personalization unavailable: {}", e);
                return PersonalizationOutcome::Unavailable;
            }
            Err(e) => {
                error!("Personalization request failed: {}", e);
                return PersonalizationOutcome::Failed(e.to_string());
            }
        };

        let text = reply
            .personalized_answer
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();
        if text.is_empty() {
            warn!("Received empty personalized answer");
            return PersonalizationOutcome::Unavailable;
        }
        if is_provider_error(text) {
            error!("Provider returned an error instead of an answer: {}", text);
            return PersonalizationOutcome::ProviderError(text.to_string());
        }

        PersonalizationOutcome::Personalized {
            text: text.to_string(),
            model: reply.model,
            generated_at: reply.generated_at,
        }
    }
}
