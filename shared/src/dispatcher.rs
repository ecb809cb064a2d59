//! Classification of question-endpoint replies and the canned texts shown
//! for each outcome.

use rand::seq::SliceRandom;

use crate::models::QuestionResponse;
use crate::Error;

/// Title sent with every widget question.
pub const QUESTION_TITLE: &str = "User Question";

pub const EMPTY_RESPONSE_MESSAGE: &str =
    "I received an empty response from our knowledge base. Please try a different question.";

pub const SERVER_ERROR_MESSAGE: &str = "I'm sorry, but our server encountered an internal error while processing your question. Our team has been notified of this issue.";

pub const SERVER_ERROR_NOTE: &str = "Technical error: 500 Internal Server Error occurred while processing the question. This may indicate an issue with question processing, database connectivity, or the AI component.";

pub const SEND_FAILED_MESSAGE: &str = "Failed to send message. Ensure the backend is running.";

pub const DEMO_MODE_NOTE: &str =
    "DEMO MODE: The backend server is currently unreachable. Limited functionality available.";

pub const DEMO_RESPONSES: [&str; 5] = [
    "I'm sorry, but I'm currently running in demo mode because the server is unreachable. Limited functionality is available.",
    "This is a sample response. In normal operation, you would receive a real answer from the backend.",
    "In demo mode, I can acknowledge your question but cannot provide a specific answer without connecting to the server.",
    "Your question has been received. When the server is back online, you'll be able to get actual responses.",
    "The system is operating in offline mode. Please check your server connection and try again later.",
];

fn question_ref(question_id: Option<i64>) -> String {
    question_id.map_or_else(|| "unknown".to_string(), |id| id.to_string())
}

pub fn needs_human_message(question_id: Option<i64>) -> String {
    format!(
        "Your question requires human expertise. It has been forwarded to our team (Question ID: {}).",
        question_ref(question_id)
    )
}

pub fn processing_message(question_id: Option<i64>) -> String {
    format!(
        "Thank you for your question. We're processing your inquiry (Question ID: {}).",
        question_ref(question_id)
    )
}

/// " (Similarity: 87.5%)" for a non-zero score, empty otherwise.
pub fn similarity_suffix(score: Option<f64>) -> String {
    match score {
        Some(s) if s != 0.0 && !s.is_nan() => format!(" (Similarity: {:.1}%)", s * 100.0),
        _ => String::new(),
    }
}

pub fn random_demo_response() -> &'static str {
    DEMO_RESPONSES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(DEMO_RESPONSES[0])
}

/// A stored answer and what is known about the question it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerContext {
    pub answer_text: String,
    pub answer_id: Option<i64>,
    pub question_id: Option<i64>,
    pub question_title: Option<String>,
    pub question_text: Option<String>,
    pub similarity_score: Option<f64>,
}

/// What the widget does next with a question reply.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionOutcome {
    DirectAnswer(AnswerContext),
    NeedsHuman { question_id: Option<i64> },
    /// Nothing stored and nothing similar; collect contact details.
    NoAnswer { question_id: Option<i64> },
    Processing { question_id: Option<i64> },
    Empty,
}

fn non_empty(text: Option<&String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty()).cloned()
}

fn direct_answer(response: &QuestionResponse) -> Option<(String, Option<i64>)> {
    if let Some(text) = response.answer.as_ref().and_then(|a| non_empty(a.answer_text.as_ref())) {
        return Some((text, response.answer.as_ref().and_then(|a| a.answer_id)));
    }
    let first = response.answers.as_ref().and_then(|answers| answers.first());
    if let Some(text) = first.and_then(|a| non_empty(a.answer_text.as_ref())) {
        return Some((text, first.and_then(|a| a.answer_id)));
    }
    response
        .personalization_verification
        .as_ref()
        .and_then(|v| non_empty(v.sample_answer_preview.as_ref()))
        .map(|text| (text, None))
}

/// Map a reply onto exactly one outcome.
pub fn classify(response: Option<QuestionResponse>) -> QuestionOutcome {
    let Some(response) = response else {
        return QuestionOutcome::Empty;
    };
    let question_id = response.question_id;

    if let Some((answer_text, answer_id)) = direct_answer(&response) {
        return QuestionOutcome::DirectAnswer(AnswerContext {
            answer_text,
            answer_id: answer_id.or(question_id),
            question_id,
            question_title: response.question_title,
            question_text: response.question_text,
            similarity_score: response.similarity_score,
        });
    }

    if response.needs_human_answer.unwrap_or(false) {
        return QuestionOutcome::NeedsHuman { question_id };
    }

    match response.similarity_score {
        None => QuestionOutcome::NoAnswer { question_id },
        Some(score) if score == 0.0 => QuestionOutcome::NoAnswer { question_id },
        Some(_) => QuestionOutcome::Processing { question_id },
    }
}

/// How a failed question request is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Backend unreachable; answer with a demo message
    Offline,
    ServerError,
    Other,
}

impl From<&Error> for FailureKind {
    fn from(error: &Error) -> Self {
        if error.is_connectivity() {
            FailureKind::Offline
        } else if error.is_server_error() {
            FailureKind::ServerError
        } else {
            FailureKind::Other
        }
    }
}
