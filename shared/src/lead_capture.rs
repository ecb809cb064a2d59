//! Contact collection for questions the knowledge base cannot answer yet.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::models::PendingLeadCapture;

/// Posted when a question has no stored answer.
pub const NO_ANSWER_MESSAGE: &str = "I don't have an answer to this question in our database yet. If you'd like to receive an answer when it's available, please provide your name and email address.";

pub const CLARIFY_MESSAGE: &str = "I couldn't identify your email address. Please provide your name and email in the format: 'My name is [name] and my email is [email@example.com]'";

pub const SUBMIT_FAILED_MESSAGE: &str =
    "I'm sorry, there was an error processing your contact information. Please try again later.";

const DEFAULT_NAME: &str = "User";

const EMAIL_PHRASES: [&str; 6] = [
    "and my email is",
    "and my email",
    "email is",
    "email:",
    "and email is",
    "and email:",
];

const NAME_INTROS: [&str; 4] = ["my name is ", "i am ", "i'm ", "name: "];

pub fn thank_you_message(name: &str, email: &str) -> String {
    format!(
        "Thank you, {}. We've received your contact information and will send the answer to {} when it's available.",
        name, email
    )
}

/// Contact details pulled out of a free-form message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub name: String,
    pub email: String,
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b").expect("valid email regex")
    })
}

fn name_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        const CUT: &str = r"(?:\s+and\s+my\s+email\s+is|\s+email\s+is|\s+and\s+email:|\s*,)";
        [
            format!(r"(?i)my name is ([A-Za-z\s]+?){}", CUT),
            r"(?i)my name is ([A-Za-z\s]+)".to_string(),
            format!(r"(?i)i am ([A-Za-z\s]+?){}", CUT),
            r"(?i)i am ([A-Za-z\s]+)".to_string(),
            format!(r"(?i)i'm ([A-Za-z\s]+?){}", CUT),
            r"(?i)i'm ([A-Za-z\s]+)".to_string(),
            format!(r"(?i)name:?\s*([A-Za-z\s]+?){}", CUT),
            r"(?i)name:?\s*([A-Za-z\s]+)".to_string(),
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid name pattern"))
        .collect()
    })
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn name_from_patterns(text: &str) -> Option<String> {
    name_patterns().iter().find_map(|pattern| {
        let captured = pattern.captures(text)?.get(1)?.as_str();
        debug!("Name matched with pattern {}", pattern.as_str());
        Some(captured.trim().to_string())
    })
}

/// Text before the first email phrase, narrowed by a name intro if present.
fn name_before_email_phrase(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    let phrase = EMAIL_PHRASES.iter().find(|p| lowered.contains(*p))?;
    let before = lowered.split(phrase).next().unwrap_or_default().trim().to_string();

    NAME_INTROS
        .iter()
        .find(|intro| before.contains(*intro))
        .and_then(|intro| before.split(intro).nth(1).and_then(non_empty))
        .or_else(|| non_empty(&before))
}

fn first_word(text: &str) -> Option<String> {
    let first_part = text
        .split([',', ';', ':', '\n', '\r'])
        .map(str::trim)
        .find(|part| !part.is_empty())?;
    first_part.split_whitespace().next().map(str::to_string)
}

/// Best-effort extraction of a name and email from free text.
///
/// Returns `None` when no email is present. The name falls back through
/// intro patterns, text before an email phrase, and the first word, then
/// defaults to "User". Misreads are expected and are not errors.
pub fn parse_user_info(input: &str) -> Option<UserInfo> {
    let email = email_regex().find(input)?.as_str().to_string();
    let rest = input.replacen(&email, "", 1);
    let rest = rest.trim();

    let mut name = name_from_patterns(rest).filter(|n| !n.is_empty());
    if name.is_none() && !rest.is_empty() {
        name = name_before_email_phrase(rest).or_else(|| first_word(rest));
    }
    let name = name.unwrap_or_else(|| DEFAULT_NAME.to_string());

    debug!("Extracted contact info: name {:?}, email {:?}", name, email);
    Some(UserInfo { name, email })
}

/// Whether user messages are being intercepted for contact details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LeadCapture {
    #[default]
    Idle,
    AwaitingContact(PendingLeadCapture),
}

impl LeadCapture {
    pub fn is_awaiting(&self) -> bool {
        matches!(self, LeadCapture::AwaitingContact(_))
    }

    pub fn pending(&self) -> Option<&PendingLeadCapture> {
        match self {
            LeadCapture::AwaitingContact(pending) => Some(pending),
            LeadCapture::Idle => None,
        }
    }

    /// Start waiting for contact details for `original_question`.
    pub fn begin(&mut self, question_id: Option<i64>, original_question: &str) {
        info!("Collecting contact details for question {:?}", question_id);
        *self = LeadCapture::AwaitingContact(PendingLeadCapture {
            question_id,
            original_question: original_question.to_string(),
        });
    }

    /// Contact details were accepted; stop intercepting.
    pub fn complete(&mut self) -> Option<PendingLeadCapture> {
        match std::mem::take(self) {
            LeadCapture::AwaitingContact(pending) => Some(pending),
            LeadCapture::Idle => None,
        }
    }
}
