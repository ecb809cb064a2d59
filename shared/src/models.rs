//! Shared data models.
//!
//! Client-side state (messages, sessions, pending lead capture) plus the DTOs
//! exchanged with the support backend. Wire names are camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who a chat message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
    System,
    Loading,
}

/// Progress label shown on the loading placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingStage {
    Thinking,
    Processing,
    Analyzing,
    Personalizing,
}

/// One entry in the rendered message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub sender: Sender,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<LoadingStage>,
    #[serde(default)]
    pub is_personalized: bool,
    #[serde(default)]
    pub is_no_answer: bool,
    #[serde(default)]
    pub is_metadata: bool,
}

impl ChatMessage {
    fn with_text(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: None,
            sender,
            text: Some(text.into()),
            stage: None,
            is_personalized: false,
            is_no_answer: false,
            is_metadata: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_text(Sender::User, text)
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self::with_text(Sender::Ai, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with_text(Sender::System, text)
    }

    pub fn personalized(text: impl Into<String>) -> Self {
        Self {
            is_personalized: true,
            ..Self::ai(text)
        }
    }

    pub fn no_answer(text: impl Into<String>) -> Self {
        Self {
            is_no_answer: true,
            ..Self::ai(text)
        }
    }

    pub fn metadata(text: impl Into<String>) -> Self {
        Self {
            is_metadata: true,
            ..Self::system(text)
        }
    }

    pub fn loading(id: u64) -> Self {
        Self {
            id: Some(id),
            sender: Sender::Loading,
            text: None,
            stage: Some(LoadingStage::Thinking),
            is_personalized: false,
            is_no_answer: false,
            is_metadata: false,
        }
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

/// Kind of turn recorded against a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnType {
    User,
    Ai,
    PersonalizedAi,
    SystemError,
}

impl TurnType {
    /// The backend has no system-error turn; those are recorded as AI turns.
    pub fn wire_type(self) -> TurnType {
        match self {
            TurnType::SystemError => TurnType::Ai,
            other => other,
        }
    }
}

/// A backend-tracked conversation as seen by this widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSession {
    pub conversation_id: String,
    pub user_id: String,
    pub business_id: String,
    /// Synthesized locally after creation kept failing
    pub created_locally: bool,
    pub ended: bool,
}

/// Question waiting on the user's contact details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLeadCapture {
    pub question_id: Option<i64>,
    pub original_question: String,
}

/// Display configuration for the widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetConfig {
    pub header_text: String,
    pub welcome_message: String,
    pub primary_color: String,
    pub secondary_color: String,
    pub text_color: String,
    pub font_family: String,
    pub widget_position: String,
    pub launcher_icon: String,
    pub widget_shape: String,
    pub show_welcome_message: bool,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            header_text: "AI Chat".to_string(),
            welcome_message: "Welcome to our chat!".to_string(),
            primary_color: "#007bff".to_string(),
            secondary_color: "#f0f0f0".to_string(),
            text_color: "#000000".to_string(),
            font_family: "Arial, sans-serif".to_string(),
            widget_position: "bottom-right".to_string(),
            launcher_icon: "Chat".to_string(),
            widget_shape: "rounded".to_string(),
            show_welcome_message: true,
        }
    }
}

/// Greeting and personality text configured per business.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPersonality {
    #[serde(default)]
    pub greeting_message: Option<String>,
    #[serde(default)]
    pub ai_name: Option<String>,
}

/// Body of `POST /api/conversations/create`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub business_id: String,
    pub user_id: String,
}

/// Response of `POST /api/conversations/create`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationResponse {
    #[serde(alias = "conversation_id")]
    pub conversation_id: Option<String>,
    #[serde(alias = "business_id")]
    pub business_id: Option<serde_json::Value>,
    pub user_id: Option<String>,
    pub start_time: Option<String>,
}

/// A single turn appended to a conversation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub message: String,
    pub message_type: TurnType,
    pub question_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

/// Body of `PUT /api/conversations/{id}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_message: Option<NewMessage>,
    pub end_conversation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculate_satisfaction_score: Option<bool>,
}

impl ConversationUpdate {
    pub fn turn(text: &str, turn: TurnType, question_id: Option<i64>) -> Self {
        Self {
            new_message: Some(NewMessage {
                message: text.to_string(),
                message_type: turn.wire_type(),
                question_id,
                timestamp: Utc::now(),
            }),
            end_conversation: false,
            calculate_satisfaction_score: None,
        }
    }

    pub fn end() -> Self {
        Self {
            new_message: None,
            end_conversation: true,
            calculate_satisfaction_score: Some(true),
        }
    }
}

/// Auxiliary per-conversation state initialized after creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffState {
    pub conversation_id: String,
    pub user_id: Option<String>,
    pub has_name: bool,
    pub has_email: bool,
    pub has_question_summary: bool,
    pub is_confirmed: bool,
    pub is_ticket_created: bool,
    pub current_step: u32,
}

impl HandoffState {
    pub fn initial(conversation_id: &str, user_id: Option<String>) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            user_id,
            has_name: false,
            has_email: false,
            has_question_summary: false,
            is_confirmed: false,
            is_ticket_created: false,
            current_step: 0,
        }
    }
}

/// Body of `POST /api/widget/submitQuestion`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuestionRequest {
    pub question_title: String,
    pub question_text: String,
    pub business_id: String,
    pub user_id: String,
    pub conversation_id: String,
}

/// An answer record returned by the question endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub answer_id: Option<i64>,
    pub answer_text: Option<String>,
}

/// Diagnostic block the question endpoint may attach.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizationVerification {
    pub sample_answer_preview: Option<String>,
}

/// Response of `POST /api/widget/submitQuestion`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuestionResponse {
    pub question_id: Option<i64>,
    pub question_title: Option<String>,
    pub question_text: Option<String>,
    pub answer: Option<AnswerRecord>,
    pub answers: Option<Vec<AnswerRecord>>,
    pub personalization_verification: Option<PersonalizationVerification>,
    pub needs_human_answer: Option<bool>,
    pub similarity_score: Option<f64>,
}

/// Body of `POST /api/ai-answers/personalize`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizeRequest {
    pub asked_question: String,
    #[serde(rename = "similarQuestionFromDB")]
    pub similar_question_from_db: String,
    #[serde(rename = "answerFromDB")]
    pub answer_from_db: String,
    pub context: String,
    pub question_id: Option<i64>,
    pub business_id: Option<i64>,
}

/// Response of `POST /api/ai-answers/personalize`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalizedAnswer {
    pub personalized_answer: Option<String>,
    pub model: Option<String>,
    pub generated_at: Option<String>,
}

/// Body of `POST /api/user-details/request`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetailsRequest {
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub original_question: String,
}

/// Response of `POST /api/user-details/request`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserDetailsResponse {
    pub answer: Option<String>,
    pub question_id: Option<i64>,
}

/// Response of the API-key to business-id lookup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessLookup {
    pub status: Option<String>,
    pub business_id: Option<serde_json::Value>,
    pub message: Option<String>,
}

impl BusinessLookup {
    /// Business id as a string, whether the backend sent a number or a string.
    pub fn business_id(&self) -> Option<String> {
        match self.business_id.as_ref()? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
