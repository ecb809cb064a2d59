//! The support backend as seen by the widget.

use async_trait::async_trait;

use crate::models::{
    AiPersonality, BusinessLookup, ConversationUpdate, CreateConversationRequest,
    CreateConversationResponse, HandoffState, PersonalizeRequest, PersonalizedAnswer,
    QuestionResponse, SubmitQuestionRequest, UserDetailsRequest, UserDetailsResponse,
    WidgetConfig,
};
use crate::Result;

/// One method per backend endpoint the widget consumes.
///
/// Implementations attach credentials themselves; callers only pass payloads.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST /api/conversations/create`
    async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<CreateConversationResponse>;

    /// `PUT /api/conversations/{id}`
    async fn update_conversation(
        &self,
        conversation_id: &str,
        update: &ConversationUpdate,
    ) -> Result<()>;

    /// `POST /api/handoff-states`
    async fn create_handoff_state(&self, state: &HandoffState) -> Result<()>;

    /// `POST /api/widget/submitQuestion`. A JSON `null` body yields `None`.
    async fn submit_question(
        &self,
        request: &SubmitQuestionRequest,
    ) -> Result<Option<QuestionResponse>>;

    /// `POST /api/ai-answers/personalize`
    async fn personalize(&self, request: &PersonalizeRequest) -> Result<PersonalizedAnswer>;

    /// `POST /api/user-details/request`
    async fn request_user_details(
        &self,
        request: &UserDetailsRequest,
    ) -> Result<UserDetailsResponse>;

    /// `POST /api/user-details/update/{userId}?name=&email=`
    async fn update_user_details(&self, user_id: &str, name: &str, email: &str) -> Result<()>;

    /// `GET /api/widget-configurations/business/{id}`
    async fn widget_configuration(&self, business_id: &str) -> Result<WidgetConfig>;

    /// `GET /api/ai-personalities/business/{id}`
    async fn ai_personality(&self, business_id: &str) -> Result<AiPersonality>;

    /// `GET /api/admin/api-keys/business-id/{apiKey}`
    async fn lookup_business(&self) -> Result<BusinessLookup>;
}
