//! Scripted backend doubles for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::backend::Backend;
use crate::flush::FinalFlush;
use crate::models::{
    AiPersonality, BusinessLookup, ConversationUpdate, CreateConversationRequest,
    CreateConversationResponse, HandoffState, PersonalizeRequest, PersonalizedAnswer,
    QuestionResponse, SubmitQuestionRequest, TurnType, UserDetailsRequest, UserDetailsResponse,
    WidgetConfig,
};
use crate::{Error, Result};

/// A request the fake received.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    CreateConversation { user_id: String },
    Turn(RecordedTurn),
    EndConversation { conversation_id: String },
    HandoffState { conversation_id: String },
    SubmitQuestion { question: String, conversation_id: String },
    Personalize(PersonalizeRequest),
    RequestUserDetails { original_question: String },
    UpdateUserDetails { user_id: String, name: String, email: String },
    WidgetConfiguration,
    AiPersonality,
    LookupBusiness,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedTurn {
    pub conversation_id: String,
    pub text: String,
    pub turn: TurnType,
    pub question_id: Option<i64>,
}

#[derive(Default)]
struct Script {
    create: VecDeque<Result<CreateConversationResponse>>,
    end: VecDeque<Result<()>>,
    submit: VecDeque<Result<Option<QuestionResponse>>>,
    personalize: VecDeque<Result<PersonalizedAnswer>>,
    user_details: VecDeque<Result<UserDetailsResponse>>,
    update_user: VecDeque<Result<()>>,
    widget_config: VecDeque<Result<WidgetConfig>>,
    personality: VecDeque<Result<AiPersonality>>,
    lookup: VecDeque<Result<BusinessLookup>>,
}

fn unscripted<T>(what: &str) -> Result<T> {
    Err(Error::Connectivity(format!("no scripted {} response", what)))
}

/// Backend that replays queued results and records every call.
///
/// Turn tracking, handoff state, and user-detail updates succeed unless
/// scripted otherwise; everything else fails with a connectivity error once
/// its queue is empty.
#[derive(Default)]
pub(crate) struct FakeBackend {
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
    submit_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(conversation_id: &str) -> CreateConversationResponse {
        CreateConversationResponse {
            conversation_id: Some(conversation_id.to_string()),
            ..Default::default()
        }
    }

    pub fn duplicate_user() -> Error {
        Error::Http {
            status: 500,
            body: "ERROR: duplicate key value violates unique constraint: Key (user_id)=(abc) already exists".to_string(),
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn turns(&self) -> Vec<RecordedTurn> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Turn(turn) => Some(turn),
                _ => None,
            })
            .collect()
    }

    /// Hold every question submission until the returned gate is notified.
    pub fn hold_submit(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.submit_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn push_create(&self, result: Result<CreateConversationResponse>) {
        self.script().create.push_back(result);
    }

    pub fn push_end(&self, result: Result<()>) {
        self.script().end.push_back(result);
    }

    pub fn push_submit(&self, result: Result<Option<QuestionResponse>>) {
        self.script().submit.push_back(result);
    }

    pub fn push_personalize(&self, result: Result<PersonalizedAnswer>) {
        self.script().personalize.push_back(result);
    }

    pub fn push_user_details(&self, result: Result<UserDetailsResponse>) {
        self.script().user_details.push_back(result);
    }

    pub fn push_update_user(&self, result: Result<()>) {
        self.script().update_user.push_back(result);
    }

    pub fn push_widget_config(&self, result: Result<WidgetConfig>) {
        self.script().widget_config.push_back(result);
    }

    pub fn push_personality(&self, result: Result<AiPersonality>) {
        self.script().personality.push_back(result);
    }

    pub fn push_lookup(&self, result: Result<BusinessLookup>) {
        self.script().lookup.push_back(result);
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<CreateConversationResponse> {
        self.record(Call::CreateConversation {
            user_id: request.user_id.clone(),
        });
        self.script()
            .create
            .pop_front()
            .unwrap_or_else(|| unscripted("create"))
    }

    async fn update_conversation(
        &self,
        conversation_id: &str,
        update: &ConversationUpdate,
    ) -> Result<()> {
        if update.end_conversation {
            self.record(Call::EndConversation {
                conversation_id: conversation_id.to_string(),
            });
            return self.script().end.pop_front().unwrap_or(Ok(()));
        }
        if let Some(message) = &update.new_message {
            self.record(Call::Turn(RecordedTurn {
                conversation_id: conversation_id.to_string(),
                text: message.message.clone(),
                turn: message.message_type,
                question_id: message.question_id,
            }));
        }
        Ok(())
    }

    async fn create_handoff_state(&self, state: &HandoffState) -> Result<()> {
        self.record(Call::HandoffState {
            conversation_id: state.conversation_id.clone(),
        });
        Ok(())
    }

    async fn submit_question(
        &self,
        request: &SubmitQuestionRequest,
    ) -> Result<Option<QuestionResponse>> {
        self.record(Call::SubmitQuestion {
            question: request.question_text.clone(),
            conversation_id: request.conversation_id.clone(),
        });
        let gate = self.submit_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.script()
            .submit
            .pop_front()
            .unwrap_or_else(|| unscripted("submit"))
    }

    async fn personalize(&self, request: &PersonalizeRequest) -> Result<PersonalizedAnswer> {
        self.record(Call::Personalize(request.clone()));
        self.script()
            .personalize
            .pop_front()
            .unwrap_or_else(|| unscripted("personalize"))
    }

    async fn request_user_details(
        &self,
        request: &UserDetailsRequest,
    ) -> Result<UserDetailsResponse> {
        self.record(Call::RequestUserDetails {
            original_question: request.original_question.clone(),
        });
        self.script()
            .user_details
            .pop_front()
            .unwrap_or_else(|| Ok(UserDetailsResponse::default()))
    }

    async fn update_user_details(&self, user_id: &str, name: &str, email: &str) -> Result<()> {
        self.record(Call::UpdateUserDetails {
            user_id: user_id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
        });
        self.script().update_user.pop_front().unwrap_or(Ok(()))
    }

    async fn widget_configuration(&self, _business_id: &str) -> Result<WidgetConfig> {
        self.record(Call::WidgetConfiguration);
        self.script()
            .widget_config
            .pop_front()
            .unwrap_or_else(|| unscripted("widget configuration"))
    }

    async fn ai_personality(&self, _business_id: &str) -> Result<AiPersonality> {
        self.record(Call::AiPersonality);
        self.script()
            .personality
            .pop_front()
            .unwrap_or_else(|| unscripted("personality"))
    }

    async fn lookup_business(&self) -> Result<BusinessLookup> {
        self.record(Call::LookupBusiness);
        self.script()
            .lookup
            .pop_front()
            .unwrap_or_else(|| unscripted("lookup"))
    }
}

/// Records unload flushes and answers with a fixed result.
pub(crate) struct FakeFlush {
    acknowledge: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeFlush {
    pub fn succeeding() -> Self {
        Self {
            acknowledge: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            acknowledge: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl FinalFlush for FakeFlush {
    fn end_conversation(&self, conversation_id: &str) -> bool {
        self.calls.lock().unwrap().push(conversation_id.to_string());
        self.acknowledge
    }
}
