//! The chat widget: one conversation client driving the message list.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::config::Timings;
use crate::dispatcher::{
    classify, needs_human_message, processing_message, random_demo_response, similarity_suffix,
    AnswerContext, FailureKind, QuestionOutcome, DEMO_MODE_NOTE, EMPTY_RESPONSE_MESSAGE,
    QUESTION_TITLE, SEND_FAILED_MESSAGE, SERVER_ERROR_MESSAGE, SERVER_ERROR_NOTE,
};
use crate::display::WidgetDisplay;
use crate::flush::FinalFlush;
use crate::lead_capture::{
    parse_user_info, thank_you_message, LeadCapture, CLARIFY_MESSAGE, NO_ANSWER_MESSAGE,
    SUBMIT_FAILED_MESSAGE,
};
use crate::models::{
    BusinessLookup, ChatMessage, LoadingStage, PersonalizedAnswer, QuestionResponse,
    SubmitQuestionRequest, TurnType, UserDetailsRequest,
};
use crate::personalize::{
    failed_note, metadata_text, PersonalizationOutcome, Personalizer, PROVIDER_ERROR_NOTE,
    UNAVAILABLE_NOTE,
};
use crate::retry::RetryPolicy;
use crate::session::SessionManager;
use crate::store::CookieStore;
use crate::transcript::{LoadingGuard, Transcript};
use crate::{Error, Result};

pub const DEMO_CONNECT_MESSAGE: &str =
    "Server connection failed. Using demo mode with limited functionality.";

fn lookup_failure_reason(status: Option<u16>, lookup: Option<&BusinessLookup>) -> String {
    if let Some(message) = lookup.and_then(|l| l.message.clone()).filter(|m| !m.is_empty()) {
        return message;
    }
    match status {
        Some(400) => "Invalid API key format",
        Some(403) => "API key is inactive or unauthorized",
        Some(404) => "API key not found",
        Some(500) => "Server error. Please try again later",
        _ => "Failed to verify API key",
    }
    .to_string()
}

/// A single embedded chat widget.
pub struct ChatWidget {
    backend: Arc<dyn Backend>,
    session: SessionManager,
    personalizer: Personalizer,
    transcript: Transcript,
    lead: LeadCapture,
    display: WidgetDisplay,
    timings: Timings,
    demo_business_id: Option<String>,
    personalized: Vec<PersonalizedAnswer>,
    visible: bool,
    loading: bool,
}

impl ChatWidget {
    pub fn new(
        backend: Arc<dyn Backend>,
        cookies: Arc<dyn CookieStore>,
        flush: Arc<dyn FinalFlush>,
        business_id: Option<String>,
    ) -> Self {
        let mut session = SessionManager::new(Arc::clone(&backend), cookies, flush);
        session.set_business_id(business_id);
        session.ensure_user_identity();

        Self {
            personalizer: Personalizer::new(Arc::clone(&backend)),
            backend,
            session,
            transcript: Transcript::new(),
            lead: LeadCapture::default(),
            display: WidgetDisplay::default(),
            timings: Timings::default(),
            demo_business_id: None,
            personalized: Vec::new(),
            visible: false,
            loading: false,
        }
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.session = self.session.with_retry_policy(retry);
        self
    }

    /// Business used when the backend cannot be reached to resolve the API key.
    pub fn with_demo_business_id(mut self, business_id: Option<String>) -> Self {
        self.demo_business_id = business_id;
        self
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.transcript.messages()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn display(&self) -> &WidgetDisplay {
        &self.display
    }

    pub fn lead_capture(&self) -> &LeadCapture {
        &self.lead
    }

    /// Personalized answers received in this widget's lifetime.
    pub fn personalized_answers(&self) -> &[PersonalizedAnswer] {
        &self.personalized
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Resolve the business behind the API key unless one is configured.
    ///
    /// Returns true once a business id is known.
    pub async fn connect(&mut self) -> bool {
        if self.session.business_id().is_some() {
            return true;
        }

        match self.backend.lookup_business().await {
            Ok(lookup) if lookup.status.as_deref() == Some("success") => {
                match lookup.business_id() {
                    Some(business_id) => {
                        info!("API key verified for business {}", business_id);
                        self.transcript.push(ChatMessage::system(format!(
                            "API Key verified successfully! Connected to business ID: {}",
                            business_id
                        )));
                        self.session.set_business_id(Some(business_id));
                        true
                    }
                    None => self.connect_failed(&lookup_failure_reason(None, None)),
                }
            }
            Ok(lookup) => self.connect_failed(&lookup_failure_reason(None, Some(&lookup))),
            Err(Error::Http { status, body }) => {
                let lookup = serde_json::from_str::<BusinessLookup>(&body).ok();
                self.connect_failed(&lookup_failure_reason(Some(status), lookup.as_ref()))
            }
            Err(e) if e.is_connectivity() => match self.demo_business_id.clone() {
                Some(demo) => {
                    warn!("Backend unreachable; using demo business {}", demo);
                    self.transcript.push(ChatMessage::system(DEMO_CONNECT_MESSAGE));
                    self.session.set_business_id(Some(demo));
                    true
                }
                None => self.connect_errored(&e),
            },
            Err(e) => self.connect_errored(&e),
        }
    }

    fn connect_failed(&mut self, reason: &str) -> bool {
        error!("API key verification failed: {}", reason);
        self.transcript.push(ChatMessage::system(format!(
            "API Key verification failed: {}",
            reason
        )));
        false
    }

    fn connect_errored(&mut self, e: &Error) -> bool {
        error!("Error verifying API key: {}", e);
        self.transcript.push(ChatMessage::system(format!(
            "API Key verification error: {}",
            e
        )));
        false
    }

    /// Fetch display configuration for the connected business.
    pub async fn load_display(&mut self) {
        let Some(business_id) = self.session.business_id().map(str::to_string) else {
            debug!("No business id yet; keeping default display");
            return;
        };
        self.display = WidgetDisplay::load(self.backend.as_ref(), &business_id).await;
    }

    /// Open or close the widget. Closing ends an open conversation.
    pub async fn toggle(&mut self) -> bool {
        if self.visible && self.session.is_active() {
            info!("Ending conversation on widget close");
            self.session.end_conversation().await;
        }

        self.visible = !self.visible;
        if self.visible {
            self.session.restore_from_cookie();
        }
        self.visible
    }

    /// Handle one line of user input.
    pub async fn send(&mut self, input: &str) {
        let text = input.trim();
        if text.is_empty() || self.loading {
            return;
        }

        if self.lead.is_awaiting() {
            self.collect_contact(text).await;
            return;
        }

        self.loading = true;
        self.ask(text).await;
        self.loading = false;
    }

    async fn ask(&mut self, question: &str) {
        let conversation_id = self.session.ensure_conversation().await;
        if conversation_id.is_none() {
            warn!("Failed to create conversation - proceeding without tracking");
        }

        self.transcript.push(ChatMessage::user(question));
        self.session.track_message(question, TurnType::User, None);

        let loading = self.transcript.begin_loading(&self.timings);
        match self.submit(question, conversation_id).await {
            Ok(reply) => self.handle_reply(question, classify(reply), loading).await,
            Err(e) => {
                loading.resolve();
                error!("Error communicating with the backend: {}", e);
                self.handle_failure(&e).await;
            }
        }
    }

    async fn submit(
        &self,
        question: &str,
        conversation_id: Option<String>,
    ) -> Result<Option<QuestionResponse>> {
        let conversation_id = conversation_id.ok_or_else(|| {
            Error::Request(
                "Conversation ID is required. Please create a conversation first.".to_string(),
            )
        })?;
        let business_id = self
            .session
            .business_id()
            .ok_or(Error::MissingField("businessId"))?;
        let user_id = self.session.user_id().ok_or(Error::MissingField("userId"))?;

        let request = SubmitQuestionRequest {
            question_title: QUESTION_TITLE.to_string(),
            question_text: question.to_string(),
            business_id: business_id.to_string(),
            user_id: user_id.to_string(),
            conversation_id,
        };
        self.backend.submit_question(&request).await
    }

    async fn handle_reply(&mut self, question: &str, outcome: QuestionOutcome, loading: LoadingGuard) {
        debug!("Question outcome: {:?}", outcome);
        match outcome {
            QuestionOutcome::DirectAnswer(answer) => {
                self.session
                    .track_message(&answer.answer_text, TurnType::Ai, answer.question_id);
                loading.advance(LoadingStage::Personalizing);
                let personalization = self
                    .personalizer
                    .personalize(question, &answer, self.session.business_id())
                    .await;
                loading.resolve();
                self.show_answer(&answer, personalization).await;
            }
            QuestionOutcome::NeedsHuman { question_id } => {
                loading.resolve();
                self.reply(needs_human_message(question_id), question_id);
            }
            QuestionOutcome::NoAnswer { question_id } => {
                loading.resolve();
                self.start_lead_capture(question, question_id).await;
            }
            QuestionOutcome::Processing { question_id } => {
                loading.resolve();
                self.reply(processing_message(question_id), question_id);
            }
            QuestionOutcome::Empty => {
                loading.resolve();
                self.transcript.push(ChatMessage::ai(EMPTY_RESPONSE_MESSAGE));
            }
        }
    }

    fn reply(&self, text: String, question_id: Option<i64>) {
        self.session.track_message(&text, TurnType::Ai, question_id);
        self.transcript.push(ChatMessage::ai(text));
    }

    async fn show_answer(&mut self, answer: &AnswerContext, outcome: PersonalizationOutcome) {
        let raw = format!(
            "{}{}",
            answer.answer_text,
            similarity_suffix(answer.similarity_score)
        );

        match outcome {
            PersonalizationOutcome::Personalized {
                text,
                model,
                generated_at,
            } => {
                self.transcript.push(ChatMessage::personalized(text.clone()));
                self.session
                    .track_message(&text, TurnType::PersonalizedAi, answer.question_id);
                let metadata = metadata_text(model.as_deref(), generated_at.as_deref());
                self.personalized.push(PersonalizedAnswer {
                    personalized_answer: Some(text),
                    model,
                    generated_at,
                });

                tokio::time::sleep(self.timings.metadata_delay).await;
                self.transcript.push(ChatMessage::metadata(metadata));
            }
            PersonalizationOutcome::ProviderError(_) => {
                self.transcript.push(ChatMessage::ai(raw));
                self.transcript.push(ChatMessage::system(PROVIDER_ERROR_NOTE));
            }
            PersonalizationOutcome::Unavailable => {
                self.transcript.push(ChatMessage::ai(raw));
                self.transcript.push(ChatMessage::system(UNAVAILABLE_NOTE));
            }
            PersonalizationOutcome::Failed(reason) => {
                self.transcript.push(ChatMessage::ai(raw));
                self.transcript.push(ChatMessage::system(failed_note(&reason)));
            }
            PersonalizationOutcome::Skipped => {
                self.transcript.push(ChatMessage::ai(raw));
            }
        }
    }

    async fn start_lead_capture(&mut self, question: &str, question_id: Option<i64>) {
        info!("No answers found for question; collecting contact details");
        let message_id = self
            .transcript
            .push_tracked(ChatMessage::no_answer(NO_ANSWER_MESSAGE));
        self.session
            .track_message(NO_ANSWER_MESSAGE, TurnType::Ai, question_id);
        self.lead.begin(question_id, question);

        let Some(user_id) = self.session.user_id().map(str::to_string) else {
            return;
        };
        let request = UserDetailsRequest {
            user_id,
            conversation_id: self.session.conversation_id().map(str::to_string),
            original_question: question.to_string(),
        };
        match self.backend.request_user_details(&request).await {
            Ok(details) => {
                if let Some(answer) = details.answer.filter(|a| !a.trim().is_empty()) {
                    info!("Backend supplied an answer while requesting details");
                    self.transcript.replace_text(message_id, &answer);
                    self.session.track_message(
                        &answer,
                        TurnType::Ai,
                        details.question_id.or(question_id),
                    );
                }
            }
            Err(e) => warn!("Error requesting user details: {}", e),
        }
    }

    async fn collect_contact(&mut self, text: &str) {
        self.transcript.push(ChatMessage::user(text));
        self.session.track_message(text, TurnType::User, None);

        let Some(info) = parse_user_info(text) else {
            self.transcript.push(ChatMessage::ai(CLARIFY_MESSAGE));
            return;
        };

        let result = match self.session.user_id() {
            Some(user_id) => {
                self.backend
                    .update_user_details(user_id, &info.name, &info.email)
                    .await
            }
            None => Err(Error::MissingField("userId")),
        };

        match result {
            Ok(()) => {
                let confirmation = thank_you_message(&info.name, &info.email);
                let pending = self.lead.complete();
                self.reply(confirmation, pending.and_then(|p| p.question_id));
            }
            Err(e) => {
                error!("Error submitting user details: {}", e);
                self.transcript.push(ChatMessage::system(SUBMIT_FAILED_MESSAGE));
            }
        }
    }

    async fn handle_failure(&mut self, e: &Error) {
        match FailureKind::from(e) {
            FailureKind::Offline => {
                warn!("Server connection failed - using demo mode responses");
                let demo = random_demo_response();
                self.reply(demo.to_string(), None);
                tokio::time::sleep(self.timings.demo_note_delay).await;
                self.transcript.push(ChatMessage::system(DEMO_MODE_NOTE));
            }
            FailureKind::ServerError => {
                self.reply(SERVER_ERROR_MESSAGE.to_string(), None);
                self.transcript.push(ChatMessage::system(SERVER_ERROR_NOTE));
            }
            FailureKind::Other => {
                self.transcript.push(ChatMessage::system(SEND_FAILED_MESSAGE));
                self.session
                    .track_message(SEND_FAILED_MESSAGE, TurnType::SystemError, None);
            }
        }
    }

    /// The host is going away; end the conversation with the blocking flush.
    pub fn unload(&mut self) {
        self.session.end_conversation_on_unload();
    }

    /// The widget is being destroyed; end the conversation and drop late updates.
    pub async fn teardown(&mut self) {
        self.session.end_conversation().await;
        self.session.settle().await;
        self.transcript.detach();
    }

    /// End the conversation and forget all conversation state.
    pub async fn logout(&mut self) {
        if self.session.is_active() {
            info!("Ending conversation on logout");
            self.session.end_conversation().await;
        }
        self.transcript.clear();
        self.session.reset();
        self.lead = LeadCapture::default();
        self.personalized.clear();
    }

    /// Wait for background tracking requests.
    pub async fn settle(&self) {
        self.session.settle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerRecord, CreateConversationResponse, Sender, UserDetailsResponse};
    use crate::store::MemoryCookieStore;
    use crate::testing::{Call, FakeBackend, FakeFlush};

    struct Harness {
        backend: Arc<FakeBackend>,
        flush: Arc<FakeFlush>,
        widget: ChatWidget,
    }

    fn harness_with(business_id: Option<&str>) -> Harness {
        let backend = Arc::new(FakeBackend::new());
        let flush = Arc::new(FakeFlush::succeeding());
        let widget = ChatWidget::new(
            Arc::clone(&backend) as Arc<dyn Backend>,
            Arc::new(MemoryCookieStore::new()),
            Arc::clone(&flush) as Arc<dyn FinalFlush>,
            business_id.map(str::to_string),
        )
        .with_timings(Timings::without_stagger());
        Harness {
            backend,
            flush,
            widget,
        }
    }

    fn harness() -> Harness {
        let h = harness_with(Some("17"));
        h.backend.push_create(Ok(FakeBackend::created("conv-1")));
        h
    }

    fn answered(text: &str, similarity: Option<f64>) -> QuestionResponse {
        QuestionResponse {
            question_id: Some(7),
            question_title: Some("Shipping".into()),
            question_text: Some("How long is shipping?".into()),
            answer: Some(AnswerRecord {
                answer_id: Some(70),
                answer_text: Some(text.into()),
            }),
            similarity_score: similarity,
            ..Default::default()
        }
    }

    fn no_answer() -> QuestionResponse {
        QuestionResponse {
            question_id: Some(9),
            similarity_score: Some(0.0),
            ..Default::default()
        }
    }

    fn texts(widget: &ChatWidget, sender: Sender) -> Vec<String> {
        widget
            .messages()
            .iter()
            .filter(|m| m.sender == sender)
            .map(|m| m.text().to_string())
            .collect()
    }

    fn assert_no_placeholder(widget: &ChatWidget) {
        assert!(widget
            .messages()
            .iter()
            .all(|m| m.sender != Sender::Loading));
    }

    #[tokio::test]
    async fn test_session_created_before_first_question() {
        let mut h = harness();
        h.backend.push_submit(Ok(Some(QuestionResponse {
            question_id: Some(1),
            similarity_score: Some(0.3),
            ..Default::default()
        })));
        h.backend.push_submit(Ok(None));

        h.widget.send("Where is my order?").await;
        h.widget.send("Any update?").await;
        h.widget.settle().await;

        let calls = h.backend.calls();
        let create = calls
            .iter()
            .position(|c| matches!(c, Call::CreateConversation { .. }))
            .unwrap();
        let submit = calls
            .iter()
            .position(|c| matches!(c, Call::SubmitQuestion { .. }))
            .unwrap();
        assert!(create < submit);
        assert!(calls.iter().all(|c| match c {
            Call::SubmitQuestion { conversation_id, .. } => conversation_id == "conv-1",
            _ => true,
        }));

        let turns = h.backend.turns();
        assert!(!turns.is_empty());
        assert!(turns.iter().all(|t| t.conversation_id == "conv-1"));
        assert_eq!(
            calls
                .iter()
                .filter(|c| matches!(c, Call::CreateConversation { .. }))
                .count(),
            1
        );
        assert_eq!(
            texts(&h.widget, Sender::Ai).last().map(String::as_str),
            Some(EMPTY_RESPONSE_MESSAGE)
        );
        assert_no_placeholder(&h.widget);
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let mut h = harness();
        h.widget.send("   ").await;
        assert!(h.widget.messages().is_empty());
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_close_then_unload_ends_once() {
        let mut h = harness();
        h.backend.push_submit(Ok(Some(answered("Two days.", None))));

        assert!(h.widget.toggle().await);
        h.widget.send("shipping time?").await;
        assert!(!h.widget.toggle().await);
        h.widget.unload();
        h.widget.teardown().await;

        let ends = h
            .backend
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::EndConversation { .. }))
            .count();
        assert_eq!(ends, 1);
        assert!(h.flush.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unload_without_close_uses_flush() {
        let mut h = harness();
        h.backend.push_submit(Ok(None));
        h.widget.send("hello").await;
        h.widget.unload();
        h.widget.unload();
        h.widget.settle().await;

        assert_eq!(h.flush.calls(), vec!["conv-1".to_string()]);
    }

    #[tokio::test]
    async fn test_fallback_session_keeps_chat_working() {
        let mut h = harness_with(Some("17"));
        for _ in 0..3 {
            h.backend
                .push_create(Err(Error::Http { status: 503, body: "busy".into() }));
        }
        h.backend.push_submit(Ok(Some(no_answer())));

        h.widget.send("Do you ship abroad?").await;
        h.widget.send("my name is Al, al@x.io").await;
        h.widget.settle().await;

        let conversation_id = h.widget.session().conversation_id().unwrap().to_string();
        assert!(conversation_id.starts_with("fallback-"));
        assert!(h.backend.calls().iter().any(|c| matches!(
            c,
            Call::SubmitQuestion { conversation_id: id, .. } if *id == conversation_id
        )));
        assert!(h.backend.calls().iter().any(|c| matches!(
            c,
            Call::UpdateUserDetails { name, .. } if name == "Al"
        )));
    }

    #[tokio::test]
    async fn test_provider_error_shows_raw_answer() {
        let mut h = harness();
        h.backend
            .push_submit(Ok(Some(answered("X", Some(0.875)))));
        h.backend.push_personalize(Ok(PersonalizedAnswer {
            personalized_answer: Some("ERROR: NOT_FOUND".into()),
            ..Default::default()
        }));

        h.widget.send("question").await;
        h.widget.settle().await;

        assert_eq!(texts(&h.widget, Sender::Ai), vec!["X (Similarity: 87.5%)"]);
        assert_eq!(texts(&h.widget, Sender::System), vec![PROVIDER_ERROR_NOTE]);
        assert!(h
            .widget
            .messages()
            .iter()
            .all(|m| !m.text().contains("NOT_FOUND")));
        assert!(h.widget.personalized_answers().is_empty());
        assert_no_placeholder(&h.widget);
    }

    #[tokio::test]
    async fn test_personalized_answer_flow() {
        let mut h = harness();
        h.backend.push_submit(Ok(Some(answered("Two days.", Some(0.9)))));
        h.backend.push_personalize(Ok(PersonalizedAnswer {
            personalized_answer: Some("Good news, shipping takes just two days!".into()),
            model: Some("gemini-pro".into()),
            generated_at: None,
        }));

        h.widget.send("how long is shipping").await;
        h.widget.settle().await;

        let messages = h.widget.messages();
        let personalized = messages.iter().find(|m| m.is_personalized).unwrap();
        assert_eq!(personalized.text(), "Good news, shipping takes just two days!");
        let metadata = messages.last().unwrap();
        assert!(metadata.is_metadata);
        assert_eq!(metadata.text(), "Personalized by gemini-pro");
        assert_eq!(h.widget.personalized_answers().len(), 1);

        // Tracking runs in the background, so only membership is checked.
        let mut turns: Vec<String> = h
            .backend
            .turns()
            .iter()
            .map(|t| format!("{:?}", t.turn))
            .collect();
        turns.sort();
        assert_eq!(turns, vec!["Ai", "PersonalizedAi", "User"]);
        let request = h
            .backend
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Personalize(request) => Some(request),
                _ => None,
            })
            .unwrap();
        assert_eq!(request.similar_question_from_db, "Shipping: How long is shipping?");
        assert_eq!(request.business_id, Some(17));
        assert_no_placeholder(&h.widget);
    }

    #[tokio::test]
    async fn test_personalization_transport_failure() {
        let mut h = harness();
        h.backend.push_submit(Ok(Some(answered("Raw.", None))));
        h.backend
            .push_personalize(Err(Error::Connectivity("reset by peer".into())));

        h.widget.send("q").await;

        assert_eq!(texts(&h.widget, Sender::Ai), vec!["Raw."]);
        let notes = texts(&h.widget, Sender::System);
        assert_eq!(notes.len(), 1);
        assert!(notes[0].starts_with("Error personalizing answer: "));
        assert!(notes[0].contains("reset by peer"));
    }

    #[tokio::test]
    async fn test_unreadable_personalization_reply_shows_error() {
        let mut h = harness();
        h.backend.push_submit(Ok(Some(answered("Raw.", None))));
        h.backend.push_personalize(Err(Error::Parse(
            "expected value at line 1 column 1 (body: <html>)".into(),
        )));

        h.widget.send("q").await;

        assert_eq!(texts(&h.widget, Sender::Ai), vec!["Raw."]);
        let notes = texts(&h.widget, Sender::System);
        assert_eq!(notes.len(), 1);
        assert!(notes[0].starts_with("Error personalizing answer: "));
        assert!(notes[0].contains("<html>"));
        assert_no_placeholder(&h.widget);
    }

    #[tokio::test]
    async fn test_needs_human_skips_personalization() {
        let mut h = harness();
        h.backend.push_submit(Ok(Some(QuestionResponse {
            question_id: Some(42),
            needs_human_answer: Some(true),
            ..Default::default()
        })));

        h.widget.send("Can I get a custom quote?").await;
        h.widget.settle().await;

        let replies = texts(&h.widget, Sender::Ai);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("42"));
        assert!(!h
            .backend
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Personalize(_))));
        assert!(h
            .backend
            .turns()
            .iter()
            .any(|t| t.turn == TurnType::Ai && t.question_id == Some(42)));
    }

    #[tokio::test]
    async fn test_lead_capture_flow() {
        let mut h = harness();
        h.backend.push_submit(Ok(Some(no_answer())));
        h.backend.push_submit(Ok(None));

        h.widget.send("Do you sell gift cards?").await;
        assert!(h.widget.lead_capture().is_awaiting());
        let no_answer_message = h.widget.messages().into_iter().find(|m| m.is_no_answer).unwrap();
        assert_eq!(no_answer_message.text(), NO_ANSWER_MESSAGE);

        h.widget.send("I have a question").await;
        assert!(h.widget.lead_capture().is_awaiting());
        assert_eq!(
            texts(&h.widget, Sender::Ai).last().map(String::as_str),
            Some(CLARIFY_MESSAGE)
        );

        h.widget
            .send("My name is Jane Doe and my email is jane@example.com")
            .await;
        assert!(!h.widget.lead_capture().is_awaiting());
        assert_eq!(
            texts(&h.widget, Sender::Ai).last().cloned(),
            Some(thank_you_message("Jane Doe", "jane@example.com"))
        );

        h.widget.send("Next question").await;
        h.widget.settle().await;

        let calls = h.backend.calls();
        assert_eq!(
            calls
                .iter()
                .filter(|c| matches!(c, Call::SubmitQuestion { .. }))
                .count(),
            2
        );
        assert!(calls.contains(&Call::RequestUserDetails {
            original_question: "Do you sell gift cards?".into()
        }));
        let user_id = h.widget.session().user_id().unwrap().to_string();
        assert!(calls.contains(&Call::UpdateUserDetails {
            user_id,
            name: "Jane Doe".into(),
            email: "jane@example.com".into(),
        }));
        assert_no_placeholder(&h.widget);
    }

    #[tokio::test]
    async fn test_user_details_answer_replaces_placeholder() {
        let mut h = harness();
        h.backend.push_submit(Ok(Some(no_answer())));
        h.backend.push_user_details(Ok(UserDetailsResponse {
            answer: Some("We open at 9am.".into()),
            question_id: Some(9),
        }));

        h.widget.send("When do you open?").await;
        h.widget.settle().await;

        let message = h.widget.messages().into_iter().find(|m| m.is_no_answer).unwrap();
        assert_eq!(message.text(), "We open at 9am.");
        assert!(h
            .backend
            .turns()
            .iter()
            .any(|t| t.text == "We open at 9am."));
    }

    #[tokio::test]
    async fn test_contact_submit_failure_stays_awaiting() {
        let mut h = harness();
        h.backend.push_submit(Ok(Some(no_answer())));
        h.backend
            .push_update_user(Err(Error::Http { status: 500, body: String::new() }));

        h.widget.send("Is there a warranty?").await;
        h.widget.send("bob@example.com").await;

        assert!(h.widget.lead_capture().is_awaiting());
        assert_eq!(
            texts(&h.widget, Sender::System).last().map(String::as_str),
            Some(SUBMIT_FAILED_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_offline_uses_demo_response() {
        let mut h = harness();
        h.backend
            .push_submit(Err(Error::Connectivity("connection refused".into())));

        h.widget.send("hello?").await;

        let replies = texts(&h.widget, Sender::Ai);
        assert_eq!(replies.len(), 1);
        assert!(crate::dispatcher::DEMO_RESPONSES.contains(&replies[0].as_str()));
        assert_eq!(texts(&h.widget, Sender::System), vec![DEMO_MODE_NOTE]);
        assert_no_placeholder(&h.widget);
    }

    #[tokio::test]
    async fn test_server_and_other_failures() {
        let mut h = harness();
        h.backend.push_submit(Err(Error::Http {
            status: 500,
            body: "Internal Server Error".into(),
        }));
        h.backend.push_submit(Err(Error::Parse("<html>".into())));

        h.widget.send("first").await;
        h.widget.send("second").await;
        h.widget.settle().await;

        assert_eq!(texts(&h.widget, Sender::Ai), vec![SERVER_ERROR_MESSAGE]);
        assert_eq!(
            texts(&h.widget, Sender::System),
            vec![SERVER_ERROR_NOTE, SEND_FAILED_MESSAGE]
        );
        assert!(h
            .backend
            .turns()
            .iter()
            .any(|t| t.text == SEND_FAILED_MESSAGE && t.turn == TurnType::Ai));
        assert_no_placeholder(&h.widget);
    }

    #[tokio::test]
    async fn test_loading_placeholder_while_waiting() {
        let mut h = harness();
        h.backend.push_submit(Ok(Some(answered("A.", None))));
        h.backend.push_personalize(Ok(PersonalizedAnswer::default()));
        let gate = h.backend.hold_submit();
        let backend = Arc::clone(&h.backend);
        let transcript = h.widget.transcript().clone();

        let in_flight = async move {
            while !backend
                .calls()
                .iter()
                .any(|c| matches!(c, Call::SubmitQuestion { .. }))
            {
                tokio::task::yield_now().await;
            }
            let senders: Vec<Sender> = transcript.messages().iter().map(|m| m.sender).collect();
            gate.notify_one();
            senders
        };
        let ((), senders) = tokio::join!(h.widget.send("q"), in_flight);

        assert_eq!(
            senders.iter().filter(|s| **s == Sender::Loading).count(),
            1
        );
        assert_eq!(senders.last(), Some(&Sender::Loading));
        assert_no_placeholder(&h.widget);
        assert_eq!(texts(&h.widget, Sender::Ai), vec!["A."]);
    }

    #[tokio::test]
    async fn test_placeholder_removed_before_answer() {
        let mut h = harness();
        h.backend.push_submit(Ok(Some(answered("A.", None))));
        h.backend.push_personalize(Ok(PersonalizedAnswer::default()));

        h.widget.send("q").await;

        let messages = h.widget.messages();
        assert_no_placeholder(&h.widget);
        let user = messages.iter().position(|m| m.sender == Sender::User).unwrap();
        let answer = messages.iter().position(|m| m.sender == Sender::Ai).unwrap();
        assert!(user < answer);
        assert_eq!(texts(&h.widget, Sender::System), vec![UNAVAILABLE_NOTE]);
        assert!(!h.widget.is_loading());
    }

    #[tokio::test]
    async fn test_connect_messages() {
        let mut h = harness_with(None);
        h.backend.push_lookup(Ok(BusinessLookup {
            status: Some("success".into()),
            business_id: Some(serde_json::json!(23)),
            message: None,
        }));
        assert!(h.widget.connect().await);
        assert_eq!(h.widget.session().business_id(), Some("23"));
        assert_eq!(
            texts(&h.widget, Sender::System),
            vec!["API Key verified successfully! Connected to business ID: 23"]
        );

        let mut h = harness_with(None);
        h.backend.push_lookup(Err(Error::Http {
            status: 404,
            body: "{}".into(),
        }));
        assert!(!h.widget.connect().await);
        assert_eq!(
            texts(&h.widget, Sender::System),
            vec!["API Key verification failed: API key not found"]
        );

        let mut h = harness_with(None);
        h.backend.push_lookup(Err(Error::Http {
            status: 403,
            body: r#"{"status":"error","message":"API key revoked"}"#.into(),
        }));
        assert!(!h.widget.connect().await);
        assert_eq!(
            texts(&h.widget, Sender::System),
            vec!["API Key verification failed: API key revoked"]
        );
    }

    #[tokio::test]
    async fn test_connect_offline_demo_business() {
        let mut h = harness_with(None);
        assert!(!h.widget.connect().await);
        assert!(texts(&h.widget, Sender::System)[0].starts_with("API Key verification error: "));

        let mut h = harness_with(None);
        h.widget = h.widget.with_demo_business_id(Some("17".into()));
        assert!(h.widget.connect().await);
        assert_eq!(h.widget.session().business_id(), Some("17"));
        assert_eq!(texts(&h.widget, Sender::System), vec![DEMO_CONNECT_MESSAGE]);
    }

    #[tokio::test]
    async fn test_logout_starts_fresh_conversation() {
        let mut h = harness();
        h.backend.push_submit(Ok(Some(no_answer())));
        h.backend.push_create(Ok(CreateConversationResponse {
            conversation_id: Some("conv-2".into()),
            ..Default::default()
        }));
        h.backend.push_submit(Ok(None));

        h.widget.send("first").await;
        h.widget.logout().await;
        assert!(h.widget.messages().is_empty());
        assert!(!h.widget.lead_capture().is_awaiting());

        h.widget.send("second").await;
        h.widget.settle().await;
        assert_eq!(h.widget.session().conversation_id(), Some("conv-2"));
        assert!(h.backend.calls().contains(&Call::EndConversation {
            conversation_id: "conv-1".into()
        }));
    }

    #[tokio::test]
    async fn test_teardown_drops_late_updates() {
        let mut h = harness();
        h.backend.push_submit(Ok(None));
        h.widget.send("hi").await;
        let before = h.widget.messages().len();

        h.widget.teardown().await;
        h.widget.transcript().push(ChatMessage::ai("late"));
        assert_eq!(h.widget.messages().len(), before);
        assert!(!h.widget.session().is_active());
    }

    #[tokio::test]
    async fn test_reopen_restores_conversation_from_cookie() {
        let backend = Arc::new(FakeBackend::new());
        let cookies = Arc::new(MemoryCookieStore::new());
        cookies.set(
            crate::store::CONVERSATION_ID_COOKIE,
            "conv-saved",
            crate::store::conversation_id_ttl(),
        );
        let mut widget = ChatWidget::new(
            Arc::clone(&backend) as Arc<dyn Backend>,
            cookies,
            Arc::new(FakeFlush::failing()),
            Some("17".into()),
        );

        widget.toggle().await;
        assert_eq!(widget.session().conversation_id(), Some("conv-saved"));

        // Unload flush refused; the session stays open.
        widget.unload();
        assert!(widget.session().is_active());
    }
}
