//! Conversation session management.
//!
//! Owns the anonymous user identity, creates the backend conversation on
//! demand, tags turns with its id, and ends it exactly once.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::flush::FinalFlush;
use crate::models::{
    ConversationSession, ConversationUpdate, CreateConversationRequest, HandoffState, TurnType,
};
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::store::{
    conversation_id_ttl, user_id_ttl, CookieStore, CONVERSATION_ID_COOKIE, USER_ID_COOKIE,
};
use crate::Error;

/// Conversation id used when the backend could not create one.
pub fn fallback_conversation_id() -> String {
    format!(
        "fallback-{}-{}",
        Utc::now().timestamp_millis(),
        rand::thread_rng().gen_range(0..1000)
    )
}

/// Session state for one widget instance.
pub struct SessionManager {
    backend: Arc<dyn Backend>,
    cookies: Arc<dyn CookieStore>,
    flush: Arc<dyn FinalFlush>,
    retry: RetryPolicy,
    business_id: Option<String>,
    user_id: Option<String>,
    session: Option<ConversationSession>,
    background: TaskTracker,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn Backend>,
        cookies: Arc<dyn CookieStore>,
        flush: Arc<dyn FinalFlush>,
    ) -> Self {
        Self {
            backend,
            cookies,
            flush,
            retry: RetryPolicy::default(),
            business_id: None,
            user_id: None,
            session: None,
            background: TaskTracker::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn set_business_id(&mut self, business_id: Option<String>) {
        self.business_id = business_id;
    }

    pub fn business_id(&self) -> Option<&str> {
        self.business_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn session(&self) -> Option<&ConversationSession> {
        self.session.as_ref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.conversation_id.as_str())
    }

    /// True while a session exists and has not been ended.
    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.ended)
    }

    /// Reuse the identity from the cookie jar or mint and persist a new one.
    pub fn ensure_user_identity(&mut self) -> String {
        if let Some(existing) = self.user_id.clone() {
            return existing;
        }

        let user_id = match self.cookies.get(USER_ID_COOKIE) {
            Some(existing) => {
                info!("Existing user detected, id: {}", existing);
                existing
            }
            None => {
                let fresh = Uuid::new_v4().to_string();
                self.cookies.set(USER_ID_COOKIE, &fresh, user_id_ttl());
                info!("New user detected, assigned id: {}", fresh);
                fresh
            }
        };

        self.user_id = Some(user_id.clone());
        user_id
    }

    /// Create the backend conversation.
    ///
    /// Returns `None` without touching the network when the business or user
    /// is unknown or a session already exists. After the retry budget is
    /// spent a local fallback session is used so chat keeps working.
    pub async fn create_conversation(&mut self) -> Option<String> {
        let (Some(business_id), Some(user_id)) = (self.business_id.clone(), self.user_id.clone())
        else {
            warn!(
                "Cannot create conversation: business id {}, user id {}",
                if self.business_id.is_some() { "present" } else { "missing" },
                if self.user_id.is_some() { "present" } else { "missing" }
            );
            return None;
        };
        if self.session.is_some() {
            debug!("Conversation already created");
            return None;
        }

        let backend = Arc::clone(&self.backend);
        let cookies = Arc::clone(&self.cookies);
        let outcome = self
            .retry
            .run(
                user_id,
                |user_id| {
                    let backend = Arc::clone(&backend);
                    let request = CreateConversationRequest {
                        business_id: business_id.clone(),
                        user_id,
                    };
                    async move {
                        let response = backend.create_conversation(&request).await?;
                        let conversation_id = response
                            .conversation_id
                            .filter(|id| !id.is_empty())
                            .ok_or(Error::MissingField("conversationId"))?;
                        Ok((conversation_id, response.user_id))
                    }
                },
                |e| !matches!(e, Error::Parse(_) | Error::MissingField(_)),
                |e, user_id| {
                    if !e.is_duplicate_identity() {
                        return user_id;
                    }
                    let fresh = Uuid::new_v4().to_string();
                    warn!("Duplicate user {}; retrying as {}", user_id, fresh);
                    cookies.set(USER_ID_COOKIE, &fresh, user_id_ttl());
                    fresh
                },
            )
            .await;

        match outcome {
            RetryOutcome::Succeeded {
                value: (conversation_id, echoed_user),
                input: user_id,
                attempts,
            } => {
                info!(
                    "Conversation {} created after {} attempt(s)",
                    conversation_id, attempts
                );
                self.cookies
                    .set(CONVERSATION_ID_COOKIE, &conversation_id, conversation_id_ttl());
                self.spawn_handoff_state(&conversation_id, echoed_user.or(Some(user_id.clone())));
                self.adopt(conversation_id.clone(), user_id, business_id, false);
                Some(conversation_id)
            }
            RetryOutcome::Exhausted {
                input: user_id,
                last_error,
                ..
            } => {
                let conversation_id = fallback_conversation_id();
                warn!(
                    "Conversation creation failed ({}); using fallback id {}",
                    last_error, conversation_id
                );
                self.adopt(conversation_id.clone(), user_id, business_id, true);
                Some(conversation_id)
            }
            RetryOutcome::Aborted {
                input: user_id,
                error,
                ..
            } => {
                error!("Conversation creation aborted: {}", error);
                self.user_id = Some(user_id);
                None
            }
        }
    }

    /// The current conversation id, creating the conversation first if none exists.
    pub async fn ensure_conversation(&mut self) -> Option<String> {
        if let Some(id) = self.conversation_id() {
            return Some(id.to_string());
        }
        self.create_conversation().await
    }

    fn adopt(
        &mut self,
        conversation_id: String,
        user_id: String,
        business_id: String,
        created_locally: bool,
    ) {
        self.user_id = Some(user_id.clone());
        self.session = Some(ConversationSession {
            conversation_id,
            user_id,
            business_id,
            created_locally,
            ended: false,
        });
    }

    fn spawn_handoff_state(&self, conversation_id: &str, user_id: Option<String>) {
        let backend = Arc::clone(&self.backend);
        let state = HandoffState::initial(conversation_id, user_id);
        self.background.spawn(async move {
            match backend.create_handoff_state(&state).await {
                Ok(()) => info!("Handoff state created for {}", state.conversation_id),
                Err(e) => warn!(
                    "Failed to create handoff state for {}: {}",
                    state.conversation_id, e
                ),
            }
        });
    }

    /// Record a turn against the current conversation without waiting.
    pub fn track_message(&self, text: &str, turn: TurnType, question_id: Option<i64>) {
        let Some(conversation_id) = self.conversation_id().map(str::to_string) else {
            debug!("Cannot track message - no active conversation");
            return;
        };

        let backend = Arc::clone(&self.backend);
        let update = ConversationUpdate::turn(text, turn, question_id);
        self.background.spawn(async move {
            match backend.update_conversation(&conversation_id, &update).await {
                Ok(()) => debug!(
                    "Tracked {:?} message in conversation {}",
                    turn, conversation_id
                ),
                Err(e) => warn!(
                    "Failed to track {:?} message in conversation {}: {}",
                    turn, conversation_id, e
                ),
            }
        });
    }

    /// End the conversation over the normal async path. Idempotent.
    pub async fn end_conversation(&mut self) {
        let Some(session) = self.session.as_mut().filter(|s| !s.ended) else {
            debug!("No open conversation to end");
            return;
        };

        if session.created_locally {
            info!("Closing fallback conversation {}", session.conversation_id);
            session.ended = true;
            return;
        }

        info!("Ending conversation {}", session.conversation_id);
        match self
            .backend
            .update_conversation(&session.conversation_id, &ConversationUpdate::end())
            .await
        {
            Ok(()) => {
                session.ended = true;
                self.cookies.remove(CONVERSATION_ID_COOKIE);
                info!("Conversation {} ended", session.conversation_id);
            }
            Err(e) => error!(
                "Failed to end conversation {}: {}",
                session.conversation_id, e
            ),
        }
    }

    /// End the conversation with a blocking call; for unload hooks only.
    pub fn end_conversation_on_unload(&mut self) {
        let Some(session) = self.session.as_mut().filter(|s| !s.ended) else {
            return;
        };

        if session.created_locally {
            session.ended = true;
            return;
        }

        if self.flush.end_conversation(&session.conversation_id) {
            session.ended = true;
            self.cookies.remove(CONVERSATION_ID_COOKIE);
        }
    }

    /// Adopt a conversation remembered in the cookie jar, if any.
    pub fn restore_from_cookie(&mut self) -> bool {
        if self.session.is_some() {
            return false;
        }
        let (Some(conversation_id), Some(business_id)) = (
            self.cookies.get(CONVERSATION_ID_COOKIE),
            self.business_id.clone(),
        ) else {
            return false;
        };

        info!("Restoring conversation {} from cookie", conversation_id);
        let user_id = self.ensure_user_identity();
        self.adopt(conversation_id, user_id, business_id, false);
        true
    }

    /// Forget the session so a new conversation can be created.
    pub fn reset(&mut self) {
        self.session = None;
    }

    /// Wait for outstanding background requests to finish.
    pub async fn settle(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }
}
