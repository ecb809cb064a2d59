//! HTTP client for the support backend.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::backend::Backend;
use crate::config::redact;
use crate::models::{
    AiPersonality, BusinessLookup, ConversationUpdate, CreateConversationRequest,
    CreateConversationResponse, HandoffState, PersonalizeRequest, PersonalizedAnswer,
    QuestionResponse, SubmitQuestionRequest, UserDetailsRequest, UserDetailsResponse,
    WidgetConfig,
};
use crate::{Config, Error, Result};

/// Header carrying the business API key.
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Default JSON headers plus the API key and optional bearer token.
pub fn default_headers(api_key: &str, bearer_token: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        API_KEY_HEADER,
        HeaderValue::from_str(api_key)
            .map_err(|e| Error::Config(format!("Invalid API key header: {}", e)))?,
    );
    if let Some(token) = bearer_token {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::Config(format!("Invalid bearer token: {}", e)))?,
        );
    }
    Ok(headers)
}

/// Join the base URL and a path without doubling slashes.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Backend reached over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpBackend {
    /// Create a client from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(default_headers(
                &config.api_key,
                config.bearer_token.as_deref(),
            )?)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.backend_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        endpoint(&self.base_url, path)
    }

    async fn send(&self, label: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            error!("{} request failed: {}", label, e);
            Error::from(e)
        })?;

        let status = response.status();
        debug!("{} responded with {}", label, status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("{} failed: {} - {}", label, status, body);
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Send and decode a JSON body, reading it as text first so malformed
    /// payloads surface as `Error::Parse` with the raw body attached.
    async fn send_json<T: DeserializeOwned>(&self, label: &str, request: RequestBuilder) -> Result<T> {
        let response = self.send(label, request).await?;
        let text = response.text().await?;
        parse_body(&text)
    }
}

/// Decode a response body, mapping failures to `Error::Parse`.
pub fn parse_body<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| Error::Parse(format!("{} (body: {})", e, text)))
}

#[async_trait]
impl Backend for HttpBackend {
    async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<CreateConversationResponse> {
        info!(
            "Creating conversation for business {} and user {}",
            request.business_id, request.user_id
        );
        self.send_json(
            "Conversation create",
            self.client
                .post(self.url("/api/conversations/create"))
                .json(request),
        )
        .await
    }

    async fn update_conversation(
        &self,
        conversation_id: &str,
        update: &ConversationUpdate,
    ) -> Result<()> {
        let path = format!("/api/conversations/{}", urlencoding::encode(conversation_id));
        self.send("Conversation update", self.client.put(self.url(&path)).json(update))
            .await?;
        Ok(())
    }

    async fn create_handoff_state(&self, state: &HandoffState) -> Result<()> {
        self.send(
            "Handoff state create",
            self.client.post(self.url("/api/handoff-states")).json(state),
        )
        .await?;
        Ok(())
    }

    async fn submit_question(
        &self,
        request: &SubmitQuestionRequest,
    ) -> Result<Option<QuestionResponse>> {
        info!(
            "Submitting question for business {} with key {}",
            request.business_id,
            redact(&self.api_key)
        );
        let url = format!(
            "{}?apiKey={}",
            self.url("/api/widget/submitQuestion"),
            urlencoding::encode(&self.api_key)
        );
        self.send_json("Submit question", self.client.post(url).json(request))
            .await
    }

    async fn personalize(&self, request: &PersonalizeRequest) -> Result<PersonalizedAnswer> {
        self.send_json(
            "Personalize answer",
            self.client
                .post(self.url("/api/ai-answers/personalize"))
                .json(request),
        )
        .await
    }

    async fn request_user_details(
        &self,
        request: &UserDetailsRequest,
    ) -> Result<UserDetailsResponse> {
        self.send_json(
            "User details request",
            self.client
                .post(self.url("/api/user-details/request"))
                .json(request),
        )
        .await
    }

    async fn update_user_details(&self, user_id: &str, name: &str, email: &str) -> Result<()> {
        let url = format!(
            "{}?name={}&email={}",
            self.url(&format!(
                "/api/user-details/update/{}",
                urlencoding::encode(user_id)
            )),
            urlencoding::encode(name),
            urlencoding::encode(email)
        );
        self.send("User details update", self.client.post(url)).await?;
        Ok(())
    }

    async fn widget_configuration(&self, business_id: &str) -> Result<WidgetConfig> {
        let path = format!(
            "/api/widget-configurations/business/{}",
            urlencoding::encode(business_id)
        );
        self.send_json("Widget configuration", self.client.get(self.url(&path)))
            .await
    }

    async fn ai_personality(&self, business_id: &str) -> Result<AiPersonality> {
        let path = format!(
            "/api/ai-personalities/business/{}",
            urlencoding::encode(business_id)
        );
        self.send_json("AI personality", self.client.get(self.url(&path)))
            .await
    }

    async fn lookup_business(&self) -> Result<BusinessLookup> {
        let path = format!(
            "/api/admin/api-keys/business-id/{}",
            urlencoding::encode(&self.api_key)
        );
        self.send_json("Business lookup", self.client.get(self.url(&path)))
            .await
    }
}
