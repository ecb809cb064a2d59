//! Last-chance conversation termination when the host is going away.
//!
//! Async requests may never complete once the page (or process) is torn down,
//! so this one call blocks until the backend has answered.

use std::time::Duration;

use tracing::{error, info};

use crate::http::{default_headers, endpoint};
use crate::models::ConversationUpdate;
use crate::{Config, Error, Result};

/// Upper bound on how long unload may block.
pub const UNLOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Synchronous end-of-conversation call for unload hooks.
pub trait FinalFlush: Send + Sync {
    /// Returns true when the backend acknowledged the end with a 2xx.
    fn end_conversation(&self, conversation_id: &str) -> bool;
}

/// `FinalFlush` backed by `reqwest::blocking`.
#[derive(Debug, Clone)]
pub struct BlockingFlush {
    base_url: String,
    api_key: String,
    bearer_token: Option<String>,
}

impl BlockingFlush {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.backend_url.clone(),
            api_key: config.api_key.clone(),
            bearer_token: config.bearer_token.clone(),
        }
    }

    fn send_end(&self, conversation_id: &str) -> Result<u16> {
        let client = reqwest::blocking::Client::builder()
            .default_headers(default_headers(&self.api_key, self.bearer_token.as_deref())?)
            .timeout(UNLOAD_TIMEOUT)
            .build()?;

        let url = endpoint(
            &self.base_url,
            &format!("/api/conversations/{}", urlencoding::encode(conversation_id)),
        );

        let response = client.put(url).json(&ConversationUpdate::end()).send()?;
        Ok(response.status().as_u16())
    }
}

impl FinalFlush for BlockingFlush {
    fn end_conversation(&self, conversation_id: &str) -> bool {
        // The blocking client owns its own runtime and must not be built or
        // dropped on an async worker thread.
        let flush = self.clone();
        let id = conversation_id.to_string();
        let result = std::thread::spawn(move || flush.send_end(&id))
            .join()
            .unwrap_or_else(|_| Err(Error::Request("unload thread panicked".to_string())));

        match result {
            Ok(status) if (200..300).contains(&status) => {
                info!("Conversation {} ended on unload", conversation_id);
                true
            }
            Ok(status) => {
                error!(
                    "Failed to end conversation {} on unload: HTTP {}",
                    conversation_id, status
                );
                false
            }
            Err(e) => {
                error!("Failed to end conversation {} on unload: {}", conversation_id, e);
                false
            }
        }
    }
}
