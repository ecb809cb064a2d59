//! Per-business display configuration.

use tracing::{info, warn};

use crate::backend::Backend;
use crate::models::{AiPersonality, WidgetConfig};

/// Appearance and greeting text for the widget.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WidgetDisplay {
    pub config: WidgetConfig,
    pub personality: AiPersonality,
}

impl WidgetDisplay {
    /// Fetch configuration and personality, keeping defaults for whatever fails.
    pub async fn load(backend: &dyn Backend, business_id: &str) -> Self {
        let config = match backend.widget_configuration(business_id).await {
            Ok(config) => {
                info!("Loaded widget configuration for business {}", business_id);
                config
            }
            Err(e) => {
                warn!("Using default widget configuration: {}", e);
                WidgetConfig::default()
            }
        };

        let personality = match backend.ai_personality(business_id).await {
            Ok(personality) => personality,
            Err(e) => {
                warn!("Using default AI personality: {}", e);
                AiPersonality::default()
            }
        };

        Self {
            config,
            personality,
        }
    }

    /// Greeting shown when the widget opens, if any.
    pub fn welcome_message(&self) -> Option<&str> {
        if !self.config.show_welcome_message {
            return None;
        }
        self.personality
            .greeting_message
            .as_deref()
            .filter(|g| !g.trim().is_empty())
            .or(Some(self.config.welcome_message.as_str()))
    }

    pub fn header(&self) -> &str {
        match self.personality.ai_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.config.header_text,
        }
    }
}
