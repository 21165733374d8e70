//! Run notifications.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::TelegramConfig;
use crate::error::{RefreshError, Result};

/// Receives one message per store and stage group. Delivery is fire-and-forget:
/// implementations log their own failures.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Telegram Bot API `sendMessage` sink.
pub struct TelegramSink {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RefreshError::Config(format!("telegram client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_url.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
        })
    }

    async fn send(&self, message: &str) -> std::result::Result<(), String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "chat_id": self.chat_id, "text": message }))
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;
        if !response.status().is_success() {
            return Err(format!("Telegram returned {}", response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn notify(&self, message: &str) {
        match self.send(message).await {
            Ok(()) => debug!("Notification sent: {}", message),
            Err(e) => warn!("Failed to send notification: {}", e),
        }
    }
}

/// Message for a finished copy stage.
pub fn copy_message(store: &str, failure: Option<&str>) -> String {
    match failure {
        None => format!("[{}] copy succeeded", store),
        Some(cause) => format!("[{}] copy failed: {}", store, cause),
    }
}

/// Message for a finished verify stage.
pub fn verify_message(store: &str, mismatches: usize, failure: Option<&str>) -> String {
    match (failure, mismatches) {
        (Some(cause), _) => format!("[{}] verify failed: {}", store, cause),
        (None, 0) => format!("[{}] verify succeeded", store),
        (None, n) => format!("[{}] verify succeeded with {} count mismatches", store, n),
    }
}
