use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::config::WhatsAppConfig;

/// WhatsApp keeps long messages readable if we split around 4000 chars.
const MAX_CHUNK_LEN: usize = 4000;

/// Artificial typing delay the Evolution API applies before delivery,
/// in milliseconds.
const SEND_DELAY_MS: u32 = 1200;

/// Seam for the message-delivery collaborator.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, to_jid: &str, text: &str) -> Result<()>;
}

/// Evolution API client. Delivery is fire-and-forget from the
/// webhook's point of view; callers log failures and move on.
pub struct EvolutionClient {
    client: reqwest::Client,
    config: WhatsAppConfig,
}

impl EvolutionClient {
    pub fn new(config: WhatsAppConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    async fn send_chunk(&self, to_jid: &str, text: &str) -> Result<()> {
        let url = format!(
            "{}/message/sendText/{}",
            self.config.base_url, self.config.instance
        );

        let body = json!({
            "number": to_jid,
            "text": text,
            "delay": SEND_DELAY_MS,
            "linkPreview": false,
        });

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to reach Evolution API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Evolution API error ({}): {}", status, error_body);
        }

        debug!("Delivered message to {}", to_jid);
        Ok(())
    }
}

#[async_trait]
impl MessageSender for EvolutionClient {
    async fn send_text(&self, to_jid: &str, text: &str) -> Result<()> {
        let chunks = split_message(text, MAX_CHUNK_LEN);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            if total > 1 {
                debug!("Long reply split: sending chunk {}/{}", i + 1, total);
            }
            self.send_chunk(to_jid, chunk).await?;
        }
        Ok(())
    }
}

/// Split long messages at newline/space boundaries.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_is_single_chunk() {
        let chunks = split_message("hello there", 4000);
        assert_eq!(chunks, vec!["hello there".to_string()]);
    }

    #[test]
    fn test_long_message_splits_at_spaces() {
        let text = "word ".repeat(100);
        let chunks = split_message(text.trim_end(), 42);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 42);
        }
        assert_eq!(chunks.concat(), text.trim_end());
    }

    #[test]
    fn test_split_respects_utf8_boundaries() {
        let text = "á".repeat(50);
        let chunks = split_message(&text, 11);
        assert_eq!(chunks.concat(), text);
        for chunk in &chunks {
            assert!(chunk.is_char_boundary(chunk.len()));
        }
    }
}
