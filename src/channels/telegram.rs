//! Telegram channel — long-polls the Bot API for updates.
//!
//! Native Bot API implementation adapted to the `Channel` trait: choice
//! rows become a reply keyboard, PNG attachments go out as photos, and
//! everything else as documents.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use crate::channels::{Channel, IncomingMessage, MessageStream};
use crate::engine::turn::TurnReply;
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    /// Check if a username or chat id is in the allowed list.
    pub fn is_user_allowed(&self, identity: &str) -> bool {
        self.allowed_users.iter().any(|u| u == "*" || u == identity)
    }

    /// Send one message chunk (≤4096 chars), Markdown-first with a plain
    /// text fallback, carrying the reply keyboard if present.
    async fn send_message_chunk(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&serde_json::Value>,
    ) -> Result<(), ChannelError> {
        let mut markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });
        if let Some(kb) = keyboard {
            markdown_body["reply_markup"] = kb.clone();
        }

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;
        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let mut plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(kb) = keyboard {
            plain_body["reply_markup"] = kb.clone();
        }
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;
        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {markdown_status}, plain: {plain_err})"
                ),
            });
        }
        Ok(())
    }

    async fn send_attachment(&self, chat_id: &str, path: &Path) -> Result<(), ChannelError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        let is_photo = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png"));

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("read {}: {e}", path.display()),
            })?;
        let (method, field) = if is_photo {
            ("sendPhoto", "photo")
        } else {
            ("sendDocument", "document")
        };
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part(field, Part::bytes(bytes).file_name(file_name.clone()));

        let resp = self
            .client
            .post(self.api_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;
        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} failed: {err}"),
            });
        }
        tracing::info!("Telegram attachment sent to {chat_id}: {file_name}");
        Ok(())
    }
}

/// Choice rows → Telegram reply keyboard JSON.
fn reply_keyboard(reply: &TurnReply) -> Option<serde_json::Value> {
    if reply.choices.is_empty() {
        return Some(serde_json::json!({"remove_keyboard": true}));
    }
    Some(serde_json::json!({
        "keyboard": reply.choices,
        "resize_keyboard": true,
        "one_time_keyboard": true,
    }))
}

/// Split a long message at line boundaries where possible.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.split_inclusive('\n') {
        if current.chars().count() + line.chars().count() > max_len && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        // A single oversized line is hard-split.
        if line.chars().count() > max_len {
            let mut rest: String = line.to_string();
            while rest.chars().count() > max_len {
                let cut: String = rest.chars().take(max_len).collect();
                let cut_len = cut.len();
                chunks.push(cut);
                rest = rest[cut_len..].to_string();
            }
            current.push_str(&rest);
        } else {
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let client = self.client.clone();
        let base_url = self.api_url("getUpdates");
        let allowed = self.allowed_users.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            loop {
                let body = serde_json::json!({
                    "timeout": 30,
                    "offset": offset,
                    "allowed_updates": ["message"],
                });
                let resp = client
                    .post(&base_url)
                    .json(&body)
                    .timeout(Duration::from_secs(40))
                    .send()
                    .await;
                let payload: serde_json::Value = match resp {
                    Ok(resp) => match resp.json().await {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::warn!("Telegram getUpdates parse error: {e}");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            continue;
                        }
                    },
                    Err(e) => {
                        tracing::warn!("Telegram getUpdates failed: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                for update in payload["result"].as_array().cloned().unwrap_or_default() {
                    if let Some(id) = update["update_id"].as_i64() {
                        offset = offset.max(id + 1);
                    }
                    let message = &update["message"];
                    let Some(text) = message["text"].as_str() else {
                        continue;
                    };
                    let Some(chat_id) = message["chat"]["id"].as_i64() else {
                        continue;
                    };
                    let username = message["from"]["username"].as_str().unwrap_or_default();
                    let chat_id = chat_id.to_string();
                    let permitted = allowed.iter().any(|u| {
                        u == "*" || u == username || u == &chat_id
                    });
                    if !permitted {
                        tracing::warn!(user = username, "Telegram message from disallowed user");
                        continue;
                    }
                    let msg = IncomingMessage::new("telegram", &chat_id, text);
                    if tx.send(msg).is_err() {
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });
        Ok(Box::pin(stream))
    }

    async fn respond(&self, msg: &IncomingMessage, reply: TurnReply) -> Result<(), ChannelError> {
        let keyboard = reply_keyboard(&reply);
        let chunks = split_message(&reply.text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.iter().enumerate() {
            // Keyboard rides on the final chunk only.
            let kb = if i == last { keyboard.as_ref() } else { None };
            self.send_message_chunk(&msg.user_id, chunk, kb).await?;
        }
        for attachment in &reply.attachments {
            self.send_attachment(&msg.user_id, attachment).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_users_wildcard_and_exact() {
        let channel = TelegramChannel::new("token".into(), vec!["*".into()]);
        assert!(channel.is_user_allowed("anyone"));
        let channel = TelegramChannel::new("token".into(), vec!["ada".into()]);
        assert!(channel.is_user_allowed("ada"));
        assert!(!channel.is_user_allowed("bob"));
    }

    #[test]
    fn short_messages_pass_through_unsplit() {
        let chunks = split_message("hello", 4096);
        assert_eq!(chunks, vec!["hello"]);
    }

    #[test]
    fn long_messages_split_at_line_boundaries() {
        let text = (0..100).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = split_message(&text, 100);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        assert_eq!(chunks.join(""), text);
    }

    #[test]
    fn keyboard_rows_mirror_reply_choices() {
        let reply = TurnReply::text("pick").with_choices(vec![vec!["A".into(), "B".into()]]);
        let kb = reply_keyboard(&reply).unwrap();
        assert_eq!(kb["keyboard"][0][0], "A");
        let empty = reply_keyboard(&TurnReply::text("no choices")).unwrap();
        assert_eq!(empty["remove_keyboard"], true);
    }
}
