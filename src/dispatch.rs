use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::{Config, TriggerConfig};
use crate::llm::TextGenerator;
use crate::whatsapp::MessageSender;

/// Event kind the bot reacts to; everything else is acknowledged and dropped.
const MESSAGE_UPSERT: &str = "messages.upsert";

// ── Inbound event model ────────────────────────────────────────────────

/// Raw webhook payload from the Evolution API.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub data: Option<EventData>,
}

/// `data` arrives as a single message object or as an array of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    // `Many` must be tried first: serde's untagged resolution can
    // coerce a JSON array into a struct positionally, so `One` would
    // otherwise swallow array payloads.
    Many(Vec<MessageData>),
    One(Box<MessageData>),
}

impl EventData {
    pub fn into_messages(self) -> Vec<MessageData> {
        match self {
            EventData::One(msg) => vec![*msg],
            EventData::Many(msgs) => msgs,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageData {
    #[serde(default)]
    pub key: MessageKey,
    #[serde(default)]
    pub message: Option<MessageBody>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageKey {
    #[serde(default, rename = "fromMe")]
    pub from_me: bool,
    #[serde(default, rename = "remoteJid")]
    pub remote_jid: String,
}

/// Either `conversation` or `extendedTextMessage` is populated, never both.
#[derive(Debug, Default, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default, rename = "extendedTextMessage")]
    pub extended_text: Option<ExtendedText>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtendedText {
    #[serde(default)]
    pub text: Option<String>,
}

impl MessageData {
    /// Plain text first, extended text as fallback, empty otherwise.
    pub fn body(&self) -> &str {
        self.message
            .as_ref()
            .and_then(|m| {
                m.conversation
                    .as_deref()
                    .or_else(|| m.extended_text.as_ref().and_then(|e| e.text.as_deref()))
            })
            .unwrap_or("")
    }
}

// ── Trigger parsing ────────────────────────────────────────────────────

/// What the dispatcher decided to do with one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Not addressed to the bot; do nothing.
    None,
    /// Self-originated message; must never be answered (anti-loop).
    Ignore,
    /// Trigger present but no question; send the fixed ask-again prompt.
    Fallback { to: String },
    /// Trigger present with a question; generate and reply.
    Generate { to: String, prompt: String },
}

/// Webhook acknowledgment. The remote caller always gets HTTP 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookStatus {
    Ok,
    Ignored,
}

impl WebhookStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookStatus::Ok => "ok",
            WebhookStatus::Ignored => "ignored",
        }
    }
}

fn lowercase_first(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Case-insensitive substring check for the trigger token.
pub fn contains_trigger(body: &str, token: &str) -> bool {
    !token.is_empty() && body.to_lowercase().contains(&token.to_lowercase())
}

/// Remove every case-insensitive occurrence of the trigger token and
/// trim surrounding whitespace. Works on chars so odd-cased input
/// can't break slicing.
pub fn strip_trigger(body: &str, token: &str) -> String {
    let token_lc: Vec<char> = token.chars().map(lowercase_first).collect();
    if token_lc.is_empty() {
        return body.trim().to_string();
    }

    let chars: Vec<char> = body.chars().collect();
    let mut out = String::with_capacity(body.len());
    let mut i = 0;
    while i < chars.len() {
        let matches = i + token_lc.len() <= chars.len()
            && chars[i..i + token_lc.len()]
                .iter()
                .zip(&token_lc)
                .all(|(c, t)| lowercase_first(*c) == *t);
        if matches {
            i += token_lc.len();
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }

    out.trim().to_string()
}

/// Fixed reply when someone pings the bot without a question.
pub fn fallback_prompt(token: &str) -> String {
    format!("Hi! How can I help? (You forgot to send a question along with {token})")
}

/// Pure decision step: map one inbound message to zero or one action.
pub fn evaluate(trigger: &TriggerConfig, allowed_group: Option<&str>, msg: &MessageData) -> Action {
    if msg.key.from_me {
        return Action::Ignore;
    }

    let body = msg.body();
    if !contains_trigger(body, &trigger.token) {
        return Action::None;
    }

    if trigger.group_only {
        match allowed_group {
            Some(group) if msg.key.remote_jid == group => {}
            _ => return Action::None,
        }
    }

    let to = msg.key.remote_jid.clone();
    let argument = strip_trigger(body, &trigger.token);
    if argument.is_empty() {
        Action::Fallback { to }
    } else {
        Action::Generate { to, prompt: argument }
    }
}

// ── Dispatcher ─────────────────────────────────────────────────────────

/// Turns webhook payloads into at most one outbound reply each.
/// Stateless per call; collaborator failures are logged and swallowed
/// so the webhook contract never surfaces internal errors.
pub struct Dispatcher {
    trigger: TriggerConfig,
    group_jid: Option<String>,
    generator: Arc<dyn TextGenerator>,
    sender: Arc<dyn MessageSender>,
}

impl Dispatcher {
    pub fn new(
        config: &Config,
        generator: Arc<dyn TextGenerator>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        if config.trigger.group_only && config.digest.group_jid.is_none() {
            warn!("TRIGGER_GROUP_ONLY set without GROUP_JID; trigger will answer in any chat");
        }
        Self {
            trigger: config.trigger.clone(),
            group_jid: config.digest.group_jid.clone(),
            generator,
            sender,
        }
    }

    /// Handle one raw webhook payload. Always resolves to an
    /// acknowledgment; malformed payloads are logged and acked "ok".
    pub async fn handle(&self, payload: serde_json::Value) -> WebhookStatus {
        let event: WebhookEvent = match serde_json::from_value(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Unrecognized webhook payload: {}", e);
                return WebhookStatus::Ok;
            }
        };

        if event.event != MESSAGE_UPSERT {
            return WebhookStatus::Ok;
        }
        let Some(data) = event.data else {
            return WebhookStatus::Ok;
        };

        let messages = data.into_messages();
        if messages.is_empty() {
            return WebhookStatus::Ok;
        }

        let mut all_self = true;
        for msg in &messages {
            let action = evaluate(&self.trigger, self.group_jid.as_deref(), msg);
            if action != Action::Ignore {
                all_self = false;
            }
            self.execute(action).await;
        }

        if all_self {
            WebhookStatus::Ignored
        } else {
            WebhookStatus::Ok
        }
    }

    async fn execute(&self, action: Action) {
        match action {
            Action::None | Action::Ignore => {}
            Action::Fallback { to } => {
                let text = fallback_prompt(&self.trigger.token);
                if let Err(e) = self.sender.send_text(&to, &text).await {
                    error!("Failed to deliver fallback prompt to {}: {:#}", to, e);
                }
            }
            Action::Generate { to, prompt } => {
                info!("Trigger hit in {}: {}", to, prompt);
                match self.generator.generate(&prompt).await {
                    Ok(reply) => {
                        if let Err(e) = self.sender.send_text(&to, &reply).await {
                            error!("Failed to deliver reply to {}: {:#}", to, e);
                        }
                    }
                    // Silent no-reply on generation failure; the chat
                    // never sees a raw error.
                    Err(e) => error!("Generation failed for {}: {:#}", to, e),
                }
            }
        }
    }
}
