use crate::config_loader;

use chrono::{DateTime, Local};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{channel, Sender};
use tokio::task;

/// Shown when the backend answers with neither prose nor a structured payload
pub const NO_ANSWER_REPLY: &str = "I couldn't find an answer.";
/// Shown when the backend is unreachable or returns garbage
pub const OFFLINE_REPLY: &str = "Oops, having trouble connecting. Try again in a moment.";

static MESSAGE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_message_id() -> String {
    MESSAGE_ID_COUNTER.fetch_add(1, Ordering::SeqCst).to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElderProfile {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MedicationReminder {
    pub id: Option<String>,
    pub medication_name: Option<String>,
    pub dosage: Option<String>,
    pub send_time: Option<String>,
    pub phone_number: Option<String>,
    pub frequency: Option<String>,
}

/// The backend's answer to one chat message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub profile: Option<ElderProfile>,
    #[serde(default)]
    pub reminders: Option<Vec<MedicationReminder>>,
}

impl ChatReply {
    /// The text the companion displays and speaks for this reply. A reply
    /// that only carries structured payloads has nothing to say; a reply
    /// with nothing at all falls back to a fixed answer.
    pub fn display_text(&self) -> String {
        match &self.reply {
            Some(text) if !text.trim().is_empty() => text.clone(),
            _ if self.profile.is_some() || self.reminders.is_some() => String::new(),
            _ => NO_ANSWER_REPLY.to_string(),
        }
    }

    pub fn offline() -> Self {
        Self {
            reply: Some(OFFLINE_REPLY.to_string()),
            profile: None,
            reminders: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the session transcript.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
    pub profile: Option<ElderProfile>,
    pub reminders: Option<Vec<MedicationReminder>>,
}

impl ChatMessage {
    fn user(content: &str) -> Self {
        Self {
            id: next_message_id(),
            role: Role::User,
            content: content.to_string(),
            timestamp: Local::now(),
            profile: None,
            reminders: None,
        }
    }

    fn assistant(reply: &ChatReply) -> Self {
        Self {
            id: next_message_id(),
            role: Role::Assistant,
            content: reply.display_text(),
            timestamp: Local::now(),
            profile: reply.profile.clone(),
            reminders: reply.reminders.clone(),
        }
    }
}

// Session transcript, oldest messages dropped past capacity
struct Transcript {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl Transcript {
    fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn add(&mut self, message: ChatMessage) {
        if self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }
}

enum ChatCommand {
    Ask(String, Sender<ChatMessage>),
    History(Sender<Vec<ChatMessage>>),
}

/// Client half of the Rama chat interface. Owns the HTTP client and the
/// session transcript on a single task; handles are cheap clones.
#[derive(Clone)]
pub struct ChatClient {
    tx: Sender<ChatCommand>,
}

impl ChatClient {
    pub fn new() -> Self {
        let (backend_url, api_token, timeout, capacity) = {
            let settings = config_loader::SETTINGS.read().unwrap();
            (
                settings.backend_url.clone(),
                settings.api_token.clone(),
                Duration::from_secs(settings.request_timeout_secs),
                settings.memory_size,
            )
        };
        Self::with_endpoint(backend_url, api_token, timeout, capacity)
    }

    pub fn with_endpoint(
        backend_url: String,
        api_token: String,
        timeout: Duration,
        capacity: usize,
    ) -> Self {
        let (tx, mut rx) = channel::<ChatCommand>(100);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        let transcript = Arc::new(Mutex::new(Transcript::new(capacity)));

        task::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    ChatCommand::Ask(text, response_tx) => {
                        transcript.lock().unwrap().add(ChatMessage::user(&text));

                        let reply =
                            request_reply(&client, &backend_url, &api_token, &text).await;
                        let message = ChatMessage::assistant(&reply);

                        transcript.lock().unwrap().add(message.clone());
                        let _ = response_tx.send(message).await;
                    }
                    ChatCommand::History(response_tx) => {
                        let snapshot = transcript.lock().unwrap().snapshot();
                        let _ = response_tx.send(snapshot).await;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Send one user message and wait for the assistant's answer. Backend
    /// trouble degrades to a canned apology, never an error.
    pub async fn ask(&self, message: &str) -> ChatMessage {
        let (resp_tx, mut resp_rx) = channel::<ChatMessage>(1);
        let _ = self
            .tx
            .send(ChatCommand::Ask(message.to_string(), resp_tx))
            .await;
        resp_rx
            .recv()
            .await
            .unwrap_or_else(|| ChatMessage::assistant(&ChatReply::offline()))
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        let (resp_tx, mut resp_rx) = channel::<Vec<ChatMessage>>(1);
        let _ = self.tx.send(ChatCommand::History(resp_tx)).await;
        resp_rx.recv().await.unwrap_or_default()
    }
}

impl Default for ChatClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn request_reply(
    client: &Client,
    backend_url: &str,
    api_token: &str,
    message: &str,
) -> ChatReply {
    let url = format!("{}/chat/", backend_url.trim_end_matches('/'));

    let mut request = client.post(&url).json(&json!({ "message": message }));
    if !api_token.is_empty() {
        request = request.bearer_auth(api_token);
    }

    match request.send().await {
        Ok(response) => match response.json::<ChatReply>().await {
            Ok(reply) => reply,
            Err(e) => {
                eprintln!("Chat: failed to parse backend reply: {}", e);
                ChatReply::offline()
            }
        },
        Err(e) => {
            eprintln!("Chat: could not reach backend: {}", e);
            ChatReply::offline()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_text_prefers_reply() {
        let reply = ChatReply {
            reply: Some("Hello there".to_string()),
            ..ChatReply::default()
        };
        assert_eq!(reply.display_text(), "Hello there");
    }

    #[test]
    fn test_display_text_empty_for_payload_only_reply() {
        let reply = ChatReply {
            reply: None,
            profile: Some(ElderProfile::default()),
            reminders: None,
        };
        assert_eq!(reply.display_text(), "");
    }

    #[test]
    fn test_display_text_falls_back_when_reply_is_bare() {
        let reply = ChatReply::default();
        assert_eq!(reply.display_text(), NO_ANSWER_REPLY);
    }

    #[test]
    fn test_reply_payload_parsing() {
        let raw = r#"{
            "reply": "Here is Margaret's profile.",
            "profile": { "name": "Margaret", "age": 81, "notes": "Allergic to penicillin" },
            "reminders": [
                { "medication_name": "Paracetamol", "dosage": "650mg", "send_time": "20:00", "frequency": "daily" }
            ]
        }"#;

        let reply: ChatReply = serde_json::from_str(raw).unwrap();
        let profile = reply.profile.as_ref().unwrap();
        assert_eq!(profile.name.as_deref(), Some("Margaret"));
        assert_eq!(profile.age, Some(81));

        let reminders = reply.reminders.as_ref().unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].medication_name.as_deref(), Some("Paracetamol"));
        assert_eq!(reminders[0].send_time.as_deref(), Some("20:00"));
    }

    #[test]
    fn test_transcript_drops_oldest_past_capacity() {
        let mut transcript = Transcript::new(2);
        transcript.add(ChatMessage::user("one"));
        transcript.add(ChatMessage::user("two"));
        transcript.add(ChatMessage::user("three"));

        let snapshot = transcript.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].content, "two");
        assert_eq!(snapshot[1].content, "three");
    }
}
