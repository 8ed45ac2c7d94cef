//! Chat messages and the runtime transcript they map onto
//!
//! The last message of a conversation is the current turn and is sent as the
//! prompt; everything before it becomes transcript history.

use serde::{Deserialize, Serialize};

use crate::error::{LocalLmError, Result};

/// Role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    /// Any role this crate does not know about
    #[serde(other)]
    Other,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool result message
    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            name: Some(name.into()),
        }
    }
}

/// One turn of the runtime's conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Instructions(String),
    Prompt(String),
    Response(String),
}

impl TranscriptEntry {
    pub fn text(&self) -> &str {
        match self {
            TranscriptEntry::Instructions(text)
            | TranscriptEntry::Prompt(text)
            | TranscriptEntry::Response(text) => text,
        }
    }
}

impl From<&ChatMessage> for TranscriptEntry {
    fn from(message: &ChatMessage) -> Self {
        let text = message.content.clone();
        match message.role {
            Role::System => TranscriptEntry::Instructions(text),
            Role::Assistant => TranscriptEntry::Response(text),
            Role::User | Role::Tool | Role::Other => TranscriptEntry::Prompt(text),
        }
    }
}

/// A conversation split into history and the current turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub history: Vec<TranscriptEntry>,
    pub prompt: String,
}

/// Convert every message except the last into transcript history, and use
/// the last one as the prompt.
pub fn convert(messages: &[ChatMessage]) -> Result<Conversation> {
    let (current, prior) = messages.split_last().ok_or(LocalLmError::EmptyConversation)?;

    Ok(Conversation {
        history: prior.iter().map(TranscriptEntry::from).collect(),
        prompt: current.content.clone(),
    })
}

/// Parse messages supplied as a JSON array
pub fn parse_messages(json: &str) -> Result<Vec<ChatMessage>> {
    serde_json::from_str(json).map_err(|e| LocalLmError::InvalidInput(format!("malformed messages JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
    }

    #[test]
    fn test_unknown_role_deserializes_as_other() {
        let role: Role = serde_json::from_str("\"developer\"").unwrap();
        assert_eq!(role, Role::Other);
    }

    #[test]
    fn test_convert_maps_roles() {
        let messages = vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello!"),
            ChatMessage::tool("weather", "18C"),
            ChatMessage::new(Role::Other, "note"),
            ChatMessage::user("And tomorrow?"),
        ];

        let conversation = convert(&messages).unwrap();
        assert_eq!(
            conversation.history,
            vec![
                TranscriptEntry::Instructions("Be brief.".to_string()),
                TranscriptEntry::Prompt("Hi".to_string()),
                TranscriptEntry::Response("Hello!".to_string()),
                TranscriptEntry::Prompt("18C".to_string()),
                TranscriptEntry::Prompt("note".to_string()),
            ]
        );
        assert_eq!(conversation.prompt, "And tomorrow?");
    }

    #[test]
    fn test_convert_single_message_has_no_history() {
        let conversation = convert(&[ChatMessage::user("Hi")]).unwrap();
        assert!(conversation.history.is_empty());
        assert_eq!(conversation.prompt, "Hi");
    }

    #[test]
    fn test_convert_empty_is_error() {
        assert!(matches!(convert(&[]), Err(LocalLmError::EmptyConversation)));
    }

    #[test]
    fn test_parse_messages() {
        let messages = parse_messages(
            r#"[{"role": "system", "content": "x"}, {"role": "tool", "content": "y", "name": "clock"}]"#,
        )
        .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].name.as_deref(), Some("clock"));
    }

    #[test]
    fn test_parse_messages_malformed() {
        let err = parse_messages("[{\"role\": \"user\"}]").unwrap_err();
        assert!(matches!(err, LocalLmError::InvalidInput(_)));
    }

    #[test]
    fn test_transcript_entry_serialization() {
        let json = serde_json::to_value(TranscriptEntry::Response("ok".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"type": "response", "text": "ok"}));
        assert_eq!(TranscriptEntry::Prompt("p".to_string()).text(), "p");
    }
}
