//! Assistant Configuration
//!
//! Builds the assistant definition handed to the voice SDK when a session
//! starts. Per-session values (subject, topic, style) are not baked into the
//! definition; they travel as variable values in [`AssistantOverrides`] and
//! are substituted by the SDK into the `{{…}}` placeholders.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Voice used when the `(voice, style)` pair is not in the table.
pub const FALLBACK_VOICE_ID: &str = "sarah";

const VOICES: [(&str, &str, &str); 4] = [
    ("male", "casual", "2BJW5coyhAzSr8STdHbE"),
    ("male", "formal", "c6SfcYrb2t09NHXiT80T"),
    ("female", "casual", "ZIlrSGI4jZqobxRKprJz"),
    ("female", "formal", "sarah"),
];

const FIRST_MESSAGE: &str =
    "Hello, let's start the session. Today we'll be talking about {{topic}}.";

const SYSTEM_PROMPT: &str = "You are a highly knowledgeable tutor teaching a real-time voice session with a student. Your goal is to teach the student about the topic and subject.

Tutor Guidelines:
Stick to the given topic - {{ topic }} and subject - {{ subject }} and teach the student about it.
Keep the conversation flowing smoothly while maintaining control.
From time to time make sure that the student is following you and understands you.
Break down the topic into smaller parts and teach the student one part at a time.
Keep your style of conversation {{ style }}.
Keep your responses short, like in a real voice conversation.
Do not include any special characters in your responses - this is a voice conversation.";

/// Resolves the TTS voice id for a `(voice, style)` pair.
pub fn voice_id(voice: &str, style: &str) -> &'static str {
    VOICES
        .iter()
        .find(|(v, s, _)| v.eq_ignore_ascii_case(voice) && s.eq_ignore_ascii_case(style))
        .map(|(_, _, id)| *id)
        .unwrap_or(FALLBACK_VOICE_ID)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantConfig {
    pub name: String,
    pub first_message: String,
    pub transcriber: TranscriberConfig,
    pub voice: VoiceConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriberConfig {
    pub provider: String,
    pub model: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub provider: String,
    pub voice_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub speed: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    pub messages: Vec<PromptMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

/// Builds the assistant definition for a companion's voice and style.
pub fn configure_assistant(voice: &str, style: &str) -> AssistantConfig {
    AssistantConfig {
        name: "Companion".to_string(),
        first_message: FIRST_MESSAGE.to_string(),
        transcriber: TranscriberConfig {
            provider: "deepgram".to_string(),
            model: "nova-3".to_string(),
            language: "en".to_string(),
        },
        voice: VoiceConfig {
            provider: "11labs".to_string(),
            voice_id: voice_id(voice, style).to_string(),
            stability: 0.4,
            similarity_boost: 0.8,
            speed: 1.0,
            style: 0.5,
            use_speaker_boost: true,
        },
        model: ModelConfig {
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            messages: vec![PromptMessage {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            }],
        },
    }
}

/// Per-call overrides sent alongside the assistant definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantOverrides {
    pub variable_values: BTreeMap<String, String>,
    pub client_messages: Vec<String>,
    pub server_messages: Vec<String>,
}

impl AssistantOverrides {
    /// Overrides for a tutoring session: the session variables, transcript
    /// messages delivered to the client, nothing delivered to a server.
    pub fn for_session(subject: &str, topic: &str, style: &str) -> Self {
        let variable_values = [("subject", subject), ("topic", topic), ("style", style)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            variable_values,
            client_messages: vec!["transcript".to_string()],
            server_messages: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_table() {
        assert_eq!(voice_id("male", "casual"), "2BJW5coyhAzSr8STdHbE");
        assert_eq!(voice_id("Female", "FORMAL"), "sarah");
        assert_eq!(voice_id("robot", "casual"), FALLBACK_VOICE_ID);
    }

    #[test]
    fn test_configure_assistant_uses_voice_and_placeholders() {
        let config = configure_assistant("female", "casual");
        assert_eq!(config.voice.voice_id, "ZIlrSGI4jZqobxRKprJz");
        assert!(config.first_message.contains("{{topic}}"));
        assert!(config.model.messages[0].content.contains("{{ subject }}"));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["firstMessage"], config.first_message);
        assert_eq!(json["voice"]["voiceId"], "ZIlrSGI4jZqobxRKprJz");
    }

    #[test]
    fn test_session_overrides() {
        let overrides = AssistantOverrides::for_session("maths", "Fractions", "casual");
        assert_eq!(overrides.variable_values["topic"], "Fractions");
        assert_eq!(overrides.client_messages, vec!["transcript"]);
        assert!(overrides.server_messages.is_empty());

        let json = serde_json::to_value(&overrides).unwrap();
        assert_eq!(json["variableValues"]["subject"], "maths");
        assert_eq!(json["serverMessages"], serde_json::json!([]));
    }
}
