//! Defines the WebSocket message protocol between the browser client and the API server.
//!
//! The browser hosts the voice SDK. It relays the SDK's events to the server
//! and executes the SDK commands the server sends back.

use companion_core::{
    assistant::{AssistantConfig, AssistantOverrides},
    call::CallSnapshot,
    voice::{SdkError, VoiceEvent, VoiceMessage},
};
use serde::{Deserialize, Serialize};

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The user pressed "Start Session".
    StartSession,
    /// The user pressed "End Session".
    EndSession,
    /// The user pressed the microphone button.
    ToggleMicrophone,
    /// Relayed `call-start` event.
    CallStart,
    /// Relayed `call-end` event.
    CallEnd,
    /// Relayed `message` event.
    Message { message: VoiceMessage },
    /// Relayed `error` event.
    Error { message: String },
    /// Relayed `speech-start` event.
    SpeechStart,
    /// Relayed `speech-end` event.
    SpeechEnd,
}

impl ClientMessage {
    /// The SDK event this message relays, if it is one.
    pub fn into_event(self) -> Result<VoiceEvent, UserAction> {
        match self {
            ClientMessage::StartSession => Err(UserAction::StartSession),
            ClientMessage::EndSession => Err(UserAction::EndSession),
            ClientMessage::ToggleMicrophone => Err(UserAction::ToggleMicrophone),
            ClientMessage::CallStart => Ok(VoiceEvent::CallStart),
            ClientMessage::CallEnd => Ok(VoiceEvent::CallEnd),
            ClientMessage::Message { message } => Ok(VoiceEvent::Message(message)),
            ClientMessage::Error { message } => Ok(VoiceEvent::Error(SdkError::new(message))),
            ClientMessage::SpeechStart => Ok(VoiceEvent::SpeechStart),
            ClientMessage::SpeechEnd => Ok(VoiceEvent::SpeechEnd),
        }
    }
}

/// A user operation on the call controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    StartSession,
    EndSession,
    ToggleMicrophone,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The observable call state, sent after every processed client message.
    State(CallSnapshot),
    /// Start the SDK call with this assistant.
    SdkStart {
        assistant: AssistantConfig,
        overrides: AssistantOverrides,
    },
    /// Stop the SDK call.
    SdkStop,
    /// Apply this mute flag to the SDK.
    SdkSetMuted { muted: bool },
    /// Reports a rejected or malformed client message.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_core::voice::{Role, TranscriptType};

    #[test]
    fn test_client_message_parsing() {
        let start: ClientMessage = serde_json::from_str(r#"{"type":"start_session"}"#).unwrap();
        assert_eq!(start, ClientMessage::StartSession);

        let relayed: ClientMessage = serde_json::from_str(
            r#"{"type":"message","message":{"type":"transcript","role":"user","transcript":"Hi","transcriptType":"partial"}}"#,
        )
        .unwrap();
        assert_eq!(
            relayed.into_event(),
            Ok(VoiceEvent::Message(VoiceMessage::Transcript {
                role: Role::User,
                transcript: "Hi".to_string(),
                transcript_type: TranscriptType::Partial,
            }))
        );
    }

    #[test]
    fn test_user_actions_are_not_events() {
        assert_eq!(
            ClientMessage::ToggleMicrophone.into_event(),
            Err(UserAction::ToggleMicrophone)
        );
        assert_eq!(
            ClientMessage::Error {
                message: "network".to_string()
            }
            .into_event(),
            Ok(VoiceEvent::Error(SdkError::new("network")))
        );
    }

    #[test]
    fn test_server_message_serialization() {
        let state = serde_json::to_value(ServerMessage::State(CallSnapshot::default())).unwrap();
        assert_eq!(state["type"], "state");
        assert_eq!(state["call_state"], "inactive");
        assert_eq!(state["transcript"], serde_json::json!([]));

        let muted = serde_json::to_string(&ServerMessage::SdkSetMuted { muted: true }).unwrap();
        assert_eq!(muted, r#"{"type":"sdk_set_muted","muted":true}"#);
    }
}
