//! Voice SDK Seam
//!
//! The real-time voice assistant is an external SDK that emits events on six
//! named channels and accepts start/stop/mute commands. This module types
//! those channels, their payloads and their handlers, and provides
//! [`EventHub`], a listener registry concrete clients can build on.

use crate::assistant::{AssistantConfig, AssistantOverrides};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};
use thiserror::Error;

/// The named event streams exposed by the voice SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceChannel {
    CallStart,
    CallEnd,
    Message,
    Error,
    SpeechStart,
    SpeechEnd,
}

impl VoiceChannel {
    pub const ALL: [VoiceChannel; 6] = [
        VoiceChannel::CallStart,
        VoiceChannel::CallEnd,
        VoiceChannel::Message,
        VoiceChannel::Error,
        VoiceChannel::SpeechStart,
        VoiceChannel::SpeechEnd,
    ];

    /// The SDK's event name for this channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceChannel::CallStart => "call-start",
            VoiceChannel::CallEnd => "call-end",
            VoiceChannel::Message => "message",
            VoiceChannel::Error => "error",
            VoiceChannel::SpeechStart => "speech-start",
            VoiceChannel::SpeechEnd => "speech-end",
        }
    }
}

impl fmt::Display for VoiceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speaker of a transcript segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Whether a transcript segment is settled or may still change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptType {
    Final,
    Partial,
}

/// A payload on the `message` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum VoiceMessage {
    Transcript {
        role: Role,
        transcript: String,
        #[serde(rename = "transcriptType")]
        transcript_type: TranscriptType,
    },
    /// Any message type the call controller does not consume.
    #[serde(other)]
    Other,
}

/// An error reported by the SDK (audio, network, permissions).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("voice SDK error: {message}")]
pub struct SdkError {
    pub message: String,
}

impl SdkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One event emitted by the SDK.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    CallStart,
    CallEnd,
    Message(VoiceMessage),
    Error(SdkError),
    SpeechStart,
    SpeechEnd,
}

impl VoiceEvent {
    pub fn channel(&self) -> VoiceChannel {
        match self {
            VoiceEvent::CallStart => VoiceChannel::CallStart,
            VoiceEvent::CallEnd => VoiceChannel::CallEnd,
            VoiceEvent::Message(_) => VoiceChannel::Message,
            VoiceEvent::Error(_) => VoiceChannel::Error,
            VoiceEvent::SpeechStart => VoiceChannel::SpeechStart,
            VoiceEvent::SpeechEnd => VoiceChannel::SpeechEnd,
        }
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

/// A typed handler; the variant fixes the channel it listens on.
#[derive(Clone)]
pub enum VoiceHandler {
    CallStart(Callback),
    CallEnd(Callback),
    Message(Arc<dyn Fn(&VoiceMessage) + Send + Sync>),
    Error(Arc<dyn Fn(&SdkError) + Send + Sync>),
    SpeechStart(Callback),
    SpeechEnd(Callback),
}

impl VoiceHandler {
    pub fn channel(&self) -> VoiceChannel {
        match self {
            VoiceHandler::CallStart(_) => VoiceChannel::CallStart,
            VoiceHandler::CallEnd(_) => VoiceChannel::CallEnd,
            VoiceHandler::Message(_) => VoiceChannel::Message,
            VoiceHandler::Error(_) => VoiceChannel::Error,
            VoiceHandler::SpeechStart(_) => VoiceChannel::SpeechStart,
            VoiceHandler::SpeechEnd(_) => VoiceChannel::SpeechEnd,
        }
    }

    /// Calls the handler if `event` belongs to its channel.
    pub fn dispatch(&self, event: &VoiceEvent) {
        match (self, event) {
            (VoiceHandler::CallStart(f), VoiceEvent::CallStart)
            | (VoiceHandler::CallEnd(f), VoiceEvent::CallEnd)
            | (VoiceHandler::SpeechStart(f), VoiceEvent::SpeechStart)
            | (VoiceHandler::SpeechEnd(f), VoiceEvent::SpeechEnd) => f(),
            (VoiceHandler::Message(f), VoiceEvent::Message(message)) => f(message),
            (VoiceHandler::Error(f), VoiceEvent::Error(error)) => f(error),
            _ => {}
        }
    }
}

impl fmt::Debug for VoiceHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VoiceHandler({})", self.channel())
    }
}

/// Identifies one registration on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The control surface and event source of a real-time voice assistant.
pub trait VoiceClient: Send + Sync {
    /// Registers `handler` on its channel.
    fn on(&self, handler: VoiceHandler) -> ListenerId;

    /// Removes a registration. Returns `false` if it was not present.
    fn off(&self, channel: VoiceChannel, id: ListenerId) -> bool;

    /// Starts a call with the given assistant.
    fn start(&self, assistant: &AssistantConfig, overrides: &AssistantOverrides);

    /// Hangs up the current call.
    fn stop(&self);

    fn is_muted(&self) -> bool;

    fn set_muted(&self, muted: bool);
}

/// A registry of typed handlers keyed by channel.
#[derive(Default)]
pub struct EventHub {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<VoiceChannel, Vec<(ListenerId, VoiceHandler)>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<VoiceChannel, Vec<(ListenerId, VoiceHandler)>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn on(&self, handler: VoiceHandler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(handler.channel())
            .or_default()
            .push((id, handler));
        id
    }

    pub fn off(&self, channel: VoiceChannel, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let Some(registered) = listeners.get_mut(&channel) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|(listener, _)| *listener != id);
        before != registered.len()
    }

    /// Delivers `event` to every handler on its channel, in registration
    /// order, and returns how many were called.
    ///
    /// Handlers run after the registry lock is released, so they may register
    /// or remove listeners themselves.
    pub fn emit(&self, event: &VoiceEvent) -> usize {
        let handlers: Vec<VoiceHandler> = self
            .lock()
            .get(&event.channel())
            .map(|registered| registered.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler.dispatch(event);
        }
        handlers.len()
    }

    /// Total registrations across all channels.
    pub fn listener_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }
}
