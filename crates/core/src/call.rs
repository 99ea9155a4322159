//! Call Session Controller
//!
//! Owns the lifecycle of one voice call with a companion: the connection
//! state, the speaking and mute indicators, and the transcript. The state is
//! driven by user operations on the controller and by events the voice SDK
//! emits on its six channels.
//!
//! The controller registers one handler per channel when it is attached and
//! holds them as a single [`Subscriptions`] guard, so all six are released
//! together when the controller is dropped.

use crate::{
    assistant::{AssistantOverrides, configure_assistant},
    voice::{
        ListenerId, Role, SdkError, TranscriptType, VoiceChannel, VoiceClient, VoiceHandler,
        VoiceMessage,
    },
};
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    #[default]
    Inactive,
    Connecting,
    Active,
    Finished,
}

impl CallState {
    /// Whether a new session may be started from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, CallState::Inactive | CallState::Finished)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Inactive => "inactive",
            CallState::Connecting => "connecting",
            CallState::Active => "active",
            CallState::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// One finalized transcript segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("cannot {action} while the call is {from}")]
    InvalidTransition { from: CallState, action: &'static str },
}

/// Records that a session with a companion took place.
///
/// Called from the call-end handler; implementations must not block.
#[cfg_attr(test, mockall::automock)]
pub trait SessionHistory: Send + Sync {
    fn record_session(&self, companion_id: Uuid) -> anyhow::Result<()>;
}

/// What the controller needs to know about the companion it is calling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallProfile {
    pub companion_id: Uuid,
    pub subject: String,
    pub topic: String,
    pub style: String,
    pub voice: String,
}

/// The observable state of a call, newest transcript entry first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct CallSnapshot {
    pub call_state: CallState,
    pub is_speaking: bool,
    pub is_muted: bool,
    pub transcript: Vec<TranscriptEntry>,
}

#[derive(Debug, Default)]
struct CallStatus {
    call_state: CallState,
    is_speaking: bool,
    is_muted: bool,
    transcript: VecDeque<TranscriptEntry>,
}

#[derive(Clone, Default)]
struct SharedStatus(Arc<Mutex<CallStatus>>);

impl SharedStatus {
    fn lock(&self) -> MutexGuard<'_, CallStatus> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One handler for each SDK channel.
pub struct CallHandlers {
    pub on_call_start: Arc<dyn Fn() + Send + Sync>,
    pub on_call_end: Arc<dyn Fn() + Send + Sync>,
    pub on_message: Arc<dyn Fn(&VoiceMessage) + Send + Sync>,
    pub on_error: Arc<dyn Fn(&SdkError) + Send + Sync>,
    pub on_speech_start: Arc<dyn Fn() + Send + Sync>,
    pub on_speech_end: Arc<dyn Fn() + Send + Sync>,
}

impl CallHandlers {
    fn into_handlers(self) -> [VoiceHandler; 6] {
        [
            VoiceHandler::CallStart(self.on_call_start),
            VoiceHandler::CallEnd(self.on_call_end),
            VoiceHandler::Message(self.on_message),
            VoiceHandler::Error(self.on_error),
            VoiceHandler::SpeechStart(self.on_speech_start),
            VoiceHandler::SpeechEnd(self.on_speech_end),
        ]
    }
}

/// The six registrations of a [`CallHandlers`] set, released together on drop.
pub struct Subscriptions {
    client: Arc<dyn VoiceClient>,
    registrations: Vec<(VoiceChannel, ListenerId)>,
}

impl Subscriptions {
    pub fn acquire(client: Arc<dyn VoiceClient>, handlers: CallHandlers) -> Self {
        let registrations = handlers
            .into_handlers()
            .into_iter()
            .map(|handler| {
                let channel = handler.channel();
                (channel, client.on(handler))
            })
            .collect();
        Self {
            client,
            registrations,
        }
    }

    pub fn channels(&self) -> impl Iterator<Item = VoiceChannel> + '_ {
        self.registrations.iter().map(|(channel, _)| *channel)
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        for (channel, id) in self.registrations.drain(..) {
            if !self.client.off(channel, id) {
                warn!(%channel, "Voice listener was already removed");
            }
        }
    }
}

/// Drives one voice call with a companion.
pub struct CallSessionController {
    profile: CallProfile,
    client: Arc<dyn VoiceClient>,
    status: SharedStatus,
    _subscriptions: Subscriptions,
}

impl CallSessionController {
    /// Subscribes to the SDK's channels and returns an inactive controller.
    pub fn attach(
        profile: CallProfile,
        client: Arc<dyn VoiceClient>,
        history: Arc<dyn SessionHistory>,
    ) -> Self {
        let status = SharedStatus::default();
        let handlers = Self::handlers(&status, profile.companion_id, history);
        let subscriptions = Subscriptions::acquire(client.clone(), handlers);
        info!(companion_id = %profile.companion_id, "Call controller attached");

        Self {
            profile,
            client,
            status,
            _subscriptions: subscriptions,
        }
    }

    fn handlers(
        status: &SharedStatus,
        companion_id: Uuid,
        history: Arc<dyn SessionHistory>,
    ) -> CallHandlers {
        let on_call_start = {
            let status = status.clone();
            Arc::new(move || {
                let mut s = status.lock();
                s.call_state = CallState::Active;
                s.is_speaking = false;
                info!(%companion_id, "Call started");
            })
        };

        let on_call_end = {
            let status = status.clone();
            Arc::new(move || {
                {
                    let mut s = status.lock();
                    s.call_state = CallState::Finished;
                    s.is_speaking = false;
                }
                info!(%companion_id, "Call ended");
                if let Err(e) = history.record_session(companion_id) {
                    warn!(%companion_id, error = ?e, "Failed to record session history");
                }
            })
        };

        let on_message = {
            let status = status.clone();
            Arc::new(move |message: &VoiceMessage| {
                if let VoiceMessage::Transcript {
                    role,
                    transcript,
                    transcript_type: TranscriptType::Final,
                } = message
                {
                    status.lock().transcript.push_front(TranscriptEntry {
                        role: *role,
                        content: transcript.clone(),
                    });
                }
            })
        };

        // TODO: a call stuck in Connecting has no exit on error or timeout;
        // needs an agreed timeout value before one is added here.
        let on_error = Arc::new(move |e: &SdkError| {
            error!(%companion_id, error = %e, "Voice SDK reported an error");
        });

        let on_speech_start = {
            let status = status.clone();
            Arc::new(move || status.lock().is_speaking = true)
        };

        let on_speech_end = {
            let status = status.clone();
            Arc::new(move || status.lock().is_speaking = false)
        };

        CallHandlers {
            on_call_start,
            on_call_end,
            on_message,
            on_error,
            on_speech_start,
            on_speech_end,
        }
    }

    pub fn profile(&self) -> &CallProfile {
        &self.profile
    }

    /// Starts a call from `Inactive` or `Finished`.
    ///
    /// The state moves to `Connecting`; the SDK's call-start event makes it
    /// `Active`.
    pub fn start_session(&self) -> Result<(), CallError> {
        {
            let mut s = self.status.lock();
            if !s.call_state.can_start() {
                return Err(CallError::InvalidTransition {
                    from: s.call_state,
                    action: "start a session",
                });
            }
            s.call_state = CallState::Connecting;
        }

        let p = &self.profile;
        let assistant = configure_assistant(&p.voice, &p.style);
        let overrides = AssistantOverrides::for_session(&p.subject, &p.topic, &p.style);
        info!(companion_id = %p.companion_id, voice_id = %assistant.voice.voice_id, "Starting call");
        self.client.start(&assistant, &overrides);
        Ok(())
    }

    /// Hangs up. Allowed from any state.
    pub fn end_session(&self) {
        {
            let mut s = self.status.lock();
            s.call_state = CallState::Finished;
            s.is_speaking = false;
        }
        info!(companion_id = %self.profile.companion_id, "Stopping call");
        self.client.stop();
    }

    /// Inverts the SDK's mute flag while the call is active and returns the
    /// resulting local mute state. Does nothing in any other state.
    pub fn toggle_microphone(&self) -> bool {
        {
            let s = self.status.lock();
            if s.call_state != CallState::Active {
                return s.is_muted;
            }
        }
        let muted = !self.client.is_muted();
        self.client.set_muted(muted);
        self.status.lock().is_muted = muted;
        muted
    }

    pub fn call_state(&self) -> CallState {
        self.status.lock().call_state
    }

    pub fn snapshot(&self) -> CallSnapshot {
        let s = self.status.lock();
        CallSnapshot {
            call_state: s.call_state,
            is_speaking: s.is_speaking,
            is_muted: s.is_muted,
            transcript: s.transcript.iter().cloned().collect(),
        }
    }
}
