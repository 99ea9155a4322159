//! A [`VoiceClient`] whose SDK runs in the browser.
//!
//! Commands are queued for the WebSocket session to forward; events relayed by
//! the browser are delivered to the registered handlers with [`RelayVoiceClient::deliver`].

use companion_core::{
    assistant::{AssistantConfig, AssistantOverrides},
    voice::{EventHub, ListenerId, VoiceChannel, VoiceClient, VoiceEvent, VoiceHandler},
};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::warn;

use super::protocol::ServerMessage;

/// A command for the browser-side SDK.
#[derive(Debug, Clone, PartialEq)]
pub enum SdkCommand {
    Start {
        assistant: AssistantConfig,
        overrides: AssistantOverrides,
    },
    Stop,
    SetMuted(bool),
}

impl From<SdkCommand> for ServerMessage {
    fn from(command: SdkCommand) -> Self {
        match command {
            SdkCommand::Start {
                assistant,
                overrides,
            } => ServerMessage::SdkStart {
                assistant,
                overrides,
            },
            SdkCommand::Stop => ServerMessage::SdkStop,
            SdkCommand::SetMuted(muted) => ServerMessage::SdkSetMuted { muted },
        }
    }
}

pub struct RelayVoiceClient {
    hub: EventHub,
    muted: AtomicBool,
    commands: mpsc::UnboundedSender<SdkCommand>,
}

impl RelayVoiceClient {
    /// Creates the client and the receiving end of its command queue.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SdkCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let client = Self {
            hub: EventHub::new(),
            muted: AtomicBool::new(false),
            commands,
        };
        (client, rx)
    }

    /// Hands a relayed SDK event to the registered handlers.
    pub fn deliver(&self, event: &VoiceEvent) -> usize {
        self.hub.emit(event)
    }

    pub fn listener_count(&self) -> usize {
        self.hub.listener_count()
    }

    fn send(&self, command: SdkCommand) {
        if self.commands.send(command).is_err() {
            warn!("SDK command dropped: WebSocket session is gone");
        }
    }
}

impl VoiceClient for RelayVoiceClient {
    fn on(&self, handler: VoiceHandler) -> ListenerId {
        self.hub.on(handler)
    }

    fn off(&self, channel: VoiceChannel, id: ListenerId) -> bool {
        self.hub.off(channel, id)
    }

    fn start(&self, assistant: &AssistantConfig, overrides: &AssistantOverrides) {
        self.send(SdkCommand::Start {
            assistant: assistant.clone(),
            overrides: overrides.clone(),
        });
    }

    fn stop(&self) {
        self.send(SdkCommand::Stop);
    }

    /// The last mute flag applied through this client.
    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
        self.send(SdkCommand::SetMuted(muted));
    }
}
