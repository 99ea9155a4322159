//! Call Sessions over WebSockets
//!
//! The browser hosts the voice SDK; the server runs the call controller. The
//! module is split into:
//!
//! - `protocol`: the JSON messages exchanged with the browser.
//! - `relay`: a `VoiceClient` that forwards SDK commands to the browser and
//!   dispatches the events it relays back.
//! - `session`: the WebSocket connection lifecycle.

pub mod protocol;
pub mod relay;
pub mod session;

pub use session::ws_handler;
