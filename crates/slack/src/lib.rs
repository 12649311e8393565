//! Slack interface for requesty.
//!
//! - **Block Kit** (`blocks`) - request cards, lists and help messages
//! - **Slash Commands** (`commands`) - `/request new`, `/request accept`, queue admin
//! - **Events** (`events`) - payload parsing, handlers and dispatch
//! - **Socket Mode** (`socket`, `websocket`) - event loop with reconnection and reply
//!   delivery over an `apps.connections.open` WebSocket
//! - **Web API** (`messenger`) - `chat.postMessage` client behind the core ports
//! - **Signatures** (`signature`) - verification of signed HTTP interactions
//!
//! ```text
//! Slack → SocketModeRunner / HTTP ingress → EventDispatcher → RequestCommandService
//!                                                                   ↓
//!                       response_url ← Block Kit reply ← core services
//! ```

pub mod blocks;
pub mod commands;
pub mod events;
pub mod messenger;
pub mod signature;
pub mod socket;
pub mod websocket;
