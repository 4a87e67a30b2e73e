//! Client sync engine for LinkChat.
//!
//! Keeps a local-network chat view in step with the chat service:
//! - Single-flight roster/message polling on a fixed cadence
//! - Idempotent, animate-once message reconciliation
//! - Upload overlays for in-flight file and folder sends
//! - Direct and broadcast send routing
//! - Persisted display names for peer devices

pub mod api_client;
pub mod config;
pub mod engine;
pub mod error;
pub mod messages;
pub mod names;
pub mod remote;
pub mod roster;
pub mod router;
pub mod scheduler;
pub mod session;
pub mod transfer;
pub mod types;
pub mod uploads;
pub mod view;

pub use config::ChatConfig;
pub use engine::{ChatSyncEngine, ChatSyncHandle, create_chat_sync_engine};
pub use error::{ChatError, ChatResult};
pub use remote::ChatRemote;
pub use types::*;
pub use view::ChatView;
