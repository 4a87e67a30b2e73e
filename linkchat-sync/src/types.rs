//! Shared types for chat sync operations.

use crate::error::{ChatError, ChatResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Link-layer broadcast address the network backend uses for group delivery.
pub const BROADCAST_DEVICE_ID: &str = "ff:ff:ff:ff:ff:ff";

/// Label shown for peers without a display name.
pub const UNKNOWN_PEER_LABEL: &str = "Unknown";

/// Stable identifier of a peer device (its MAC address on the wire).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn broadcast() -> Self {
        Self(BROADCAST_DEVICE_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        self.0.eq_ignore_ascii_case(BROADCAST_DEVICE_ID)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Presence status reported for a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    Listening,
    Writing,
    Online,
    Offline,
}

impl PeerStatus {
    /// Parses the wire status. A missing or unrecognised value reads as `Listening`.
    pub fn from_wire(status: Option<&str>) -> Self {
        match status.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("writing") => PeerStatus::Writing,
            Some("online") => PeerStatus::Online,
            Some("offline") => PeerStatus::Offline,
            _ => PeerStatus::Listening,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PeerStatus::Listening => "listening",
            PeerStatus::Writing => "writing",
            PeerStatus::Online => "online",
            PeerStatus::Offline => "offline",
        }
    }

    /// Whether a text message may be sent to a peer in this state.
    pub fn accepts_messages(&self) -> bool {
        matches!(self, PeerStatus::Listening | PeerStatus::Online)
    }

    pub fn is_reachable(&self) -> bool {
        !matches!(self, PeerStatus::Offline)
    }
}

impl fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A peer record as returned by `GET /get_users`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerRecord {
    #[serde(rename = "mac", alias = "id")]
    pub id: DeviceId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// A peer in the local roster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    pub id: DeviceId,
    pub display_name: Option<String>,
    pub status: PeerStatus,
    pub reachable: bool,
}

impl Peer {
    pub fn from_record(record: PeerRecord) -> Self {
        let status = PeerStatus::from_wire(record.status.as_deref());
        Self {
            id: record.id,
            display_name: record.name.filter(|n| !n.trim().is_empty()),
            status,
            reachable: status.is_reachable(),
        }
    }

    /// Display name, or the "Unknown" placeholder.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(UNKNOWN_PEER_LABEL)
    }
}

/// Identifies a conversation: one peer, or everybody.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationId {
    Direct(DeviceId),
    Broadcast,
}

impl ConversationId {
    /// Maps the broadcast sentinel to `Broadcast`, anything else to `Direct`.
    pub fn for_device(id: DeviceId) -> Self {
        if id.is_broadcast() {
            ConversationId::Broadcast
        } else {
            ConversationId::Direct(id)
        }
    }

    pub fn peer(&self) -> Option<&DeviceId> {
        match self {
            ConversationId::Direct(id) => Some(id),
            ConversationId::Broadcast => None,
        }
    }
}

/// A message record as returned by `GET /get_messages/{peer}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub sender: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Text prefix the service uses for file messages.
pub const FILE_TEXT_PREFIX: &str = "[ARCHIVO]";

/// Who wrote a message, relative to this device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sender {
    Local,
    Peer(DeviceId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    File,
    Folder,
}

/// A persisted message. Immutable once fetched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    pub kind: MessageKind,
    pub text: Option<String>,
    pub filename: Option<String>,
    pub timestamp_display: Option<String>,
}

impl Message {
    pub fn from_record(record: MessageRecord, local: &DeviceId) -> Self {
        let sender = if record.sender == "me" || record.sender.eq_ignore_ascii_case(local.as_str())
        {
            Sender::Local
        } else {
            Sender::Peer(DeviceId::new(record.sender))
        };

        let prefixed_name = record
            .text
            .as_deref()
            .and_then(|t| t.strip_prefix(FILE_TEXT_PREFIX))
            .map(str::to_string);

        let kind = match record.kind.as_deref() {
            Some("file") => MessageKind::File,
            Some("folder") => MessageKind::Folder,
            _ if prefixed_name.is_some() => MessageKind::File,
            _ => MessageKind::Text,
        };

        let filename = match kind {
            MessageKind::Text => record.filename,
            _ => record.filename.or(prefixed_name),
        };

        Self {
            id: record.id,
            sender,
            kind,
            text: record.text,
            filename,
            timestamp_display: record.timestamp,
        }
    }
}

/// The service's reply to a send. Folder sends answer with `ok` instead of `success`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SendResponse {
    #[serde(default, alias = "ok")]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl SendResponse {
    pub fn into_result(self) -> ChatResult<()> {
        if self.success {
            Ok(())
        } else {
            Err(ChatError::Rejected(
                self.error.unwrap_or_else(|| "rejected by server".to_string()),
            ))
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    File,
    Folder,
}

/// Client-generated identifier of an in-flight upload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UploadId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// An outbound transfer between "send initiated" and "send completed/failed".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadTask {
    pub id: UploadId,
    pub kind: UploadKind,
    pub label: String,
    pub started_at: DateTime<Utc>,
}

/// One file of a folder send, addressed by its path relative to the folder's parent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderFile {
    pub relative_path: String,
    pub bytes: Vec<u8>,
}

/// Outcome of a (possibly fanned-out) send.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendReport {
    pub attempted: usize,
    pub accepted: usize,
    pub failures: Vec<(DeviceId, String)>,
}

impl SendReport {
    pub fn all_accepted(&self) -> bool {
        self.attempted > 0 && self.accepted == self.attempted
    }
}

/// Chat sync status reported to the host.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatSyncStatus {
    pub is_polling: bool,
    pub roster_size: usize,
    pub open_conversation: Option<ConversationId>,
    pub pending_uploads: usize,
    pub last_poll_at: Option<DateTime<Utc>>,
}
