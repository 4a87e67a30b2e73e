//! View projection.
//!
//! The host view layer implements [`ChatView`]. The engine never reads the
//! view back; everything it renders is derived from session state, and
//! message/overlay elements are addressed by [`ElementHandle`].

use crate::types::{ConversationId, DeviceId, PeerStatus, UploadId, UploadKind};
use std::fmt;

/// Opaque handle of a rendered message or overlay element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle(u64);

/// Hands out unique element handles for the lifetime of a session.
#[derive(Debug, Default)]
pub struct HandleArena {
    next: u64,
}

impl HandleArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> ElementHandle {
        self.next += 1;
        ElementHandle(self.next)
    }
}

/// One row of the roster list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RosterEntry {
    pub device_id: DeviceId,
    /// Display name, or "Unknown".
    pub label: String,
    /// Raw device id, shown only when no name is assigned.
    pub raw_id: Option<DeviceId>,
    pub status: PeerStatus,
    pub offline: bool,
    pub selected: bool,
}

/// Header of the open conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationHeader {
    pub conversation: ConversationId,
    pub title: String,
    pub status: Option<PeerStatus>,
    pub input_enabled: bool,
}

/// Which side of the conversation an element is drawn on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Mine,
    Theirs,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElementBody {
    Text(String),
    /// Downloadable through the message id.
    File { filename: String },
    Folder { name: String },
}

/// A materialized persisted message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageElement {
    pub message_id: String,
    pub side: Side,
    pub body: ElementBody,
    pub timestamp: Option<String>,
}

/// How a newly appended message element should appear.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Play the entrance animation.
    Enter,
    /// Show in final state.
    Immediate,
}

/// An in-flight upload entry drawn after the persisted messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlayEntry {
    pub upload_id: UploadId,
    pub kind: UploadKind,
    pub label: String,
    pub busy: bool,
}

/// User-visible notices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    PeerNotListening { peer: String },
    NoConversation,
    BroadcastFolderUnsupported,
    EmptyFolder { name: String },
    SendFailed { reason: String },
    UploadFailed { label: String, reason: String },
    BroadcastSummary { accepted: usize, attempted: usize },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::PeerNotListening { peer } => write!(f, "{peer} is not listening right now."),
            Notice::NoConversation => f.write_str("Select a conversation first."),
            Notice::BroadcastFolderUnsupported => {
                f.write_str("Folders can only be sent to a single peer.")
            }
            Notice::EmptyFolder { name } => write!(f, "Folder {name} has no files to send."),
            Notice::SendFailed { reason } => write!(f, "Send failed: {reason}"),
            Notice::UploadFailed { label, reason } => write!(f, "Could not send {label}: {reason}"),
            Notice::BroadcastSummary {
                accepted,
                attempted,
            } => write!(f, "Message delivered to {accepted} of {attempted} peers."),
        }
    }
}

/// The hosting view layer.
pub trait ChatView: Send {
    fn render_roster(&mut self, entries: &[RosterEntry]);

    fn render_header(&mut self, header: Option<&ConversationHeader>);

    /// Appends a message element at the end of the message area.
    fn append_message(&mut self, handle: ElementHandle, element: &MessageElement, transition: Transition);

    /// Appends an upload overlay entry at the end of the message area.
    fn append_overlay(&mut self, handle: ElementHandle, entry: &OverlayEntry);

    /// Takes an element out of the message area, keeping it for `reattach`.
    fn detach(&mut self, handle: ElementHandle);

    /// Puts a detached element back at the end of the message area.
    fn reattach(&mut self, handle: ElementHandle);

    fn remove(&mut self, handle: ElementHandle);

    fn notify(&mut self, notice: &Notice);
}

/// A view that renders nothing, for headless hosts.
#[derive(Debug, Default)]
pub struct NullView;

impl ChatView for NullView {
    fn render_roster(&mut self, _entries: &[RosterEntry]) {}
    fn render_header(&mut self, _header: Option<&ConversationHeader>) {}
    fn append_message(&mut self, _handle: ElementHandle, _element: &MessageElement, _transition: Transition) {}
    fn append_overlay(&mut self, _handle: ElementHandle, _entry: &OverlayEntry) {}
    fn detach(&mut self, _handle: ElementHandle) {}
    fn reattach(&mut self, _handle: ElementHandle) {}
    fn remove(&mut self, _handle: ElementHandle) {}
    fn notify(&mut self, _notice: &Notice) {}
}
