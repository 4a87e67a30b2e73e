//! Shared test helpers: a recording view and a scripted remote.
#![allow(dead_code)]

use async_trait::async_trait;
use linkchat_sync::view::{
    ChatView, ConversationHeader, ElementHandle, MessageElement, Notice, OverlayEntry, RosterEntry,
    Transition,
};
use linkchat_sync::{
    ChatError, ChatRemote, ChatResult, DeviceId, FolderFile, MessageRecord, PeerRecord,
    SendResponse,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

/// Routes engine logs to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("linkchat_sync=debug")),
        )
        .with_test_writer()
        .try_init();
}

// ── Recording view ──────────────────────────────────────────────

/// Message-area mutations, in call order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewOp {
    Append {
        handle: ElementHandle,
        message_id: String,
        transition: Transition,
    },
    Overlay {
        handle: ElementHandle,
        label: String,
    },
    Detach(ElementHandle),
    Reattach(ElementHandle),
    Remove(ElementHandle),
}

#[derive(Debug, Default)]
pub struct ViewLog {
    pub ops: Vec<ViewOp>,
    pub roster: Vec<RosterEntry>,
    pub roster_renders: usize,
    pub header: Option<ConversationHeader>,
    pub notices: Vec<Notice>,
    /// Simulated message area, in display order.
    area: Vec<ElementHandle>,
    detached: Vec<ElementHandle>,
    names: HashMap<ElementHandle, String>,
}

impl ViewLog {
    pub fn mutation_count(&self) -> usize {
        self.ops.len()
    }

    /// Message ids and `upload:<label>` overlay names, in display order.
    pub fn area(&self) -> Vec<String> {
        self.area
            .iter()
            .filter_map(|h| self.names.get(h).cloned())
            .collect()
    }

    pub fn transitions_for(&self, message_id: &str) -> Vec<Transition> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                ViewOp::Append {
                    message_id: id,
                    transition,
                    ..
                } if id == message_id => Some(*transition),
                _ => None,
            })
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct RecordingView {
    log: Arc<Mutex<ViewLog>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> MutexGuard<'_, ViewLog> {
        self.log.lock().unwrap()
    }
}

impl ChatView for RecordingView {
    fn render_roster(&mut self, entries: &[RosterEntry]) {
        let mut log = self.log();
        log.roster = entries.to_vec();
        log.roster_renders += 1;
    }

    fn render_header(&mut self, header: Option<&ConversationHeader>) {
        self.log().header = header.cloned();
    }

    fn append_message(&mut self, handle: ElementHandle, element: &MessageElement, transition: Transition) {
        let mut log = self.log();
        log.ops.push(ViewOp::Append {
            handle,
            message_id: element.message_id.clone(),
            transition,
        });
        log.area.push(handle);
        log.names.insert(handle, element.message_id.clone());
    }

    fn append_overlay(&mut self, handle: ElementHandle, entry: &OverlayEntry) {
        let mut log = self.log();
        log.ops.push(ViewOp::Overlay {
            handle,
            label: entry.label.clone(),
        });
        log.area.push(handle);
        log.names.insert(handle, format!("upload:{}", entry.label));
    }

    fn detach(&mut self, handle: ElementHandle) {
        let mut log = self.log();
        log.ops.push(ViewOp::Detach(handle));
        log.area.retain(|h| *h != handle);
        log.detached.push(handle);
    }

    fn reattach(&mut self, handle: ElementHandle) {
        let mut log = self.log();
        log.ops.push(ViewOp::Reattach(handle));
        log.detached.retain(|h| *h != handle);
        log.area.push(handle);
    }

    fn remove(&mut self, handle: ElementHandle) {
        let mut log = self.log();
        log.ops.push(ViewOp::Remove(handle));
        log.area.retain(|h| *h != handle);
        log.detached.retain(|h| *h != handle);
        log.names.remove(&handle);
    }

    fn notify(&mut self, notice: &Notice) {
        self.log().notices.push(notice.clone());
    }
}

// ── Records ─────────────────────────────────────────────────────

pub fn peer(id: &str, name: Option<&str>, status: &str) -> PeerRecord {
    PeerRecord {
        id: id.into(),
        name: name.map(str::to_string),
        status: Some(status.to_string()),
    }
}

pub fn msg(id: &str, sender: &str, text: &str) -> MessageRecord {
    MessageRecord {
        id: id.to_string(),
        sender: sender.to_string(),
        text: Some(text.to_string()),
        kind: None,
        filename: None,
        timestamp: Some("12:00".to_string()),
    }
}

// ── Mock remote ─────────────────────────────────────────────────

/// What the mock was asked to send, in call order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Text { peer: DeviceId, text: String },
    File { peer: DeviceId, filename: String },
    Folder { peer: DeviceId, paths: Vec<String> },
}

#[derive(Default)]
pub struct MockRemote {
    peers: Mutex<Vec<PeerRecord>>,
    messages: Mutex<HashMap<DeviceId, Vec<MessageRecord>>>,
    failing_peers: Mutex<HashSet<DeviceId>>,
    fail_roster: AtomicBool,
    /// When set, each roster fetch waits for one permit.
    roster_permits: Option<Semaphore>,
    pub peer_fetches: AtomicUsize,
    pub message_fetches: AtomicUsize,
    pub sent: Mutex<Vec<Sent>>,
}

impl MockRemote {
    pub fn new(peers: Vec<PeerRecord>) -> Self {
        Self {
            peers: Mutex::new(peers),
            ..Self::default()
        }
    }

    /// Roster fetches block until [`Self::release_roster`] is called.
    pub fn with_held_roster(mut self) -> Self {
        self.roster_permits = Some(Semaphore::new(0));
        self
    }

    pub fn release_roster(&self, fetches: usize) {
        if let Some(permits) = &self.roster_permits {
            permits.add_permits(fetches);
        }
    }

    pub fn set_peers(&self, peers: Vec<PeerRecord>) {
        *self.peers.lock().unwrap() = peers;
    }

    pub fn set_messages(&self, peer: &str, messages: Vec<MessageRecord>) {
        self.messages.lock().unwrap().insert(peer.into(), messages);
    }

    pub fn fail_sends_to(&self, peer: &str) {
        self.failing_peers.lock().unwrap().insert(peer.into());
    }

    pub fn fail_roster(&self, fail: bool) {
        self.fail_roster.store(fail, Ordering::SeqCst);
    }

    pub fn peer_fetches(&self) -> usize {
        self.peer_fetches.load(Ordering::SeqCst)
    }

    pub fn message_fetches(&self) -> usize {
        self.message_fetches.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn reply_for(&self, peer: &DeviceId) -> SendResponse {
        if self.failing_peers.lock().unwrap().contains(peer) {
            SendResponse {
                success: false,
                error: Some(format!("{peer} unreachable")),
                filename: None,
            }
        } else {
            SendResponse {
                success: true,
                error: None,
                filename: None,
            }
        }
    }
}

#[async_trait]
impl ChatRemote for MockRemote {
    async fn fetch_peers(&self) -> ChatResult<Vec<PeerRecord>> {
        self.peer_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(permits) = &self.roster_permits {
            permits
                .acquire()
                .await
                .map_err(|e| ChatError::Api(e.to_string()))?
                .forget();
        }
        if self.fail_roster.load(Ordering::SeqCst) {
            return Err(ChatError::Api("connection refused".into()));
        }
        Ok(self.peers.lock().unwrap().clone())
    }

    async fn fetch_messages(&self, peer: &DeviceId) -> ChatResult<Vec<MessageRecord>> {
        self.message_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(peer)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(&self, peer: &DeviceId, text: &str) -> ChatResult<SendResponse> {
        self.sent.lock().unwrap().push(Sent::Text {
            peer: peer.clone(),
            text: text.to_string(),
        });
        Ok(self.reply_for(peer))
    }

    async fn send_file(
        &self,
        peer: &DeviceId,
        _bytes: Vec<u8>,
        filename: &str,
    ) -> ChatResult<SendResponse> {
        self.sent.lock().unwrap().push(Sent::File {
            peer: peer.clone(),
            filename: filename.to_string(),
        });
        Ok(self.reply_for(peer))
    }

    async fn send_folder(
        &self,
        peer: &DeviceId,
        files: Vec<FolderFile>,
    ) -> ChatResult<SendResponse> {
        self.sent.lock().unwrap().push(Sent::Folder {
            peer: peer.clone(),
            paths: files.into_iter().map(|f| f.relative_path).collect(),
        });
        Ok(self.reply_for(peer))
    }

    async fn download_file(&self, message_id: &str) -> ChatResult<Vec<u8>> {
        Ok(format!("contents of {message_id}").into_bytes())
    }
}
