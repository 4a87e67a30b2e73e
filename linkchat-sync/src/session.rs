//! Chat session state.
//!
//! The session owns everything the engine mutates: roster, rendered messages,
//! upload overlays, the open conversation and the poll gate. All methods are
//! synchronous; the engine calls them between network round-trips, so each
//! one is atomic with respect to other scheduled work.

use crate::error::{ChatError, ChatResult};
use crate::messages::{MessageReconciler, ReconcileOutcome};
use crate::names::{NameOverlay, NameWrite, StagedName};
use crate::roster::Roster;
use crate::router::{OutboundRequest, SendRouter};
use crate::scheduler::{PollGate, PollTick};
use crate::transfer::{FilePayload, FolderPayload};
use crate::types::*;
use crate::uploads::UploadTracker;
use crate::view::{ChatView, ConversationHeader, HandleArena, Notice};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// A message fetch issued for the open conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageFetch {
    pub tick: PollTick,
    pub peer: DeviceId,
    /// Conversation epoch at issue time.
    pub epoch: u64,
}

pub struct ChatSession {
    local_device: DeviceId,
    names: NameOverlay,
    roster: Roster,
    messages: MessageReconciler,
    uploads: UploadTracker,
    arena: HandleArena,
    open: Option<ConversationId>,
    /// Bumped on every conversation switch.
    epoch: u64,
    gate: PollGate,
    last_poll_at: Option<DateTime<Utc>>,
    view: Box<dyn ChatView>,
}

impl ChatSession {
    pub fn new(local_device: DeviceId, names: NameOverlay, view: Box<dyn ChatView>) -> Self {
        Self {
            local_device,
            names,
            roster: Roster::new(),
            messages: MessageReconciler::new(),
            uploads: UploadTracker::new(),
            arena: HandleArena::new(),
            open: None,
            epoch: 0,
            gate: PollGate::new(),
            last_poll_at: None,
            view,
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn messages(&self) -> &MessageReconciler {
        &self.messages
    }

    pub fn uploads(&self) -> &UploadTracker {
        &self.uploads
    }

    pub fn open_conversation(&self) -> Option<&ConversationId> {
        self.open.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_polling(&self) -> bool {
        self.gate.is_in_flight()
    }

    pub fn status(&self) -> ChatSyncStatus {
        ChatSyncStatus {
            is_polling: self.gate.is_in_flight(),
            roster_size: self.roster.len(),
            open_conversation: self.open.clone(),
            pending_uploads: self.uploads.pending_count(),
            last_poll_at: self.last_poll_at,
        }
    }

    // ── Polling ──

    /// Starts a full roster+messages cycle, or `None` if one is outstanding.
    pub fn begin_poll(&mut self) -> Option<PollTick> {
        let tick = self.gate.try_begin();
        if tick.is_none() {
            debug!("poll tick skipped, previous cycle still in flight");
        }
        tick
    }

    /// Applies a roster fetch. Returns the follow-up message fetch when a
    /// direct conversation is open; otherwise the cycle ends here.
    pub fn apply_roster(
        &mut self,
        tick: PollTick,
        result: ChatResult<Vec<PeerRecord>>,
    ) -> Option<MessageFetch> {
        if !self.gate.is_current(tick) {
            debug!("discarding stale roster response for tick {}", tick.value());
            return None;
        }

        match result {
            Ok(records) => {
                self.roster.replace(records, &self.names);
                self.last_poll_at = Some(Utc::now());
                self.render_roster();
                self.render_header();
            }
            Err(e) => {
                warn!("roster fetch failed: {e}");
                self.gate.finish(tick);
                return None;
            }
        }

        match &self.open {
            Some(ConversationId::Direct(peer)) => Some(MessageFetch {
                tick,
                peer: peer.clone(),
                epoch: self.epoch,
            }),
            _ => {
                self.gate.finish(tick);
                None
            }
        }
    }

    /// Applies a message fetch and ends its cycle. Results for a conversation
    /// that has since been switched away from are dropped.
    pub fn apply_messages(
        &mut self,
        fetch: &MessageFetch,
        result: ChatResult<Vec<MessageRecord>>,
    ) -> Option<ReconcileOutcome> {
        if !self.gate.finish(fetch.tick) {
            debug!("discarding stale message response for tick {}", fetch.tick.value());
            return None;
        }
        if fetch.epoch != self.epoch {
            debug!("discarding messages for {}, conversation switched", fetch.peer);
            return None;
        }

        let records = match result {
            Ok(records) => records,
            Err(e) => {
                warn!("message fetch for {} failed: {e}", fetch.peer);
                return None;
            }
        };

        let fetched: Vec<Message> = records
            .into_iter()
            .map(|r| Message::from_record(r, &self.local_device))
            .collect();
        let overlays = self.uploads.overlay_handles();
        let outcome =
            self.messages
                .reconcile(&fetched, &overlays, &mut self.arena, self.view.as_mut());
        if !outcome.is_noop() {
            debug!(
                "reconciled {} messages: +{} -{}",
                fetched.len(),
                outcome.inserted,
                outcome.removed
            );
        }
        Some(outcome)
    }

    /// Starts a message-only cycle for the open direct conversation. If a cycle
    /// is outstanding the refresh is remembered and served by [`Self::take_rerun`].
    pub fn begin_message_refresh(&mut self) -> Option<MessageFetch> {
        let Some(ConversationId::Direct(peer)) = &self.open else {
            return None;
        };
        let peer = peer.clone();
        match self.gate.try_begin() {
            Some(tick) => Some(MessageFetch {
                tick,
                peer,
                epoch: self.epoch,
            }),
            None => {
                self.gate.request_rerun();
                None
            }
        }
    }

    /// Serves a refresh that was requested while the gate was held.
    pub fn take_rerun(&mut self) -> Option<MessageFetch> {
        if self.gate.is_in_flight() || !self.gate.take_rerun() {
            return None;
        }
        self.begin_message_refresh()
    }

    /// Forgets the outstanding cycle after its task was cancelled.
    pub fn reset_poll(&mut self) {
        self.gate.reset();
    }

    // ── Conversations ──

    /// Opens a conversation, clearing the rendered messages of the previous one.
    pub fn open(&mut self, conversation: ConversationId) {
        if self.open.as_ref() != Some(&conversation) {
            self.epoch += 1;
            let removed = self.messages.clear(self.view.as_mut());
            debug!("opened {conversation:?}, cleared {removed} rendered messages");
        }
        self.open = Some(conversation);
        self.render_roster();
        self.render_header();
    }

    pub fn header(&self) -> Option<ConversationHeader> {
        let conversation = self.open.clone()?;
        let header = match &conversation {
            ConversationId::Broadcast => ConversationHeader {
                conversation: conversation.clone(),
                title: "Broadcast".to_string(),
                status: None,
                input_enabled: true,
            },
            ConversationId::Direct(id) => match self.roster.get(id) {
                Some(peer) => ConversationHeader {
                    conversation: conversation.clone(),
                    title: peer.label().to_string(),
                    status: Some(peer.status),
                    input_enabled: peer.reachable,
                },
                None => ConversationHeader {
                    conversation: conversation.clone(),
                    title: self
                        .names
                        .name_for(id)
                        .unwrap_or_else(|| UNKNOWN_PEER_LABEL.to_string()),
                    status: None,
                    input_enabled: true,
                },
            },
        };
        Some(header)
    }

    // ── Names ──

    /// Stores a display name and re-renders, writing on the calling thread.
    /// Blank names are ignored.
    pub fn assign_name(&mut self, id: &DeviceId, name: &str) -> ChatResult<bool> {
        let Some(mut staged) = self.stage_name(id, name)? else {
            return Ok(false);
        };
        let written = staged.take_write().map_or(Ok(()), NameWrite::commit);
        self.finish_name(staged, written)
    }

    /// Records a name in memory. The caller runs the staged write and hands
    /// its result to [`Self::finish_name`].
    pub fn stage_name(&mut self, id: &DeviceId, name: &str) -> ChatResult<Option<StagedName>> {
        self.names.stage(id, name)
    }

    /// Re-renders with the new name once written, or reverts it.
    pub fn finish_name(&mut self, staged: StagedName, written: ChatResult<()>) -> ChatResult<bool> {
        if let Err(e) = written {
            self.names.revert(staged);
            return Err(e);
        }
        self.roster.rename(&staged.device, staged.name);
        self.render_roster();
        self.render_header();
        Ok(true)
    }

    // ── Sends ──

    /// Plans a text send; a local rejection is shown to the user.
    pub fn plan_text(&mut self, text: &str) -> ChatResult<Vec<OutboundRequest>> {
        SendRouter::plan_text(self.open.as_ref(), &self.roster, text)
            .inspect_err(|e| self.notify_error(e))
    }

    /// Reports a finished text send to the user.
    pub fn finish_text(&mut self, report: &SendReport, broadcast: bool) {
        if broadcast {
            self.notify(Notice::BroadcastSummary {
                accepted: report.accepted,
                attempted: report.attempted,
            });
        } else if let Some((_, reason)) = report.failures.first() {
            self.notify(Notice::SendFailed {
                reason: reason.clone(),
            });
        }
    }

    /// Plans a file send and registers its pending upload.
    pub fn begin_file_upload(
        &mut self,
        payload: FilePayload,
    ) -> ChatResult<(UploadTask, Vec<OutboundRequest>)> {
        let label = payload.filename.clone();
        let requests = SendRouter::plan_file(self.open.as_ref(), &self.roster, payload)
            .inspect_err(|e| self.notify_error(e))?;
        let task = self
            .uploads
            .begin(UploadKind::File, label, &mut self.arena, self.view.as_mut());
        Ok((task, requests))
    }

    /// Plans a folder send and registers its pending upload.
    pub fn begin_folder_upload(
        &mut self,
        payload: FolderPayload,
    ) -> ChatResult<(UploadTask, OutboundRequest)> {
        let label = payload.name.clone();
        let request = SendRouter::plan_folder(self.open.as_ref(), payload)
            .inspect_err(|e| self.notify_error(e))?;
        let task = self
            .uploads
            .begin(UploadKind::Folder, label, &mut self.arena, self.view.as_mut());
        Ok((task, request))
    }

    /// Ends an upload: completed if any target accepted it, failed otherwise.
    /// Returns true when it completed.
    pub fn finish_upload(
        &mut self,
        id: &UploadId,
        report: &SendReport,
        broadcast: bool,
    ) -> ChatResult<bool> {
        if report.accepted > 0 {
            self.uploads.complete(id, self.view.as_mut())?;
            if broadcast {
                self.notify(Notice::BroadcastSummary {
                    accepted: report.accepted,
                    attempted: report.attempted,
                });
            }
            return Ok(true);
        }

        let reason = report
            .failures
            .first()
            .map(|(_, reason)| reason.clone())
            .unwrap_or_else(|| "no peers available".to_string());
        let task = self.uploads.fail(id, reason.clone(), self.view.as_mut())?;
        self.notify(Notice::UploadFailed {
            label: task.label,
            reason,
        });
        Ok(false)
    }

    // ── Notices ──

    pub fn notify(&mut self, notice: Notice) {
        self.view.notify(&notice);
    }

    pub fn notify_error(&mut self, err: &ChatError) {
        let notice = match err {
            ChatError::PeerNotListening { peer } => Notice::PeerNotListening { peer: peer.clone() },
            ChatError::NoConversation => Notice::NoConversation,
            ChatError::BroadcastFolderUnsupported => Notice::BroadcastFolderUnsupported,
            ChatError::EmptyFolder(name) => Notice::EmptyFolder { name: name.clone() },
            other => Notice::SendFailed {
                reason: other.to_string(),
            },
        };
        self.notify(notice);
    }

    fn render_roster(&mut self) {
        let selected = self.open.as_ref().and_then(ConversationId::peer).cloned();
        self.roster.render(selected.as_ref(), self.view.as_mut());
    }

    fn render_header(&mut self) {
        let header = self.header();
        self.view.render_header(header.as_ref());
    }
}
