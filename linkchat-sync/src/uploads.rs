//! In-flight upload tracking.
//!
//! Each file/folder send is a task that lives only between "send initiated"
//! and "send completed/failed":
//! - **pending**: an overlay entry with a busy indicator sits after the persisted messages
//! - **completed**: the entry is removed; the persisted message shows up on the next fetch
//! - **failed**: the entry is removed and the caller surfaces the error; never retried
//!
//! Tasks never carry a message id, so the message diff cannot see them.

use crate::error::{ChatError, ChatResult};
use crate::types::{UploadId, UploadKind, UploadTask};
use crate::view::{ChatView, ElementHandle, HandleArena, OverlayEntry};
use chrono::Utc;
use tracing::debug;

/// Terminal state of an upload task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    Completed,
    Failed(String),
}

struct TrackedUpload {
    task: UploadTask,
    handle: ElementHandle,
}

/// Pending uploads in the order they were started.
#[derive(Default)]
pub struct UploadTracker {
    pending: Vec<TrackedUpload>,
}

impl UploadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending task and appends its overlay entry.
    pub fn begin(
        &mut self,
        kind: UploadKind,
        label: impl Into<String>,
        arena: &mut HandleArena,
        view: &mut dyn ChatView,
    ) -> UploadTask {
        let task = UploadTask {
            id: UploadId::generate(),
            kind,
            label: label.into(),
            started_at: Utc::now(),
        };
        let handle = arena.allocate();
        view.append_overlay(
            handle,
            &OverlayEntry {
                upload_id: task.id.clone(),
                kind,
                label: task.label.clone(),
                busy: true,
            },
        );
        self.pending.push(TrackedUpload {
            task: task.clone(),
            handle,
        });
        task
    }

    /// Moves a pending task to its terminal state and removes its overlay entry.
    pub fn finish(
        &mut self,
        id: &UploadId,
        outcome: &UploadOutcome,
        view: &mut dyn ChatView,
    ) -> ChatResult<UploadTask> {
        let pos = self
            .pending
            .iter()
            .position(|t| &t.task.id == id)
            .ok_or_else(|| ChatError::UploadNotFound(id.to_string()))?;
        let tracked = self.pending.remove(pos);
        view.remove(tracked.handle);
        debug!(
            "upload {} ({}) finished: {outcome:?}",
            tracked.task.id,
            tracked.task.label
        );
        Ok(tracked.task)
    }

    pub fn complete(&mut self, id: &UploadId, view: &mut dyn ChatView) -> ChatResult<UploadTask> {
        self.finish(id, &UploadOutcome::Completed, view)
    }

    pub fn fail(
        &mut self,
        id: &UploadId,
        reason: impl Into<String>,
        view: &mut dyn ChatView,
    ) -> ChatResult<UploadTask> {
        self.finish(id, &UploadOutcome::Failed(reason.into()), view)
    }

    /// Overlay handles in view order.
    pub fn overlay_handles(&self) -> Vec<ElementHandle> {
        self.pending.iter().map(|t| t.handle).collect()
    }

    pub fn get(&self, id: &UploadId) -> Option<&UploadTask> {
        self.pending.iter().map(|t| &t.task).find(|t| &t.id == id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &UploadTask> {
        self.pending.iter().map(|t| &t.task)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
