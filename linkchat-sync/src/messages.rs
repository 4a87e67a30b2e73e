//! Message reconciliation.
//!
//! Diffs the rendered persisted-message set against a freshly fetched
//! sequence and applies the minimal view changes:
//! - identical id sets: no view mutation at all
//! - stale ids are removed, new ids are appended in sequence order
//! - a new id landing before rendered ones moves those rendered elements
//!   behind it (detach and reattach), so the view keeps the fetched order
//! - an id already rendered is never re-materialized, even if its content changed
//! - upload overlays are detached around the diff and re-appended in order
//!
//! Entrance transitions play at most once per id per session, so the
//! animate-once set survives conversation switches.

use crate::types::{Message, MessageKind, Sender};
use crate::view::{ChatView, ElementBody, ElementHandle, HandleArena, MessageElement, Side, Transition};
use std::collections::{HashMap, HashSet};

/// Ordered mirror of the persisted messages currently in the view.
#[derive(Debug, Default)]
pub struct RenderedMessageSet {
    order: Vec<String>,
    handles: HashMap<String, ElementHandle>,
}

impl RenderedMessageSet {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    pub fn handle(&self, id: &str) -> Option<ElementHandle> {
        self.handles.get(id).copied()
    }

    /// Rendered ids in view order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    fn same_ids(&self, ids: &HashSet<&str>) -> bool {
        self.handles.len() == ids.len() && ids.iter().all(|id| self.handles.contains_key(*id))
    }

    fn push(&mut self, id: String, handle: ElementHandle) {
        self.handles.insert(id.clone(), handle);
        self.order.push(id);
    }

    fn unlink(&mut self, ids: &HashSet<String>) {
        self.order.retain(|id| !ids.contains(id));
    }

    fn relink(&mut self, id: &str) {
        self.order.push(id.to_string());
    }

    fn retain(&mut self, mut keep: impl FnMut(&str, ElementHandle) -> bool) {
        let handles = &mut self.handles;
        self.order.retain(|id| {
            let Some(&handle) = handles.get(id) else {
                return false;
            };
            if keep(id, handle) {
                true
            } else {
                handles.remove(id);
                false
            }
        });
    }
}

/// View changes made by one reconciliation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub removed: usize,
    pub inserted: usize,
    pub animated: usize,
    /// Every view call made, overlay detach/reattach included.
    pub mutations: usize,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.mutations == 0
    }
}

#[derive(Debug, Default)]
pub struct MessageReconciler {
    rendered: RenderedMessageSet,
    animated: HashSet<String>,
}

impl MessageReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> &RenderedMessageSet {
        &self.rendered
    }

    pub fn was_animated(&self, id: &str) -> bool {
        self.animated.contains(id)
    }

    /// Brings the view in line with `fetched`. `overlays` are the upload
    /// overlay handles currently after the messages, in view order.
    pub fn reconcile(
        &mut self,
        fetched: &[Message],
        overlays: &[ElementHandle],
        arena: &mut HandleArena,
        view: &mut dyn ChatView,
    ) -> ReconcileOutcome {
        let new_ids: HashSet<&str> = fetched.iter().map(|m| m.id.as_str()).collect();
        let mut outcome = ReconcileOutcome::default();

        if self.rendered.same_ids(&new_ids) {
            return outcome;
        }

        for &handle in overlays {
            view.detach(handle);
            outcome.mutations += 1;
        }

        self.rendered.retain(|id, handle| {
            if new_ids.contains(id) {
                true
            } else {
                view.remove(handle);
                outcome.removed += 1;
                outcome.mutations += 1;
                false
            }
        });

        // Rendered ids that come after the first new id must follow it.
        let first_new = fetched
            .iter()
            .position(|m| !self.rendered.contains(&m.id))
            .unwrap_or(fetched.len());
        let mut moved = HashSet::new();
        for message in &fetched[first_new..] {
            if let Some(handle) = self.rendered.handle(&message.id) {
                if moved.insert(message.id.clone()) {
                    view.detach(handle);
                    outcome.mutations += 1;
                }
            }
        }
        self.rendered.unlink(&moved);

        for message in fetched {
            if moved.remove(&message.id) {
                if let Some(handle) = self.rendered.handle(&message.id) {
                    view.reattach(handle);
                    self.rendered.relink(&message.id);
                    outcome.mutations += 1;
                }
                continue;
            }
            if self.rendered.contains(&message.id) {
                continue;
            }
            let handle = arena.allocate();
            let transition = if self.animated.insert(message.id.clone()) {
                outcome.animated += 1;
                Transition::Enter
            } else {
                Transition::Immediate
            };
            view.append_message(handle, &element_for(message), transition);
            self.rendered.push(message.id.clone(), handle);
            outcome.inserted += 1;
            outcome.mutations += 1;
        }

        for &handle in overlays {
            view.reattach(handle);
            outcome.mutations += 1;
        }

        outcome
    }

    /// Removes every rendered persisted message (conversation switch).
    /// The animate-once set is kept.
    pub fn clear(&mut self, view: &mut dyn ChatView) -> usize {
        let mut removed = 0;
        self.rendered.retain(|_, handle| {
            view.remove(handle);
            removed += 1;
            false
        });
        removed
    }
}

/// Classifies a message into its view element.
pub fn element_for(message: &Message) -> MessageElement {
    let side = match message.sender {
        Sender::Local => Side::Mine,
        Sender::Peer(_) => Side::Theirs,
    };
    let fallback = || message.text.clone().unwrap_or_default();
    let body = match message.kind {
        MessageKind::Text => ElementBody::Text(fallback()),
        MessageKind::File => ElementBody::File {
            filename: message.filename.clone().unwrap_or_else(fallback),
        },
        MessageKind::Folder => ElementBody::Folder {
            name: message.filename.clone().unwrap_or_else(fallback),
        },
    };
    MessageElement {
        message_id: message.id.clone(),
        side,
        body,
        timestamp: message.timestamp_display.clone(),
    }
}
