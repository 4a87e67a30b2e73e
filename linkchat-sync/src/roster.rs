//! Roster reconciliation.
//!
//! Every successful fetch replaces the roster wholesale (no tombstones) and
//! re-renders it; peers that disappear from the service simply vanish.

use crate::names::NameOverlay;
use crate::types::{DeviceId, Peer, PeerRecord};
use crate::view::{ChatView, RosterEntry};

#[derive(Debug, Default)]
pub struct Roster {
    peers: Vec<Peer>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the roster with freshly fetched records, names applied.
    pub fn replace(&mut self, records: Vec<PeerRecord>, names: &NameOverlay) {
        let mut peers: Vec<Peer> = records.into_iter().map(Peer::from_record).collect();
        names.apply(&mut peers);
        self.peers = peers;
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn get(&self, id: &DeviceId) -> Option<&Peer> {
        self.peers.iter().find(|p| &p.id == id)
    }

    /// Peers a message can currently be delivered to, in roster order.
    /// Listening peers count: the service reports `listening` for any device
    /// that has not announced a status.
    pub fn accepting_peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter().filter(|p| p.status.accepts_messages())
    }

    /// Updates the in-memory name of a peer. Returns false if the peer is unknown.
    pub fn rename(&mut self, id: &DeviceId, name: String) -> bool {
        match self.peers.iter_mut().find(|p| &p.id == id) {
            Some(peer) => {
                peer.display_name = Some(name);
                true
            }
            None => false,
        }
    }

    pub fn entries(&self, selected: Option<&DeviceId>) -> Vec<RosterEntry> {
        self.peers
            .iter()
            .map(|peer| RosterEntry {
                device_id: peer.id.clone(),
                label: peer.label().to_string(),
                raw_id: match peer.display_name {
                    Some(_) => None,
                    None => Some(peer.id.clone()),
                },
                status: peer.status,
                offline: !peer.reachable,
                selected: selected == Some(&peer.id),
            })
            .collect()
    }

    pub fn render(&self, selected: Option<&DeviceId>, view: &mut dyn ChatView) {
        view.render_roster(&self.entries(selected));
    }
}
