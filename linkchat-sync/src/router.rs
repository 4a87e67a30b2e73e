//! Send routing.
//!
//! Planning is pure: it looks at the open conversation and the roster and
//! either rejects the send locally or produces the outbound requests.
//! Dispatching runs the requests concurrently; in a broadcast every request
//! is independent, so one peer failing never stops the others.

use crate::error::{ChatError, ChatResult};
use crate::remote::ChatRemote;
use crate::roster::Roster;
use crate::transfer::{FilePayload, FolderPayload};
use crate::types::{ConversationId, DeviceId, FolderFile, SendReport};
use futures::future::join_all;
use tracing::{debug, warn};

/// One request to the chat service, addressed to exactly one peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundRequest {
    Text {
        peer: DeviceId,
        text: String,
    },
    File {
        peer: DeviceId,
        filename: String,
        bytes: Vec<u8>,
    },
    Folder {
        peer: DeviceId,
        files: Vec<FolderFile>,
    },
}

impl OutboundRequest {
    pub fn peer(&self) -> &DeviceId {
        match self {
            OutboundRequest::Text { peer, .. }
            | OutboundRequest::File { peer, .. }
            | OutboundRequest::Folder { peer, .. } => peer,
        }
    }

    async fn send(self, remote: &dyn ChatRemote) -> ChatResult<()> {
        let response = match self {
            OutboundRequest::Text { peer, text } => remote.send_message(&peer, &text).await?,
            OutboundRequest::File {
                peer,
                filename,
                bytes,
            } => remote.send_file(&peer, bytes, &filename).await?,
            OutboundRequest::Folder { peer, files } => remote.send_folder(&peer, files).await?,
        };
        response.into_result()
    }
}

/// Target selection for a send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Direct(DeviceId),
    Broadcast(Vec<DeviceId>),
}

impl Route {
    pub fn targets(&self) -> Vec<DeviceId> {
        match self {
            Route::Direct(peer) => vec![peer.clone()],
            Route::Broadcast(peers) => peers.clone(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Route::Broadcast(_))
    }
}

pub struct SendRouter;

impl SendRouter {
    /// Picks the target(s) for the open conversation. Broadcast goes to every
    /// peer currently accepting messages.
    pub fn route(conversation: Option<&ConversationId>, roster: &Roster) -> ChatResult<Route> {
        match conversation {
            None => Err(ChatError::NoConversation),
            Some(ConversationId::Direct(peer)) => Ok(Route::Direct(peer.clone())),
            Some(ConversationId::Broadcast) => Ok(Route::Broadcast(
                roster.accepting_peers().map(|p| p.id.clone()).collect(),
            )),
        }
    }

    /// Plans a text send. Blank text plans nothing. A direct peer must be
    /// listening or online.
    pub fn plan_text(
        conversation: Option<&ConversationId>,
        roster: &Roster,
        text: &str,
    ) -> ChatResult<Vec<OutboundRequest>> {
        let route = Self::route(conversation, roster)?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        if let Route::Direct(peer) = &route {
            match roster.get(peer) {
                Some(p) if p.status.accepts_messages() => {}
                Some(p) => {
                    return Err(ChatError::PeerNotListening {
                        peer: p.label().to_string(),
                    });
                }
                None => {
                    return Err(ChatError::PeerNotListening {
                        peer: peer.to_string(),
                    });
                }
            }
        }

        Ok(route
            .targets()
            .into_iter()
            .map(|peer| OutboundRequest::Text {
                peer,
                text: text.to_string(),
            })
            .collect())
    }

    pub fn plan_file(
        conversation: Option<&ConversationId>,
        roster: &Roster,
        payload: FilePayload,
    ) -> ChatResult<Vec<OutboundRequest>> {
        let route = Self::route(conversation, roster)?;
        Ok(route
            .targets()
            .into_iter()
            .map(|peer| OutboundRequest::File {
                peer,
                filename: payload.filename.clone(),
                bytes: payload.bytes.clone(),
            })
            .collect())
    }

    /// Folders go to exactly one peer.
    pub fn plan_folder(
        conversation: Option<&ConversationId>,
        payload: FolderPayload,
    ) -> ChatResult<OutboundRequest> {
        match conversation {
            None => Err(ChatError::NoConversation),
            Some(ConversationId::Broadcast) => Err(ChatError::BroadcastFolderUnsupported),
            Some(ConversationId::Direct(_)) if payload.files.is_empty() => {
                Err(ChatError::EmptyFolder(payload.name))
            }
            Some(ConversationId::Direct(peer)) => Ok(OutboundRequest::Folder {
                peer: peer.clone(),
                files: payload.files,
            }),
        }
    }

    /// Issues all requests concurrently and tallies the accepted ones.
    pub async fn dispatch(remote: &dyn ChatRemote, requests: Vec<OutboundRequest>) -> SendReport {
        let attempted = requests.len();
        let results = join_all(requests.into_iter().map(|req| async move {
            let peer = req.peer().clone();
            (peer, req.send(remote).await)
        }))
        .await;

        let mut report = SendReport {
            attempted,
            ..SendReport::default()
        };
        for (peer, result) in results {
            match result {
                Ok(()) => report.accepted += 1,
                Err(e) => {
                    warn!("send to {peer} failed: {e}");
                    let reason = match e {
                        ChatError::Rejected(reason) => reason,
                        other => other.to_string(),
                    };
                    report.failures.push((peer, reason));
                }
            }
        }
        debug!("dispatched {attempted} requests, {} accepted", report.accepted);
        report
    }
}
