//! Chat sync orchestrator.
//!
//! Main event loop that coordinates:
//! - Roster polling on a fixed cadence (single-flight)
//! - Message reconciliation for the open conversation
//! - Outbound sends and their upload overlays
//! - Command processing (open conversation, send, rename, stop)
//!
//! The engine task owns the [`ChatSession`]. Network round-trips run as
//! spawned tasks that report back over a channel, so the session is only
//! ever touched from the loop.

use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};
use crate::names::{NameOverlay, StagedName};
use crate::remote::ChatRemote;
use crate::router::{OutboundRequest, SendRouter};
use crate::scheduler::{PollTick, poll_timer};
use crate::session::{ChatSession, MessageFetch};
use crate::transfer::{self, FilePayload, FolderPayload};
use crate::types::*;
use crate::view::ChatView;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Commands sent to the chat sync engine.
#[derive(Debug)]
pub enum ChatCommand {
    OpenConversation {
        conversation: ConversationId,
        reply: oneshot::Sender<()>,
    },
    SendText {
        text: String,
        reply: oneshot::Sender<ChatResult<SendReport>>,
    },
    SendFile {
        payload: FilePayload,
        reply: oneshot::Sender<ChatResult<SendReport>>,
    },
    SendFolder {
        payload: FolderPayload,
        reply: oneshot::Sender<ChatResult<SendReport>>,
    },
    AssignName {
        device: DeviceId,
        name: String,
        reply: oneshot::Sender<ChatResult<bool>>,
    },
    Download {
        message_id: String,
        reply: oneshot::Sender<ChatResult<Vec<u8>>>,
    },
    Refresh,
    Status {
        reply: oneshot::Sender<ChatSyncStatus>,
    },
    Stop,
}

/// Results of spawned network work, applied by the loop.
enum Completion {
    Roster {
        tick: PollTick,
        result: ChatResult<Vec<PeerRecord>>,
    },
    Messages {
        fetch: MessageFetch,
        result: ChatResult<Vec<MessageRecord>>,
    },
    Text {
        report: SendReport,
        broadcast: bool,
        reply: oneshot::Sender<ChatResult<SendReport>>,
    },
    Upload {
        upload_id: UploadId,
        report: SendReport,
        broadcast: bool,
        reply: oneshot::Sender<ChatResult<SendReport>>,
    },
    NameWritten {
        staged: StagedName,
        result: ChatResult<()>,
        reply: oneshot::Sender<ChatResult<bool>>,
    },
    RefreshDue,
}

/// Chat sync engine: main orchestration loop.
pub struct ChatSyncEngine {
    remote: Arc<dyn ChatRemote>,
    session: ChatSession,
    command_rx: mpsc::Receiver<ChatCommand>,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
    poll_interval: Duration,
    upload_refresh_delay: Duration,
    /// In-flight fetches, sends and delayed refreshes. Aborted on stop.
    tasks: JoinSet<()>,
}

/// Handle for sending commands to the chat sync engine.
#[derive(Clone)]
pub struct ChatSyncHandle {
    command_tx: mpsc::Sender<ChatCommand>,
}

impl ChatSyncHandle {
    async fn send(&self, cmd: ChatCommand) -> ChatResult<()> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| ChatError::EngineStopped)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ChatCommand) -> ChatResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| ChatError::EngineStopped)
    }

    /// Opens a conversation and triggers a message refresh for it.
    pub async fn open_conversation(&self, conversation: ConversationId) -> ChatResult<()> {
        self.request(|reply| ChatCommand::OpenConversation {
            conversation,
            reply,
        })
        .await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> ChatResult<SendReport> {
        let text = text.into();
        self.request(|reply| ChatCommand::SendText { text, reply })
            .await?
    }

    /// Resolves once the upload has completed or failed.
    pub async fn send_file(&self, payload: FilePayload) -> ChatResult<SendReport> {
        self.request(|reply| ChatCommand::SendFile { payload, reply })
            .await?
    }

    pub async fn send_file_at(&self, path: &Path) -> ChatResult<SendReport> {
        let payload = transfer::read_file(path).await?;
        self.send_file(payload).await
    }

    /// Resolves once the upload has completed or failed.
    pub async fn send_folder(&self, payload: FolderPayload) -> ChatResult<SendReport> {
        self.request(|reply| ChatCommand::SendFolder { payload, reply })
            .await?
    }

    pub async fn send_folder_at(&self, path: &Path) -> ChatResult<SendReport> {
        let payload = transfer::collect_folder(path).await?;
        self.send_folder(payload).await
    }

    /// Returns false if the name was blank and nothing changed.
    pub async fn assign_name(&self, device: DeviceId, name: impl Into<String>) -> ChatResult<bool> {
        let name = name.into();
        self.request(|reply| ChatCommand::AssignName {
            device,
            name,
            reply,
        })
        .await?
    }

    pub async fn download_file(&self, message_id: impl Into<String>) -> ChatResult<Vec<u8>> {
        let message_id = message_id.into();
        self.request(|reply| ChatCommand::Download { message_id, reply })
            .await?
    }

    pub async fn refresh(&self) -> ChatResult<()> {
        self.send(ChatCommand::Refresh).await
    }

    pub async fn status(&self) -> ChatResult<ChatSyncStatus> {
        self.request(|reply| ChatCommand::Status { reply }).await
    }

    pub async fn stop(&self) -> ChatResult<()> {
        self.send(ChatCommand::Stop).await
    }
}

/// Creates a chat sync engine and its command handle. Fails on an invalid
/// config.
pub fn create_chat_sync_engine(
    remote: Arc<dyn ChatRemote>,
    view: Box<dyn ChatView>,
    names: NameOverlay,
    config: &ChatConfig,
) -> ChatResult<(ChatSyncHandle, ChatSyncEngine)> {
    config.validate()?;

    let (command_tx, command_rx) = mpsc::channel(64);
    let (completion_tx, completion_rx) = mpsc::channel(64);

    let session = ChatSession::new(
        DeviceId::new(config.local_device_id.clone()),
        names,
        view,
    );

    let engine = ChatSyncEngine {
        remote,
        session,
        command_rx,
        completion_tx,
        completion_rx,
        poll_interval: config.poll_interval(),
        upload_refresh_delay: config.upload_refresh_delay(),
        tasks: JoinSet::new(),
    };

    Ok((ChatSyncHandle { command_tx }, engine))
}

impl ChatSyncEngine {
    /// Spawns the event loop on the current runtime.
    pub fn start(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Runs the engine event loop until stopped.
    pub async fn run(&mut self) {
        info!(
            "chat sync engine started (poll every {:?})",
            self.poll_interval
        );

        let mut poll_interval = poll_timer(self.poll_interval);

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    self.start_poll();
                }
                Some(completion) = self.completion_rx.recv() => {
                    self.handle_completion(completion);
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("chat sync task panicked: {e}");
                        }
                    }
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ChatCommand::Stop) => {
                            info!("chat sync engine stopping");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            info!("command channel closed, stopping chat sync engine");
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown();
        info!("chat sync engine stopped");
    }

    fn shutdown(&mut self) {
        if !self.tasks.is_empty() {
            debug!("aborting {} in-flight tasks", self.tasks.len());
        }
        self.tasks.abort_all();
        self.session.reset_poll();
    }

    fn start_poll(&mut self) {
        let Some(tick) = self.session.begin_poll() else {
            return;
        };
        let remote = self.remote.clone();
        let tx = self.completion_tx.clone();
        self.tasks.spawn(async move {
            let result = remote.fetch_peers().await;
            let _ = tx.send(Completion::Roster { tick, result }).await;
        });
    }

    fn spawn_message_fetch(&mut self, fetch: MessageFetch) {
        let remote = self.remote.clone();
        let tx = self.completion_tx.clone();
        self.tasks.spawn(async move {
            let result = remote.fetch_messages(&fetch.peer).await;
            let _ = tx.send(Completion::Messages { fetch, result }).await;
        });
    }

    /// On-demand message pass; deferred if a cycle is outstanding.
    fn request_refresh(&mut self) {
        if let Some(fetch) = self.session.begin_message_refresh() {
            self.spawn_message_fetch(fetch);
        }
    }

    fn serve_rerun(&mut self) {
        if let Some(fetch) = self.session.take_rerun() {
            self.spawn_message_fetch(fetch);
        }
    }

    fn schedule_refresh(&mut self, delay: Duration) {
        let tx = self.completion_tx.clone();
        self.tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Completion::RefreshDue).await;
        });
    }

    fn spawn_upload(
        &mut self,
        upload_id: UploadId,
        requests: Vec<OutboundRequest>,
        broadcast: bool,
        reply: oneshot::Sender<ChatResult<SendReport>>,
    ) {
        let remote = self.remote.clone();
        let tx = self.completion_tx.clone();
        self.tasks.spawn(async move {
            let report = SendRouter::dispatch(remote.as_ref(), requests).await;
            let _ = tx
                .send(Completion::Upload {
                    upload_id,
                    report,
                    broadcast,
                    reply,
                })
                .await;
        });
    }

    fn is_broadcast(&self) -> bool {
        matches!(
            self.session.open_conversation(),
            Some(ConversationId::Broadcast)
        )
    }

    fn handle_command(&mut self, cmd: ChatCommand) {
        match cmd {
            ChatCommand::OpenConversation {
                conversation,
                reply,
            } => {
                self.session.open(conversation);
                self.request_refresh();
                let _ = reply.send(());
            }
            ChatCommand::SendText { text, reply } => {
                let broadcast = self.is_broadcast();
                let requests = match self.session.plan_text(&text) {
                    Ok(requests) => requests,
                    Err(e) => {
                        debug!("text send rejected locally: {e}");
                        let _ = reply.send(Err(e));
                        return;
                    }
                };
                if requests.is_empty() {
                    if broadcast && !text.trim().is_empty() {
                        self.session.finish_text(&SendReport::default(), true);
                    }
                    let _ = reply.send(Ok(SendReport::default()));
                    return;
                }
                let remote = self.remote.clone();
                let tx = self.completion_tx.clone();
                self.tasks.spawn(async move {
                    let report = SendRouter::dispatch(remote.as_ref(), requests).await;
                    let _ = tx
                        .send(Completion::Text {
                            report,
                            broadcast,
                            reply,
                        })
                        .await;
                });
            }
            ChatCommand::SendFile { payload, reply } => {
                let broadcast = self.is_broadcast();
                match self.session.begin_file_upload(payload) {
                    Ok((task, requests)) => self.spawn_upload(task.id, requests, broadcast, reply),
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            ChatCommand::SendFolder { payload, reply } => {
                match self.session.begin_folder_upload(payload) {
                    Ok((task, request)) => self.spawn_upload(task.id, vec![request], false, reply),
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            ChatCommand::AssignName {
                device,
                name,
                reply,
            } => {
                let mut staged = match self.session.stage_name(&device, &name) {
                    Ok(Some(staged)) => staged,
                    Ok(None) => {
                        let _ = reply.send(Ok(false));
                        return;
                    }
                    Err(e) => {
                        warn!("failed to store name for {device}: {e}");
                        let _ = reply.send(Err(e));
                        return;
                    }
                };
                let write = staged.take_write();
                let tx = self.completion_tx.clone();
                self.tasks.spawn(async move {
                    let result = match write {
                        Some(write) => match tokio::task::spawn_blocking(move || write.commit()).await {
                            Ok(result) => result,
                            Err(e) => Err(ChatError::Storage(format!("names write panicked: {e}"))),
                        },
                        None => Ok(()),
                    };
                    let _ = tx
                        .send(Completion::NameWritten {
                            staged,
                            result,
                            reply,
                        })
                        .await;
                });
            }
            ChatCommand::Download { message_id, reply } => {
                let remote = self.remote.clone();
                self.tasks.spawn(async move {
                    let result = remote.download_file(&message_id).await;
                    if let Err(e) = &result {
                        warn!("download of {message_id} failed: {e}");
                    }
                    let _ = reply.send(result);
                });
            }
            ChatCommand::Refresh => self.request_refresh(),
            ChatCommand::Status { reply } => {
                let _ = reply.send(self.session.status());
            }
            ChatCommand::Stop => {}
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Roster { tick, result } => {
                match self.session.apply_roster(tick, result) {
                    Some(fetch) => self.spawn_message_fetch(fetch),
                    None => self.serve_rerun(),
                }
            }
            Completion::Messages { fetch, result } => {
                self.session.apply_messages(&fetch, result);
                self.serve_rerun();
            }
            Completion::Text {
                report,
                broadcast,
                reply,
            } => {
                self.session.finish_text(&report, broadcast);
                let rejection = if broadcast {
                    None
                } else {
                    report.failures.first().map(|(_, reason)| reason.clone())
                };
                let result = match rejection {
                    Some(reason) => Err(ChatError::Rejected(reason)),
                    None => Ok(report),
                };
                let _ = reply.send(result);
                self.request_refresh();
            }
            Completion::Upload {
                upload_id,
                report,
                broadcast,
                reply,
            } => {
                let result = match self.session.finish_upload(&upload_id, &report, broadcast) {
                    Ok(true) => {
                        self.schedule_refresh(self.upload_refresh_delay);
                        Ok(report)
                    }
                    Ok(false) => Err(ChatError::Rejected(
                        report
                            .failures
                            .first()
                            .map(|(_, reason)| reason.clone())
                            .unwrap_or_else(|| "no peers available".to_string()),
                    )),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Completion::NameWritten {
                staged,
                result,
                reply,
            } => {
                let device = staged.device.clone();
                let result = self.session.finish_name(staged, result);
                if let Err(e) = &result {
                    warn!("failed to store name for {device}: {e}");
                }
                let _ = reply.send(result);
            }
            Completion::RefreshDue => self.request_refresh(),
        }
    }
}
