//! Remote chat service abstraction.
//!
//! The engine talks to the service only through [`ChatRemote`]; the HTTP
//! implementation is [`crate::api_client::ChatApiClient`].

use crate::error::ChatResult;
use crate::types::{DeviceId, FolderFile, MessageRecord, PeerRecord, SendResponse};
use async_trait::async_trait;

#[async_trait]
pub trait ChatRemote: Send + Sync {
    async fn fetch_peers(&self) -> ChatResult<Vec<PeerRecord>>;

    /// Messages of the direct conversation with `peer`, in service order.
    async fn fetch_messages(&self, peer: &DeviceId) -> ChatResult<Vec<MessageRecord>>;

    async fn send_message(&self, peer: &DeviceId, text: &str) -> ChatResult<SendResponse>;

    async fn send_file(
        &self,
        peer: &DeviceId,
        bytes: Vec<u8>,
        filename: &str,
    ) -> ChatResult<SendResponse>;

    async fn send_folder(&self, peer: &DeviceId, files: Vec<FolderFile>)
        -> ChatResult<SendResponse>;

    async fn download_file(&self, message_id: &str) -> ChatResult<Vec<u8>>;
}
