//! HTTP client for the local chat service.
//!
//! Polling endpoints fail on any non-2xx status. Send endpoints answer with a
//! `{success, error}` body even on 400/500, so that body is honoured whenever
//! it parses.

use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};
use crate::remote::ChatRemote;
use crate::types::*;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use tracing::debug;

/// HTTP client for the chat service.
pub struct ChatApiClient {
    client: Client,
    config: ChatConfig,
}

impl ChatApiClient {
    pub fn new(config: ChatConfig) -> ChatResult<Self> {
        config.validate()?;
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    async fn read_send_response(resp: reqwest::Response) -> ChatResult<SendResponse> {
        let status = resp.status();
        let body = resp.bytes().await?;
        match serde_json::from_slice::<SendResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(e) if status.is_success() => Err(e.into()),
            Err(_) => Err(ChatError::Api(format!("HTTP {status}"))),
        }
    }

    // ── Polling ──

    pub async fn get_users(&self) -> ChatResult<Vec<PeerRecord>> {
        let resp = self
            .client
            .get(self.url("/get_users"))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ChatError::Api(e.to_string()))?;

        Ok(resp.json().await?)
    }

    pub async fn get_messages(&self, peer: &DeviceId) -> ChatResult<Vec<MessageRecord>> {
        let path = format!("/get_messages/{}", urlencoding::encode(peer.as_str()));
        let resp = self
            .client
            .get(self.url(&path))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ChatError::Api(e.to_string()))?;

        Ok(resp.json().await?)
    }

    // ── Sends ──

    pub async fn post_message(&self, peer: &DeviceId, text: &str) -> ChatResult<SendResponse> {
        let resp = self
            .client
            .post(self.url("/send_message"))
            .json(&serde_json::json!({ "other_mac": peer.as_str(), "message": text }))
            .send()
            .await?;

        Self::read_send_response(resp).await
    }

    pub async fn post_file(
        &self,
        peer: &DeviceId,
        bytes: Vec<u8>,
        filename: &str,
    ) -> ChatResult<SendResponse> {
        let size = bytes.len();
        let form = Form::new()
            .text("other_mac", peer.to_string())
            .part("file", Part::bytes(bytes).file_name(filename.to_string()));

        debug!("sending file {filename} ({size} bytes) to {peer}");
        let resp = self
            .client
            .post(self.url("/send_file"))
            .multipart(form)
            .send()
            .await?;

        Self::read_send_response(resp).await
    }

    /// Sends every file in one multipart request. Each `files` part carries its
    /// relative path as the filename; `paths` repeats them in the same order for
    /// servers that sanitize uploaded filenames.
    pub async fn post_folder(
        &self,
        peer: &DeviceId,
        files: Vec<FolderFile>,
    ) -> ChatResult<SendResponse> {
        let count = files.len();
        let mut form = Form::new().text("other_mac", peer.to_string());
        for file in files {
            form = form
                .text("paths", file.relative_path.clone())
                .part("files", Part::bytes(file.bytes).file_name(file.relative_path));
        }

        debug!("sending folder ({count} files) to {peer}");
        let resp = self
            .client
            .post(self.url("/send_folder"))
            .multipart(form)
            .send()
            .await?;

        Self::read_send_response(resp).await
    }

    // ── Downloads ──

    pub async fn get_file(&self, message_id: &str) -> ChatResult<Vec<u8>> {
        let path = format!("/download_file/{}", urlencoding::encode(message_id));
        let resp = self.client.get(self.url(&path)).send().await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ChatError::Api(format!("file for message {message_id} not found")));
        }

        let resp = resp
            .error_for_status()
            .map_err(|e| ChatError::Api(e.to_string()))?;
        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ChatRemote for ChatApiClient {
    async fn fetch_peers(&self) -> ChatResult<Vec<PeerRecord>> {
        self.get_users().await
    }

    async fn fetch_messages(&self, peer: &DeviceId) -> ChatResult<Vec<MessageRecord>> {
        self.get_messages(peer).await
    }

    async fn send_message(&self, peer: &DeviceId, text: &str) -> ChatResult<SendResponse> {
        self.post_message(peer, text).await
    }

    async fn send_file(
        &self,
        peer: &DeviceId,
        bytes: Vec<u8>,
        filename: &str,
    ) -> ChatResult<SendResponse> {
        self.post_file(peer, bytes, filename).await
    }

    async fn send_folder(
        &self,
        peer: &DeviceId,
        files: Vec<FolderFile>,
    ) -> ChatResult<SendResponse> {
        self.post_folder(peer, files).await
    }

    async fn download_file(&self, message_id: &str) -> ChatResult<Vec<u8>> {
        self.get_file(message_id).await
    }
}
