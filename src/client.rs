use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::models::{
    ApiReply, AskRequest, AskResponse, ErrorBody, HealthResponse, RagChatRequest,
    RagChatResponse, RagStatus, ResetResponse, UploadResponse,
};

/// The remote chat/RAG backend.
///
/// `Err` means the call itself failed (network, status without a usable
/// body, malformed JSON). Server-reported errors come back as `Ok` replies
/// carrying an `error` or `detail` field.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn ask(&self, request: &AskRequest) -> ClientResult<AskResponse>;
    async fn upload_pdf(&self, file_name: &str, bytes: Vec<u8>) -> ClientResult<UploadResponse>;
    async fn rag_chat(&self, request: &RagChatRequest) -> ClientResult<RagChatResponse>;
    async fn rag_reset(&self) -> ClientResult<ResetResponse>;
    async fn rag_status(&self) -> ClientResult<RagStatus>;
    async fn health(&self) -> ClientResult<HealthResponse>;
}

/// `reqwest` implementation of [`Backend`]
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    config: Config,
}

impl HttpBackend {
    pub fn new(config: Config) -> ClientResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.api_base
    }

    /// Decode an action reply. Non-2xx statuses still count as replies when
    /// their body carries an `error` or `detail` message.
    async fn decode_reply<T: ApiReply>(response: Response) -> ClientResult<T> {
        let status = response.status();
        let body = response.text().await?;
        debug!("Response {} body: {}", status, body);

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(error_body) if error_body.message().is_some() => {
                warn!("Backend answered {} with an error body", status);
                Ok(T::from_error_body(error_body))
            }
            _ => Err(ClientError::Status {
                status: status.as_u16(),
                body,
            }),
        }
    }

    async fn decode_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
        let status = response.status();
        let body = response.text().await?;
        debug!("Response {} body: {}", status, body);

        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn ask(&self, request: &AskRequest) -> ClientResult<AskResponse> {
        let url = self.config.endpoint("/ask");
        info!("POST {} (model {})", url, request.model);
        let response = self.client.post(&url).json(request).send().await?;
        Self::decode_reply(response).await
    }

    async fn upload_pdf(&self, file_name: &str, bytes: Vec<u8>) -> ClientResult<UploadResponse> {
        let url = self.config.endpoint("/api/upload-pdf");
        info!("POST {} ({} bytes from {})", url, bytes.len(), file_name);
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")?;
        let form = Form::new().part("file", part);
        let response = self.client.post(&url).multipart(form).send().await?;
        Self::decode_reply(response).await
    }

    async fn rag_chat(&self, request: &RagChatRequest) -> ClientResult<RagChatResponse> {
        let url = self.config.endpoint("/api/rag-chat");
        info!("POST {}", url);
        let response = self.client.post(&url).json(request).send().await?;
        Self::decode_reply(response).await
    }

    async fn rag_reset(&self) -> ClientResult<ResetResponse> {
        let url = self.config.endpoint("/api/rag-reset");
        info!("POST {}", url);
        let response = self.client.post(&url).send().await?;
        Self::decode_reply(response).await
    }

    async fn rag_status(&self) -> ClientResult<RagStatus> {
        let url = self.config.endpoint("/api/rag-status");
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        Self::decode_json(response).await
    }

    async fn health(&self) -> ClientResult<HealthResponse> {
        let url = self.config.endpoint("/health");
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        Self::decode_json(response).await
    }
}
