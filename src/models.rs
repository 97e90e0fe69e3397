use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// Chat models the ask endpoint can be asked to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChatModel {
    #[default]
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[serde(rename = "gpt-4")]
    Gpt4,
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
}

impl ChatModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatModel::Gpt35Turbo => "gpt-3.5-turbo",
            ChatModel::Gpt4 => "gpt-4",
            ChatModel::Gpt4o => "gpt-4o",
            ChatModel::Gpt4oMini => "gpt-4o-mini",
        }
    }

    pub fn all() -> [ChatModel; 4] {
        [
            ChatModel::Gpt35Turbo,
            ChatModel::Gpt4,
            ChatModel::Gpt4o,
            ChatModel::Gpt4oMini,
        ]
    }
}

impl fmt::Display for ChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatModel {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ChatModel::all()
            .into_iter()
            .find(|model| model.as_str() == wanted)
            .ok_or_else(|| ClientError::UnknownModel(s.to_string()))
    }
}

/// Request payload for `POST /ask`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskRequest {
    pub q: String,
    pub model: ChatModel,
    /// Sent as `null` when unset so the server falls back to its own key.
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Request payload for `POST /api/rag-chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagChatRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// How a reply should be presented to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Success(String),
    Failure(String),
    /// Neither a success nor an error field was present.
    Unrecognized,
}

/// Body of a non-2xx reply. FastAPI puts either a string or a list of
/// validation records in `detail`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    pub error: Option<String>,
    pub detail: Option<Value>,
}

impl ErrorBody {
    pub fn message(&self) -> Option<String> {
        self.error.clone().or_else(|| detail_text(&self.detail))
    }
}

fn detail_text(detail: &Option<Value>) -> Option<String> {
    match detail {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Replies that may also be synthesized from an error body when the server
/// answers with a non-2xx status.
pub trait ApiReply: serde::de::DeserializeOwned {
    fn from_error_body(body: ErrorBody) -> Self;
    fn verdict(&self) -> Verdict;
}

/// Response payload for `POST /ask`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskResponse {
    pub answer: Option<String>,
    pub error: Option<String>,
    pub detail: Option<Value>,
}

impl ApiReply for AskResponse {
    fn from_error_body(body: ErrorBody) -> Self {
        Self {
            answer: None,
            error: body.error,
            detail: body.detail,
        }
    }

    fn verdict(&self) -> Verdict {
        if let Some(answer) = &self.answer {
            return Verdict::Success(answer.clone());
        }
        match self.error.clone().or_else(|| detail_text(&self.detail)) {
            Some(message) => Verdict::Failure(message),
            None => Verdict::Unrecognized,
        }
    }
}

/// Response payload for `POST /api/upload-pdf`
///
/// `chunks` is the canonical name of the chunk count; `chunks_count` is
/// accepted from older servers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadResponse {
    pub success: Option<bool>,
    pub message: Option<String>,
    #[serde(alias = "chunks_count")]
    pub chunks: Option<u64>,
    pub error: Option<String>,
    pub detail: Option<Value>,
}

impl ApiReply for UploadResponse {
    fn from_error_body(body: ErrorBody) -> Self {
        Self {
            success: Some(false),
            error: body.error,
            detail: body.detail,
            ..Self::default()
        }
    }

    fn verdict(&self) -> Verdict {
        let failure = self.error.clone().or_else(|| detail_text(&self.detail));
        if self.success == Some(false) || failure.is_some() {
            return Verdict::Failure(failure.unwrap_or_else(|| "Upload failed".to_string()));
        }
        if self.success == Some(true) || self.message.is_some() || self.chunks.is_some() {
            let message = self.message.clone().unwrap_or_else(|| match self.chunks {
                Some(chunks) => format!("PDF processed successfully! {} chunks created.", chunks),
                None => "PDF processed successfully!".to_string(),
            });
            return Verdict::Success(message);
        }
        Verdict::Unrecognized
    }
}

/// Response payload for `POST /api/rag-chat`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RagChatResponse {
    pub success: Option<bool>,
    pub answer: Option<String>,
    pub error: Option<String>,
    pub detail: Option<Value>,
    pub sources: Option<u64>,
    pub context_used: Option<u64>,
}

impl ApiReply for RagChatResponse {
    fn from_error_body(body: ErrorBody) -> Self {
        Self {
            success: Some(false),
            error: body.error,
            detail: body.detail,
            ..Self::default()
        }
    }

    fn verdict(&self) -> Verdict {
        if self.success != Some(false) {
            if let Some(answer) = &self.answer {
                return Verdict::Success(answer.clone());
            }
        }
        match self.error.clone().or_else(|| detail_text(&self.detail)) {
            Some(message) => Verdict::Failure(message),
            None if self.success == Some(false) => {
                Verdict::Failure("The server could not answer the question".to_string())
            }
            None => Verdict::Unrecognized,
        }
    }
}

/// Response payload for `POST /api/rag-reset`. Only the error fields matter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetResponse {
    pub message: Option<String>,
    pub error: Option<String>,
    pub detail: Option<Value>,
}

impl ApiReply for ResetResponse {
    fn from_error_body(body: ErrorBody) -> Self {
        Self {
            message: None,
            error: body.error,
            detail: body.detail,
        }
    }

    fn verdict(&self) -> Verdict {
        match self.error.clone().or_else(|| detail_text(&self.detail)) {
            Some(message) => Verdict::Failure(message),
            None => Verdict::Success(
                self.message
                    .clone()
                    .unwrap_or_else(|| "Document session reset".to_string()),
            ),
        }
    }
}

/// Response payload for `GET /api/rag-status`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagStatus {
    pub ready: bool,
    pub documents_loaded: u64,
    pub chunks_available: u64,
    pub api_key_set: bool,
    pub aimakerspace_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response payload for `GET /health`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthResponse {
    pub status: String,
    pub rag_enabled: bool,
    pub rag_ready: bool,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ask_request_serializes_null_key() {
        let request = AskRequest {
            q: "2+2?".to_string(),
            model: ChatModel::default(),
            api_key: None,
            temperature: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"q": "2+2?", "model": "gpt-3.5-turbo", "api_key": null})
        );
    }

    #[test]
    fn test_ask_request_includes_temperature_when_set() {
        let request = AskRequest {
            q: "hi".to_string(),
            model: ChatModel::Gpt4o,
            api_key: Some("sk-test".to_string()),
            temperature: Some(0.5),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["temperature"], json!(0.5));
        assert_eq!(value["model"], json!("gpt-4o"));
        assert_eq!(value["api_key"], json!("sk-test"));
    }

    #[test]
    fn test_model_parsing() {
        assert_eq!("gpt-4o-mini".parse::<ChatModel>().unwrap(), ChatModel::Gpt4oMini);
        assert_eq!(" GPT-4 ".parse::<ChatModel>().unwrap(), ChatModel::Gpt4);
        assert!("llama".parse::<ChatModel>().is_err());
        assert_eq!(ChatModel::default().to_string(), "gpt-3.5-turbo");
    }

    #[test]
    fn test_ask_verdicts() {
        let reply: AskResponse = serde_json::from_value(json!({"answer": " 4 "})).unwrap();
        assert_eq!(reply.verdict(), Verdict::Success(" 4 ".to_string()));

        let reply: AskResponse =
            serde_json::from_value(json!({"error": "❌ Missing API key"})).unwrap();
        assert_eq!(reply.verdict(), Verdict::Failure("❌ Missing API key".to_string()));

        let reply: AskResponse = serde_json::from_value(json!({"detail": "nope"})).unwrap();
        assert_eq!(reply.verdict(), Verdict::Failure("nope".to_string()));

        let reply: AskResponse = serde_json::from_value(json!({"response": "old"})).unwrap();
        assert_eq!(reply.verdict(), Verdict::Unrecognized);
    }

    #[test]
    fn test_upload_accepts_both_chunk_names() {
        let reply: UploadResponse =
            serde_json::from_value(json!({"message": "ok", "chunks": 12})).unwrap();
        assert_eq!(reply.chunks, Some(12));
        assert_eq!(reply.verdict(), Verdict::Success("ok".to_string()));

        let reply: UploadResponse =
            serde_json::from_value(json!({"success": true, "chunks_count": 7})).unwrap();
        assert_eq!(reply.chunks, Some(7));
        assert_eq!(
            reply.verdict(),
            Verdict::Success("PDF processed successfully! 7 chunks created.".to_string())
        );
    }

    #[test]
    fn test_upload_failures() {
        let reply: UploadResponse =
            serde_json::from_value(json!({"success": false, "error": "No content found in PDF"}))
                .unwrap();
        assert_eq!(
            reply.verdict(),
            Verdict::Failure("No content found in PDF".to_string())
        );

        let reply = UploadResponse::from_error_body(ErrorBody {
            error: None,
            detail: Some(json!("Only PDF files are supported")),
        });
        assert_eq!(
            reply.verdict(),
            Verdict::Failure("Only PDF files are supported".to_string())
        );
    }

    #[test]
    fn test_rag_chat_verdicts() {
        let reply: RagChatResponse =
            serde_json::from_value(json!({"success": true, "answer": "42", "sources": 3}))
                .unwrap();
        assert_eq!(reply.verdict(), Verdict::Success("42".to_string()));

        let reply: RagChatResponse = serde_json::from_value(json!({"answer": "bare"})).unwrap();
        assert_eq!(reply.verdict(), Verdict::Success("bare".to_string()));

        let reply: RagChatResponse = serde_json::from_value(
            json!({"success": false, "error": "No relevant content found for your question."}),
        )
        .unwrap();
        assert_eq!(
            reply.verdict(),
            Verdict::Failure("No relevant content found for your question.".to_string())
        );
    }

    #[test]
    fn test_validation_detail_is_stringified() {
        let body: ErrorBody = serde_json::from_value(json!({
            "detail": [{"loc": ["body", "q"], "msg": "field required"}]
        }))
        .unwrap();
        let message = body.message().unwrap();
        assert!(message.contains("field required"));
    }

    #[test]
    fn test_status_defaults_missing_fields() {
        let status: RagStatus =
            serde_json::from_value(json!({"ready": false, "error": "RAG service not available"}))
                .unwrap();
        assert!(!status.ready);
        assert_eq!(status.chunks_available, 0);
        assert_eq!(status.error.as_deref(), Some("RAG service not available"));
    }
}
