//! Request, response and event types mirroring the API's JSON schema.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ClientError;
use crate::multipart::{FileUpload, FormPart};
use crate::options::SecretString;
use crate::validate::{Validate, Violations};

/// How the chat endpoint delivers its answer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// One JSON document once generation has finished.
    #[default]
    Blocking,
    /// Server-sent events while generation is in progress.
    Streaming,
}

/// Callback receiving each streamed chat event, in stream order.
pub type EventHandler = Box<dyn FnMut(StreamEvent) + Send>;

// --- Chat ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatMessageRequest {
    /// Values for the variables defined by the app
    pub inputs: HashMap<String, Value>,
    /// User input / question
    pub query: String,
    pub response_mode: ResponseMode,
    /// Continue an existing conversation; empty starts a new one
    pub conversation_id: String,
    /// End-user identifier, also needed to stop the task later
    pub user: String,
    pub files: Vec<ChatFile>,
}

impl ChatMessageRequest {
    pub fn new(query: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = mode;
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = conversation_id.into();
        self
    }

    pub fn with_file(mut self, file: ChatFile) -> Self {
        self.files.push(file);
        self
    }
}

/// A file attached to a chat message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatFile {
    #[serde(rename = "type")]
    pub file_type: String,
    /// `remote_url` or `local_file`
    pub transfer_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Id returned by a previous upload, for `local_file`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_file_id: Option<String>,
}

impl ChatFile {
    pub fn remote_image(url: impl Into<String>) -> Self {
        Self {
            file_type: "image".to_string(),
            transfer_method: "remote_url".to_string(),
            url: Some(url.into()),
            upload_file_id: None,
        }
    }

    pub fn uploaded(file_type: impl Into<String>, upload_file_id: impl Into<String>) -> Self {
        Self {
            file_type: file_type.into(),
            transfer_method: "local_file".to_string(),
            url: None,
            upload_file_id: Some(upload_file_id.into()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatMessageResponse {
    pub event: String,
    pub task_id: String,
    pub id: String,
    pub message_id: String,
    pub conversation_id: String,
    pub mode: String,
    pub answer: String,
    pub metadata: ChatMetadata,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatMetadata {
    pub usage: Usage,
    pub retriever_resources: Vec<RetrieverResource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub prompt_unit_price: String,
    pub prompt_price_unit: String,
    pub prompt_price: String,
    pub completion_tokens: u64,
    pub completion_unit_price: String,
    pub completion_price_unit: String,
    pub completion_price: String,
    pub total_tokens: u64,
    pub total_price: String,
    pub currency: String,
    pub latency: f64,
}

/// A knowledge-base segment cited by an answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrieverResource {
    pub position: u32,
    pub dataset_id: String,
    pub dataset_name: String,
    pub document_id: String,
    pub document_name: String,
    pub segment_id: String,
    pub score: f64,
    pub content: String,
}

/// Event kinds the chat stream is known to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    WorkflowStarted,
    NodeStarted,
    NodeFinished,
    Message,
    MessageEnd,
    WorkflowFinished,
    /// Anything else, passed through untouched
    Other(String),
}

impl From<&str> for EventKind {
    fn from(event: &str) -> Self {
        match event {
            "workflow_started" => EventKind::WorkflowStarted,
            "node_started" => EventKind::NodeStarted,
            "node_finished" => EventKind::NodeFinished,
            "message" => EventKind::Message,
            "message_end" => EventKind::MessageEnd,
            "workflow_finished" => EventKind::WorkflowFinished,
            other => EventKind::Other(other.to_string()),
        }
    }
}

/// One event of a streamed chat answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamEvent {
    pub event: String,
    pub conversation_id: String,
    pub message_id: String,
    pub created_at: i64,
    pub task_id: String,
    pub id: String,
    /// Answer fragment, set on `message` events
    pub answer: String,
    pub from_variable_selector: Vec<String>,
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        EventKind::from(self.event.as_str())
    }
}

pub struct ChatMessageOption {
    pub api_key: SecretString,
    /// Required when `request.response_mode` is streaming
    pub on_event: Option<EventHandler>,
    pub request: ChatMessageRequest,
}

impl ChatMessageOption {
    /// Blocking call; any response mode set on `request` is replaced.
    pub fn blocking(api_key: impl Into<SecretString>, request: ChatMessageRequest) -> Self {
        Self {
            api_key: api_key.into(),
            on_event: None,
            request: request.with_response_mode(ResponseMode::Blocking),
        }
    }

    /// Streaming call delivering every event to `on_event`.
    pub fn streaming(
        api_key: impl Into<SecretString>,
        request: ChatMessageRequest,
        on_event: impl FnMut(StreamEvent) + Send + 'static,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            on_event: Some(Box::new(on_event)),
            request: request.with_response_mode(ResponseMode::Streaming),
        }
    }
}

impl std::fmt::Debug for ChatMessageOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatMessageOption")
            .field("api_key", &self.api_key)
            .field("on_event", &self.on_event.as_ref().map(|_| "<handler>"))
            .field("request", &self.request)
            .finish()
    }
}

impl Validate for ChatMessageOption {
    fn validate(&self) -> Result<(), ClientError> {
        Violations::new()
            .require_secret("api_key", &self.api_key)
            .require_text("query", &self.request.query)
            .require_text("user", &self.request.user)
            .check(
                self.request.response_mode != ResponseMode::Streaming || self.on_event.is_some(),
                "on_event is required when response_mode is streaming",
            )
            .finish()
    }
}

// --- Upload ---

#[derive(Debug)]
pub struct UploadFileOption {
    pub api_key: SecretString,
    pub file: Option<FileUpload>,
    pub user: String,
}

impl Validate for UploadFileOption {
    fn validate(&self) -> Result<(), ClientError> {
        Violations::new()
            .require_secret("api_key", &self.api_key)
            .require_some("file", &self.file)
            .require_text("user", &self.user)
            .finish()
    }
}

pub struct UploadFileViaFormOption {
    pub api_key: SecretString,
    pub form_file: Option<Box<dyn FormPart>>,
    pub user: String,
}

impl std::fmt::Debug for UploadFileViaFormOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadFileViaFormOption")
            .field("api_key", &self.api_key)
            .field("form_file", &self.form_file.as_ref().map(|p| p.filename().to_string()))
            .field("user", &self.user)
            .finish()
    }
}

impl Validate for UploadFileViaFormOption {
    fn validate(&self) -> Result<(), ClientError> {
        Violations::new()
            .require_secret("api_key", &self.api_key)
            .require_some("form_file", &self.form_file)
            .require_text("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadFileResponse {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub extension: String,
    pub mime_type: String,
    pub created_by: String,
    pub created_at: i64,
    /// Left untyped; the server may send `null`, a string or an object
    pub preview_url: Option<Value>,
}

// --- Stop task ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StopTaskRequest {
    /// Must match the `user` of the chat call that started the task
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct StopTaskOption {
    pub api_key: SecretString,
    pub task_id: String,
    pub request: StopTaskRequest,
}

impl Validate for StopTaskOption {
    fn validate(&self) -> Result<(), ClientError> {
        Violations::new()
            .require_secret("api_key", &self.api_key)
            .require_path_id("task_id", &self.task_id)
            .require_text("user", &self.request.user)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StopTaskResponse {
    pub result: String,
}

// --- Suggested questions ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SuggestedParams {
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct GetSuggestedOption {
    pub api_key: SecretString,
    pub message_id: String,
    pub params: SuggestedParams,
}

impl Validate for GetSuggestedOption {
    fn validate(&self) -> Result<(), ClientError> {
        Violations::new()
            .require_secret("api_key", &self.api_key)
            .require_path_id("message_id", &self.message_id)
            .require_text("user", &self.params.user)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SuggestedResponse {
    pub result: String,
    pub data: Vec<String>,
}

// --- Message history ---

/// Default page size of the message history endpoint.
pub const DEFAULT_MESSAGES_LIMIT: u32 = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagesParams {
    pub conversation_id: String,
    pub user: String,
    /// Id of the first message of the current page; empty for the latest page
    pub first_id: String,
    pub limit: u32,
}

impl MessagesParams {
    pub fn new(conversation_id: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user: user.into(),
            first_id: String::new(),
            limit: DEFAULT_MESSAGES_LIMIT,
        }
    }

    /// Page ending right before `first_id`.
    pub fn before(mut self, first_id: impl Into<String>) -> Self {
        self.first_id = first_id.into();
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone)]
pub struct GetMessagesOption {
    pub api_key: SecretString,
    pub params: MessagesParams,
}

impl Validate for GetMessagesOption {
    fn validate(&self) -> Result<(), ClientError> {
        Violations::new()
            .require_secret("api_key", &self.api_key)
            .require_text("conversation_id", &self.params.conversation_id)
            .require_text("user", &self.params.user)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MessagesResponse {
    pub limit: u32,
    pub has_more: bool,
    pub data: Vec<HistoryMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryMessage {
    pub id: String,
    pub conversation_id: String,
    pub inputs: HashMap<String, Value>,
    pub query: String,
    pub answer: String,
    pub message_files: Vec<Value>,
    pub feedback: Option<Value>,
    pub retriever_resources: Vec<RetrieverResource>,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_request_wire_format() {
        let request = ChatMessageRequest::new("hi", "u1")
            .with_response_mode(ResponseMode::Streaming)
            .with_input("role", "duck")
            .with_file(ChatFile::uploaded("document", "f-1"));

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "inputs": {"role": "duck"},
                "query": "hi",
                "response_mode": "streaming",
                "conversation_id": "",
                "user": "u1",
                "files": [{"type": "document", "transfer_method": "local_file", "upload_file_id": "f-1"}]
            })
        );
    }

    #[test]
    fn test_event_kind_passes_unknown_through() {
        let event: StreamEvent = serde_json::from_value(json!({
            "event": "tts_message",
            "task_id": "t-1",
            "extra": {"ignored": true}
        }))
        .unwrap();
        assert_eq!(event.kind(), EventKind::Other("tts_message".to_string()));
        assert_eq!(event.task_id, "t-1");
        assert_eq!(StreamEvent { event: "message_end".into(), ..Default::default() }.kind(), EventKind::MessageEnd);
    }

    #[test]
    fn test_chat_response_decodes_metadata() {
        let response: ChatMessageResponse = serde_json::from_value(json!({
            "event": "message",
            "message_id": "m-1",
            "conversation_id": "c-1",
            "mode": "chat",
            "answer": "hello",
            "metadata": {
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15, "latency": 0.5},
                "retriever_resources": [{"position": 1, "dataset_name": "docs", "score": 0.9}]
            },
            "created_at": 1705407629
        }))
        .unwrap();

        assert_eq!(response.metadata.usage.total_tokens, 15);
        assert_eq!(response.metadata.retriever_resources[0].dataset_name, "docs");
        assert_eq!(response.created_at, 1705407629);
    }

    #[test]
    fn test_streaming_requires_handler() {
        let option = ChatMessageOption {
            api_key: "k".into(),
            on_event: None,
            request: ChatMessageRequest::new("hi", "u1").with_response_mode(ResponseMode::Streaming),
        };
        assert!(matches!(option.validate(), Err(ClientError::Validation(msg)) if msg.contains("on_event")));

        let option = ChatMessageOption::streaming("k", ChatMessageRequest::new("hi", "u1"), |_| {});
        assert!(option.validate().is_ok());
        assert!(format!("{option:?}").contains("<handler>"));
    }

    #[test]
    fn test_messages_params_defaults() {
        let params = MessagesParams::new("c-1", "u1");
        assert_eq!(params.limit, DEFAULT_MESSAGES_LIMIT);
        assert!(params.first_id.is_empty());
        assert_eq!(params.before("m-9").with_limit(5).limit, 5);
    }

    #[test]
    fn test_upload_response_accepts_any_preview_url() {
        let uploaded: UploadFileResponse = serde_json::from_str(
            r#"{"id": "f-1", "name": "a.png", "size": 3, "preview_url": {"url": "/p/f-1", "expires": 300}}"#,
        )
        .unwrap();
        assert_eq!(uploaded.preview_url.unwrap()["url"], "/p/f-1");

        let uploaded: UploadFileResponse =
            serde_json::from_str(r#"{"id": "f-2", "name": "b.png", "size": 3, "preview_url": "/p/f-2"}"#).unwrap();
        assert_eq!(uploaded.preview_url, Some(Value::from("/p/f-2")));
    }
}
