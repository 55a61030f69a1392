//! The API client, its operations and error type.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::http::{build_request, encode_query, path_segment, RequestSpec};
use crate::model::{
    ChatMessageOption, ChatMessageRequest, ChatMessageResponse, GetMessagesOption, GetSuggestedOption,
    MessagesResponse, ResponseMode, StopTaskOption, StopTaskResponse, StreamEvent, SuggestedResponse,
    UploadFileOption, UploadFileResponse, UploadFileViaFormOption,
};
use crate::multipart::{upload_form, FormFileUpload, MultipartForm, UploadSource};
use crate::options::{ClientConfig, SecretString};
use crate::sse::{dispatch_events, SSEResponseExt, StreamSummary};
use crate::stream::{event_stream, until_cancelled};
use crate::validate::Validate;

pub const API_PATH_CHAT_MESSAGES: &str = "/chat-messages";
pub const API_PATH_UPLOAD_FILE: &str = "/files/upload";
pub const API_PATH_MESSAGES: &str = "/messages";

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// A required field is missing or a cross-field rule is violated.
    /// Raised before any network I/O.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The API answered with an error status; `message` is the raw body.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result of a chat call: a full answer, or a summary of the delivered stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessageOutcome {
    Blocking(ChatMessageResponse),
    Streamed(StreamSummary),
}

impl ChatMessageOutcome {
    /// The blocking answer, if the call was not streamed.
    pub fn into_response(self) -> Option<ChatMessageResponse> {
        match self {
            ChatMessageOutcome::Blocking(response) => Some(response),
            ChatMessageOutcome::Streamed(_) => None,
        }
    }
}

/// Operations offered by the chat app API.
///
/// Every operation validates its option first and fails with
/// [`ClientError::Validation`] without touching the network. Cancelling
/// `cancel` aborts the call with [`ClientError::Cancelled`].
#[async_trait]
pub trait DifyApi: Send + Sync {
    /// Send a chat message, blocking or streaming per `request.response_mode`.
    async fn chat_message(
        &self,
        cancel: &CancellationToken,
        option: ChatMessageOption,
    ) -> Result<ChatMessageOutcome, ClientError>;

    /// Upload a local file.
    async fn upload_file(
        &self,
        cancel: &CancellationToken,
        option: UploadFileOption,
    ) -> Result<UploadFileResponse, ClientError>;

    /// Upload a file part received by a web handler.
    async fn upload_file_via_form(
        &self,
        cancel: &CancellationToken,
        option: UploadFileViaFormOption,
    ) -> Result<UploadFileResponse, ClientError>;

    /// Stop a streaming generation task.
    async fn stop_task(
        &self,
        cancel: &CancellationToken,
        option: StopTaskOption,
    ) -> Result<StopTaskResponse, ClientError>;

    /// Suggested follow-up questions for a message.
    async fn get_suggested(
        &self,
        cancel: &CancellationToken,
        option: GetSuggestedOption,
    ) -> Result<SuggestedResponse, ClientError>;

    /// One page of a conversation's message history.
    async fn get_messages(
        &self,
        cancel: &CancellationToken,
        option: GetMessagesOption,
    ) -> Result<MessagesResponse, ClientError>;
}

/// HTTP client for the chat app API.
///
/// Cheap to clone; clones share the configuration and transport.
///
/// # Example
/// ```no_run
/// use dify::client::{Client, DifyApi};
/// use dify::model::{ChatMessageOption, ChatMessageRequest};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), dify::ClientError> {
/// let client = Client::new("https://api.dify.ai/v1");
/// let request = ChatMessageRequest::new("What can you do?", "user-1");
/// let outcome = client
///     .chat_message(&CancellationToken::new(), ChatMessageOption::blocking("app-key", request))
///     .await?;
/// println!("{:?}", outcome.into_response());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
}

impl Client {
    /// Client with the default transport for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_config(ClientConfig::new(base_url))
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Streaming chat exposed as a lazy sequence of events.
    ///
    /// The response mode is forced to streaming. Malformed events are skipped;
    /// a read error ends the sequence. Cancelling `cancel` ends it with
    /// [`ClientError::Cancelled`] and closes the connection, as does dropping
    /// the stream.
    pub async fn chat_message_stream(
        &self,
        cancel: &CancellationToken,
        api_key: impl Into<SecretString>,
        request: ChatMessageRequest,
    ) -> Result<impl Stream<Item = Result<StreamEvent, ClientError>> + Send, ClientError> {
        let option = ChatMessageOption::streaming(api_key, request, |_| {});
        option.validate()?;

        let ChatMessageOption { api_key, request, .. } = option;
        let response = self.send_chat(cancel, &api_key, &request).await?;
        Ok(until_cancelled(event_stream(response.sse()), cancel.clone()))
    }

    /// Build and execute one request, returning the live response.
    async fn dispatch<B>(
        &self,
        cancel: &CancellationToken,
        spec: RequestSpec<'_, B>,
    ) -> Result<reqwest::Response, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let request = build_request(&self.config, spec)?;
        debug!(method = %request.method(), url = %request.url(), "sending request");

        let response = cancellable(cancel, self.config.transport.execute(request)).await??;
        debug!(status = %response.status(), "response received");
        Ok(response)
    }

    async fn send_chat(
        &self,
        cancel: &CancellationToken,
        api_key: &SecretString,
        request: &ChatMessageRequest,
    ) -> Result<reqwest::Response, ClientError> {
        let spec = RequestSpec::post_json(API_PATH_CHAT_MESSAGES, api_key.expose_secret(), request);
        let response = self.dispatch(cancel, spec).await?;

        if response.status() != StatusCode::OK {
            return Err(api_error(cancel, response).await);
        }
        Ok(response)
    }

    /// Read the whole body and decode it, surfacing error statuses verbatim.
    async fn decode_json<T: DeserializeOwned>(
        cancel: &CancellationToken,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        if !response.status().is_success() {
            return Err(api_error(cancel, response).await);
        }
        let body = cancellable(cancel, response.bytes()).await??;
        serde_json::from_slice(&body).map_err(ClientError::Decode)
    }

    async fn upload(
        &self,
        cancel: &CancellationToken,
        api_key: &SecretString,
        user: &str,
        source: &mut (dyn UploadSource + '_),
    ) -> Result<UploadFileResponse, ClientError> {
        let form = cancellable(cancel, upload_form(MultipartForm::new(), user, source)).await??;
        let spec = RequestSpec::post_form(API_PATH_UPLOAD_FILE, api_key.expose_secret(), form);
        let response = self.dispatch(cancel, spec).await?;
        Self::decode_json(cancel, response).await
    }
}

#[async_trait]
impl DifyApi for Client {
    async fn chat_message(
        &self,
        cancel: &CancellationToken,
        option: ChatMessageOption,
    ) -> Result<ChatMessageOutcome, ClientError> {
        option.validate()?;

        // The handler is not Sync, so it must not be borrowed across the send.
        let ChatMessageOption {
            api_key,
            on_event,
            request,
        } = option;
        let response = self.send_chat(cancel, &api_key, &request).await?;

        match (request.response_mode, on_event) {
            (ResponseMode::Streaming, Some(handler)) => {
                let summary = dispatch_events(response.sse(), cancel, handler).await?;
                Ok(ChatMessageOutcome::Streamed(summary))
            }
            _ => Self::decode_json(cancel, response)
                .await
                .map(ChatMessageOutcome::Blocking),
        }
    }

    async fn upload_file(
        &self,
        cancel: &CancellationToken,
        option: UploadFileOption,
    ) -> Result<UploadFileResponse, ClientError> {
        option.validate()?;

        let UploadFileOption { api_key, file, user } = option;
        let mut file = file.ok_or_else(|| ClientError::Validation("file is required".to_string()))?;
        self.upload(cancel, &api_key, &user, &mut file).await
    }

    async fn upload_file_via_form(
        &self,
        cancel: &CancellationToken,
        option: UploadFileViaFormOption,
    ) -> Result<UploadFileResponse, ClientError> {
        option.validate()?;

        let UploadFileViaFormOption {
            api_key,
            form_file,
            user,
        } = option;
        let part = form_file.ok_or_else(|| ClientError::Validation("form_file is required".to_string()))?;
        let mut source = FormFileUpload::new(part);
        self.upload(cancel, &api_key, &user, &mut source).await
    }

    async fn stop_task(
        &self,
        cancel: &CancellationToken,
        option: StopTaskOption,
    ) -> Result<StopTaskResponse, ClientError> {
        option.validate()?;

        let spec = RequestSpec::post_json(
            format!("{API_PATH_CHAT_MESSAGES}/{}/stop", path_segment(&option.task_id)),
            option.api_key.expose_secret(),
            &option.request,
        );
        let response = self.dispatch(cancel, spec).await?;
        Self::decode_json(cancel, response).await
    }

    async fn get_suggested(
        &self,
        cancel: &CancellationToken,
        option: GetSuggestedOption,
    ) -> Result<SuggestedResponse, ClientError> {
        option.validate()?;

        let path = format!(
            "{API_PATH_MESSAGES}/{}/suggested?{}",
            path_segment(&option.message_id),
            encode_query(&option.params)?
        );
        let response = self
            .dispatch(cancel, RequestSpec::get(path, option.api_key.expose_secret()))
            .await?;
        Self::decode_json(cancel, response).await
    }

    async fn get_messages(
        &self,
        cancel: &CancellationToken,
        option: GetMessagesOption,
    ) -> Result<MessagesResponse, ClientError> {
        option.validate()?;

        let path = format!("{API_PATH_MESSAGES}?{}", encode_query(&option.params)?);
        let response = self
            .dispatch(cancel, RequestSpec::get(path, option.api_key.expose_secret()))
            .await?;
        Self::decode_json(cancel, response).await
    }
}

/// Race `future` against cancellation.
async fn cancellable<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output, ClientError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        output = future => Ok(output),
    }
}

/// Wrap an error response, keeping the raw body as the message.
async fn api_error(cancel: &CancellationToken, response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    match cancellable(cancel, response.bytes()).await {
        Ok(Ok(body)) => ClientError::Api {
            status,
            message: String::from_utf8_lossy(&body).into_owned(),
        },
        Ok(Err(e)) => ClientError::Http(e),
        Err(cancelled) => cancelled,
    }
}
