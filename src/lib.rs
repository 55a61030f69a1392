//! # dify - client for the Dify chat app API
//!
//! Send chat messages (blocking or streamed), upload files, stop running
//! generation tasks, and fetch suggested questions and message history.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - One request pipeline for JSON, multipart and query-string requests
//! - Streaming answers via Server-Sent Events, delivered to a callback or
//!   consumed as a `Stream`
//! - Cancellation through `tokio_util::sync::CancellationToken`
//! - Type-safe request/response models
//!
//! ## Architecture
//!
//! - **`Client`**: implements [`DifyApi`], the six operations of the API
//! - **`ClientConfig`**: base URL, transport and extra headers, fixed at construction
//! - **`Transport`**: executes requests; `reqwest::Client` by default
//! - **`sse`**: incremental event decoder used by streaming chat
//!
//! ## Example
//! ```no_run
//! use dify::client::{Client, DifyApi};
//! use dify::model::{ChatMessageOption, ChatMessageRequest, EventKind};
//! use dify::options::EnvConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let env = EnvConfig::from_env()?;
//!     let client = Client::with_config(env.client_config()?);
//!
//!     let request = ChatMessageRequest::new("Write a haiku about Rust.", "user-1");
//!     let option = ChatMessageOption::streaming(env.api_key.clone(), request, |event| {
//!         if event.kind() == EventKind::Message {
//!             print!("{}", event.answer);
//!         }
//!     });
//!
//!     client.chat_message(&CancellationToken::new(), option).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;
pub mod model;
pub mod multipart;
pub mod options;
pub mod sse;
pub mod stream;
pub mod validate;

// Re-exports for convenience
pub use client::{ChatMessageOutcome, Client, ClientError, DifyApi};
pub use model::{ChatMessageOption, ChatMessageRequest, ResponseMode, StreamEvent};
pub use options::{ClientConfig, EnvConfig, SecretString};
pub use sse::StreamSummary;
