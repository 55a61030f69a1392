//! Conversation helpers: suggested questions, history and stopping a task.
//!
//! Run with:
//! ```bash
//! export DIFY_API_BASE_URL="https://api.dify.ai/v1"
//! export DIFY_API_KEY="app-..."
//! cargo run --example conversation
//! ```

use std::sync::{Arc, Mutex};

use dify::client::{Client, DifyApi};
use dify::model::{
    ChatMessageOption, ChatMessageRequest, EventKind, GetMessagesOption, GetSuggestedOption, MessagesParams,
    StopTaskOption, StopTaskRequest, StreamEvent, SuggestedParams,
};
use dify::options::EnvConfig;
use tokio_util::sync::CancellationToken;

const USER: &str = "demo-user";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let env = EnvConfig::from_env()?;
    let client = Client::with_config(env.client_config()?);
    let cancel = CancellationToken::new();

    // Start a conversation and remember the ids of its last event.
    let last = Arc::new(Mutex::new(StreamEvent::default()));
    let sink = last.clone();
    let option = ChatMessageOption::streaming(
        env.api_key.clone(),
        ChatMessageRequest::new("Name three rivers in Europe.", USER),
        move |event| {
            if event.kind() == EventKind::MessageEnd {
                *sink.lock().unwrap() = event;
            }
        },
    );
    client.chat_message(&cancel, option).await?;
    let last = last.lock().unwrap().clone();

    let suggested = client
        .get_suggested(
            &cancel,
            GetSuggestedOption {
                api_key: env.api_key.clone(),
                message_id: last.message_id.clone(),
                params: SuggestedParams { user: USER.to_string() },
            },
        )
        .await?;
    println!("Suggested questions: {:#?}", suggested.data);

    let history = client
        .get_messages(
            &cancel,
            GetMessagesOption {
                api_key: env.api_key.clone(),
                params: MessagesParams::new(last.conversation_id.clone(), USER),
            },
        )
        .await?;
    for message in &history.data {
        println!("> {}\n{}\n", message.query, message.answer);
    }

    // Stopping a finished task is harmless; the API still answers "success".
    let stopped = client
        .stop_task(
            &cancel,
            StopTaskOption {
                api_key: env.api_key.clone(),
                task_id: last.task_id.clone(),
                request: StopTaskRequest { user: USER.to_string() },
            },
        )
        .await?;
    println!("stop task: {}", stopped.result);
    Ok(())
}
