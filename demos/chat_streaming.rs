//! Streaming chat example.
//!
//! Run with:
//! ```bash
//! export DIFY_API_BASE_URL="https://api.dify.ai/v1"
//! export DIFY_API_KEY="app-..."
//! cargo run --example chat_streaming -- "What should a new parent read first?"
//! ```

use std::io::Write;

use dify::client::{Client, DifyApi};
use dify::model::{ChatMessageOption, ChatMessageRequest, EventKind};
use dify::options::EnvConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let env = EnvConfig::from_env()?;
    let client = Client::with_config(env.client_config()?);

    let query = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Write a haiku about Rust programming.".to_string());
    let user = "demo-user";
    let request = ChatMessageRequest::new(query, user).with_input("role", "Donald Duck");

    // Ctrl-C stops reading the stream and closes the connection.
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let option = ChatMessageOption::streaming(env.api_key.clone(), request, move |event| match event.kind() {
        EventKind::WorkflowStarted => {
            println!("Workflow started");
            println!("\ttask id: {}", event.task_id);
            println!("\tconversation id: {}", event.conversation_id);
            println!("\tuser: {user}");
            println!("\tmessage id: {}", event.message_id);
        }
        EventKind::Message => {
            print!("{}", event.answer);
            let _ = std::io::stdout().flush();
        }
        EventKind::WorkflowFinished => println!("\nWorkflow finished"),
        _ => {}
    });

    let outcome = client.chat_message(&cancel, option).await?;
    println!("{outcome:?}");
    Ok(())
}
