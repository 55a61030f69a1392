//! Blocking chat example: the whole answer arrives as one document.
//!
//! Run with:
//! ```bash
//! export DIFY_API_BASE_URL="https://api.dify.ai/v1"
//! export DIFY_API_KEY="app-..."
//! cargo run --example chat_blocking
//! ```

use dify::client::{Client, DifyApi};
use dify::model::{ChatMessageOption, ChatMessageRequest};
use dify::options::EnvConfig;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let env = EnvConfig::from_env()?;
    let client = Client::with_config(env.client_config()?);

    let request = ChatMessageRequest::new("Give me a short guide to brewing green tea, in markdown.", "demo-user")
        .with_input("role", "Donald Duck");
    let option = ChatMessageOption::blocking(env.api_key.clone(), request);

    let outcome = client.chat_message(&CancellationToken::new(), option).await?;
    if let Some(response) = outcome.into_response() {
        println!("{}", response.answer);
        println!("\nconversation: {}", response.conversation_id);
        println!("message: {}", response.message_id);
        println!("tokens used: {}", response.metadata.usage.total_tokens);
    }
    Ok(())
}
