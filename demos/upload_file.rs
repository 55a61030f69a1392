//! Upload a local file, then the same content as if it came from a web form.
//!
//! Run with:
//! ```bash
//! export DIFY_API_BASE_URL="https://api.dify.ai/v1"
//! export DIFY_API_KEY="app-..."
//! cargo run --example upload_file -- ./picture.png
//! ```

use dify::client::{Client, DifyApi};
use dify::model::{UploadFileOption, UploadFileViaFormOption};
use dify::multipart::{FileUpload, MemoryFormPart};
use dify::options::EnvConfig;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let path = std::env::args().nth(1).ok_or("usage: upload_file <path>")?;

    let env = EnvConfig::from_env()?;
    let client = Client::with_config(env.client_config()?);
    let cancel = CancellationToken::new();

    let uploaded = client
        .upload_file(
            &cancel,
            UploadFileOption {
                api_key: env.api_key.clone(),
                file: Some(FileUpload::open(&path).await?),
                user: "demo-user".to_string(),
            },
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&uploaded)?);

    let content = tokio::fs::read(&path).await?;
    let form_part = MemoryFormPart::new(format!("form-{}", uploaded.name), content);
    let uploaded = client
        .upload_file_via_form(
            &cancel,
            UploadFileViaFormOption {
                api_key: env.api_key.clone(),
                form_file: Some(Box::new(form_part)),
                user: "demo-user".to_string(),
            },
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&uploaded)?);
    Ok(())
}
