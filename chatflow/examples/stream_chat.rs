//! Streaming chat example.
//!
//! Sends one message to an agent and prints the reply as it arrives, then
//! prints the conversation.
//!
//! Run with:
//! ```bash
//! CHATFLOW_API_BASE_URL=https://crm.example.com/api \
//! CHATFLOW_API_TOKEN=your-token \
//! cargo run --example stream_chat -- acme support-bot "Where is my order?"
//! ```

use chatflow::prelude::*;
use futures::StreamExt;
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let workspace = args.next().unwrap_or_else(|| "default".to_string());
    let agent = args.next().unwrap_or_else(|| "assistant".to_string());
    let message = args
        .next()
        .unwrap_or_else(|| "Summarize my open tickets.".to_string());

    let config = ClientConfig::from_env()?;
    let client = StreamClient::from_config(&config, EnvCredential::default());
    let key = ConversationKey::scoped(workspace, agent);

    println!("> {}\n", message);

    let mut tokens = client.stream(key.clone(), message);
    while let Some(token) = tokens.next().await {
        match token {
            Ok(token) => {
                print!("{}", token);
                io::stdout().flush()?;
            }
            Err(e) => {
                eprintln!("\n\nstream failed: {}", e);
                break;
            }
        }
    }
    println!("\n");

    if let Some(conversation) = client.conversation(&key) {
        println!("--- {} messages ---", conversation.len());
        println!("{}", conversation.transcript());
    }

    Ok(())
}
