//! Streaming chat completion.
//!
//! Run with: NEMATI_API_KEY=... cargo run --example chat_stream
//! Set RUST_LOG=nemati=debug to see attempts and retries.

use nemati::resources::{ChatAccumulator, ChatMessage, ChatRequest};
use nemati::{CancellationToken, Client};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Ctrl-C stops the stream cleanly
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let client = Client::from_env()?.with_cancellation(token);

    let request = ChatRequest::new(vec![
        ChatMessage::system("You are a helpful assistant. Be concise."),
        ChatMessage::user("Write a haiku about Rust programming."),
    ])
    .max_tokens(256)
    .temperature(0.7);

    let mut stream = client.chat().create_stream(&request).await?;
    let mut acc = ChatAccumulator::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        print!("{}", chunk.content);
        acc.push(&chunk);
    }

    let completion = acc.finish();

    println!("\n\n--- Stats ---");
    println!("Model: {}", completion.model.as_deref().unwrap_or("default"));
    println!("Tokens: {}", completion.usage.total());
    println!("Finish reason: {:?}", completion.finish_reason);

    Ok(())
}
