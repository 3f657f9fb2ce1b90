//! Blocking client: document upload and question answering.
//!
//! Run with: NEMATI_API_KEY=... cargo run --example blocking -- report.pdf

use nemati::blocking::Client;
use nemati::resources::{DocumentChat, DocumentUpload};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: blocking <file>"))?;

    let client = Client::from_env()?;

    let doc = client.documents().upload(&DocumentUpload::from_path(&path)?)?;
    println!("Uploaded {} as {}", doc.name, doc.id);

    let response = client
        .documents()
        .chat(&DocumentChat::new(&doc.id, "What are the key findings?"))?;
    println!("{}", response.answer);
    for source in &response.sources {
        if let Some(page) = source.page {
            println!("  Source: page {page}");
        }
    }

    println!("\nAll documents:");
    for doc in client.documents().list()?.into_items() {
        let doc = doc?;
        println!("  {} {}", doc.id, doc.name);
    }

    Ok(())
}
