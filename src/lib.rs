//! Client for the Nemati AI API: chat, writer, image, trends, market data,
//! documents and account endpoints, with retries, SSE streaming and
//! cursor pagination.
//!
//! # Example
//! ```no_run
//! use nemati::resources::{ChatAccumulator, ChatMessage, ChatRequest};
//! use nemati::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), nemati::Error> {
//!     let client = Client::from_env()?;
//!     let request = ChatRequest::new(vec![ChatMessage::user("Hello!")]).max_tokens(256);
//!
//!     let mut stream = client.chat().create_stream(&request).await?;
//!     let mut acc = ChatAccumulator::new();
//!     while let Some(chunk) = stream.next().await {
//!         let chunk = chunk?;
//!         print!("{}", chunk.content);
//!         acc.push(&chunk);
//!     }
//!
//!     let completion = acc.finish();
//!     println!("\nTokens: {}", completion.usage.total());
//!     Ok(())
//! }
//! ```
//!
//! A [`blocking::Client`] exposes the same namespaces without async.

pub mod auth;
pub mod blocking;
pub mod client;
pub mod config;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod pagination;
pub mod request;
pub mod resources;
pub mod retry;
pub mod sse;
pub mod stream;
pub mod transport;

pub use auth::Credentials;
pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use dispatch::Dispatch;
pub use error::{Error, ErrorKind, TransportErrorKind};
pub use pagination::{Cursor, Page};
pub use request::{RequestBuilder, RequestSpec};
pub use retry::RetryPolicy;
pub use stream::EventStream;
pub use tokio_util::sync::CancellationToken;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
