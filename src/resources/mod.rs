//! Typed endpoint families.
//!
//! Each namespace borrows a client and is generic over [`Dispatch`], so
//! `client.chat().create(..)` returns a future on [`crate::Client`] and a
//! plain `Result` on [`crate::blocking::Client`].

pub mod account;
pub mod chat;
pub mod documents;
pub mod image;
pub mod market;
pub mod trends;
pub mod writer;

pub use account::{Account, AccountInfo, Credits, Limit, Limits, Plan};
pub use chat::{
    Chat, ChatAccumulator, ChatChunk, ChatCompletion, ChatMessage, ChatRequest, FinishReason,
    Role, Usage,
};
pub use documents::{Document, DocumentAnswer, DocumentChat, DocumentUpload, Documents, Source};
pub use image::{GeneratedImage, Image, ImageEditRequest, ImageRequest};
pub use market::{Crypto, CryptoQuote, Market, StockQuote, Stocks};
pub use trends::{Trend, TrendList, TrendSearch, Trends, Youtube, YoutubeSearch, YoutubeTrend};
pub use writer::{GeneratedContent, Template, Templates, Writer, WriterRequest};

use crate::error::Error;

/// Reject an empty or blank required argument.
pub(crate) fn require(name: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{name} must not be empty")));
    }
    Ok(())
}
