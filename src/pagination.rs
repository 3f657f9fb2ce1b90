//! Cursor-based pagination over list endpoints.

use crate::client::Client;
use crate::error::Error;
use crate::request::RequestSpec;
use futures::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::marker::PhantomData;
use tracing::debug;

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(alias = "data")]
    pub items: Vec<T>,
    /// Token for the following page; absent on the last page.
    #[serde(default, alias = "next")]
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.next_cursor.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Position of a cursor, shared by the async and blocking cursors.
#[derive(Debug, Default)]
pub(crate) struct CursorState {
    next: Next,
    seen: HashSet<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
enum Next {
    #[default]
    First,
    After(String),
    Done,
}

impl CursorState {
    /// Spec for the next round trip, or `None` once the last page was seen.
    pub(crate) fn next_spec(&self, template: &RequestSpec) -> Option<RequestSpec> {
        match &self.next {
            Next::First => Some(template.clone()),
            Next::After(token) => Some(template.with_cursor(token)),
            Next::Done => None,
        }
    }

    /// Record a received page's continuation token.
    ///
    /// A token that was already used would make the cursor loop forever, so
    /// it ends the cursor with a decode error instead.
    pub(crate) fn advance(&mut self, next_cursor: Option<&str>) -> Result<(), Error> {
        match next_cursor.filter(|t| !t.is_empty()) {
            None => {
                self.next = Next::Done;
                Ok(())
            }
            Some(token) if !self.seen.insert(token.to_string()) => {
                self.next = Next::Done;
                Err(Error::Decode(format!(
                    "server repeated pagination cursor {token:?}"
                )))
            }
            Some(token) => {
                self.next = Next::After(token.to_string());
                Ok(())
            }
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.next == Next::Done
    }
}

/// Forward-only, lazily fetched sequence of pages.
///
/// Creating the cursor performs no I/O. Each [`next_page`](Cursor::next_page)
/// is one round trip through the retry and decoding pipeline; after the last
/// page it keeps returning `Ok(None)` without touching the network. Call the
/// list method again for an independent cursor starting from the first page.
pub struct Cursor<T> {
    client: Client,
    template: RequestSpec,
    state: CursorState,
    pages: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Cursor<T> {
    pub(crate) fn new(client: Client, template: RequestSpec) -> Self {
        Self {
            client,
            template,
            state: CursorState::default(),
            pages: 0,
            _marker: PhantomData,
        }
    }

    /// Fetch the next page. A failed fetch leaves the position unchanged.
    pub async fn next_page(&mut self) -> Result<Option<Page<T>>, Error> {
        let Some(spec) = self.state.next_spec(&self.template) else {
            return Ok(None);
        };

        let page: Page<T> = self.client.send(&spec).await?;
        self.pages += 1;
        debug!(
            path = spec.path(),
            page = self.pages,
            items = page.items.len(),
            more = page.has_next(),
            "page received"
        );
        self.state.advance(page.next_cursor.as_deref())?;
        Ok(Some(page))
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    /// Pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Fetch every remaining page and concatenate the items.
    pub async fn collect_all(mut self) -> Result<Vec<T>, Error> {
        let mut out = Vec::new();
        while let Some(page) = self.next_page().await? {
            out.extend(page.items);
        }
        Ok(out)
    }
}

impl<T: DeserializeOwned + Send + 'static> Cursor<T> {
    /// Flatten into a stream of items, fetching pages as they are needed.
    pub fn into_items(self) -> impl Stream<Item = Result<T, Error>> + Send {
        futures::stream::try_unfold(
            (self, VecDeque::new()),
            |(mut cursor, mut buffered)| async move {
                loop {
                    if let Some(item) = buffered.pop_front() {
                        return Ok(Some((item, (cursor, buffered))));
                    }
                    match cursor.next_page().await? {
                        Some(page) => buffered.extend(page.items),
                        None => return Ok(None),
                    }
                }
            },
        )
    }
}

impl<T> std::fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("path", &self.template.path())
            .field("state", &self.state.next)
            .field("pages", &self.pages)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use crate::error::ErrorKind;
    use crate::transport::{AsyncTransport, ByteStream, RawResponse};
    use async_trait::async_trait;
    use futures::StreamExt;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Serves canned pages keyed by the `cursor` query parameter.
    struct PagedServer {
        pages: Vec<(Option<&'static str>, serde_json::Value)>,
        calls: AtomicUsize,
        seen: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl AsyncTransport for PagedServer {
        async fn execute(&self, spec: &RequestSpec) -> Result<RawResponse<ByteStream>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let cursor = spec
                .query()
                .iter()
                .find(|(k, _)| k == "cursor")
                .map(|(_, v)| v.clone());
            self.seen.lock().unwrap().push(cursor.clone());

            let body = self
                .pages
                .iter()
                .find(|(c, _)| c.map(str::to_string) == cursor)
                .map(|(_, body)| body.to_string())
                .expect("unexpected cursor");
            Ok(RawResponse::buffered(200, body))
        }
    }

    fn three_pages() -> Arc<PagedServer> {
        Arc::new(PagedServer {
            pages: vec![
                (None, json!({"items": [1, 2], "next_cursor": "t1"})),
                (Some("t1"), json!({"items": [3], "next_cursor": "t2"})),
                (Some("t2"), json!({"items": [4, 5], "next_cursor": null})),
            ],
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn cursor(server: Arc<PagedServer>) -> Cursor<u32> {
        let client = Client::builder()
            .api_key("nai_test_key")
            .transport(server)
            .build()
            .unwrap();
        let creds = Credentials::new("nai_test_key").unwrap();
        let spec = RequestSpec::builder(Method::GET, "/documents")
            .query("limit", 2)
            .build(&creds)
            .unwrap();
        Cursor::new(client, spec)
    }

    #[tokio::test]
    async fn test_pages_then_terminal() {
        let server = three_pages();
        let mut cursor = cursor(server.clone());

        let p1 = cursor.next_page().await.unwrap().unwrap();
        let p2 = cursor.next_page().await.unwrap().unwrap();
        let p3 = cursor.next_page().await.unwrap().unwrap();
        assert_eq!(p1.items, [1, 2]);
        assert_eq!(p2.items, [3]);
        assert_eq!(p3.items, [4, 5]);

        assert!(cursor.next_page().await.unwrap().is_none());
        assert!(cursor.next_page().await.unwrap().is_none());
        assert!(cursor.is_done());
        assert_eq!(server.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *server.seen.lock().unwrap(),
            [None, Some("t1".to_string()), Some("t2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_no_io_until_first_page() {
        let server = three_pages();
        let cursor = cursor(server.clone());
        assert_eq!(server.calls.load(Ordering::SeqCst), 0);
        drop(cursor);
    }

    #[tokio::test]
    async fn test_items_stream_and_collect() {
        let items: Vec<u32> = cursor(three_pages())
            .into_items()
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(items, [1, 2, 3, 4, 5]);

        let all = cursor(three_pages()).collect_all().await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_repeated_token_is_an_error() {
        let server = Arc::new(PagedServer {
            pages: vec![
                (None, json!({"items": [1], "next_cursor": "t1"})),
                (Some("t1"), json!({"items": [2], "next_cursor": "t1"})),
            ],
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        });
        let mut cursor = cursor(server.clone());

        assert!(cursor.next_page().await.unwrap().is_some());
        let err = cursor.next_page().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(cursor.next_page().await.unwrap().is_none());
        assert_eq!(server.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_page_aliases() {
        let page: Page<u8> = serde_json::from_str(r#"{"data": [1], "next": ""}"#).unwrap();
        assert_eq!(page.items, [1]);
        assert!(!page.has_next());

        let last: Page<u8> = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert!(last.next_cursor.is_none());
    }
}
