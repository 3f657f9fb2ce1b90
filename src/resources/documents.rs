//! Document upload and question answering.

use super::require;
use crate::dispatch::Dispatch;
use crate::error::Error;
use crate::request::RequestSpec;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Method;
use serde::{Deserialize, Serialize, Serializer};
use std::path::Path;

/// A document to upload. The content travels base64-encoded inside the JSON
/// body.
#[derive(Clone, PartialEq, Serialize)]
pub struct DocumentUpload {
    pub name: String,
    #[serde(rename = "file", serialize_with = "as_base64")]
    pub content: Vec<u8>,
    /// MIME type, e.g. `application/pdf`. Guessed by the server when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl DocumentUpload {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            content_type: None,
        }
    }

    /// Read `path` into memory, naming the document after the file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read(path)
            .map_err(|e| Error::Validation(format!("cannot read {}: {e}", path.display())))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, content))
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    fn validate(&self) -> Result<(), Error> {
        require("name", &self.name)?;
        if self.content.is_empty() {
            return Err(Error::validation("document content must not be empty"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for DocumentUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentUpload")
            .field("name", &self.name)
            .field("bytes", &self.content.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

fn as_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

/// An uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    /// Processing state, e.g. `processing` or `ready`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A question about an uploaded document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChat {
    pub document_id: String,
    pub message: String,
}

impl DocumentChat {
    pub fn new(document_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnswer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Source>,
}

/// Where in the document an answer came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub excerpt: Option<String>,
}

/// The `documents` namespace.
pub struct Documents<'a, C> {
    client: &'a C,
}

impl<'a, C: Dispatch> Documents<'a, C> {
    pub(crate) fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub fn upload(&self, upload: &DocumentUpload) -> C::Call<Document> {
        let spec = upload.validate().and_then(|()| {
            self.client
                .prepare(RequestSpec::builder(Method::POST, "/documents").json(upload))
        });
        self.client.call(spec)
    }

    /// Page through uploaded documents, newest first.
    pub fn list(&self) -> C::Pages<Document> {
        self.client
            .paginate(self.client.prepare(RequestSpec::builder(Method::GET, "/documents")))
    }

    pub fn get(&self, id: &str) -> C::Call<Document> {
        self.client.call(self.client.prepare(
            RequestSpec::builder(Method::GET, "/documents/{id}").path_param("id", id),
        ))
    }

    /// Ask a question about a document.
    pub fn chat(&self, chat: &DocumentChat) -> C::Call<DocumentAnswer> {
        let spec = require("message", &chat.message).and_then(|()| {
            self.client.prepare(
                RequestSpec::builder(Method::POST, "/documents/{document_id}/chat")
                    .path_param("document_id", &chat.document_id)
                    .json(&serde_json::json!({ "message": chat.message })),
            )
        });
        self.client.call(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::resources::testing;
    use reqwest::header::CONTENT_TYPE;

    const DOC: &str = r#"{"id":"doc_1","name":"Q4 Report","status":"ready","pages":12}"#;

    #[test]
    fn test_upload_encodes_content() {
        let (client, recorder) = testing::client(&[(200, DOC)]);

        let doc = client
            .documents()
            .upload(&DocumentUpload::new("Q4 Report", b"%PDF".to_vec()).content_type("application/pdf"))
            .unwrap();
        assert_eq!(doc.pages, Some(12));

        let spec = recorder.last();
        assert_eq!(spec.path(), "/documents");
        assert_eq!(spec.headers()[CONTENT_TYPE], "application/json");
        let body = spec.body().unwrap();
        assert_eq!(body["file"], "JVBERg==");
        assert_eq!(body["content_type"], "application/pdf");
    }

    #[test]
    fn test_empty_upload_rejected() {
        let (client, recorder) = testing::client(&[]);
        let err = client
            .documents()
            .upload(&DocumentUpload::new("empty.txt", Vec::new()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(recorder.calls(), 0);
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = DocumentUpload::from_path("/definitely/not/here.pdf").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_get_and_chat() {
        let (client, recorder) = testing::client(&[
            (200, DOC),
            (
                200,
                r#"{"answer":"Revenue grew 12%.","sources":[{"page":3,"excerpt":"Revenue..."}]}"#,
            ),
        ]);

        let doc = client.documents().get("doc_1").unwrap();
        assert_eq!(recorder.last().path(), "/documents/doc_1");

        let answer = client
            .documents()
            .chat(&DocumentChat::new(&doc.id, "What are the key findings?"))
            .unwrap();
        assert_eq!(answer.sources[0].page, Some(3));

        let spec = recorder.last();
        assert_eq!(spec.path(), "/documents/doc_1/chat");
        assert_eq!(spec.body().unwrap()["message"], "What are the key findings?");
    }

    #[test]
    fn test_list_follows_cursor() {
        let (client, recorder) = testing::client(&[
            (200, r#"{"data":[{"id":"d1","name":"a"}],"next_cursor":"c2"}"#),
            (200, r#"{"data":[{"id":"d2","name":"b"}]}"#),
        ]);

        let mut cursor = client.documents().list().unwrap();
        assert_eq!(recorder.calls(), 0);

        let first = cursor.next_page().unwrap().unwrap();
        assert_eq!(first.items[0].id, "d1");
        let second = cursor.next_page().unwrap().unwrap();
        assert_eq!(second.items[0].id, "d2");
        assert_eq!(recorder.last().query(), [("cursor".to_string(), "c2".to_string())]);

        assert!(cursor.next_page().unwrap().is_none());
        assert_eq!(recorder.calls(), 2);
    }
}
