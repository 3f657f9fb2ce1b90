//! Request descriptors and the builder that finalizes them.
//!
//! Every resource call produces exactly one [`RequestSpec`]. Specs are built
//! once, carry the auth header, and are only ever borrowed afterwards: the
//! retry driver and the pagination cursor never mutate one in place.

use crate::auth::Credentials;
use crate::error::Error;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;

/// Ordered query parameters. Keys may repeat.
pub type QueryParams = SmallVec<[(String, String); 4]>;

/// Header carrying the caller's idempotency key.
pub const IDEMPOTENCY_KEY: HeaderName = HeaderName::from_static("idempotency-key");

/// Query parameter the API reads pagination tokens from.
pub const CURSOR_PARAM: &str = "cursor";

/// A fully built, immutable request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    method: Method,
    path: String,
    query: QueryParams,
    body: Option<Value>,
    headers: HeaderMap,
    stream: bool,
    idempotency_key: Option<String>,
}

impl RequestSpec {
    /// Start building a request for `path_template` (e.g. `/market/stocks/{symbol}`).
    pub fn builder(method: Method, path_template: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, path_template)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Rendered path, placeholders substituted.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_stream(&self) -> bool {
        self.stream
    }

    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }

    /// True for methods whose repetition has no additional effect.
    pub fn is_idempotent(&self) -> bool {
        is_idempotent_method(&self.method)
    }

    /// True if sending this request more than once is safe.
    pub fn is_retry_safe(&self) -> bool {
        self.is_idempotent() || self.idempotency_key.is_some()
    }

    /// A copy of this spec asking for the page after `token`.
    ///
    /// Any cursor already present is replaced; other parameters keep their order.
    pub(crate) fn with_cursor(&self, token: &str) -> Self {
        let mut next = self.clone();
        next.query.retain(|(k, _)| k != CURSOR_PARAM);
        next.query.push((CURSOR_PARAM.to_string(), token.to_string()));
        next
    }
}

pub(crate) fn is_idempotent_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS
    )
}

/// Builder for [`RequestSpec`].
///
/// Argument problems are collected and reported by [`RequestBuilder::build`]
/// so call sites can chain without intermediate `?`.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    template: String,
    path_params: SmallVec<[(String, String); 2]>,
    query: QueryParams,
    body: Option<Value>,
    headers: Vec<(HeaderName, String)>,
    stream: bool,
    idempotency_key: Option<String>,
    error: Option<String>,
}

impl RequestBuilder {
    fn new(method: Method, template: impl Into<String>) -> Self {
        Self {
            method,
            template: template.into(),
            path_params: SmallVec::new(),
            query: SmallVec::new(),
            body: None,
            headers: Vec::new(),
            stream: false,
            idempotency_key: None,
            error: None,
        }
    }

    /// Value for a `{name}` placeholder in the path template.
    pub fn path_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.path_params.push((name.to_string(), value.into()));
        self
    }

    /// Append a query parameter.
    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    /// Append a query parameter if `value` is set.
    pub fn query_opt(self, name: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.query(name, v),
            None => self,
        }
    }

    /// Serialize `body` as the JSON request body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(v) => self.body = Some(v),
            Err(e) => self.fail(format!("body is not serializable: {e}")),
        }
        self
    }

    pub fn header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Request incremental (SSE) delivery.
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub(crate) fn has_idempotency_key(&self) -> bool {
        self.idempotency_key.is_some()
    }

    pub(crate) fn is_idempotent(&self) -> bool {
        is_idempotent_method(&self.method)
    }

    fn fail(&mut self, msg: String) {
        if self.error.is_none() {
            self.error = Some(msg);
        }
    }

    /// Finalize the request, attaching credentials.
    pub fn build(self, credentials: &Credentials) -> Result<RequestSpec, Error> {
        if let Some(msg) = self.error {
            return Err(Error::Validation(msg));
        }

        let path = render_path(&self.template, &self.path_params)?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, credentials.header_value()?);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(if self.stream {
                "text/event-stream"
            } else {
                "application/json"
            }),
        );
        if self.body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        for (name, value) in self.headers {
            if name == AUTHORIZATION {
                return Err(Error::validation(
                    "the authorization header is managed by the client",
                ));
            }
            let value = HeaderValue::from_str(&value)
                .map_err(|_| Error::Validation(format!("invalid value for header {name}")))?;
            headers.insert(name, value);
        }

        if let Some(key) = &self.idempotency_key {
            if key.is_empty() || key.len() > 255 || !key.bytes().all(|b| b.is_ascii_graphic()) {
                return Err(Error::validation(
                    "idempotency key must be 1-255 visible ASCII characters",
                ));
            }
            let value = HeaderValue::from_str(key)
                .map_err(|_| Error::validation("invalid idempotency key"))?;
            headers.insert(IDEMPOTENCY_KEY, value);
        }

        let mut body = self.body;
        if self.stream {
            if let Some(Value::Object(map)) = &mut body {
                map.insert("stream".to_string(), Value::Bool(true));
            }
        }

        Ok(RequestSpec {
            method: self.method,
            path,
            query: self.query,
            body,
            headers,
            stream: self.stream,
            idempotency_key: self.idempotency_key,
        })
    }
}

/// Substitute `{name}` placeholders, checking each value is a plain identifier.
fn render_path(template: &str, params: &[(String, String)]) -> Result<String, Error> {
    if !template.starts_with('/') {
        return Err(Error::Validation(format!(
            "path must start with '/': {template}"
        )));
    }

    let mut out = String::with_capacity(template.len() + 16);
    let mut used = SmallVec::<[&str; 2]>::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| Error::Validation(format!("unterminated placeholder in {template}")))?;
        let name = &after[..close];

        let value = params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| Error::Validation(format!("missing path parameter `{name}`")))?;
        validate_identifier(name, value)?;

        out.push_str(value);
        used.push(name);
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    if let Some((unused, _)) = params.iter().find(|(k, _)| !used.contains(&k.as_str())) {
        return Err(Error::Validation(format!(
            "path parameter `{unused}` is not used by {template}"
        )));
    }

    Ok(out)
}

/// Identifiers end up in URL paths, so only unreserved characters are allowed.
pub(crate) fn validate_identifier(name: &str, value: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::Validation(format!("`{name}` must not be empty")));
    }
    let ok = value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'~' | b':' | b'-'));
    if !ok || value == "." || value == ".." {
        return Err(Error::Validation(format!(
            "`{name}` is not a valid identifier: {value:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn creds() -> Credentials {
        Credentials::new("nai_test_key").unwrap()
    }

    #[test]
    fn test_auth_header_always_present() {
        let specs = [
            RequestSpec::builder(Method::GET, "/account/me").build(&creds()),
            RequestSpec::builder(Method::POST, "/chat/completions")
                .json(&json!({"messages": []}))
                .stream(true)
                .build(&creds()),
            RequestSpec::builder(Method::DELETE, "/documents/{id}")
                .path_param("id", "doc_1")
                .build(&creds()),
        ];

        for spec in specs {
            let spec = spec.unwrap();
            let auth = spec.headers().get(AUTHORIZATION).unwrap();
            assert!(!auth.is_empty());
        }
    }

    #[test]
    fn test_identical_inputs_give_equal_specs() {
        let build = || {
            RequestSpec::builder(Method::POST, "/writer/templates/{id}/generate")
                .path_param("id", "tpl_42")
                .query("lang", "en")
                .json(&json!({"variables": {"topic": "AI"}}))
                .idempotency_key("k-1")
                .build(&creds())
                .unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_path_rendering() {
        let spec = RequestSpec::builder(Method::GET, "/market/stocks/{symbol}")
            .path_param("symbol", "AAPL")
            .build(&creds())
            .unwrap();
        assert_eq!(spec.path(), "/market/stocks/AAPL");
    }

    #[test]
    fn test_missing_and_unused_path_params() {
        let missing = RequestSpec::builder(Method::GET, "/market/stocks/{symbol}").build(&creds());
        assert!(matches!(missing, Err(Error::Validation(m)) if m.contains("symbol")));

        let unused = RequestSpec::builder(Method::GET, "/account/me")
            .path_param("id", "x")
            .build(&creds());
        assert!(matches!(unused, Err(Error::Validation(_))));
    }

    #[test]
    fn test_malformed_identifiers() {
        for bad in ["", "a/b", "..", "x y", "ü", "a?b"] {
            let res = RequestSpec::builder(Method::GET, "/documents/{id}")
                .path_param("id", bad)
                .build(&creds());
            assert!(matches!(res, Err(Error::Validation(_))), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_stream_flag_in_body_and_accept() {
        let spec = RequestSpec::builder(Method::POST, "/chat/completions")
            .json(&json!({"messages": []}))
            .stream(true)
            .build(&creds())
            .unwrap();
        assert!(spec.is_stream());
        assert_eq!(spec.body().unwrap()["stream"], json!(true));
        assert_eq!(spec.headers()[ACCEPT], "text/event-stream");
        assert_eq!(spec.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_cannot_override_authorization() {
        let res = RequestSpec::builder(Method::GET, "/account/me")
            .header(AUTHORIZATION, "Bearer other")
            .build(&creds());
        assert!(matches!(res, Err(Error::Validation(_))));
    }

    #[test]
    fn test_retry_safety() {
        let get = RequestSpec::builder(Method::GET, "/account/me")
            .build(&creds())
            .unwrap();
        assert!(get.is_retry_safe());

        let post = RequestSpec::builder(Method::POST, "/image/generate")
            .build(&creds())
            .unwrap();
        assert!(!post.is_retry_safe());

        let keyed = RequestSpec::builder(Method::POST, "/image/generate")
            .idempotency_key("abc")
            .build(&creds())
            .unwrap();
        assert!(keyed.is_retry_safe());
        assert_eq!(keyed.headers()[IDEMPOTENCY_KEY], "abc");
    }

    #[test]
    fn test_with_cursor_replaces_token() {
        let spec = RequestSpec::builder(Method::GET, "/documents")
            .query("limit", 10)
            .build(&creds())
            .unwrap();
        let first = spec.with_cursor("t1");
        let second = first.with_cursor("t2");

        assert_eq!(spec.query().len(), 1);
        assert_eq!(
            second.query(),
            &[
                ("limit".to_string(), "10".to_string()),
                ("cursor".to_string(), "t2".to_string())
            ]
        );
    }

    #[test]
    fn test_repeated_query_keys_keep_order() {
        let spec = RequestSpec::builder(Method::GET, "/trends/search")
            .query("platforms", "youtube")
            .query("platforms", "reddit")
            .build(&creds())
            .unwrap();
        let values: Vec<_> = spec.query().iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, ["youtube", "reddit"]);
    }
}
