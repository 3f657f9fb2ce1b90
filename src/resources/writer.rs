//! AI writer: free-form and template-based content generation.

use super::require;
use crate::dispatch::Dispatch;
use crate::error::Error;
use crate::request::RequestSpec;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters of a writer generation.
///
/// Exactly one of `prompt` and `template_id` must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriterRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,
    /// e.g. `product_description`, `blog_post`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl WriterRequest {
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    pub fn template(template_id: impl Into<String>) -> Self {
        Self {
            template_id: Some(template_id.into()),
            ..Self::default()
        }
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = Some(tone.into());
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    fn validate(&self) -> Result<(), Error> {
        match (&self.prompt, &self.template_id) {
            (Some(_), Some(_)) => Err(Error::validation(
                "prompt and template_id are mutually exclusive",
            )),
            (None, None) => Err(Error::validation("either prompt or template_id is required")),
            (Some(prompt), None) => require("prompt", prompt),
            (None, Some(id)) => require("template_id", id),
        }
    }
}

/// Generated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub word_count: u32,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// A reusable writer template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Names of the variables the template expects.
    #[serde(default)]
    pub variables: Vec<String>,
}

/// The `writer` namespace.
pub struct Writer<'a, C> {
    client: &'a C,
}

impl<'a, C: Dispatch> Writer<'a, C> {
    pub(crate) fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Generate content from a prompt or a template.
    pub fn generate(&self, request: &WriterRequest) -> C::Call<GeneratedContent> {
        let spec = request.validate().and_then(|()| {
            self.client
                .prepare(RequestSpec::builder(Method::POST, "/writer/generate").json(request))
        });
        self.client.call(spec)
    }

    pub fn templates(&self) -> Templates<'a, C> {
        Templates {
            client: self.client,
        }
    }
}

/// The `writer.templates` namespace.
pub struct Templates<'a, C> {
    client: &'a C,
}

impl<C: Dispatch> Templates<'_, C> {
    /// Page through the available templates.
    pub fn list(&self) -> C::Pages<Template> {
        self.client
            .paginate(self.client.prepare(RequestSpec::builder(Method::GET, "/writer/templates")))
    }

    /// Generate content from template `template_id`.
    pub fn generate(
        &self,
        template_id: &str,
        variables: Map<String, Value>,
    ) -> C::Call<GeneratedContent> {
        let spec = require("template_id", template_id).and_then(|()| {
            self.client.prepare(
                RequestSpec::builder(Method::POST, "/writer/templates/{template_id}/generate")
                    .path_param("template_id", template_id)
                    .json(&serde_json::json!({ "variables": variables })),
            )
        });
        self.client.call(spec)
    }
}
