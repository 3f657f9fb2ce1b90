//! Image generation and editing.

use super::require;
use crate::dispatch::Dispatch;
use crate::error::Error;
use crate::request::RequestSpec;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Method;
use serde::{Deserialize, Serialize, Serializer};
use std::path::Path;

/// Parameters of an image generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRequest {
    pub prompt: String,
    /// e.g. `1024x1024`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            size: None,
            quality: None,
            style: None,
        }
    }

    pub fn size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }
}

/// Parameters of an image edit. The source image travels base64-encoded.
#[derive(Clone, PartialEq, Serialize)]
pub struct ImageEditRequest {
    #[serde(serialize_with = "as_base64")]
    pub image: Vec<u8>,
    pub prompt: String,
    /// How far the result may depart from the source, in `[0, 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
}

impl ImageEditRequest {
    pub fn new(image: impl Into<Vec<u8>>, prompt: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            prompt: prompt.into(),
            strength: None,
        }
    }

    pub fn strength(mut self, strength: f32) -> Self {
        self.strength = Some(strength);
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if self.image.is_empty() {
            return Err(Error::validation("image must not be empty"));
        }
        require("prompt", &self.prompt)?;
        match self.strength {
            Some(s) if !(0.0..=1.0).contains(&s) => Err(Error::Validation(format!(
                "strength must be within [0, 1], got {s}"
            ))),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for ImageEditRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageEditRequest")
            .field("image_bytes", &self.image.len())
            .field("prompt", &self.prompt)
            .field("strength", &self.strength)
            .finish()
    }
}

fn as_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

/// A generated or edited image, as a URL or inline data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub b64_json: Option<String>,
    #[serde(default)]
    pub revised_prompt: Option<String>,
}

impl GeneratedImage {
    /// Decode inline image data, if the server sent any.
    pub fn bytes(&self) -> Result<Option<Vec<u8>>, Error> {
        self.b64_json
            .as_deref()
            .map(|data| {
                STANDARD
                    .decode(data)
                    .map_err(|e| Error::Decode(format!("image data: {e}")))
            })
            .transpose()
    }

    /// Write the inline image data to `path`.
    ///
    /// URL-only images have nothing to write and fail with [`Error::Validation`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let data = self
            .bytes()?
            .ok_or_else(|| Error::validation("image has no inline data, fetch it from `url`"))?;
        std::fs::write(path, data)
            .map_err(|e| Error::Validation(format!("cannot write {}: {e}", path.display())))
    }
}

/// The `image` namespace.
pub struct Image<'a, C> {
    client: &'a C,
}

impl<'a, C: Dispatch> Image<'a, C> {
    pub(crate) fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub fn generate(&self, request: &ImageRequest) -> C::Call<GeneratedImage> {
        let spec = require("prompt", &request.prompt).and_then(|()| {
            self.client
                .prepare(RequestSpec::builder(Method::POST, "/image/generate").json(request))
        });
        self.client.call(spec)
    }

    pub fn edit(&self, request: &ImageEditRequest) -> C::Call<GeneratedImage> {
        let spec = request.validate().and_then(|()| {
            self.client
                .prepare(RequestSpec::builder(Method::POST, "/image/edit").json(request))
        });
        self.client.call(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::resources::testing;

    #[test]
    fn test_generate() {
        let (client, recorder) =
            testing::client(&[(200, r#"{"url":"https://cdn.example/lake.png"}"#)]);

        let image = client
            .image()
            .generate(&ImageRequest::new("A mountain lake").size("1024x1024").quality("hd"))
            .unwrap();
        assert_eq!(image.url.as_deref(), Some("https://cdn.example/lake.png"));
        assert_eq!(image.bytes().unwrap(), None);
        assert_eq!(recorder.last().body().unwrap()["quality"], "hd");
    }

    #[test]
    fn test_edit_sends_base64() {
        let (client, recorder) = testing::client(&[(200, r#"{"b64_json":"AQID"}"#)]);

        let edited = client
            .image()
            .edit(&ImageEditRequest::new(vec![0xff, 0x00], "Add a rainbow").strength(0.5))
            .unwrap();
        assert_eq!(edited.bytes().unwrap(), Some(vec![1, 2, 3]));

        let body = recorder.last().body().cloned().unwrap();
        assert_eq!(body["image"], "/wA=");
        assert_eq!(body["strength"], 0.5);
    }

    #[test]
    fn test_save_writes_inline_data() {
        let path = std::env::temp_dir().join(format!("nemati-{}.png", uuid::Uuid::new_v4()));
        let inline: GeneratedImage = serde_json::from_str(r#"{"b64_json":"AQID"}"#).unwrap();

        inline.save(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), [1, 2, 3]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_save_url_only_image() {
        let path = std::env::temp_dir().join(format!("nemati-{}.png", uuid::Uuid::new_v4()));
        let remote: GeneratedImage =
            serde_json::from_str(r#"{"url":"https://cdn.example/lake.png"}"#).unwrap();

        let err = remote.save(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!path.exists());
    }

    #[test]
    fn test_strength_out_of_range() {
        let (client, recorder) = testing::client(&[]);
        for strength in [-0.1, 1.5, f32::NAN] {
            let err = client
                .image()
                .edit(&ImageEditRequest::new(vec![1], "x").strength(strength))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert_eq!(recorder.calls(), 0);
    }
}
