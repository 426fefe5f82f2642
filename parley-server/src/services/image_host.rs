use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use shared::config::server::MediaConfig;

/// Error returned by the image host collaborator.
#[derive(Debug, Error)]
#[error("image upload failed: {0}")]
pub struct ImageHostError(pub String);

/// External image store. Uploads a payload and returns a stable reference;
/// only the reference is persisted.
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Upload an image payload (a data URI) and return its stable URL.
    async fn upload(&self, payload: &str) -> Result<String, ImageHostError>;
}

/// Cloudinary-backed image host using an unsigned upload preset.
pub struct CloudinaryHost {
    client: reqwest::Client,
    config: MediaConfig,
}

impl CloudinaryHost {
    #[must_use]
    pub fn new(client: reqwest::Client, config: MediaConfig) -> Self {
        Self { client, config }
    }
}

impl std::fmt::Debug for CloudinaryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryHost")
            .field("upload_url", &self.config.upload_url)
            .finish()
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    #[instrument(skip(self, payload))]
    async fn upload(&self, payload: &str) -> Result<String, ImageHostError> {
        let response = self
            .client
            .post(&self.config.upload_url)
            .form(&[
                ("file", payload),
                ("upload_preset", &self.config.upload_preset),
            ])
            .send()
            .await
            .map_err(|err| ImageHostError(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ImageHostError(format!(
                "upload endpoint returned {}",
                response.status()
            )));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|err| ImageHostError(err.to_string()))?;

        Ok(body.secure_url)
    }
}

#[cfg(test)]
pub mod test_implementations {
    use super::*;

    /// In-memory image host returning a fixed reference.
    #[derive(Debug, Default)]
    pub struct StaticImageHost;

    #[async_trait]
    impl ImageHost for StaticImageHost {
        async fn upload(&self, _payload: &str) -> Result<String, ImageHostError> {
            Ok("https://images.example/static.png".to_string())
        }
    }

    /// Image host that always fails, for partial-failure tests.
    #[derive(Debug, Default)]
    pub struct FailingImageHost;

    #[async_trait]
    impl ImageHost for FailingImageHost {
        async fn upload(&self, _payload: &str) -> Result<String, ImageHostError> {
            Err(ImageHostError("host unavailable".to_string()))
        }
    }
}
