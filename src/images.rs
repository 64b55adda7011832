//! Third-party image hosting. Only the returned URL is ever stored; raw
//! payloads never reach the document store.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::{CloudinaryConfig, Config, DEFAULT_PROFILE_PIC};
use crate::core::helpers::new_id;

pub enum ImageHost {
    Cloudinary(Cloudinary),
    Memory(MemoryImages),
    Unconfigured,
}

impl ImageHost {
    pub fn from_config(config: &Config) -> Self {
        match &config.cloudinary {
            Some(c) => ImageHost::Cloudinary(Cloudinary::new(c.clone())),
            None => ImageHost::Unconfigured,
        }
    }

    pub fn as_memory(&self) -> Option<&MemoryImages> {
        match self {
            ImageHost::Memory(m) => Some(m),
            _ => None,
        }
    }

    /// Uploads `data` (a data URI, base64 payload or remote URL) and returns the
    /// hosted URL.
    pub async fn upload(&self, data: &str) -> anyhow::Result<String> {
        match self {
            ImageHost::Cloudinary(c) => c.upload(data).await,
            ImageHost::Memory(m) => m.upload(data),
            ImageHost::Unconfigured => anyhow::bail!("image hosting is not configured"),
        }
    }

    pub async fn destroy(&self, url: &str) -> anyhow::Result<()> {
        let public_id = match public_id_from_url(url) {
            Some(id) => id,
            None => anyhow::bail!("cannot derive image id from '{}'", url),
        };
        match self {
            ImageHost::Cloudinary(c) => c.destroy(&public_id).await,
            ImageHost::Memory(m) => m.destroy(url),
            ImageHost::Unconfigured => {
                debug!("Image hosting not configured, leaving {} in place", url);
                Ok(())
            }
        }
    }

    /// Deletes a hosted image, logging instead of failing. Used where the
    /// local change has already been committed.
    pub async fn destroy_best_effort(&self, url: &str) {
        if url.is_empty() || url == DEFAULT_PROFILE_PIC {
            return;
        }
        if let Err(e) = self.destroy(url).await {
            warn!("Failed to delete hosted image {}: {:#}", url, e);
        }
    }
}

/// Hosting id of an image: the last path segment without its extension.
pub fn public_id_from_url(url: &str) -> Option<String> {
    let last = url.split('/').last()?;
    let id = last.split('.').next()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

pub struct Cloudinary {
    config: CloudinaryConfig,
}

impl Cloudinary {
    pub fn new(config: CloudinaryConfig) -> Self {
        Self { config }
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/{}",
            self.config.cloud_name, action
        )
    }

    /// `params` must already be sorted by key.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let to_sign = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let mut hasher = Sha256::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.config.api_secret.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn form(&self, params: &[(&str, &str)]) -> String {
        let signature = self.sign(params);
        let mut fields: Vec<(&str, &str)> = params.to_vec();
        fields.push(("api_key", self.config.api_key.as_str()));
        fields.push(("signature", signature.as_str()));
        fields.push(("signature_algorithm", "sha256"));
        fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    async fn upload(&self, data: &str) -> anyhow::Result<String> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let mut body = self.form(&[("timestamp", timestamp.as_str())]);
        body.push_str("&file=");
        body.push_str(&urlencoding::encode(data));

        let response = transport::post_form(&self.endpoint("upload"), body).await?;
        response["secure_url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("upload response has no secure_url: {}", response))
    }

    async fn destroy(&self, public_id: &str) -> anyhow::Result<()> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let body = self.form(&[("public_id", public_id), ("timestamp", timestamp.as_str())]);

        let response = transport::post_form(&self.endpoint("destroy"), body).await?;
        match response["result"].as_str() {
            Some("ok") | Some("not found") => Ok(()),
            _ => anyhow::bail!("destroy of {} rejected: {}", public_id, response),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod transport {
    pub async fn post_form(url: &str, body: String) -> anyhow::Result<serde_json::Value> {
        let response = reqwest::Client::new()
            .post(url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let value: serde_json::Value = response.json().await?;
        if !status.is_success() {
            anyhow::bail!("image host returned {}: {}", status, value);
        }
        Ok(value)
    }
}

#[cfg(target_arch = "wasm32")]
mod transport {
    use spin_sdk::http::{Method, Request, Response};

    pub async fn post_form(url: &str, body: String) -> anyhow::Result<serde_json::Value> {
        let request = Request::builder()
            .method(Method::Post)
            .uri(url)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body.into_bytes())
            .build();
        let response: Response = spin_sdk::http::send(request)
            .await
            .map_err(|e| anyhow::anyhow!("image host request failed: {:?}", e))?;
        let status = *response.status();
        let value: serde_json::Value = serde_json::from_slice(response.body())?;
        if !(200..300).contains(&status) {
            anyhow::bail!("image host returned {}: {}", status, value);
        }
        Ok(value)
    }
}

/// In-process image host for local runs and tests. Records what was uploaded
/// and deleted and can be told to fail.
#[derive(Default)]
pub struct MemoryImages {
    uploaded: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }

    fn upload(&self, data: &str) -> anyhow::Result<String> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            anyhow::bail!("upload rejected by image host");
        }
        if data.trim().is_empty() {
            anyhow::bail!("empty image payload");
        }
        let url = format!("https://images.local/plaza/{}.png", new_id());
        self.uploaded.lock().push(url.clone());
        Ok(url)
    }

    fn destroy(&self, url: &str) -> anyhow::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            anyhow::bail!("delete rejected by image host");
        }
        self.deleted.lock().push(url.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_id_is_last_segment_without_extension() {
        assert_eq!(
            public_id_from_url("https://res.cloudinary.com/demo/image/upload/v1/abc123.jpg"),
            Some("abc123".to_string())
        );
        assert_eq!(public_id_from_url("plain"), Some("plain".to_string()));
        assert_eq!(public_id_from_url("https://host/"), None);
    }

    #[test]
    fn signature_covers_sorted_params_and_secret() {
        let c = Cloudinary::new(CloudinaryConfig {
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
        });
        let mut hasher = Sha256::new();
        hasher.update(b"public_id=abc&timestamp=10secret");
        let expected = format!("{:x}", hasher.finalize());
        assert_eq!(c.sign(&[("public_id", "abc"), ("timestamp", "10")]), expected);
    }
}
