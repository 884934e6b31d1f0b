//! HTTP render backends.
//!
//! The internal renderer is always configured; the urlbox screenshot
//! service joins the race when enabled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::application::render::{RenderBackend, RenderBackendError, RenderJob};
use crate::config::RenderSettings;

const URLBOX_ENDPOINT: &str = "https://api.urlbox.io/v1";

/// Where an HTTP backend fetches the image from.
#[derive(Debug, Clone)]
pub enum RenderTarget {
    /// `{site_url}/api/render/{deckcode}`
    Internal { site_url: Url },
    /// Screenshot of the public short link through urlbox.
    Urlbox { api_key: String, short_url_base: Url },
}

impl RenderTarget {
    pub fn name(&self) -> &'static str {
        match self {
            RenderTarget::Internal { .. } => "internal",
            RenderTarget::Urlbox { .. } => "urlbox",
        }
    }

    pub fn url_for(&self, job: &RenderJob) -> Result<Url, String> {
        match self {
            RenderTarget::Internal { site_url } => {
                append_segments(site_url, &["api", "render", &job.deckcode])
            }
            RenderTarget::Urlbox {
                api_key,
                short_url_base,
            } => {
                let mut snapshot = append_segments(short_url_base, &[&job.shortid])?;
                snapshot.set_query(Some("snapshot=1"));

                let endpoint = format!("{URLBOX_ENDPOINT}/{api_key}/png");
                Url::parse_with_params(
                    &endpoint,
                    &[
                        ("url", snapshot.as_str()),
                        ("selector", "#snap"),
                        ("wait_timeout", "3000"),
                        ("wait_until", "domloaded"),
                    ],
                )
                .map_err(|err| err.to_string())
            }
        }
    }
}

fn append_segments(base: &Url, segments: &[&str]) -> Result<Url, String> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| format!("`{base}` cannot be used as a base url"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Fetches a rendered image over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpRenderBackend {
    client: Client,
    target: RenderTarget,
}

impl HttpRenderBackend {
    pub fn new(client: Client, target: RenderTarget) -> Self {
        Self { client, target }
    }

    pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
        Client::builder()
            .user_agent(concat!("deckshelf/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
    }
}

#[async_trait]
impl RenderBackend for HttpRenderBackend {
    fn name(&self) -> &str {
        self.target.name()
    }

    async fn render(&self, job: &RenderJob) -> Result<Bytes, RenderBackendError> {
        let backend = self.name().to_string();
        let url = self
            .target
            .url_for(job)
            .map_err(|message| RenderBackendError::InvalidTarget {
                backend: backend.clone(),
                message,
            })?;

        debug!(
            target = "infra::render::http_backend",
            backend = %backend,
            deckcode = %job.deckcode,
            "requesting render"
        );

        let response = self.client.get(url).send().await.map_err(|err| {
            RenderBackendError::Transport {
                backend: backend.clone(),
                message: err.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderBackendError::Status {
                backend,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| RenderBackendError::Transport {
                backend: backend.clone(),
                message: err.to_string(),
            })?;

        if body.is_empty() {
            return Err(RenderBackendError::EmptyBody { backend });
        }

        Ok(body)
    }
}

/// Backends to race for every render, in configuration order.
pub fn backends_from_settings(
    render: &RenderSettings,
) -> Result<Vec<Arc<dyn RenderBackend>>, reqwest::Error> {
    let client = HttpRenderBackend::build_client(render.request_timeout)?;

    let mut backends: Vec<Arc<dyn RenderBackend>> = vec![Arc::new(HttpRenderBackend::new(
        client.clone(),
        RenderTarget::Internal {
            site_url: render.site_url.clone(),
        },
    ))];

    if let Some(urlbox) = render.urlbox.as_ref() {
        backends.push(Arc::new(HttpRenderBackend::new(
            client,
            RenderTarget::Urlbox {
                api_key: urlbox.api_key.clone(),
                short_url_base: render.short_url_base.clone(),
            },
        )));
    }

    Ok(backends)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> RenderJob {
        RenderJob {
            deckcode: "CEBA/IAIF B4".into(),
            shortid: "x7K".into(),
        }
    }

    #[test]
    fn internal_target_encodes_deckcode_as_one_segment() {
        let target = RenderTarget::Internal {
            site_url: Url::parse("https://decks.example/").unwrap(),
        };
        let url = target.url_for(&job()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://decks.example/api/render/CEBA%2FIAIF%20B4"
        );
    }

    #[test]
    fn internal_target_keeps_base_path() {
        let target = RenderTarget::Internal {
            site_url: Url::parse("https://decks.example/app/").unwrap(),
        };
        let url = target.url_for(&job()).unwrap();
        assert!(url.as_str().starts_with("https://decks.example/app/api/render/"));
    }

    #[test]
    fn urlbox_target_wraps_snapshot_link() {
        let target = RenderTarget::Urlbox {
            api_key: "key123".into(),
            short_url_base: Url::parse("https://decks.example").unwrap(),
        };
        let url = target.url_for(&job()).unwrap();
        assert_eq!(url.host_str(), Some("api.urlbox.io"));
        assert_eq!(url.path(), "/v1/key123/png");

        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(params.contains(&(
            "url".to_string(),
            "https://decks.example/x7K?snapshot=1".to_string()
        )));
        assert!(params.contains(&("selector".to_string(), "#snap".to_string())));
        assert!(params.contains(&("wait_until".to_string(), "domloaded".to_string())));
    }
}
