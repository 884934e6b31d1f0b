use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use metrics::counter;
use thiserror::Error;
use tracing::warn;

const METRIC_BACKEND_FAILURES: &str = "deckshelf_render_backend_failures_total";

/// What a backend needs to know to produce a deck image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub deckcode: String,
    pub shortid: String,
}

#[derive(Debug, Error)]
pub enum RenderBackendError {
    #[error("render target for `{backend}` could not be built: {message}")]
    InvalidTarget { backend: String, message: String },
    #[error("request to `{backend}` failed: {message}")]
    Transport { backend: String, message: String },
    #[error("`{backend}` responded with status {status}")]
    Status { backend: String, status: u16 },
    #[error("`{backend}` returned an empty body")]
    EmptyBody { backend: String },
    #[error("`{backend}` render task aborted: {message}")]
    Aborted { backend: String, message: String },
}

/// A service able to turn a deck into image bytes.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn render(&self, job: &RenderJob) -> Result<Bytes, RenderBackendError>;
}

#[derive(Debug)]
pub struct RaceWinner {
    pub backend: String,
    pub image: Bytes,
}

#[derive(Debug, Error)]
#[error("all {} render backends failed", failures.len())]
pub struct RaceError {
    pub failures: Vec<RenderBackendError>,
}

/// Run every backend concurrently and keep the first success.
///
/// Each backend call is a spawned task. Once a winner is found the remaining
/// handles are dropped, which detaches the tasks: they run to completion in
/// the background and their results are ignored.
pub async fn race_backends(
    backends: &[Arc<dyn RenderBackend>],
    job: &RenderJob,
) -> Result<RaceWinner, RaceError> {
    let job = Arc::new(job.clone());

    let mut pending: FuturesUnordered<_> = backends
        .iter()
        .map(|backend| {
            let backend = Arc::clone(backend);
            let job = Arc::clone(&job);
            let name = backend.name().to_string();
            let handle = tokio::spawn(async move { backend.render(&job).await });
            async move { (name, handle.await) }
        })
        .collect();

    let mut failures = Vec::new();
    while let Some((backend, joined)) = pending.next().await {
        let error = match joined {
            Ok(Ok(image)) => return Ok(RaceWinner { backend, image }),
            Ok(Err(err)) => err,
            Err(join_err) => RenderBackendError::Aborted {
                backend: backend.clone(),
                message: join_err.to_string(),
            },
        };

        counter!(METRIC_BACKEND_FAILURES, "backend" => backend.clone()).increment(1);
        warn!(
            target = "application::render::race_backends",
            backend = %backend,
            deckcode = %job.deckcode,
            error = %error,
            "render backend failed"
        );
        failures.push(error);
    }

    Err(RaceError { failures })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn job() -> RenderJob {
        RenderJob {
            deckcode: "CEBA/IAIF B4".into(),
            shortid: "x7K".into(),
        }
    }

    struct Scripted {
        name: &'static str,
        delay_ms: u64,
        result: Option<&'static [u8]>,
    }

    #[async_trait]
    impl RenderBackend for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn render(&self, _job: &RenderJob) -> Result<Bytes, RenderBackendError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            match self.result {
                Some(bytes) => Ok(Bytes::from_static(bytes)),
                None => Err(RenderBackendError::Status {
                    backend: self.name.to_string(),
                    status: 502,
                }),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fast_failure_does_not_beat_slow_success() {
        let backends: Vec<Arc<dyn RenderBackend>> = vec![
            Arc::new(Scripted {
                name: "fails",
                delay_ms: 1,
                result: None,
            }),
            Arc::new(Scripted {
                name: "works",
                delay_ms: 50,
                result: Some(b"png"),
            }),
        ];

        let winner = race_backends(&backends, &job()).await.expect("one succeeds");
        assert_eq!(winner.backend, "works");
        assert_eq!(winner.image, Bytes::from_static(b"png"));
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_wins() {
        let backends: Vec<Arc<dyn RenderBackend>> = vec![
            Arc::new(Scripted {
                name: "slow",
                delay_ms: 500,
                result: Some(b"slow"),
            }),
            Arc::new(Scripted {
                name: "fast",
                delay_ms: 5,
                result: Some(b"fast"),
            }),
        ];

        let winner = race_backends(&backends, &job()).await.expect("one succeeds");
        assert_eq!(winner.backend, "fast");
    }

    #[tokio::test]
    async fn collects_every_failure() {
        let backends: Vec<Arc<dyn RenderBackend>> = vec![
            Arc::new(Scripted {
                name: "a",
                delay_ms: 0,
                result: None,
            }),
            Arc::new(Scripted {
                name: "b",
                delay_ms: 0,
                result: None,
            }),
        ];

        let err = race_backends(&backends, &job()).await.unwrap_err();
        assert_eq!(err.failures.len(), 2);
        assert_eq!(err.to_string(), "all 2 render backends failed");
    }

    #[tokio::test]
    async fn no_backends_is_a_failed_race() {
        let err = race_backends(&[], &job()).await.unwrap_err();
        assert!(err.failures.is_empty());
    }
}
