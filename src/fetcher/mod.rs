//! Ingestion of raw links.
//!
//! A [`Source`] produces one text blob (a subscription body, a SingBox
//! document, a plain list). [`split_blob`] cuts a blob into individual
//! candidates and [`collect_all`] runs many sources at once, swallowing the
//! failure of any single source.

mod config;

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
pub use config::Config;
use fake::{faker::internet::en::UserAgent, Fake};
use http_body_util::{BodyExt, Empty};
use hyper::{body::Bytes, Request};
use hyper_tls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::Value;
use tokio::{sync::Semaphore, task::JoinHandle, time};

use crate::decoder::{decode_base64, singbox};

/// Something that yields a blob of proxy links.
#[async_trait]
pub trait Source: Send + Sync {
    /// Label used in log messages.
    fn name(&self) -> String;

    /// Fetches the raw blob.
    async fn fetch(&self) -> anyhow::Result<String>;
}

/// Reads links from a local file.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Source for FileSource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> anyhow::Result<String> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }
}

/// Downloads links over HTTP(S).
pub struct UrlSource {
    url: String,
    client: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
}

impl UrlSource {
    pub fn new(url: impl Into<String>) -> Self {
        let client =
            Client::builder(TokioExecutor::new()).build::<_, Empty<Bytes>>(HttpsConnector::new());
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Source for UrlSource {
    fn name(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> anyhow::Result<String> {
        let req = Request::builder()
            .uri(self.url.as_str())
            .header(hyper::header::USER_AGENT, UserAgent().fake::<&str>())
            .body(Empty::<Bytes>::new())?;

        let response = self.client.request(req).await?;
        if !response.status().is_success() {
            anyhow::bail!("unexpected status {}", response.status());
        }
        let body = response.into_body().collect().await?.to_bytes();
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect()
}

/// Cuts a fetched blob into individual link candidates.
///
/// * JSON documents (SingBox configs or bare outbound arrays) yield one compact
///   JSON object per outbound.
/// * A body that is base64 as a whole is decoded first.
/// * Anything else is split into lines; blank lines and `#` comments are dropped.
pub fn split_blob(blob: &str) -> Vec<String> {
    let blob = blob.trim();
    if blob.starts_with('{') || blob.starts_with('[') {
        if let Ok(document) = serde_json::from_str::<Value>(blob) {
            return singbox::expand(&document)
                .iter()
                .map(Value::to_string)
                .collect();
        }
    }

    if !blob.is_empty() && !blob.contains("://") {
        if let Ok(decoded) = decode_base64(blob) {
            if decoded.contains("://") {
                return split_lines(&decoded);
            }
        }
    }
    split_lines(blob)
}

async fn do_work(source: Arc<dyn Source>, timeout: Duration) -> anyhow::Result<Vec<String>> {
    let blob = time::timeout(timeout, source.fetch())
        .await
        .map_err(|_| anyhow::anyhow!("timed out after {:?}", timeout))??;
    Ok(split_blob(&blob))
}

/// Fetches every source concurrently and concatenates their candidates.
///
/// A source that fails or times out is logged and contributes nothing.
pub async fn collect_all(sources: Vec<Arc<dyn Source>>, config: &Config) -> Vec<String> {
    let timer = time::Instant::now();
    let sem = Arc::new(Semaphore::new(config.concurrency_limit.max(1)));
    let timeout = Duration::from_millis(config.request_timeout);

    #[cfg(feature = "log")]
    log::debug!("Collecting links from {} sources", sources.len());

    let handlers: Vec<(String, JoinHandle<anyhow::Result<Vec<String>>>)> = sources
        .into_iter()
        .map(|source| {
            let permit = Arc::clone(&sem);
            let name = source.name();
            let handler = tokio::spawn(async move {
                let _permit = permit.acquire_owned().await?;
                do_work(source, timeout).await
            });
            (name, handler)
        })
        .collect();

    let mut raws = vec![];
    for (_name, handler) in handlers {
        match handler.await {
            Ok(Ok(items)) => {
                #[cfg(feature = "log")]
                log::debug!("{}: {} candidates", _name, items.len());
                raws.extend(items);
            }
            Ok(Err(_e)) => {
                #[cfg(feature = "log")]
                log::warn!("{}: {}", _name, _e);
            }
            Err(_e) => {
                #[cfg(feature = "log")]
                log::warn!("{}: fetch task failed: {}", _name, _e);
            }
        }
    }

    #[cfg(feature = "log")]
    log::info!(
        "Collected {} candidates in {:?}",
        raws.len(),
        timer.elapsed()
    );
    #[cfg(not(feature = "log"))]
    let _ = timer;
    raws
}
