// src/nomad/client.rs

//! HTTP implementation of [`NomadApi`] on top of `reqwest`.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, trace};

use super::frames::JsonFrameDecoder;
use super::model::{
    Allocation, Deployment, EventBatch, Evaluation, Job, JobSummary, LogFrame, RegisterResponse,
    StreamFrame,
};
use super::{BoxFuture, EventFeed, LogFeed, LogRequest, NomadApi};
use crate::config::NomadSettings;
use crate::errors::{Result, WatchError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpNomad {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpNomad {
    pub fn new(settings: &NomadSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| WatchError::ConfigError(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.address.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let mut req = self.client.request(method, self.url(path));
        if let Some(token) = &self.token {
            req = req.header("X-Nomad-Token", token);
        }
        req
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        debug!(path, "GET");
        let response = self
            .request(reqwest::Method::GET, path)
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let response = check_status(response, path).await?;
        Ok(response.json().await?)
    }
}

/// Map non-success responses onto the error classes the watcher reacts to.
async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = format!("{what}: {status} {}", body.trim());
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => WatchError::Unauthorized(detail),
        StatusCode::NOT_FOUND => WatchError::NotFound(detail),
        _ => WatchError::Transport(detail),
    })
}

impl NomadApi for HttpNomad {
    fn job<'a>(&'a self, namespace: &'a str, job_id: &'a str) -> BoxFuture<'a, Result<Job>> {
        Box::pin(async move {
            self.get_json(&format!("job/{job_id}"), &[("namespace", namespace)])
                .await
        })
    }

    fn job_evaluations<'a>(
        &'a self,
        namespace: &'a str,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Evaluation>>> {
        Box::pin(async move {
            self.get_json(
                &format!("job/{job_id}/evaluations"),
                &[("namespace", namespace)],
            )
            .await
        })
    }

    fn job_allocations<'a>(
        &'a self,
        namespace: &'a str,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Allocation>>> {
        Box::pin(async move {
            self.get_json(
                &format!("job/{job_id}/allocations"),
                &[("namespace", namespace), ("all", "true")],
            )
            .await
        })
    }

    fn job_deployments<'a>(
        &'a self,
        namespace: &'a str,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Deployment>>> {
        Box::pin(async move {
            self.get_json(
                &format!("job/{job_id}/deployments"),
                &[("namespace", namespace)],
            )
            .await
        })
    }

    fn job_summary<'a>(
        &'a self,
        namespace: &'a str,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<JobSummary>> {
        Box::pin(async move {
            self.get_json(&format!("job/{job_id}/summary"), &[("namespace", namespace)])
                .await
        })
    }

    fn allocation<'a>(&'a self, alloc_id: &'a str) -> BoxFuture<'a, Result<Allocation>> {
        Box::pin(async move {
            self.get_json(&format!("allocation/{alloc_id}"), &[("namespace", "*")])
                .await
        })
    }

    fn allocations_by_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Allocation>>> {
        Box::pin(async move {
            self.get_json("allocations", &[("prefix", prefix), ("namespace", "*")])
                .await
        })
    }

    fn evaluation<'a>(&'a self, eval_id: &'a str) -> BoxFuture<'a, Result<Evaluation>> {
        Box::pin(async move {
            self.get_json(&format!("evaluation/{eval_id}"), &[("namespace", "*")])
                .await
        })
    }

    fn stop_job<'a>(
        &'a self,
        namespace: &'a str,
        job_id: &'a str,
        purge: bool,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let path = format!("job/{job_id}");
            debug!(job = job_id, namespace, purge, "DELETE");
            let response = self
                .request(reqwest::Method::DELETE, &path)
                .query(&[
                    ("namespace", namespace),
                    ("purge", if purge { "true" } else { "false" }),
                ])
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await?;
            let response = check_status(response, &path).await?;
            let body: RegisterResponse = response.json().await?;
            Ok(body.eval_id)
        })
    }

    fn parse_job<'a>(&'a self, hcl: &'a str) -> BoxFuture<'a, Result<serde_json::Value>> {
        Box::pin(async move {
            let response = self
                .request(reqwest::Method::POST, "jobs/parse")
                .json(&json!({ "JobHCL": hcl, "Canonicalize": true }))
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await?;
            let response = check_status(response, "jobs/parse").await?;
            Ok(response.json().await?)
        })
    }

    fn register_job<'a>(
        &'a self,
        namespace: &'a str,
        job: serde_json::Value,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let response = self
                .request(reqwest::Method::POST, "jobs")
                .query(&[("namespace", namespace)])
                .json(&json!({ "Job": job }))
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await?;
            let response = check_status(response, "jobs").await?;
            let body: RegisterResponse = response.json().await?;
            Ok(body.eval_id)
        })
    }

    fn event_stream<'a>(
        &'a self,
        namespace: &'a str,
        topics: &'a [String],
        index: u64,
    ) -> BoxFuture<'a, Result<Box<dyn EventFeed>>> {
        Box::pin(async move {
            let index = index.to_string();
            let mut query: Vec<(&str, &str)> = topics.iter().map(|t| ("topic", t.as_str())).collect();
            query.push(("namespace", namespace));
            query.push(("index", index.as_str()));
            debug!(?topics, namespace, index = %index, "subscribing to event stream");

            let response = self
                .request(reqwest::Method::GET, "event/stream")
                .query(&query)
                .send()
                .await?;
            let response = check_status(response, "event/stream").await?;
            Ok(Box::new(HttpStream::new(response)) as Box<dyn EventFeed>)
        })
    }

    fn log_stream<'a>(&'a self, request: &'a LogRequest) -> BoxFuture<'a, Result<Box<dyn LogFeed>>> {
        Box::pin(async move {
            let path = format!("client/fs/logs/{}", request.alloc_id);
            let offset = request.offset.to_string();
            debug!(
                alloc = %request.alloc_id,
                task = %request.task,
                kind = request.kind.as_str(),
                origin = request.origin.as_str(),
                offset = request.offset,
                "opening log stream"
            );
            let response = self
                .request(reqwest::Method::GET, &path)
                .query(&[
                    ("task", request.task.as_str()),
                    ("type", request.kind.as_str()),
                    ("follow", "true"),
                    ("origin", request.origin.as_str()),
                    ("offset", offset.as_str()),
                ])
                .send()
                .await?;
            let response = check_status(response, &path).await?;
            Ok(Box::new(HttpStream::new(response)) as Box<dyn LogFeed>)
        })
    }
}

/// A chunked response decoded as a sequence of JSON values.
struct HttpStream {
    response: Response,
    decoder: JsonFrameDecoder,
}

impl HttpStream {
    fn new(response: Response) -> Self {
        Self {
            response,
            decoder: JsonFrameDecoder::new(),
        }
    }

    async fn next_value<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(decoded) = self.decoder.next_value::<T>() {
                return decoded.map(Some).map_err(WatchError::from);
            }
            match self.response.chunk().await? {
                Some(bytes) => {
                    trace!(len = bytes.len(), "stream chunk");
                    self.decoder.push(&bytes);
                }
                None => return Ok(None),
            }
        }
    }
}

impl EventFeed for HttpStream {
    fn next_batch(&mut self) -> BoxFuture<'_, Result<Option<EventBatch>>> {
        Box::pin(self.next_value::<EventBatch>())
    }
}

impl LogFeed for HttpStream {
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<LogFrame>>> {
        Box::pin(async move {
            let Some(frame) = self.next_value::<StreamFrame>().await? else {
                return Ok(None);
            };
            if frame.data.is_empty() {
                return Ok(Some(LogFrame::heartbeat()));
            }
            let data = BASE64
                .decode(frame.data.as_bytes())
                .map_err(|e| WatchError::Malformed(format!("log frame data: {e}")))?;
            Ok(Some(LogFrame {
                data,
                offset: frame.offset,
            }))
        })
    }
}
