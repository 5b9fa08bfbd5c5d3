//! Minio (S3 API) implementation of [`ObjectClient`].

mod events;
mod signer;

use std::error::Error as StdError;

use async_trait::async_trait;
use bytes::Bytes;
use quick_xml::{Reader, events::Event};
use reqwest::{Client, RequestBuilder, StatusCode, header::AUTHORIZATION};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::MinioSettings;
use crate::domain::Notification;
use crate::storage::{ObjectClient, ObjectError, ObjectReader, StopSignal};

use signer::{CanonicalRequest, Credentials, EMPTY_PAYLOAD_SHA256, SERVICE, uri_encode};

const NOTIFICATION_BUFFER: usize = 64;
const MAX_NOTIFICATION_LINE: usize = 1024 * 1024;
const LISTEN_EVENTS: [&str; 2] = ["s3:ObjectCreated:*", "s3:ObjectRemoved:*"];

pub struct MinioClient {
    http: Client,
    endpoint: Url,
    region: String,
    credentials: Option<Credentials>,
}

impl MinioClient {
    pub fn new(settings: &MinioSettings) -> Result<Self, ObjectError> {
        let http = Client::builder()
            .user_agent(concat!("content-cache/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let credentials = (!settings.access_key.is_empty()).then(|| Credentials {
            access_key: settings.access_key.clone(),
            secret_key: settings.secret_key.clone(),
        });

        Ok(Self {
            http,
            endpoint: settings.endpoint.clone(),
            region: settings.region.clone(),
            credentials,
        })
    }

    /// Build a GET for `/{segments...}?{query}`, signed when credentials are set.
    /// `query` must already be in canonical (sorted, encoded) form.
    fn get(&self, segments: &[&str], query: &str) -> Result<RequestBuilder, ObjectError> {
        let path = segments
            .iter()
            .flat_map(|segment| segment.split('/'))
            .map(uri_encode)
            .collect::<Vec<_>>()
            .join("/");
        let base = self.endpoint.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/{path}"))
            .map_err(|err| ObjectError::request(format!("invalid object URL: {err}")))?;
        if !query.is_empty() {
            url.set_query(Some(query));
        }

        let Some(credentials) = self.credentials.as_ref() else {
            return Ok(self.http.get(url));
        };

        let now = OffsetDateTime::now_utc();
        let amz_date = signer::amz_date(now)?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(ObjectError::request("object URL has no host")),
        };
        let canonical = CanonicalRequest {
            method: "GET",
            path: url.path(),
            query,
            headers: vec![
                ("host", host),
                ("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256.to_string()),
                ("x-amz-date", amz_date.clone()),
            ],
            payload_hash: EMPTY_PAYLOAD_SHA256,
        };
        let authorization =
            signer::authorization(credentials, &self.region, SERVICE, &canonical, now)?;

        Ok(self
            .http
            .get(url)
            .header("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256)
            .header("x-amz-date", amz_date)
            .header(AUTHORIZATION, authorization))
    }
}

#[async_trait]
impl ObjectClient for MinioClient {
    async fn object(&self, bucket: &str, key: &str) -> Result<ObjectReader, ObjectError> {
        let request = self.get(&[bucket, key], "")?;
        let (bucket, key) = (bucket.to_string(), key.to_string());
        Ok(ObjectReader::deferred(read_object(request, bucket, key)))
    }

    async fn notification_channel(
        &self,
        bucket: &str,
        stop: StopSignal,
    ) -> mpsc::Receiver<Notification> {
        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);

        let query = listen_query();
        match self.get(&[bucket], &query) {
            Ok(request) => {
                tokio::spawn(listen(request, bucket.to_string(), tx, stop));
            }
            Err(err) => {
                error!(bucket, error = %err, "Failed to build notification request");
            }
        }

        rx
    }

    fn is_not_exists_error(&self, error: &(dyn StdError + 'static)) -> bool {
        std::iter::successors(Some(error), |&current| current.source()).any(|current| {
            current
                .downcast_ref::<ObjectError>()
                .is_some_and(ObjectError::is_not_found)
        })
    }
}

fn listen_query() -> String {
    let mut pairs: Vec<(&str, &str)> = LISTEN_EVENTS
        .iter()
        .map(|event| ("events", *event))
        .chain([("prefix", ""), ("suffix", "")])
        .collect();
    pairs.sort_unstable();

    pairs
        .into_iter()
        .map(|(name, value)| format!("{}={}", uri_encode(name), uri_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

async fn read_object(
    request: RequestBuilder,
    bucket: String,
    key: String,
) -> Result<Bytes, ObjectError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response.bytes().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let code = s3_error_code(&body);
    if status == StatusCode::NOT_FOUND
        || matches!(code.as_deref(), Some("NoSuchKey" | "NoSuchBucket"))
    {
        return Err(ObjectError::not_found(bucket, key));
    }

    Err(ObjectError::Status {
        bucket,
        key,
        status: status.as_u16(),
        message: code
            .as_deref()
            .or(status.canonical_reason())
            .unwrap_or("unexpected status")
            .to_string(),
    })
}

/// Text of the first `<Code>` element of an S3 error document.
fn s3_error_code(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    let mut inside = false;
    let mut code = String::new();

    loop {
        match reader.read_event().ok()? {
            Event::Start(start) if start.local_name().as_ref() == b"Code" => inside = true,
            Event::Text(text) if inside => code.push_str(&text.unescape().ok()?),
            Event::CData(data) if inside => code.push_str(&String::from_utf8_lossy(&data)),
            Event::End(end) if inside && end.local_name().as_ref() == b"Code" => {
                let code = code.trim();
                return (!code.is_empty()).then(|| code.to_string());
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

/// Splits the notification stream on newlines. A line longer than `limit`
/// is dropped up to its terminating newline.
struct LineSplitter {
    pending: Vec<u8>,
    limit: usize,
    discarding: bool,
}

impl LineSplitter {
    fn new(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            limit,
            discarding: false,
        }
    }

    /// Complete lines found so far, and whether an oversized line started being dropped.
    fn push(&mut self, chunk: &[u8]) -> (Vec<Vec<u8>>, bool) {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            lines.push(line);
        }

        let mut dropped = false;
        if self.pending.len() > self.limit {
            self.pending.clear();
            dropped = !self.discarding;
            self.discarding = true;
        }

        (lines, dropped)
    }

    /// The unterminated tail left when the stream ends.
    fn finish(self) -> Option<Vec<u8>> {
        (!self.discarding && !self.pending.is_empty()).then_some(self.pending)
    }
}

/// Forward the notification stream into `tx` until `stop` fires, the stream
/// ends, or the receiver goes away.
async fn listen(
    request: RequestBuilder,
    bucket: String,
    tx: mpsc::Sender<Notification>,
    mut stop: StopSignal,
) {
    let sent = tokio::select! {
        sent = request.send() => sent,
        () = stop.stopped() => return,
    };

    let mut response = match sent {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            warn!(
                bucket = %bucket,
                status = response.status().as_u16(),
                "Notification subscription rejected"
            );
            return;
        }
        Err(err) => {
            warn!(bucket = %bucket, error = %err, "Notification subscription failed");
            return;
        }
    };

    info!(bucket = %bucket, "Listening for bucket notifications");

    let mut lines = LineSplitter::new(MAX_NOTIFICATION_LINE);
    loop {
        let chunk = tokio::select! {
            chunk = response.chunk() => chunk,
            () = stop.stopped() => break,
        };

        let chunk = match chunk {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                if let Some(tail) = lines.finish() {
                    forward(&tx, events::decode_line(&tail)).await;
                }
                debug!(bucket = %bucket, "Notification stream ended");
                break;
            }
            Err(err) => {
                warn!(bucket = %bucket, error = %err, "Notification stream failed");
                break;
            }
        };

        let (complete, dropped) = lines.push(&chunk);
        if dropped {
            warn!(
                bucket = %bucket,
                limit = MAX_NOTIFICATION_LINE,
                "Dropping oversized notification line"
            );
        }
        for line in complete {
            if !forward(&tx, events::decode_line(&line)).await {
                debug!(bucket = %bucket, "Notification receiver dropped");
                return;
            }
        }
    }
}

/// Returns false once the receiver is gone.
async fn forward(tx: &mpsc::Sender<Notification>, notifications: Vec<Notification>) -> bool {
    for notification in notifications {
        if tx.send(notification).await.is_err() {
            return false;
        }
    }
    true
}
