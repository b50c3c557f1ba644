//! Nomad HTTP API transport.
//!
//! Log streaming uses `/v1/client/fs/logs` in follow mode, which delivers a
//! body of concatenated JSON frames (`{"Data": <base64>, "Offset": ...}`).
//! Frames are decoded incrementally off the byte stream and pumped into the
//! [`LogStream`] channels by a background task.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::{Buf, Bytes, BytesMut};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::api::{AllocationClient, AllocationDetail, AllocationStub, LogSource, LogStream};
use crate::error::{Result, TailError};

const FRAME_CHANNEL_CAPACITY: usize = 32;

/// Client for the Nomad HTTP API.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base: String,
    http: reqwest::Client,
}

impl HttpClient {
    pub fn new(addr: &str) -> Result<Self> {
        Ok(Self {
            base: addr.trim_end_matches('/').to_string(),
            http: reqwest::Client::builder().build()?,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(format!("{}{}", self.base, path))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TailError::Api {
                path: path.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(resp.json().await?)
    }
}

/// Wire shape of `/v1/allocation/{id}`. Only the fields the watcher needs.
#[derive(Debug, Deserialize)]
struct AllocationResponse {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "JobID")]
    job_id: String,
    #[serde(rename = "TaskGroup")]
    task_group: String,
    #[serde(rename = "TaskStates", default)]
    task_states: HashMap<String, serde_json::Value>,
}

impl From<AllocationResponse> for AllocationDetail {
    fn from(resp: AllocationResponse) -> Self {
        AllocationDetail {
            id: resp.id,
            job_id: resp.job_id,
            task_group: resp.task_group,
            task_names: resp.task_states.into_keys().collect(),
        }
    }
}

/// One frame of the streaming log body.
#[derive(Debug, Deserialize)]
struct LogFrame {
    #[serde(rename = "Data", default)]
    data: Option<String>,
}

#[async_trait::async_trait]
impl AllocationClient for HttpClient {
    async fn list_allocations(&self) -> Result<Vec<AllocationStub>> {
        self.get_json("/v1/allocations").await
    }

    async fn get_allocation(&self, id: &str) -> Result<AllocationDetail> {
        let resp: AllocationResponse = self.get_json(&format!("/v1/allocation/{id}")).await?;
        Ok(resp.into())
    }

    async fn stream_logs(
        &self,
        alloc: &AllocationDetail,
        task: &str,
        source: LogSource,
    ) -> Result<LogStream> {
        let path = format!("/v1/client/fs/logs/{}", alloc.id);
        let resp = self
            .http
            .get(format!("{}{}", self.base, path))
            .query(&[
                ("task", task),
                ("type", &source.to_string()),
                ("follow", "true"),
                ("origin", "end"),
                ("offset", "0"),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TailError::Api {
                path,
                status: resp.status().as_u16(),
            });
        }

        let (frame_tx, error_tx, stream) = LogStream::channel(FRAME_CHANNEL_CAPACITY);
        tokio::spawn(pump_frames(resp, frame_tx, error_tx));
        Ok(stream)
    }
}

/// Reads the streaming response body and forwards decoded frame payloads.
///
/// Returns when the body ends (clean close: the frame sender is dropped and
/// the channel closes), when the reader side is gone, or after reporting the
/// first error.
async fn pump_frames(
    resp: reqwest::Response,
    frames: mpsc::Sender<Bytes>,
    errors: mpsc::Sender<TailError>,
) {
    let mut body = resp.bytes_stream();
    let mut buf = BytesMut::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = errors.send(e.into()).await;
                return;
            }
        };
        buf.extend_from_slice(&chunk);

        loop {
            match decode_frame(&mut buf) {
                Ok(Some(payload)) => {
                    if payload.is_empty() {
                        // Heartbeat or file-event frame, nothing to emit.
                        continue;
                    }
                    if frames.send(payload).await.is_err() {
                        return;
                    }
                }
                // Partial frame, wait for the next chunk.
                Ok(None) => break,
                Err(e) => {
                    let _ = errors.send(e).await;
                    return;
                }
            }
        }
    }
}

/// Decodes one JSON frame off the front of `buf`.
///
/// `Ok(None)` means the buffer holds only a partial frame. An empty payload
/// means a complete frame was consumed but carried no log data.
fn decode_frame(buf: &mut BytesMut) -> Result<Option<Bytes>> {
    while buf.first().is_some_and(|b| b.is_ascii_whitespace()) {
        buf.advance(1);
    }
    if buf.is_empty() {
        return Ok(None);
    }

    let mut frames = serde_json::Deserializer::from_slice(&buf[..]).into_iter::<LogFrame>();
    match frames.next() {
        Some(Ok(frame)) => {
            let consumed = frames.byte_offset();
            buf.advance(consumed);
            match frame.data {
                Some(data) if !data.is_empty() => Ok(Some(Bytes::from(BASE64.decode(data)?))),
                _ => Ok(Some(Bytes::new())),
            }
        }
        Some(Err(e)) if e.is_eof() => Ok(None),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}
