use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_LENGTH;
use tracing::debug;

use super::{ProgressReporter, Transport, TransportResponse};
use crate::config::UploaderConfig;
use crate::protocol::UploadRequest;
use crate::{Error, Result};

pub struct HttpTransport {
    client: reqwest::Client,
    chunk_bytes: usize,
}

impl HttpTransport {
    pub fn new(config: &UploaderConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone());
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| Error::InvalidConfig {
            message: format!("http client build failed: {e}"),
        })?;

        Ok(Self {
            client,
            chunk_bytes: config.chunk_bytes,
        })
    }
}

impl Transport for HttpTransport {
    fn provider(&self) -> &'static str {
        "http"
    }

    fn send<'a>(
        &'a self,
        request: UploadRequest,
        progress: ProgressReporter,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse>> + Send + 'a>> {
        Box::pin(async move {
            let total = request.body.len() as u64;
            let mut builder = self
                .client
                .post(&request.url)
                .header(CONTENT_LENGTH, total);
            for (name, value) in &request.headers {
                builder = builder.header(*name, value.as_str());
            }

            let body = progress_body(request.body, self.chunk_bytes, progress);
            let res = builder
                .body(body)
                .send()
                .await
                .map_err(|e| Error::Network {
                    message: format!("request failed: {}", e.without_url()),
                })?;

            let status = res.status().as_u16();
            let body = res.text().await.map_err(|e| Error::Network {
                message: format!("read response failed: {}", e.without_url()),
            })?;
            debug!(
                event = "http.response",
                status,
                body_bytes = body.len(),
                "http.response"
            );

            Ok(TransportResponse { status, body })
        })
    }
}

/// Streams `payload` in `chunk_bytes` slices without copying it. The
/// cumulative count is reported when a slice is handed to the connection,
/// not when it reaches the wire.
fn progress_body(
    payload: Arc<[u8]>,
    chunk_bytes: usize,
    progress: ProgressReporter,
) -> reqwest::Body {
    let payload = Bytes::from_owner(payload);
    let total = payload.len();
    let chunk_bytes = chunk_bytes.max(1);

    let stream = futures::stream::unfold(0usize, move |offset| {
        let payload = payload.clone();
        let progress = progress.clone();
        async move {
            if offset >= total {
                return None;
            }
            let end = (offset + chunk_bytes).min(total);
            let chunk = payload.slice(offset..end);
            progress.report(end as u64, Some(total as u64));
            Some((Ok::<_, std::io::Error>(chunk), end))
        }
    });

    reqwest::Body::wrap_stream(stream)
}
