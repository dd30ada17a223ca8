use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::Result;
use crate::protocol::UploadRequest;

mod http;

pub use http::HttpTransport;

/// Raw answer from the destination. Any status counts as a response; only a
/// request that never completed is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressTick {
    pub loaded: u64,
    pub total: Option<u64>,
}

/// Byte-level progress channel handed to a [`Transport`] for one request.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<ProgressTick>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressTick>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, loaded: u64, total: Option<u64>) {
        let _ = self.tx.send(ProgressTick { loaded, total });
    }
}

pub trait Transport: Send + Sync {
    fn provider(&self) -> &'static str;

    /// Sends one upload request. Dropping the returned future abandons the
    /// request.
    fn send<'a>(
        &'a self,
        request: UploadRequest,
        progress: ProgressReporter,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse>> + Send + 'a>>;
}
