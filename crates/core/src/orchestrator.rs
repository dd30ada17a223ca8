use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::entry::Entry;
use crate::events::{EventSink, FailureReason, Outcome};
use crate::protocol::{FileRecord, UploadRequest, parse_file_record};
use crate::transfer::{Transfer, TransferState};
use crate::transport::{ProgressReporter, Transport, TransportResponse};
use crate::{Error, Result};

/// Cancels one entry's transfer.
///
/// Safe to call any number of times, including after the transfer has
/// finished; only the first call before the terminal outcome has an effect.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    entry_id: Arc<str>,
    token: CancellationToken,
}

impl AbortHandle {
    fn new(entry_id: &str) -> Self {
        Self {
            entry_id: Arc::from(entry_id),
            token: CancellationToken::new(),
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Append-only collection of abort handles, shared with whatever lifecycle
/// event tears the host down.
#[derive(Debug, Default)]
pub struct AbortRegistry {
    handles: Mutex<Vec<AbortHandle>>,
}

impl AbortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: AbortHandle) {
        self.lock().push(handle);
    }

    /// Registration callback suitable for [`Uploader::run`].
    pub fn hook(&self) -> impl FnMut(AbortHandle) + '_ {
        move |handle| self.register(handle)
    }

    pub fn abort_all(&self) -> usize {
        let handles = self.lock();
        for handle in handles.iter() {
            handle.abort();
        }
        handles.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AbortHandle>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub entry_id: String,
    pub state: TransferState,
    pub bytes_sent: u64,
}

/// Transfers started by one [`Uploader::run`] call.
///
/// Dropping the batch detaches the transfers; they keep running and still
/// deliver their events through the sink.
pub struct UploadBatch {
    tasks: Vec<(String, JoinHandle<TransferReport>)>,
}

impl UploadBatch {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits until every transfer reached a terminal state. Reports come back
    /// in submission order, one per entry. A transfer task that panicked is
    /// reported as failed.
    pub async fn join(self) -> Vec<TransferReport> {
        let mut reports = Vec::with_capacity(self.tasks.len());
        for (entry_id, task) in self.tasks {
            match task.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(
                        event = "transfer.join_failed",
                        entry_id = %entry_id,
                        error = %e,
                        "transfer.join_failed"
                    );
                    reports.push(TransferReport {
                        entry_id,
                        state: TransferState::Failed,
                        bytes_sent: 0,
                    });
                }
            }
        }
        reports
    }
}

pub struct Uploader<T> {
    transport: Arc<T>,
    sink: Arc<dyn EventSink>,
}

impl<T> Clone for Uploader<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<T: Transport + 'static> Uploader<T> {
    pub fn new(transport: Arc<T>, sink: Arc<dyn EventSink>) -> Self {
        Self { transport, sink }
    }

    /// Starts one independent transfer per entry and returns without waiting.
    ///
    /// Each entry's [`AbortHandle`] is passed to `register_abort` before its
    /// transfer is spawned. Results arrive only through the event sink.
    /// Must be called from within a tokio runtime.
    pub fn run<F>(&self, entries: Vec<Entry>, mut register_abort: F) -> UploadBatch
    where
        F: FnMut(AbortHandle),
    {
        info!(
            event = "upload.batch.start",
            provider = self.transport.provider(),
            entries = entries.len(),
            "upload.batch.start"
        );

        let mut tasks = Vec::with_capacity(entries.len());
        for entry in entries {
            let handle = AbortHandle::new(&entry.id);
            let cancel = handle.token.clone();
            register_abort(handle);

            let transport = self.transport.clone();
            let sink = self.sink.clone();
            let entry_id = entry.id.clone();
            let task = tokio::spawn(async move {
                drive_transfer(transport.as_ref(), sink.as_ref(), entry, cancel).await
            });
            tasks.push((entry_id, task));
        }

        UploadBatch { tasks }
    }
}

async fn drive_transfer<T: Transport>(
    transport: &T,
    sink: &dyn EventSink,
    entry: Entry,
    cancel: CancellationToken,
) -> TransferReport {
    let mut transfer = Transfer::new(entry.payload_len());

    if cancel.is_cancelled() {
        transfer.abort();
        info!(
            event = "transfer.aborted",
            entry_id = %entry.id,
            before_start = true,
            "transfer.aborted"
        );
        return report(&entry, &transfer);
    }

    transfer.start();
    debug!(
        event = "transfer.start",
        entry_id = %entry.id,
        bytes = entry.payload_len(),
        url = %redact_query(&entry.destination.url),
        "transfer.start"
    );

    let (reporter, mut ticks) = ProgressReporter::channel();
    let mut send = transport.send(UploadRequest::finalize(&entry), reporter);

    let result = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                transfer.abort();
                info!(
                    event = "transfer.aborted",
                    entry_id = %entry.id,
                    bytes_sent = transfer.bytes_sent(),
                    "transfer.aborted"
                );
                return report(&entry, &transfer);
            }
            Some(tick) = ticks.recv() => {
                if let Some(percent) = transfer.record_progress(tick.loaded, tick.total) {
                    trace!(
                        event = "transfer.progress",
                        entry_id = %entry.id,
                        percent,
                        "transfer.progress"
                    );
                    sink.dispatch(Outcome::Progress(percent).into_event(&entry));
                }
            }
            res = &mut send => break res,
        }
    };

    while let Ok(tick) = ticks.try_recv() {
        if let Some(percent) = transfer.record_progress(tick.loaded, tick.total) {
            sink.dispatch(Outcome::Progress(percent).into_event(&entry));
        }
    }

    let outcome = match classify(result) {
        Ok(record) => {
            transfer.complete();
            info!(
                event = "transfer.uploaded",
                entry_id = %entry.id,
                file_url = %record.uri,
                mime_type = %record.mime_type,
                "transfer.uploaded"
            );
            Outcome::Uploaded(record)
        }
        Err(reason) => {
            transfer.fail();
            match &reason {
                FailureReason::Status { status, .. } => warn!(
                    event = "transfer.failed",
                    entry_id = %entry.id,
                    status,
                    "transfer.failed"
                ),
                FailureReason::Network { message } | FailureReason::InvalidResponse { message } => {
                    warn!(
                        event = "transfer.failed",
                        entry_id = %entry.id,
                        reason = %message,
                        "transfer.failed"
                    )
                }
            }
            Outcome::Failed(reason)
        }
    };
    sink.dispatch(outcome.into_event(&entry));

    report(&entry, &transfer)
}

/// Maps a transport result onto the terminal outcome. Only status 200 with a
/// readable file record counts as success.
fn classify(
    result: Result<TransportResponse>,
) -> std::result::Result<FileRecord, FailureReason> {
    match result {
        Ok(TransportResponse { status: 200, body }) => {
            parse_file_record(&body).map_err(|e| FailureReason::InvalidResponse {
                message: error_message(e),
            })
        }
        Ok(TransportResponse { status, body }) => Err(FailureReason::Status { status, body }),
        Err(e) => Err(FailureReason::Network {
            message: error_message(e),
        }),
    }
}

fn error_message(e: Error) -> String {
    match e {
        Error::Network { message } | Error::InvalidResponse { message } => message,
        other => other.to_string(),
    }
}

fn report(entry: &Entry, transfer: &Transfer) -> TransferReport {
    TransferReport {
        entry_id: entry.id.clone(),
        state: transfer.state(),
        bytes_sent: transfer.bytes_sent(),
    }
}

/// Upload URLs commonly carry session tokens in the query string.
fn redact_query(url: &str) -> &str {
    url.split_once('?').map(|(base, _)| base).unwrap_or(url)
}
