use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::entry::Entry;
use crate::protocol::FileRecord;

/// Why a transfer ended in `upload-failed`.
///
/// Hosts only ever see [`FailureReason::message`]; the variants stay
/// available for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The destination answered with something other than 200.
    Status { status: u16, body: String },
    /// The request never completed.
    Network { message: String },
    /// A 200 answer whose body is not a file-registration record.
    InvalidResponse { message: String },
}

impl FailureReason {
    pub fn message(&self) -> String {
        match self {
            Self::Status { status, body } if body.is_empty() => format!("http {status}"),
            Self::Status { body, .. } => body.clone(),
            Self::Network { message } => message.clone(),
            Self::InvalidResponse { message } => format!("invalid response: {message}"),
        }
    }
}

/// Everything a single transfer can produce, in the order it produces it:
/// zero or more `Progress`, then at most one terminal variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Progress(u8),
    Uploaded(FileRecord),
    Failed(FailureReason),
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }

    pub fn into_event(self, entry: &Entry) -> UploadEvent {
        let entry_id = entry.id.clone();
        let uuid = entry.destination.uuid.clone();
        match self {
            Self::Progress(percent) => UploadEvent::Progress { entry_id, percent },
            Self::Uploaded(record) => UploadEvent::Uploaded {
                entry_id,
                file_url: record.uri,
                filename: record.display_name,
                mime_type: record.mime_type,
                uuid,
            },
            Self::Failed(reason) => UploadEvent::UploadFailed {
                entry_id,
                error: reason.message(),
                uuid,
            },
        }
    }
}

/// Event delivered to the host controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum UploadEvent {
    Progress {
        entry_id: String,
        percent: u8,
    },
    Uploaded {
        entry_id: String,
        file_url: String,
        filename: String,
        mime_type: String,
        uuid: String,
    },
    UploadFailed {
        entry_id: String,
        error: String,
        uuid: String,
    },
}

impl UploadEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Uploaded { .. } => "uploaded",
            Self::UploadFailed { .. } => "upload-failed",
        }
    }

    pub fn entry_id(&self) -> &str {
        match self {
            Self::Progress { entry_id, .. }
            | Self::Uploaded { entry_id, .. }
            | Self::UploadFailed { entry_id, .. } => entry_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

pub trait EventSink: Send + Sync {
    fn dispatch(&self, event: UploadEvent);
}

/// Forwards events to an unbounded channel. Events dispatched after the
/// receiver is gone are dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<UploadEvent>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UploadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn dispatch(&self, event: UploadEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Destination;

    fn entry() -> Entry {
        Entry::new(
            "e1",
            b"payload".to_vec(),
            Destination::new("https://upload.example/e1", "corr-1"),
        )
    }

    #[test]
    fn events_serialize_with_host_facing_names() {
        let uploaded = Outcome::Uploaded(FileRecord {
            display_name: "a.txt".to_string(),
            mime_type: "text/plain".to_string(),
            uri: "https://files.example/a".to_string(),
        })
        .into_event(&entry());

        let v = serde_json::to_value(&uploaded).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "event": "uploaded",
                "entry_id": "e1",
                "file_url": "https://files.example/a",
                "filename": "a.txt",
                "mime_type": "text/plain",
                "uuid": "corr-1",
            })
        );

        let failed = Outcome::Failed(FailureReason::Status {
            status: 500,
            body: "quota exceeded".to_string(),
        })
        .into_event(&entry());
        let v = serde_json::to_value(&failed).unwrap();
        assert_eq!(v["event"], "upload-failed");
        assert_eq!(v["error"], "quota exceeded");
        assert_eq!(v["uuid"], "corr-1");
        assert_eq!(failed.name(), "upload-failed");

        let progress = Outcome::Progress(42).into_event(&entry());
        let v = serde_json::to_value(&progress).unwrap();
        assert_eq!(v["event"], "progress");
        assert_eq!(v["percent"], 42);
        assert!(!progress.is_terminal());
    }

    #[test]
    fn failure_messages_are_flattened() {
        let empty = FailureReason::Status {
            status: 503,
            body: String::new(),
        };
        assert_eq!(empty.message(), "http 503");

        let net = FailureReason::Network {
            message: "request failed: connection reset".to_string(),
        };
        assert_eq!(net.message(), "request failed: connection reset");

        let bad = FailureReason::InvalidResponse {
            message: "missing field `file`".to_string(),
        };
        assert_eq!(bad.message(), "invalid response: missing field `file`");
    }

    #[tokio::test]
    async fn channel_sink_forwards_in_dispatch_order() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.dispatch(Outcome::Progress(10).into_event(&entry()));
        sink.dispatch(Outcome::Progress(20).into_event(&entry()));
        drop(sink);

        assert_eq!(rx.recv().await.map(|e| e.name()), Some("progress"));
        assert!(matches!(
            rx.recv().await,
            Some(UploadEvent::Progress { percent: 20, .. })
        ));
        assert!(rx.recv().await.is_none());
    }
}
