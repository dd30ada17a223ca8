mod config;
mod entry;
mod error;
mod events;
pub mod logging;
mod orchestrator;
mod protocol;
mod transfer;
mod transport;

pub const APP_NAME: &str = "gemini-uploader";

pub use config::{UploaderConfig, config_path, load_config, parse_config};
pub use entry::{Destination, Entry, Manifest, ManifestEntry, load_manifest, parse_manifest};
pub use error::{Error, Result};
pub use events::{ChannelSink, EventSink, FailureReason, Outcome, UploadEvent};
pub use orchestrator::{AbortHandle, AbortRegistry, TransferReport, UploadBatch, Uploader};
pub use protocol::{
    FileRecord, UPLOAD_COMMAND_HEADER, UPLOAD_FINALIZE_COMMAND, UPLOAD_OFFSET_HEADER,
    UploadRequest, parse_file_record,
};
pub use transfer::{MAX_PROGRESS_PERCENT, Transfer, TransferState};
pub use transport::{
    HttpTransport, ProgressReporter, ProgressTick, Transport, TransportResponse,
};
