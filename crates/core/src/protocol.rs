use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::{Error, Result};

pub const UPLOAD_OFFSET_HEADER: &str = "X-Goog-Upload-Offset";
pub const UPLOAD_COMMAND_HEADER: &str = "X-Goog-Upload-Command";
/// Upload the whole body and finalize the resource in the same request.
pub const UPLOAD_FINALIZE_COMMAND: &str = "upload, finalize";

/// One outbound POST carrying an entry's full payload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Arc<[u8]>,
}

impl UploadRequest {
    pub fn finalize(entry: &Entry) -> Self {
        Self {
            url: entry.destination.url.clone(),
            headers: vec![
                (UPLOAD_OFFSET_HEADER, "0".to_string()),
                (UPLOAD_COMMAND_HEADER, UPLOAD_FINALIZE_COMMAND.to_string()),
            ],
            body: entry.payload.clone(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The file-registration record returned by the destination on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub display_name: String,
    pub mime_type: String,
    pub uri: String,
}

#[derive(Debug, Deserialize)]
struct FileRecordEnvelope {
    file: FileRecord,
}

pub fn parse_file_record(body: &str) -> Result<FileRecord> {
    let envelope: FileRecordEnvelope =
        serde_json::from_str(body).map_err(|e| Error::InvalidResponse {
            message: format!("invalid json: {e}; body={body}"),
        })?;
    Ok(envelope.file)
}
