use serde::{Deserialize, Serialize};

/// Highest percent that may travel over the progress channel. 100 is
/// reserved for the terminal `uploaded` event.
pub const MAX_PROGRESS_PERCENT: u8 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Pending,
    InFlight,
    Completed,
    Failed,
    Aborted,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

/// Runtime state for one entry's upload.
///
/// Terminal states are sticky: once `Completed`, `Failed` or `Aborted`,
/// every further transition or progress tick is ignored.
#[derive(Debug, Clone)]
pub struct Transfer {
    state: TransferState,
    payload_bytes: u64,
    bytes_sent: u64,
    last_reported_percent: u8,
}

impl Transfer {
    pub fn new(payload_bytes: u64) -> Self {
        Self {
            state: TransferState::Pending,
            payload_bytes,
            bytes_sent: 0,
            last_reported_percent: 0,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn last_reported_percent(&self) -> u8 {
        self.last_reported_percent
    }

    pub fn start(&mut self) -> bool {
        if self.state != TransferState::Pending {
            return false;
        }
        self.state = TransferState::InFlight;
        true
    }

    /// Applies one progress tick and returns the percent to report, if any.
    ///
    /// Only a strictly higher percent below 100 is reported. Ticks without a
    /// known total, or outside `InFlight`, are dropped.
    pub fn record_progress(&mut self, loaded: u64, total: Option<u64>) -> Option<u8> {
        if self.state != TransferState::InFlight {
            return None;
        }

        self.bytes_sent = self.bytes_sent.max(loaded.min(self.payload_bytes));

        let total = total.filter(|t| *t > 0)?;
        let percent = floor_percent(loaded, total);
        if percent > self.last_reported_percent && percent <= MAX_PROGRESS_PERCENT {
            self.last_reported_percent = percent;
            Some(percent)
        } else {
            None
        }
    }

    pub fn complete(&mut self) -> bool {
        if !self.finish(TransferState::Completed) {
            return false;
        }
        self.bytes_sent = self.payload_bytes;
        self.last_reported_percent = 100;
        true
    }

    pub fn fail(&mut self) -> bool {
        self.finish(TransferState::Failed)
    }

    pub fn abort(&mut self) -> bool {
        self.finish(TransferState::Aborted)
    }

    fn finish(&mut self, state: TransferState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = state;
        true
    }
}

fn floor_percent(loaded: u64, total: u64) -> u8 {
    let loaded = loaded.min(total) as u128;
    ((loaded * 100) / total as u128) as u8
}
