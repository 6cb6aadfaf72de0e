//! `error`
//!
//! Errors that can occur while encoding a job or delivering it to the engraver.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors raised while turning the rasterizer's artifacts into a job.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The bitmap header could not be decoded.
    #[error("invalid bitmap header: {0}")]
    InvalidHeader(&'static str),
    /// A scan line is wider than the encoder is willing to buffer.
    #[error("bitmap row of {row_bytes} bytes exceeds the {limit} byte limit")]
    RowTooWide {
        /// Bytes required for one padded row.
        row_bytes: usize,
        /// The largest row the encoder accepts.
        limit: usize,
    },
    /// The bitmap ended before a full row could be read.
    #[error("bad bit data from rasterizer {got}/{expected} (y={row})")]
    ShortRead {
        /// The row being read, counted from the bottom of the page.
        row: usize,
        /// Bytes expected for the row.
        expected: usize,
        /// Bytes actually available.
        got: usize,
    },
    /// The bitmap could not be read or rewound.
    #[error("cannot read bitmap: {0}")]
    Bitmap(#[source] io::Error),
    /// The vector stream could not be read.
    #[error("cannot read vector stream: {0}")]
    Vectors(#[source] io::Error),
    /// Writing the job failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Which step of the LPD conversation a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpdStage {
    /// The "receive a printer job" command.
    ReceiveJob,
    /// The control file announcement.
    ControlAnnounce,
    /// The control file body.
    ControlFile,
    /// The data file announcement.
    DataAnnounce,
}

impl std::fmt::Display for LpdStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            LpdStage::ReceiveJob => "receive job",
            LpdStage::ControlAnnounce => "control file announcement",
            LpdStage::ControlFile => "control file",
            LpdStage::DataAnnounce => "data file announcement",
        };
        f.write_str(stage)
    }
}

/// Errors raised while sending a job to the engraver.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No candidate address accepted a connection before the retry ceiling.
    #[error("cannot connect to {host} after {attempts} attempts")]
    ConnectExhausted {
        /// The host we were trying to reach.
        host: String,
        /// How many resolve+connect rounds were made.
        attempts: u32,
    },
    /// The engraver answered a step with a non-zero acknowledgement.
    #[error("bad response from {host} during {stage}: {code}")]
    Rejected {
        /// The host that rejected the job.
        host: String,
        /// The step that was rejected.
        stage: LpdStage,
        /// The acknowledgement byte.
        code: u8,
    },
    /// The connection failed mid-conversation.
    #[error("I/O error talking to {host}: {source}")]
    Io {
        /// The host we were talking to.
        host: String,
        /// The underlying error.
        source: io::Error,
    },
}

/// Errors from running a whole job, artifact to engraver.
#[derive(Debug, Error)]
pub enum JobError {
    /// An artifact could not be opened or read.
    #[error("{}: {source}", path.display())]
    Artifact {
        /// The artifact in question.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// The job ticket could not be parsed.
    #[error("invalid job ticket: {0}")]
    Ticket(#[from] serde_json::Error),
    /// Encoding failed, nothing was sent.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// Delivery failed.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
