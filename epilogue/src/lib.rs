//! `epilogue`
//!
//! A driver for Epilog laser engravers. Turns the rasterizer's bitmap and
//! vector stream into a PJL/PCL job and hands it to the engraver over LPD.

pub mod bed;
pub mod bitmap;
pub mod commands;
mod config;
mod error;
pub mod hpgl;
pub mod lpd;
pub mod packbits;
pub mod paths;
pub mod pcl;
pub mod raster;

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use log::info;
use serde::{Deserialize, Serialize};

pub use config::{
    JobConfig, RasterMode, BED_HEIGHT_PT, BED_WIDTH_PT, FREQUENCY_MAX, FREQUENCY_MIN,
    RESOLUTION_MAX, RESOLUTION_MIN,
};
pub use error::{DeliveryError, EncodeError, JobError, LpdStage};
pub use lpd::PrinterTarget;
pub use pcl::{compose_job, ComposedJob};

/// Everything needed to run one job, as handed over by the print system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobTicket {
    /// The job settings.
    pub config: JobConfig,
    /// The bitmap produced by the rasterizer.
    pub bitmap: Option<PathBuf>,
    /// The vector stream produced by the rasterizer.
    pub vectors: Option<PathBuf>,
    /// Where to send the job.
    pub printer: PrinterTarget,
}

/// Opens an artifact for reading.
///
/// # Errors
/// [`JobError::Artifact`] naming the file.
fn open_artifact(path: &Path) -> Result<BufReader<File>, JobError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| JobError::Artifact {
            path: path.to_path_buf(),
            source,
        })
}

impl JobTicket {
    /// Parses a ticket.
    ///
    /// # Arguments
    /// * `json`: The ticket as JSON.
    ///
    /// # Returns
    /// The ticket, with defaults for anything missing.
    ///
    /// # Errors
    /// [`JobError::Ticket`] if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, JobError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a ticket from a file.
    ///
    /// # Arguments
    /// * `path`: The ticket file.
    ///
    /// # Returns
    /// The ticket.
    ///
    /// # Errors
    /// [`JobError::Artifact`] if the file cannot be read, [`JobError::Ticket`] if
    /// it is malformed.
    pub fn load(path: &Path) -> Result<Self, JobError> {
        Ok(serde_json::from_reader(open_artifact(path)?)?)
    }

    /// Composes the job from the ticket's artifacts.
    ///
    /// # Returns
    /// The composed job.
    ///
    /// # Errors
    /// [`JobError::Artifact`] if an artifact cannot be opened or read, or any
    /// other encoding error.
    pub fn compose(&self) -> Result<ComposedJob, JobError> {
        let mut bitmap = self.bitmap.as_deref().map(open_artifact).transpose()?;
        let vectors = self.vectors.as_deref().map(open_artifact).transpose()?;
        compose_job(&self.config, bitmap.as_mut(), vectors).map_err(|err| {
            match (err, self.bitmap.as_ref(), self.vectors.as_ref()) {
                (EncodeError::Bitmap(source), Some(path), _)
                | (EncodeError::Vectors(source), _, Some(path)) => JobError::Artifact {
                    path: path.clone(),
                    source,
                },
                (err, ..) => JobError::Encode(err),
            }
        })
    }
}

/// Composes a job and sends it to the engraver. Nothing is sent if composing
/// fails.
///
/// # Arguments
/// * `ticket`: The job to run.
///
/// # Errors
/// Any [`JobError`].
pub fn print_job(ticket: &JobTicket) -> Result<(), JobError> {
    let config = ticket.config.clone().clamped();
    info!(
        "Job '{}' for {}: {} dpi, {:?} raster",
        config.title(),
        config.job_user,
        config.resolution,
        config.raster_mode
    );

    let job = ticket.compose()?;
    if let Some(stats) = job.raster_stats() {
        info!(
            "Raster {}x{}, {} lines in {} passes",
            stats.width, stats.height, stats.lines, stats.passes
        );
    }
    if let Some(stats) = job.vector_stats() {
        info!(
            "Vector {} paths, {} segments, {} tiles",
            stats.paths, stats.segments, stats.tiles
        );
    }

    lpd::send(&ticket.printer, &job, &config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_from_json() {
        let ticket = JobTicket::from_json(
            r#"{
                "config": {"job_name": "coasters", "raster_mode": "grey"},
                "bitmap": "/tmp/coasters.bmp",
                "printer": {"host": "legend.local"}
            }"#,
        )
        .expect("valid ticket");

        assert_eq!(ticket.config.job_name, "coasters");
        assert_eq!(ticket.config.raster_mode, RasterMode::Grey);
        assert_eq!(ticket.bitmap, Some(PathBuf::from("/tmp/coasters.bmp")));
        assert_eq!(ticket.vectors, None);
        assert_eq!(ticket.printer.host, "legend.local");
        assert_eq!(ticket.printer.port, 515);
    }

    #[test]
    fn test_malformed_ticket() {
        assert!(matches!(
            JobTicket::from_json("{\"config\": 7}"),
            Err(JobError::Ticket(_))
        ));
    }

    #[test]
    fn test_missing_artifact() {
        let ticket = JobTicket {
            vectors: Some(PathBuf::from("/nonexistent/epilogue.vector")),
            ..JobTicket::default()
        };

        match ticket.compose() {
            Err(JobError::Artifact { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/epilogue.vector"));
            }
            other => panic!("expected an artifact error, got {other:?}"),
        }
    }

    #[test]
    fn test_unreadable_bitmap_names_the_file() {
        // a directory opens but cannot be read
        let dir = tempfile::tempdir().expect("temp dir");
        let ticket = JobTicket {
            bitmap: Some(dir.path().to_path_buf()),
            ..JobTicket::default()
        };

        match ticket.compose() {
            Err(JobError::Artifact { path, .. }) => assert_eq!(path, dir.path()),
            other => panic!("expected an artifact error, got {other:?}"),
        }
    }
}
