//! `pcl`
//!
//! Wraps the raster and vector blocks in the PJL/PCL framing the engraver
//! expects for a complete job.

use std::io::{BufRead, Read, Seek, SeekFrom, Write};

use log::{debug, warn};

use crate::{
    bed::Placement,
    bitmap::BitmapHeader,
    hpgl::{generate_vector, VectorStats},
    raster::{generate_raster, RasterStats},
    EncodeError, JobConfig,
};

/// The escape character, we insert this _a lot_.
pub(crate) const ESC: char = '\x1b';

/// Zero bytes sent after the job to flush the engraver's receive buffer.
pub const TRAILER_LEN: usize = 4096;

/// A complete job, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedJob {
    /// The job bytes, trailer included.
    bytes: Vec<u8>,
    /// What the raster block engraves, if there is one.
    raster: Option<RasterStats>,
    /// What the vector block cuts, if there is one.
    vector: Option<VectorStats>,
}

impl ComposedJob {
    /// Gets the job bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Gets the size of the job in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the job has no bytes. Never true for a composed job.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Gets what the raster block engraves.
    pub fn raster_stats(&self) -> Option<&RasterStats> {
        self.raster.as_ref()
    }

    /// Gets what the vector block cuts.
    pub fn vector_stats(&self) -> Option<&VectorStats> {
        self.vector.as_ref()
    }

    /// Takes the job bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Composes a job from the rasterizer's artifacts.
///
/// The raster block always comes before the vector block. Page geometry is
/// taken from the bitmap header when there is a bitmap, otherwise from the
/// bed size.
///
/// # Arguments
/// * `config`: The job settings, clamped before use.
/// * `bitmap`: The bitmap, positioned at its header.
/// * `vectors`: The vector stream.
///
/// # Returns
/// The composed job.
///
/// # Errors
/// Any [`EncodeError`] from the raster or vector encoders. Nothing is returned
/// for a job that failed part way through.
pub fn compose_job<R: Read + Seek, V: BufRead>(
    config: &JobConfig,
    mut bitmap: Option<&mut R>,
    vectors: Option<V>,
) -> Result<ComposedJob, EncodeError> {
    let config = config.clone().clamped();
    let mut bytes = vec![];
    let mut job = ComposedJob {
        bytes: vec![],
        raster: None,
        vector: None,
    };

    let placement = match bitmap.as_deref_mut() {
        Some(bitmap) => {
            let start = bitmap.stream_position().map_err(EncodeError::Bitmap)?;
            let header = BitmapHeader::read_from(bitmap)?;
            bitmap
                .seek(SeekFrom::Start(start))
                .map_err(EncodeError::Bitmap)?;
            #[allow(clippy::cast_possible_wrap)]
            let (width, height) = (header.width as i64, header.height as i64);
            Placement::new(&config, width, height)
        }
        None => Placement::for_bed(&config),
    };
    debug!(
        "page {}x{} at {},{}",
        placement.total_width(),
        placement.total_height(),
        placement.base_x,
        placement.base_y
    );

    bytes.extend(page_header(&config).bytes());

    if config.has_raster() {
        if let Some(bitmap) = bitmap {
            // unknown purpose, always sent before raster data
            write!(bytes, "{ESC}&y0C")?;
            job.raster = Some(generate_raster(&config, bitmap, &mut bytes)?);
        } else {
            warn!("raster pass enabled but there is no bitmap, skipping it");
        }
    }

    if config.has_vector() {
        if let Some(vectors) = vectors {
            bytes.extend(vector_page(&placement).bytes());
            job.vector = Some(generate_vector(&config, &placement, vectors, &mut bytes)?);
        } else {
            debug!("vector pass enabled but there is no vector stream, skipping it");
        }
    }

    bytes.extend(page_footer().bytes());
    bytes.resize(bytes.len() + TRAILER_LEN, 0);

    job.bytes = bytes;
    Ok(job)
}

/// Job name, language and page setup.
///
/// # Arguments
/// * `config`: The job settings.
///
/// # Returns
/// Everything that precedes the raster block.
fn page_header(config: &JobConfig) -> String {
    [
        pjl_job_name(config.title()),
        pcl_enter_language(),
        pcl_autofocus(config.autofocus),
        pcl_offset_registration(),
        pcl_unit_of_measure(config.resolution),
        pcl_home(),
        pcl_raster_resolution(config.resolution),
    ]
    .join("")
}

/// Resets the page for vector mode and enters HPGL.
///
/// # Arguments
/// * `placement`: Geometry of the page.
///
/// # Returns
/// Everything that precedes the vector instructions.
fn vector_page(placement: &Placement) -> String {
    [
        pcl_enter_language(),
        // Page orientation.
        format!("{ESC}*r0F"),
        format!("{ESC}*r{}T", placement.total_height()),
        format!("{ESC}*r{}S", placement.total_width()),
        format!("{ESC}*r1A"),
        format!("{ESC}*rC"),
        pcl_enter_hpgl_mode(),
    ]
    .join("")
}

/// Resets the engraver and ends the job.
///
/// # Returns
/// Everything that follows the vector block, except the trailer.
fn page_footer() -> String {
    [pcl_reset(), pjl_universal_exit_language(), pjl_end_of_job()].join("")
}

/// Starts a job with a name shown on the engraver's display.
///
/// # Arguments
/// * `title`: The job title.
///
/// # Returns
/// The UEL command followed by the job name.
fn pjl_job_name(title: &str) -> String {
    format!("{}@PJL JOB NAME={title}\r\n", pjl_universal_exit_language())
}

/// The Universal Exit Language command, which returns the engraver to PJL.
///
/// # Returns
/// The UEL command.
fn pjl_universal_exit_language() -> String {
    format!("{ESC}%-12345X")
}

/// Ends the job.
///
/// # Returns
/// The end of job command.
fn pjl_end_of_job() -> String {
    "@PJL EOJ \r\n".to_string()
}

/// Resets the engraver, then switches from PJL to PCL.
///
/// # Returns
/// The reset and enter language commands.
fn pcl_enter_language() -> String {
    format!("{}@PJL ENTER LANGUAGE=PCL\r\n", pcl_reset())
}

/// Resets the engraver, sending the head home.
///
/// # Returns
/// The PCL reset command.
fn pcl_reset() -> String {
    format!("{ESC}E")
}

/// Turns autofocus on or off.
///
/// # Arguments
/// * `enabled`: Whether to autofocus.
///
/// # Returns
/// Autofocus command.
fn pcl_autofocus(enabled: bool) -> String {
    format!("{ESC}&y{}A", u8::from(enabled))
}

/// Resets the long and short edge offset registration.
///
/// # Returns
/// Offset registration commands.
fn pcl_offset_registration() -> String {
    format!("{ESC}&l0U{ESC}&l0Z")
}

/// Sets the DPI equivalent of a single machine unit.
///
/// # Arguments
/// * `dpi`: The DPI to use.
///
/// # Returns
/// Unit of measure set command.
fn pcl_unit_of_measure(dpi: i32) -> String {
    format!("{ESC}&u{dpi}D")
}

/// Moves the cursor to the origin.
///
/// # Returns
/// X and Y position commands.
fn pcl_home() -> String {
    format!("{ESC}*p0X{ESC}*p0Y")
}

/// Sets the resolution of rasterization performed by PCL.
///
/// # Arguments
/// * `dpi`: The DPI to use for rasterization.
///
/// # Returns
/// DPI set command.
fn pcl_raster_resolution(dpi: i32) -> String {
    format!("{ESC}*t{dpi}R")
}

/// Enters HPGL mode inside of PCL.
///
/// # Returns
/// The enter HPGL mode command.
fn pcl_enter_hpgl_mode() -> String {
    format!("{ESC}%1B")
}
