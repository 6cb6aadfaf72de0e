//! `config`
//!
//! Contains the settings for a single engraving job.

use serde::{Deserialize, Serialize};

/// Lowest resolution the engraver accepts, in DPI.
pub const RESOLUTION_MIN: i32 = 75;
/// Highest resolution the engraver accepts, in DPI.
pub const RESOLUTION_MAX: i32 = 1200;
/// Lowest vector frequency, in Hz.
pub const FREQUENCY_MIN: i32 = 10;
/// Highest vector frequency, in Hz.
pub const FREQUENCY_MAX: i32 = 5000;

/// Default bed width (x-axis), in points.
pub const BED_WIDTH_PT: i32 = 1728;
/// Default bed height (y-axis), in points.
pub const BED_HEIGHT_PT: i32 = 864;

/// How the bitmap is turned into laser power.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterMode {
    /// 1 bit per pixel, already screened upstream. Bit set burns.
    #[default]
    Mono,
    /// 1 byte per pixel, grey level maps to power.
    #[serde(alias = "gray")]
    Grey,
    /// 3 bytes per pixel BGR, each primary/secondary colour engraved as its own pass.
    #[serde(alias = "color")]
    Colour,
    /// No raster pass at all.
    None,
}

impl RasterMode {
    /// Whether pixels carry their own power level, in which case the device
    /// power is pinned at 100%.
    ///
    /// # Returns
    /// `true` for grey and colour.
    pub fn is_power_modulated(self) -> bool {
        matches!(self, RasterMode::Grey | RasterMode::Colour)
    }

    /// The number of separation passes to engrave per tile.
    ///
    /// # Returns
    /// 7 for colour, 1 otherwise.
    pub fn passes(self) -> u8 {
        match self {
            RasterMode::Colour => 7,
            _ => 1,
        }
    }
}

/// Settings for one job. Every stage takes this explicitly; call
/// [`JobConfig::clamped`] before encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Raster resolution in DPI, 75-1200.
    pub resolution: i32,
    /// Raster mode.
    pub raster_mode: RasterMode,
    /// Raster power, 0-100.
    pub raster_power: i32,
    /// Raster speed, 1-100.
    pub raster_speed: i32,
    /// Number of times the whole raster block is over-printed, at least 1.
    pub raster_repeat: i32,
    /// Vector power, 0-100.
    pub vector_power: i32,
    /// Vector speed, 1-100.
    pub vector_speed: i32,
    /// Vector frequency in Hz, 10-5000.
    pub vector_frequency: i32,
    /// Halftone screen size in pixels, used by the rasterizer in mono mode.
    pub screen_size: i32,
    /// Whether the engraver should auto focus.
    pub autofocus: bool,
    /// Mirror the design along the X axis, for reverse cuts.
    pub flip: bool,
    /// Number of copies tiled along X, at least 1.
    pub x_repeat: i32,
    /// Number of copies tiled along Y, at least 1.
    pub y_repeat: i32,
    /// Re-centre X on this position in points, 0 leaves the design where it is.
    pub x_center: i32,
    /// Re-centre Y on this position in points, 0 leaves the design where it is.
    pub y_center: i32,
    /// Job name, shown on the engraver and used to name LPD files.
    pub job_name: String,
    /// The user submitting the job.
    pub job_user: String,
    /// Job title, falls back to the job name when empty.
    pub job_title: String,
    /// Bed width in points.
    pub bed_width: i32,
    /// Bed height in points.
    pub bed_height: i32,
    /// Reorder vector paths to reduce head travel.
    pub optimize_vectors: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        JobConfig {
            resolution: 600,
            raster_mode: RasterMode::Mono,
            raster_power: 40,
            raster_speed: 100,
            raster_repeat: 1,
            vector_power: 50,
            vector_speed: 30,
            vector_frequency: 5000,
            screen_size: 8,
            autofocus: false,
            flip: false,
            x_repeat: 1,
            y_repeat: 1,
            x_center: 0,
            y_center: 0,
            job_name: "epilogue".to_string(),
            job_user: std::env::var("USER").unwrap_or_else(|_| "root".to_string()),
            job_title: String::new(),
            bed_width: BED_WIDTH_PT,
            bed_height: BED_HEIGHT_PT,
            optimize_vectors: true,
        }
    }
}

impl JobConfig {
    /// Brings every bounded field into its range. Out of range values are
    /// silently replaced by the nearest bound.
    ///
    /// # Returns
    /// The config with values appropriately clamped.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.resolution = self.resolution.clamp(RESOLUTION_MIN, RESOLUTION_MAX);
        self.raster_power = self.raster_power.clamp(0, 100);
        self.raster_speed = self.raster_speed.clamp(1, 100);
        self.raster_repeat = self.raster_repeat.max(1);
        self.vector_power = self.vector_power.clamp(0, 100);
        self.vector_speed = self.vector_speed.clamp(1, 100);
        self.vector_frequency = self.vector_frequency.clamp(FREQUENCY_MIN, FREQUENCY_MAX);
        self.screen_size = self.screen_size.max(1);
        self.x_repeat = self.x_repeat.max(1);
        self.y_repeat = self.y_repeat.max(1);
        self.x_center = self.x_center.max(0);
        self.y_center = self.y_center.max(0);
        self.bed_width = self.bed_width.max(1);
        self.bed_height = self.bed_height.max(1);
        self
    }

    /// Gets the title of the job.
    ///
    /// # Returns
    /// The job title, or the job name if no title was given.
    pub fn title(&self) -> &str {
        if self.job_title.is_empty() {
            &self.job_name
        } else {
            &self.job_title
        }
    }

    /// Whether the job has a raster pass.
    ///
    /// # Returns
    /// `true` if raster power is non-zero and a raster mode is selected.
    pub fn has_raster(&self) -> bool {
        self.raster_power > 0 && self.raster_mode != RasterMode::None
    }

    /// Whether the job has a vector pass.
    ///
    /// # Returns
    /// `true` if vector power is non-zero.
    pub fn has_vector(&self) -> bool {
        self.vector_power > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_out_of_range() {
        let config = JobConfig {
            resolution: 50,
            raster_power: 150,
            raster_speed: 0,
            raster_repeat: 0,
            vector_power: -20,
            vector_speed: 1000,
            vector_frequency: 6000,
            screen_size: -4,
            x_repeat: 0,
            y_repeat: -3,
            ..JobConfig::default()
        }
        .clamped();

        assert_eq!(config.resolution, 75, "resolution");
        assert_eq!(config.raster_power, 100, "raster power");
        assert_eq!(config.raster_speed, 1, "raster speed");
        assert_eq!(config.raster_repeat, 1, "raster repeat");
        assert_eq!(config.vector_power, 0, "vector power");
        assert_eq!(config.vector_speed, 100, "vector speed");
        assert_eq!(config.vector_frequency, 5000, "vector frequency");
        assert_eq!(config.screen_size, 1, "screen size");
        assert_eq!(config.x_repeat, 1, "x repeat");
        assert_eq!(config.y_repeat, 1, "y repeat");

        let config = JobConfig {
            resolution: 2400,
            vector_frequency: 1,
            ..JobConfig::default()
        }
        .clamped();
        assert_eq!(config.resolution, 1200, "resolution upper bound");
        assert_eq!(config.vector_frequency, 10, "frequency lower bound");
    }

    #[test]
    fn test_clamp_is_idempotent() {
        let config = JobConfig {
            resolution: 300,
            raster_power: 0,
            raster_speed: 100,
            vector_power: 100,
            vector_speed: 1,
            vector_frequency: 10,
            x_repeat: 3,
            ..JobConfig::default()
        };

        let once = config.clone().clamped();
        assert_eq!(once, config, "in-range values must be untouched");
        assert_eq!(once.clone().clamped(), once, "clamping twice changes nothing");
    }

    #[test]
    fn test_title_falls_back_to_name() {
        let mut config = JobConfig {
            job_name: "coasters".to_string(),
            ..JobConfig::default()
        };
        assert_eq!(config.title(), "coasters");

        config.job_title = "Birch coasters".to_string();
        assert_eq!(config.title(), "Birch coasters");
    }

    #[test]
    fn test_passes_enabled() {
        let config = JobConfig::default();
        assert!(config.has_raster());
        assert!(config.has_vector());

        let config = JobConfig {
            raster_mode: RasterMode::None,
            vector_power: 0,
            ..JobConfig::default()
        };
        assert!(!config.has_raster());
        assert!(!config.has_vector());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: JobConfig =
            serde_json::from_str(r#"{"raster_mode": "color", "vector_speed": 10}"#)
                .expect("failed to parse config");
        assert_eq!(config.raster_mode, RasterMode::Colour);
        assert_eq!(config.vector_speed, 10);
        assert_eq!(config.resolution, 600, "missing fields use defaults");
    }
}
