//! `bed`
//!
//! Where the design lands on the engraver's bed: the re-centering origin, the
//! page size in device pixels and the grid of tiled copies.

use crate::JobConfig;

/// Accepted number of points per inch.
pub const POINTS_PER_INCH: i64 = 72;

/// Converts a length in device pixels to points at a resolution.
///
/// # Arguments
/// * `pixels`: The length in device pixels.
/// * `resolution`: Device resolution in DPI.
///
/// # Returns
/// The length in points, rounded towards zero.
pub fn pixels_to_points(pixels: i64, resolution: i64) -> i64 {
    pixels * POINTS_PER_INCH / resolution.max(1)
}

/// Converts a length in points to device pixels at a resolution.
///
/// # Arguments
/// * `points`: The length in points.
/// * `resolution`: Device resolution in DPI.
///
/// # Returns
/// The length in device pixels, rounded towards zero.
pub fn points_to_pixels(points: i64, resolution: i64) -> i64 {
    points * resolution / POINTS_PER_INCH
}

/// Placement of one page (and its tiled copies) on the bed.
///
/// All measurements are in device pixels at the job resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// X origin of the first copy.
    pub base_x: i64,
    /// Y origin of the first copy.
    pub base_y: i64,
    /// Width of one page, also the X step between copies.
    pub page_width: i64,
    /// Height of one page, also the Y step between copies.
    pub page_height: i64,
    /// Copies along X.
    pub x_repeat: i64,
    /// Copies along Y.
    pub y_repeat: i64,
}

impl Placement {
    /// Places a page of known pixel size.
    ///
    /// The centering origin is worked out in points against the page size, a
    /// design that would start off the bed is pinned to the edge.
    ///
    /// # Arguments
    /// * `config`: The (clamped) job settings.
    /// * `page_width`: Page width in device pixels.
    /// * `page_height`: Page height in device pixels.
    ///
    /// # Returns
    /// The placement of the page and its copies.
    pub fn new(config: &JobConfig, page_width: i64, page_height: i64) -> Self {
        /// Origin in points, 0 when not centering.
        #[inline]
        fn base(center: i32, extent: i64) -> i64 {
            if center == 0 {
                0
            } else {
                (i64::from(center) - extent / 2).max(0)
            }
        }

        let resolution = i64::from(config.resolution);
        let width_pt = pixels_to_points(page_width, resolution);
        let height_pt = pixels_to_points(page_height, resolution);
        Placement {
            base_x: points_to_pixels(base(config.x_center, width_pt), resolution),
            base_y: points_to_pixels(base(config.y_center, height_pt), resolution),
            page_width,
            page_height,
            x_repeat: i64::from(config.x_repeat.max(1)),
            y_repeat: i64::from(config.y_repeat.max(1)),
        }
    }

    /// Places a page that covers the whole bed, used when there is no bitmap
    /// to read the page size from.
    ///
    /// # Arguments
    /// * `config`: The (clamped) job settings.
    ///
    /// # Returns
    /// The placement of a bed-sized page.
    pub fn for_bed(config: &JobConfig) -> Self {
        let resolution = i64::from(config.resolution);
        Self::new(
            config,
            points_to_pixels(i64::from(config.bed_width), resolution),
            points_to_pixels(i64::from(config.bed_height), resolution),
        )
    }

    /// Width of the whole tiled area.
    ///
    /// # Returns
    /// Page width times the X repeat count.
    pub fn total_width(&self) -> i64 {
        self.page_width * self.x_repeat
    }

    /// Height of the whole tiled area.
    ///
    /// # Returns
    /// Page height times the Y repeat count.
    pub fn total_height(&self) -> i64 {
        self.page_height * self.y_repeat
    }

    /// Offsets of each copy along X, furthest copy first.
    ///
    /// # Returns
    /// An iterator over the X offsets.
    pub fn x_offsets(&self) -> impl Iterator<Item = i64> {
        let step = self.page_width;
        (0..self.x_repeat).rev().map(move |index| index * step)
    }

    /// Offsets of each copy along Y, furthest copy first.
    ///
    /// # Returns
    /// An iterator over the Y offsets.
    pub fn y_offsets(&self) -> impl Iterator<Item = i64> {
        let step = self.page_height;
        (0..self.y_repeat).rev().map(move |index| index * step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_to_pixels() {
        assert_eq!(points_to_pixels(72, 600), 600, "one inch");
        assert_eq!(points_to_pixels(1728, 300), 7200, "bed width");
        assert_eq!(points_to_pixels(1, 75), 1, "rounds towards zero");
    }

    #[test]
    fn test_uncentered_placement() {
        let config = JobConfig::default();
        let placement = Placement::new(&config, 800, 600);

        assert_eq!(placement.base_x, 0);
        assert_eq!(placement.base_y, 0);
        assert_eq!(placement.total_width(), 800);
        assert_eq!(placement.x_offsets().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_pixels_to_points() {
        assert_eq!(pixels_to_points(600, 600), 72, "one inch");
        assert_eq!(pixels_to_points(7200, 300), 1728, "bed width");
        assert_eq!(pixels_to_points(1, 300), 0, "rounds towards zero");
    }

    #[test]
    fn test_centered_placement() {
        let config = JobConfig {
            resolution: 72,
            x_center: 500,
            y_center: 30,
            ..JobConfig::default()
        };
        let placement = Placement::new(&config, 100, 100);

        // 500 - 100 / 2
        assert_eq!(placement.base_x, 450, "x centred on the page");
        // 30 - 100 / 2 is off the bed
        assert_eq!(placement.base_y, 0, "y pinned to the edge");
    }

    #[test]
    fn test_centered_placement_scales_with_resolution() {
        let config = JobConfig {
            resolution: 300,
            x_center: 864,
            y_center: 432,
            ..JobConfig::default()
        };
        // a 2 x 1 inch page
        let placement = Placement::new(&config, 600, 300);

        // (864 - 144 / 2) points at 300 dpi
        assert_eq!(placement.base_x, 3300);
        // (432 - 72 / 2) points at 300 dpi
        assert_eq!(placement.base_y, 1650);
    }

    #[test]
    fn test_centered_bed_page() {
        let config = JobConfig {
            resolution: 300,
            x_center: 1000,
            ..JobConfig::default()
        };
        let placement = Placement::for_bed(&config);

        // (1000 - 1728 / 2) points at 300 dpi
        assert_eq!(placement.base_x, 566);
        assert_eq!(placement.base_y, 0, "y not centred");
    }

    #[test]
    fn test_tile_offsets() {
        let config = JobConfig {
            x_repeat: 3,
            y_repeat: 2,
            ..JobConfig::default()
        };
        let placement = Placement::new(&config, 100, 50);

        assert_eq!(placement.x_offsets().collect::<Vec<_>>(), vec![200, 100, 0]);
        assert_eq!(placement.y_offsets().collect::<Vec<_>>(), vec![50, 0]);
        assert_eq!(placement.total_width(), 300);
        assert_eq!(placement.total_height(), 100);
    }

    #[test]
    fn test_bed_placement() {
        let config = JobConfig {
            resolution: 300,
            ..JobConfig::default()
        };
        let placement = Placement::for_bed(&config);
        assert_eq!(placement.page_width, 7200);
        assert_eq!(placement.page_height, 3600);
    }
}
