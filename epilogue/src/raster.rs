//! `raster`
//!
//! Turns the rasterizer's bitmap into PCL raster graphics: power-scaled,
//! serpentine, run-length packed scan lines.

use std::io::{Read, Seek, SeekFrom, Write};

use ascii::AsciiChar;
use log::debug;

use crate::{
    bed::Placement,
    bitmap::Bitmap,
    packbits::{pack, padded_len, FILLER},
    pcl::ESC,
    EncodeError, JobConfig, RasterMode,
};

/// Channel values above this count as saturated when separating colours.
const SATURATED: u8 = 240;

/// A summary of what was engraved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RasterStats {
    /// Width of the bitmap, in pixels.
    pub width: usize,
    /// Height of the bitmap, in pixels.
    pub height: usize,
    /// Separation passes per tile.
    pub passes: u8,
    /// Scan lines that had something to engrave, across all repeats, tiles and passes.
    pub lines: usize,
}

/// Splits a BGR pixel into its separation pass and grey level.
///
/// Each saturated channel sets its bit in the pass mask (blue 1, green 2,
/// red 4), the remaining channels are averaged. White has no unsaturated
/// channels and so nothing to engrave.
///
/// # Arguments
/// * `pixel`: Blue, green and red channel values.
///
/// # Returns
/// The pass mask and the average of the unsaturated channels, or `None` for white.
#[allow(clippy::cast_possible_truncation)]
pub fn separate(pixel: [u8; 3]) -> Option<(u8, u8)> {
    let mut mask = 0;
    let mut count = 0u16;
    let mut total = 0u16;
    for (channel, value) in pixel.into_iter().enumerate() {
        if value > SATURATED {
            mask |= 1 << channel;
        } else {
            count += 1;
            total += u16::from(value);
        }
    }

    (count > 0).then(|| (mask, (total / count) as u8))
}

/// Scales an inverted grey level (0 = white) by the raster power.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale(level: u8, power: i32) -> u8 {
    (i32::from(level) * power / 255) as u8
}

/// Turns one row of pixels into laser power, one byte per pixel, or one bit
/// per pixel in mono mode.
///
/// # Arguments
/// * `mode`: Pixel layout of `row`.
/// * `row`: The meaningful bytes of the row.
/// * `width`: Width in pixels.
/// * `pass`: The colour separation pass being engraved.
/// * `power`: Raster power, 0-100.
/// * `line`: Buffer for the result, cleared first.
pub fn decode_row(
    mode: RasterMode,
    row: &[u8],
    width: usize,
    pass: u8,
    power: i32,
    line: &mut Vec<u8>,
) {
    line.clear();
    match mode {
        RasterMode::Mono | RasterMode::None => {
            line.extend_from_slice(row);
            // bits past the right edge are padding
            let spare = line.len() * 8 - width;
            if let Some(last) = line.last_mut() {
                *last &= 0xff << spare;
            }
        }
        RasterMode::Grey => {
            line.extend(row.iter().map(|value| scale(255 - value, power)));
        }
        RasterMode::Colour => {
            line.extend(row.chunks_exact(3).take(width).map(|pixel| {
                match separate([pixel[0], pixel[1], pixel[2]]) {
                    Some((mask, level)) if mask == pass => scale(255 - level, power),
                    _ => 0,
                }
            }));
        }
    }
}

/// Mirrors a decoded line along the X axis.
///
/// # Arguments
/// * `mode`: Layout of `line`.
/// * `line`: The decoded line, modified in-place.
/// * `width`: Width in pixels.
pub fn mirror_line(mode: RasterMode, line: &mut [u8], width: usize) {
    if mode.is_power_modulated() {
        line.reverse();
        return;
    }

    let source = line.to_vec();
    line.fill(0);
    for x in 0..width {
        if source[x / 8] & (0x80 >> (x % 8)) != 0 {
            let mirrored = width - 1 - x;
            line[mirrored / 8] |= 0x80 >> (mirrored % 8);
        }
    }
}

/// Writes the raster block(s) for a job.
///
/// The bitmap header is re-read for every repeat, and the pixel data is
/// rewound for every tile and pass, so the stream must be seekable. The
/// header's geometry always wins over the configured bed size.
///
/// # Arguments
/// * `config`: The (clamped) job settings.
/// * `bitmap`: The bitmap stream, positioned at its header.
/// * `out`: Where to write the PCL.
///
/// # Returns
/// What was engraved.
///
/// # Errors
/// Any [`EncodeError`], after which the output is incomplete and must not be sent.
pub fn generate_raster<R: Read + Seek, W: Write>(
    config: &JobConfig,
    bitmap: &mut R,
    out: &mut W,
) -> Result<RasterStats, EncodeError> {
    let mode = config.raster_mode;
    let passes = mode.passes();
    let start = bitmap.stream_position().map_err(EncodeError::Bitmap)?;
    let mut stats = RasterStats {
        passes,
        ..RasterStats::default()
    };

    for _ in 0..config.raster_repeat {
        bitmap
            .seek(SeekFrom::Start(start))
            .map_err(EncodeError::Bitmap)?;
        let mut image = Bitmap::open(&mut *bitmap, mode)?;
        let header = *image.header();
        stats.width = header.width;
        stats.height = header.height;

        #[allow(clippy::cast_possible_wrap)]
        let placement = Placement::new(config, header.width as i64, header.height as i64);

        let (power, compression) = if mode.is_power_modulated() {
            (100, 7)
        } else {
            (config.raster_power, 2)
        };
        debug!("Raster power={power} speed={}", config.raster_speed);

        write!(out, "{ESC}*r0F")?;
        write!(out, "{ESC}&y{power}P")?;
        write!(out, "{ESC}&z{}S", config.raster_speed)?;
        write!(out, "{ESC}*r{}T", placement.total_height())?;
        write!(out, "{ESC}*r{}S", placement.total_width())?;
        write!(out, "{ESC}*b{compression}M")?;
        // Raster direction, 1 = up.
        write!(out, "{ESC}&y1O")?;
        // Start at current position.
        write!(out, "{ESC}*r1A")?;

        let mut scan = Scanner {
            config,
            placement,
            line: Vec::with_capacity(header.width),
            packed: Vec::with_capacity(header.width * 2),
        };
        for off_x in placement.x_offsets() {
            for off_y in placement.y_offsets() {
                for pass in 0..passes {
                    image.rewind()?;
                    stats.lines += scan.pass(&mut image, (off_x, off_y), pass, out)?;
                }
            }
        }

        write!(out, "{ESC}*rC")?;
        out.write_all(&[AsciiChar::SUB.as_byte(), AsciiChar::EOT.as_byte()])?;
    }

    Ok(stats)
}

/// Encodes the scan lines of one pass over one tile.
struct Scanner<'a> {
    /// The job settings.
    config: &'a JobConfig,
    /// Where the tiles go.
    placement: Placement,
    /// The decoded line, reused for every row.
    line: Vec<u8>,
    /// The packed line, reused for every row.
    packed: Vec<u8>,
}

impl Scanner<'_> {
    /// Encodes every row of the bitmap for one pass.
    ///
    /// # Arguments
    /// * `image`: The bitmap, rewound to its first row.
    /// * `offset`: Offset of this tile.
    /// * `pass`: The separation pass.
    /// * `out`: Where to write the PCL.
    ///
    /// # Returns
    /// The number of scan lines written.
    #[allow(clippy::cast_possible_wrap)]
    fn pass<R: Read + Seek, W: Write>(
        &mut self,
        image: &mut Bitmap<R>,
        (off_x, off_y): (i64, i64),
        pass: u8,
        out: &mut W,
    ) -> Result<usize, EncodeError> {
        let mode = self.config.raster_mode;
        let header = *image.header();
        let (width, height) = (header.width, header.height);
        let mut reversed = false;
        let mut lines = 0;

        for y in (0..height).rev() {
            let row = image.read_row(y)?;
            decode_row(mode, row, width, pass, self.config.raster_power, &mut self.line);
            if self.config.flip {
                mirror_line(mode, &mut self.line, width);
            }

            let Some(left) = self.line.iter().position(|byte| *byte != 0) else {
                continue;
            };
            let right = self.line.iter().rposition(|byte| *byte != 0).unwrap_or(left) + 1;
            let active = &mut self.line[left..right];

            let column = if mode.is_power_modulated() { left } else { left * 8 };
            write!(out, "{ESC}*p{}Y", self.placement.base_y + off_y + y as i64)?;
            write!(out, "{ESC}*p{}X", self.placement.base_x + off_x + column as i64)?;
            if reversed {
                write!(out, "{ESC}*b-{}A", active.len())?;
                active.reverse();
            } else {
                write!(out, "{ESC}*b{}A", active.len())?;
            }
            reversed = !reversed;

            self.packed.clear();
            pack(active, &mut self.packed);
            let padded = padded_len(self.packed.len());
            self.packed.resize(padded, FILLER);
            write!(out, "{ESC}*b{padded}W")?;
            out.write_all(&self.packed)?;
            lines += 1;
        }

        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{bitmap::fixtures, packbits::unpack};

    fn grey_config(raster_power: i32) -> JobConfig {
        JobConfig {
            raster_mode: RasterMode::Grey,
            raster_power,
            ..JobConfig::default()
        }
    }

    /// Splits raster output into the packed data of each `*b#W` command.
    fn scan_lines(pcl: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = vec![];
        let mut index = 0;
        while let Some(found) = find(&pcl[index..], b"\x1b*b") {
            let command = index + found + 3;
            let digits_end = command
                + pcl[command..]
                    .iter()
                    .position(|byte| !byte.is_ascii_digit() && *byte != b'-')
                    .expect("command letter");
            let value: usize = std::str::from_utf8(&pcl[command..digits_end])
                .expect("ascii digits")
                .trim_start_matches('-')
                .parse()
                .unwrap_or(0);
            index = digits_end + 1;
            if pcl[digits_end] == b'W' {
                lines.push(unpack(&pcl[index..index + value]).expect("valid packbits"));
                index += value;
            }
        }
        lines
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }

    #[test]
    fn test_separate() {
        assert_eq!(separate([0, 0, 255]), Some((4, 0)), "pure red");
        assert_eq!(separate([255, 255, 0]), Some((3, 0)), "cyan");
        assert_eq!(separate([100, 50, 0]), Some((0, 50)), "dark grey-ish");
        assert_eq!(separate([255, 255, 255]), None, "white");
        assert_eq!(separate([241, 128, 255]), Some((5, 128)), "magenta, half power");
    }

    #[test]
    fn test_decode_grey() {
        let mut line = vec![];
        decode_row(RasterMode::Grey, &[255, 0, 128], 3, 0, 100, &mut line);
        assert_eq!(line, vec![0, 100, 49]);

        decode_row(RasterMode::Grey, &[0], 1, 0, 50, &mut line);
        assert_eq!(line, vec![50]);
    }

    #[test]
    fn test_decode_colour_passes() {
        // red, black, white
        let row = [0, 0, 255, 0, 0, 0, 255, 255, 255];
        let mut line = vec![];

        decode_row(RasterMode::Colour, &row, 3, 0, 100, &mut line);
        assert_eq!(line, vec![0, 100, 0], "grey pass gets the black pixel");

        decode_row(RasterMode::Colour, &row, 3, 4, 100, &mut line);
        assert_eq!(line, vec![100, 0, 0], "red pass gets the red pixel");

        decode_row(RasterMode::Colour, &row, 3, 2, 100, &mut line);
        assert_eq!(line, vec![0, 0, 0], "green pass is empty");
    }

    #[test]
    fn test_decode_mono_masks_padding() {
        let mut line = vec![];
        decode_row(RasterMode::Mono, &[0xff, 0xff], 10, 0, 40, &mut line);
        assert_eq!(line, vec![0xff, 0xc0]);
    }

    #[test]
    fn test_mirror_line() {
        let mut line = vec![0b1100_0000, 0b0000_0000];
        mirror_line(RasterMode::Mono, &mut line, 10);
        assert_eq!(line, vec![0b0000_0000, 0b1100_0000]);

        let mut line = vec![1, 2, 3];
        mirror_line(RasterMode::Grey, &mut line, 3);
        assert_eq!(line, vec![3, 2, 1]);
    }

    #[test]
    fn test_serpentine_and_trimming() {
        let rows = vec![vec![255, 0, 255, 255], vec![255, 0, 128, 255]];
        let file = fixtures::bitmap(RasterMode::Grey, 4, &rows);
        let mut out = vec![];

        let stats = generate_raster(&grey_config(100), &mut Cursor::new(file), &mut out)
            .expect("raster");
        assert_eq!(stats.lines, 2);

        let pcl = String::from_utf8_lossy(&out);
        // bottom row first, left to right, trimmed to the two inked pixels
        assert!(pcl.contains("\x1b*p1Y\x1b*p1X\x1b*b2A"), "{pcl:?}");
        // top row comes back right to left
        assert!(pcl.contains("\x1b*p0Y\x1b*p1X\x1b*b-1A"), "{pcl:?}");
        assert_eq!(scan_lines(&out), vec![vec![100, 49], vec![100]]);
    }

    #[test]
    fn test_raster_header_and_trailer() {
        let file = fixtures::bitmap(RasterMode::Mono, 16, &[vec![0x0f, 0xf0]]);
        let config = JobConfig {
            raster_power: 40,
            raster_speed: 75,
            x_repeat: 2,
            ..JobConfig::default()
        };
        let mut out = vec![];

        generate_raster(&config, &mut Cursor::new(file), &mut out).expect("raster");

        let expected_header = "\x1b*r0F\x1b&y40P\x1b&z75S\x1b*r1T\x1b*r32S\x1b*b2M\x1b&y1O\x1b*r1A";
        assert!(out.starts_with(expected_header.as_bytes()));
        assert!(out.ends_with(b"\x1b*rC\x1a\x04"));

        let pcl = String::from_utf8_lossy(&out);
        // two tiles, the far one first, mono columns are in pixels
        assert!(pcl.contains("\x1b*p0Y\x1b*p16X\x1b*b2A"), "{pcl:?}");
        assert!(pcl.contains("\x1b*p0Y\x1b*p0X\x1b*b2A"), "{pcl:?}");
        assert_eq!(scan_lines(&out), vec![vec![0x0f, 0xf0], vec![0x0f, 0xf0]]);
    }

    #[test]
    fn test_repeat_rereads_header() {
        let file = fixtures::bitmap(RasterMode::Grey, 2, &[vec![0, 0]]);
        let config = JobConfig {
            raster_repeat: 2,
            ..grey_config(100)
        };
        let mut out = vec![];

        let stats = generate_raster(&config, &mut Cursor::new(file), &mut out).expect("raster");
        assert_eq!(stats.lines, 2);
        assert_eq!(String::from_utf8_lossy(&out).matches("\x1b*rC").count(), 2);
    }

    #[test]
    fn test_colour_geometry_from_header() {
        // pure red everywhere, BGR
        let rows = vec![[0u8, 0, 255].repeat(800); 600];
        let file = fixtures::bitmap(RasterMode::Colour, 800, &rows);
        let config = JobConfig {
            raster_mode: RasterMode::Colour,
            raster_power: 100,
            ..JobConfig::default()
        };
        let mut out = vec![];

        let stats = generate_raster(&config, &mut Cursor::new(file), &mut out).expect("raster");

        assert_eq!(stats.passes, 7);
        assert_eq!((stats.width, stats.height), (800, 600));
        assert_eq!(stats.lines, 600, "only the red pass has anything to engrave");

        let pcl = String::from_utf8_lossy(&out[..64]);
        assert!(pcl.contains("\x1b&y100P"), "device power pinned at 100%");
        assert!(pcl.contains("\x1b*r600T\x1b*r800S\x1b*b7M"), "{pcl:?}");
        assert!(scan_lines(&out).iter().all(|line| *line == vec![100; 800]));
    }

    #[test]
    fn test_short_bitmap_is_fatal() {
        let mut file = fixtures::bitmap(RasterMode::Grey, 4, &[vec![0; 4], vec![0; 4]]);
        file.truncate(file.len() - 1);
        let mut out = vec![];

        assert!(matches!(
            generate_raster(&grey_config(100), &mut Cursor::new(file), &mut out),
            Err(EncodeError::ShortRead { .. })
        ));
    }
}
