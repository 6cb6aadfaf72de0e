//! `bitmap`
//!
//! Reads the windows bitmap produced by the rasterizer, one padded row at a time.

use std::io::{ErrorKind, Read, Seek, SeekFrom};

use log::debug;

use crate::{EncodeError, RasterMode};

/// Number of bytes in the bitmap header.
pub const HEADER_LEN: usize = 54;

/// The widest padded row we are prepared to buffer, in bytes.
pub const MAX_ROW_BYTES: usize = 102_400;

/// Byte offset of the pixel data offset field.
const DATA_OFFSET_AT: usize = 10;
/// Byte offset of the width field.
const WIDTH_AT: usize = 18;
/// Byte offset of the height field.
const HEIGHT_AT: usize = 22;
/// Byte offset of the bits per pixel field.
const BITS_PER_PIXEL_AT: usize = 28;

/// The fields of a bitmap header that the raster encoder cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapHeader {
    /// Offset from the start of the file to the first pixel row.
    pub data_offset: u64,
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Colour depth declared by the file.
    pub bits_per_pixel: u16,
}

impl BitmapHeader {
    /// Decodes a bitmap header.
    ///
    /// # Arguments
    /// * `bytes`: At least [`HEADER_LEN`] bytes from the start of the file.
    ///
    /// # Returns
    /// The decoded header.
    ///
    /// # Errors
    /// [`EncodeError::InvalidHeader`] if the bytes are short, are not a bitmap or
    /// describe an empty or top-down image.
    pub fn parse(bytes: &[u8]) -> Result<Self, EncodeError> {
        /// Reads a little-endian `i32` at a byte offset.
        #[inline]
        fn le_i32(bytes: &[u8], at: usize) -> Option<i32> {
            Some(i32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
        }

        /// Reads a little-endian `u32` at a byte offset.
        #[inline]
        fn le_u32(bytes: &[u8], at: usize) -> Option<u32> {
            Some(u32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
        }

        /// Reads a little-endian `u16` at a byte offset.
        #[inline]
        fn le_u16(bytes: &[u8], at: usize) -> Option<u16> {
            Some(u16::from_le_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
        }

        if bytes.len() < HEADER_LEN {
            return Err(EncodeError::InvalidHeader("header is truncated"));
        }
        if &bytes[..2] != b"BM" {
            return Err(EncodeError::InvalidHeader("missing BM signature"));
        }

        let truncated = || EncodeError::InvalidHeader("header is truncated");
        let data_offset = le_u32(bytes, DATA_OFFSET_AT).ok_or_else(truncated)?;
        let width = le_i32(bytes, WIDTH_AT).ok_or_else(truncated)?;
        let height = le_i32(bytes, HEIGHT_AT).ok_or_else(truncated)?;
        let bits_per_pixel = le_u16(bytes, BITS_PER_PIXEL_AT).ok_or_else(truncated)?;

        let width = usize::try_from(width)
            .ok()
            .filter(|width| *width > 0)
            .ok_or(EncodeError::InvalidHeader("width must be positive"))?;
        let height = usize::try_from(height)
            .ok()
            .filter(|height| *height > 0)
            .ok_or(EncodeError::InvalidHeader(
                "height must be positive, top-down bitmaps are not supported",
            ))?;

        Ok(BitmapHeader {
            data_offset: u64::from(data_offset),
            width,
            height,
            bits_per_pixel,
        })
    }

    /// Reads and decodes a header from the current position of a stream.
    ///
    /// # Arguments
    /// * `reader`: The stream, positioned at the start of the bitmap.
    ///
    /// # Returns
    /// The decoded header.
    ///
    /// # Errors
    /// [`EncodeError::InvalidHeader`] for short or malformed headers,
    /// [`EncodeError::Bitmap`] if the stream cannot be read.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, EncodeError> {
        let mut bytes = [0; HEADER_LEN];
        match reader.read_exact(&mut bytes) {
            Ok(()) => Self::parse(&bytes),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                Err(EncodeError::InvalidHeader("header is truncated"))
            }
            Err(err) => Err(EncodeError::Bitmap(err)),
        }
    }
}

/// The number of meaningful bytes in one row of pixels.
///
/// # Arguments
/// * `mode`: Raster mode, which implies the pixel depth.
/// * `width`: Width in pixels.
///
/// # Returns
/// Bytes per row, before padding.
pub fn row_bytes(mode: RasterMode, width: usize) -> usize {
    match mode {
        RasterMode::Grey => width,
        RasterMode::Colour => width * 3,
        RasterMode::Mono | RasterMode::None => width.div_ceil(8),
    }
}

/// The number of bytes a row occupies in the file, padded to 4 bytes.
///
/// # Arguments
/// * `row_bytes`: Meaningful bytes in the row.
///
/// # Returns
/// The padded row length.
pub fn stride(row_bytes: usize) -> usize {
    row_bytes.div_ceil(4) * 4
}

/// A bitmap being read row by row.
pub struct Bitmap<R> {
    /// The underlying stream.
    reader: R,
    /// The decoded header.
    header: BitmapHeader,
    /// Meaningful bytes per row.
    row_bytes: usize,
    /// The row buffer, one padded row long.
    row: Vec<u8>,
}

impl<R: Read + Seek> Bitmap<R> {
    /// Reads the header of a bitmap and prepares to read its rows.
    ///
    /// # Arguments
    /// * `reader`: The stream, positioned at the start of the bitmap.
    /// * `mode`: How the pixel data is laid out.
    ///
    /// # Returns
    /// The bitmap, positioned at its first row.
    ///
    /// # Errors
    /// Header errors, [`EncodeError::RowTooWide`] if a row is larger than
    /// [`MAX_ROW_BYTES`], or [`EncodeError::Bitmap`] if it cannot seek.
    pub fn open(mut reader: R, mode: RasterMode) -> Result<Self, EncodeError> {
        let header = BitmapHeader::read_from(&mut reader)?;
        let row_bytes = row_bytes(mode, header.width);
        let stride = stride(row_bytes);
        if stride > MAX_ROW_BYTES {
            return Err(EncodeError::RowTooWide {
                row_bytes: stride,
                limit: MAX_ROW_BYTES,
            });
        }

        let expected_depth = match mode {
            RasterMode::Grey => 8,
            RasterMode::Colour => 24,
            RasterMode::Mono | RasterMode::None => 1,
        };
        if header.bits_per_pixel != expected_depth {
            debug!(
                "bitmap declares {} bits per pixel, reading it as {expected_depth}",
                header.bits_per_pixel
            );
        }
        debug!(
            "Width {} Height {} Bytes {row_bytes} Line {stride}",
            header.width, header.height
        );

        let mut bitmap = Bitmap {
            reader,
            header,
            row_bytes,
            row: vec![0; stride],
        };
        bitmap.rewind()?;
        Ok(bitmap)
    }

    /// Gets the decoded header.
    ///
    /// # Returns
    /// The bitmap header.
    pub fn header(&self) -> &BitmapHeader {
        &self.header
    }

    /// Goes back to the first row of pixel data.
    ///
    /// # Errors
    /// [`EncodeError::Bitmap`] if the stream cannot seek.
    pub fn rewind(&mut self) -> Result<(), EncodeError> {
        self.reader
            .seek(SeekFrom::Start(self.header.data_offset))
            .map_err(EncodeError::Bitmap)?;
        Ok(())
    }

    /// Reads the next row.
    ///
    /// # Arguments
    /// * `y`: The row being read, only used for error reporting.
    ///
    /// # Returns
    /// The meaningful bytes of the row, without padding.
    ///
    /// # Errors
    /// [`EncodeError::ShortRead`] if the stream ends part way through the row,
    /// [`EncodeError::Bitmap`] if it cannot be read.
    pub fn read_row(&mut self, y: usize) -> Result<&[u8], EncodeError> {
        let expected = self.row.len();
        let mut filled = 0;
        while filled < expected {
            match self.reader.read(&mut self.row[filled..]) {
                Ok(0) => break,
                Ok(count) => filled += count,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(EncodeError::Bitmap(err)),
            }
        }

        if filled != expected {
            return Err(EncodeError::ShortRead {
                row: y,
                expected,
                got: filled,
            });
        }

        Ok(&self.row[..self.row_bytes])
    }
}

/// Builds bitmap files for tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::{row_bytes, stride, HEADER_LEN};
    use crate::RasterMode;

    /// Builds a bitmap file from rows given top to bottom.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub(crate) fn bitmap(mode: RasterMode, width: usize, rows: &[Vec<u8>]) -> Vec<u8> {
        let (bits, palette) = match mode {
            RasterMode::Grey => (8u16, 256 * 4),
            RasterMode::Colour => (24, 0),
            RasterMode::Mono | RasterMode::None => (1, 2 * 4),
        };
        let stride = stride(row_bytes(mode, width));
        let data_offset = HEADER_LEN + palette;
        let size = data_offset + stride * rows.len();

        let mut file = vec![0u8; data_offset];
        file[0..2].copy_from_slice(b"BM");
        file[2..6].copy_from_slice(&(size as u32).to_le_bytes());
        file[10..14].copy_from_slice(&(data_offset as u32).to_le_bytes());
        file[14..18].copy_from_slice(&40u32.to_le_bytes());
        file[18..22].copy_from_slice(&(width as i32).to_le_bytes());
        file[22..26].copy_from_slice(&(rows.len() as i32).to_le_bytes());
        file[26..28].copy_from_slice(&1u16.to_le_bytes());
        file[28..30].copy_from_slice(&bits.to_le_bytes());

        // bitmaps are stored bottom row first
        for row in rows.iter().rev() {
            let mut padded = row.clone();
            padded.resize(stride, 0);
            file.extend_from_slice(&padded);
        }

        file
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use super::*;

    /// A bitmap on a stream that refuses to seek.
    struct Unseekable(Cursor<Vec<u8>>);

    impl Read for Unseekable {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Seek for Unseekable {
        fn seek(&mut self, _: SeekFrom) -> io::Result<u64> {
            Err(io::Error::new(ErrorKind::Unsupported, "cannot seek"))
        }
    }

    #[test]
    fn test_rewind_failure_is_a_bitmap_error() {
        let file = fixtures::bitmap(RasterMode::Grey, 4, &[vec![0; 4]]);
        match Bitmap::open(Unseekable(Cursor::new(file)), RasterMode::Grey) {
            Err(EncodeError::Bitmap(err)) => assert_eq!(err.kind(), ErrorKind::Unsupported),
            Err(other) => panic!("expected a bitmap error, got {other}"),
            Ok(_) => panic!("expected a bitmap error"),
        }
    }

    #[test]
    fn test_parse_header() {
        let file = fixtures::bitmap(RasterMode::Colour, 800, &vec![vec![0; 2400]; 2]);
        let header = BitmapHeader::parse(&file).expect("valid header");

        assert_eq!(header.width, 800);
        assert_eq!(header.height, 2);
        assert_eq!(header.data_offset, 54);
        assert_eq!(header.bits_per_pixel, 24);
    }

    #[test]
    fn test_invalid_headers() {
        assert!(matches!(
            BitmapHeader::parse(&[0; 10]),
            Err(EncodeError::InvalidHeader(_))
        ));

        let mut file = fixtures::bitmap(RasterMode::Grey, 4, &[vec![0; 4]]);
        file[0] = b'X';
        assert!(matches!(
            BitmapHeader::parse(&file),
            Err(EncodeError::InvalidHeader(_))
        ));

        let mut file = fixtures::bitmap(RasterMode::Grey, 4, &[vec![0; 4]]);
        file[22..26].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(matches!(
            BitmapHeader::parse(&file),
            Err(EncodeError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_row_sizes() {
        assert_eq!(row_bytes(RasterMode::Mono, 9), 2);
        assert_eq!(row_bytes(RasterMode::Grey, 9), 9);
        assert_eq!(row_bytes(RasterMode::Colour, 9), 27);
        assert_eq!(stride(2), 4);
        assert_eq!(stride(27), 28);
        assert_eq!(stride(28), 28);
    }

    #[test]
    fn test_read_rows_bottom_up() {
        let file = fixtures::bitmap(RasterMode::Grey, 3, &[vec![1, 2, 3], vec![4, 5, 6]]);
        let mut bitmap = Bitmap::open(Cursor::new(file), RasterMode::Grey).expect("open");

        assert_eq!(bitmap.read_row(1).expect("bottom row"), &[4, 5, 6]);
        assert_eq!(bitmap.read_row(0).expect("top row"), &[1, 2, 3]);

        bitmap.rewind().expect("rewind");
        assert_eq!(bitmap.read_row(1).expect("bottom row again"), &[4, 5, 6]);
    }

    #[test]
    fn test_short_read() {
        let mut file = fixtures::bitmap(RasterMode::Grey, 3, &[vec![1, 2, 3], vec![4, 5, 6]]);
        file.truncate(file.len() - 2);
        let mut bitmap = Bitmap::open(Cursor::new(file), RasterMode::Grey).expect("open");

        bitmap.read_row(1).expect("bottom row is complete");
        assert!(matches!(
            bitmap.read_row(0),
            Err(EncodeError::ShortRead {
                row: 0,
                expected: 4,
                got: 2
            })
        ));
    }

    #[test]
    fn test_row_too_wide() {
        let mut file = fixtures::bitmap(RasterMode::Colour, 1, &[vec![0; 3]]);
        file[18..22].copy_from_slice(&100_000i32.to_le_bytes());

        assert!(matches!(
            Bitmap::open(Cursor::new(file), RasterMode::Colour),
            Err(EncodeError::RowTooWide { .. })
        ));
    }
}
