//! `commands`
//!
//! Parses the vector stream printed by the rasterizer's stroke instrumentation.
//! One command per line, coordinates are printed y first:
//!
//! * `M<y>,<x>` move
//! * `L<y>,<x>` line
//! * `C` close path
//! * `P<power>` power change, percent of the vector power
//! * `X` end of page
//!
//! Coordinates must fit in 32 bits, lines with larger values are skipped.

use std::io::BufRead;

use crate::EncodeError;

/// A single command from the vector stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorCommand {
    /// Start a new sub-path here.
    Move {
        /// Horizontal position, device pixels.
        x: i64,
        /// Vertical position, device pixels.
        y: i64,
    },
    /// Draw from the current position to here.
    LineTo {
        /// Horizontal position, device pixels.
        x: i64,
        /// Vertical position, device pixels.
        y: i64,
    },
    /// Draw back to the start of the sub-path.
    ClosePath,
    /// Change power, 0-100% of the vector power.
    SetPower(i32),
    /// Stop reading.
    EndOfStream,
}

impl VectorCommand {
    /// Parses one line of the vector stream.
    ///
    /// # Arguments
    /// * `line`: The line, with or without its line ending.
    ///
    /// # Returns
    /// The command, or `None` for blank lines, unknown tags and malformed numbers,
    /// all of which are skipped.
    pub fn parse(line: &str) -> Option<Self> {
        let mut chars = line.chars();
        let tag = chars.next()?;
        let arguments = chars.as_str();

        match tag {
            'M' => {
                let (y, x) = coordinates(arguments)?;
                Some(VectorCommand::Move { x, y })
            }
            'L' => {
                let (y, x) = coordinates(arguments)?;
                Some(VectorCommand::LineTo { x, y })
            }
            'C' => Some(VectorCommand::ClosePath),
            'P' => {
                let (power, _) = leading_integer(arguments)?;
                #[allow(clippy::cast_possible_truncation)]
                Some(VectorCommand::SetPower(power.clamp(0, 100) as i32))
            }
            'X' => Some(VectorCommand::EndOfStream),
            _ => None,
        }
    }
}

/// Reads a signed integer from the start of a string, skipping leading
/// whitespace and ignoring whatever follows it.
///
/// # Returns
/// The value and the rest of the string.
fn leading_integer(text: &str) -> Option<(i64, &str)> {
    let text = text.trim_start();
    let sign_len = usize::from(text.starts_with(&['-', '+'][..]));
    let digits_len = text[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len() - sign_len);
    if digits_len == 0 {
        return None;
    }

    let end = sign_len + digits_len;
    Some((text[..end].parse().ok()?, &text[end..]))
}

/// Reads a `<a>,<b>` pair of 32 bit integers.
fn coordinates(text: &str) -> Option<(i64, i64)> {
    let (first, rest) = leading_integer(text)?;
    let rest = rest.trim_start().strip_prefix(',')?;
    let (second, _) = leading_integer(rest)?;
    i32::try_from(first).ok()?;
    i32::try_from(second).ok()?;
    Some((first, second))
}

/// Reads the vector stream up to and including the end of page marker.
///
/// # Arguments
/// * `reader`: The vector stream.
///
/// # Returns
/// The commands in stream order.
///
/// # Errors
/// [`EncodeError::Vectors`] if the stream cannot be read.
pub fn read_commands<R: BufRead>(mut reader: R) -> Result<Vec<VectorCommand>, EncodeError> {
    let mut commands = vec![];
    let mut line = vec![];

    loop {
        line.clear();
        if reader
            .read_until(b'\n', &mut line)
            .map_err(EncodeError::Vectors)?
            == 0
        {
            break;
        }

        if let Some(command) = VectorCommand::parse(&String::from_utf8_lossy(&line)) {
            commands.push(command);
            if command == VectorCommand::EndOfStream {
                break;
            }
        }
    }

    Ok(commands)
}
