//! `packbits`
//!
//! The run-length compression used for raster scan lines. This is the TIFF
//! "PackBits" scheme the engraver accepts as its raster compression mode.

/// Byte used to pad packed lines to a multiple of 8. Decodes as a no-op.
pub const FILLER: u8 = 0x80;

/// Longest run of identical bytes a single control byte can describe.
const MAX_RUN: usize = 128;

/// Longest literal a single control byte can describe.
const MAX_LITERAL: usize = 127;

/// Packs a scan line, appending the result to `packed`.
///
/// Runs of 2 or more identical bytes become `257 - length` followed by the
/// byte, anything else is copied as a literal preceded by `length - 1`.
///
/// # Arguments
/// * `line`: The bytes to pack.
/// * `packed`: Buffer to append the packed bytes to.
#[allow(clippy::cast_possible_truncation)]
pub fn pack(line: &[u8], packed: &mut Vec<u8>) {
    let end = line.len();
    let mut start = 0;

    while start < end {
        let mut run = start;
        while run < end && run < start + MAX_RUN && line[run] == line[start] {
            run += 1;
        }

        if run - start >= 2 {
            packed.push((257 - (run - start)) as u8);
            packed.push(line[start]);
            start = run;
        } else {
            // A literal stops as soon as the next two bytes would make a run.
            let mut literal = start;
            while literal < end
                && literal < start + MAX_LITERAL
                && (literal + 1 == end || line[literal] != line[literal + 1])
            {
                literal += 1;
            }

            packed.push((literal - start - 1) as u8);
            packed.extend_from_slice(&line[start..literal]);
            start = literal;
        }
    }
}

/// The length a packed line occupies once padded with [`FILLER`].
///
/// # Arguments
/// * `len`: Length of the packed bytes.
///
/// # Returns
/// `len` rounded up to a multiple of 8.
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(8) * 8
}

/// Unpacks a packed scan line.
///
/// # Arguments
/// * `packed`: The packed bytes, possibly padded with [`FILLER`].
///
/// # Returns
/// The unpacked bytes, or `None` if the data ends part way through a run or literal.
pub fn unpack(packed: &[u8]) -> Option<Vec<u8>> {
    let mut line = Vec::with_capacity(packed.len() * 2);
    let mut bytes = packed.iter();

    while let Some(&control) = bytes.next() {
        match control {
            0..=127 => {
                for _ in 0..=control {
                    line.push(*bytes.next()?);
                }
            }
            128 => {}
            129..=255 => {
                let value = *bytes.next()?;
                line.extend(std::iter::repeat(value).take(257 - usize::from(control)));
            }
        }
    }

    Some(line)
}
