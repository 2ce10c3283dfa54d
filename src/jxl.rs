// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JPEG XL dimensions from the `SizeHeader` at the start of the codestream.
//!
//! The codestream is either bare (starts with `FF 0A`) or wrapped in an
//! ISO BMFF container, whole in a `jxlc` box or split over `jxlp` boxes.
//!
//! See ISO/IEC 18181-1 § D.2 and ISO/IEC 18181-2 § 9

use crate::bits::{BitReader, BitReaderError};
use crate::bmff::{BoxIter, skip_box_remain};
use crate::boxes::BoxType;
use crate::registry::Registry;
use crate::{Error, ImageType, Meta, Result, be_u32, read_array};
use arrayvec::ArrayVec;
use enough::Stop;
use log::debug;
use std::io::Read;

/// Enough bytes for the widest possible `SizeHeader`, marker included.
const HEADER_MAX_SIZE: usize = 11;
const HEADER_MIN_SIZE: usize = 4;

const CODESTREAM_MARKER: &[u8; 2] = b"\xff\x0a";
const CONTAINER_SIGNATURE: &[u8; 12] = b"\x00\x00\x00\x0cJXL \x0d\x0a\x87\x0a";

/// Bits of a non-small size field, by its 2-bit selector.
const SIZE_BITS: [u32; 4] = [9, 13, 18, 30];

/// Width as a fraction of height, for ratio indices 1 to 7.
const RATIOS: [(u64, u64); 7] = [(1, 1), (12, 10), (4, 3), (3, 2), (16, 9), (5, 4), (2, 1)];

/// Set on the index of the final `jxlp` box.
const LAST_PART: u32 = 0x8000_0000;

type HeaderBytes = ArrayVec<u8, HEADER_MAX_SIZE>;

fn format_error(msg: &'static str) -> Error {
    Error::Format(ImageType::Jxl, msg)
}

fn truncated(err: BitReaderError) -> Error {
    debug!("size header needs {} more bits, {} left", err.requested, err.remaining);
    format_error("truncated size header")
}

fn read_bits(bits: &mut BitReader<'_>, n: u32) -> Result<u32> {
    bits.read(n).map_err(truncated)
}

fn read_size(bits: &mut BitReader<'_>, small: bool) -> Result<u32> {
    if small {
        return Ok((read_bits(bits, 5)? + 1) * 8);
    }
    let selector = read_bits(bits, 2)?;
    let width = SIZE_BITS[selector as usize];
    Ok(read_bits(bits, width)? + 1)
}

/// Decodes `(width, height)` from the first bytes of a codestream.
fn decode_size_header(codestream: &[u8]) -> Result<(u32, u32)> {
    if codestream.len() < HEADER_MIN_SIZE {
        return Err(format_error("codestream header too short"));
    }
    if !codestream.starts_with(CODESTREAM_MARKER) {
        return Err(format_error("missing codestream marker"));
    }

    let mut bits = BitReader::new(&codestream[CODESTREAM_MARKER.len()..]);
    let small = bits.read_bool().map_err(truncated)?;
    let height = read_size(&mut bits, small)?;
    let ratio = read_bits(&mut bits, 3)?;
    let width = match ratio.checked_sub(1) {
        None => read_size(&mut bits, small)?,
        Some(i) => {
            let (num, den) = RATIOS[i as usize];
            (u64::from(height) * num / den)
                .try_into()
                .map_err(|_| format_error("width out of range"))?
        },
    };
    Ok((width, height))
}

/// Appends up to `len` bytes from `src`, limited by the space left in `codestream`.
fn read_part<T: Read + ?Sized>(src: &mut T, len: u64, codestream: &mut HeaderBytes) -> Result<()> {
    let free = codestream.remaining_capacity();
    let n = usize::try_from(len).map_or(free, |len| len.min(free));
    let mut buf = [0; HEADER_MAX_SIZE];
    src.read_exact(&mut buf[..n])?;
    codestream.extend(buf[..n].iter().copied());
    Ok(())
}

/// Collects the start of the codestream from `jxlc` or `jxlp` boxes.
fn find_codestream(src: &mut dyn Read, stop: &dyn Stop) -> Result<HeaderBytes> {
    let mut codestream = HeaderBytes::new();
    let mut iter = BoxIter::new(src, ImageType::Jxl);

    while let Some(mut b) = iter.next_box()? {
        stop.check()?;
        match b.head.name {
            BoxType::JxlCodestreamBox => {
                let len = b.head.payload_size();
                if len < HEADER_MIN_SIZE as u64 {
                    return Err(format_error("invalid codestream box"));
                }
                read_part(&mut b, len, &mut codestream)?;
                return Ok(codestream);
            },
            BoxType::JxlPartialCodestreamBox => {
                let len = b.head.payload_size();
                if len < 4 {
                    return Err(format_error("invalid jxlp box"));
                }
                let index = be_u32(&mut b)?;
                let last = index & LAST_PART != 0;
                read_part(&mut b, len - 4, &mut codestream)?;

                if codestream.is_full() || (last && codestream.len() >= HEADER_MIN_SIZE) {
                    return Ok(codestream);
                }
                if last {
                    return Err(format_error("invalid codestream box"));
                }
                skip_box_remain(&mut b)?;
            },
            _ => skip_box_remain(&mut b)?,
        }
    }

    Err(Error::UnexpectedEOF)
}

pub fn decode_jxl_meta(src: &mut dyn Read, stop: &dyn Stop) -> Result<Meta> {
    let marker = read_array::<2, _>(src)?;

    let (width, height) = if &marker == CODESTREAM_MARKER {
        let mut codestream = HeaderBytes::new();
        codestream.extend(marker);
        read_part(src, (HEADER_MAX_SIZE - marker.len()) as u64, &mut codestream)?;
        decode_size_header(&codestream)?
    } else {
        let rest = read_array::<10, _>(src)?;
        if marker[..] != CONTAINER_SIGNATURE[..2] || rest[..] != CONTAINER_SIGNATURE[2..] {
            return Err(format_error("invalid header"));
        }
        decode_size_header(&find_codestream(src, stop)?)?
    };

    Ok(Meta::new(ImageType::Jxl, width, height))
}

pub(crate) fn register(registry: &Registry) {
    registry.register_format(CODESTREAM_MARKER, decode_jxl_meta);
    registry.register_format(CONTAINER_SIGNATURE, decode_jxl_meta);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Unstoppable;
    use crate::heif::tests::bmff_box;

    /// small, height 80, ratio 0, width 120
    const SMALL_120X80: [u8; 4] = [0xff, 0x0a, 0x13, 0x1c];

    fn jxlp(index: u32, payload: &[u8]) -> std::vec::Vec<u8> {
        let mut data = index.to_be_bytes().to_vec();
        data.extend_from_slice(payload);
        bmff_box(b"jxlp", &data)
    }

    fn decode(data: &[u8]) -> Result<Meta> {
        decode_jxl_meta(&mut &data[..], &Unstoppable)
    }

    #[test]
    fn raw_small_header() {
        let mut data = SMALL_120X80.to_vec();
        data.resize(HEADER_MAX_SIZE, 0);
        assert_eq!(decode(&data).unwrap(), Meta::new(ImageType::Jxl, 120, 80));
    }

    #[test]
    fn ratio_and_wide_fields() {
        // not small, selector 1 (13 bits) holding 1079, ratio 5 (16:9)
        let mut word: u64 = 0;
        word |= 1 << 1;
        word |= 1079 << 3;
        word |= 5 << 16;
        let mut data = CODESTREAM_MARKER.to_vec();
        data.extend_from_slice(&word.to_le_bytes());
        data.resize(HEADER_MAX_SIZE, 0);
        assert_eq!(decode(&data).unwrap(), Meta::new(ImageType::Jxl, 1920, 1080));
    }

    #[test]
    fn thirty_bit_fields() {
        // not small, selector 3 for both, ratio 0
        let mut bits: u128 = 0;
        bits |= 3 << 1;
        bits |= (100_000 - 1) << 3;
        bits |= 3 << 36;
        bits |= (200_000 - 1) << 38;
        let mut data = CODESTREAM_MARKER.to_vec();
        data.extend_from_slice(&bits.to_le_bytes()[..9]);
        assert_eq!(decode(&data).unwrap(), Meta::new(ImageType::Jxl, 200_000, 100_000));
    }

    #[test]
    fn container_with_jxlc() {
        let mut data = CONTAINER_SIGNATURE.to_vec();
        data.extend(bmff_box(b"ftyp", b"jxl \0\0\0\0jxl "));
        data.extend(bmff_box(b"jxlc", &SMALL_120X80));
        assert_eq!(decode(&data).unwrap(), Meta::new(ImageType::Jxl, 120, 80));
    }

    #[test]
    fn parts_without_last_flag() {
        let mut data = CONTAINER_SIGNATURE.to_vec();
        data.extend(jxlp(0, &SMALL_120X80[..3]));
        data.extend(bmff_box(b"Exif", b"\0\0\0\0II*\0"));
        data.extend(jxlp(1, &[SMALL_120X80[3], 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]));
        // Never looked at: the header is complete by now.
        data.extend(jxlp(LAST_PART | 2, &[]));
        assert_eq!(decode(&data).unwrap(), Meta::new(ImageType::Jxl, 120, 80));
    }

    #[test]
    fn short_last_part() {
        let mut data = CONTAINER_SIGNATURE.to_vec();
        data.extend(jxlp(0, &SMALL_120X80[..1]));
        data.extend(jxlp(LAST_PART | 1, &SMALL_120X80[1..2]));
        assert!(matches!(decode(&data), Err(Error::Format(ImageType::Jxl, "invalid codestream box"))));
    }

    #[test]
    fn last_part_is_enough() {
        let mut data = CONTAINER_SIGNATURE.to_vec();
        data.extend(jxlp(0, &SMALL_120X80[..2]));
        data.extend(jxlp(LAST_PART | 1, &SMALL_120X80[2..]));
        assert_eq!(decode(&data).unwrap(), Meta::new(ImageType::Jxl, 120, 80));
    }

    #[test]
    fn tiny_jxlc() {
        let mut data = CONTAINER_SIGNATURE.to_vec();
        data.extend(bmff_box(b"jxlc", &SMALL_120X80[..3]));
        assert!(matches!(decode(&data), Err(Error::Format(ImageType::Jxl, _))));
    }

    #[test]
    fn container_without_codestream() {
        let mut data = CONTAINER_SIGNATURE.to_vec();
        data.extend(bmff_box(b"ftyp", b"jxl \0\0\0\0"));
        assert!(matches!(decode(&data), Err(Error::UnexpectedEOF)));
    }

    #[test]
    fn header_runs_out_of_bits() {
        // not small, selector 3 needs 30 bits but only 16 follow
        assert!(matches!(
            decode_size_header(&[0xff, 0x0a, 0x06, 0x00]),
            Err(Error::Format(ImageType::Jxl, "truncated size header"))
        ));
    }
}
