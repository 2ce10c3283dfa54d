// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! WebP: a RIFF form whose first image-bearing chunk gives the size.
//!
//! See <https://developers.google.com/speed/webp/docs/riff_container>

use crate::registry::Registry;
use crate::vp8::{VP8_HEADER_SIZE, VP8L_HEADER_SIZE, frame_size, lossless_size};
use crate::{Error, ImageType, Meta, Result, ToUsize, le_u32, read_array, skip};
use enough::Stop;
use log::debug;
use std::io::Read;

fn format_error(msg: &'static str) -> Error {
    Error::Format(ImageType::Webp, msg)
}

/// Reads the leading `min(len, N)` bytes of a chunk.
fn chunk_prefix<const N: usize>(src: &mut dyn Read, len: u32) -> Result<([u8; N], usize)> {
    let mut buf = [0; N];
    let n = N.min(len.to_usize());
    src.read_exact(&mut buf[..n])?;
    Ok((buf, n))
}

pub fn decode_webp_meta(src: &mut dyn Read, stop: &dyn Stop) -> Result<Meta> {
    let riff = read_array::<12, _>(src)?;
    if &riff[..4] != b"RIFF" {
        return Err(format_error("missing RIFF header"));
    }
    if &riff[8..] != b"WEBP" {
        return Err(format_error("RIFF form is not WEBP"));
    }
    let riff_size = u32::from_le_bytes([riff[4], riff[5], riff[6], riff[7]]);
    // The form type counts towards the RIFF size.
    let mut remaining = riff_size
        .checked_sub(4)
        .ok_or_else(|| format_error("RIFF size too small"))?;

    loop {
        stop.check()?;

        if remaining < 8 {
            return Err(format_error("no image chunk"));
        }
        let fourcc = read_array::<4, _>(src)?;
        let len = le_u32(src)?;
        remaining -= 8;
        if len > remaining {
            return Err(format_error("chunk extends past the RIFF form"));
        }
        // Chunks are padded to an even size; the padding may be missing at the end.
        let padded = len.saturating_add(len & 1).min(remaining);
        remaining -= padded;

        let (width, height) = match &fourcc {
            b"ALPH" => {
                debug!("ALPH: {len} bytes (skipped)");
                skip(src, padded.into())?;
                continue;
            },
            b"VP8 " => {
                let (buf, n) = chunk_prefix::<VP8_HEADER_SIZE>(src, len)?;
                frame_size(&buf[..n])?
            },
            b"VP8L" => {
                let (buf, n) = chunk_prefix::<VP8L_HEADER_SIZE>(src, len)?;
                lossless_size(&buf[..n])?
            },
            b"VP8X" => {
                if len != 10 {
                    return Err(format_error("VP8X chunk must be 10 bytes"));
                }
                let x = read_array::<10, _>(src)?;
                // Canvas size, stored minus one.
                let width = u32::from_le_bytes([x[4], x[5], x[6], 0]) + 1;
                let height = u32::from_le_bytes([x[7], x[8], x[9], 0]) + 1;
                (width, height)
            },
            other => {
                debug!("unexpected chunk {:?}", other.escape_ascii().to_string());
                return Err(format_error("unexpected chunk"));
            },
        };
        return Ok(Meta::new(ImageType::Webp, width, height));
    }
}

pub(crate) fn register(registry: &Registry) {
    registry.register_format(b"RIFF????WEBPVP8", decode_webp_meta);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Unstoppable;

    fn riff(chunks: &[(&[u8; 4], &[u8])]) -> std::vec::Vec<u8> {
        let mut body = b"WEBP".to_vec();
        for (fourcc, payload) in chunks {
            body.extend_from_slice(*fourcc);
            body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            body.extend_from_slice(payload);
            if payload.len() % 2 == 1 {
                body.push(0);
            }
        }
        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&(body.len() as u32).to_le_bytes());
        data.extend(body);
        data
    }

    fn decode(data: &[u8]) -> Result<Meta> {
        decode_webp_meta(&mut &data[..], &Unstoppable)
    }

    #[test]
    fn extended() {
        let vp8x = [0x10, 0, 0, 0, 0x1f, 0x03, 0, 0x57, 0x02, 0];
        let data = riff(&[(b"VP8X", &vp8x[..]), (b"ICCP", &b"profile"[..])]);
        assert_eq!(decode(&data).unwrap(), Meta::new(ImageType::Webp, 800, 600));
    }

    #[test]
    fn lossy() {
        let vp8 = [0x50, 0x02, 0x00, 0x9d, 0x01, 0x2a, 0x40, 0x01, 0xf0, 0x00, 0xaa, 0xbb];
        let data = riff(&[(b"VP8 ", &vp8[..])]);
        assert_eq!(decode(&data).unwrap(), Meta::new(ImageType::Webp, 320, 240));
    }

    #[test]
    fn lossless_after_alpha() {
        let packed: u32 = 15 | (15 << 14);
        let mut vp8l = vec![0x2f];
        vp8l.extend_from_slice(&packed.to_le_bytes());
        let data = riff(&[(b"ALPH", &b"abc"[..]), (b"VP8L", &vp8l[..])]);
        assert_eq!(decode(&data).unwrap(), Meta::new(ImageType::Webp, 16, 16));
    }

    #[test]
    fn short_vp8_chunk() {
        let data = riff(&[(b"VP8 ", &[0x50, 0x02, 0x00, 0x9d][..])]);
        assert!(matches!(decode(&data), Err(Error::Format(ImageType::Webp, _))));
    }

    #[test]
    fn unknown_first_chunk() {
        let data = riff(&[(b"EXIF", &b"xx"[..])]);
        assert!(matches!(decode(&data), Err(Error::Format(ImageType::Webp, "unexpected chunk"))));
    }

    #[test]
    fn only_alpha() {
        let data = riff(&[(b"ALPH", &b"abcd"[..])]);
        assert!(matches!(decode(&data), Err(Error::Format(ImageType::Webp, "no image chunk"))));
    }

    #[test]
    fn chunk_larger_than_form() {
        let mut data = riff(&[(b"VP8X", &[0; 10][..])]);
        data[16..20].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(decode(&data), Err(Error::Format(ImageType::Webp, _))));
    }

    #[test]
    fn not_webp() {
        let data = b"RIFF\x04\0\0\0WAVE";
        assert!(matches!(decode(data), Err(Error::Format(ImageType::Webp, "RIFF form is not WEBP"))));
    }
}
