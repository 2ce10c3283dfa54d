// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Just enough of the VP8 and VP8L bitstream headers to get frame sizes.

use crate::bits::BitReader;
use crate::{Error, ImageType, Result};

/// Frame tag plus the keyframe start code and dimensions.
pub(crate) const VP8_HEADER_SIZE: usize = 10;
/// Signature byte plus the packed 32-bit size/alpha/version word.
pub(crate) const VP8L_HEADER_SIZE: usize = 5;

const VP8_START_CODE: [u8; 3] = [0x9d, 0x01, 0x2a];
const VP8L_SIGNATURE: u8 = 0x2f;

fn format_error(msg: &'static str) -> Error {
    Error::Format(ImageType::Webp, msg)
}

/// Dimensions of a lossy keyframe.
///
/// See RFC 6386 § 9.1
pub(crate) fn frame_size(header: &[u8]) -> Result<(u32, u32)> {
    let Some(h) = header.first_chunk::<VP8_HEADER_SIZE>() else {
        return Err(format_error("VP8 frame header too short"));
    };
    // Bit 0 of the frame tag is 0 for keyframes.
    if h[0] & 1 != 0 {
        return Err(format_error("VP8 stream doesn't start with a keyframe"));
    }
    if h[3..6] != VP8_START_CODE {
        return Err(format_error("invalid VP8 start code"));
    }
    // The top two bits are the upscaling factor.
    let width = u16::from_le_bytes([h[6], h[7]]) & 0x3fff;
    let height = u16::from_le_bytes([h[8], h[9]]) & 0x3fff;
    Ok((width.into(), height.into()))
}

/// Dimensions from a VP8L image header.
///
/// See the WebP Lossless Bitstream Specification § 3.
pub(crate) fn lossless_size(header: &[u8]) -> Result<(u32, u32)> {
    let Some(h) = header.first_chunk::<VP8L_HEADER_SIZE>() else {
        return Err(format_error("VP8L header too short"));
    };
    if h[0] != VP8L_SIGNATURE {
        return Err(format_error("invalid VP8L signature"));
    }

    let mut bits = BitReader::new(&h[1..]);
    let mut read = |n| bits.read(n).map_err(|_| format_error("VP8L header too short"));
    let width = read(14)? + 1;
    let height = read(14)? + 1;
    let _has_alpha = read(1)?;
    if read(3)? != 0 {
        return Err(format_error("unsupported VP8L version"));
    }
    Ok((width, height))
}

#[test]
fn keyframe() {
    // 8x8 keyframe as written by cwebp
    let header = [0x50, 0x02, 0x00, 0x9d, 0x01, 0x2a, 0x08, 0x00, 0x08, 0x00];
    assert_eq!(frame_size(&header).unwrap(), (8, 8));

    let scaled = [0x50, 0x02, 0x00, 0x9d, 0x01, 0x2a, 0x80, 0x47, 0x38, 0xc4];
    assert_eq!(frame_size(&scaled).unwrap(), (1920, 1080));
}

#[test]
fn interframe_or_bad_start_code() {
    let inter = [0x51, 0x02, 0x00, 0x9d, 0x01, 0x2a, 0x08, 0x00, 0x08, 0x00];
    assert!(frame_size(&inter).is_err());
    let bad = [0x50, 0x02, 0x00, 0x9d, 0x01, 0x2b, 0x08, 0x00, 0x08, 0x00];
    assert!(frame_size(&bad).is_err());
    assert!(frame_size(&bad[..9]).is_err());
}

#[test]
fn lossless() {
    // width-1 = 99, height-1 = 49, alpha = 1, version = 0
    let packed: u32 = 99 | (49 << 14) | (1 << 28);
    let mut header = vec![VP8L_SIGNATURE];
    header.extend_from_slice(&packed.to_le_bytes());
    assert_eq!(lossless_size(&header).unwrap(), (100, 50));

    let versioned: u32 = packed | (1 << 29);
    let mut header = vec![VP8L_SIGNATURE];
    header.extend_from_slice(&versioned.to_le_bytes());
    assert!(lossless_size(&header).is_err());

    assert!(lossless_size(&[0x2e, 0, 0, 0, 0]).is_err());
}
