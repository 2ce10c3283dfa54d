// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JPEG dimensions from the first Start Of Frame segment.
//!
//! See ITU T.81 § B.1

use crate::registry::Registry;
use crate::{Error, ImageType, Meta, Result, be_u16, read_array, skip};
use byteorder::ReadBytesExt;
use enough::Stop;
use log::{debug, warn};
use std::io::Read;

// https://www.disktuna.com/list-of-jpeg-markers/
const RST0: u8 = 0xd0;
const RST7: u8 = 0xd7;
const SOI: u8 = 0xd8;
const EOI: u8 = 0xd9;
const SOS: u8 = 0xda;

/// Start Of Frame, all flavours: baseline, extended, progressive, lossless,
/// and their differential / arithmetic-coded variants. `0xc4`, `0xc8` and
/// `0xcc` in that range are DHT, JPG and DAC.
fn is_sof(marker: u8) -> bool {
    matches!(marker, 0xc0..=0xc3 | 0xc5..=0xc7 | 0xc9..=0xcb | 0xcd..=0xcf)
}

fn format_error(msg: &'static str) -> Error {
    Error::Format(ImageType::Jpeg, msg)
}

pub fn decode_jpeg_meta(src: &mut dyn Read, stop: &dyn Stop) -> Result<Meta> {
    let soi = read_array::<2, _>(src)?;
    if soi != [0xff, SOI] {
        return Err(format_error("missing SOI marker"));
    }

    loop {
        stop.check()?;

        let mut tmp = read_array::<2, _>(src)?;

        // Not at a marker yet; slide forward until we are.
        while tmp[0] != 0xff {
            tmp[0] = tmp[1];
            tmp[1] = src.read_u8()?;
        }

        let mut marker = tmp[1];

        // "\xff\x00" is stuffed entropy-coded data.
        if marker == 0 {
            continue;
        }

        // Markers may be preceded by any number of fill bytes.
        while marker == 0xff {
            marker = src.read_u8()?;
        }

        if marker == EOI {
            return Err(format_error("missing SOF marker"));
        }

        if (RST0..=RST7).contains(&marker) {
            continue;
        }

        let length = be_u16(src)?;
        // The length counts its own two bytes.
        let Some(segment_len) = length.checked_sub(2).filter(|&n| n > 0) else {
            // Broken, but other decoders accept these; so do we.
            debug!("marker {marker:#04x} with segment length {length} (ignored)");
            continue;
        };

        if is_sof(marker) {
            let frame = read_array::<5, _>(src)?;
            if frame[0] != 8 {
                warn!("jpeg: {}-bit precision is not supported", frame[0]);
                return Err(format_error("unsupported precision"));
            }
            let height = u16::from_be_bytes([frame[1], frame[2]]);
            let width = u16::from_be_bytes([frame[3], frame[4]]);
            return Ok(Meta::new(ImageType::Jpeg, width.into(), height.into()));
        }

        if marker == SOS {
            return Err(format_error("missing SOF marker"));
        }

        debug!("marker {marker:#04x}: {segment_len} bytes (skipped)");
        skip(src, segment_len.into())?;
    }
}

pub(crate) fn register(registry: &Registry) {
    registry.register_format(b"\xff\xd8", decode_jpeg_meta);
}
