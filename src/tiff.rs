// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TIFF dimensions from the first image file directory (IFD).
//!
//! See TIFF 6.0 § 2

use crate::registry::Registry;
use crate::{Error, ImageType, Meta, Result, read_array, skip};
use enough::Stop;
use log::debug;
use std::io::Read;

const HEADER_SIZE: u32 = 8;

const IMAGE_WIDTH: u16 = 256;
const IMAGE_LENGTH: u16 = 257;

const TYPE_BYTE: u16 = 1;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;

fn format_error(msg: &'static str) -> Error {
    Error::Format(ImageType::Tiff, msg)
}

#[derive(Debug, Clone, Copy)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16(self, b: [u8; 2]) -> u16 {
        match self {
            Self::Little => u16::from_le_bytes(b),
            Self::Big => u16::from_be_bytes(b),
        }
    }

    fn u32(self, b: [u8; 4]) -> u32 {
        match self {
            Self::Little => u32::from_le_bytes(b),
            Self::Big => u32::from_be_bytes(b),
        }
    }
}

/// A 12-byte IFD entry: tag, field type, value count, value (or offset).
struct IfdEntry([u8; 12]);

impl IfdEntry {
    fn tag(&self, order: ByteOrder) -> u16 {
        order.u16([self.0[0], self.0[1]])
    }

    /// Values that fit in four bytes are stored inline, left-justified.
    fn value(&self, order: ByteOrder) -> Result<u32> {
        let e = &self.0;
        match order.u16([e[2], e[3]]) {
            TYPE_BYTE => Ok(e[8].into()),
            TYPE_SHORT => Ok(order.u16([e[8], e[9]]).into()),
            TYPE_LONG => Ok(order.u32([e[8], e[9], e[10], e[11]])),
            other => {
                debug!("dimension tag with field type {other}");
                Err(format_error("unsupported dimension data type"))
            },
        }
    }
}

pub fn decode_tiff_meta(src: &mut dyn Read, stop: &dyn Stop) -> Result<Meta> {
    let header = read_array::<8, _>(src)?;
    let order = match &header[..4] {
        b"II*\0" => ByteOrder::Little,
        b"MM\0*" => ByteOrder::Big,
        _ => return Err(format_error("invalid signature")),
    };

    let ifd_offset = order.u32([header[4], header[5], header[6], header[7]]);
    if ifd_offset < HEADER_SIZE {
        return Err(format_error("IFD offset points into the header"));
    }
    skip(src, (ifd_offset - HEADER_SIZE).into())?;

    let count = order.u16(read_array::<2, _>(src)?);
    let (mut width, mut height) = (0, 0);

    // A zero dimension doesn't count; a later entry may still supply it.
    for _ in 0..count {
        stop.check()?;
        let entry = IfdEntry(read_array::<12, _>(src)?);
        match entry.tag(order) {
            IMAGE_WIDTH => width = entry.value(order)?,
            IMAGE_LENGTH => height = entry.value(order)?,
            _ => continue,
        }
        if width > 0 && height > 0 {
            return Ok(Meta::new(ImageType::Tiff, width, height));
        }
    }

    Err(format_error("image dimensions are not specified"))
}

pub(crate) fn register(registry: &Registry) {
    registry.register_format(b"II*\0", decode_tiff_meta);
    registry.register_format(b"MM\0*", decode_tiff_meta);
}
