// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Windows bitmap: 14-byte file header followed by a DIB header whose
//! first field is its own size.

use crate::registry::Registry;
use crate::{Error, ImageType, Meta, Result, le_u32, read_array};
use enough::Stop;
use std::io::Read;

/// `BITMAPCOREHEADER`
const CORE_HEADER_SIZE: u32 = 12;
/// `BITMAPINFOHEADER` and everything that extends it
const INFO_HEADER_SIZE: u32 = 40;

fn format_error(msg: &'static str) -> Error {
    Error::Format(ImageType::Bmp, msg)
}

/// Height may be negative for top-down bitmaps; the reported height is its
/// magnitude.
pub fn decode_bmp_meta(src: &mut dyn Read, _stop: &dyn Stop) -> Result<Meta> {
    let file_header = read_array::<14, _>(src)?;
    if &file_header[..2] != b"BM" {
        return Err(format_error("invalid signature"));
    }

    let dib_size = le_u32(src)?;
    if dib_size >= INFO_HEADER_SIZE {
        let dims = read_array::<8, _>(src)?;
        let width = i32::from_le_bytes([dims[0], dims[1], dims[2], dims[3]]);
        let height = i32::from_le_bytes([dims[4], dims[5], dims[6], dims[7]]);
        let width = u32::try_from(width).map_err(|_| format_error("negative width"))?;
        return Ok(Meta::new(ImageType::Bmp, width, height.unsigned_abs()));
    }

    if dib_size < CORE_HEADER_SIZE {
        return Err(format_error("DIB header too small"));
    }

    let dims = read_array::<4, _>(src)?;
    let width = u16::from_le_bytes([dims[0], dims[1]]);
    let height = i16::from_le_bytes([dims[2], dims[3]]);
    Ok(Meta::new(ImageType::Bmp, width.into(), height.unsigned_abs().into()))
}

pub(crate) fn register(registry: &Registry) {
    registry.register_format(b"BM", decode_bmp_meta);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Unstoppable;

    fn bmp(dib: &[u8]) -> std::vec::Vec<u8> {
        let mut data = b"BM".to_vec();
        data.extend_from_slice(&(14 + dib.len() as u32).to_le_bytes());
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(&(14 + dib.len() as u32).to_le_bytes());
        data.extend_from_slice(dib);
        data
    }

    #[test]
    fn core_header_top_down() {
        let mut dib = CORE_HEADER_SIZE.to_le_bytes().to_vec();
        dib.extend_from_slice(&50u16.to_le_bytes());
        dib.extend_from_slice(&(-50i16).to_le_bytes());
        dib.extend_from_slice(&[1, 0, 24, 0]);
        let meta = decode_bmp_meta(&mut &bmp(&dib)[..], &Unstoppable).unwrap();
        assert_eq!(meta, Meta::new(ImageType::Bmp, 50, 50));
    }

    #[test]
    fn info_header() {
        let mut dib = INFO_HEADER_SIZE.to_le_bytes().to_vec();
        dib.extend_from_slice(&1024i32.to_le_bytes());
        dib.extend_from_slice(&(-768i32).to_le_bytes());
        dib.resize(40, 0);
        let meta = decode_bmp_meta(&mut &bmp(&dib)[..], &Unstoppable).unwrap();
        assert_eq!(meta, Meta::new(ImageType::Bmp, 1024, 768));
    }

    #[test]
    fn negative_width() {
        let mut dib = 124u32.to_le_bytes().to_vec();
        dib.extend_from_slice(&(-1i32).to_le_bytes());
        dib.extend_from_slice(&1i32.to_le_bytes());
        assert!(matches!(
            decode_bmp_meta(&mut &bmp(&dib)[..], &Unstoppable),
            Err(Error::Format(ImageType::Bmp, "negative width"))
        ));
    }

    #[test]
    fn tiny_dib() {
        let dib = 8u32.to_le_bytes();
        assert!(matches!(
            decode_bmp_meta(&mut &bmp(&dib)[..], &Unstoppable),
            Err(Error::Format(ImageType::Bmp, _))
        ));
    }
}
