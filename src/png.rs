// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::registry::Registry;
use crate::{Error, ImageType, Meta, Result, read_array};
use enough::Stop;
use std::io::Read;

const SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// PNG requires IHDR to be the first chunk, so the dimensions sit at a
/// fixed position right after the signature.
pub fn decode_png_meta(src: &mut dyn Read, _stop: &dyn Stop) -> Result<Meta> {
    let header = read_array::<24, _>(src)?;
    if header[..8] != SIGNATURE[..] {
        return Err(Error::Format(ImageType::Png, "invalid signature"));
    }
    let width = u32::from_be_bytes([header[16], header[17], header[18], header[19]]);
    let height = u32::from_be_bytes([header[20], header[21], header[22], header[23]]);
    Ok(Meta::new(ImageType::Png, width, height))
}

pub(crate) fn register(registry: &Registry) {
    registry.register_format(SIGNATURE, decode_png_meta);
}
