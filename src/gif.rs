// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::registry::Registry;
use crate::{Error, ImageType, Meta, Result, read_array};
use enough::Stop;
use std::io::Read;

/// Logical screen size from the GIF header. Both `87a` and `89a` are accepted.
pub fn decode_gif_meta(src: &mut dyn Read, _stop: &dyn Stop) -> Result<Meta> {
    let header = read_array::<10, _>(src)?;
    if &header[..4] != b"GIF8" || !matches!(header[4], b'7' | b'9') || header[5] != b'a' {
        return Err(Error::Format(ImageType::Gif, "invalid signature"));
    }
    let width = u16::from_le_bytes([header[6], header[7]]);
    let height = u16::from_le_bytes([header[8], header[9]]);
    Ok(Meta::new(ImageType::Gif, width.into(), height.into()))
}

pub(crate) fn register(registry: &Registry) {
    registry.register_format(b"GIF8?a", decode_gif_meta);
}

#[test]
fn screen_size() {
    let data = b"GIF89a\x20\x03\x58\x02\xf7\0\0";
    let meta = decode_gif_meta(&mut &data[..], &crate::Unstoppable).unwrap();
    assert_eq!(meta, Meta::new(ImageType::Gif, 800, 600));
}

#[test]
fn unknown_version() {
    let data = b"GIF88a\x01\0\x01\0";
    assert!(matches!(
        decode_gif_meta(&mut &data[..], &crate::Unstoppable),
        Err(Error::Format(ImageType::Gif, _))
    ));
}
