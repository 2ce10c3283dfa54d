// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::registry::Registry;
use crate::{Error, ImageType, Meta, Result, read_array};
use enough::Stop;
use std::io::Read;

const SIGNATURE: &[u8; 5] = b"%PDF-";

/// Checks the `%PDF-x.y` header. Pages have no container-level size, so the
/// result is always 1×1.
pub fn decode_pdf_meta(src: &mut dyn Read, _stop: &dyn Stop) -> Result<Meta> {
    let header = read_array::<8, _>(src)?;
    if !header.starts_with(SIGNATURE) {
        return Err(Error::Format(ImageType::Pdf, "invalid signature"));
    }
    Ok(Meta::new(ImageType::Pdf, 1, 1))
}

pub(crate) fn register(registry: &Registry) {
    registry.register_format(SIGNATURE, decode_pdf_meta);
}

#[test]
fn placeholder_size() {
    let data = b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n";
    let meta = decode_pdf_meta(&mut &data[..], &crate::Unstoppable).unwrap();
    assert_eq!(meta, Meta::new(ImageType::Pdf, 1, 1));

    assert!(matches!(
        decode_pdf_meta(&mut &b"%PDF-1"[..], &crate::Unstoppable),
        Err(Error::UnexpectedEOF)
    ));
}
