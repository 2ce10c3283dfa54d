// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SVG detection by root element.
//!
//! SVG is text, so it has no magic number to speak of. A document counts as
//! SVG when the first element after the prolog (XML declaration, processing
//! instructions, comments, doctype) is named `svg`, with or without a
//! namespace prefix. Geometry is never parsed; the reported size is 1×1.

use crate::registry::Registry;
use crate::{Error, ImageType, Meta, Result};
use enough::Stop;
use log::debug;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::io::Read;

/// Look-ahead of the registered decoders, independent of
/// [`DecodeConfig::svg_sniff_limit`](crate::DecodeConfig::svg_sniff_limit).
const SNIFF_LIMIT: usize = 32 * 1024;

/// Whether `data` starts (after the XML prolog) with an `<svg>` root element.
///
/// Truncated input that ends before the root element is not SVG.
pub fn is_svg(data: &[u8]) -> bool {
    let mut reader = Reader::from_reader(data);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => return e.local_name().as_ref() == b"svg",
            Ok(Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_)) => {},
            Ok(Event::Text(t)) if t.iter().all(u8::is_ascii_whitespace) => {},
            Ok(_) => return false,
            Err(e) => {
                debug!("svg sniff: {e}");
                return false;
            },
        }
    }
}

/// Reads at most 32 KiB and checks the root element.
pub fn decode_svg_meta(src: &mut dyn Read, _stop: &dyn Stop) -> Result<Meta> {
    let mut head = std::vec::Vec::new();
    head.try_reserve_exact(SNIFF_LIMIT)?;
    Read::take(&mut *src, SNIFF_LIMIT as u64).read_to_end(&mut head)?;
    if !is_svg(&head) {
        return Err(Error::Format(ImageType::Svg, "root element is not svg"));
    }
    Ok(Meta::new(ImageType::Svg, 1, 1))
}

pub(crate) fn register(registry: &Registry) {
    registry.register_format(b"<?xml ", decode_svg_meta);
    registry.register_format(b"<svg", decode_svg_meta);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Unstoppable;

    #[test]
    fn plain_and_prefixed() {
        assert!(is_svg(br#"<svg xmlns="http://www.w3.org/2000/svg"></svg>"#));
        assert!(is_svg(br#"<svg:svg xmlns:svg="http://www.w3.org/2000/svg"></svg:svg>"#));
        assert!(is_svg(b"<svg>"));
        assert!(is_svg(br#"<svg xmlns="http://www.w3.org/2000/svg">SomethingSomething..."#));
    }

    #[test]
    fn prolog() {
        let doc = b"\xef\xbb\xbf \r\n<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
            <!-- Generator: some editor -->\n\
            <!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.1//EN\" \"http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd\" [\n\
              <!ENTITY ns \"http://www.w3.org/2000/svg\">\n\
            ]>\n\
            <svg width=\"10\"/>";
        assert!(is_svg(doc));
    }

    #[test]
    fn not_svg() {
        assert!(!is_svg(b"<html><body>Not an SVG</body></html>"));
        assert!(!is_svg(br#"<?xml version="1.0" encoding="UTF-8"?><not-svg></not-svg>"#));
        assert!(!is_svg(b"<!-- Only comments -->"));
        assert!(!is_svg(b"<!-- unterminated <svg>"));
        assert!(!is_svg(b"text <svg>"));
        assert!(!is_svg(&[0x42, 0x4d, 0x3c, 0x3f, 0x78, 0x6d, 0x6c, 0x20]));
        assert!(!is_svg(b"<svgz>"));
        assert!(!is_svg(b""));
    }

    #[test]
    fn registered_decoder_checks_root() {
        let meta = decode_svg_meta(&mut &b"<?xml version=\"1.0\"?><svg/>"[..], &Unstoppable).unwrap();
        assert_eq!(meta, Meta::new(ImageType::Svg, 1, 1));

        assert!(matches!(
            decode_svg_meta(&mut &b"<?xml version=\"1.0\"?><rss/>"[..], &Unstoppable),
            Err(Error::Format(ImageType::Svg, _))
        ));
    }
}
