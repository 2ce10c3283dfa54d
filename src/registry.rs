// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Magic-byte table and the dispatcher built on it.

use crate::peek::PeekReader;
use crate::{DecodeConfig, Error, ImageType, Meta, Result, svg};
use enough::Stop;
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::io::Read;
use std::sync::{Arc, LazyLock};

/// Wildcard byte in magic patterns; matches anything.
pub const WILDCARD: u8 = b'?';

/// Reads the metadata of one format. The stream is positioned at the
/// first byte of the file.
pub type DecodeMetaFn = fn(&mut dyn Read, &dyn Stop) -> Result<Meta>;

/// A magic pattern and the decoder it routes to.
#[derive(Clone, Copy)]
pub struct FormatEntry {
    pub magic: &'static [u8],
    pub decode: DecodeMetaFn,
}

impl FormatEntry {
    /// Non-wildcard bytes in the pattern.
    fn specificity(&self) -> usize {
        self.magic.iter().filter(|&&c| c != WILDCARD).count()
    }

    fn matches(&self, data: &[u8]) -> bool {
        data.len() == self.magic.len()
            && self.magic.iter().zip(data).all(|(&m, &b)| m == b || m == WILDCARD)
    }
}

impl std::fmt::Debug for FormatEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatEntry")
            .field("magic", &self.magic.escape_ascii().to_string())
            .finish()
    }
}

/// Ordered magic-byte table.
///
/// Lookups clone the current snapshot and never wait on a registration in
/// progress for longer than that clone. Registrations are serialized and
/// publish a complete new snapshot, so readers see either the old table or
/// the new one.
///
/// Entries are ordered by how many exact bytes their pattern has, most
/// first; among equals, earlier registrations win.
pub struct Registry {
    writer: Mutex<()>,
    snapshot: RwLock<Arc<[FormatEntry]>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// An empty table, without even the built-in formats.
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(()),
            snapshot: RwLock::new(Arc::from(std::vec::Vec::new())),
        }
    }

    /// A table with every format this crate knows about.
    pub fn with_builtin_formats() -> Self {
        let registry = Self::new();
        crate::jpeg::register(&registry);
        crate::jxl::register(&registry);
        crate::png::register(&registry);
        crate::webp::register(&registry);
        crate::gif::register(&registry);
        crate::ico::register(&registry);
        crate::heif::register(&registry);
        crate::bmp::register(&registry);
        crate::tiff::register(&registry);
        crate::pdf::register(&registry);
        crate::svg::register(&registry);
        registry
    }

    pub fn register_format(&self, magic: &'static [u8], decode: DecodeMetaFn) {
        let entry = FormatEntry { magic, decode };
        let _guard = self.writer.lock();

        let current = self.snapshot();
        let at = current.partition_point(|e| e.specificity() >= entry.specificity());
        let mut entries = std::vec::Vec::with_capacity(current.len() + 1);
        entries.extend_from_slice(&current[..at]);
        entries.push(entry);
        entries.extend_from_slice(&current[at..]);

        *self.snapshot.write() = Arc::from(entries);
    }

    /// The table as of now. Later registrations don't affect it.
    pub fn snapshot(&self) -> Arc<[FormatEntry]> {
        Arc::clone(&self.snapshot.read())
    }

    /// Detect the format of `src` and read its metadata.
    ///
    /// Only the matching decoder consumes bytes; matching itself looks ahead.
    pub fn decode_meta<T: Read>(&self, src: &mut T, config: &DecodeConfig, stop: &dyn Stop) -> Result<Meta> {
        let formats = self.snapshot();
        let mut reader = PeekReader::new(src);

        for format in formats.iter() {
            let data = reader.peek(format.magic.len())?;
            if format.matches(data) {
                debug!("matched {format:?}");
                return (format.decode)(&mut reader, stop);
            }
        }

        if svg::is_svg(reader.peek(config.svg_sniff_limit)?) {
            return Ok(Meta::new(ImageType::Svg, 1, 1));
        }

        Err(Error::UnknownFormat)
    }
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::with_builtin_formats);

/// The process-wide table used by [`decode_meta`](crate::decode_meta).
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Add a format to the process-wide table.
pub fn register_format(magic: &'static [u8], decode: DecodeMetaFn) {
    REGISTRY.register_format(magic, decode);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Unstoppable;

    fn fake(_: &mut dyn Read, _: &dyn Stop) -> Result<Meta> {
        Ok(Meta::new(ImageType::Pdf, 7, 7))
    }

    fn consumes_four(src: &mut dyn Read, _: &dyn Stop) -> Result<Meta> {
        let mut buf = [0u8; 4];
        src.read_exact(&mut buf)?;
        Ok(Meta::new(ImageType::Bmp, u32::from(buf[2]), u32::from(buf[3])))
    }

    #[test]
    fn wildcards() {
        let entry = FormatEntry { magic: b"GIF8?a", decode: fake };
        assert!(entry.matches(b"GIF89a"));
        assert!(entry.matches(b"GIF87a"));
        assert!(!entry.matches(b"GIF89b"));
        assert!(!entry.matches(b"GIF8"));
        assert_eq!(entry.specificity(), 5);
    }

    #[test]
    fn more_specific_patterns_win() {
        let registry = Registry::new();
        registry.register_format(b"AB??", consumes_four);
        registry.register_format(b"ABCD", fake);

        let meta = registry.decode_meta(&mut &b"ABCD"[..], &DecodeConfig::default(), &Unstoppable).unwrap();
        assert_eq!(meta.format, ImageType::Pdf);

        let meta = registry.decode_meta(&mut &b"ABxy"[..], &DecodeConfig::default(), &Unstoppable).unwrap();
        assert_eq!(meta, Meta::new(ImageType::Bmp, u32::from(b'x'), u32::from(b'y')));
    }

    #[test]
    fn equal_specificity_keeps_registration_order() {
        let registry = Registry::new();
        registry.register_format(b"AB", consumes_four);
        registry.register_format(b"AB", fake);
        assert_eq!(registry.snapshot().len(), 2);

        let meta = registry.decode_meta(&mut &b"AB\x05\x06"[..], &DecodeConfig::default(), &Unstoppable).unwrap();
        assert_eq!(meta, Meta::new(ImageType::Bmp, 5, 6));
    }

    #[test]
    fn decoder_sees_the_whole_stream() {
        let registry = Registry::new();
        registry.register_format(b"\x01\x02", consumes_four);
        let meta = registry
            .decode_meta(&mut &[1u8, 2, 30, 40][..], &DecodeConfig::default(), &Unstoppable)
            .unwrap();
        assert_eq!((meta.width, meta.height), (30, 40));
    }

    #[test]
    fn unknown_without_match() {
        let registry = Registry::new();
        assert!(matches!(
            registry.decode_meta(&mut &b"nothing here"[..], &DecodeConfig::default(), &Unstoppable),
            Err(Error::UnknownFormat)
        ));
    }

    #[test]
    fn snapshot_is_stable() {
        let registry = Registry::new();
        registry.register_format(b"A", fake);
        let before = registry.snapshot();
        registry.register_format(b"B", fake);
        assert_eq!(before.len(), 1);
        assert_eq!(registry.snapshot().len(), 2);
    }
}
