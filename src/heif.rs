// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HEIC, HEIF and AVIF dimensions.
//!
//! The box tree is walked until the `meta` box is done: `ftyp` must carry an
//! accepted brand, `iprp`/`ipco` are descended into and every `ispe` found on
//! the way competes for the reported size. Image data (`mdat`) showing up
//! before the metadata is an error.
//!
//! See ISO/IEC 23008-12:2017 and ISO 14496-12:2015

use crate::bmff::{BMFFBox, BoxIter, skip_box_remain};
use crate::boxes::{BoxType, FourCC};
use crate::registry::Registry;
use crate::{Error, ImageType, Meta, Result, TryVec, be_u32, read_array, skip};
use enough::Stop;
use log::debug;
use std::io::Read;

/// Nested containers deeper than this are rejected.
const MAX_BOX_DEPTH: usize = 16;

const PICT_HANDLER: &[u8; 4] = b"pict";

/// The `ftyp` brands a walk accepts, and what each of them means.
struct Brands {
    accepted: &'static [(&'static [u8; 4], ImageType)],
    /// Format reported regardless of which accepted brand matched.
    fixed: Option<ImageType>,
    mismatch: &'static str,
}

static HEIC_BRANDS: Brands = Brands {
    accepted: &[(b"heic", ImageType::Heic)],
    fixed: Some(ImageType::Heic),
    mismatch: "image is not compatible with heic",
};

static HEIF_BRANDS: Brands = Brands {
    accepted: &[
        (b"heic", ImageType::Heic),
        (b"heix", ImageType::Heic),
        (b"avif", ImageType::Avif),
    ],
    fixed: None,
    mismatch: "image is not compatible with heic/avif",
};

/// Dimensions collected so far.
#[derive(Debug, Default)]
struct HeifData {
    format: Option<ImageType>,
    /// Every `ispe` in file order; `irot` applies to the latest one.
    extents: TryVec<(u32, u32)>,
}

impl HeifData {
    fn is_filled(&self) -> bool {
        let (width, height) = self.largest();
        self.format.is_some() && width > 0 && height > 0
    }

    fn add_extents(&mut self, width: u32, height: u32) -> Result<()> {
        self.extents.push((width, height))?;
        Ok(())
    }

    /// Rotation by 90° or 270° swaps the most recent extents.
    fn rotate_last(&mut self, angle: u8) {
        if let (1 | 3, Some(last)) = (angle & 3, self.extents.last_mut()) {
            *last = (last.1, last.0);
        }
    }

    /// A file may carry several images (thumbnails, tiles); report the largest.
    fn largest(&self) -> (u32, u32) {
        self.extents.iter().fold((0, 0), |best, &(width, height)| {
            if width > best.0 || height > best.1 { (width, height) } else { best }
        })
    }
}

struct Walker<'a> {
    brands: &'a Brands,
    stop: &'a dyn Stop,
    data: HeifData,
}

impl Walker<'_> {
    fn error_format(&self) -> ImageType {
        self.data.format.unwrap_or(ImageType::Heic)
    }

    fn read_boxes(&mut self, src: &mut dyn Read, depth: usize) -> Result<()> {
        if depth > MAX_BOX_DEPTH {
            return Err(Error::Format(self.error_format(), "boxes are nested too deeply"));
        }

        let mut iter = BoxIter::new(src, self.error_format());
        while let Some(mut b) = iter.next_box()? {
            self.stop.check()?;

            match b.head.name {
                BoxType::FileTypeBox => self.read_ftyp(&mut b)?,
                BoxType::MetadataBox => return self.read_meta(&mut b, depth),
                BoxType::HandlerBox => {
                    // A bad handler ends this level quietly; the caller decides
                    // whether enough was found.
                    if let Err(e) = read_hdlr(&mut b, self.error_format()) {
                        debug!("hdlr: {e} (ignored)");
                        return Ok(());
                    }
                },
                BoxType::ImagePropertiesBox | BoxType::ItemPropertyContainerBox => {
                    self.read_children(&mut b, depth)?;
                },
                BoxType::ImageSpatialExtentsBox => {
                    let (width, height) = read_ispe(&mut b, self.error_format())?;
                    debug!("ispe {width}x{height}");
                    self.data.add_extents(width, height)?;
                },
                BoxType::ImageRotationBox => {
                    let angle = read_irot(&mut b, self.error_format())?;
                    debug!("irot {angle}");
                    self.data.rotate_last(angle);
                },
                BoxType::MediaDataBox => {
                    return Err(Error::Format(self.error_format(), "mdat box occurred before meta box"));
                },
                _ => {},
            }

            skip_box_remain(&mut b)?;
        }
        Ok(())
    }

    /// Walk a container's children. Running out of data inside the
    /// container ends the walk without an error.
    fn read_children(&mut self, src: &mut dyn Read, depth: usize) -> Result<()> {
        match self.read_boxes(src, depth + 1) {
            Err(Error::UnexpectedEOF) => {
                debug!("truncated container at depth {depth}");
                Ok(())
            },
            r => r,
        }
    }

    /// Parse an ftyp box.
    /// See ISO 14496-12:2015 § 4.3
    fn read_ftyp<T: Read + ?Sized>(&mut self, src: &mut BMFFBox<'_, T>) -> Result<()> {
        if src.head.payload_size() < 8 {
            return Err(Error::Format(self.error_format(), "invalid ftyp data"));
        }

        let major_brand = read_array::<4, _>(src)?;
        if self.assign_format(&major_brand) {
            return Ok(());
        }

        let _minor_version = be_u32(src)?;
        while src.bytes_left() >= 4 {
            let brand = read_array::<4, _>(src)?;
            if self.assign_format(&brand) {
                return Ok(());
            }
        }

        debug!("ftyp major brand {:?} not accepted", FourCC::from(major_brand));
        Err(Error::Format(self.error_format(), self.brands.mismatch))
    }

    fn assign_format(&mut self, brand: &[u8; 4]) -> bool {
        let found = self.brands.accepted.iter().find(|(accepted, _)| *accepted == brand);
        match found {
            Some(&(_, format)) => {
                self.data.format = Some(self.brands.fixed.unwrap_or(format));
                true
            },
            None => false,
        }
    }

    /// Parse a metadata box. The walk of the enclosing level ends here.
    /// See ISO 14496-12:2015 § 8.11.1
    fn read_meta<T: Read + ?Sized>(&mut self, src: &mut BMFFBox<'_, T>, depth: usize) -> Result<()> {
        if src.head.payload_size() < 4 {
            return Err(Error::Format(self.error_format(), "invalid meta data"));
        }

        // version and flags
        skip(src, 4)?;

        if src.bytes_left() > 0 {
            self.read_children(src, depth)?;
        }

        if !self.data.is_filled() {
            return Err(Error::Format(self.error_format(), "dimensions data wasn't found in meta box"));
        }
        Ok(())
    }
}

/// Handler reference box; only picture handlers are images.
/// See ISO 14496-12:2015 § 8.4.3
fn read_hdlr<T: Read + ?Sized>(src: &mut BMFFBox<'_, T>, format: ImageType) -> Result<()> {
    if src.head.payload_size() < 12 {
        return Err(Error::Format(format, "invalid hdlr data"));
    }

    let data = read_array::<12, _>(src)?;
    let handler_type = [data[8], data[9], data[10], data[11]];
    if &handler_type != PICT_HANDLER {
        debug!("hdlr: expected 'pict', actual {:?}", FourCC::from(handler_type));
        return Err(Error::Format(format, "invalid handler, expected pict"));
    }
    Ok(())
}

/// Parse an Image Spatial Extents property box
/// See ISO/IEC 23008-12:2017 § 6.5.3
fn read_ispe<T: Read + ?Sized>(src: &mut BMFFBox<'_, T>, format: ImageType) -> Result<(u32, u32)> {
    if src.head.payload_size() < 12 {
        return Err(Error::Format(format, "invalid ispe data"));
    }

    let _version_and_flags = be_u32(src)?;
    let width = be_u32(src)?;
    let height = be_u32(src)?;
    Ok((width, height))
}

/// Parse an Image Rotation property box; returns the anticlockwise angle in
/// quarter turns.
/// See ISO/IEC 23008-12:2017 § 6.5.10
fn read_irot<T: Read + ?Sized>(src: &mut BMFFBox<'_, T>, format: ImageType) -> Result<u8> {
    if src.head.payload_size() < 1 {
        return Err(Error::Format(format, "invalid irot data"));
    }
    let [angle] = read_array::<1, _>(src)?;
    Ok(angle & 3)
}

fn decode(src: &mut dyn Read, brands: &Brands, stop: &dyn Stop) -> Result<Meta> {
    let mut walker = Walker {
        brands,
        stop,
        data: HeifData {
            format: brands.fixed,
            ..HeifData::default()
        },
    };

    match walker.read_boxes(src, 0) {
        Ok(()) => {},
        Err(e @ Error::Stopped(_)) => return Err(e),
        Err(e) if walker.data.is_filled() => debug!("heif: {e} after dimensions were found (ignored)"),
        Err(Error::UnexpectedEOF) => debug!("heif: data ended before dimensions were found"),
        Err(e) => return Err(e),
    }

    let data = walker.data;
    let (width, height) = data.largest();
    match data.format {
        Some(format) if data.is_filled() => Ok(Meta::new(format, width, height)),
        _ => Err(Error::Format(data.format.unwrap_or(ImageType::Heic), "dimensions data wasn't found")),
    }
}

/// Read dimensions of a HEIC image. Only the `heic` brand is accepted and
/// the format is always reported as [`ImageType::Heic`].
pub fn decode_heic_meta(src: &mut dyn Read, stop: &dyn Stop) -> Result<Meta> {
    decode(src, &HEIC_BRANDS, stop)
}

/// Read dimensions of a HEIC or AVIF image; the `ftyp` brand decides which.
pub fn decode_heif_meta(src: &mut dyn Read, stop: &dyn Stop) -> Result<Meta> {
    decode(src, &HEIF_BRANDS, stop)
}

pub(crate) fn register(registry: &Registry) {
    let magics: [&'static [u8]; 9] = [
        b"????ftypheic",
        b"????ftypheix",
        b"????ftyphevc",
        b"????ftypheim",
        b"????ftypheis",
        b"????ftyphevm",
        b"????ftyphevs",
        b"????ftypmif1",
        b"????ftypavif",
    ];
    for magic in magics {
        registry.register_format(magic, decode_heif_meta);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::Unstoppable;

    pub(crate) fn bmff_box(name: &[u8; 4], payload: &[u8]) -> std::vec::Vec<u8> {
        let mut out = std::vec::Vec::new();
        out.extend_from_slice(&(8 + payload.len() as u32).to_be_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(payload);
        out
    }

    pub(crate) fn ispe(width: u32, height: u32) -> std::vec::Vec<u8> {
        let mut payload = vec![0u8; 4];
        payload.extend_from_slice(&width.to_be_bytes());
        payload.extend_from_slice(&height.to_be_bytes());
        bmff_box(b"ispe", &payload)
    }

    fn ftyp(major: &[u8; 4], compatible: &[&[u8; 4]]) -> std::vec::Vec<u8> {
        let mut payload = major.to_vec();
        payload.extend_from_slice(&[0, 0, 0, 0]);
        for brand in compatible {
            payload.extend_from_slice(&brand[..]);
        }
        bmff_box(b"ftyp", &payload)
    }

    fn meta(children: &[u8]) -> std::vec::Vec<u8> {
        let mut payload = vec![0u8; 4];
        payload.extend_from_slice(children);
        bmff_box(b"meta", &payload)
    }

    fn hdlr(handler: &[u8; 4]) -> std::vec::Vec<u8> {
        let mut payload = vec![0u8; 8];
        payload.extend_from_slice(handler);
        payload.extend_from_slice(&[0; 13]);
        bmff_box(b"hdlr", &payload)
    }

    fn heif(major: &[u8; 4], compatible: &[&[u8; 4]], meta_children: &[u8]) -> std::vec::Vec<u8> {
        let mut out = ftyp(major, compatible);
        out.extend(meta(meta_children));
        out
    }

    #[test]
    fn picks_largest_ispe() {
        let mut ipco = ispe(640, 480);
        ipco.extend(bmff_box(b"pixi", &[0, 0, 0, 0, 1, 8]));
        ipco.extend(ispe(4032, 3024));
        let mut children = hdlr(b"pict");
        children.extend(bmff_box(b"iprp", &bmff_box(b"ipco", &ipco)));
        let data = heif(b"heic", &[b"mif1"], &children);

        let meta = decode_heif_meta(&mut &data[..], &Unstoppable).unwrap();
        assert_eq!(meta, Meta::new(ImageType::Heic, 4032, 3024));
    }

    #[test]
    fn avif_brand_in_compatible_list() {
        let children = bmff_box(b"iprp", &bmff_box(b"ipco", &ispe(100, 50)));
        let data = heif(b"mif1", &[b"miaf", b"avif"], &children);

        let meta = decode_heif_meta(&mut &data[..], &Unstoppable).unwrap();
        assert_eq!(meta, Meta::new(ImageType::Avif, 100, 50));

        // The HEIC-only walker doesn't know avif.
        assert!(matches!(
            decode_heic_meta(&mut &data[..], &Unstoppable),
            Err(Error::Format(ImageType::Heic, "image is not compatible with heic"))
        ));
    }

    #[test]
    fn rotation_swaps_latest_extents() {
        let mut ipco = ispe(4032, 3024);
        ipco.extend(bmff_box(b"irot", &[1]));
        let data = heif(b"heic", &[], &bmff_box(b"iprp", &bmff_box(b"ipco", &ipco)));
        let meta = decode_heif_meta(&mut &data[..], &Unstoppable).unwrap();
        assert_eq!(meta, Meta::new(ImageType::Heic, 3024, 4032));

        // 180° leaves the size alone; only the last ispe turns.
        let mut ipco = ispe(4032, 3024);
        ipco.extend(bmff_box(b"irot", &[2]));
        ipco.extend(ispe(160, 120));
        ipco.extend(bmff_box(b"irot", &[3]));
        let data = heif(b"avif", &[], &bmff_box(b"iprp", &bmff_box(b"ipco", &ipco)));
        let meta = decode_heif_meta(&mut &data[..], &Unstoppable).unwrap();
        assert_eq!(meta, Meta::new(ImageType::Avif, 4032, 3024));

        // Reserved bits are ignored; irot before any ispe does nothing.
        let mut ipco = bmff_box(b"irot", &[1]);
        ipco.extend(ispe(200, 100));
        ipco.extend(bmff_box(b"irot", &[0xfd]));
        let data = heif(b"heic", &[], &bmff_box(b"iprp", &bmff_box(b"ipco", &ipco)));
        let meta = decode_heif_meta(&mut &data[..], &Unstoppable).unwrap();
        assert_eq!(meta, Meta::new(ImageType::Heic, 100, 200));
    }

    #[test]
    fn mdat_before_meta() {
        let mut data = ftyp(b"heic", &[]);
        data.extend(bmff_box(b"mdat", &[1, 2, 3, 4]));
        data.extend(meta(&bmff_box(b"iprp", &bmff_box(b"ipco", &ispe(1, 1)))));

        assert!(matches!(
            decode_heif_meta(&mut &data[..], &Unstoppable),
            Err(Error::Format(_, "mdat box occurred before meta box"))
        ));
    }

    #[test]
    fn wrong_handler_is_not_fatal_by_itself() {
        // hdlr ends the walk of the meta level, so the ispe after it is never seen.
        let mut children = hdlr(b"vide");
        children.extend(bmff_box(b"iprp", &bmff_box(b"ipco", &ispe(10, 10))));
        let data = heif(b"heic", &[], &children);
        assert!(matches!(
            decode_heif_meta(&mut &data[..], &Unstoppable),
            Err(Error::Format(ImageType::Heic, "dimensions data wasn't found in meta box"))
        ));

        // With the properties first, the bad handler is harmless.
        let mut children = bmff_box(b"iprp", &bmff_box(b"ipco", &ispe(10, 10)));
        children.extend(hdlr(b"vide"));
        let data = heif(b"heic", &[], &children);
        let meta = decode_heif_meta(&mut &data[..], &Unstoppable).unwrap();
        assert_eq!((meta.width, meta.height), (10, 10));
    }

    #[test]
    fn truncated_before_meta_is_a_format_error() {
        let mut data = heif(b"heic", &[], &bmff_box(b"iprp", &bmff_box(b"ipco", &ispe(10, 10))));
        data.truncate(30);
        assert!(matches!(
            decode_heif_meta(&mut &data[..], &Unstoppable),
            Err(Error::Format(..))
        ));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut inner = ispe(5, 5);
        for _ in 0..40 {
            inner = bmff_box(b"ipco", &inner);
        }
        let data = heif(b"heic", &[], &inner);
        assert!(matches!(
            decode_heif_meta(&mut &data[..], &Unstoppable),
            Err(Error::Format(_, "boxes are nested too deeply"))
        ));
    }

    #[test]
    fn short_ftyp() {
        let data = bmff_box(b"ftyp", b"heic");
        assert!(matches!(
            decode_heif_meta(&mut &data[..], &Unstoppable),
            Err(Error::Format(_, "invalid ftyp data"))
        ));
    }
}
