// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Windows icons: a directory of embedded PNG or headerless BMP images.
//!
//! [`decode_ico_meta`] picks the best entry from the directory;
//! [`resolve_ico`] goes on to sniff that entry's bytes so the caller can hand
//! them to a decoder.

use crate::registry::{Registry, registry};
use crate::{
    DecodeConfig, Error, ImageType, Meta, Result, ToU64, ToUsize, Unstoppable, le_u16, le_u32, read_array,
};
use enough::Stop;
use log::{debug, warn};
use std::borrow::Cow;
use std::io::Read;

/// `ICONDIR`
const DIR_HEADER_SIZE: usize = 6;
/// `ICONDIRENTRY`
const DIR_ENTRY_SIZE: usize = 16;
const BMP_FILE_HEADER_SIZE: usize = 14;
const BMP_INFO_HEADER_SIZE: usize = 40;

fn format_error(msg: &'static str) -> Error {
    Error::Format(ImageType::Ico, msg)
}

/// Dimensions of the chosen image plus where its bytes are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcoMeta {
    pub meta: Meta,
    /// Offset of the image data from the start of the file.
    pub offset: u32,
    /// Length of the image data.
    pub size: u32,
}

/// One directory entry. A stored size of 0 means 256.
struct DirEntry {
    width: u8,
    height: u8,
    size: u32,
    offset: u32,
}

impl DirEntry {
    fn parse(e: [u8; DIR_ENTRY_SIZE]) -> Self {
        Self {
            width: e[0],
            height: e[1],
            size: u32::from_le_bytes([e[8], e[9], e[10], e[11]]),
            offset: u32::from_le_bytes([e[12], e[13], e[14], e[15]]),
        }
    }

    fn width(&self) -> u32 {
        dimension(self.width)
    }

    fn height(&self) -> u32 {
        dimension(self.height)
    }

    fn is_max_size(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn is_better_than(&self, best: &Self) -> bool {
        self.width() > best.width() || self.height() > best.height() || self.is_max_size()
    }
}

fn dimension(stored: u8) -> u32 {
    match stored {
        0 => 256,
        n => n.into(),
    }
}

/// Read the icon directory and choose the largest image in it.
///
/// The whole directory is scanned; among several 256-pixel entries the last
/// one wins.
pub fn decode_ico_meta(src: &mut dyn Read, stop: &dyn Stop) -> Result<IcoMeta> {
    let header = read_array::<DIR_HEADER_SIZE, _>(src)?;
    if header[..4] != [0, 0, 1, 0] {
        return Err(format_error("invalid directory header"));
    }
    let count = u16::from_le_bytes([header[4], header[5]]);

    let mut best: Option<DirEntry> = None;
    for _ in 0..count {
        stop.check()?;
        let entry = DirEntry::parse(read_array::<DIR_ENTRY_SIZE, _>(src)?);
        if best.as_ref().is_none_or(|best| entry.is_better_than(best)) {
            best = Some(entry);
        }
    }

    let best = best.ok_or_else(|| format_error("empty directory"))?;
    debug!("best entry: {}x{}, {} bytes at {}", best.width(), best.height(), best.size, best.offset);
    Ok(IcoMeta {
        meta: Meta::new(ImageType::Ico, best.width(), best.height()),
        offset: best.offset,
        size: best.size,
    })
}

fn decode_ico(src: &mut dyn Read, stop: &dyn Stop) -> Result<Meta> {
    decode_ico_meta(src, stop).map(|ico| ico.meta)
}

pub(crate) fn register(registry: &Registry) {
    registry.register_format(b"\0\0\x01\0", decode_ico);
}

/// The image chosen from an icon, ready to be decoded on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage<'a> {
    /// Format and dimensions of the embedded image itself.
    pub meta: Meta,
    pub offset: usize,
    pub size: usize,
    /// Borrowed from the icon, unless a BMP header had to be rebuilt.
    pub data: Cow<'a, [u8]>,
}

/// Find the best image in an icon and identify it.
///
/// `can_load` tells whether the caller is able to decode a format; images it
/// can't handle, and icons nested in icons, are rejected with
/// [`Error::UnsupportedEmbedded`].
pub fn resolve_ico(data: &[u8], can_load: impl Fn(ImageType) -> bool) -> Result<EmbeddedImage<'_>> {
    resolve_ico_with_config(data, can_load, &DecodeConfig::default(), &Unstoppable)
}

/// [`resolve_ico`] with options and cooperative cancellation.
pub fn resolve_ico_with_config<'a>(
    data: &'a [u8],
    can_load: impl Fn(ImageType) -> bool,
    config: &DecodeConfig,
    stop: &dyn Stop,
) -> Result<EmbeddedImage<'a>> {
    let ico = decode_ico_meta(&mut &data[..], stop)?;
    let offset = ico.offset.to_usize();
    let size = ico.size.to_usize();
    let embedded = offset
        .checked_add(size)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| format_error("image data out of bounds"))?;

    let (meta, data) = match registry().decode_meta(&mut &embedded[..], config, stop) {
        Ok(meta) => (meta, Cow::Borrowed(embedded)),
        Err(e @ Error::Stopped(_)) => return Err(e),
        Err(e) if !is_headerless_bmp(embedded) => return Err(e),
        Err(e) => {
            warn!("embedded image not recognized ({e}), retrying as BMP without file header");
            config.reserve((embedded.len() + BMP_FILE_HEADER_SIZE).to_u64())?;
            let repaired = repair_bmp_header(embedded)?;
            let meta = crate::bmp::decode_bmp_meta(&mut &repaired[..], stop)?;
            (meta, Cow::Owned(repaired))
        },
    };

    if meta.format == ImageType::Ico || !can_load(meta.format) {
        return Err(Error::UnsupportedEmbedded(meta.format));
    }

    Ok(EmbeddedImage { meta, offset, size, data })
}

/// Header sizes of `BITMAPINFOHEADER` and its V2 to V5 extensions.
const DIB_HEADER_SIZES: [u32; 5] = [40, 52, 56, 108, 124];

/// Starts with a `BITMAPINFOHEADER` or one of its extensions, with one plane.
fn is_headerless_bmp(data: &[u8]) -> bool {
    if data.len() < BMP_INFO_HEADER_SIZE {
        return false;
    }
    let header_size = le_u32(&mut &data[..4]).is_ok_and(|size| DIB_HEADER_SIZES.contains(&size));
    let planes = le_u16(&mut &data[12..14]).is_ok_and(|planes| planes == 1);
    header_size && planes
}

/// Turn a bitmap as stored in an icon into a standalone BMP file.
///
/// Icons keep only the DIB part, and its height covers both the colour
/// bitmap and the 1-bit transparency mask below it. This prepends a file
/// header pointing past the palette and halves the height.
pub fn repair_bmp_header(dib: &[u8]) -> Result<std::vec::Vec<u8>> {
    let bmp_error = |msg| Error::Format(ImageType::Bmp, msg);
    if dib.len() < BMP_INFO_HEADER_SIZE {
        return Err(bmp_error("DIB header too short"));
    }

    let total = dib.len() + BMP_FILE_HEADER_SIZE;
    let file_size = u32::try_from(total).map_err(|_| bmp_error("image too large"))?;
    let bit_count = le_u16(&mut &dib[14..])?;
    let colors_used = le_u32(&mut &dib[32..])?;
    let height = le_u32(&mut &dib[8..])?;

    let palette_entries = if colors_used == 0 && bit_count <= 8 {
        1 << bit_count
    } else {
        colors_used
    };
    let pixel_offset = palette_entries
        .checked_mul(4)
        .and_then(|palette| palette.checked_add((BMP_FILE_HEADER_SIZE + BMP_INFO_HEADER_SIZE) as u32))
        .ok_or_else(|| bmp_error("palette too large"))?;

    let mut out = std::vec::Vec::new();
    out.try_reserve_exact(total)?;
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&file_size.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&pixel_offset.to_le_bytes());
    out.extend_from_slice(&dib[..8]);
    out.extend_from_slice(&(height / 2).to_le_bytes());
    out.extend_from_slice(&dib[12..]);
    Ok(out)
}
