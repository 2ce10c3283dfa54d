// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ISO base media file format box primitives, shared by the HEIF and
//! JPEG XL container parsers.

use crate::boxes::{BoxType, FourCC};
use crate::{Error, ImageType, Result, be_u32, be_u64, skip};
use log::debug;
use std::io::{Read, Take};

/// Basic ISO box structure.
///
/// Files are a sequence of possibly-nested 'box' structures.  Each box
/// begins with a header describing the length of the box's data and a
/// four-byte box type which identifies the type of the box. Together these
/// are enough to interpret the contents of that section of the file.
///
/// See ISO 14496-12:2015 § 4.2
#[derive(Debug, Clone, Copy)]
pub(crate) struct BoxHeader {
    /// Box type.
    pub name: BoxType,
    /// Size of the box in bytes.
    pub size: u64,
    /// Offset to the start of the contained data (or header size).
    pub offset: u64,
}

impl BoxHeader {
    /// 4-byte size + 4-byte type
    pub const MIN_SIZE: u64 = 8;
    /// 4-byte size + 4-byte type + 16-byte size
    pub const MIN_LARGE_SIZE: u64 = 16;

    /// Bytes following the header. Huge for a box running to the end of the file.
    pub fn payload_size(&self) -> u64 {
        self.size - self.offset
    }

    pub fn extends_to_eof(&self) -> bool {
        self.size == u64::MAX
    }
}

/// See ISO 14496-12:2015 § 4.2
pub(crate) struct BMFFBox<'a, T: ?Sized> {
    pub head: BoxHeader,
    pub content: Take<&'a mut T>,
}

impl<T: Read + ?Sized> Read for BMFFBox<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.content.read(buf)
    }
}

impl<T: Read + ?Sized> BMFFBox<'_, T> {
    pub fn bytes_left(&self) -> u64 {
        self.content.limit()
    }
}

impl<T: ?Sized> Drop for BMFFBox<'_, T> {
    fn drop(&mut self) {
        if self.content.limit() > 0 && !self.head.extends_to_eof() {
            let name: FourCC = From::from(self.head.name);
            debug!("Dropping {} bytes in '{}'", self.content.limit(), name);
        }
    }
}

pub(crate) struct BoxIter<'a, T: ?Sized> {
    src: &'a mut T,
    format: ImageType,
}

impl<T: Read + ?Sized> BoxIter<'_, T> {
    /// `format` names the container in errors about malformed headers.
    pub fn new(src: &mut T, format: ImageType) -> BoxIter<'_, T> {
        BoxIter { src, format }
    }

    /// Next box header, or `None` once the stream (or enclosing box) runs out.
    pub fn next_box(&mut self) -> Result<Option<BMFFBox<'_, T>>> {
        let r = read_box_header(self.src, self.format);
        match r {
            Ok(h) => Ok(Some(BMFFBox {
                head: h,
                content: Read::take(&mut *self.src, h.payload_size()),
            })),
            Err(Error::UnexpectedEOF) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Read and parse a box header.
///
/// Call this first to determine the type of a particular box
/// and its length. Used internally for dispatching to specific
/// parsers for the internal content, or to get the length to
/// skip unknown or uninteresting boxes.
///
/// See ISO 14496-12:2015 § 4.2
pub(crate) fn read_box_header<T: Read + ?Sized>(src: &mut T, format: ImageType) -> Result<BoxHeader> {
    let size32 = be_u32(src)?;
    let name = BoxType::from(be_u32(src)?);
    let size = match size32 {
        // Valid only for the last top-level box, which then extends to EOF.
        0 => u64::MAX,
        1 => {
            let size64 = be_u64(src)?;
            if size64 < BoxHeader::MIN_LARGE_SIZE {
                return Err(Error::Format(format, "malformed wide box size"));
            }
            size64
        },
        _ => {
            if u64::from(size32) < BoxHeader::MIN_SIZE {
                return Err(Error::Format(format, "malformed box size"));
            }
            u64::from(size32)
        },
    };
    let offset = match size32 {
        1 => BoxHeader::MIN_LARGE_SIZE,
        _ => BoxHeader::MIN_SIZE,
    };
    Ok(BoxHeader { name, size, offset })
}

/// Skip over the remaining data of a box.
pub(crate) fn skip_box_remain<T: Read + ?Sized>(src: &mut BMFFBox<'_, T>) -> Result<()> {
    let len = src.bytes_left();
    if len == 0 {
        return Ok(());
    }
    debug!("remain {len} (skipped) in {:?}", src.head);
    if src.head.extends_to_eof() {
        std::io::copy(&mut src.content, &mut std::io::sink())?;
        return Ok(());
    }
    skip(src, len)
}

#[test]
fn box_header_sizes() {
    let mut src = &b"\x00\x00\x00\x10ftypheic\x00\x00\x00\x00"[..];
    let h = read_box_header(&mut src, ImageType::Heic).unwrap();
    assert_eq!(h.name, BoxType::FileTypeBox);
    assert_eq!(h.payload_size(), 8);

    let mut src = &b"\x00\x00\x00\x01mdat\x00\x00\x00\x00\x00\x00\x00\x20"[..];
    let h = read_box_header(&mut src, ImageType::Heic).unwrap();
    assert_eq!(h.name, BoxType::MediaDataBox);
    assert_eq!(h.offset, 16);
    assert_eq!(h.payload_size(), 16);

    let mut src = &b"\x00\x00\x00\x04meta"[..];
    assert!(matches!(
        read_box_header(&mut src, ImageType::Heic),
        Err(Error::Format(ImageType::Heic, _))
    ));
}

#[test]
fn iter_stops_at_end_of_parent() {
    let data = b"\x00\x00\x00\x0cfree\x01\x02\x03\x04\x00\x00\x00\x08skip";
    let mut src = &data[..];
    let mut iter = BoxIter::new(&mut src, ImageType::Jxl);
    let mut names = std::vec::Vec::new();
    while let Some(mut b) = iter.next_box().unwrap() {
        names.push(FourCC::from(b.head.name).value);
        skip_box_remain(&mut b).unwrap();
    }
    assert_eq!(names, [*b"free", *b"skip"]);
}
