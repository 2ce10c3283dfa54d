#![deny(unsafe_code)]
//! Module for sniffing image containers and reading their dimensions.
//!
//! Given a byte stream, [`decode_meta`] finds out which container it is
//! (JPEG, PNG, GIF, BMP, TIFF, WebP, ICO, HEIC/HEIF/AVIF, JPEG XL, PDF or SVG)
//! and how large the image is, without touching pixel data. Only as much of
//! the stream is read as is needed to answer that.
//!
//! This crate is written entirely in safe Rust code.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use byteorder::ReadBytesExt;
use fallible_collections::TryReserveError;
use std::io::Read;

mod bits;
mod boxes;
mod bmff;
mod imagetype;
mod peek;
mod registry;
mod vp8;

pub mod bmp;
pub mod gif;
pub mod heif;
pub mod ico;
pub mod jpeg;
pub mod jxl;
pub mod pdf;
pub mod png;
pub mod svg;
pub mod tiff;
pub mod webp;

pub use crate::ico::{EmbeddedImage, IcoMeta, repair_bmp_header, resolve_ico, resolve_ico_with_config};
pub use crate::imagetype::ImageType;
pub use crate::peek::PeekReader;
pub use crate::registry::{DecodeMetaFn, FormatEntry, Registry, register_format, registry};
pub use enough::{Stop, StopReason, Unstoppable};

/// A trait to indicate a type can be infallibly converted to `u64`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
pub(crate) trait ToU64 {
    fn to_u64(self) -> u64;
}

/// Statically verify that the platform `usize` can fit within a `u64`.
/// If the size won't fit on the given platform, this will fail at compile time, but if a type
/// which can fail `TryInto<usize>` is used, it may panic.
impl ToU64 for usize {
    fn to_u64(self) -> u64 {
        const _: () = assert!(std::mem::size_of::<usize>() <= std::mem::size_of::<u64>());
        self.try_into().ok().unwrap()
    }
}

/// A trait to indicate a type can be infallibly converted to `usize`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
pub(crate) trait ToUsize {
    fn to_usize(self) -> usize;
}

macro_rules! impl_to_usize_from {
    ( $from_type:ty ) => {
        impl ToUsize for $from_type {
            fn to_usize(self) -> usize {
                const _: () = assert!(std::mem::size_of::<$from_type>() <= std::mem::size_of::<usize>());
                self.try_into().ok().unwrap()
            }
        }
    };
}

impl_to_usize_from!(u8);
impl_to_usize_from!(u16);
impl_to_usize_from!(u32);

#[doc(hidden)]
pub type TryVec<T> = fallible_collections::TryVec<T>;

/// Describes sniffing failures.
///
/// This enum wraps the standard `io::Error` type, unified with
/// our own parser error states.
#[derive(Debug)]
pub enum Error {
    /// No registered magic matched and the stream doesn't look like SVG.
    UnknownFormat,
    /// Parse error caused by corrupt or malformed data of a recognized format.
    Format(ImageType, &'static str),
    /// The image embedded in an ICO is another ICO, or the caller can't load its format.
    UnsupportedEmbedded(ImageType),
    /// Reflect `std::io::ErrorKind::UnexpectedEof` for short data.
    UnexpectedEOF,
    /// Propagate underlying errors from `std::io`.
    Io(std::io::Error),
    /// Out of memory
    OutOfMemory,
    /// Resource limit exceeded during parsing
    ResourceLimitExceeded(&'static str),
    /// Operation was stopped/cancelled
    Stopped(enough::StopReason),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::UnknownFormat => "unknown image format",
            Self::Format(format, s) => return write!(f, "invalid {format} format: {s}"),
            Self::UnsupportedEmbedded(format) => return write!(f, "can't load {format} from ICO"),
            Self::ResourceLimitExceeded(s) => s,
            Self::UnexpectedEOF => "EOF",
            Self::Io(err) => return err.fmt(f),
            Self::OutOfMemory => "OOM",
            Self::Stopped(reason) => return write!(f, "Stopped: {}", reason),
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::UnexpectedEOF,
            _ => Self::Io(err),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::Format(..) | Error::UnknownFormat => std::io::ErrorKind::InvalidData,
            Error::UnexpectedEOF => std::io::ErrorKind::UnexpectedEof,
            Error::Io(io_err) => return io_err,
            _ => std::io::ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

impl From<enough::StopReason> for Error {
    fn from(reason: enough::StopReason) -> Self {
        Self::Stopped(reason)
    }
}

/// Result shorthand using our Error enum.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// What a successful sniff knows about an image.
///
/// `width` and `height` are in pixels. PDF and SVG report a placeholder
/// `1×1`, since their geometry isn't a container-level property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Meta {
    pub format: ImageType,
    pub width: u32,
    pub height: u32,
}

impl Meta {
    #[must_use]
    pub const fn new(format: ImageType, width: u32, height: u32) -> Self {
        Self { format, width, height }
    }
}

/// Options for sniffing
///
/// # Examples
///
/// ```rust
/// use zensniff::DecodeConfig;
///
/// let config = DecodeConfig::default()
///     .with_svg_sniff_limit(4096)
///     .with_peak_memory_limit(16_000_000);
///
/// let config = DecodeConfig::unlimited();
/// ```
#[derive(Debug, Clone)]
pub struct DecodeConfig {
    /// How many bytes the SVG fallback may look ahead for a root element.
    ///
    /// Only applies when no magic pattern matched. Documents that start with
    /// `<?xml ` or `<svg` go to the registered SVG decoder, which always looks
    /// at up to 32 KiB.
    /// Default: 32 KiB
    pub svg_sniff_limit: usize,

    /// Maximum bytes allocated while resolving an ICO's embedded image.
    /// Default: 64MB
    pub peak_memory_limit: Option<u64>,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            svg_sniff_limit: 32 * 1024,
            peak_memory_limit: Some(64_000_000),
        }
    }
}

impl DecodeConfig {
    /// Create a configuration without an allocation cap.
    pub fn unlimited() -> Self {
        Self {
            peak_memory_limit: None,
            ..Self::default()
        }
    }

    /// Set the SVG look-ahead window in bytes
    pub fn with_svg_sniff_limit(mut self, bytes: usize) -> Self {
        self.svg_sniff_limit = bytes;
        self
    }

    /// Set the peak memory limit in bytes
    pub fn with_peak_memory_limit(mut self, bytes: u64) -> Self {
        self.peak_memory_limit = Some(bytes);
        self
    }

    pub(crate) fn reserve(&self, bytes: u64) -> Result<()> {
        match self.peak_memory_limit {
            Some(limit) if bytes > limit => Err(Error::ResourceLimitExceeded("peak memory limit exceeded")),
            _ => Ok(()),
        }
    }
}

/// Detect the format of `src` and read its dimensions
///
/// Uses the process-wide [`registry`] with default options.
pub fn decode_meta<T: Read>(src: &mut T) -> Result<Meta> {
    decode_meta_with_config(src, &DecodeConfig::default(), &Unstoppable)
}

/// Detect the format of `src` and read its dimensions, with options and
/// cooperative cancellation via the [`Stop`] trait.
pub fn decode_meta_with_config<T: Read>(src: &mut T, config: &DecodeConfig, stop: &dyn Stop) -> Result<Meta> {
    registry().decode_meta(src, config, stop)
}

/// Skip a number of bytes that we don't care to parse.
pub(crate) fn skip<T: Read + ?Sized>(src: &mut T, bytes: u64) -> Result<()> {
    let skipped = std::io::copy(&mut Read::take(&mut *src, bytes), &mut std::io::sink())?;
    if skipped < bytes {
        return Err(Error::UnexpectedEOF);
    }
    Ok(())
}

pub(crate) fn read_array<const N: usize, T: Read + ?Sized>(src: &mut T) -> Result<[u8; N]> {
    let mut buf = [0; N];
    src.read_exact(&mut buf)?;
    Ok(buf)
}

pub(crate) fn be_u16<T: Read + ?Sized>(src: &mut T) -> Result<u16> {
    src.read_u16::<byteorder::BigEndian>().map_err(From::from)
}

pub(crate) fn be_u32<T: Read + ?Sized>(src: &mut T) -> Result<u32> {
    src.read_u32::<byteorder::BigEndian>().map_err(From::from)
}

pub(crate) fn be_u64<T: Read + ?Sized>(src: &mut T) -> Result<u64> {
    src.read_u64::<byteorder::BigEndian>().map_err(From::from)
}

pub(crate) fn le_u16<T: Read + ?Sized>(src: &mut T) -> Result<u16> {
    src.read_u16::<byteorder::LittleEndian>().map_err(From::from)
}

pub(crate) fn le_u32<T: Read + ?Sized>(src: &mut T) -> Result<u32> {
    src.read_u32::<byteorder::LittleEndian>().map_err(From::from)
}

#[test]
fn skip_reports_short_data() {
    let mut src = &b"12345"[..];
    assert!(skip(&mut src, 3).is_ok());
    assert_eq!(src, b"45");
    assert!(matches!(skip(&mut src, 3), Err(Error::UnexpectedEOF)));
}

#[test]
fn io_error_round_trip() {
    let err: Error = std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into();
    assert!(matches!(err, Error::UnexpectedEOF));

    let io: std::io::Error = Error::Format(ImageType::Png, "bad").into();
    assert_eq!(io.kind(), std::io::ErrorKind::InvalidData);
    assert_eq!(io.to_string(), "invalid png format: bad");
}

#[test]
fn failed_reservation_is_oom() {
    let err = std::vec::Vec::<u8>::new().try_reserve_exact(usize::MAX).unwrap_err();
    assert!(matches!(Error::from(err), Error::OutOfMemory));
}
