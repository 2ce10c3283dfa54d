// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Image container formats known to the sniffer.
///
/// The lowercase tag returned by [`ImageType::as_str`] is stable and
/// meant to be handed to image-processing backends as-is.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    Jpeg,
    Jxl,
    Png,
    Webp,
    Gif,
    Ico,
    Svg,
    Heic,
    Avif,
    Bmp,
    Tiff,
    Pdf,
}

impl ImageType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Jxl => "jxl",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Ico => "ico",
            Self::Svg => "svg",
            Self::Heic => "heic",
            Self::Avif => "avif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Pdf => "pdf",
        }
    }

    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Jxl => "image/jxl",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Ico => "image/x-icon",
            Self::Svg => "image/svg+xml",
            Self::Heic => "image/heif",
            Self::Avif => "image/avif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Pdf => "application/pdf",
        }
    }

    /// File extension including the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => ".jpg",
            Self::Jxl => ".jxl",
            Self::Png => ".png",
            Self::Webp => ".webp",
            Self::Gif => ".gif",
            Self::Ico => ".ico",
            Self::Svg => ".svg",
            Self::Heic => ".heic",
            Self::Avif => ".avif",
            Self::Bmp => ".bmp",
            Self::Tiff => ".tiff",
            Self::Pdf => ".pdf",
        }
    }

    /// Look a type up by its tag. `jpg` is accepted as an alias of `jpeg`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "jpeg" | "jpg" => Self::Jpeg,
            "jxl" => Self::Jxl,
            "png" => Self::Png,
            "webp" => Self::Webp,
            "gif" => Self::Gif,
            "ico" => Self::Ico,
            "svg" => Self::Svg,
            "heic" => Self::Heic,
            "avif" => Self::Avif,
            "bmp" => Self::Bmp,
            "tiff" => Self::Tiff,
            "pdf" => Self::Pdf,
            _ => return None,
        })
    }
}

impl std::fmt::Display for ImageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[test]
fn names_round_trip() {
    for t in [ImageType::Jpeg, ImageType::Heic, ImageType::Avif, ImageType::Pdf, ImageType::Svg] {
        assert_eq!(ImageType::from_name(t.as_str()), Some(t));
    }
    assert_eq!(ImageType::from_name("jpg"), Some(ImageType::Jpeg));
    assert_eq!(ImageType::from_name("raw"), None);
}
