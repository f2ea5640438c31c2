use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Number of leading bytes inspected when sniffing.
pub const SNIFF_LEN: usize = 12;

/// Image type detected from magic bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    /// Anything else; stored under a generic extension.
    #[default]
    Unknown,
}

impl ImageFormat {
    /// Every extension the cache may have written, in probing order.
    pub const EXTENSIONS: [&'static str; 5] = ["jpg", "png", "gif", "webp", "bin"];

    /// Classify `data` by its first [`SNIFF_LEN`] bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use folio_extract::ImageFormat;
    ///
    /// assert_eq!(ImageFormat::from_magic_bytes(b"\xFF\xD8\xFF\xE0"), ImageFormat::Jpeg);
    /// assert_eq!(ImageFormat::from_magic_bytes(b"RIFF\0\0\0\0WEBPVP8 "), ImageFormat::Webp);
    /// assert_eq!(ImageFormat::from_magic_bytes(b"RIFF\0\0\0\0WAVEfmt "), ImageFormat::Unknown);
    /// ```
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        let head = &data[..data.len().min(SNIFF_LEN)];
        match head {
            [0xFF, 0xD8, 0xFF, ..] => Self::Jpeg,
            [0x89, b'P', b'N', b'G', ..] => Self::Png,
            [b'G', b'I', b'F', ..] => Self::Gif,
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Self::Webp,
            _ => Self::Unknown,
        }
    }

    /// Guess from a file extension, used to spot image entries by name.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "webp" => Self::Webp,
            _ => Self::Unknown,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Unknown => "bin",
        }
    }

    pub fn is_image(&self) -> bool {
        *self != Self::Unknown
    }
}

impl Display for ImageFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.extension())
    }
}
