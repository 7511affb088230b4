//! Output format parsing and MIME type mapping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Encoding used for files written to the output directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG (lossless).
    #[default]
    Png,
    /// JPEG.
    Jpeg,
    /// WebP.
    Webp,
}

impl OutputFormat {
    /// File extension, without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }

    /// MIME type written by this format.
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }

    /// Whether bytes of the given MIME type can be stored without re-encoding.
    #[must_use]
    pub fn matches_mime(self, mime: &str) -> bool {
        let mime = mime.split(';').next().unwrap_or_default().trim();
        matches!(
            (mime, self),
            ("image/png", Self::Png)
                | ("image/jpeg" | "image/jpg", Self::Jpeg)
                | ("image/webp", Self::Webp)
        )
    }

    pub(crate) fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Webp => image::ImageFormat::WebP,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            _ => Err(format!("Unsupported format '{s}'. Valid: png, jpeg, webp")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_formats() {
        assert_eq!("png".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!("JPEG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("jpg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("webp".parse::<OutputFormat>().unwrap(), OutputFormat::Webp);
    }

    #[test]
    fn parse_unknown_format() {
        let err = "gif".parse::<OutputFormat>().unwrap_err();
        assert!(err.contains("Unsupported format 'gif'"));
    }

    #[test]
    fn extensions() {
        assert_eq!(OutputFormat::Png.extension(), "png");
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::Webp.extension(), "webp");
    }

    #[test]
    fn mime_matches() {
        assert!(OutputFormat::Png.matches_mime("image/png"));
        assert!(OutputFormat::Jpeg.matches_mime("image/jpeg"));
        assert!(OutputFormat::Jpeg.matches_mime("image/jpeg; charset=binary"));
        assert!(OutputFormat::Webp.matches_mime("image/webp"));
        assert!(!OutputFormat::Png.matches_mime("image/jpeg"));
        assert!(!OutputFormat::Jpeg.matches_mime("application/json"));
    }

    #[test]
    fn default_is_png() {
        assert_eq!(OutputFormat::default(), OutputFormat::Png);
        assert_eq!(OutputFormat::default().to_string(), "png");
    }
}
