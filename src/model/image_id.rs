use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Extensions that are decoded as plain web images instead of DICOM.
pub const RASTER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp"];

/// Query suffix asking the medical decoder for a reduced-size image.
pub const DOWNSAMPLE_HINT: &str = "?quality=50&downsampleFactor=2";

/// Factor applied when [`DOWNSAMPLE_HINT`] is present.
pub const DOWNSAMPLE_FACTOR: u32 = 2;

const MEDICAL_PREFIX: &str = "wadouri";
const RASTER_PREFIX: &str = "webImage";

/// Which decoder an identifier is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Medical,
    Raster,
}

impl ImageKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ImageKind::Medical => MEDICAL_PREFIX,
            ImageKind::Raster => RASTER_PREFIX,
        }
    }
}

/// Cache key and loader selector derived from a source URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageId {
    kind: ImageKind,
    url: String,
}

impl ImageId {
    pub fn new(kind: ImageKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
        }
    }

    /// Classify a URL. The same URL always yields the same identifier.
    pub fn from_url(url: &str) -> Self {
        let kind = if is_raster_url(url) {
            ImageKind::Raster
        } else {
            ImageKind::Medical
        };
        Self::new(kind, url)
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_medical(&self) -> bool {
        self.kind == ImageKind::Medical
    }

    /// Same source, routed through the plain image decoder.
    pub fn as_raster(&self) -> Self {
        Self::new(ImageKind::Raster, self.url.clone())
    }

    pub fn with_downsample_hint(&self) -> Self {
        Self::new(self.kind, format!("{}{DOWNSAMPLE_HINT}", self.url))
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.prefix(), self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown image identifier `{0}`")]
pub struct UnknownImagePrefix(pub String);

impl FromStr for ImageId {
    type Err = UnknownImagePrefix;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (prefix, url) = value
            .split_once(':')
            .ok_or_else(|| UnknownImagePrefix(value.to_string()))?;
        match prefix {
            MEDICAL_PREFIX => Ok(Self::new(ImageKind::Medical, url)),
            RASTER_PREFIX => Ok(Self::new(ImageKind::Raster, url)),
            _ => Err(UnknownImagePrefix(value.to_string())),
        }
    }
}

/// Split a trailing downsample hint off a URL.
pub fn split_downsample_hint(url: &str) -> (&str, u32) {
    match url.strip_suffix(DOWNSAMPLE_HINT) {
        Some(base) => (base, DOWNSAMPLE_FACTOR),
        None => (url, 1),
    }
}

fn is_raster_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("data:image/") {
        return true;
    }

    // Signed URLs carry their token in the query string.
    let path = lower
        .split(['?', '#'])
        .next()
        .unwrap_or(lower.as_str());
    path.rsplit_once('.')
        .map(|(_, ext)| RASTER_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_extensions_map_to_web_image() {
        for url in [
            "https://x/y.png",
            "https://x/y.JPG",
            "https://x/y.jpeg",
            "https://x/y.gif",
            "https://x/y.bmp",
        ] {
            assert_eq!(ImageId::from_url(url).to_string(), format!("webImage:{url}"));
        }
    }

    #[test]
    fn test_everything_else_is_medical() {
        for url in ["https://x/y.dcm", "https://x/y", "https://x/png", "/tmp/scan.DCM"] {
            assert_eq!(ImageId::from_url(url).to_string(), format!("wadouri:{url}"));
        }
    }

    #[test]
    fn test_classification_ignores_signed_query() {
        let id = ImageId::from_url("https://bucket/case/1.png?token=abc.dcm");
        assert_eq!(id.kind(), ImageKind::Raster);
        assert_eq!(id.url(), "https://bucket/case/1.png?token=abc.dcm");

        let id = ImageId::from_url("https://bucket/case/1.dcm?token=abc.png");
        assert_eq!(id.kind(), ImageKind::Medical);
    }

    #[test]
    fn test_from_url_is_pure() {
        let a = ImageId::from_url("https://x/y.dcm");
        let b = ImageId::from_url("https://x/y.dcm");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_downsample_hint_is_appended_verbatim() {
        let id = ImageId::from_url("https://x/y.dcm").with_downsample_hint();
        assert_eq!(
            id.to_string(),
            "wadouri:https://x/y.dcm?quality=50&downsampleFactor=2"
        );
        assert_eq!(split_downsample_hint(id.url()), ("https://x/y.dcm", 2));
        assert_eq!(split_downsample_hint("https://x/y.dcm"), ("https://x/y.dcm", 1));
    }

    #[test]
    fn test_parse_round_trips_display() {
        let parsed: ImageId = "wadouri:https://x/y.dcm".parse().unwrap();
        assert_eq!(parsed, ImageId::from_url("https://x/y.dcm"));
        let err = "dicomweb:https://x".parse::<ImageId>().unwrap_err();
        assert_eq!(err.to_string(), "unknown image identifier `dicomweb:https://x`");
        assert_eq!(parsed.as_raster().to_string(), "webImage:https://x/y.dcm");
    }
}
