//! `img` role: identify an uploaded image.
//!
//! The payload is the hex-encoded file. The reply is a JSON description with
//! the detected format, size, dimensions when the header carries them, and a
//! SHA-256 of the bytes.

use crate::domain::envelope::Envelope;
use crate::domain::error::ComputeError;
use crate::ports::outbound::Compute;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Webp,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub sha256: String,
}

pub struct ImgCompute;

#[async_trait]
impl Compute for ImgCompute {
    fn name(&self) -> &'static str {
        "img"
    }

    async fn compute(&self, request: &Envelope) -> Result<String, ComputeError> {
        let bytes = decode_payload(&request.payload)?;
        let info = describe(&bytes);
        serde_json::to_string(&info).map_err(|e| ComputeError::InvalidInput(e.to_string()))
    }
}

/// Hex payload to bytes. Whitespace between digits is ignored.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, ComputeError> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(ComputeError::InvalidInput("empty image".into()));
    }
    hex::decode(&compact).map_err(|e| ComputeError::InvalidInput(format!("invalid hex: {}", e)))
}

pub fn describe(bytes: &[u8]) -> ImageInfo {
    let format = detect_format(bytes);
    let (width, height) = match dimensions(format, bytes) {
        Some((w, h)) => (Some(w), Some(h)),
        None => (None, None),
    };

    ImageInfo {
        format,
        bytes: bytes.len(),
        width,
        height,
        sha256: hex::encode(Sha256::digest(bytes)),
    }
}

pub fn detect_format(bytes: &[u8]) -> ImageFormat {
    if bytes.starts_with(PNG_MAGIC) {
        ImageFormat::Png
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ImageFormat::Jpeg
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        ImageFormat::Gif
    } else if bytes.starts_with(b"BM") {
        ImageFormat::Bmp
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        ImageFormat::Webp
    } else {
        ImageFormat::Unknown
    }
}

fn dimensions(format: ImageFormat, bytes: &[u8]) -> Option<(u32, u32)> {
    match format {
        // IHDR is always the first chunk
        ImageFormat::Png => Some((be_u32(bytes, 16)?, be_u32(bytes, 20)?)),
        ImageFormat::Gif => Some((le_u16(bytes, 6)?.into(), le_u16(bytes, 8)?.into())),
        // negative height marks a top-down bitmap
        ImageFormat::Bmp => Some((
            le_i32(bytes, 18)?.unsigned_abs(),
            le_i32(bytes, 22)?.unsigned_abs(),
        )),
        _ => None,
    }
}

fn be_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_be_bytes(raw))
}

fn le_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let raw: [u8; 2] = bytes.get(at..at + 2)?.try_into().ok()?;
    Some(u16::from_le_bytes(raw))
}

fn le_i32(bytes: &[u8], at: usize) -> Option<i32> {
    let raw: [u8; 4] = bytes.get(at..at + 4)?.try_into().ok()?;
    Some(i32::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::envelope::Token;

    fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }

    #[test]
    fn test_png_dimensions() {
        let info = describe(&png_header(640, 480));
        assert_eq!(info.format, ImageFormat::Png);
        assert_eq!(info.width, Some(640));
        assert_eq!(info.height, Some(480));
    }

    #[test]
    fn test_gif_dimensions() {
        let mut bytes = b"GIF89a".to_vec();
        bytes.extend_from_slice(&32u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        let info = describe(&bytes);
        assert_eq!(info.format, ImageFormat::Gif);
        assert_eq!((info.width, info.height), (Some(32), Some(16)));
    }

    #[test]
    fn test_bmp_top_down_height() {
        let mut bytes = vec![0u8; 26];
        bytes[..2].copy_from_slice(b"BM");
        bytes[18..22].copy_from_slice(&100i32.to_le_bytes());
        bytes[22..26].copy_from_slice(&(-50i32).to_le_bytes());
        let info = describe(&bytes);
        assert_eq!((info.width, info.height), (Some(100), Some(50)));
    }

    #[test]
    fn test_truncated_and_unknown() {
        let info = describe(PNG_MAGIC);
        assert_eq!(info.format, ImageFormat::Png);
        assert_eq!(info.width, None);

        assert_eq!(detect_format(&[0xFF, 0xD8, 0xFF, 0xE0]), ImageFormat::Jpeg);
        assert_eq!(detect_format(b"RIFF\0\0\0\0WEBPVP8 "), ImageFormat::Webp);
        assert_eq!(detect_format(b"plain text"), ImageFormat::Unknown);
    }

    #[test]
    fn test_decode_payload() {
        assert_eq!(decode_payload("de ad\nbe ef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(decode_payload("").is_err());
        assert!(decode_payload("xyz").is_err());
    }

    #[tokio::test]
    async fn test_compute_returns_json() {
        let env = Envelope::one_way(Token::new(1), hex::encode(png_header(2, 3)), "describe");
        let out = ImgCompute.compute(&env).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(json["format"], "png");
        assert_eq!(json["width"], 2);
        assert_eq!(json["height"], 3);
        assert_eq!(json["sha256"].as_str().unwrap().len(), 64);
    }
}
