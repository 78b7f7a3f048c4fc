use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use image::GenericImageView;

/// A portrait decoded from the request's data URI, validated as a real image.
#[derive(Debug, Clone)]
pub struct PortraitImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

/// Media type declared in a data-URI header, e.g. "image/png" out of
/// "data:image/png;base64".
fn declared_mime_type(header: &str) -> Option<String> {
    let rest = header.strip_prefix("data:")?;
    let mime = rest.split(';').next()?.trim();
    if mime.is_empty() {
        None
    } else {
        Some(mime.to_string())
    }
}

/// Decodes a base64 data URI into a validated in-memory image. Everything
/// before the first comma is treated as the URI header; the remainder must be
/// standard base64. The sniffed MIME type wins over the declared one, which
/// wins over an "image/png" fallback.
pub fn decode_data_uri(value: &str) -> Result<PortraitImage> {
    let (header, payload) = value
        .split_once(',')
        .ok_or_else(|| anyhow!("image is not a base64 data URI"))?;

    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .context("invalid base64 image payload")?;

    let decoded =
        image::load_from_memory(&bytes).context("image payload is not a decodable image")?;
    let (width, height) = decoded.dimensions();

    let mime_type = detect_mime_type(&bytes)
        .or_else(|| declared_mime_type(header))
        .unwrap_or_else(|| "image/png".to_string());

    Ok(PortraitImage {
        width,
        height,
        bytes,
        mime_type,
    })
}
