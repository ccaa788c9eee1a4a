use super::mime::{detect_image_mime, mime_for_path};
use crate::models::EncodedAsset;
use crate::{Error, Result};
use base64::Engine as _;
use std::path::{Path, PathBuf};

const FALLBACK_MIME: &str = "application/octet-stream";

/// Reads a local file and encodes it for inline transfer.
///
/// The MIME type comes from the file extension, then from the content
/// signature, then falls back to `application/octet-stream`.
pub async fn encode(path: &Path) -> Result<EncodedAsset> {
    let bytes = tokio::fs::read(path).await.map_err(|source| Error::Encoding {
        path: path.display().to_string(),
        source,
    })?;

    let mime_type = mime_for_path(path)
        .or_else(|| detect_image_mime(&bytes))
        .unwrap_or(FALLBACK_MIME);

    tracing::debug!(
        "Encoded {} ({} bytes, {})",
        path.display(),
        bytes.len(),
        mime_type
    );

    Ok(EncodedAsset {
        mime_type: mime_type.to_string(),
        data: base64::engine::general_purpose::STANDARD.encode(&bytes),
    })
}

/// Encodes every attachment, in order. Any failure aborts the whole set so a
/// request is never built from a partial attachment list.
pub async fn encode_all(paths: &[PathBuf]) -> Result<Vec<EncodedAsset>> {
    let mut assets = Vec::with_capacity(paths.len());
    for path in paths {
        assets.push(encode(path).await?);
    }
    Ok(assets)
}
