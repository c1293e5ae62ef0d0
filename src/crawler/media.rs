//! Media download and validation
//!
//! Images are downloaded under a hard byte cap, decoded to prove they are
//! real images, and checked for a plausible byte-size-to-pixel ratio.

use crate::config::MediaConfig;
use crate::crawler::fetcher::{read_capped, FetchError};
use crate::storage::StorageError;
use image::GenericImageView;
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Slack for headers, palettes and metadata on tiny images
const RATIO_ALLOWANCE_BYTES: f64 = 16.0 * 1024.0;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Payload of {size} bytes exceeds the {limit} byte cap")]
    TooLarge { size: u64, limit: u64 },

    #[error("Undecodable image: {0}")]
    Decode(String),

    #[error("Implausible image: {bytes} bytes for {width}x{height} pixels")]
    Implausible { bytes: u64, width: u32, height: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl MediaError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(e) if e.is_retryable())
    }
}

/// A decoded image that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedMedia {
    pub bytes: Vec<u8>,
    /// Canonical extension of the detected format
    pub extension: &'static str,
    pub width: u32,
    pub height: u32,
    /// SHA-256 hex digest of `bytes`
    pub hash: String,
}

/// Downloads `url`, aborting as soon as the payload is known to exceed `limit`
pub async fn download_capped(client: &Client, url: &Url, limit: u64) -> Result<Vec<u8>, MediaError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(url.as_str(), e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        }
        .into());
    }

    read_capped(response, url, limit).await.map_err(|e| match e {
        FetchError::TooLarge { size, limit, .. } => MediaError::TooLarge { size, limit },
        other => other.into(),
    })
}

/// Decodes `bytes` and rejects corrupt or implausibly sized images
pub fn validate_image(bytes: Vec<u8>, config: &MediaConfig) -> Result<ValidatedMedia, MediaError> {
    let format = image::guess_format(&bytes).map_err(|e| MediaError::Decode(e.to_string()))?;
    let decoded = image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| MediaError::Decode(e.to_string()))?;
    let (width, height) = decoded.dimensions();

    let size = bytes.len() as u64;
    let pixels = u64::from(width) * u64::from(height);
    let ceiling = pixels as f64 * config.max_bytes_per_pixel + RATIO_ALLOWANCE_BYTES;
    if pixels == 0 || size as f64 > ceiling {
        return Err(MediaError::Implausible {
            bytes: size,
            width,
            height,
        });
    }

    let extension = format.extensions_str().first().copied().unwrap_or("bin");
    let hash = hex::encode(Sha256::digest(&bytes));

    Ok(ValidatedMedia {
        bytes,
        extension,
        width,
        height,
        hash,
    })
}
