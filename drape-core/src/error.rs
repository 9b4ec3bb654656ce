/// Error taxonomy for the decal renderer
///
/// Only asset failures reach the user as a fallback state. Texture and
/// surface failures degrade a single layer or side and are absorbed where
/// they happen.
use std::path::PathBuf;

use thiserror::Error;

use crate::garment::GarmentType;

/// A garment's 3D model could not be made available.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssetError {
    #[error("no garment profile configured for {0}")]
    NoProfile(GarmentType),
    #[error("failed to read {garment} asset {path}: {reason}")]
    Io {
        garment: GarmentType,
        path: PathBuf,
        reason: String,
    },
    #[error("failed to parse {garment} asset: {reason}")]
    Parse { garment: GarmentType, reason: String },
    #[error("{garment} asset contains no triangle mesh")]
    NoMesh { garment: GarmentType },
}

impl AssetError {
    pub fn garment(&self) -> GarmentType {
        match self {
            AssetError::NoProfile(garment)
            | AssetError::Io { garment, .. }
            | AssetError::Parse { garment, .. }
            | AssetError::NoMesh { garment } => *garment,
        }
    }
}

/// A decal layer's image could not be turned into a texture.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TextureError {
    #[error("invalid image source: {0}")]
    InvalidSource(#[from] SourceError),
    #[error("no fetcher handles `{0}`")]
    UnsupportedScheme(String),
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("image has zero width or height")]
    Empty,
}

/// An image reference that cannot be normalized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("image source is empty")]
    Empty,
    #[error("malformed data URI")]
    MalformedDataUri,
    #[error("data URI payload is not valid base64")]
    InvalidBase64,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid hex color `{0}`")]
pub struct ColorError(pub String);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to build garment profile: {0}")]
    Profile(String),
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to parse design: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Color(#[from] ColorError),
}
