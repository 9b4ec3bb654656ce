/// Viewer configuration loaded from TOML
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::camera::CameraSettings;
use crate::error::ConfigError;
use crate::garment::{GarmentProfile, GarmentType};

/// Settings shared by every garment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    /// Auto-rotation speed in radians per second
    pub auto_rotate_speed: f32,
    /// Layer count the editor allows; exceeding it is logged, never rejected
    pub max_layers: usize,
    pub camera: CameraSettings,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            auto_rotate_speed: 0.3,
            max_layers: 3,
            camera: CameraSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub viewer: ViewerSettings,
    pub garments: BTreeMap<GarmentType, GarmentProfile>,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    viewer: ViewerSettings,
    #[serde(default)]
    garments: BTreeMap<String, toml::Table>,
}

impl ViewerConfig {
    /// Parse a config document. Each `[garments.<type>]` table overrides
    /// only the keys it names; everything else keeps that garment's
    /// defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(input)?;
        let mut config = Self {
            viewer: raw.viewer,
            ..Self::default()
        };

        for (name, overrides) in raw.garments {
            let garment = match name.parse::<GarmentType>() {
                Ok(garment) => garment,
                Err(err) => {
                    warn!("ignoring garment table: {err}");
                    continue;
                }
            };

            let mut table = match toml::Value::try_from(GarmentProfile::for_garment(garment)) {
                Ok(toml::Value::Table(table)) => table,
                Ok(other) => return Err(ConfigError::Profile(format!("not a table: {other}"))),
                Err(err) => return Err(ConfigError::Profile(err.to_string())),
            };
            table.extend(overrides);

            let profile: GarmentProfile = toml::Value::Table(table).try_into()?;
            config.garments.insert(garment, profile);
        }

        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load `path` if given, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                debug!("no config file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn profile(&self, garment: GarmentType) -> Option<&GarmentProfile> {
        self.garments.get(&garment)
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            viewer: ViewerSettings::default(),
            garments: GarmentType::all()
                .iter()
                .map(|g| (*g, GarmentProfile::for_garment(*g)))
                .collect(),
        }
    }
}
