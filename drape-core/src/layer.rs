/// Decal layers and the design input edge
///
/// [`DecalLayer`] is the normalized placement descriptor every component
/// works with. Saved designs and cart payloads arrive in older shapes
/// (`imageUrl` vs `imageBase64`, missing ids, nested `design_data`); those
/// are folded into [`DecalLayer`]s by [`DesignInput`] and go no further.
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::error::{InputError, SourceError};
use crate::garment::GarmentType;
use crate::source::ImageSource;
use crate::viewer::ViewerInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Front,
    Back,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Front => Side::Back,
            Side::Back => Side::Front,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Front => "front",
            Side::Back => "back",
        })
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(Side::Front),
            "back" => Ok(Side::Back),
            other => Err(format!("unknown side `{other}`")),
        }
    }
}

/// Identity of a layer within one design session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(Arc<str>);

impl LayerId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Hands out `decal-<n>` ids for newly uploaded images.
///
/// Owned by the embedding application, one per editing session.
#[derive(Debug, Default)]
pub struct LayerIdGenerator {
    next: AtomicU64,
}

impl LayerIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> LayerId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        LayerId::new(format!("decal-{n}"))
    }
}

/// Position and scale of a decal in normalized garment-local units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

impl Placement {
    pub const X_RANGE: (f32, f32) = (-0.20, 0.20);
    pub const Y_RANGE: (f32, f32) = (-0.15, 0.25);
    pub const SIZE_RANGE: (f32, f32) = (0.03, 0.50);
    pub const MOVE_STEP: f32 = 0.015;
    pub const SIZE_STEP: f32 = 0.005;
    pub const DEFAULT_SIZE: f32 = 0.12;

    pub fn new(x: f32, y: f32, size: f32) -> Self {
        Self { x, y, size }
    }

    /// The ranges the editor allows. The renderer itself accepts any value.
    pub fn clamped(&self) -> Self {
        Self {
            x: self.x.clamp(Self::X_RANGE.0, Self::X_RANGE.1),
            y: self.y.clamp(Self::Y_RANGE.0, Self::Y_RANGE.1),
            size: self.size.clamp(Self::SIZE_RANGE.0, Self::SIZE_RANGE.1),
        }
    }

    /// Move by whole editor steps, staying inside the editor ranges.
    pub fn nudged(&self, steps_x: i32, steps_y: i32) -> Self {
        Self {
            x: self.x + steps_x as f32 * Self::MOVE_STEP,
            y: self.y + steps_y as f32 * Self::MOVE_STEP,
            size: self.size,
        }
        .clamped()
    }

    pub fn resized(&self, steps: i32) -> Self {
        Self {
            size: self.size + steps as f32 * Self::SIZE_STEP,
            ..*self
        }
        .clamped()
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::new(0.0, 0.08, Self::DEFAULT_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecalLayer {
    pub id: LayerId,
    pub source: ImageSource,
    pub side: Side,
    pub placement: Placement,
    /// Restrict the layer to one garment even when the design spans both.
    pub garment: Option<GarmentType>,
}

impl DecalLayer {
    pub fn new(id: impl Into<LayerId>, source: ImageSource, side: Side, placement: Placement) -> Self {
        Self {
            id: id.into(),
            source,
            side,
            placement,
            garment: None,
        }
    }

    pub fn only_on(mut self, garment: GarmentType) -> Self {
        self.garment = Some(garment);
        self
    }

    pub fn applies_to(&self, garment: GarmentType) -> bool {
        self.garment.map_or(true, |only| only == garment)
    }
}

/// A decal as stored by the editor, the cart or a saved design.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDecal {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_base64: Option<String>,
    pub side: Side,
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_size")]
    pub size: f32,
    #[serde(default, alias = "modelType")]
    pub garment_type: Option<GarmentType>,
}

fn default_size() -> f32 {
    Placement::DEFAULT_SIZE
}

fn default_color() -> String {
    Rgb::default().to_hex()
}

/// A whole design: base color, garment and decals.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignInput {
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default, alias = "modelType")]
    pub garment_type: Option<GarmentType>,
    #[serde(default)]
    pub decals: Vec<RawDecal>,
    #[serde(default)]
    pub auto_rotate: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DesignDocument {
    Saved { design_data: DesignInput },
    Bare(DesignInput),
}

impl DesignInput {
    /// Parse a design, either bare or wrapped in a saved-design record.
    pub fn from_json(json: &str) -> Result<Self, InputError> {
        Ok(match serde_json::from_str(json)? {
            DesignDocument::Saved { design_data } => design_data,
            DesignDocument::Bare(design) => design,
        })
    }

    /// Normalize into viewer input. `fallback_garment` is used when the
    /// design does not name one. A decal with a missing or unusable image
    /// is kept and fails on its own in the texture loader.
    pub fn into_viewer_input(self, fallback_garment: GarmentType) -> Result<ViewerInput, InputError> {
        let color = Rgb::from_hex(&self.color)?;
        let decals = self
            .decals
            .into_iter()
            .enumerate()
            .map(|(index, raw)| raw.into_layer(index))
            .collect();

        Ok(ViewerInput {
            color,
            garment: self.garment_type.unwrap_or(fallback_garment),
            decals,
            auto_rotate: self.auto_rotate.unwrap_or(true),
        })
    }
}

impl RawDecal {
    pub fn into_layer(self, index: usize) -> DecalLayer {
        let reference = [self.image_url, self.image_base64]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .unwrap_or_default();
        let source = ImageSource::parse(&reference).unwrap_or_else(|err| {
            warn!("decal {index}: {err}");
            ImageSource::invalid(&reference, err)
        });

        let id = match self.id {
            Some(id) if !id.trim().is_empty() => LayerId::new(id.trim()),
            _ => LayerId::new(format!("decal-{index}")),
        };

        DecalLayer {
            id,
            source,
            side: self.side,
            placement: Placement::new(self.x, self.y, self.size),
            garment: self.garment_type,
        }
    }
}
