/// Garment types and their per-garment tuning
use std::fmt;
use std::str::FromStr;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// The garment being customized; selected once per editing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GarmentType {
    Tshirt,
    Hoodie,
}

impl GarmentType {
    pub fn all() -> &'static [GarmentType] {
        &[GarmentType::Tshirt, GarmentType::Hoodie]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GarmentType::Tshirt => "tshirt",
            GarmentType::Hoodie => "hoodie",
        }
    }

    /// Cycle to the next garment type (viewer shortcut).
    pub fn next(&self) -> Self {
        match self {
            GarmentType::Tshirt => GarmentType::Hoodie,
            GarmentType::Hoodie => GarmentType::Tshirt,
        }
    }
}

impl fmt::Display for GarmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GarmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tshirt" | "t-shirt" => Ok(GarmentType::Tshirt),
            "hoodie" => Ok(GarmentType::Hoodie),
            other => Err(format!("unknown garment type `{other}`")),
        }
    }
}

/// Positioning, surface selection and projection tuning for one garment.
///
/// Depth and bias values are renderer- and mesh-specific and were tuned
/// empirically; they live here rather than in code so each asset can be
/// re-tuned without a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GarmentProfile {
    /// Model file, relative to the asset root
    pub asset: String,
    /// Position of the mesh inside the garment group (asset units)
    pub offset: [f32; 3],
    /// Uniform scale applied to the garment group
    pub scale: f32,

    /// Primitives with a smaller bounding-box volume never receive prints
    pub min_surface_volume: f32,
    /// Bounding-box center depth above which a panel counts as front-facing
    pub front_depth_threshold: f32,

    /// Fixed standoff from the garment center, used when the garment has a
    /// single printable primitive
    pub surface_offset: f32,
    /// Standoff beyond a panel's own bounds, used for multi-panel garments
    pub surface_epsilon: f32,
    /// Thickness of the projection volume through the surface
    pub projection_depth: f32,

    pub polygon_offset_factor: f32,
    pub polygon_offset_units: f32,
    /// Drop surface triangles that face away from the projection
    pub cull_backfaces: bool,
}

impl GarmentProfile {
    pub fn for_garment(garment: GarmentType) -> Self {
        match garment {
            GarmentType::Tshirt => Self {
                asset: "tshirt.glb".to_string(),
                offset: [0.0, 0.1, 0.0],
                projection_depth: 0.6,
                ..Self::base()
            },
            GarmentType::Hoodie => Self {
                asset: "hoodie.glb".to_string(),
                projection_depth: 0.25,
                ..Self::base()
            },
        }
    }

    fn base() -> Self {
        Self {
            asset: String::new(),
            offset: [0.0; 3],
            scale: 9.0,
            min_surface_volume: 1e-4,
            front_depth_threshold: -0.05,
            surface_offset: 0.13,
            surface_epsilon: 0.01,
            projection_depth: 0.25,
            polygon_offset_factor: -4.0,
            polygon_offset_units: -4.0,
            cull_backfaces: true,
        }
    }

    pub fn offset(&self) -> Vector3<f32> {
        Vector3::from(self.offset)
    }
}

impl Default for GarmentProfile {
    fn default() -> Self {
        Self::base()
    }
}
