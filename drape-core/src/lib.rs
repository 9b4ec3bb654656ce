//! Drape Core Library - garment decal projection
//!
//! Places user images on 3D garment models: garment assets are loaded and
//! cached by the registry, printable surfaces are picked per side, decal
//! textures load in the background and each layer is projected through
//! the surface as an oriented box. The [`Viewer`] ties these together for
//! a host that renders frames.

pub mod camera;
pub mod color;
pub mod color_applier;
pub mod config;
pub mod decal_mesh;
pub mod error;
pub mod garment;
pub mod geometry;
pub mod gltf_loader;
pub mod layer;
pub mod projector;
pub mod registry;
pub mod scene;
pub mod source;
pub mod surface;
pub mod texture;
pub mod transform;
pub mod viewer;

// Re-export commonly used types
pub use camera::{Camera, CameraSettings, ProjectionMode};
pub use color::{Rgb, COLOR_PRESETS};
pub use config::{ViewerConfig, ViewerSettings};
pub use error::{AssetError, ConfigError, InputError, TextureError};
pub use garment::{GarmentProfile, GarmentType};
pub use geometry::{Aabb, Mesh, Triangle, Vertex};
pub use layer::{DecalLayer, DesignInput, LayerId, LayerIdGenerator, Placement, Side};
pub use projector::{DecalRenderState, Ineligible, ProjectedDecal};
pub use registry::{AssetRegistry, AssetSource, DirectorySource, MemorySource};
pub use scene::{GarmentAsset, MaterialTable};
pub use source::{ImageSource, TextureKey};
pub use texture::{DeferredBackend, FileFetcher, Texture, TextureHandle, ThreadedBackend};
pub use transform::{RotationState, Transform};
pub use viewer::{Frame, LayerState, Viewer, ViewerInput, ViewerStatus};
