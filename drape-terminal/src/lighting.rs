/// Studio lighting for the software rasterizer
use nalgebra::Vector3;

/// A white directional light shining from `position` toward the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub position: Vector3<f32>,
    pub intensity: f32,
}

impl DirectionalLight {
    pub fn new(x: f32, y: f32, z: f32, intensity: f32) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            intensity,
        }
    }

    /// Unit vector from a lit surface toward the light.
    pub fn direction(&self) -> Vector3<f32> {
        self.position.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::y)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudioLights {
    pub ambient: f32,
    pub directional: Vec<DirectionalLight>,
}

impl StudioLights {
    /// Key, fill, rim and a faint bounce from below.
    pub fn studio() -> Self {
        Self {
            ambient: 0.6,
            directional: vec![
                DirectionalLight::new(2.0, 8.0, 5.0, 1.2),
                DirectionalLight::new(-5.0, 4.0, 4.0, 0.6),
                DirectionalLight::new(0.0, 4.0, -6.0, 0.5),
                DirectionalLight::new(0.0, -3.0, 2.0, 0.2),
            ],
        }
    }

    /// Light reaching a surface with world-space `normal`.
    pub fn irradiance(&self, normal: &Vector3<f32>) -> f32 {
        self.ambient
            + self
                .directional
                .iter()
                .map(|light| normal.dot(&light.direction()).max(0.0) * light.intensity)
                .sum::<f32>()
    }
}

impl Default for StudioLights {
    fn default() -> Self {
        Self::studio()
    }
}
