/// Orbit camera and screen projection
use nalgebra::{Matrix4, Point3, Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// Projection mode for rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMode {
    Orthographic,
    #[default]
    Perspective,
}

/// Orbit limits and starting pose, loaded from the `[viewer.camera]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub min_distance: f32,
    pub max_distance: f32,
    /// Polar angle limits in radians, measured from the +Y axis
    pub min_polar: f32,
    pub max_polar: f32,
    pub mode: ProjectionMode,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov_degrees: 25.0,
            position: [0.0, 5.0, 20.0],
            target: [0.0, 0.4, 0.0],
            min_distance: 8.0,
            max_distance: 30.0,
            min_polar: std::f32::consts::PI / 4.0,
            max_polar: std::f32::consts::PI / 1.94,
            mode: ProjectionMode::Perspective,
        }
    }
}

/// Camera orbiting a fixed target without panning
#[derive(Debug, Clone)]
pub struct Camera {
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub mode: ProjectionMode,
    distance: f32,
    azimuth: f32,
    polar: f32,
    settings: CameraSettings,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_settings(width, height, CameraSettings::default())
    }

    pub fn with_settings(width: u32, height: u32, settings: CameraSettings) -> Self {
        let target = Point3::from(settings.target);
        let offset = Point3::from(settings.position) - target;
        let distance = offset.norm().max(f32::EPSILON);

        let mut camera = Self {
            target,
            up: Vector3::new(0.0, 1.0, 0.0),
            fov: settings.fov_degrees.to_radians(),
            aspect: width as f32 / height.max(1) as f32,
            near: 0.1,
            far: 100.0,
            mode: settings.mode,
            distance,
            azimuth: offset.x.atan2(offset.z),
            polar: (offset.y / distance).clamp(-1.0, 1.0).acos(),
            settings,
        };
        camera.clamp();
        camera
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    /// Orbit around the target by angular deltas (in radians)
    pub fn orbit(&mut self, d_azimuth: f32, d_polar: f32) {
        self.azimuth += d_azimuth;
        self.polar += d_polar;
        self.clamp();
    }

    /// Move toward (negative) or away from (positive) the target
    pub fn zoom(&mut self, delta: f32) {
        self.distance += delta;
        self.clamp();
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn polar(&self) -> f32 {
        self.polar
    }

    fn clamp(&mut self) {
        self.distance = self
            .distance
            .clamp(self.settings.min_distance, self.settings.max_distance);
        self.polar = self
            .polar
            .clamp(self.settings.min_polar, self.settings.max_polar);
    }

    pub fn position(&self) -> Point3<f32> {
        let (sin_p, cos_p) = self.polar.sin_cos();
        let (sin_a, cos_a) = self.azimuth.sin_cos();
        self.target + Vector3::new(sin_p * sin_a, cos_p, sin_p * cos_a) * self.distance
    }

    /// Create the view matrix (camera transformation)
    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.position(), &self.target, &self.up)
    }

    /// Create the projection matrix
    pub fn projection_matrix(&self) -> Matrix4<f32> {
        match self.mode {
            ProjectionMode::Perspective => {
                Matrix4::new_perspective(self.aspect, self.fov, self.near, self.far)
            }
            ProjectionMode::Orthographic => {
                let height = 2.0 * self.distance * (self.fov / 2.0).tan();
                let width = height * self.aspect;
                Matrix4::new_orthographic(
                    -width / 2.0,
                    width / 2.0,
                    -height / 2.0,
                    height / 2.0,
                    self.near,
                    self.far,
                )
            }
        }
    }

    /// Project a model-space point to screen space.
    ///
    /// Returns pixel coordinates plus NDC depth. Points behind the camera
    /// yield `None`; points off screen are returned so the rasterizer can
    /// clip partially visible triangles itself.
    pub fn project_to_screen(
        &self,
        point: &Point3<f32>,
        model_matrix: &Matrix4<f32>,
        width: u32,
        height: u32,
    ) -> Option<(f32, f32, f32)> {
        let mvp = self.projection_matrix() * self.view_matrix() * model_matrix;
        project_with(&mvp, point, width, height)
    }
}

/// Project through a precomputed model-view-projection matrix.
pub fn project_with(
    mvp: &Matrix4<f32>,
    point: &Point3<f32>,
    width: u32,
    height: u32,
) -> Option<(f32, f32, f32)> {
    let clip = mvp * Vector4::new(point.x, point.y, point.z, 1.0);

    // Prevent division by near-zero or negative w (behind the eye)
    if clip.w < 1e-6 {
        return None;
    }

    let ndc_x = clip.x / clip.w;
    let ndc_y = clip.y / clip.w;
    let depth = clip.z / clip.w;

    // Convert to screen space
    let screen_x = (ndc_x + 1.0) * 0.5 * width as f32;
    let screen_y = (1.0 - ndc_y) * 0.5 * height as f32;

    Some((screen_x, screen_y, depth))
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(800, 600)
    }
}
