/// Garment root transforms and rotation state
use std::f32::consts::TAU;
use std::time::Duration;

use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};

/// Rotation state around three axes (in radians)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationState {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl RotationState {
    pub fn zero() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Rotate by delta amounts (in radians)
    pub fn rotate(&mut self, dx: f32, dy: f32, dz: f32) {
        self.x = (self.x + dx).rem_euclid(TAU);
        self.y = (self.y + dy).rem_euclid(TAU);
        self.z = (self.z + dz).rem_euclid(TAU);
    }

    /// Spin about the vertical axis by `speed` radians per second of
    /// elapsed time.
    pub fn advance(&mut self, elapsed: Duration, speed: f32) {
        self.rotate(0.0, elapsed.as_secs_f32() * speed, 0.0);
    }
}

impl Default for RotationState {
    fn default() -> Self {
        Self::zero()
    }
}

/// Transform builder for 3D transformations
pub struct Transform;

impl Transform {
    /// Create a rotation matrix from a rotation state
    pub fn rotation_matrix(rotation: &RotationState) -> Matrix4<f32> {
        let rx = Matrix4::new_rotation(Vector3::new(rotation.x, 0.0, 0.0));
        let ry = Matrix4::new_rotation(Vector3::new(0.0, rotation.y, 0.0));
        let rz = Matrix4::new_rotation(Vector3::new(0.0, 0.0, rotation.z));

        // Apply rotations in order: Z, Y, X
        rz * ry * rx
    }

    /// Garment root transform: the asset is offset inside its group, the
    /// group is uniformly scaled and then spun by the rotation state.
    pub fn garment_matrix(
        offset: &Vector3<f32>,
        scale: f32,
        rotation: &RotationState,
    ) -> Matrix4<f32> {
        Self::rotation_matrix(rotation)
            * Matrix4::new_scaling(scale)
            * Matrix4::new_translation(offset)
    }

    /// Map the unit projection box `[-0.5, 0.5]^3` onto a decal volume.
    pub fn box_matrix(
        origin: &Point3<f32>,
        orientation: &UnitQuaternion<f32>,
        extents: &Vector3<f32>,
    ) -> Matrix4<f32> {
        Matrix4::new_translation(&origin.coords)
            * orientation.to_homogeneous()
            * Matrix4::new_nonuniform_scaling(extents)
    }

    /// Create a model-view-projection matrix
    pub fn mvp_matrix(
        model: &Matrix4<f32>,
        view: &Matrix4<f32>,
        projection: &Matrix4<f32>,
    ) -> Matrix4<f32> {
        projection * view * model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_rotation_state() {
        let mut state = RotationState::zero();
        assert_eq!(state.x, 0.0);
        assert_eq!(state.y, 0.0);
        assert_eq!(state.z, 0.0);

        state.rotate(0.1, 0.2, 0.3);
        assert!((state.x - 0.1).abs() < 1e-6);
        assert!((state.y - 0.2).abs() < 1e-6);
        assert!((state.z - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_advance_uses_elapsed_time() {
        // Two half-second frames and one full-second frame land on the
        // same angle.
        let mut stepped = RotationState::zero();
        stepped.advance(Duration::from_millis(500), 0.3);
        stepped.advance(Duration::from_millis(500), 0.3);

        let mut single = RotationState::zero();
        single.advance(Duration::from_secs(1), 0.3);

        assert!((stepped.y - single.y).abs() < 1e-6);
        assert!((single.y - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_wraps() {
        let mut state = RotationState::zero();
        state.rotate(0.0, 3.0 * PI, 0.0);
        assert!((state.y - PI).abs() < 1e-5);
    }

    #[test]
    fn test_identity_rotation() {
        let rotation = RotationState::zero();
        let matrix = Transform::rotation_matrix(&rotation);
        assert!((matrix - Matrix4::identity()).norm() < 1e-6);
    }

    #[test]
    fn test_garment_matrix_offsets_before_scaling() {
        let offset = Vector3::new(0.0, 0.1, 0.0);
        let matrix = Transform::garment_matrix(&offset, 9.0, &RotationState::zero());
        let p = matrix.transform_point(&Point3::origin());
        assert!((p - Point3::new(0.0, 0.9, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn test_box_matrix_maps_unit_corners() {
        let matrix = Transform::box_matrix(
            &Point3::new(1.0, 2.0, 3.0),
            &UnitQuaternion::identity(),
            &Vector3::new(0.2, 0.4, 0.6),
        );
        let corner = matrix.transform_point(&Point3::new(0.5, 0.5, 0.5));
        assert!((corner - Point3::new(1.1, 2.2, 3.3)).norm() < 1e-5);
    }
}
