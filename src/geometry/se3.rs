//! SE3: 6-DOF rigid transformation (rotation + translation).
//!
//! Anchor poses are expressed as `SE3` in the session's local frame. The
//! service never interprets poses itself; it only stores them and hands them
//! to the localization engine.

use nalgebra::{UnitQuaternion, Vector3};

/// Rigid transformation: rotation + translation.
///
/// Transforms points as: p' = R * p + t
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// Identity transformation.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Pure translation.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation,
        }
    }

    /// True when every component is finite.
    ///
    /// Engines report NaN poses for anchors that have not resolved yet.
    pub fn is_finite(&self) -> bool {
        self.translation.iter().all(|v| v.is_finite())
            && self.rotation.coords.iter().all(|v| v.is_finite())
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_translation_has_no_rotation() {
        let pose = SE3::from_translation(Vector3::new(1.0, 2.0, 3.0));

        assert_relative_eq!(pose.rotation.angle(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(pose.translation, Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-12);
        assert_eq!(SE3::default(), SE3::identity());
    }

    #[test]
    fn test_is_finite() {
        let rotated = SE3 {
            rotation: UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            translation: Vector3::new(1.0, 2.0, 3.0),
        };
        assert!(rotated.is_finite());

        let unresolved = SE3::from_translation(Vector3::new(f64::NAN, 0.0, 0.0));
        assert!(!unresolved.is_finite());
    }
}
