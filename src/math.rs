//! Math types for SonicField

pub use glam::{Quat, Vec3};

/// Position and orientation in audio space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Origin, facing `-Z` with `+Y` up.
    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * (-Vec3::Z)
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Express a world-space point in this pose's frame as `(right, up, forward)` components.
    pub fn to_local(&self, point: Vec3) -> Vec3 {
        let offset = point - self.position;
        Vec3::new(
            offset.dot(self.right()),
            offset.dot(self.up()),
            offset.dot(self.forward()),
        )
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}
