//! Perspective camera.
//!
//! The camera is a position plus an orientation quaternion. Like most scene
//! graphs it looks down its local -Z axis with +Y up.

use bytemuck::{Pod, Zeroable};
use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::config::CameraConfig;
use crate::scene_graph::Layers;

#[derive(Clone, Debug)]
pub struct Camera {
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub rotation: Quat,
    /// Only meshes sharing a layer with the camera are drawn.
    pub layers: Layers,
}

impl Default for Camera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default(), 1.0)
    }
}

impl Camera {
    pub fn from_config(config: &CameraConfig, aspect: f32) -> Self {
        Self {
            fov_degrees: config.fov_degrees,
            aspect,
            near: config.near,
            far: config.far,
            position: Vec3::from(config.position),
            rotation: Quat::from_euler(EulerRot::XYZ, config.pitch, 0.0, 0.0),
            layers: Layers::default(),
        }
    }

    /// Update the aspect ratio from a surface size. Zero sizes are ignored.
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.aspect = width as f32 / height as f32;
    }

    /// Rotate the camera so it faces `target`.
    pub fn look_at(&mut self, target: Vec3) {
        let forward = target - self.position;
        if forward.length_squared() < 1e-12 {
            return;
        }
        let forward = forward.normalize();

        // Straight up or down: pick another up vector
        let up = if forward.cross(Vec3::Y).length_squared() < 1e-8 {
            Vec3::Z
        } else {
            Vec3::Y
        };

        let view = Mat4::look_at_rh(self.position, target, up);
        self.rotation = Quat::from_mat4(&view.inverse()).normalize();
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// World-to-view transform: the inverse of the camera's world matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }

    /// Right-handed perspective with wgpu's 0..1 depth range.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_degrees.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn to_uniforms(&self) -> CameraUniforms {
        CameraUniforms {
            view_proj: self.view_projection().to_cols_array_2d(),
            position: self.position.extend(1.0).to_array(),
        }
    }
}

/// GPU-ready camera values.
/// Total size: 80 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4], // 64 bytes
    /// World-space camera position, w = 1.
    pub position: [f32; 4], // 16 bytes
}
