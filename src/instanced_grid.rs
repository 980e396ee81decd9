//! Instanced grid tiling and infinite scrolling.
//!
//! A single mesh is replicated across a square grid of transforms on the XZ
//! plane. Scrolling moves every instance along one axis and recycles the
//! ones that leave the grid's footprint to the opposite edge, so the grid
//! appears to extend forever.

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::model::MeshPart;
use crate::scene_graph::MeshNode;

/// Horizontal axis a grid scrolls along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScrollAxis {
    X,
    #[default]
    Z,
}

/// Largest grid edge accepted by [`InstancedGrid::new`].
pub const MAX_GRID_SIZE: u32 = 1024;

/// Lay out a `grid_size` x `grid_size` grid of instance matrices.
///
/// `spacing` is the distance between neighbours before scaling; set it to the
/// tile's own size for seamless tiling. Instance `x * grid_size + z` sits at
/// `(-half + x * spacing, 0, -half + z * spacing)` where
/// `half = spacing * grid_size / 2`, using the scaled spacing.
pub fn grid_matrices(grid_size: u32, spacing: f32, scale: f32) -> Vec<Mat4> {
    let spacing = spacing * scale;
    let half = spacing * (grid_size as f32 / 2.0);
    let scale = Vec3::splat(scale);

    let n = grid_size as usize;
    let mut matrices = Vec::with_capacity(n * n);
    for x in 0..grid_size {
        for z in 0..grid_size {
            let translation = Vec3::new(-half + x as f32 * spacing, 0.0, -half + z as f32 * spacing);
            matrices.push(Mat4::from_scale_rotation_translation(scale, Quat::IDENTITY, translation));
        }
    }
    matrices
}

/// One mesh drawn at many transforms.
#[derive(Debug, Clone)]
pub struct InstancedGrid {
    pub mesh: MeshNode,
    matrices: Vec<Mat4>,
    /// Distance between instances 0 and 1 when the grid was laid out.
    spacing: f32,
    needs_update: bool,
}

impl InstancedGrid {
    pub fn new(part: Arc<MeshPart>, grid_size: u32, spacing: f32, scale: f32) -> Result<Self, LoadError> {
        if !spacing.is_finite() || !scale.is_finite() {
            return Err(LoadError::InvalidGrid(format!(
                "spacing {} and scale {} must be finite",
                spacing, scale
            )));
        }
        if grid_size > MAX_GRID_SIZE {
            return Err(LoadError::InvalidGrid(format!(
                "grid size {} exceeds {}",
                grid_size, MAX_GRID_SIZE
            )));
        }
        Ok(Self::from_matrices(part, grid_matrices(grid_size, spacing, scale)))
    }

    /// Wrap existing instance matrices. The spacing is measured from the
    /// first two instances.
    pub fn from_matrices(part: Arc<MeshPart>, matrices: Vec<Mat4>) -> Self {
        let spacing = match (matrices.first(), matrices.get(1)) {
            (Some(a), Some(b)) => translation_of(a).distance(translation_of(b)),
            _ => 0.0,
        };

        Self {
            mesh: MeshNode::new(part),
            matrices,
            spacing,
            needs_update: true,
        }
    }

    pub fn count(&self) -> usize {
        self.matrices.len()
    }

    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    pub fn matrices(&self) -> &[Mat4] {
        &self.matrices
    }

    pub fn matrix_at(&self, index: usize) -> Option<Mat4> {
        self.matrices.get(index).copied()
    }

    pub fn set_matrix_at(&mut self, index: usize, matrix: Mat4) {
        if let Some(slot) = self.matrices.get_mut(index) {
            *slot = matrix;
            self.needs_update = true;
        }
    }

    /// Half the grid's side length; instances live in `[-t, t)` on X and Z.
    pub fn wrap_threshold(&self) -> f32 {
        (self.matrices.len() as f32).sqrt() * self.spacing / 2.0
    }

    /// Move every instance by `speed` along `axis`, recycling instances that
    /// cross the grid's edge to the opposite side.
    pub fn scroll(&mut self, axis: ScrollAxis, speed: f32) {
        if self.matrices.len() < 2 {
            log::debug!("Grid has {} instance(s); nothing to scroll", self.matrices.len());
            return;
        }

        let threshold = self.wrap_threshold();

        for matrix in &mut self.matrices {
            let (scale, rotation, mut position) = matrix.to_scale_rotation_translation();

            match axis {
                ScrollAxis::X => position.x += speed,
                ScrollAxis::Z => position.z += speed,
            }

            // A zero threshold would flip every instance each frame
            if threshold > 0.0 {
                position.x = recycle(position.x, threshold);
                position.z = recycle(position.z, threshold);
            }

            *matrix = Mat4::from_scale_rotation_translation(scale, rotation, position);
        }

        self.needs_update = true;
    }

    /// Returns whether the instance matrices changed since the last call.
    pub fn take_needs_update(&mut self) -> bool {
        std::mem::replace(&mut self.needs_update, false)
    }
}

fn translation_of(matrix: &Mat4) -> Vec3 {
    matrix.w_axis.truncate()
}

fn recycle(mut value: f32, threshold: f32) -> f32 {
    if value >= threshold {
        value -= threshold * 2.0;
    }
    if value < -threshold {
        value += threshold * 2.0;
    }
    value
}
