//! Chunk data produced by the generator and held by the store.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};
use sylvan_core::ChunkKey;

/// State of a chunk in the loading pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChunkState {
    /// Generation has been scheduled but no result committed yet.
    #[default]
    Pending,
    /// Chunk data is available to renderers.
    Ready,
    /// Chunk left the resident set; its entry has been removed.
    Evicted,
}

/// Square grid of terrain heights covering one chunk, borders included.
#[derive(Debug, Clone, PartialEq)]
pub struct Heightfield {
    resolution: u32,
    tile_size: f32,
    heights: Vec<f32>,
    min_height: f32,
    max_height: f32,
}

impl Heightfield {
    /// Wrap a row-major `(resolution + 1)²` height grid.
    ///
    /// # Panics
    ///
    /// Panics if `resolution` is zero or `heights` does not have exactly
    /// `(resolution + 1)²` entries.
    pub fn new(resolution: u32, tile_size: f32, heights: Vec<f32>) -> Self {
        assert!(resolution >= 1, "heightfield resolution must be at least 1");
        let side = resolution as usize + 1;
        assert_eq!(heights.len(), side * side, "heightfield size mismatch");

        let (min_height, max_height) = heights
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| {
                (lo.min(h), hi.max(h))
            });

        Self {
            resolution,
            tile_size,
            heights,
            min_height,
            max_height,
        }
    }

    /// Cells per edge.
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Samples per edge (`resolution + 1`).
    pub fn side(&self) -> usize {
        self.resolution as usize + 1
    }

    /// Distance between adjacent samples in world units.
    pub fn step(&self) -> f32 {
        self.tile_size / self.resolution as f32
    }

    /// Raw row-major samples.
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    /// Lowest sample.
    pub fn min_height(&self) -> f32 {
        self.min_height
    }

    /// Highest sample.
    pub fn max_height(&self) -> f32 {
        self.max_height
    }

    /// Sample at grid column `i`, row `j`.
    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        let side = self.side();
        (i < side && j < side).then(|| self.heights[j * side + i])
    }

    /// Bilinearly interpolated height at chunk-local coordinates.
    ///
    /// Coordinates are clamped to the tile.
    pub fn height_at(&self, local_x: f32, local_z: f32) -> f32 {
        let res = self.resolution as f32;
        let gx = (local_x / self.step()).clamp(0.0, res);
        let gz = (local_z / self.step()).clamp(0.0, res);

        let i0 = (gx.floor() as u32).min(self.resolution - 1) as usize;
        let j0 = (gz.floor() as u32).min(self.resolution - 1) as usize;
        let tx = gx - i0 as f32;
        let tz = gz - j0 as f32;

        let side = self.side();
        let h00 = self.heights[j0 * side + i0];
        let h10 = self.heights[j0 * side + i0 + 1];
        let h01 = self.heights[(j0 + 1) * side + i0];
        let h11 = self.heights[(j0 + 1) * side + i0 + 1];

        let top = h00 + (h10 - h00) * tx;
        let bottom = h01 + (h11 - h01) * tx;
        top + (bottom - top) * tz
    }
}

/// GPU-friendly per-instance transform for a placed object.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct InstanceTransform {
    /// World-space position, resting on the terrain surface.
    pub position: [f32; 3],
    /// Uniform scale.
    pub scale: f32,
    /// Rotation quaternion (x, y, z, w).
    pub rotation: [f32; 4],
}

impl InstanceTransform {
    /// Instance at `position`, rotated by `yaw` radians about +Y.
    pub fn new(position: Vec3, yaw: f32, scale: f32) -> Self {
        Self {
            position: position.to_array(),
            scale,
            rotation: Quat::from_rotation_y(yaw).to_array(),
        }
    }

    /// World-space position.
    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    /// Rotation quaternion.
    #[inline]
    pub fn rotation(&self) -> Quat {
        Quat::from_array(self.rotation)
    }

    /// Model matrix (scale, then rotate, then translate).
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            self.rotation(),
            self.position(),
        )
    }
}

/// Generated content of one chunk. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkData {
    /// Position in chunk coordinates.
    pub key: ChunkKey,
    /// Terrain surface samples.
    pub heightfield: Heightfield,
    /// Placed vegetation/object instances.
    pub instances: Vec<InstanceTransform>,
}

impl ChunkData {
    /// Check if this chunk has no placed instances.
    pub fn is_bare(&self) -> bool {
        self.instances.is_empty()
    }

    /// Instance transforms as raw bytes, ready for a vertex buffer upload.
    pub fn instance_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.instances)
    }

    /// Get memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.heightfield.heights.capacity() * std::mem::size_of::<f32>()
            + self.instances.capacity() * std::mem::size_of::<InstanceTransform>()
    }
}
