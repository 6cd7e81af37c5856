//! Chunk grid coordinates.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Distance metric used to decide which chunks surround a center chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Square neighbourhood: `max(|dx|, |dz|) <= radius`.
    #[default]
    Chebyshev,
    /// Disc neighbourhood: `dx² + dz² <= radius²`.
    Euclidean,
}

impl DistanceMetric {
    /// Check whether an offset in chunks lies within `radius` under this metric.
    #[inline]
    pub const fn contains(self, dx: i64, dz: i64, radius: i32) -> bool {
        let r = radius as i64;
        // The disc lies inside the square, so this also bounds the squares below.
        if dx.abs() > r || dz.abs() > r {
            return false;
        }
        match self {
            Self::Chebyshev => true,
            Self::Euclidean => dx * dx + dz * dz <= r * r,
        }
    }
}

/// Chunk position on the horizontal tile grid.
///
/// Chunk `(x, z)` covers world coordinates
/// `[x * tile_size, (x + 1) * tile_size) × [z * tile_size, (z + 1) * tile_size)`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(C)]
pub struct ChunkKey {
    pub x: i32,
    pub z: i32,
}

impl ChunkKey {
    /// Create a new chunk key
    #[inline]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Get the chunk containing a world-space position.
    ///
    /// Uses floor division so that `-0.5` lands in chunk `-1`. Returns `None`
    /// for non-finite positions and for positions beyond the `i32` chunk grid.
    #[inline]
    pub fn from_world(x: f32, z: f32, tile_size: f32) -> Option<Self> {
        Some(Self::new(
            grid_index(x / tile_size)?,
            grid_index(z / tile_size)?,
        ))
    }

    /// Key offset by `(dx, dz)` chunks, or `None` past the edge of the grid.
    #[inline]
    pub const fn offset(self, dx: i32, dz: i32) -> Option<Self> {
        match (self.x.checked_add(dx), self.z.checked_add(dz)) {
            (Some(x), Some(z)) => Some(Self::new(x, z)),
            _ => None,
        }
    }

    /// Check whether every key within `radius` of `self` exists on the grid.
    #[inline]
    pub const fn fits_neighborhood(self, radius: i32) -> bool {
        radius >= 0
            && self.offset(radius, radius).is_some()
            && self.offset(-radius, -radius).is_some()
    }

    /// World-space minimum corner of this chunk.
    #[inline]
    pub fn origin(self, tile_size: f32) -> Vec2 {
        Vec2::new(self.x as f32 * tile_size, self.z as f32 * tile_size)
    }

    /// Composite integer encoding, `x` in the high half and `z` in the low half.
    #[inline]
    pub const fn packed(self) -> u64 {
        ((self.x as u32 as u64) << 32) | (self.z as u32 as u64)
    }

    /// Inverse of [`ChunkKey::packed`].
    #[inline]
    pub const fn from_packed(packed: u64) -> Self {
        Self::new((packed >> 32) as u32 as i32, packed as u32 as i32)
    }

    /// Chebyshev (chessboard) distance in chunks.
    #[inline]
    pub const fn chebyshev_distance(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dz = self.z.abs_diff(other.z);
        if dx > dz {
            dx
        } else {
            dz
        }
    }

    /// Squared Euclidean distance in chunks, saturating at `i64::MAX`.
    #[inline]
    pub const fn distance_sq(self, other: Self) -> i64 {
        let dx = other.x as i64 - self.x as i64;
        let dz = other.z as i64 - self.z as i64;
        dx.saturating_mul(dx).saturating_add(dz.saturating_mul(dz))
    }

    /// Check whether `other` lies within `radius` chunks of `self`.
    #[inline]
    pub const fn is_within(self, other: Self, radius: i32, metric: DistanceMetric) -> bool {
        metric.contains(
            other.x as i64 - self.x as i64,
            other.z as i64 - self.z as i64,
            radius,
        )
    }

    /// All keys within `radius` chunks of `self`, row by row.
    ///
    /// Keys that would fall off the edge of the grid are skipped.
    pub fn neighborhood(
        self,
        radius: i32,
        metric: DistanceMetric,
    ) -> impl Iterator<Item = ChunkKey> {
        (-radius..=radius).flat_map(move |dz| {
            (-radius..=radius)
                .filter(move |&dx| metric.contains(i64::from(dx), i64::from(dz), radius))
                .filter_map(move |dx| self.offset(dx, dz))
        })
    }

    /// Per-chunk RNG seed derived from the world seed.
    ///
    /// Stable across runs and platforms (splitmix64 finalizer).
    pub const fn seed(self, world_seed: u64) -> u64 {
        let mut h = world_seed ^ self.packed().wrapping_mul(0x9E37_79B9_7F4A_7C15);
        h = (h ^ (h >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h = (h ^ (h >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        h ^ (h >> 31)
    }
}

/// Floor of a grid coordinate as an `i32`, if representable.
fn grid_index(value: f32) -> Option<i32> {
    let floored = value.floor();
    // i32::MAX as f32 rounds up to 2^31, which is out of range.
    (floored >= i32::MIN as f32 && floored < i32::MAX as f32).then_some(floored as i32)
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}
