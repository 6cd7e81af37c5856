//! Poisson-disk sampling over a square tile (Bridson's algorithm).

use std::f32::consts::{SQRT_2, TAU};

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sylvan_core::constants::DEFAULT_POISSON_ATTEMPTS;
use sylvan_core::{Error, Result};

/// Sampler parameters besides the tile geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoissonConfig {
    /// RNG seed; the same tile and seed always yield the same points.
    pub seed: u64,
    /// Candidates tried around an active sample before it is retired.
    pub attempts: u32,
}

impl Default for PoissonConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            attempts: DEFAULT_POISSON_ATTEMPTS,
        }
    }
}

impl PoissonConfig {
    /// Default attempts with an explicit seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }
}

/// Sample points in `[0, tile_size)²` with pairwise distance `>= min_distance`.
///
/// Candidates are drawn from the annulus `[min_distance, max_distance]`
/// around a random active sample.
pub fn sample(
    tile_size: f32,
    min_distance: f32,
    max_distance: f32,
    config: &PoissonConfig,
) -> Result<Vec<Vec2>> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    sample_with_rng(tile_size, min_distance, max_distance, config.attempts, &mut rng)
}

/// Same as [`sample`], drawing from a caller-owned RNG.
///
/// The chunk generator uses this to keep one RNG stream per chunk for both
/// placement and per-instance attributes.
pub fn sample_with_rng<R: Rng>(
    tile_size: f32,
    min_distance: f32,
    max_distance: f32,
    attempts: u32,
    rng: &mut R,
) -> Result<Vec<Vec2>> {
    validate(tile_size, min_distance, max_distance)?;

    let random_point = |rng: &mut R| {
        Vec2::new(rng.gen_range(0.0..tile_size), rng.gen_range(0.0..tile_size))
    };

    // No two points in the tile can be this far apart.
    if min_distance >= tile_size * SQRT_2 {
        return Ok(vec![random_point(&mut *rng)]);
    }

    let mut grid = BackgroundGrid::new(tile_size, min_distance);
    let mut points = Vec::with_capacity(grid.capacity());
    let mut active = Vec::new();

    let first = random_point(&mut *rng);
    grid.insert(first, points.len());
    active.push(points.len());
    points.push(first);

    let min_sq = min_distance * min_distance;
    while !active.is_empty() {
        let slot = rng.gen_range(0..active.len());
        let origin = points[active[slot]];

        let mut placed = false;
        for _ in 0..attempts {
            let angle = rng.gen_range(0.0..TAU);
            let radius = if max_distance > min_distance {
                rng.gen_range(min_distance..=max_distance)
            } else {
                min_distance
            };
            let candidate = origin + Vec2::from_angle(angle) * radius;

            if !in_tile(candidate, tile_size) || !grid.is_clear(candidate, &points, min_sq) {
                continue;
            }

            grid.insert(candidate, points.len());
            active.push(points.len());
            points.push(candidate);
            placed = true;
            break;
        }

        if !placed {
            active.swap_remove(slot);
        }
    }

    Ok(points)
}

fn validate(tile_size: f32, min_distance: f32, max_distance: f32) -> Result<()> {
    for (name, value) in [
        ("tile_size", tile_size),
        ("min_distance", min_distance),
        ("max_distance", max_distance),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "{name} must be finite and positive, got {value}"
            )));
        }
    }
    if max_distance < min_distance {
        return Err(Error::InvalidInput(format!(
            "max_distance ({max_distance}) must be >= min_distance ({min_distance})"
        )));
    }
    Ok(())
}

#[inline]
fn in_tile(p: Vec2, tile_size: f32) -> bool {
    p.x >= 0.0 && p.y >= 0.0 && p.x < tile_size && p.y < tile_size
}

/// Acceleration grid with cell diagonal equal to the minimum distance, so
/// each cell holds at most one sample.
struct BackgroundGrid {
    cell_size: f32,
    width: usize,
    cells: Vec<Option<usize>>,
}

impl BackgroundGrid {
    fn new(tile_size: f32, min_distance: f32) -> Self {
        let cell_size = min_distance / SQRT_2;
        let width = ((tile_size / cell_size).ceil() as usize).max(1);
        Self {
            cell_size,
            width,
            cells: vec![None; width * width],
        }
    }

    fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn cell_of(&self, p: Vec2) -> (usize, usize) {
        let max = self.width - 1;
        let cx = ((p.x / self.cell_size) as usize).min(max);
        let cy = ((p.y / self.cell_size) as usize).min(max);
        (cx, cy)
    }

    fn insert(&mut self, p: Vec2, index: usize) {
        let (cx, cy) = self.cell_of(p);
        self.cells[cy * self.width + cx] = Some(index);
    }

    /// True when no stored sample lies within `sqrt(min_sq)` of `p`.
    fn is_clear(&self, p: Vec2, points: &[Vec2], min_sq: f32) -> bool {
        let (cx, cy) = self.cell_of(p);
        // A conflicting sample can be at most two cells away.
        let x0 = cx.saturating_sub(2);
        let y0 = cy.saturating_sub(2);
        let x1 = (cx + 2).min(self.width - 1);
        let y1 = (cy + 2).min(self.width - 1);

        for y in y0..=y1 {
            for x in x0..=x1 {
                if let Some(index) = self.cells[y * self.width + x] {
                    if points[index].distance_squared(p) < min_sq {
                        return false;
                    }
                }
            }
        }
        true
    }
}
