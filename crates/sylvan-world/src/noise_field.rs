//! Deterministic height and biome sampling over continuous world coordinates.

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use sylvan_core::{ChunkKey, Error, Result};

use crate::config::NoiseConfig;

/// Seed offsets keeping the biome fields decorrelated from height.
const TEMPERATURE_SEED_OFFSET: u32 = 0x5EED_0001;
const MOISTURE_SEED_OFFSET: u32 = 0x5EED_0002;

/// Biome scalars at a world position, both in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biome {
    pub temperature: f32,
    pub moisture: f32,
}

/// Layered fractal noise for terrain height and biome scalars.
///
/// Every sample is a pure function of the world position and the
/// configuration, so neighbouring chunks agree on their shared borders
/// without a stitching pass.
pub struct NoiseField {
    config: NoiseConfig,
    height_noise: Fbm<Perlin>,
    temperature_noise: Fbm<Perlin>,
    moisture_noise: Fbm<Perlin>,
}

impl NoiseField {
    /// Create a new noise field with the given configuration.
    pub fn new(config: NoiseConfig) -> Self {
        // noise seeds are 32-bit; fold the world seed so both halves matter
        let seed = (config.seed ^ (config.seed >> 32)) as u32;

        let height_noise = Fbm::<Perlin>::new(seed)
            .set_octaves(config.octaves)
            .set_lacunarity(config.lacunarity)
            .set_persistence(config.persistence);
        let temperature_noise = Fbm::<Perlin>::new(seed.wrapping_add(TEMPERATURE_SEED_OFFSET))
            .set_octaves(3)
            .set_persistence(0.5);
        let moisture_noise = Fbm::<Perlin>::new(seed.wrapping_add(MOISTURE_SEED_OFFSET))
            .set_octaves(3)
            .set_persistence(0.5);

        Self {
            config,
            height_noise,
            temperature_noise,
            moisture_noise,
        }
    }

    /// Get the noise configuration.
    pub fn config(&self) -> &NoiseConfig {
        &self.config
    }

    /// Terrain height at world XZ coordinates.
    pub fn sample_height(&self, x: f32, z: f32) -> Result<f32> {
        check_coords(x, z)?;
        Ok(self.height_unchecked(f64::from(x), f64::from(z)))
    }

    /// Temperature and moisture at world XZ coordinates.
    pub fn sample_biome(&self, x: f32, z: f32) -> Result<Biome> {
        check_coords(x, z)?;
        let point = [
            f64::from(x) / self.config.biome_scale,
            f64::from(z) / self.config.biome_scale,
        ];
        Ok(Biome {
            temperature: to_unit(self.temperature_noise.get(point)),
            moisture: to_unit(self.moisture_noise.get(point)),
        })
    }

    /// Sample the `(resolution + 1)²` row-major height grid covering a chunk.
    ///
    /// Row `j`, column `i` holds the height at
    /// `((key.x * resolution + i) * step, (key.z * resolution + j) * step)` with
    /// `step = tile_size / resolution`. Grid coordinates are derived from
    /// integer lattice indices, so a chunk's far edge and its neighbour's near
    /// edge are sampled at bit-identical positions.
    pub fn sample_height_grid(
        &self,
        key: ChunkKey,
        tile_size: f32,
        resolution: u32,
    ) -> Result<Vec<f32>> {
        if !tile_size.is_finite() || tile_size <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "tile size must be finite and positive, got {tile_size}"
            )));
        }
        if resolution == 0 {
            return Err(Error::InvalidInput("grid resolution must be at least 1".into()));
        }

        let res = i64::from(resolution);
        let step = f64::from(tile_size) / res as f64;
        let side = resolution as usize + 1;
        let mut heights = Vec::with_capacity(side * side);
        for j in 0..=res {
            let z = (i64::from(key.z) * res + j) as f64 * step;
            for i in 0..=res {
                let x = (i64::from(key.x) * res + i) as f64 * step;
                heights.push(self.height_unchecked(x, z));
            }
        }
        Ok(heights)
    }

    fn height_unchecked(&self, x: f64, z: f64) -> f32 {
        let nx = x / self.config.scale;
        let nz = z / self.config.scale;
        let noise_value = self.height_noise.get([nx, nz]);
        (self.config.base_height + noise_value * self.config.amplitude) as f32
    }
}

fn check_coords(x: f32, z: f32) -> Result<()> {
    if x.is_finite() && z.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "sample coordinates must be finite, got ({x}, {z})"
        )))
    }
}

/// Map a roughly `[-1, 1]` noise value into `[0, 1]`.
fn to_unit(value: f64) -> f32 {
    ((value + 1.0) * 0.5).clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(seed: u64) -> NoiseField {
        NoiseField::new(NoiseConfig {
            seed,
            ..Default::default()
        })
    }

    #[test]
    fn generator_deterministic() {
        let a = field(12345);
        let b = field(12345);

        for x in -50..50 {
            for z in -50..50 {
                let (x, z) = (x as f32 * 3.7, z as f32 * 5.3);
                let h = a.sample_height(x, z).unwrap();
                assert_eq!(h.to_bits(), a.sample_height(x, z).unwrap().to_bits());
                assert_eq!(h.to_bits(), b.sample_height(x, z).unwrap().to_bits());
            }
        }
    }

    #[test]
    fn different_seeds_different_terrain() {
        let a = field(12345);
        let b = field(54321);

        let mut differences = 0;
        for x in 0..10 {
            for z in 0..10 {
                let (x, z) = (x as f32 * 17.0 + 0.5, z as f32 * 17.0 + 0.5);
                if a.sample_height(x, z).unwrap() != b.sample_height(x, z).unwrap() {
                    differences += 1;
                }
            }
        }
        assert!(differences > 50, "Seeds should produce different terrain");
    }

    #[test]
    fn height_stays_near_amplitude() {
        let f = field(7);
        let config = f.config().clone();
        let bound = (config.base_height + config.amplitude * 2.0) as f32;
        for i in 0..200 {
            let h = f.sample_height(i as f32 * 13.1, i as f32 * -7.9).unwrap();
            assert!(h.abs() <= bound, "height {h} outside +/-{bound}");
        }
    }

    #[test]
    fn biome_is_normalized() {
        let f = field(99);
        for i in 0..200 {
            let biome = f.sample_biome(i as f32 * 41.0, i as f32 * 23.0).unwrap();
            assert!((0.0..=1.0).contains(&biome.temperature));
            assert!((0.0..=1.0).contains(&biome.moisture));
        }
    }

    #[test]
    fn biome_channels_are_independent() {
        let f = field(3);
        let mut differing = 0;
        for i in 0..50 {
            let b = f.sample_biome(i as f32 * 97.0 + 0.3, i as f32 * 61.0 + 0.7).unwrap();
            if (b.temperature - b.moisture).abs() > 1e-4 {
                differing += 1;
            }
        }
        assert!(differing > 40);
    }

    #[test]
    fn rejects_non_finite_coordinates() {
        let f = field(0);
        assert!(matches!(f.sample_height(f32::NAN, 0.0), Err(Error::InvalidInput(_))));
        assert!(matches!(f.sample_height(0.0, f32::INFINITY), Err(Error::InvalidInput(_))));
        assert!(matches!(
            f.sample_biome(f32::NEG_INFINITY, 1.0),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn grid_matches_point_samples() {
        let f = field(5);
        // tile 16 / resolution 8 gives an exact step of 2 world units
        let key = ChunkKey::new(-4, 8);
        let grid = f.sample_height_grid(key, 16.0, 8).unwrap();
        assert_eq!(grid.len(), 81);
        for j in 0..9 {
            for i in 0..9 {
                let expected = f
                    .sample_height(-64.0 + i as f32 * 2.0, 128.0 + j as f32 * 2.0)
                    .unwrap();
                assert_eq!(grid[j * 9 + i].to_bits(), expected.to_bits());
            }
        }
    }

    #[test]
    fn grid_borders_agree_between_neighbours() {
        let f = field(11);
        // awkward step that is not representable exactly
        let (tile, res) = (10.0, 3);
        let side = res as usize + 1;
        let left = f.sample_height_grid(ChunkKey::new(2, -1), tile, res).unwrap();
        let right = f.sample_height_grid(ChunkKey::new(3, -1), tile, res).unwrap();
        let below = f.sample_height_grid(ChunkKey::new(2, 0), tile, res).unwrap();
        for j in 0..side {
            assert_eq!(left[j * side + res as usize], right[j * side]);
        }
        for i in 0..side {
            assert_eq!(left[(side - 1) * side + i], below[i]);
        }
    }

    #[test]
    fn grid_rejects_bad_parameters() {
        let f = field(5);
        assert!(f.sample_height_grid(ChunkKey::default(), 0.0, 4).is_err());
        assert!(f.sample_height_grid(ChunkKey::default(), f32::NAN, 4).is_err());
        assert!(f.sample_height_grid(ChunkKey::default(), 8.0, 0).is_err());
    }
}
