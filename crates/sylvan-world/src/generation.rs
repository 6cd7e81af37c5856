//! Procedural chunk generation: heightfield plus scattered instances.

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use sylvan_core::{ChunkKey, Result};

use crate::chunk::{ChunkData, Heightfield, InstanceTransform};
use crate::config::GeneratorConfig;
use crate::noise_field::NoiseField;
use crate::poisson;

/// Anything that can produce the data for a chunk key.
///
/// This is the unit of work executed by the worker dispatcher. Implementations
/// must be pure in `key` so that a retried or regenerated chunk is identical.
pub trait ChunkSource: Send + Sync {
    fn generate(&self, key: ChunkKey) -> Result<ChunkData>;
}

/// Procedural chunk generator using fractal noise and Poisson-disk scattering.
pub struct ChunkGenerator {
    config: GeneratorConfig,
    noise: NoiseField,
}

impl ChunkGenerator {
    /// Create a new chunk generator with the given configuration.
    pub fn new(config: GeneratorConfig) -> Self {
        let noise = NoiseField::new(config.noise.clone());
        Self { config, noise }
    }

    /// Create a chunk generator with default configuration.
    pub fn with_seed(seed: u64) -> Self {
        let mut config = GeneratorConfig::default();
        config.noise.seed = seed;
        Self::new(config)
    }

    /// Get the generator configuration.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Get the underlying noise field.
    pub fn noise(&self) -> &NoiseField {
        &self.noise
    }

    /// Generate a chunk's heightfield and instances at the given key.
    pub fn generate_chunk(&self, key: ChunkKey) -> Result<ChunkData> {
        let tile_size = self.config.tile_size;
        let heights = self
            .noise
            .sample_height_grid(key, tile_size, self.config.resolution)?;
        let heightfield = Heightfield::new(self.config.resolution, tile_size, heights);
        let instances = self.scatter(key)?;

        Ok(ChunkData {
            key,
            heightfield,
            instances,
        })
    }

    /// Place vegetation instances for a chunk.
    fn scatter(&self, key: ChunkKey) -> Result<Vec<InstanceTransform>> {
        let scatter = &self.config.scatter;
        let tile_size = self.config.tile_size;
        let origin = key.origin(tile_size);

        let mut rng = ChaCha8Rng::seed_from_u64(key.seed(self.config.noise.seed));
        let points = poisson::sample_with_rng(
            tile_size,
            scatter.min_distance,
            scatter.max_distance,
            scatter.attempts,
            &mut rng,
        )?;

        let mut instances = Vec::with_capacity(points.len());
        for local in points {
            // Draw every attribute up front so that rejecting one point never
            // shifts the random stream of the points after it.
            let keep_roll: f32 = rng.gen();
            let yaw = rng.gen_range(0.0..std::f32::consts::TAU);
            let scale_roll: f32 = rng.gen();

            let world = origin + local;
            let biome = self.noise.sample_biome(world.x, world.y)?;
            let density = if scatter.moisture_bias == 0.0 {
                1.0
            } else {
                biome.moisture.powf(scatter.moisture_bias)
            };
            if keep_roll >= density {
                continue;
            }

            let height = self.noise.sample_height(world.x, world.y)?;
            if scatter.water_level.is_some_and(|level| height < level) {
                continue;
            }

            // Warmer regions grow slightly larger specimens.
            let t = (scale_roll * 0.75 + biome.temperature * 0.25).clamp(0.0, 1.0);
            let scale = scatter.min_scale + (scatter.max_scale - scatter.min_scale) * t;

            instances.push(InstanceTransform::new(
                Vec3::new(world.x, height, world.y),
                yaw,
                scale,
            ));
        }

        Ok(instances)
    }

    /// Generate multiple chunks in parallel.
    ///
    /// Returns a vector of (key, result) pairs in input order.
    pub fn generate_batch(&self, keys: &[ChunkKey]) -> Vec<(ChunkKey, Result<ChunkData>)> {
        keys.par_iter()
            .map(|&key| (key, self.generate_chunk(key)))
            .collect()
    }
}

impl ChunkSource for ChunkGenerator {
    fn generate(&self, key: ChunkKey) -> Result<ChunkData> {
        self.generate_chunk(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScatterConfig;

    fn small_config(seed: u64) -> GeneratorConfig {
        let mut config = GeneratorConfig {
            tile_size: 32.0,
            resolution: 16,
            ..Default::default()
        };
        config.noise.seed = seed;
        config
    }

    #[test]
    fn generator_deterministic() {
        let gen1 = ChunkGenerator::new(small_config(12345));
        let gen2 = ChunkGenerator::new(small_config(12345));

        for key in [ChunkKey::new(0, 0), ChunkKey::new(-3, 7)] {
            assert_eq!(
                gen1.generate_chunk(key).unwrap(),
                gen2.generate_chunk(key).unwrap()
            );
        }
    }

    #[test]
    fn neighbouring_chunks_share_borders() {
        let gen = ChunkGenerator::new(small_config(77));
        let a = gen.generate_chunk(ChunkKey::new(0, 0)).unwrap();
        let b = gen.generate_chunk(ChunkKey::new(1, 0)).unwrap();

        let side = a.heightfield.side();
        for j in 0..side {
            assert_eq!(a.heightfield.get(side - 1, j), b.heightfield.get(0, j));
        }
    }

    #[test]
    fn instances_lie_inside_chunk_on_surface() {
        let gen = ChunkGenerator::new(small_config(5));
        let key = ChunkKey::new(2, -1);
        let data = gen.generate_chunk(key).unwrap();
        let origin = key.origin(32.0);

        for instance in &data.instances {
            let p = instance.position();
            assert!(p.x >= origin.x && p.x <= origin.x + 32.0);
            assert!(p.z >= origin.y && p.z <= origin.y + 32.0);
            let surface = gen.noise().sample_height(p.x, p.z).unwrap();
            assert_eq!(p.y, surface);
        }
    }

    #[test]
    fn instances_respect_min_distance() {
        let gen = ChunkGenerator::new(small_config(8));
        let data = gen.generate_chunk(ChunkKey::new(0, 0)).unwrap();
        let min_sq = gen.config().scatter.min_distance.powi(2);

        for (i, a) in data.instances.iter().enumerate() {
            for b in &data.instances[i + 1..] {
                let (pa, pb) = (a.position(), b.position());
                let d_sq = (pa.x - pb.x).powi(2) + (pa.z - pb.z).powi(2);
                assert!(d_sq >= min_sq * 0.999);
            }
        }
    }

    #[test]
    fn zero_bias_keeps_every_point() {
        let mut config = small_config(21);
        config.scatter = ScatterConfig {
            moisture_bias: 0.0,
            ..Default::default()
        };
        let gen = ChunkGenerator::new(config.clone());
        let data = gen.generate_chunk(ChunkKey::new(4, 4)).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(ChunkKey::new(4, 4).seed(21));
        let points = poisson::sample_with_rng(
            config.tile_size,
            config.scatter.min_distance,
            config.scatter.max_distance,
            config.scatter.attempts,
            &mut rng,
        )
        .unwrap();
        assert_eq!(data.instances.len(), points.len());
    }

    #[test]
    fn water_level_drops_submerged_points() {
        let mut config = small_config(21);
        config.scatter.moisture_bias = 0.0;
        config.scatter.water_level = Some(f32::MAX);
        let gen = ChunkGenerator::new(config);
        let data = gen.generate_chunk(ChunkKey::new(0, 0)).unwrap();
        assert!(data.is_bare());
    }

    #[test]
    fn scales_stay_in_range() {
        let gen = ChunkGenerator::new(small_config(31));
        let scatter = gen.config().scatter.clone();
        for key in [ChunkKey::new(0, 0), ChunkKey::new(9, -9)] {
            for instance in gen.generate_chunk(key).unwrap().instances {
                assert!(instance.scale >= scatter.min_scale);
                assert!(instance.scale <= scatter.max_scale);
            }
        }
    }

    #[test]
    fn parallel_generation_matches_sequential() {
        let gen = ChunkGenerator::new(small_config(42));
        let keys = vec![ChunkKey::new(0, 0), ChunkKey::new(1, 0), ChunkKey::new(0, 1)];

        let parallel_results = gen.generate_batch(&keys);
        assert_eq!(parallel_results.len(), keys.len());

        for (key, parallel) in parallel_results {
            assert_eq!(parallel.unwrap(), gen.generate_chunk(key).unwrap());
        }
    }
}
