//! World streaming configuration.

use serde::{Deserialize, Serialize};
use sylvan_core::constants::{
    DEFAULT_HEIGHTFIELD_RESOLUTION, DEFAULT_POISSON_ATTEMPTS, DEFAULT_TILE_SIZE,
    DEFAULT_VIEW_DISTANCE, MAX_VIEW_DISTANCE,
};
use sylvan_core::{DistanceMetric, Error, Result, WorldSeed};

/// Fractal noise parameters for height and biome fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Seed for noise generation.
    pub seed: WorldSeed,
    /// Horizontal scale of terrain features (world units per noise unit).
    pub scale: f64,
    /// Height variation around `base_height`.
    pub amplitude: f64,
    /// Height of a zero noise sample.
    pub base_height: f64,
    /// Number of noise octaves for detail.
    pub octaves: usize,
    /// Frequency multiplier between octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between octaves.
    pub persistence: f64,
    /// Horizontal scale of temperature/moisture regions.
    pub biome_scale: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            scale: 200.0,
            amplitude: 24.0,
            base_height: 0.0,
            octaves: 5,
            lacunarity: 2.0,
            persistence: 0.5,
            biome_scale: 800.0,
        }
    }
}

/// Vegetation scattering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterConfig {
    /// Minimum distance between two placed instances.
    pub min_distance: f32,
    /// Outer radius of the candidate annulus around an active sample.
    pub max_distance: f32,
    /// Candidates tried per active sample.
    pub attempts: u32,
    /// Smallest uniform instance scale.
    pub min_scale: f32,
    /// Largest uniform instance scale.
    pub max_scale: f32,
    /// Exponent applied to moisture to get keep-probability. 0 keeps every point.
    pub moisture_bias: f32,
    /// Points whose terrain height lies below this are dropped.
    pub water_level: Option<f32>,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self {
            min_distance: 4.0,
            max_distance: 8.0,
            attempts: DEFAULT_POISSON_ATTEMPTS,
            min_scale: 0.8,
            max_scale: 1.3,
            moisture_bias: 1.0,
            water_level: None,
        }
    }
}

/// Per-chunk generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Edge length of a chunk in world units.
    pub tile_size: f32,
    /// Heightfield cells per chunk edge; `resolution + 1` samples per edge.
    pub resolution: u32,
    pub noise: NoiseConfig,
    pub scatter: ScatterConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            resolution: DEFAULT_HEIGHTFIELD_RESOLUTION,
            noise: NoiseConfig::default(),
            scatter: ScatterConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Check every parameter, returning the first problem found.
    pub fn validate(&self) -> Result<()> {
        positive("tile_size", f64::from(self.tile_size))?;
        if self.resolution == 0 {
            return Err(Error::InvalidConfig("resolution must be at least 1".into()));
        }

        let noise = &self.noise;
        positive("noise.scale", noise.scale)?;
        positive("noise.biome_scale", noise.biome_scale)?;
        positive("noise.lacunarity", noise.lacunarity)?;
        finite("noise.amplitude", noise.amplitude)?;
        finite("noise.base_height", noise.base_height)?;
        finite("noise.persistence", noise.persistence)?;
        if !(1..=16).contains(&noise.octaves) {
            return Err(Error::InvalidConfig(format!(
                "noise.octaves must be in 1..=16, got {}",
                noise.octaves
            )));
        }

        let scatter = &self.scatter;
        positive("scatter.min_distance", f64::from(scatter.min_distance))?;
        positive("scatter.max_distance", f64::from(scatter.max_distance))?;
        if scatter.max_distance < scatter.min_distance {
            return Err(Error::InvalidConfig(
                "scatter.max_distance must be >= scatter.min_distance".into(),
            ));
        }
        if scatter.attempts == 0 {
            return Err(Error::InvalidConfig("scatter.attempts must be at least 1".into()));
        }
        positive("scatter.min_scale", f64::from(scatter.min_scale))?;
        positive("scatter.max_scale", f64::from(scatter.max_scale))?;
        if scatter.max_scale < scatter.min_scale {
            return Err(Error::InvalidConfig(
                "scatter.max_scale must be >= scatter.min_scale".into(),
            ));
        }
        if !scatter.moisture_bias.is_finite() || scatter.moisture_bias < 0.0 {
            return Err(Error::InvalidConfig(
                "scatter.moisture_bias must be finite and non-negative".into(),
            ));
        }
        if let Some(level) = scatter.water_level {
            finite("scatter.water_level", f64::from(level))?;
        }
        Ok(())
    }
}

/// Configuration for chunk streaming behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Radius in chunks kept resident around the viewer.
    pub view_distance: i32,
    /// How `view_distance` is measured.
    pub metric: DistanceMetric,
    /// Background worker threads.
    pub workers: usize,
    /// Extra attempts after a failed generation before the chunk is given up.
    pub max_retries: u32,
    pub generator: GeneratorConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            view_distance: DEFAULT_VIEW_DISTANCE,
            metric: DistanceMetric::Chebyshev,
            workers: 2,
            max_retries: 1,
            generator: GeneratorConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Edge length of a chunk in world units.
    pub fn tile_size(&self) -> f32 {
        self.generator.tile_size
    }

    /// Check every parameter, returning the first problem found.
    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_VIEW_DISTANCE).contains(&self.view_distance) {
            return Err(Error::InvalidConfig(format!(
                "view_distance must be in 0..={MAX_VIEW_DISTANCE}, got {}",
                self.view_distance
            )));
        }
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be at least 1".into()));
        }
        self.generator.validate()
    }
}

fn finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("{name} must be finite, got {value}")))
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("{name} must be positive, got {value}")))
    }
}
