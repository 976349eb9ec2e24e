use std::{fmt, path::Path, time::Duration};

use bevy::prelude::*;
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::{startup::capability::Quality, systems::ripple::simulation::FieldStrategy};

const DEFAULT_CONFIG_JSON: &str = include_str!("./content/ripple.json");

/// Environment variable naming an optional JSON file that replaces the
/// embedded defaults.
pub const CONFIG_PATH_ENV: &str = "STILL_WATER_CONFIG";

/// Upper bound on `ambient.cols` and `ambient.rows`.
pub const MAX_AMBIENT_OSCILLATORS_PER_AXIS: u32 = 64;

static DEFAULT_CONFIG: Lazy<Result<RippleConfig, ConfigError>> =
    Lazy::new(|| RippleConfig::from_json(DEFAULT_CONFIG_JSON));

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(message) => write!(f, "failed to read ripple config: {message}"),
            Self::Parse(message) => write!(f, "failed to parse ripple config: {message}"),
            Self::Invalid(message) => write!(f, "invalid ripple config: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Resource, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct RippleConfig {
    pub simulation: SimulationConfig,
    pub input: InputConfig,
    pub ambient: AmbientConfig,
    pub compositor: CompositorConfig,
    pub driver: DriverConfig,
    pub overlay: Option<OverlayConfig>,
    pub quality: QualityConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub strategy: FieldStrategy,
    /// Impulse lifetime in ticks.
    pub max_age: u32,
    /// Splat texture texels across the viewport width.
    pub texture_size: u32,
    /// Grid cells across the viewport width.
    pub grid_resolution: u32,
    /// Multiplicative intensity retention per tick, in (0, 1).
    pub decay: f32,
    /// Fraction of the 4-neighbour average blended into each cell per tick.
    pub diffusion: f32,
    /// Injection kernel cut-off, in grid cells.
    pub injection_radius: f32,
    /// Intensity added per unit of impulse magnitude at the kernel centre.
    pub injection_strength: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            strategy: FieldStrategy::Grid,
            max_age: 64,
            texture_size: 64,
            grid_resolution: 256,
            decay: 0.96,
            diffusion: 0.35,
            injection_radius: 6.0,
            injection_strength: 0.05,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    pub min_interval_ms: u64,
    /// Pointer and touch input is ignored on viewports narrower than this.
    pub interaction_min_width: f32,
    pub max_pixel_ratio: f32,
}

impl InputConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 16,
            interaction_min_width: 768.0,
            max_pixel_ratio: 2.0,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AmbientConfig {
    pub enabled: bool,
    pub cols: u32,
    pub rows: u32,
    pub interval_ms: u64,
    pub phase_step: f32,
    /// Oscillator sway as a fraction of the viewport, x then y.
    pub jitter: [f32; 2],
    pub strength_base: f32,
    pub strength_amplitude: f32,
    pub seed: u64,
    pub starter_drops: u32,
    pub starter_strength: f32,
}

impl AmbientConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cols: 6,
            rows: 6,
            interval_ms: 33,
            phase_step: 0.02,
            jitter: [0.01, 0.008],
            strength_base: 0.2,
            strength_amplitude: 0.1,
            seed: 12345,
            starter_drops: 5,
            starter_strength: 8.0,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CompositorConfig {
    /// Largest displacement, in UV units, at full intensity.
    pub max_amplitude: f32,
    pub overlay_strength: f32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            max_amplitude: 0.2,
            overlay_strength: 1.0,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    /// The simulation only schedules ticks on viewports at least this wide.
    pub min_width: f32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { min_width: 600.0 }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OverlayConfig {
    pub text: String,
    /// Font size as a fraction of the viewport height.
    pub font_size_fraction: f32,
    /// sRGBA.
    pub color: [f32; 4],
}

impl OverlayConfig {
    pub fn font_size(&self, viewport_height: f32) -> f32 {
        (viewport_height * self.font_size_fraction).max(1.0)
    }

    pub fn color(&self) -> Color {
        let [red, green, blue, alpha] = self.color;
        Color::srgba(red, green, blue, alpha)
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            text: String::from("still water"),
            font_size_fraction: 0.05,
            color: [1.0, 0.0, 0.0, 1.0],
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct QualityConfig {
    pub force: Option<Quality>,
    pub reduced_below_cores: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            force: None,
            reduced_below_cores: 4,
        }
    }
}

impl RippleConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RippleConfig = serde_json::from_str(json)
            .map_err(|error| ConfigError::Parse(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)
            .map_err(|error| ConfigError::Io(format!("{}: {error}", path.display())))?;
        Self::from_json(&json)
    }

    /// The shipped configuration.
    pub fn embedded() -> Self {
        match DEFAULT_CONFIG.as_ref() {
            Ok(config) => config.clone(),
            Err(error) => {
                warn!("{error}; using built-in defaults");
                Self::default()
            }
        }
    }

    /// Loads the file named by [`CONFIG_PATH_ENV`] when set, otherwise the
    /// shipped configuration. A broken override is logged and ignored.
    pub fn load() -> Self {
        let Some(path) = std::env::var_os(CONFIG_PATH_ENV) else {
            return Self::embedded();
        };

        match Self::from_path(Path::new(&path)) {
            Ok(config) => {
                info!("loaded ripple config from {}", Path::new(&path).display());
                config
            }
            Err(error) => {
                warn!("{error}; falling back to the embedded config");
                Self::embedded()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::Invalid(message.to_string()));

        let simulation = &self.simulation;
        if simulation.max_age == 0 {
            return invalid("simulation.max_age must be > 0");
        }
        if !(1..=1024).contains(&simulation.texture_size) {
            return invalid("simulation.texture_size must be in [1, 1024]");
        }
        if !(1..=2048).contains(&simulation.grid_resolution) {
            return invalid("simulation.grid_resolution must be in [1, 2048]");
        }
        if !(simulation.decay > 0.0 && simulation.decay < 1.0) {
            return invalid("simulation.decay must be in (0, 1)");
        }
        if !(0.0..=1.0).contains(&simulation.diffusion) {
            return invalid("simulation.diffusion must be in [0, 1]");
        }
        if !(simulation.injection_radius > 0.0) {
            return invalid("simulation.injection_radius must be > 0");
        }
        if !(simulation.injection_strength >= 0.0) {
            return invalid("simulation.injection_strength must be >= 0");
        }

        if !(self.input.max_pixel_ratio >= 1.0) {
            return invalid("input.max_pixel_ratio must be >= 1");
        }
        if !(self.input.interaction_min_width >= 0.0) {
            return invalid("input.interaction_min_width must be >= 0");
        }

        let ambient = &self.ambient;
        if ambient.enabled {
            if !(1..=MAX_AMBIENT_OSCILLATORS_PER_AXIS).contains(&ambient.cols)
                || !(1..=MAX_AMBIENT_OSCILLATORS_PER_AXIS).contains(&ambient.rows)
            {
                return invalid("ambient.cols and ambient.rows must be in [1, 64]");
            }
            if ambient.interval_ms == 0 {
                return invalid("ambient.interval_ms must be > 0");
            }
        }
        if !(ambient.starter_strength >= 0.0) {
            return invalid("ambient.starter_strength must be >= 0");
        }

        if !(self.compositor.max_amplitude >= 0.0) {
            return invalid("compositor.max_amplitude must be >= 0");
        }
        if !(0.0..=1.0).contains(&self.compositor.overlay_strength) {
            return invalid("compositor.overlay_strength must be in [0, 1]");
        }

        if !(self.driver.min_width >= 0.0) {
            return invalid("driver.min_width must be >= 0");
        }

        if let Some(overlay) = &self.overlay {
            if !(overlay.font_size_fraction > 0.0 && overlay.font_size_fraction <= 1.0) {
                return invalid("overlay.font_size_fraction must be in (0, 1]");
            }
        }

        Ok(())
    }
}
