use bevy::{log::trace, math::UVec2};
use serde::Deserialize;

use crate::data::config::SimulationConfig;

use super::{
    encode::{encode_grid, rasterize_impulses, EncodedField, SplatBrush},
    evolve::{advance_grid, advance_points, GridParams},
    field::{GridField, PointField, Viewport},
    impulse::Impulse,
};

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldStrategy {
    /// Aging point impulses rasterized as soft splats.
    Splat,
    /// Ping-pong grid with decay, diffusion and kernel injection.
    #[default]
    Grid,
}

impl FieldStrategy {
    /// Dimensions of the encoded texture this strategy produces.
    pub fn texture_dims(self, config: &SimulationConfig, viewport: &Viewport) -> UVec2 {
        let across = match self {
            Self::Splat => config.texture_size,
            Self::Grid => config.grid_resolution,
        };
        viewport.field_dims(across).max(UVec2::ONE)
    }
}

/// A ripple field that can be fed, advanced and encoded.
pub trait FieldSimulation: Send + Sync {
    fn strategy(&self) -> FieldStrategy;

    fn add_impulse(&mut self, impulse: Impulse);

    /// Returns `true` when storage was reallocated.
    fn resize(&mut self, viewport: &Viewport) -> bool;

    /// Advances the field by one tick.
    fn tick(&mut self);

    /// Encodes the latest state and returns the texture.
    fn encode(&mut self) -> &EncodedField;

    /// Texture from the last `encode`.
    fn encoded(&self) -> &EncodedField;

    fn total_intensity(&self) -> f32 {
        self.encoded().total_intensity()
    }
}

pub struct SplatSimulation {
    points: PointField,
    encoded: EncodedField,
    brush: SplatBrush,
    texture_size: u32,
}

impl SplatSimulation {
    pub fn new(texture_size: u32, viewport: &Viewport) -> Self {
        Self {
            points: PointField::new(),
            encoded: EncodedField::new(viewport.field_dims(texture_size)),
            brush: SplatBrush::for_texture(texture_size),
            texture_size,
        }
    }

    pub fn points(&self) -> &PointField {
        &self.points
    }
}

impl FieldSimulation for SplatSimulation {
    fn strategy(&self) -> FieldStrategy {
        FieldStrategy::Splat
    }

    fn add_impulse(&mut self, impulse: Impulse) {
        self.points.add_impulse(impulse);
    }

    fn resize(&mut self, viewport: &Viewport) -> bool {
        self.encoded.resize(viewport.field_dims(self.texture_size))
    }

    fn tick(&mut self) {
        let retired = advance_points(&mut self.points);
        if retired > 0 {
            trace!("retired {retired} impulses, {} active", self.points.len());
        }
    }

    fn encode(&mut self) -> &EncodedField {
        rasterize_impulses(&mut self.encoded, self.points.impulses(), &self.brush);
        &self.encoded
    }

    fn encoded(&self) -> &EncodedField {
        &self.encoded
    }
}

pub struct GridSimulation {
    grid: GridField,
    encoded: EncodedField,
    params: GridParams,
}

impl GridSimulation {
    pub fn new(config: &SimulationConfig, viewport: &Viewport) -> Self {
        let grid = GridField::new(config.grid_resolution, viewport);
        let encoded = EncodedField::new(grid.dims());
        Self {
            grid,
            encoded,
            params: GridParams::from(config),
        }
    }

    pub fn grid(&self) -> &GridField {
        &self.grid
    }
}

impl FieldSimulation for GridSimulation {
    fn strategy(&self) -> FieldStrategy {
        FieldStrategy::Grid
    }

    fn add_impulse(&mut self, impulse: Impulse) {
        self.grid.add_impulse(impulse);
    }

    fn resize(&mut self, viewport: &Viewport) -> bool {
        let resized = self.grid.resize(viewport);
        if resized {
            self.encoded.resize(self.grid.dims());
        }
        resized
    }

    fn tick(&mut self) {
        advance_grid(&mut self.grid, &self.params);
    }

    fn encode(&mut self) -> &EncodedField {
        encode_grid(&mut self.encoded, self.grid.current_buffer());
        &self.encoded
    }

    fn encoded(&self) -> &EncodedField {
        &self.encoded
    }
}

pub fn build_simulation(
    strategy: FieldStrategy,
    config: &SimulationConfig,
    viewport: &Viewport,
) -> Box<dyn FieldSimulation> {
    match strategy {
        FieldStrategy::Splat => Box::new(SplatSimulation::new(config.texture_size, viewport)),
        FieldStrategy::Grid => Box::new(GridSimulation::new(config, viewport)),
    }
}

#[cfg(test)]
mod tests {
    use bevy::math::Vec2;

    use super::*;

    fn viewport(width: f32, height: f32) -> Viewport {
        Viewport::new(width, height, 1.0, 2.0)
    }

    #[test]
    fn builds_the_requested_strategy() {
        let config = SimulationConfig::default();
        for strategy in [FieldStrategy::Splat, FieldStrategy::Grid] {
            let simulation = build_simulation(strategy, &config, &viewport(800.0, 600.0));
            assert_eq!(simulation.strategy(), strategy);
        }
    }

    #[test]
    fn texture_dims_match_the_built_simulation() {
        let config = SimulationConfig::default();
        let viewport = viewport(1280.0, 720.0);
        for strategy in [FieldStrategy::Splat, FieldStrategy::Grid] {
            let simulation = build_simulation(strategy, &config, &viewport);
            assert_eq!(strategy.texture_dims(&config, &viewport), simulation.encoded().dims());
        }
    }

    #[test]
    fn splat_texture_follows_viewport_aspect() {
        let mut simulation = SplatSimulation::new(64, &viewport(1280.0, 640.0));
        assert_eq!(simulation.encoded().dims(), UVec2::new(64, 32));
        assert!(!simulation.resize(&viewport(1280.0, 640.0)));
        assert!(simulation.resize(&viewport(640.0, 640.0)));
        assert_eq!(simulation.encode().dims(), UVec2::new(64, 64));
    }

    #[test]
    fn grid_noop_resize_keeps_dimensions() {
        let config = SimulationConfig {
            grid_resolution: 96,
            ..SimulationConfig::default()
        };
        let mut simulation = GridSimulation::new(&config, &viewport(960.0, 540.0));
        let dims = simulation.grid().dims();
        let encoded = simulation.encoded().texels().as_ptr();

        assert!(!simulation.resize(&viewport(960.0, 540.0)));
        assert!(!simulation.resize(&viewport(960.0, 540.0)));

        assert_eq!(simulation.grid().dims(), dims);
        assert_eq!(simulation.encoded().texels().as_ptr(), encoded);
    }

    #[test]
    fn grid_encode_reflects_injected_impulse() {
        let config = SimulationConfig {
            grid_resolution: 32,
            ..SimulationConfig::default()
        };
        let mut simulation = GridSimulation::new(&config, &viewport(320.0, 320.0));
        simulation.add_impulse(Impulse::new(Vec2::splat(0.5), Vec2::Y, 10.0, 64));
        simulation.tick();
        let encoded = simulation.encode();

        let texel = encoded.texel(16, 16);
        assert!(texel.z > 0.0);
        assert!(texel.y > 0.9);
        assert!((texel.x - 0.5).abs() < 1e-5);
    }

    #[test]
    fn splat_tick_retires_old_impulses() {
        let mut simulation = SplatSimulation::new(64, &viewport(640.0, 640.0));
        simulation.add_impulse(Impulse::new(Vec2::splat(0.5), Vec2::X, 1.0, 2));
        for _ in 0..3 {
            simulation.tick();
        }
        assert!(simulation.points().is_empty());
        assert_eq!(simulation.encode().total_intensity(), 0.0);
    }
}
