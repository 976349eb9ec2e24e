use bevy::math::{Vec2, Vec4};

use crate::data::config::SimulationConfig;

use super::{
    field::{FieldBuffer, GridField, PointField},
    impulse::Impulse,
};

/// Ages every impulse by one tick and retires those past `max_age`.
/// Returns how many were retired.
pub fn advance_points(field: &mut PointField) -> usize {
    let impulses = field.impulses_mut();
    let before = impulses.len();

    // Survivor order is the draw order.
    impulses.retain_mut(|impulse| {
        impulse.age += 1;
        !impulse.is_expired()
    });

    before - impulses.len()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridParams {
    pub decay: f32,
    pub diffusion: f32,
    pub radius: f32,
    pub strength: f32,
}

impl From<&SimulationConfig> for GridParams {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            decay: config.decay,
            diffusion: config.diffusion,
            radius: config.injection_radius,
            strength: config.injection_strength,
        }
    }
}

/// One grid pass: diffuse and decay the current buffer into the other one,
/// inject the queued impulses, then swap.
pub fn advance_grid(field: &mut GridField, params: &GridParams) {
    let pending = field.take_pending();
    let (source, destination) = field.source_and_destination();

    let width = source.width() as i32;
    let height = source.height() as i32;
    for y in 0..height {
        for x in 0..width {
            let center = source.get(x as u32, y as u32);
            let neighbours = (source.get_clamped(x - 1, y)
                + source.get_clamped(x + 1, y)
                + source.get_clamped(x, y - 1)
                + source.get_clamped(x, y + 1))
                * 0.25;
            let mixed = center.lerp(neighbours, params.diffusion);
            let cell = Vec4::new(
                mixed.x * params.decay,
                mixed.y * params.decay,
                mixed.z * params.decay,
                center.w,
            );
            destination.set(x as u32, y as u32, cell);
        }
    }

    for impulse in &pending {
        inject(destination, impulse, params);
    }

    field.swap();
}

/// Gaussian splat of one impulse into `buffer`, cut off at `params.radius`
/// cells.
fn inject(buffer: &mut FieldBuffer, impulse: &Impulse, params: &GridParams) {
    let radius = params.radius.max(f32::EPSILON);
    let sigma = radius * 0.5;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let center = impulse.position * buffer.dims().as_vec2();

    let min_x = (center.x - radius).floor().max(0.0) as u32;
    let min_y = (center.y - radius).floor().max(0.0) as u32;
    let max_x = ((center.x + radius).ceil() as i64).min(buffer.width() as i64 - 1);
    let max_y = ((center.y + radius).ceil() as i64).min(buffer.height() as i64 - 1);
    if max_x < min_x as i64 || max_y < min_y as i64 {
        return;
    }

    for y in min_y..=max_y as u32 {
        for x in min_x..=max_x as u32 {
            let offset = Vec2::new(x as f32 + 0.5, y as f32 + 0.5) - center;
            let distance_sq = offset.length_squared();
            if distance_sq > radius * radius {
                continue;
            }
            let falloff = (-distance_sq / two_sigma_sq).exp();

            // Stationary impulses push radially outward.
            let heading = if impulse.direction != Vec2::ZERO {
                impulse.direction
            } else {
                offset.normalize_or_zero()
            };

            let cell = buffer.get_mut(x, y);
            let velocity = Vec2::new(cell.x, cell.y)
                .lerp(heading, falloff)
                .clamp(Vec2::NEG_ONE, Vec2::ONE);
            cell.x = velocity.x;
            cell.y = velocity.y;
            cell.z = (cell.z + impulse.magnitude * params.strength * falloff).clamp(0.0, 1.0);
        }
    }
}
