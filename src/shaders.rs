use bevy::{
    prelude::*,
    render::render_resource::{AsBindGroup, ShaderRef, ShaderType},
    sprite::Material2d,
};

use crate::{data::config::CompositorConfig, systems::ripple::encode::EncodedField};

/// Full-screen distortion pass. Reads the offscreen scene through the
/// encoded ripple field and composites the overlay on top.
#[derive(Asset, TypePath, AsBindGroup, Debug, Clone)]
pub struct DistortionMaterial {
    #[texture(0)]
    #[sampler(1)]
    pub scene_texture: Handle<Image>,
    #[texture(2)]
    #[sampler(3)]
    pub field_texture: Handle<Image>,
    #[texture(4)]
    #[sampler(5)]
    pub overlay_texture: Option<Handle<Image>>,
    #[uniform(6)]
    pub params: DistortionUniform,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, ShaderType)]
pub struct DistortionUniform {
    pub max_amplitude: f32,
    /// 0 disables the overlay.
    pub overlay_strength: f32,
    pub resolution: Vec2,
}

impl DistortionUniform {
    pub fn new(config: &CompositorConfig, has_overlay: bool, resolution: Vec2) -> Self {
        Self {
            max_amplitude: config.max_amplitude,
            overlay_strength: if has_overlay {
                config.overlay_strength
            } else {
                0.0
            },
            resolution,
        }
    }
}

impl Material2d for DistortionMaterial {
    fn fragment_shader() -> ShaderRef {
        "shaders/ripple_distortion.wgsl".into()
    }
}

// CPU mirror of ripple_distortion.wgsl.

/// Recovers the displacement direction from an encoded texel. The sign is
/// flipped so the image is pushed away from the disturbance.
pub fn decode_direction(texel: Vec4) -> Vec2 {
    -(Vec2::new(texel.x, texel.y) * 2.0 - Vec2::ONE)
}

/// UV offset for one encoded texel.
pub fn displacement(texel: Vec4, max_amplitude: f32) -> Vec2 {
    decode_direction(texel) * texel.z * max_amplitude
}

/// Displaced sampling coordinate, kept half a texel inside the frame.
pub fn displace_uv(uv: Vec2, texel: Vec4, params: &DistortionUniform) -> Vec2 {
    let half_texel = 0.5 / params.resolution.max(Vec2::ONE);
    (uv + displacement(texel, params.max_amplitude)).clamp(half_texel, Vec2::ONE - half_texel)
}

pub fn composite_pixel(
    uv: Vec2,
    field: &EncodedField,
    scene: &impl Fn(Vec2) -> Vec4,
    overlay: Option<&dyn Fn(Vec2) -> Vec4>,
    params: &DistortionUniform,
) -> Vec4 {
    let displaced = displace_uv(uv, field.sample(uv), params);
    let base = scene(displaced);
    let Some(overlay) = overlay else {
        return base.with_w(1.0);
    };
    let top = overlay(displaced);
    let alpha = top.w * params.overlay_strength;
    base.lerp(top, alpha).with_w(1.0)
}

/// Renders a whole frame at `params.resolution`, row-major from the top.
pub fn composite_frame(
    field: &EncodedField,
    scene: &impl Fn(Vec2) -> Vec4,
    overlay: Option<&dyn Fn(Vec2) -> Vec4>,
    params: &DistortionUniform,
) -> Vec<Vec4> {
    let size = params.resolution.max(Vec2::ONE).as_uvec2();
    let mut frame = Vec::with_capacity((size.x * size.y) as usize);
    for y in 0..size.y {
        for x in 0..size.x {
            let uv = (Vec2::new(x as f32, y as f32) + 0.5) / size.as_vec2();
            frame.push(composite_pixel(uv, field, scene, overlay, params));
        }
    }
    frame
}
