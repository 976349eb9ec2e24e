use std::f32::consts::FRAC_PI_2;

use bevy::math::{UVec2, Vec2, Vec4};

use super::{field::FieldBuffer, impulse::Impulse};

/// Share of an impulse's life spent rising to full intensity.
pub const RISE_FRACTION: f32 = 0.3;

/// Texel with a neutral direction and no intensity.
pub const CLEAR_TEXEL: Vec4 = Vec4::new(0.5, 0.5, 0.0, 1.0);

/// Ease-out-sine rise over the first 30% of life, ease-out-quad fall over
/// the rest.
pub fn envelope(age: u32, max_age: u32) -> f32 {
    if max_age == 0 {
        return 0.0;
    }
    let age = age.min(max_age) as f32;
    let rise = max_age as f32 * RISE_FRACTION;
    let fall = max_age as f32 - rise;

    let value = if age < rise {
        ((age / rise) * FRAC_PI_2).sin()
    } else {
        let t = 1.0 - (age - rise) / fall;
        t * (2.0 - t)
    };
    value.clamp(0.0, 1.0)
}

/// Maps a signed direction into the unit range.
pub fn encode_direction(direction: Vec2) -> Vec2 {
    (direction + Vec2::ONE) * 0.5
}

/// Unit-range RGBA image of the field: `(vx, vy)` remapped, intensity in
/// blue, alpha fixed at 1.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedField {
    width: u32,
    height: u32,
    texels: Vec<Vec4>,
}

impl EncodedField {
    pub fn new(dims: UVec2) -> Self {
        let dims = dims.max(UVec2::ONE);
        Self {
            width: dims.x,
            height: dims.y,
            texels: vec![CLEAR_TEXEL; (dims.x * dims.y) as usize],
        }
    }

    pub fn dims(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    pub fn texels(&self) -> &[Vec4] {
        &self.texels
    }

    /// Changes the dimensions, reusing storage where possible. Returns
    /// `false` when unchanged.
    pub fn resize(&mut self, dims: UVec2) -> bool {
        let dims = dims.max(UVec2::ONE);
        if dims == self.dims() {
            return false;
        }
        self.width = dims.x;
        self.height = dims.y;
        self.texels.clear();
        self.texels.resize((dims.x * dims.y) as usize, CLEAR_TEXEL);
        true
    }

    pub fn clear(&mut self) {
        self.texels.fill(CLEAR_TEXEL);
    }

    pub fn texel(&self, x: u32, y: u32) -> Vec4 {
        self.texels[(y * self.width + x) as usize]
    }

    fn texel_mut(&mut self, x: u32, y: u32) -> &mut Vec4 {
        let index = (y * self.width + x) as usize;
        &mut self.texels[index]
    }

    fn texel_clamped(&self, x: i32, y: i32) -> Vec4 {
        let x = x.clamp(0, self.width as i32 - 1) as u32;
        let y = y.clamp(0, self.height as i32 - 1) as u32;
        self.texel(x, y)
    }

    /// Bilinear sample at `uv`, texel centres at half-integers, edges
    /// clamped.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let position = uv * self.dims().as_vec2() - Vec2::splat(0.5);
        let base = position.floor();
        let fraction = position - base;
        let (x, y) = (base.x as i32, base.y as i32);

        let top = self
            .texel_clamped(x, y)
            .lerp(self.texel_clamped(x + 1, y), fraction.x);
        let bottom = self
            .texel_clamped(x, y + 1)
            .lerp(self.texel_clamped(x + 1, y + 1), fraction.x);
        top.lerp(bottom, fraction.y)
    }

    pub fn total_intensity(&self) -> f32 {
        self.texels.iter().map(|texel| texel.z).sum()
    }

    /// Writes `Rgba8Unorm` bytes into `out`, reusing its allocation.
    pub fn write_rgba8(&self, out: &mut Vec<u8>) {
        out.clear();
        out.reserve(self.texels.len() * 4);
        for texel in &self.texels {
            let bytes = (texel.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
            out.extend_from_slice(&[bytes.x as u8, bytes.y as u8, bytes.z as u8, bytes.w as u8]);
        }
    }
}

/// Soft disc used to rasterize impulses.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplatBrush {
    pub radius: f32,
    pub blur: f32,
}

impl SplatBrush {
    pub fn for_texture(texture_size: u32) -> Self {
        let radius = texture_size as f32 * 0.1;
        Self {
            radius,
            blur: radius * 0.5,
        }
    }

    /// Disc coverage at `distance` texels from the centre.
    pub fn coverage(&self, distance: f32) -> f32 {
        let inner = self.radius - self.blur;
        let outer = self.radius + self.blur;
        let t = ((distance - inner) / (outer - inner).max(f32::EPSILON)).clamp(0.0, 1.0);
        1.0 - t * t * (3.0 - 2.0 * t)
    }
}

/// Rasterizes `impulses` in order (oldest first). Direction channels are
/// blended source-over with alpha `coverage * min(weight, 1)`, intensity
/// adds `coverage * weight` and saturates at 1.
pub fn rasterize_impulses(target: &mut EncodedField, impulses: &[Impulse], brush: &SplatBrush) {
    target.clear();

    let dims = target.dims().as_vec2();
    let reach = brush.radius + brush.blur;

    for impulse in impulses {
        let weight = envelope(impulse.age, impulse.max_age) * impulse.magnitude;
        if weight <= 0.0 {
            continue;
        }
        let alpha_scale = weight.min(1.0);
        let color = encode_direction(impulse.direction);
        let center = impulse.position * dims;

        let min_x = (center.x - reach).floor().max(0.0) as u32;
        let min_y = (center.y - reach).floor().max(0.0) as u32;
        let max_x = ((center.x + reach).ceil() as i64).min(target.width as i64 - 1);
        let max_y = ((center.y + reach).ceil() as i64).min(target.height as i64 - 1);
        if max_x < min_x as i64 || max_y < min_y as i64 {
            continue;
        }

        for y in min_y..=max_y as u32 {
            for x in min_x..=max_x as u32 {
                let distance = (Vec2::new(x as f32 + 0.5, y as f32 + 0.5) - center).length();
                let coverage = brush.coverage(distance);
                if coverage <= 0.0 {
                    continue;
                }
                let alpha = coverage * alpha_scale;
                let texel = target.texel_mut(x, y);
                texel.x += (color.x - texel.x) * alpha;
                texel.y += (color.y - texel.y) * alpha;
                texel.z = (texel.z + coverage * weight).min(1.0);
            }
        }
    }
}

/// Copies the grid buffer into `target` with the same channel meaning as
/// the splat path.
pub fn encode_grid(target: &mut EncodedField, buffer: &FieldBuffer) {
    target.resize(buffer.dims());
    for (texel, cell) in target.texels.iter_mut().zip(buffer.cells()) {
        let direction = encode_direction(Vec2::new(cell.x, cell.y));
        *texel = Vec4::new(direction.x, direction.y, cell.z.clamp(0.0, 1.0), 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_AGE: u32 = 64;

    fn texture() -> EncodedField {
        EncodedField::new(UVec2::new(64, 64))
    }

    fn impulse_at_age(direction: Vec2, magnitude: f32, age: u32) -> Impulse {
        let mut impulse = Impulse::new(Vec2::splat(0.5), direction, magnitude, MAX_AGE);
        impulse.age = age;
        impulse
    }

    #[test]
    fn envelope_stays_in_unit_range() {
        for max_age in [1, 10, 64, 200] {
            for age in 0..=max_age {
                let value = envelope(age, max_age);
                assert!((0.0..=1.0).contains(&value), "envelope({age}, {max_age}) = {value}");
            }
        }
    }

    #[test]
    fn envelope_rises_then_falls() {
        assert!(envelope(0, MAX_AGE) < 1e-6);
        assert!(envelope(19, MAX_AGE) > 0.99);
        assert!(envelope(MAX_AGE, MAX_AGE) < 1e-6);

        let peak = (0..=MAX_AGE)
            .max_by(|a, b| envelope(*a, MAX_AGE).total_cmp(&envelope(*b, MAX_AGE)))
            .expect("range is not empty");
        assert!((19..=20).contains(&peak), "peak at age {peak}");

        for age in 20..MAX_AGE {
            assert!(envelope(age + 1, MAX_AGE) <= envelope(age, MAX_AGE));
        }
    }

    #[test]
    fn envelope_of_zero_lifetime_is_zero() {
        assert_eq!(envelope(0, 0), 0.0);
    }

    #[test]
    fn cleared_texture_is_neutral() {
        let field = texture();
        assert!(field.texels().iter().all(|texel| *texel == CLEAR_TEXEL));
        assert_eq!(field.total_intensity(), 0.0);
    }

    #[test]
    fn splat_colours_direction_and_weight() {
        let mut field = texture();
        let brush = SplatBrush::for_texture(64);
        rasterize_impulses(&mut field, &[impulse_at_age(Vec2::X, 10.0, 19)], &brush);

        let center = field.texel(32, 32);
        assert!((center.x - 1.0).abs() < 1e-5);
        assert!((center.y - 0.5).abs() < 1e-5);
        assert!((center.z - 1.0).abs() < 1e-5);

        assert_eq!(field.texel(0, 0), CLEAR_TEXEL);
    }

    #[test]
    fn splat_is_a_soft_disc() {
        let brush = SplatBrush::for_texture(64);
        assert_eq!(brush.coverage(0.0), 1.0);
        assert_eq!(brush.coverage(brush.radius + brush.blur), 0.0);
        let mid = brush.coverage(brush.radius);
        assert!((mid - 0.5).abs() < 1e-5);
        assert!(brush.coverage(brush.radius - 1.0) > brush.coverage(brush.radius + 1.0));
    }

    #[test]
    fn impulse_at_birth_leaves_no_trace() {
        let mut field = texture();
        rasterize_impulses(
            &mut field,
            &[impulse_at_age(Vec2::X, 10.0, 0)],
            &SplatBrush::for_texture(64),
        );
        assert_eq!(field.total_intensity(), 0.0);
        assert_eq!(field.texel(32, 32), CLEAR_TEXEL);
    }

    #[test]
    fn last_drawn_direction_wins_and_intensity_adds() {
        let brush = SplatBrush::for_texture(64);
        let right = impulse_at_age(Vec2::X, 0.5, 19);
        let left = impulse_at_age(Vec2::NEG_X, 0.5, 19);

        let mut field = texture();
        rasterize_impulses(&mut field, &[right, left], &brush);
        let center = field.texel(32, 32);
        // A weight below 1 only partly covers what is underneath.
        let weight = 0.5 * envelope(19, MAX_AGE);
        let after_right = 0.5 + (1.0 - 0.5) * weight;
        let expected_red = after_right + (0.0 - after_right) * weight;
        assert!((center.x - expected_red).abs() < 1e-4);
        assert!((center.z - 2.0 * weight).abs() < 1e-4);

        let strong_right = impulse_at_age(Vec2::X, 10.0, 19);
        let strong_left = impulse_at_age(Vec2::NEG_X, 10.0, 19);
        rasterize_impulses(&mut field, &[strong_right, strong_left], &brush);
        assert!(field.texel(32, 32).x.abs() < 1e-5);
        rasterize_impulses(&mut field, &[strong_left, strong_right], &brush);
        assert!((field.texel(32, 32).x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn grid_encoding_remaps_channels() {
        let mut buffer = FieldBuffer::new(UVec2::new(4, 2));
        buffer.set(1, 1, Vec4::new(-1.0, 0.5, 0.75, 0.0));
        let mut field = EncodedField::new(UVec2::new(1, 1));
        encode_grid(&mut field, &buffer);

        assert_eq!(field.dims(), UVec2::new(4, 2));
        assert_eq!(field.texel(1, 1), Vec4::new(0.0, 0.75, 0.75, 1.0));
        assert_eq!(field.texel(0, 0), CLEAR_TEXEL);
    }

    #[test]
    fn bilinear_sample_hits_texel_centres() {
        let mut buffer = FieldBuffer::new(UVec2::new(2, 1));
        buffer.set(1, 0, Vec4::new(0.0, 0.0, 1.0, 0.0));
        let mut field = EncodedField::new(UVec2::ONE);
        encode_grid(&mut field, &buffer);

        assert_eq!(field.sample(Vec2::new(0.25, 0.5)).z, 0.0);
        assert_eq!(field.sample(Vec2::new(0.75, 0.5)).z, 1.0);
        assert!((field.sample(Vec2::new(0.5, 0.5)).z - 0.5).abs() < 1e-6);
        assert_eq!(field.sample(Vec2::new(1.0, 0.5)).z, 1.0);
    }

    #[test]
    fn rgba8_bytes_reuse_the_buffer() {
        let field = texture();
        let mut bytes = Vec::with_capacity(64 * 64 * 4);
        let storage = bytes.as_ptr();
        field.write_rgba8(&mut bytes);
        assert_eq!(bytes.len(), 64 * 64 * 4);
        assert_eq!(bytes.as_ptr(), storage);
        assert_eq!(&bytes[..4], &[128, 128, 0, 255]);
    }

    #[test]
    fn same_size_resize_keeps_storage() {
        let mut field = texture();
        let storage = field.texels().as_ptr();
        assert!(!field.resize(UVec2::new(64, 64)));
        assert_eq!(field.texels().as_ptr(), storage);
        assert!(field.resize(UVec2::new(64, 36)));
        assert_eq!(field.texels().len(), 64 * 36);
    }
}
