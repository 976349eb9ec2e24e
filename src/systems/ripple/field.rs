use bevy::{
    math::{UVec2, Vec2, Vec4},
    window::Window,
};
use smallvec::SmallVec;

use super::impulse::Impulse;

/// Largest field extent along either axis.
pub const MAX_FIELD_EXTENT: u32 = 2048;

/// Current viewport in logical pixels plus the effective pixel ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub pixel_ratio: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32, scale_factor: f32, max_pixel_ratio: f32) -> Self {
        Self {
            width: width.max(0.0),
            height: height.max(0.0),
            pixel_ratio: scale_factor.clamp(1.0, max_pixel_ratio.max(1.0)),
        }
    }

    pub fn from_window(window: &Window, max_pixel_ratio: f32) -> Self {
        Self::new(
            window.width(),
            window.height(),
            window.scale_factor(),
            max_pixel_ratio,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width < 1.0 || self.height < 1.0
    }

    pub fn logical_size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    pub fn physical_size(&self) -> UVec2 {
        (self.logical_size() * self.pixel_ratio)
            .round()
            .max(Vec2::ONE)
            .as_uvec2()
    }

    /// Grid dimensions with `across` cells spanning the width and square
    /// cells down the height, each axis capped at [`MAX_FIELD_EXTENT`].
    pub fn field_dims(&self, across: u32) -> UVec2 {
        let across = across.clamp(1, MAX_FIELD_EXTENT);
        if self.is_empty() {
            return UVec2::new(across, across);
        }
        let down = (across as f32 * self.height / self.width)
            .round()
            .clamp(1.0, MAX_FIELD_EXTENT as f32) as u32;
        UVec2::new(across, down)
    }
}

/// One grid of `(vx, vy, intensity, reserved)` cells.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldBuffer {
    width: u32,
    height: u32,
    cells: Vec<Vec4>,
}

impl FieldBuffer {
    pub fn new(dims: UVec2) -> Self {
        let dims = dims.max(UVec2::ONE);
        Self {
            width: dims.x,
            height: dims.y,
            cells: vec![Vec4::ZERO; (dims.x * dims.y) as usize],
        }
    }

    pub fn dims(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cells(&self) -> &[Vec4] {
        &self.cells
    }

    pub fn storage_ptr(&self) -> *const Vec4 {
        self.cells.as_ptr()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    pub fn get(&self, x: u32, y: u32) -> Vec4 {
        self.cells[self.index(x, y)]
    }

    /// Reads with coordinates clamped to the grid edge.
    pub fn get_clamped(&self, x: i32, y: i32) -> Vec4 {
        let x = x.clamp(0, self.width as i32 - 1) as u32;
        let y = y.clamp(0, self.height as i32 - 1) as u32;
        self.get(x, y)
    }

    pub fn get_mut(&mut self, x: u32, y: u32) -> &mut Vec4 {
        let index = self.index(x, y);
        &mut self.cells[index]
    }

    pub fn set(&mut self, x: u32, y: u32, cell: Vec4) {
        let index = self.index(x, y);
        self.cells[index] = cell;
    }

    pub fn total_intensity(&self) -> f32 {
        self.cells.iter().map(|cell| cell.z).sum()
    }
}

/// Point-impulse field state for the splat strategy.
#[derive(Clone, Debug, Default)]
pub struct PointField {
    impulses: Vec<Impulse>,
}

impl PointField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_impulse(&mut self, impulse: Impulse) {
        self.impulses.push(impulse);
    }

    /// Active impulses, oldest first.
    pub fn impulses(&self) -> &[Impulse] {
        &self.impulses
    }

    pub(super) fn impulses_mut(&mut self) -> &mut Vec<Impulse> {
        &mut self.impulses
    }

    pub fn len(&self) -> usize {
        self.impulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.impulses.is_empty()
    }
}

/// Ping-pong grid state: two owned buffers and the index of the current one.
#[derive(Clone, Debug)]
pub struct GridField {
    buffers: [FieldBuffer; 2],
    current: usize,
    resolution: u32,
    pending: SmallVec<[Impulse; 16]>,
}

impl GridField {
    pub fn new(resolution: u32, viewport: &Viewport) -> Self {
        let dims = viewport.field_dims(resolution);
        Self {
            buffers: [FieldBuffer::new(dims), FieldBuffer::new(dims)],
            current: 0,
            resolution,
            pending: SmallVec::new(),
        }
    }

    pub fn dims(&self) -> UVec2 {
        self.buffers[self.current].dims()
    }

    /// Queues an impulse for injection on the next tick.
    pub fn add_impulse(&mut self, impulse: Impulse) {
        self.pending.push(impulse);
    }

    pub fn pending(&self) -> &[Impulse] {
        &self.pending
    }

    pub fn current_buffer(&self) -> &FieldBuffer {
        &self.buffers[self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Reallocates both buffers when the derived dimensions change. Prior
    /// contents are discarded; an unchanged size is a no-op.
    pub fn resize(&mut self, viewport: &Viewport) -> bool {
        let dims = viewport.field_dims(self.resolution);
        if dims == self.dims() {
            return false;
        }
        self.buffers = [FieldBuffer::new(dims), FieldBuffer::new(dims)];
        self.current = 0;
        true
    }

    pub(super) fn take_pending(&mut self) -> SmallVec<[Impulse; 16]> {
        std::mem::take(&mut self.pending)
    }

    /// Current buffer to read and the other buffer to write.
    pub(super) fn source_and_destination(&mut self) -> (&FieldBuffer, &mut FieldBuffer) {
        let (first, second) = self.buffers.split_at_mut(1);
        if self.current == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        }
    }

    pub(super) fn swap(&mut self) {
        self.current = 1 - self.current;
    }
}
