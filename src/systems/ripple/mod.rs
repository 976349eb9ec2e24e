use bevy::{
    asset::RenderAssetUsages,
    ecs::{component::HookContext, world::DeferredWorld},
    image::ImageSampler,
    input::touch::{TouchInput, TouchPhase},
    prelude::*,
    render::render_resource::{Extent3d, TextureDimension, TextureFormat},
    window::{CursorLeft, CursorMoved, PrimaryWindow},
};
use smallvec::SmallVec;

use crate::{data::config::RippleConfig, shaders::DistortionMaterial};

pub mod driver;
pub mod encode;
pub mod evolve;
pub mod field;
pub mod impulse;
pub mod simulation;


use driver::{DriverError, FrameDriver, RunPolicy, TickOutcome};
use encode::EncodedField;
use field::Viewport;
use impulse::{AmbientGenerator, ImpulseSource};
use simulation::{build_simulation, FieldSimulation, FieldStrategy};

pub struct RipplePlugin;
impl Plugin for RipplePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            (collect_pointer_input, emit_ambient, drive)
                .chain()
                .in_set(RippleTick),
        )
        .add_systems(Last, stop_on_exit);
    }
}

/// Input collection, field evolution and texture upload for every
/// [`RippleContext`].
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct RippleTick;

/// All per-view ripple state. Removing the component stops its driver and
/// puts a neutral field back in its texture.
#[derive(Component)]
#[component(on_remove = RippleContext::on_remove)]
pub struct RippleContext {
    driver: FrameDriver,
    simulation: Box<dyn FieldSimulation>,
    pointer: ImpulseSource,
    ambient: Option<AmbientGenerator>,
    interaction_min_width: f32,
    max_pixel_ratio: f32,
    field_texture: Handle<Image>,
    material: Handle<DistortionMaterial>,
    emitted: u64,
}

impl RippleContext {
    pub fn new(
        config: &RippleConfig,
        strategy: FieldStrategy,
        viewport: Viewport,
        field_texture: Handle<Image>,
        material: Handle<DistortionMaterial>,
    ) -> Self {
        let max_age = config.simulation.max_age;
        let ambient = config
            .ambient
            .enabled
            .then(|| AmbientGenerator::new(config.ambient.clone(), viewport, max_age));

        Self {
            driver: FrameDriver::new(RunPolicy {
                min_width: config.driver.min_width,
            }),
            simulation: build_simulation(strategy, &config.simulation, &viewport),
            pointer: ImpulseSource::new(viewport, config.input.min_interval(), max_age),
            ambient,
            interaction_min_width: config.input.interaction_min_width,
            max_pixel_ratio: config.input.max_pixel_ratio,
            field_texture,
            material,
            emitted: 0,
        }
    }

    pub fn start(&mut self, capable: bool) -> Result<(), DriverError> {
        let viewport = *self.pointer.viewport();
        self.driver.start(capable, viewport)
    }

    pub fn driver(&self) -> &FrameDriver {
        &self.driver
    }

    pub fn simulation(&self) -> &dyn FieldSimulation {
        self.simulation.as_ref()
    }

    pub fn encoded(&self) -> &EncodedField {
        self.simulation.encoded()
    }

    /// Impulses handed to the simulation so far, from any source.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn accepts_input(&self) -> bool {
        self.driver.is_scheduled() && self.pointer.viewport().width >= self.interaction_min_width
    }

    fn on_remove(mut world: DeferredWorld, HookContext { entity, .. }: HookContext) {
        let Some(mut context) = world.get_mut::<RippleContext>(entity) else {
            return;
        };
        context.driver.stop();
        let field_texture = context.field_texture.clone();
        let material = context.material.clone();

        if let Some(mut images) = world.get_resource_mut::<Assets<Image>>() {
            if let Some(image) = images.get_mut(&field_texture) {
                *image = field_image(UVec2::ONE);
            }
        }
        if let Some(mut materials) = world.get_resource_mut::<Assets<DistortionMaterial>>() {
            let _ = materials.get_mut(&material);
        }
        debug!("ripple context removed; field texture reset");
    }
}

/// Neutral `Rgba8Unorm` field texture, sampled bilinearly.
pub fn field_image(dims: UVec2) -> Image {
    let dims = dims.max(UVec2::ONE);
    let mut image = Image::new_fill(
        Extent3d {
            width: dims.x,
            height: dims.y,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        &[128, 128, 0, 255],
        TextureFormat::Rgba8Unorm,
        RenderAssetUsages::default(),
    );
    image.sampler = ImageSampler::linear();
    image
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum PointerSample {
    Move(Vec2),
    Lift,
}

pub(crate) fn collect_pointer_input(
    time: Res<Time>,
    mut cursor_moved: EventReader<CursorMoved>,
    mut cursor_left: EventReader<CursorLeft>,
    mut touches: EventReader<TouchInput>,
    mut active_touch: Local<Option<u64>>,
    mut contexts: Query<&mut RippleContext>,
) {
    let mut samples: SmallVec<[PointerSample; 8]> = SmallVec::new();
    samples.extend(cursor_moved.read().map(|event| PointerSample::Move(event.position)));
    // One trail: only the first finger down is followed until it lifts.
    for touch in touches.read() {
        match touch.phase {
            TouchPhase::Started if active_touch.is_none() => {
                *active_touch = Some(touch.id);
                samples.push(PointerSample::Lift);
                samples.push(PointerSample::Move(touch.position));
            }
            TouchPhase::Moved if *active_touch == Some(touch.id) => {
                samples.push(PointerSample::Move(touch.position));
            }
            TouchPhase::Ended | TouchPhase::Canceled if *active_touch == Some(touch.id) => {
                *active_touch = None;
                samples.push(PointerSample::Lift);
            }
            _ => {}
        }
    }
    if cursor_left.read().count() > 0 {
        samples.push(PointerSample::Lift);
    }

    for mut context in &mut contexts {
        context.pointer.advance_clock(time.elapsed());
        if !context.accepts_input() {
            continue;
        }

        let context = &mut *context;
        for sample in &samples {
            match *sample {
                PointerSample::Move(position) => {
                    if let Some(impulse) = context.pointer.on_pointer_event(position, None) {
                        context.simulation.add_impulse(impulse);
                        context.emitted += 1;
                    }
                }
                PointerSample::Lift => context.pointer.reset_trail(),
            }
        }
    }
}

pub(crate) fn emit_ambient(time: Res<Time>, mut contexts: Query<&mut RippleContext>) {
    for mut context in &mut contexts {
        if !context.driver.is_scheduled() {
            continue;
        }
        let context = &mut *context;
        let Some(ambient) = context.ambient.as_mut() else {
            continue;
        };
        for impulse in ambient.poll(time.elapsed()) {
            context.simulation.add_impulse(impulse);
            context.emitted += 1;
        }
    }
}

pub(crate) fn drive(
    window: Query<&Window, With<PrimaryWindow>>,
    mut contexts: Query<&mut RippleContext>,
    mut images: ResMut<Assets<Image>>,
    mut materials: ResMut<Assets<DistortionMaterial>>,
) {
    let Ok(window) = window.single() else {
        return;
    };

    for mut context in &mut contexts {
        let context = &mut *context;
        let viewport = Viewport::from_window(window, context.max_pixel_ratio);
        context.driver.on_viewport_changed(&viewport);

        let outcome = context.driver.tick(viewport, context.simulation.as_mut());
        if outcome.resized() {
            context.pointer.set_viewport(viewport);
            if let Some(ambient) = context.ambient.as_mut() {
                ambient.set_viewport(viewport);
            }
        }

        if matches!(outcome, TickOutcome::Presented { .. }) {
            upload_field(context, &mut images, &mut materials);
        }
    }
}

/// Copies the encoded field into its texture, resizing the texture when the
/// field dimensions changed.
fn upload_field(
    context: &RippleContext,
    images: &mut Assets<Image>,
    materials: &mut Assets<DistortionMaterial>,
) {
    let encoded = context.simulation.encoded();
    let Some(image) = images.get_mut(&context.field_texture) else {
        warn!("ripple field texture is missing");
        return;
    };

    let dims = encoded.dims();
    let size = Extent3d {
        width: dims.x,
        height: dims.y,
        depth_or_array_layers: 1,
    };
    if image.texture_descriptor.size != size {
        debug!("field texture now {}x{}", dims.x, dims.y);
        image.texture_descriptor.size = size;
    }
    encoded.write_rgba8(image.data.get_or_insert_with(Vec::new));

    // Re-prepares the bind group so the new texture contents are picked up.
    let _ = materials.get_mut(&context.material);
}

pub(crate) fn stop_on_exit(mut exit: EventReader<AppExit>, mut contexts: Query<&mut RippleContext>) {
    if exit.read().count() == 0 {
        return;
    }
    for mut context in &mut contexts {
        context.driver.stop();
        info!(
            "ripple stopped after {} frames and {} resizes",
            context.driver.frames(),
            context.driver.resizes()
        );
    }
}
