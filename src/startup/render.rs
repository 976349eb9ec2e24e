use bevy::{
    asset::RenderAssetUsages,
    prelude::*,
    render::{
        camera::RenderTarget,
        render_resource::{Extent3d, TextureDimension, TextureFormat, TextureUsages},
        view::RenderLayers,
    },
    window::{PrimaryWindow, WindowResized},
};

use crate::{
    data::config::RippleConfig,
    shaders::{DistortionMaterial, DistortionUniform},
    startup::capability::{detect_quality, RenderQuality},
    systems::ripple::{field::Viewport, field_image, RippleContext, RippleTick},
};

const SCENE_LAYER: usize = 0;
const COMPOSITE_LAYER: usize = 1;
const OVERLAY_LAYER: usize = 2;

const BACKDROP_SPACING: f32 = 48.0;
const BACKDROP_EXTENT: f32 = 4096.0;

pub struct RenderPlugin;
impl Plugin for RenderPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Startup,
            (
                detect_quality,
                setup_scene_targets,
                setup_cameras,
                spawn_backdrop,
                spawn_overlay_text,
                spawn_distortion_pass,
            )
                .chain(),
        )
        .add_systems(Update, apply_viewport_resize.after(RippleTick));
    }
}

#[derive(Component)]
pub struct MainCamera;

#[derive(Component)]
pub struct SceneCamera;

#[derive(Component)]
pub struct OverlayCamera;

#[derive(Component)]
pub struct DistortionQuad;

#[derive(Component)]
pub struct OverlayText;

/// Offscreen images the distortion pass samples.
#[derive(Resource, Clone)]
pub struct SceneTargets {
    pub scene: Handle<Image>,
    pub overlay: Option<Handle<Image>>,
}

fn target_extent(size: Vec2) -> Extent3d {
    Extent3d {
        width: size.x.max(1.0) as u32,
        height: size.y.max(1.0) as u32,
        depth_or_array_layers: 1,
    }
}

fn render_target_image(size: Vec2, fill: [u8; 4]) -> Image {
    let mut image = Image::new_fill(
        target_extent(size),
        TextureDimension::D2,
        &fill,
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::default(),
    );
    image.texture_descriptor.usage =
        TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST | TextureUsages::RENDER_ATTACHMENT;
    image
}

fn window_size(windows: &Query<&Window, With<PrimaryWindow>>) -> Vec2 {
    windows
        .single()
        .map(|window| Vec2::new(window.width(), window.height()))
        .unwrap_or(Vec2::new(1280.0, 720.0))
}

pub fn setup_scene_targets(
    mut commands: Commands,
    config: Res<RippleConfig>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut images: ResMut<Assets<Image>>,
) {
    let size = window_size(&windows);
    let scene = images.add(render_target_image(size, [0, 0, 0, 255]));
    let overlay = config
        .overlay
        .as_ref()
        .map(|_| images.add(render_target_image(size, [0, 0, 0, 0])));

    commands.insert_resource(SceneTargets { scene, overlay });
}

pub fn setup_cameras(mut commands: Commands, targets: Res<SceneTargets>) {
    commands.spawn((
        Camera2d,
        SceneCamera,
        RenderLayers::layer(SCENE_LAYER),
        Camera {
            order: -2,
            target: RenderTarget::Image(targets.scene.clone().into()),
            clear_color: ClearColorConfig::Custom(Color::srgb(0.04, 0.07, 0.12)),
            ..default()
        },
    ));

    if let Some(overlay) = &targets.overlay {
        commands.spawn((
            Camera2d,
            OverlayCamera,
            RenderLayers::layer(OVERLAY_LAYER),
            Camera {
                order: -1,
                target: RenderTarget::Image(overlay.clone().into()),
                clear_color: ClearColorConfig::Custom(Color::NONE),
                ..default()
            },
        ));
    }

    // Window camera: only sees the composited quad.
    commands.spawn((
        Camera2d,
        MainCamera,
        RenderLayers::layer(COMPOSITE_LAYER),
        Camera {
            clear_color: ClearColorConfig::Custom(Color::BLACK),
            ..default()
        },
    ));
}

/// Lattice of thin sprites so distortion has something to bend.
pub fn spawn_backdrop(mut commands: Commands) {
    let lines = (BACKDROP_EXTENT / BACKDROP_SPACING) as i32;
    let colour = |index: i32| {
        if index % 4 == 0 {
            Color::srgba(0.55, 0.75, 0.95, 0.9)
        } else {
            Color::srgba(0.25, 0.4, 0.6, 0.6)
        }
    };

    for index in -lines / 2..=lines / 2 {
        let offset = index as f32 * BACKDROP_SPACING;
        commands.spawn((
            Sprite::from_color(colour(index), Vec2::new(2.0, BACKDROP_EXTENT)),
            Transform::from_xyz(offset, 0.0, 0.0),
            RenderLayers::layer(SCENE_LAYER),
        ));
        commands.spawn((
            Sprite::from_color(colour(index), Vec2::new(BACKDROP_EXTENT, 2.0)),
            Transform::from_xyz(0.0, offset, 0.0),
            RenderLayers::layer(SCENE_LAYER),
        ));
    }
}

pub fn spawn_overlay_text(
    mut commands: Commands,
    config: Res<RippleConfig>,
    windows: Query<&Window, With<PrimaryWindow>>,
) {
    let Some(overlay) = &config.overlay else {
        return;
    };
    let size = window_size(&windows);

    commands.spawn((
        OverlayText,
        Text2d::new(overlay.text.clone()),
        TextFont {
            font_size: overlay.font_size(size.y),
            ..default()
        },
        TextColor(overlay.color()),
        RenderLayers::layer(OVERLAY_LAYER),
    ));
}

/// Spawns the window quad and, when quality allows, the ripple context
/// feeding its field texture.
pub fn spawn_distortion_pass(
    mut commands: Commands,
    config: Res<RippleConfig>,
    quality: Res<RenderQuality>,
    targets: Res<SceneTargets>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut images: ResMut<Assets<Image>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<DistortionMaterial>>,
) {
    let size = window_size(&windows);
    let viewport = windows
        .single()
        .map(|window| Viewport::from_window(window, config.input.max_pixel_ratio))
        .unwrap_or(Viewport::new(size.x, size.y, 1.0, config.input.max_pixel_ratio));

    let strategy = quality.strategy(&config);
    let field_dims = strategy
        .map(|strategy| strategy.texture_dims(&config.simulation, &viewport))
        .unwrap_or(UVec2::ONE);
    let field_texture = images.add(field_image(field_dims));

    let material = materials.add(DistortionMaterial {
        scene_texture: targets.scene.clone(),
        field_texture: field_texture.clone(),
        overlay_texture: targets.overlay.clone(),
        params: DistortionUniform::new(&config.compositor, targets.overlay.is_some(), size),
    });

    commands.spawn((
        DistortionQuad,
        Mesh2d(meshes.add(Rectangle::new(size.x, size.y))),
        MeshMaterial2d(material.clone()),
        RenderLayers::layer(COMPOSITE_LAYER),
    ));

    let Some(strategy) = strategy else {
        info!("ripple disabled at {:?} quality; showing the still scene", quality.quality);
        return;
    };

    let mut context = RippleContext::new(&config, strategy, viewport, field_texture, material);
    let capable = quality.capabilities.gpu.is_some();
    match context.start(capable) {
        Ok(()) => {
            info!("ripple running with the {strategy:?} field");
            commands.spawn(context);
        }
        Err(error) => warn!("{error}; showing the still scene"),
    }
}

/// Follows window resizes: offscreen targets, quad, resolution uniform and
/// overlay font size.
pub fn apply_viewport_resize(
    mut resize_reader: EventReader<WindowResized>,
    windows: Query<&Window, With<PrimaryWindow>>,
    config: Res<RippleConfig>,
    targets: Res<SceneTargets>,
    mut images: ResMut<Assets<Image>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<DistortionMaterial>>,
    quads: Query<(&Mesh2d, &MeshMaterial2d<DistortionMaterial>), With<DistortionQuad>>,
    mut texts: Query<&mut TextFont, With<OverlayText>>,
) {
    if resize_reader.read().count() == 0 {
        return;
    }
    let Ok(window) = windows.single() else {
        return;
    };
    let size = Vec2::new(window.width(), window.height());
    // Minimized.
    if size.x < 1.0 || size.y < 1.0 {
        return;
    }

    let extent = target_extent(size);
    for handle in std::iter::once(&targets.scene).chain(targets.overlay.as_ref()) {
        if let Some(image) = images.get_mut(handle) {
            if image.texture_descriptor.size != extent {
                image.resize(extent);
            }
        }
    }

    for (mesh, material) in &quads {
        if let Some(mesh) = meshes.get_mut(&mesh.0) {
            *mesh = Rectangle::new(size.x, size.y).into();
        }
        if let Some(material) = materials.get_mut(&material.0) {
            material.params.resolution = size;
        }
    }

    if let Some(overlay) = &config.overlay {
        for mut font in &mut texts {
            font.font_size = overlay.font_size(size.y);
        }
    }
}
