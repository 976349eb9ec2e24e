use bevy::{prelude::*, sprite::Material2dPlugin};

use crate::{
    data::config::RippleConfig,
    shaders::DistortionMaterial,
    systems::ripple::RipplePlugin,
};

pub mod capability;
pub mod render;
pub mod shortcuts;

use render::RenderPlugin;

pub struct StartupPlugin;
impl Plugin for StartupPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(RippleConfig::load())
            .add_plugins(Material2dPlugin::<DistortionMaterial>::default())
            .add_plugins((RipplePlugin, RenderPlugin))
            .add_systems(Update, shortcuts::close_on_esc);
    }
}
