use bevy::{prelude::*, window::WindowResolution};

mod data;
mod shaders;
mod startup;
mod systems;

use startup::StartupPlugin;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: String::from("still water"),
                resolution: WindowResolution::new(1280.0, 720.0),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(StartupPlugin)
        .run();
}
