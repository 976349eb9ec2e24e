use bevy::{app::AppExit, prelude::*};

pub fn close_on_esc(
    keyboard_input: Res<ButtonInput<KeyCode>>,
    mut app_exit_events: EventWriter<AppExit>,
) {
    if keyboard_input.just_pressed(KeyCode::Escape) {
        info!("escape pressed, closing");
        app_exit_events.write(AppExit::Success);
    }
}
