use crate::room::RoomState;

/// Runs one frame of room logic: GUI actions first, then the simulation.
pub fn update(state: &mut RoomState, ui: &mut imgui::Ui, dt: f32) -> anyhow::Result<()> {
    state.scene.early_update();

    for action in state.panel.draw(ui) {
        log::debug!("Control action: {:?}", action);
        state.apply(action);
    }

    state.update(dt);
    state.scene.late_update();

    Ok(())
}
