use imgui::{Condition, TreeNodeFlags, Ui};

const TEXTURE_NAMES: [&str; 4] = ["Texture 1", "Texture 2", "Texture 3", "Texture 4"];

/// One GUI interaction, mapped 1:1 onto a property change in the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    SetLights(bool),
    SetFan(bool),
    PlayTv,
    PauseTv,
    MuteTv,
    UnmuteTv,
    ChangeVideo,
    WalkToSofa,
    Sit,
    SetWallTexture(usize),
    SetFloorTexture(usize),
}

/// Widget state of the control window.
#[derive(Debug, Clone)]
pub struct ControlPanel {
    pub lights_on: bool,
    pub fan_on: bool,
    pub wall_texture: usize,
    pub floor_texture: usize,
}

impl Default for ControlPanel {
    fn default() -> Self {
        Self {
            lights_on: true,
            fan_on: false,
            wall_texture: 0,
            floor_texture: 0,
        }
    }
}

impl ControlPanel {
    pub fn draw(&mut self, ui: &Ui) -> Vec<ControlAction> {
        let mut actions = Vec::new();

        ui.window("Controls")
            .position([10.0, 10.0], Condition::FirstUseEver)
            .size([260.0, 330.0], Condition::FirstUseEver)
            .build(|| {
                if ui.checkbox("Toggle Lights", &mut self.lights_on) {
                    actions.push(ControlAction::SetLights(self.lights_on));
                }
                if ui.checkbox("Toggle Fan", &mut self.fan_on) {
                    actions.push(ControlAction::SetFan(self.fan_on));
                }

                if ui.collapsing_header("TV Controls", TreeNodeFlags::DEFAULT_OPEN) {
                    for (label, action) in [
                        ("Play TV", ControlAction::PlayTv),
                        ("Pause TV", ControlAction::PauseTv),
                        ("Mute TV", ControlAction::MuteTv),
                        ("Unmute TV", ControlAction::UnmuteTv),
                        ("Change Video", ControlAction::ChangeVideo),
                    ] {
                        if ui.button(label) {
                            actions.push(action);
                        }
                    }
                }

                ui.separator();
                if ui.button("Walk to Sofa") {
                    actions.push(ControlAction::WalkToSofa);
                }
                ui.same_line();
                if ui.button("Sit") {
                    actions.push(ControlAction::Sit);
                }

                ui.separator();
                if ui.combo_simple_string("Wall Texture", &mut self.wall_texture, &TEXTURE_NAMES) {
                    actions.push(ControlAction::SetWallTexture(self.wall_texture));
                }
                if ui.combo_simple_string("Floor Texture", &mut self.floor_texture, &TEXTURE_NAMES)
                {
                    actions.push(ControlAction::SetFloorTexture(self.floor_texture));
                }
            });

        actions
    }
}
