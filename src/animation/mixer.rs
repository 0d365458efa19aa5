use std::{collections::HashMap, sync::Arc};

use glam::{Quat, Vec3};
use id_arena::{Arena, Id};

use crate::{
    animation::clip::{AnimationClip, TrackValue},
    scene_graph::{object3d::ObjectId, scene::Scene},
};

pub type ActionId = Id<AnimationAction>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Once,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerEvent {
    Finished(ActionId),
}

/// Playback state of one clip on one mixer.
pub struct AnimationAction {
    clip: Arc<AnimationClip>,
    time: f32,
    loop_mode: LoopMode,
    pub clamp_when_finished: bool,
    pub weight: f32,
    active: bool,
    enabled: bool,
    paused: bool,
}

impl AnimationAction {
    fn new(clip: Arc<AnimationClip>) -> Self {
        Self {
            clip,
            time: 0.0,
            loop_mode: LoopMode::Repeat,
            clamp_when_finished: false,
            weight: 1.0,
            active: false,
            enabled: true,
            paused: false,
        }
    }

    /// Starts contributing. A finished one-shot action stays on its last
    /// frame until `reset` is called.
    pub fn play(&mut self) -> &mut Self {
        self.active = true;
        self
    }

    pub fn stop(&mut self) -> &mut Self {
        self.active = false;
        self.reset()
    }

    pub fn reset(&mut self) -> &mut Self {
        self.time = 0.0;
        self.enabled = true;
        self.paused = false;
        self
    }

    pub fn set_loop(&mut self, loop_mode: LoopMode) -> &mut Self {
        self.loop_mode = loop_mode;
        self
    }

    pub fn clip(&self) -> &AnimationClip {
        &self.clip
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Whether the action is scheduled and its time still advances.
    pub fn is_running(&self) -> bool {
        self.active && self.enabled && !self.paused
    }

    fn contributes(&self) -> bool {
        self.active && self.enabled
    }

    /// Returns true when a one-shot action reaches its end on this step.
    fn advance(&mut self, dt: f32) -> bool {
        if !self.is_running() {
            return false;
        }

        let duration = self.clip.duration;
        self.time += dt;

        match self.loop_mode {
            LoopMode::Repeat => {
                if duration > 0.0 {
                    self.time = self.time.rem_euclid(duration);
                } else {
                    self.time = 0.0;
                }
                false
            }
            LoopMode::Once => {
                if self.time < duration {
                    return false;
                }

                self.time = duration;
                if self.clamp_when_finished {
                    self.paused = true;
                } else {
                    self.enabled = false;
                }
                true
            }
        }
    }
}

#[derive(Default)]
struct Accumulated {
    translation: Option<(Vec3, f32)>,
    rotation: Option<(Quat, f32)>,
    scale: Option<(Vec3, f32)>,
}

impl Accumulated {
    fn add(&mut self, value: TrackValue, weight: f32) {
        match value {
            TrackValue::Translation(v) => {
                self.translation = Some(blend_vec(self.translation, v, weight))
            }
            TrackValue::Scale(v) => self.scale = Some(blend_vec(self.scale, v, weight)),
            TrackValue::Rotation(q) => {
                self.rotation = Some(match self.rotation {
                    None => (q, weight),
                    Some((acc, total)) => {
                        let total_weight = total + weight;
                        (acc.slerp(q, weight / total_weight), total_weight)
                    }
                })
            }
        }
    }
}

fn blend_vec(acc: Option<(Vec3, f32)>, value: Vec3, weight: f32) -> (Vec3, f32) {
    match acc {
        None => (value, weight),
        Some((acc, total)) => {
            let total_weight = total + weight;
            (acc.lerp(value, weight / total_weight), total_weight)
        }
    }
}

struct Binding {
    object: ObjectId,
    original: (Vec3, Quat, Vec3),
    driven: bool,
}

/// Plays clips on the named nodes below a root object.
pub struct AnimationMixer {
    actions: Arena<AnimationAction>,
    bindings: HashMap<String, Binding>,
}

impl AnimationMixer {
    pub fn new(scene: &Scene, root: ObjectId) -> Self {
        let mut bindings = HashMap::new();

        for id in scene.descendants(root) {
            let object = &scene.objects[id];
            let transform = &object.transform;
            bindings.entry(object.name.clone()).or_insert(Binding {
                object: id,
                original: (transform.translation(), transform.rotation(), transform.scale()),
                driven: false,
            });
        }

        Self {
            actions: Arena::new(),
            bindings,
        }
    }

    pub fn clip_action(&mut self, clip: Arc<AnimationClip>) -> ActionId {
        let unbound = clip
            .tracks
            .iter()
            .filter(|track| !self.bindings.contains_key(&track.node_name))
            .count();
        if unbound > 0 {
            log::warn!(
                "Clip {} has {} tracks without a matching node",
                clip.name,
                unbound
            );
        }

        self.actions.alloc(AnimationAction::new(clip))
    }

    pub fn action(&self, id: ActionId) -> Option<&AnimationAction> {
        self.actions.get(id)
    }

    pub fn action_mut(&mut self, id: ActionId) -> Option<&mut AnimationAction> {
        self.actions.get_mut(id)
    }

    /// Advances every running action by `dt` seconds and poses the bound nodes.
    pub fn update(&mut self, dt: f32, scene: &mut Scene) -> Vec<MixerEvent> {
        let mut events = Vec::new();
        for (id, action) in self.actions.iter_mut() {
            if action.advance(dt) {
                events.push(MixerEvent::Finished(id));
            }
        }

        let mut accumulated: HashMap<&str, Accumulated> = HashMap::new();
        for (_, action) in self.actions.iter() {
            if !action.contributes() || action.weight <= 0.0 {
                continue;
            }

            for track in &action.clip.tracks {
                if !self.bindings.contains_key(&track.node_name) {
                    continue;
                }
                if let Some(value) = track.sample(action.time) {
                    accumulated
                        .entry(track.node_name.as_str())
                        .or_default()
                        .add(value, action.weight);
                }
            }
        }

        for (name, binding) in self.bindings.iter_mut() {
            let (translation, rotation, scale) = binding.original;

            match accumulated.get(name.as_str()) {
                Some(acc) => {
                    // Partial weights fade towards the original pose.
                    let translation = acc.translation.map_or(translation, |(v, w)| {
                        translation.lerp(v, w.min(1.0))
                    });
                    let rotation = acc
                        .rotation
                        .map_or(rotation, |(q, w)| rotation.slerp(q, w.min(1.0)));
                    let scale = acc.scale.map_or(scale, |(v, w)| scale.lerp(v, w.min(1.0)));

                    scene.set_object_transform(binding.object, translation, rotation, scale);
                    binding.driven = true;
                }
                None if binding.driven => {
                    scene.set_object_transform(binding.object, translation, rotation, scale);
                    binding.driven = false;
                }
                None => {}
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::clip::{KeyframeTrack, Keyframes};
    use crate::scene_graph::{object3d::Object3D, transform::Transform};

    fn rig() -> (Scene, ObjectId, ObjectId) {
        let mut scene = Scene::new();
        let root = scene.add_object(Object3D::new("character"));
        let hips = scene.add_child(
            root,
            Object3D::new("Hips").with_transform(Transform::from_translation(Vec3::Y)),
        );
        (scene, root, hips)
    }

    fn slide_clip(name: &str, to: Vec3) -> Arc<AnimationClip> {
        Arc::new(AnimationClip::new(
            name,
            vec![KeyframeTrack {
                node_name: "Hips".to_string(),
                times: vec![0.0, 1.0],
                keyframes: Keyframes::Translation(vec![Vec3::ZERO, to]),
                step: false,
            }],
        ))
    }

    fn hips_translation(scene: &Scene, hips: ObjectId) -> Vec3 {
        scene.objects[hips].transform.translation()
    }

    #[test]
    fn playing_action_poses_bound_nodes() {
        let (mut scene, root, hips) = rig();
        let mut mixer = AnimationMixer::new(&scene, root);
        let walk = mixer.clip_action(slide_clip("Walking", Vec3::X));

        mixer.update(0.5, &mut scene);
        assert_eq!(hips_translation(&scene, hips), Vec3::Y);

        mixer.action_mut(walk).unwrap().play();
        mixer.update(0.5, &mut scene);
        assert!(hips_translation(&scene, hips).abs_diff_eq(Vec3::new(0.5, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn repeat_wraps_time() {
        let (mut scene, root, _) = rig();
        let mut mixer = AnimationMixer::new(&scene, root);
        let walk = mixer.clip_action(slide_clip("Walking", Vec3::X));
        mixer.action_mut(walk).unwrap().play();

        let events = mixer.update(1.25, &mut scene);

        assert!(events.is_empty());
        assert!((mixer.action(walk).unwrap().time() - 0.25).abs() < 1e-6);
        assert!(mixer.action(walk).unwrap().is_running());
    }

    #[test]
    fn clamped_one_shot_finishes_once_and_holds_last_frame() {
        let (mut scene, root, hips) = rig();
        let mut mixer = AnimationMixer::new(&scene, root);
        let sit = mixer.clip_action(slide_clip("Stand To Sit", Vec3::NEG_Y));
        {
            let action = mixer.action_mut(sit).unwrap();
            action.set_loop(LoopMode::Once).play();
            action.clamp_when_finished = true;
        }

        let mut finished = 0;
        for _ in 0..30 {
            finished += mixer
                .update(0.1, &mut scene)
                .iter()
                .filter(|event| **event == MixerEvent::Finished(sit))
                .count();
        }

        assert_eq!(finished, 1);
        assert!(!mixer.action(sit).unwrap().is_running());
        assert_eq!(hips_translation(&scene, hips), Vec3::NEG_Y);
    }

    #[test]
    fn stopping_restores_the_original_pose() {
        let (mut scene, root, hips) = rig();
        let mut mixer = AnimationMixer::new(&scene, root);
        let walk = mixer.clip_action(slide_clip("Walking", Vec3::X));
        mixer.action_mut(walk).unwrap().play();
        mixer.update(0.5, &mut scene);

        mixer.action_mut(walk).unwrap().stop();
        mixer.update(0.1, &mut scene);

        assert_eq!(hips_translation(&scene, hips), Vec3::Y);
        assert_eq!(mixer.action(walk).unwrap().time(), 0.0);
    }

    #[test]
    fn equal_weights_average() {
        let (mut scene, root, hips) = rig();
        let mut mixer = AnimationMixer::new(&scene, root);
        let a = mixer.clip_action(slide_clip("a", Vec3::X * 2.0));
        let b = mixer.clip_action(slide_clip("b", Vec3::Z * 2.0));
        mixer.action_mut(a).unwrap().play();
        mixer.action_mut(b).unwrap().play();

        mixer.update(0.5, &mut scene);

        assert!(hips_translation(&scene, hips).abs_diff_eq(Vec3::new(0.5, 0.0, 0.5), 1e-6));
    }
}
