use std::{
    f32::consts::{FRAC_PI_2, PI},
    sync::Arc,
};

use glam::{Quat, Vec3};

use crate::{
    animation::{
        clip::AnimationClip,
        mixer::{ActionId, AnimationMixer, LoopMode, MixerEvent},
    },
    scene_graph::{object3d::ObjectId, scene::Scene},
};

pub const START_POSITION: Vec3 = Vec3::new(-26.9, -12.5, 0.0);
pub const START_YAW: f32 = FRAC_PI_2;
pub const CHARACTER_SCALE: f32 = 0.1;

pub const WALK_TARGET: Vec3 = Vec3::new(0.0, -8.5, 9.0);
pub const SIT_POSITION: Vec3 = Vec3::new(0.0, -11.2, 9.5);

/// Units per 60 Hz frame.
const MOVE_SPEED: f32 = 0.39;
const TURN_FACTOR: f32 = 0.1;
const ARRIVAL_DISTANCE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterState {
    Idle,
    Walking,
    Sitting,
}

/// What the controls can ask of the character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterRequest {
    Walk,
    Sit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrival {
    pub sits: bool,
}

/// Walk-to-target behaviour. Owns the character's position and yaw; the
/// scene object is written from these every frame.
#[derive(Debug, Clone)]
pub struct Steering {
    state: CharacterState,
    pub position: Vec3,
    pub yaw: f32,
    target: Vec3,
}

impl Steering {
    pub fn new(position: Vec3, yaw: f32) -> Self {
        Self {
            state: CharacterState::Idle,
            position,
            yaw,
            target: WALK_TARGET,
        }
    }

    pub fn state(&self) -> CharacterState {
        self.state
    }

    pub fn is_walking(&self) -> bool {
        self.state == CharacterState::Walking
    }

    pub fn is_sitting(&self) -> bool {
        self.state == CharacterState::Sitting
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Returns false when the character is already busy.
    pub fn request_walk(&mut self) -> bool {
        if self.state != CharacterState::Idle {
            return false;
        }

        self.state = CharacterState::Walking;
        self.target = WALK_TARGET;
        true
    }

    pub fn request_sit(&mut self) -> bool {
        if self.state != CharacterState::Idle {
            return false;
        }

        self.state = CharacterState::Sitting;
        true
    }

    /// Moves toward the target. Reports the frame on which the character
    /// arrives; `sit_ready` decides whether it sits down or goes idle.
    pub fn step(&mut self, dt: f32, sit_ready: bool) -> Option<Arrival> {
        if self.state != CharacterState::Walking {
            return None;
        }

        let frames = dt * 60.0;
        let offset = self.target - self.position;
        let direction = offset.normalize_or_zero();

        self.position += direction * (MOVE_SPEED * frames).min(offset.length());

        let target_yaw = direction.x.atan2(direction.z);
        let turn = 1.0 - (1.0 - TURN_FACTOR).powf(frames);
        self.yaw += (target_yaw - self.yaw) * turn;

        if self.position.distance(self.target) >= ARRIVAL_DISTANCE {
            return None;
        }

        self.position = self.target;
        self.yaw = PI;

        if sit_ready {
            self.state = CharacterState::Sitting;
            self.position = SIT_POSITION;
        } else {
            self.state = CharacterState::Idle;
        }

        Some(Arrival { sits: sit_ready })
    }
}

/// The loaded character: its scene root, the animation mixer and the clips
/// that have arrived so far.
pub struct Character {
    pub root: ObjectId,
    pub steering: Steering,
    mixer: AnimationMixer,
    walk: Option<ActionId>,
    sit: Option<ActionId>,
}

impl Character {
    pub fn new(scene: &mut Scene, root: ObjectId) -> Self {
        let steering = Steering::new(START_POSITION, START_YAW);
        let mixer = AnimationMixer::new(scene, root);

        let character = Self {
            root,
            steering,
            mixer,
            walk: None,
            sit: None,
        };
        character.write_transform(scene);
        character
    }

    pub fn set_walk_clip(&mut self, clip: AnimationClip) {
        let action = self.mixer.clip_action(Arc::new(clip));
        // A walk requested before the clip arrived still gets its animation.
        if self.steering.is_walking() {
            if let Some(action) = self.mixer.action_mut(action) {
                action.play();
            }
        }
        self.walk = Some(action);
    }

    pub fn set_sit_clip(&mut self, clip: AnimationClip) {
        let action = self.mixer.clip_action(Arc::new(clip));
        if let Some(action) = self.mixer.action_mut(action) {
            action.set_loop(LoopMode::Once);
            action.clamp_when_finished = true;
        }
        self.sit = Some(action);
    }

    pub fn request(&mut self, request: CharacterRequest) {
        match request {
            CharacterRequest::Walk => self.request_walk(),
            CharacterRequest::Sit => self.request_sit(),
        }
    }

    pub fn request_walk(&mut self) {
        if self.steering.request_walk() {
            log::info!("Character walking to {}", self.steering.target());
            self.play(self.walk);
        }
    }

    pub fn request_sit(&mut self) {
        if self.steering.request_sit() {
            self.play(self.sit);
        }
    }

    pub fn update(&mut self, dt: f32, scene: &mut Scene) {
        for event in self.mixer.update(dt, scene) {
            match event {
                MixerEvent::Finished(id) if Some(id) == self.sit => {
                    log::debug!("Sit animation finished");
                }
                MixerEvent::Finished(_) => {}
            }
        }

        if let Some(arrival) = self.steering.step(dt, self.sit.is_some()) {
            log::info!("Character arrived (sits: {})", arrival.sits);

            if let Some(walk) = self.walk.and_then(|id| self.mixer.action_mut(id)) {
                walk.stop();
            }
            if arrival.sits {
                if let Some(sit) = self.sit.and_then(|id| self.mixer.action_mut(id)) {
                    sit.reset().play();
                }
            }
        }

        self.write_transform(scene);
    }

    fn play(&mut self, action: Option<ActionId>) {
        if let Some(action) = action.and_then(|id| self.mixer.action_mut(id)) {
            action.play();
        }
    }

    fn write_transform(&self, scene: &mut Scene) {
        scene.set_object_transform(
            self.root,
            self.steering.position,
            Quat::from_rotation_y(self.steering.yaw),
            Vec3::splat(CHARACTER_SCALE),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::clip::{KeyframeTrack, Keyframes};
    use crate::scene_graph::object3d::Object3D;

    const FRAME: f32 = 1.0 / 60.0;

    fn walk_for_a_while(steering: &mut Steering, sit_ready: bool) -> Vec<Arrival> {
        let mut arrivals = Vec::new();

        for _ in 0..1000 {
            assert!(!(steering.is_walking() && steering.is_sitting()));
            if let Some(arrival) = steering.step(FRAME, sit_ready) {
                arrivals.push(arrival);
            }
        }

        arrivals
    }

    #[test]
    fn idle_until_asked() {
        let mut steering = Steering::new(START_POSITION, START_YAW);
        assert_eq!(steering.step(FRAME, true), None);
        assert_eq!(steering.position, START_POSITION);
    }

    #[test]
    fn arrives_exactly_once_and_sits() {
        let mut steering = Steering::new(START_POSITION, START_YAW);
        assert!(steering.request_walk());
        assert!(steering.is_walking());

        let arrivals = walk_for_a_while(&mut steering, true);

        assert_eq!(arrivals, vec![Arrival { sits: true }]);
        assert_eq!(steering.state(), CharacterState::Sitting);
        assert_eq!(steering.position, SIT_POSITION);
        assert_eq!(steering.yaw, PI);
    }

    #[test]
    fn goes_idle_without_a_sit_clip() {
        let mut steering = Steering::new(START_POSITION, START_YAW);
        steering.request_walk();

        let arrivals = walk_for_a_while(&mut steering, false);

        assert_eq!(arrivals, vec![Arrival { sits: false }]);
        assert_eq!(steering.state(), CharacterState::Idle);
        assert_eq!(steering.position, WALK_TARGET);
    }

    #[test]
    fn walk_speed_does_not_depend_on_frame_rate() {
        let mut at_60 = Steering::new(START_POSITION, START_YAW);
        let mut at_30 = Steering::new(START_POSITION, START_YAW);
        at_60.request_walk();
        at_30.request_walk();

        at_60.step(FRAME, true);
        at_60.step(FRAME, true);
        at_30.step(FRAME * 2.0, true);

        assert!(at_60.position.abs_diff_eq(at_30.position, 1e-4));
        assert!((at_60.position.distance(START_POSITION) - 0.78).abs() < 1e-4);
    }

    #[test]
    fn turns_towards_the_target() {
        let mut steering = Steering::new(START_POSITION, START_YAW);
        steering.request_walk();
        let direction = (WALK_TARGET - START_POSITION).normalize();
        let target_yaw = direction.x.atan2(direction.z);

        // Still far from the target after 20 frames.
        for _ in 0..20 {
            assert_eq!(steering.step(FRAME, true), None);
        }

        assert!((steering.yaw - target_yaw).abs() < (START_YAW - target_yaw).abs());
    }

    #[test]
    fn busy_characters_ignore_requests() {
        let mut steering = Steering::new(START_POSITION, START_YAW);
        assert!(steering.request_sit());
        assert!(!steering.request_walk());
        assert!(!steering.request_sit());
        assert_eq!(steering.state(), CharacterState::Sitting);
    }

    fn hips_clip(name: &str, from: Vec3, to: Vec3) -> AnimationClip {
        AnimationClip::new(
            name,
            vec![KeyframeTrack {
                node_name: "Hips".to_string(),
                times: vec![0.0, 1.0],
                keyframes: Keyframes::Translation(vec![from, to]),
                step: false,
            }],
        )
    }

    #[test]
    fn character_plays_sit_once_on_arrival() {
        let mut scene = Scene::new();
        let root = scene.add_object(Object3D::new("character"));
        let hips = scene.add_child(root, Object3D::new("Hips"));

        let mut character = Character::new(&mut scene, root);
        character.set_walk_clip(hips_clip("Walking", Vec3::ZERO, Vec3::X));
        character.set_sit_clip(hips_clip("Stand To Sit", Vec3::ZERO, Vec3::Y));
        let (walk, sit) = (character.walk.unwrap(), character.sit.unwrap());

        character.request(CharacterRequest::Walk);
        assert!(character.mixer.action(walk).unwrap().is_running());
        assert!(!character.mixer.action(sit).unwrap().is_running());

        let mut sat_down = 0;
        let mut sit_started = 0;
        for _ in 0..1000 {
            let was_walking = character.steering.is_walking();
            let sit_was_running = character.mixer.action(sit).unwrap().is_running();
            character.update(FRAME, &mut scene);
            if was_walking && character.steering.is_sitting() {
                sat_down += 1;
                assert!(!character.mixer.action(walk).unwrap().is_running());
                assert!(character.mixer.action(sit).unwrap().is_running());
            }
            if !sit_was_running && character.mixer.action(sit).unwrap().is_running() {
                sit_started += 1;
            }
        }

        assert_eq!(sat_down, 1);
        assert_eq!(sit_started, 1);

        // The one-shot sit holds its last frame; the walk no longer drives the hips.
        let sit_action = character.mixer.action(sit).unwrap();
        assert!(!sit_action.is_running());
        assert_eq!(sit_action.time(), sit_action.clip().duration);
        assert!(!character.mixer.action(walk).unwrap().is_running());
        assert_eq!(scene.objects[hips].transform.translation(), Vec3::Y);
        assert_eq!(scene.objects[root].transform.translation(), SIT_POSITION);
        assert_eq!(
            scene.objects[root].transform.scale(),
            Vec3::splat(CHARACTER_SCALE)
        );
    }
}
