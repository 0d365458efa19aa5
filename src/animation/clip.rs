use gltf::animation::{util::ReadOutputs, Interpolation};
use glam::{Quat, Vec3};

use crate::asset_pipeline::loader::GltfImport;

#[derive(Clone, Debug)]
pub enum Keyframes {
    Translation(Vec<Vec3>),
    Rotation(Vec<Quat>),
    Scale(Vec<Vec3>),
}

impl Keyframes {
    fn len(&self) -> usize {
        match self {
            Keyframes::Translation(values) | Keyframes::Scale(values) => values.len(),
            Keyframes::Rotation(values) => values.len(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrackValue {
    Translation(Vec3),
    Rotation(Quat),
    Scale(Vec3),
}

/// Keyframes for one property of one node, addressed by node name so clips
/// exported from separate files can drive the same skeleton.
#[derive(Clone, Debug)]
pub struct KeyframeTrack {
    pub node_name: String,
    pub times: Vec<f32>,
    pub keyframes: Keyframes,
    pub step: bool,
}

impl KeyframeTrack {
    /// Samples with linear interpolation (slerp for rotations), holding the
    /// first and last keys outside the keyed range.
    pub fn sample(&self, time: f32) -> Option<TrackValue> {
        let count = self.times.len().min(self.keyframes.len());
        if count == 0 {
            return None;
        }

        let next = self.times[..count].partition_point(|&t| t <= time);
        let (a, b, alpha) = if next == 0 {
            (0, 0, 0.0)
        } else if next >= count {
            (count - 1, count - 1, 0.0)
        } else {
            let (t0, t1) = (self.times[next - 1], self.times[next]);
            let span = t1 - t0;
            let alpha = if self.step || span <= 0.0 {
                0.0
            } else {
                (time - t0) / span
            };
            (next - 1, next, alpha)
        };

        Some(match &self.keyframes {
            Keyframes::Translation(values) => {
                TrackValue::Translation(values[a].lerp(values[b], alpha))
            }
            Keyframes::Rotation(values) => TrackValue::Rotation(values[a].slerp(values[b], alpha)),
            Keyframes::Scale(values) => TrackValue::Scale(values[a].lerp(values[b], alpha)),
        })
    }
}

#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub tracks: Vec<KeyframeTrack>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, tracks: Vec<KeyframeTrack>) -> Self {
        let duration = tracks
            .iter()
            .filter_map(|track| track.times.last().copied())
            .fold(0.0, f32::max);

        Self {
            name: name.into(),
            duration,
            tracks,
        }
    }

    /// Reads the first animation of an imported glTF file.
    pub fn first_from_gltf(import: &GltfImport) -> anyhow::Result<Self> {
        let animation = import
            .document
            .animations()
            .next()
            .ok_or_else(|| anyhow::anyhow!("File contains no animations"))?;

        Self::from_gltf(&animation, &import.buffers)
    }

    pub fn from_gltf(
        animation: &gltf::Animation,
        buffers: &[gltf::buffer::Data],
    ) -> anyhow::Result<Self> {
        let name = animation
            .name()
            .map(String::from)
            .unwrap_or_else(|| format!("Animation {}", animation.index()));

        let mut tracks = Vec::new();

        for channel in animation.channels() {
            let target = channel.target().node();
            let Some(node_name) = target.name() else {
                log::warn!("{}: skipping channel targeting unnamed node", name);
                continue;
            };

            let reader = channel.reader(|buffer| Some(&buffers[buffer.index()]));
            let Some(times) = reader.read_inputs() else {
                continue;
            };
            let times: Vec<f32> = times.collect();

            let interpolation = channel.sampler().interpolation();
            let keyframes = match reader.read_outputs() {
                Some(ReadOutputs::Translations(values)) => {
                    Keyframes::Translation(spline_values(values.map(Vec3::from), interpolation))
                }
                Some(ReadOutputs::Rotations(values)) => Keyframes::Rotation(spline_values(
                    values.into_f32().map(Quat::from_array),
                    interpolation,
                )),
                Some(ReadOutputs::Scales(values)) => {
                    Keyframes::Scale(spline_values(values.map(Vec3::from), interpolation))
                }
                Some(ReadOutputs::MorphTargetWeights(_)) | None => continue,
            };

            tracks.push(KeyframeTrack {
                node_name: node_name.to_string(),
                times,
                keyframes,
                step: interpolation == Interpolation::Step,
            });
        }

        if tracks.is_empty() {
            anyhow::bail!("Animation {} has no usable tracks", name);
        }

        Ok(Self::new(name, tracks))
    }
}

/// Cubic spline outputs store in-tangent, value and out-tangent per key. Only
/// the values are kept and interpolated linearly.
fn spline_values<T>(values: impl Iterator<Item = T>, interpolation: Interpolation) -> Vec<T> {
    match interpolation {
        Interpolation::CubicSpline => values.skip(1).step_by(3).collect(),
        _ => values.collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    fn translation_track() -> KeyframeTrack {
        KeyframeTrack {
            node_name: "Hips".to_string(),
            times: vec![0.0, 1.0, 2.0],
            keyframes: Keyframes::Translation(vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 2.0, 0.0)]),
            step: false,
        }
    }

    #[test]
    fn interpolates_between_keys() {
        let track = translation_track();
        assert_eq!(
            track.sample(0.5),
            Some(TrackValue::Translation(Vec3::new(0.5, 0.0, 0.0)))
        );
        assert_eq!(
            track.sample(1.5),
            Some(TrackValue::Translation(Vec3::new(1.0, 1.0, 0.0)))
        );
    }

    #[test]
    fn holds_the_ends() {
        let track = translation_track();
        assert_eq!(track.sample(-1.0), Some(TrackValue::Translation(Vec3::ZERO)));
        assert_eq!(
            track.sample(5.0),
            Some(TrackValue::Translation(Vec3::new(1.0, 2.0, 0.0)))
        );
    }

    #[test]
    fn step_tracks_do_not_interpolate() {
        let mut track = translation_track();
        track.step = true;
        assert_eq!(track.sample(0.9), Some(TrackValue::Translation(Vec3::ZERO)));
    }

    #[test]
    fn rotations_slerp() {
        let track = KeyframeTrack {
            node_name: "Spine".to_string(),
            times: vec![0.0, 1.0],
            keyframes: Keyframes::Rotation(vec![
                Quat::IDENTITY,
                Quat::from_rotation_y(FRAC_PI_2),
            ]),
            step: false,
        };

        let Some(TrackValue::Rotation(halfway)) = track.sample(0.5) else {
            panic!("expected a rotation");
        };
        assert!(halfway.abs_diff_eq(Quat::from_rotation_y(FRAC_PI_2 / 2.0), 1e-5));
    }

    #[test]
    fn duration_is_the_last_key() {
        let clip = AnimationClip::new("Walking", vec![translation_track()]);
        assert_eq!(clip.duration, 2.0);
    }

    #[test]
    fn cubic_spline_keeps_middle_values() {
        let values = spline_values([0, 1, 2, 3, 4, 5].into_iter(), Interpolation::CubicSpline);
        assert_eq!(values, vec![1, 4]);
    }
}
