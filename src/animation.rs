//! Keyframe animation clips and the mixer that plays them on a scene subtree.

use std::f32::consts::TAU;

use glam::{Quat, Vec3};

use crate::scene::SceneNode;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
}

impl<T> Keyframe<T> {
    pub fn new(time: f32, value: T) -> Self {
        Self { time, value }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackValues {
    Translation(Vec<Keyframe<Vec3>>),
    Rotation(Vec<Keyframe<Quat>>),
    Scale(Vec<Keyframe<Vec3>>),
}

/// Animated property of the node called `node`.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub node: String,
    pub values: TrackValues,
}

impl Track {
    fn end_time(&self) -> f32 {
        let last = match &self.values {
            TrackValues::Translation(keys) | TrackValues::Scale(keys) => keys.last().map(|k| k.time),
            TrackValues::Rotation(keys) => keys.last().map(|k| k.time),
        };
        last.unwrap_or(0.0)
    }

    fn apply(&self, time: f32, root: &mut SceneNode) -> bool {
        let Some(node) = root.find_mut(&self.node) else {
            return false;
        };
        match &self.values {
            TrackValues::Translation(keys) => {
                if let Some(value) = sample(keys, time, Vec3::lerp) {
                    node.transform.translation = value;
                }
            }
            TrackValues::Scale(keys) => {
                if let Some(value) = sample(keys, time, Vec3::lerp) {
                    node.transform.scale = value;
                }
            }
            TrackValues::Rotation(keys) => {
                if let Some(value) = sample(keys, time, Quat::slerp) {
                    node.transform.rotation = value.normalize();
                }
            }
        }
        true
    }

    fn optimize(&mut self) {
        match &mut self.values {
            TrackValues::Translation(keys) | TrackValues::Scale(keys) => {
                drop_redundant(keys, |a, b| a.abs_diff_eq(*b, 1e-6))
            }
            TrackValues::Rotation(keys) => drop_redundant(keys, |a, b| a.abs_diff_eq(*b, 1e-6)),
        }
    }
}

fn sample<T: Copy>(keys: &[Keyframe<T>], time: f32, interpolate: fn(T, T, f32) -> T) -> Option<T> {
    let first = keys.first()?;
    if time <= first.time || keys.len() == 1 {
        return Some(first.value);
    }
    let next = keys.iter().position(|key| key.time >= time);
    match next {
        None => keys.last().map(|key| key.value),
        Some(index) => {
            let a = keys[index - 1];
            let b = keys[index];
            let span = b.time - a.time;
            let t = if span > f32::EPSILON {
                (time - a.time) / span
            } else {
                1.0
            };
            Some(interpolate(a.value, b.value, t))
        }
    }
}

/// Removes keyframes whose value equals both neighbours; the first and last
/// keys always survive.
fn drop_redundant<T: Copy>(keys: &mut Vec<Keyframe<T>>, same: impl Fn(&T, &T) -> bool) {
    if keys.len() < 3 {
        return;
    }
    let mut kept = vec![keys[0]];
    for window in keys.windows(3) {
        let [prev, current, next] = [window[0], window[1], window[2]];
        if !(same(&prev.value, &current.value) && same(&current.value, &next.value)) {
            kept.push(current);
        }
    }
    if let Some(last) = keys.last() {
        kept.push(*last);
    }
    *keys = kept;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub tracks: Vec<Track>,
}

impl AnimationClip {
    /// Builds a clip whose duration is the time of its latest keyframe.
    pub fn new(name: impl Into<String>, tracks: Vec<Track>) -> Self {
        let duration = tracks.iter().map(Track::end_time).fold(0.0, f32::max);
        Self {
            name: name.into(),
            duration,
            tracks,
        }
    }

    /// One full revolution of `node` around `axis` every `period` seconds.
    pub fn turntable(node: impl Into<String>, axis: Vec3, period: f32) -> Self {
        let axis = axis.try_normalize().unwrap_or(Vec3::Y);
        let period = period.max(f32::EPSILON);
        let keys = (0..=4)
            .map(|step| {
                let fraction = step as f32 / 4.0;
                Keyframe::new(period * fraction, Quat::from_axis_angle(axis, TAU * fraction))
            })
            .collect();
        Self::new(
            "turntable",
            vec![Track {
                node: node.into(),
                values: TrackValues::Rotation(keys),
            }],
        )
    }

    /// Drops keyframes that do not change the sampled result.
    pub fn optimize(mut self) -> Self {
        for track in &mut self.tracks {
            track.optimize();
        }
        self
    }
}

/// Playback state of one clip inside a mixer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationAction {
    clip: AnimationClip,
    time: f32,
    playing: bool,
    pub looping: bool,
    pub time_scale: f32,
}

impl AnimationAction {
    fn new(clip: AnimationClip) -> Self {
        Self {
            clip,
            time: 0.0,
            playing: false,
            looping: true,
            time_scale: 1.0,
        }
    }

    pub fn play(&mut self) -> &mut Self {
        self.playing = true;
        self
    }

    pub fn stop(&mut self) -> &mut Self {
        self.playing = false;
        self.time = 0.0;
        self
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn clip(&self) -> &AnimationClip {
        &self.clip
    }

    fn advance(&mut self, delta: f32) {
        self.time += delta * self.time_scale;
        let duration = self.clip.duration;
        if duration <= 0.0 {
            self.time = 0.0;
        } else if self.looping {
            self.time = self.time.rem_euclid(duration);
        } else if self.time >= duration {
            self.time = duration;
            self.playing = false;
        }
    }
}

/// Plays animation clips on a scene subtree.
#[derive(Debug, Clone, Default)]
pub struct AnimationMixer {
    actions: Vec<AnimationAction>,
    time: f32,
}

impl AnimationMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the action for `clip`, creating it on first use.
    pub fn clip_action(&mut self, clip: AnimationClip) -> &mut AnimationAction {
        match self
            .actions
            .iter()
            .position(|action| action.clip.name == clip.name)
        {
            Some(index) => &mut self.actions[index],
            None => {
                self.actions.push(AnimationAction::new(clip));
                let last = self.actions.len() - 1;
                &mut self.actions[last]
            }
        }
    }

    pub fn actions(&self) -> &[AnimationAction] {
        &self.actions
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Advances every playing action by `delta` seconds and writes the
    /// sampled values into `root`.
    pub fn update(&mut self, delta: f32, root: &mut SceneNode) {
        let delta = delta.max(0.0);
        self.time += delta;
        for action in self.actions.iter_mut().filter(|action| action.playing) {
            action.advance(delta);
            for track in &action.clip.tracks {
                if !track.apply(action.time, root) {
                    log::trace!("animation track targets missing node {}", track.node);
                }
            }
        }
    }
}
