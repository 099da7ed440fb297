//! Post-processing pipeline description.
//!
//! The composer does not own GPU resources itself. It keeps the ordered pass
//! list and its tunable parameters, and folds them into [`FrameEffects`] that
//! a [`SceneRenderer`] applies when it draws the frame.

use serde::{Deserialize, Serialize};

use crate::camera::PerspectiveCamera;
use crate::error::RenderError;
use crate::render::{Frame, SceneRenderer};
use crate::scene::SceneGraph;

/// Bloom knobs, clamped to the ranges exposed to users.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BloomSettings {
    threshold: f32,
    strength: f32,
    radius: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            strength: 1.0,
            radius: 0.0,
        }
    }
}

impl BloomSettings {
    pub fn new(threshold: f32, strength: f32, radius: f32) -> Self {
        let mut settings = Self::default();
        settings.set_threshold(threshold);
        settings.set_strength(strength);
        settings.set_radius(radius);
        settings
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn set_threshold(&mut self, value: f32) {
        self.threshold = value.clamp(0.0, 1.0);
    }

    pub fn set_strength(&mut self, value: f32) {
        self.strength = value.clamp(0.0, 3.0);
    }

    pub fn set_radius(&mut self, value: f32) {
        self.radius = value.clamp(0.0, 1.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneMapping {
    #[default]
    None,
    Reinhard,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pass {
    /// Base scene render; always the first pass.
    Render,
    Bloom(BloomSettings),
    Output {
        tone_mapping: ToneMapping,
        exposure: f32,
    },
}

/// Everything a renderer needs to know about the post-processing chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameEffects {
    pub bloom: Option<BloomSettings>,
    pub tone_mapping: ToneMapping,
    pub exposure: f32,
    pub buffer_size: (u32, u32),
}

impl Default for FrameEffects {
    fn default() -> Self {
        Self {
            bloom: None,
            tone_mapping: ToneMapping::None,
            exposure: 1.0,
            buffer_size: (1, 1),
        }
    }
}

/// Ordered list of image-space passes applied after the base render.
#[derive(Debug, Clone, PartialEq)]
pub struct Composer {
    passes: Vec<Pass>,
    size: (u32, u32),
}

impl Composer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            passes: vec![Pass::Render],
            size: (width, height),
        }
    }

    /// Render → bloom → output chain.
    pub fn bloom(
        width: u32,
        height: u32,
        bloom: BloomSettings,
        tone_mapping: ToneMapping,
        exposure: f32,
    ) -> Self {
        let mut composer = Self::new(width, height);
        composer.add_pass(Pass::Bloom(bloom));
        composer.add_pass(Pass::Output {
            tone_mapping,
            exposure: 1.0,
        });
        composer.set_exposure(exposure);
        composer
    }

    pub fn add_pass(&mut self, pass: Pass) {
        if pass == Pass::Render {
            log::warn!("ignoring extra render pass; the composer already starts with one");
            return;
        }
        self.passes.push(pass);
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    pub fn bloom_mut(&mut self) -> Option<&mut BloomSettings> {
        self.passes.iter_mut().find_map(|pass| match pass {
            Pass::Bloom(settings) => Some(settings),
            _ => None,
        })
    }

    /// Maps the user-facing exposure slider value to the tone-mapping
    /// exposure, which is the fourth power of the slider.
    pub fn set_exposure(&mut self, value: f32) {
        for pass in &mut self.passes {
            if let Pass::Output { exposure, .. } = pass {
                *exposure = value.max(0.0).powi(4);
            }
        }
    }

    pub fn effects(&self) -> FrameEffects {
        self.passes.iter().fold(
            FrameEffects {
                buffer_size: self.size,
                ..FrameEffects::default()
            },
            |mut effects, pass| {
                match *pass {
                    Pass::Render => {}
                    Pass::Bloom(settings) => effects.bloom = Some(settings),
                    Pass::Output {
                        tone_mapping,
                        exposure,
                    } => {
                        effects.tone_mapping = tone_mapping;
                        effects.exposure = exposure;
                    }
                }
                effects
            },
        )
    }

    /// Draws the frame with this pipeline's effects in place of a plain draw.
    pub fn render<R>(
        &self,
        renderer: &mut R,
        scene: &SceneGraph,
        camera: &PerspectiveCamera,
    ) -> Result<(), RenderError>
    where
        R: SceneRenderer + ?Sized,
    {
        renderer.draw(&Frame {
            scene,
            camera,
            effects: Some(self.effects()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bloom_knobs_clamp_to_ranges() {
        let mut bloom = BloomSettings::new(-1.0, 5.0, 0.5);
        assert_eq!(bloom.threshold(), 0.0);
        assert_eq!(bloom.strength(), 3.0);
        assert_eq!(bloom.radius(), 0.5);
        bloom.set_radius(2.0);
        assert_eq!(bloom.radius(), 1.0);
    }

    #[test]
    fn exposure_slider_maps_to_fourth_power() {
        let mut composer = Composer::bloom(
            500,
            500,
            BloomSettings::default(),
            ToneMapping::Reinhard,
            1.0,
        );
        assert_eq!(composer.effects().exposure, 1.0);
        composer.set_exposure(2.0);
        assert_eq!(composer.effects().exposure, 16.0);
        assert_eq!(composer.effects().tone_mapping, ToneMapping::Reinhard);
    }

    #[test]
    fn effects_follow_pass_order_and_size() {
        let mut composer = Composer::bloom(
            500,
            500,
            BloomSettings::new(0.2, 1.5, 0.4),
            ToneMapping::None,
            1.0,
        );
        composer.add_pass(Pass::Render);
        assert_eq!(composer.passes().len(), 3);
        composer.resize(800, 600);
        composer.bloom_mut().unwrap().set_strength(2.0);
        let effects = composer.effects();
        assert_eq!(effects.buffer_size, (800, 600));
        assert_eq!(effects.bloom.unwrap().strength(), 2.0);
        assert_eq!(effects.bloom.unwrap().threshold(), 0.2);
    }
}
