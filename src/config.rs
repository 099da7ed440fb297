//! Viewer configuration.
//!
//! Everything that used to differ between hand-written viewer pages lives
//! here: surface size, camera, orbit limits, lights, the optional bloom
//! pipeline, animation playback and material overrides. Configurations are
//! read from a small XML document:
//!
//! ```xml
//! <viewer>
//!     <width>500</width>
//!     <height>500</height>
//!     <model>models/ship.obj</model>
//!     <camera><position>-5 2.5 -3.5</position></camera>
//!     <controls><maxPolarAngle>90</maxPolarAngle></controls>
//!     <bloom><strength>1.5</strength></bloom>
//! </viewer>
//! ```

use std::f32::consts::FRAC_PI_2;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::camera::PerspectiveCamera;
use crate::controls::OrbitControls;
use crate::post::{BloomSettings, ToneMapping};
use crate::scene::{Light, LightKind, Material};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 45.0,
            near: 1.0,
            far: 10000.0,
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
        }
    }
}

impl CameraConfig {
    pub fn build(&self, width: u32, height: u32) -> PerspectiveCamera {
        let mut camera = PerspectiveCamera::new(self.fov, self.near, self.far, 1.0);
        camera.position = self.position;
        camera.look_at(self.target);
        camera.set_aspect(width, height);
        camera
    }
}

/// Orbit limits. Polar angles are given in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlsConfig {
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_degrees: f32,
    pub max_polar_degrees: f32,
    /// Damping factor; `None` disables damping.
    pub damping: Option<f32>,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            min_polar_degrees: 0.0,
            max_polar_degrees: 180.0,
            damping: None,
        }
    }
}

impl ControlsConfig {
    pub fn build(&self, target: Vec3) -> OrbitControls {
        let mut controls = OrbitControls::new(target);
        controls.min_distance = self.min_distance;
        controls.max_distance = self.max_distance;
        controls.min_polar_angle = self.min_polar_degrees.to_radians();
        controls.max_polar_angle = self.max_polar_degrees.to_radians();
        if let Some(factor) = self.damping {
            controls.enable_damping = true;
            controls.damping_factor = factor.clamp(0.0, 1.0);
        }
        controls
    }
}

/// Turntable rotation applied to the loaded model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpinConfig {
    pub axis: Vec3,
    /// Seconds per revolution.
    pub period: f32,
}

/// Replaces the material of every mesh whose base color is `match_color`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialOverride {
    pub match_color: Vec3,
    #[serde(default)]
    pub color: Option<Vec3>,
    #[serde(default)]
    pub emissive: Option<Vec3>,
}

impl MaterialOverride {
    pub fn matches(&self, material: &Material) -> bool {
        material.color.abs_diff_eq(self.match_color, 1.0 / 512.0)
    }

    pub fn apply(&self, material: &Material) -> Material {
        Material {
            color: self.color.unwrap_or(material.color),
            emissive: self.emissive.unwrap_or(material.emissive),
            ..material.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub background: Option<Vec3>,
    pub camera: CameraConfig,
    pub controls: ControlsConfig,
    pub lights: Vec<Light>,
    #[serde(default)]
    pub bloom: Option<BloomSettings>,
    #[serde(default)]
    pub tone_mapping: ToneMapping,
    pub exposure: f32,
    #[serde(default)]
    pub model: Option<String>,
    pub autoplay: bool,
    #[serde(default)]
    pub spin: Option<SpinConfig>,
    #[serde(default)]
    pub material_overrides: Vec<MaterialOverride>,
    /// Style applied to the surface while fullscreen.
    #[serde(default)]
    pub fullscreen_style: Option<String>,
    pub hover_cursor: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            width: 500,
            height: 500,
            background: None,
            camera: CameraConfig::default(),
            controls: ControlsConfig::default(),
            lights: default_lights(),
            bloom: None,
            tone_mapping: ToneMapping::None,
            exposure: 1.0,
            model: None,
            autoplay: true,
            spin: None,
            material_overrides: Vec::new(),
            fullscreen_style: None,
            hover_cursor: true,
        }
    }
}

fn default_lights() -> Vec<Light> {
    vec![
        Light::directional(Vec3::new(1.0, 1.0, 0.0), 10.0, Vec3::Y),
        Light::ambient(Vec3::ONE, 0.2),
    ]
}

impl ViewerConfig {
    /// Bloom showcase: camera behind and above the model, orbit kept above
    /// the horizon and between 3 and 8 units away, red surfaces glowing.
    pub fn bloom_showcase() -> Self {
        let red = Vec3::new(1.0, 0.0, 0.0);
        Self {
            camera: CameraConfig {
                position: Vec3::new(-5.0, 2.5, -3.5),
                ..CameraConfig::default()
            },
            controls: ControlsConfig {
                min_distance: 3.0,
                max_distance: 8.0,
                max_polar_degrees: FRAC_PI_2.to_degrees(),
                ..ControlsConfig::default()
            },
            bloom: Some(BloomSettings::default()),
            tone_mapping: ToneMapping::Reinhard,
            material_overrides: vec![MaterialOverride {
                match_color: red,
                color: None,
                emissive: Some(red),
            }],
            ..Self::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read viewer config {}", path.display()))?;
        Self::from_xml(&xml).with_context(|| format!("invalid viewer config {}", path.display()))
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid viewer XML")?;
        let root = document.root_element();
        if !root.has_tag_name("viewer") {
            bail!("expected <viewer> root, found <{}>", root.tag_name().name());
        }

        let mut config = Self::default();
        config.width = parse_u32(optional_text(&root, "width"), config.width)?;
        config.height = parse_u32(optional_text(&root, "height"), config.height)?;
        if let Some(color) = optional_text(&root, "background") {
            config.background = Some(parse_color(Some(color), Vec3::ZERO)?);
        }
        config.model = optional_text(&root, "model");
        config.exposure = parse_f32(optional_text(&root, "exposure"), config.exposure)?;
        config.tone_mapping = match optional_text(&root, "toneMapping").as_deref() {
            None | Some("none") => ToneMapping::None,
            Some("reinhard") => ToneMapping::Reinhard,
            Some(other) => bail!("unknown tone mapping {other:?}"),
        };
        config.fullscreen_style = optional_text(&root, "fullscreenStyle");
        config.hover_cursor = parse_bool(optional_text(&root, "hoverCursor"), config.hover_cursor)?;

        if let Some(node) = child(&root, "camera") {
            let camera = &mut config.camera;
            camera.fov = parse_f32(optional_text(&node, "fov"), camera.fov)?;
            camera.near = parse_f32(optional_text(&node, "near"), camera.near)?;
            camera.far = parse_f32(optional_text(&node, "far"), camera.far)?;
            camera.position = parse_vec3(optional_text(&node, "position"), camera.position)?;
            camera.target = parse_vec3(optional_text(&node, "target"), camera.target)?;
        }

        if let Some(node) = child(&root, "controls") {
            let controls = &mut config.controls;
            controls.min_distance =
                parse_f32(optional_text(&node, "minDistance"), controls.min_distance)?;
            controls.max_distance =
                parse_f32(optional_text(&node, "maxDistance"), controls.max_distance)?;
            controls.min_polar_degrees =
                parse_f32(optional_text(&node, "minPolarAngle"), controls.min_polar_degrees)?;
            controls.max_polar_degrees =
                parse_f32(optional_text(&node, "maxPolarAngle"), controls.max_polar_degrees)?;
            if let Some(damping) = optional_text(&node, "damping") {
                controls.damping = Some(parse_f32(Some(damping), 0.05)?);
            }
            if controls.min_distance > controls.max_distance {
                bail!("controls minDistance is larger than maxDistance");
            }
        }

        let lights = root
            .children()
            .filter(|node| node.has_tag_name("light"))
            .map(|node| parse_light(&node))
            .collect::<Result<Vec<_>>>()?;
        if !lights.is_empty() {
            config.lights = lights;
        }

        if let Some(node) = child(&root, "bloom") {
            let defaults = BloomSettings::default();
            config.bloom = Some(BloomSettings::new(
                parse_f32(optional_text(&node, "threshold"), defaults.threshold())?,
                parse_f32(optional_text(&node, "strength"), defaults.strength())?,
                parse_f32(optional_text(&node, "radius"), defaults.radius())?,
            ));
        }

        if let Some(node) = child(&root, "animation") {
            config.autoplay = parse_bool(optional_text(&node, "autoplay"), config.autoplay)?;
            if let Some(spin) = child(&node, "spin") {
                config.spin = Some(SpinConfig {
                    axis: parse_vec3(optional_text(&spin, "axis"), Vec3::Y)?,
                    period: parse_f32(optional_text(&spin, "period"), 10.0)?,
                });
            }
        }

        for node in root
            .children()
            .filter(|node| node.has_tag_name("materialOverride"))
        {
            config.material_overrides.push(MaterialOverride {
                match_color: parse_color(Some(required_text(&node, "match")?), Vec3::ZERO)?,
                color: optional_color(optional_text(&node, "color"))?,
                emissive: optional_color(optional_text(&node, "emissive"))?,
            });
        }

        if config.width == 0 || config.height == 0 {
            bail!("viewer size must be positive, got {}x{}", config.width, config.height);
        }
        Ok(config)
    }
}

fn parse_light(node: &Node<'_, '_>) -> Result<Light> {
    let kind = match required_text(node, "type")?.as_str() {
        "ambient" => LightKind::Ambient,
        "directional" => LightKind::Directional,
        other => bail!("unknown light type {other:?}"),
    };
    Ok(Light {
        kind,
        color: parse_color(optional_text(node, "color"), Vec3::ONE)?,
        intensity: parse_f32(optional_text(node, "intensity"), 1.0)?,
        position: parse_vec3(optional_text(node, "position"), Vec3::Y)?,
    })
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| child.has_tag_name(tag))
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_components(value: &str, what: &str) -> Result<[f32; 3]> {
    let numbers = value
        .split_whitespace()
        .map(|component| {
            component
                .parse::<f32>()
                .map_err(|err| anyhow!("invalid {what} component {component:?}: {err}"))
        })
        .collect::<Result<Vec<_>>>()?;
    match numbers.as_slice() {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => bail!("{what} needs 3 components, got {}", numbers.len()),
    }
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => Ok(Vec3::from_array(parse_components(&value, "vector")?)),
        None => Ok(default),
    }
}

/// Colors are either `#rrggbb` / `0xrrggbb` or three 0-255 components.
fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let hex = value
        .strip_prefix('#')
        .or_else(|| value.strip_prefix("0x"));
    if let Some(hex) = hex {
        let packed = u32::from_str_radix(hex, 16)
            .map_err(|err| anyhow!("invalid hex color {value:?}: {err}"))?;
        let channel = |shift: u32| ((packed >> shift) & 0xff) as f32 / 255.0;
        return Ok(Vec3::new(channel(16), channel(8), channel(0)));
    }
    let [r, g, b] = parse_components(&value, "color")?;
    Ok(Vec3::new(r / 255.0, g / 255.0, b / 255.0))
}

fn optional_color(value: Option<String>) -> Result<Option<Vec3>> {
    value
        .map(|value| parse_color(Some(value), Vec3::ZERO))
        .transpose()
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float {value:?}: {err}")),
        None => Ok(default),
    }
}

fn parse_u32(value: Option<String>, default: u32) -> Result<u32> {
    match value {
        Some(value) => value
            .parse::<u32>()
            .map_err(|err| anyhow!("failed to parse integer {value:?}: {err}")),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => bail!("failed to parse boolean {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
    <viewer>
        <width>800</width>
        <height>600</height>
        <background>#101020</background>
        <model>models/engine.obj</model>
        <camera>
            <fov>60</fov>
            <position>-5 2.5 -3.5</position>
        </camera>
        <controls>
            <minDistance>3</minDistance>
            <maxDistance>8</maxDistance>
            <maxPolarAngle>90</maxPolarAngle>
            <damping>0.1</damping>
        </controls>
        <light>
            <type>directional</type>
            <color>0xffff00</color>
            <intensity>10</intensity>
        </light>
        <bloom>
            <strength>5</strength>
        </bloom>
        <toneMapping>reinhard</toneMapping>
        <animation>
            <autoplay>false</autoplay>
            <spin><period>4</period></spin>
        </animation>
        <materialOverride>
            <match>255 0 0</match>
            <emissive>255 0 0</emissive>
        </materialOverride>
        <fullscreenStyle>border: none</fullscreenStyle>
    </viewer>
    "##;

    #[test]
    fn parse_viewer_populates_every_section() {
        let config = ViewerConfig::from_xml(SAMPLE).unwrap();
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.model.as_deref(), Some("models/engine.obj"));
        assert_eq!(config.camera.fov, 60.0);
        assert_eq!(config.camera.near, 1.0);
        assert_eq!(config.camera.position, Vec3::new(-5.0, 2.5, -3.5));
        assert_eq!(config.controls.max_distance, 8.0);
        assert_eq!(config.controls.damping, Some(0.1));
        assert_eq!(config.lights.len(), 1);
        assert_eq!(config.lights[0].color, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(config.bloom.unwrap().strength(), 3.0);
        assert_eq!(config.tone_mapping, ToneMapping::Reinhard);
        assert!(!config.autoplay);
        assert_eq!(config.spin.unwrap().period, 4.0);
        assert_eq!(config.spin.unwrap().axis, Vec3::Y);
        assert_eq!(config.material_overrides.len(), 1);
        assert_eq!(config.fullscreen_style.as_deref(), Some("border: none"));
    }

    #[test]
    fn empty_viewer_uses_defaults() {
        let config = ViewerConfig::from_xml("<viewer/>").unwrap();
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.lights[0].intensity, 10.0);
        assert_eq!(config.camera.far, 10000.0);
    }

    #[test]
    fn rejects_zero_size_and_bad_values() {
        assert!(ViewerConfig::from_xml("<viewer><width>0</width></viewer>").is_err());
        assert!(ViewerConfig::from_xml("<viewer><exposure>bright</exposure></viewer>").is_err());
        assert!(ViewerConfig::from_xml("<scene/>").is_err());
        assert!(ViewerConfig::from_xml(
            "<viewer><camera><position>1 2</position></camera></viewer>"
        )
        .is_err());
    }

    #[test]
    fn controls_config_converts_degrees() {
        let controls = ViewerConfig::bloom_showcase().controls.build(Vec3::ZERO);
        assert!((controls.max_polar_angle - FRAC_PI_2).abs() < 1e-6);
        assert_eq!(controls.min_distance, 3.0);
        assert!(!controls.enable_damping);
    }

    #[test]
    fn material_override_matches_base_color() {
        let config = ViewerConfig::from_xml(SAMPLE).unwrap();
        let rule = &config.material_overrides[0];
        let red = Material {
            color: Vec3::new(1.0, 0.0, 0.0),
            ..Material::default()
        };
        assert!(rule.matches(&red));
        assert!(!rule.matches(&Material::default()));
        assert_eq!(rule.apply(&red).emissive, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(rule.apply(&red).color, red.color);
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.xml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(ViewerConfig::load(&path).unwrap().width, 800);
        assert!(ViewerConfig::load(dir.path().join("missing.xml")).is_err());
    }
}
