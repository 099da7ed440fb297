//! CPU projection and shading shared by the renderers without a GPU.

use glam::{Vec2, Vec3};

use crate::post::{FrameEffects, ToneMapping};
use crate::scene::{Light, LightKind};

use super::Frame;

/// Triangle in pixel coordinates with its final color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenTriangle {
    pub points: [Vec2; 3],
    /// Mean normalized depth, 0 at the near plane.
    pub depth: f32,
    pub color: Vec3,
}

/// Projects every visible triangle of `frame` into a `width`×`height`
/// viewport, sorted back to front.
pub fn rasterize(frame: &Frame<'_>, width: u32, height: u32) -> Vec<ScreenTriangle> {
    let view_proj = frame.camera.view_proj();
    let lights = frame.scene.lights();
    let viewport = Vec2::new(width as f32, height as f32);
    let mut triangles = Vec::new();

    for item in frame.scene.draw_list() {
        let world: Vec<Vec3> = item
            .mesh
            .positions()
            .map(|position| item.model.transform_point3(position))
            .collect();
        for face in item.mesh.indices.chunks_exact(3) {
            let Some(corners) = face_corners(&world, face) else {
                continue;
            };
            let mut points = [Vec2::ZERO; 3];
            let mut depth = 0.0;
            let mut visible = true;
            for (point, corner) in points.iter_mut().zip(corners) {
                let clip = view_proj * corner.extend(1.0);
                if clip.w <= f32::EPSILON {
                    visible = false;
                    break;
                }
                let ndc = clip.truncate() / clip.w;
                if !(0.0..=1.0).contains(&ndc.z) {
                    visible = false;
                    break;
                }
                *point = Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5) * viewport;
                depth += ndc.z / 3.0;
            }
            if !visible {
                continue;
            }

            let centroid = (corners[0] + corners[1] + corners[2]) / 3.0;
            let mut normal = (corners[1] - corners[0])
                .cross(corners[2] - corners[0])
                .normalize_or_zero();
            if normal.dot(frame.camera.position - centroid) < 0.0 {
                normal = -normal;
            }
            let lit = shade(item.material.color, item.material.emissive, normal, &lights);
            triangles.push(ScreenTriangle {
                points,
                depth,
                color: apply_effects(lit, frame.effects.as_ref()),
            });
        }
    }

    triangles.sort_by(|a, b| b.depth.total_cmp(&a.depth));
    triangles
}

fn face_corners(world: &[Vec3], face: &[u32]) -> Option<[Vec3; 3]> {
    let corner = |index: u32| world.get(index as usize).copied();
    Some([corner(face[0])?, corner(face[1])?, corner(face[2])?])
}

/// Lambert shading: ambient terms plus every directional light shining from
/// its position towards the origin.
pub fn shade(color: Vec3, emissive: Vec3, normal: Vec3, lights: &[Light]) -> Vec3 {
    let incoming = lights.iter().fold(Vec3::ZERO, |sum, light| match light.kind {
        LightKind::Ambient => sum + light.color * light.intensity,
        LightKind::Directional => {
            let towards = light.position.normalize_or_zero();
            sum + light.color * light.intensity * normal.dot(towards).max(0.0)
        }
    });
    color * incoming + emissive
}

/// Bloom approximation, exposure and tone mapping, clamped to displayable
/// range.
pub fn apply_effects(color: Vec3, effects: Option<&FrameEffects>) -> Vec3 {
    let Some(effects) = effects else {
        return color.clamp(Vec3::ZERO, Vec3::ONE);
    };
    let mut color = color;
    if let Some(bloom) = effects.bloom {
        let luminance = color.dot(Vec3::new(0.2126, 0.7152, 0.0722));
        let threshold = bloom.threshold();
        let glow = (luminance - threshold).max(0.0) / (1.0 - threshold).max(0.001);
        color += color * glow * bloom.strength() * (1.0 + bloom.radius());
    }
    color *= effects.exposure;
    if effects.tone_mapping == ToneMapping::Reinhard {
        color /= Vec3::ONE + color;
    }
    color.clamp(Vec3::ZERO, Vec3::ONE)
}

/// CSS `rgb()` string for a linear 0..1 color.
pub fn css_color(color: Vec3) -> String {
    let [r, g, b] = (color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0).round().to_array();
    format!("rgb({}, {}, {})", r as u8, g as u8, b as u8)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::post::BloomSettings;
    use crate::scene::{Material, MeshData, SceneGraph, SceneNode};

    fn triangle_at(z: f32) -> SceneNode {
        SceneNode::mesh(
            format!("tri-{z}"),
            Arc::new(MeshData::new(
                vec![
                    -1.0, -1.0, z, 0.0, 0.0, 1.0, 1.0, -1.0, z, 0.0, 0.0, 1.0, 0.0, 1.0, z, 0.0,
                    0.0, 1.0,
                ],
                vec![0, 1, 2],
            )),
            Material::default(),
        )
    }

    #[test]
    fn projects_visible_triangles_back_to_front() {
        let mut scene = SceneGraph::new();
        scene.add(triangle_at(0.0));
        scene.add(triangle_at(-2.0));
        scene.add(triangle_at(10.0));
        let camera = PerspectiveCamera::new(45.0, 1.0, 10000.0, 1.0);
        let triangles = rasterize(
            &Frame {
                scene: &scene,
                camera: &camera,
                effects: None,
            },
            500,
            500,
        );
        assert_eq!(triangles.len(), 2);
        assert!(triangles[0].depth > triangles[1].depth);
        for point in triangles[1].points {
            assert!((0.0..=500.0).contains(&point.x));
            assert!((0.0..=500.0).contains(&point.y));
        }
        assert!(triangles[1].points[2].y < triangles[1].points[0].y);
    }

    #[test]
    fn shading_sums_ambient_and_facing_lights() {
        let lights = [
            Light::ambient(Vec3::ONE, 0.25),
            Light::directional(Vec3::ONE, 0.5, Vec3::new(0.0, 0.0, 3.0)),
            Light::directional(Vec3::ONE, 4.0, Vec3::new(0.0, 0.0, -3.0)),
        ];
        let lit = shade(Vec3::ONE, Vec3::new(0.1, 0.0, 0.0), Vec3::Z, &lights);
        assert!((lit - Vec3::new(0.85, 0.75, 0.75)).length() < 1e-6);
    }

    #[test]
    fn reinhard_and_exposure_compress_highlights() {
        let effects = FrameEffects {
            bloom: None,
            tone_mapping: ToneMapping::Reinhard,
            exposure: 1.0,
            buffer_size: (1, 1),
        };
        let mapped = apply_effects(Vec3::splat(3.0), Some(&effects));
        assert!((mapped.x - 0.75).abs() < 1e-6);
        assert_eq!(apply_effects(Vec3::splat(3.0), None), Vec3::ONE);
    }

    #[test]
    fn bloom_brightens_above_threshold_only() {
        let effects = FrameEffects {
            bloom: Some(BloomSettings::new(0.5, 1.0, 0.0)),
            ..FrameEffects::default()
        };
        let dim = Vec3::splat(0.2);
        assert_eq!(apply_effects(dim, Some(&effects)), dim);
        let bright = apply_effects(Vec3::splat(0.75), Some(&effects));
        assert!(bright.x > 0.75);
    }

    #[test]
    fn css_color_rounds_channels() {
        assert_eq!(css_color(Vec3::new(1.0, 0.5, 0.0)), "rgb(255, 128, 0)");
    }
}
