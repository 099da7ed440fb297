use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identifier used by renderers to cache uploaded meshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u64);

/// Interleaved triangle mesh: `position.xyz` followed by `normal.xyz`.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    id: MeshId,
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub const STRIDE: usize = 6;

    pub fn new(vertices: Vec<f32>, indices: Vec<u32>) -> Self {
        Self {
            id: MeshId(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed)),
            vertices,
            indices,
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / Self::STRIDE
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices
            .chunks_exact(Self::STRIDE)
            .map(|chunk| Vec3::new(chunk[0], chunk[1], chunk[2]))
    }
}

/// Surface appearance of a mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub color: Vec3,
    #[serde(default)]
    pub emissive: Vec3,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            color: Vec3::splat(0.8),
            emissive: Vec3::ZERO,
            opacity: default_opacity(),
        }
    }
}

fn default_opacity() -> f32 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightKind {
    Ambient,
    /// Shines from its position towards the origin.
    Directional,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
}

impl Light {
    pub fn ambient(color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Ambient,
            color,
            intensity,
            position: Vec3::ZERO,
        }
    }

    pub fn directional(color: Vec3, intensity: f32, position: Vec3) -> Self {
        Self {
            kind: LightKind::Directional,
            color,
            intensity,
            position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group,
    Mesh {
        mesh: Arc<MeshData>,
        material: Material,
    },
    Light(Light),
}

/// Named node in the scene hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn group(name: impl Into<String>) -> Self {
        Self::with_kind(name, NodeKind::Group)
    }

    pub fn mesh(name: impl Into<String>, mesh: Arc<MeshData>, material: Material) -> Self {
        Self::with_kind(name, NodeKind::Mesh { mesh, material })
    }

    pub fn light(name: impl Into<String>, light: Light) -> Self {
        Self::with_kind(name, NodeKind::Light(light))
    }

    fn with_kind(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn add_child(&mut self, child: SceneNode) {
        self.children.push(child);
    }

    /// Removes the first direct child with the given name.
    pub fn remove_child(&mut self, name: &str) -> Option<SceneNode> {
        let index = self.children.iter().position(|child| child.name == name)?;
        Some(self.children.remove(index))
    }

    /// Depth-first search by name, including `self`.
    pub fn find(&self, name: &str) -> Option<&SceneNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut SceneNode> {
        if self.name == name {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_mut(name))
    }

    /// Visits every node depth-first with its world matrix.
    pub fn visit<F>(&self, parent: Mat4, visitor: &mut F)
    where
        F: FnMut(&SceneNode, Mat4),
    {
        let world = parent * self.transform.matrix();
        visitor(self, world);
        for child in &self.children {
            child.visit(world, visitor);
        }
    }

    pub fn visit_mut<F>(&mut self, visitor: &mut F)
    where
        F: FnMut(&mut SceneNode),
    {
        visitor(self);
        for child in &mut self.children {
            child.visit_mut(visitor);
        }
    }

    /// Replaces the material of every mesh whose current material matches
    /// `predicate`. Returns the number of meshes touched.
    pub fn replace_materials<P, F>(&mut self, mut predicate: P, mut replace: F) -> usize
    where
        P: FnMut(&Material) -> bool,
        F: FnMut(&Material) -> Material,
    {
        let mut replaced = 0;
        self.visit_mut(&mut |node: &mut SceneNode| {
            if let NodeKind::Mesh { material, .. } = &mut node.kind {
                if predicate(material) {
                    *material = replace(material);
                    replaced += 1;
                }
            }
        });
        replaced
    }

    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.visit(Mat4::IDENTITY, &mut |node: &SceneNode, _| {
            if matches!(node.kind, NodeKind::Mesh { .. }) {
                count += 1;
            }
        });
        count
    }
}

/// Mesh flattened for drawing.
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub mesh: Arc<MeshData>,
    pub material: Material,
    pub model: Mat4,
}

/// Root of everything the renderer draws.
#[derive(Debug, Clone)]
pub struct SceneGraph {
    root: SceneNode,
    pub background: Option<Vec3>,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            root: SceneNode::group("scene"),
            background: None,
        }
    }

    pub fn root(&self) -> &SceneNode {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut SceneNode {
        &mut self.root
    }

    pub fn add(&mut self, node: SceneNode) {
        self.root.add_child(node);
    }

    pub fn remove(&mut self, name: &str) -> Option<SceneNode> {
        self.root.remove_child(name)
    }

    pub fn lights(&self) -> Vec<Light> {
        let mut lights = Vec::new();
        self.root.visit(Mat4::IDENTITY, &mut |node: &SceneNode, world: Mat4| {
            if let NodeKind::Light(light) = node.kind {
                lights.push(Light {
                    position: world.transform_point3(light.position),
                    ..light
                });
            }
        });
        lights
    }

    pub fn draw_list(&self) -> Vec<DrawItem> {
        let mut items = Vec::new();
        self.root.visit(Mat4::IDENTITY, &mut |node: &SceneNode, world: Mat4| {
            if let NodeKind::Mesh { mesh, material } = &node.kind {
                items.push(DrawItem {
                    mesh: Arc::clone(mesh),
                    material: material.clone(),
                    model: world,
                });
            }
        });
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Arc<MeshData> {
        Arc::new(MeshData::new(
            vec![
                0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0,
                0.0, 1.0,
            ],
            vec![0, 1, 2],
        ))
    }

    fn material(name: &str, color: Vec3) -> Material {
        Material {
            name: name.to_string(),
            color,
            ..Material::default()
        }
    }

    #[test]
    fn draw_list_composes_parent_transforms() {
        let mut parent = SceneNode::group("model");
        parent.transform.translation = Vec3::new(1.0, 0.0, 0.0);
        let mut child = SceneNode::mesh("part", triangle(), Material::default());
        child.transform.translation = Vec3::new(0.0, 2.0, 0.0);
        parent.add_child(child);

        let mut scene = SceneGraph::new();
        scene.add(parent);
        let items = scene.draw_list();
        assert_eq!(items.len(), 1);
        let origin = items[0].model.transform_point3(Vec3::ZERO);
        assert_eq!(origin, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn replace_materials_only_touches_matching_meshes() {
        let red = Vec3::new(1.0, 0.0, 0.0);
        let mut root = SceneNode::group("model")
            .with_child(SceneNode::mesh("a", triangle(), material("paint", red)))
            .with_child(
                SceneNode::group("nested")
                    .with_child(SceneNode::mesh("b", triangle(), material("paint", red))),
            )
            .with_child(SceneNode::mesh("c", triangle(), material("steel", Vec3::ONE)))
            .with_child(SceneNode::light(
                "sun",
                Light::directional(red, 1.0, Vec3::Y),
            ));

        let replaced = root.replace_materials(
            |material| material.color == red,
            |material| Material {
                emissive: material.color,
                ..material.clone()
            },
        );
        assert_eq!(replaced, 2);
        match &root.find("b").unwrap().kind {
            NodeKind::Mesh { material, .. } => assert_eq!(material.emissive, red),
            other => panic!("unexpected node kind {other:?}"),
        }
        match &root.find("c").unwrap().kind {
            NodeKind::Mesh { material, .. } => assert_eq!(material.emissive, Vec3::ZERO),
            other => panic!("unexpected node kind {other:?}"),
        }
    }

    #[test]
    fn lights_are_collected_in_world_space() {
        let mut scene = SceneGraph::new();
        let mut rig = SceneNode::group("rig");
        rig.transform.translation = Vec3::new(0.0, 5.0, 0.0);
        rig.add_child(SceneNode::light(
            "key",
            Light::directional(Vec3::ONE, 2.0, Vec3::new(1.0, 0.0, 0.0)),
        ));
        scene.add(rig);
        scene.add(SceneNode::light("fill", Light::ambient(Vec3::ONE, 0.2)));

        let lights = scene.lights();
        assert_eq!(lights.len(), 2);
        assert_eq!(lights[0].position, Vec3::new(1.0, 5.0, 0.0));
        assert_eq!(lights[1].kind, LightKind::Ambient);
    }

    #[test]
    fn mesh_ids_are_unique() {
        assert_ne!(triangle().id(), triangle().id());
        let mut scene = SceneGraph::new();
        scene.add(SceneNode::mesh("m", triangle(), Material::default()));
        assert!(scene.remove("m").is_some());
        assert!(scene.remove("m").is_none());
    }
}
