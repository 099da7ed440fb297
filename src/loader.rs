//! Asynchronous asset loading.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
#[cfg(not(target_arch = "wasm32"))]
use std::path::PathBuf;
use std::sync::Arc;

use crate::animation::AnimationClip;
use crate::error::AssetLoadError;
use crate::obj::parse_obj;
use crate::scene::{Material, SceneNode};

/// Result of a successful load: a subtree ready to attach under the scene
/// root, plus any animation clips that target it.
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    pub root: SceneNode,
    pub animations: Vec<AnimationClip>,
}

/// Resolves a resource locator into a [`LoadedAsset`].
pub trait AssetLoader {
    fn load(&self, url: &str) -> impl Future<Output = Result<LoadedAsset, AssetLoadError>>;
}

/// Decodes raw bytes using the extension of `url` to pick the format.
pub fn decode_asset(url: &str, bytes: &[u8]) -> Result<LoadedAsset, AssetLoadError> {
    let path = Path::new(url.split(['?', '#']).next().unwrap_or(url));
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("model")
        .to_string();

    match extension.as_str() {
        "obj" => {
            let text = std::str::from_utf8(bytes).map_err(|err| AssetLoadError::Decode {
                url: url.to_string(),
                reason: format!("not valid UTF-8: {err}"),
            })?;
            let mesh = parse_obj(text).map_err(|err| AssetLoadError::Decode {
                url: url.to_string(),
                reason: format!("{err:#}"),
            })?;
            log::debug!(
                "decoded {url}: {} vertices, {} triangles",
                mesh.vertex_count(),
                mesh.indices.len() / 3
            );
            let root = SceneNode::group(name.clone()).with_child(SceneNode::mesh(
                format!("{name}-mesh"),
                Arc::new(mesh),
                Material::default(),
            ));
            Ok(LoadedAsset {
                root,
                animations: Vec::new(),
            })
        }
        other => Err(AssetLoadError::UnsupportedFormat(if other.is_empty() {
            url.to_string()
        } else {
            other.to_string()
        })),
    }
}

/// Loads assets from the local filesystem, relative to `root`.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let path = Path::new(url);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl AssetLoader for FileLoader {
    async fn load(&self, url: &str) -> Result<LoadedAsset, AssetLoadError> {
        let path = self.resolve(url);
        let bytes = std::fs::read(&path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => AssetLoadError::NotFound(path.display().to_string()),
            _ => AssetLoadError::Io {
                url: url.to_string(),
                source: err,
            },
        })?;
        decode_asset(url, &bytes)
    }
}

/// Serves assets from memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(url, bytes);
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(url.into(), bytes.into());
    }
}

impl AssetLoader for MemoryLoader {
    async fn load(&self, url: &str) -> Result<LoadedAsset, AssetLoadError> {
        let bytes = self
            .files
            .get(url)
            .ok_or_else(|| AssetLoadError::NotFound(url.to_string()))?;
        decode_asset(url, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TRIANGLE: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

    #[test]
    fn decodes_obj_into_named_subtree() {
        let asset = decode_asset("models/ion-drive.obj?v=2", TRIANGLE.as_bytes()).unwrap();
        assert_eq!(asset.root.name, "ion-drive");
        assert_eq!(asset.root.mesh_count(), 1);
        assert!(asset.animations.is_empty());
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = decode_asset("scene.gltf", b"{}").unwrap_err();
        assert!(matches!(err, AssetLoadError::UnsupportedFormat(ext) if ext == "gltf"));
    }

    #[test]
    fn garbage_obj_is_a_decode_error() {
        let err = decode_asset("broken.obj", b"f 1 2 3\n").unwrap_err();
        assert!(matches!(err, AssetLoadError::Decode { .. }));
    }

    #[test]
    fn memory_loader_reports_missing_files() {
        let loader = MemoryLoader::new().with_file("a.obj", TRIANGLE);
        assert!(pollster::block_on(loader.load("a.obj")).is_ok());
        let err = pollster::block_on(loader.load("b.obj")).unwrap_err();
        assert!(matches!(err, AssetLoadError::NotFound(url) if url == "b.obj"));
    }

    #[test]
    fn file_loader_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("tri.obj")).unwrap();
        file.write_all(TRIANGLE.as_bytes()).unwrap();

        let loader = FileLoader::new(dir.path());
        let asset = pollster::block_on(loader.load("tri.obj")).unwrap();
        assert_eq!(asset.root.name, "tri");
        let err = pollster::block_on(loader.load("missing.obj")).unwrap_err();
        assert!(matches!(err, AssetLoadError::NotFound(_)));
    }
}
