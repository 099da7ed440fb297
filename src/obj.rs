//! Minimal Wavefront OBJ decoder used by the built-in asset loaders.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;

use crate::scene::MeshData;

/// Parses OBJ text into an interleaved position/normal mesh.
///
/// Polygons are fan-triangulated. Texture coordinates are ignored, and
/// vertices without a normal get smooth normals computed from the faces.
pub fn parse_obj(data: &str) -> Result<MeshData> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut triangles: Vec<[Corner; 3]> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "f" => {
                let polygon = parse_face(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                for i in 1..polygon.len() - 1 {
                    triangles.push([polygon[0], polygon[i], polygon[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ data does not define any vertices"));
    }
    if triangles.is_empty() {
        return Err(anyhow!("OBJ data does not define any faces"));
    }

    let (mut vertices, indices) = weld(&positions, &normals, &triangles)?;
    if vertices
        .chunks_exact(MeshData::STRIDE)
        .any(|chunk| chunk[3] == 0.0 && chunk[4] == 0.0 && chunk[5] == 0.0)
    {
        smooth_normals(&mut vertices, &indices);
    }
    Ok(MeshData::new(vertices, indices))
}

#[derive(Debug, Clone, Copy)]
struct Corner {
    position: i32,
    normal: i32,
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let mut next = || -> Result<f32> {
        Ok(parts
            .next()
            .ok_or_else(|| anyhow!("missing vector component"))?
            .parse::<f32>()?)
    };
    Ok(Vec3::new(next()?, next()?, next()?))
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<Corner>> {
    let mut corners = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let position = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let normal = segments
            .nth(1)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<i32>())
            .transpose()?
            .unwrap_or(0);
        corners.push(Corner { position, normal });
    }
    if corners.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(corners)
}

fn weld(
    positions: &[Vec3],
    normals: &[Vec3],
    triangles: &[[Corner; 3]],
) -> Result<(Vec<f32>, Vec<u32>)> {
    let mut lookup: HashMap<(usize, Option<usize>), u32> = HashMap::new();
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for triangle in triangles {
        for corner in triangle {
            let position = resolve_index(corner.position, positions.len())
                .ok_or_else(|| anyhow!("vertex index {} out of range", corner.position))?;
            let normal = resolve_index(corner.normal, normals.len());
            let next_index = (vertices.len() / MeshData::STRIDE) as u32;
            let index = *lookup.entry((position, normal)).or_insert_with(|| {
                let p = positions[position];
                let n = normal.map(|i| normals[i]).unwrap_or(Vec3::ZERO);
                vertices.extend_from_slice(&[p.x, p.y, p.z, n.x, n.y, n.z]);
                next_index
            });
            indices.push(index);
        }
    }

    Ok((vertices, indices))
}

/// OBJ indices are one-based; negative values count back from the end.
fn resolve_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let back = index.unsigned_abs() as usize;
        (back <= len).then(|| len - back)
    } else {
        None
    }
}

fn smooth_normals(vertices: &mut [f32], indices: &[u32]) {
    let stride = MeshData::STRIDE;
    let mut accum = vec![Vec3::ZERO; vertices.len() / stride];

    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let p = |i: usize| Vec3::from_slice(&vertices[i * stride..i * stride + 3]);
        let normal = (p(b) - p(a)).cross(p(c) - p(a));
        if normal.length_squared() > f32::EPSILON {
            let normal = normal.normalize();
            accum[a] += normal;
            accum[b] += normal;
            accum[c] += normal;
        }
    }

    for (i, normal) in accum.into_iter().enumerate() {
        let slot = &mut vertices[i * stride + 3..i * stride + 6];
        if slot.iter().any(|component| *component != 0.0) {
            continue;
        }
        slot.copy_from_slice(&normal.normalize_or_zero().to_array());
    }
}
