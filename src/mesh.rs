use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use parking_lot::RwLock;
use thiserror::Error;

/// Triangle mesh kept in a form usable both for ray tests and GPU upload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
}

/// Errors produced while parsing an OBJ file.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("OBJ file does not define any vertices")]
    Empty,
    #[error("invalid {kind} on line {line}")]
    Malformed { kind: &'static str, line: usize },
    #[error("face references vertex {index} outside of the file")]
    IndexOutOfRange { index: i32 },
}

impl MeshData {
    /// Parses an OBJ file from memory.
    ///
    /// Handles polygon triangulation, negative (relative) indices and
    /// synthesizes smooth normals when the file omits them.
    pub fn from_obj_str(data: &str) -> Result<Self, MeshError> {
        let mut positions = Vec::new();
        let mut file_normals = Vec::new();
        let mut corners: Vec<Corner> = Vec::new();

        for (line_no, line) in data.lines().enumerate() {
            let line_no = line_no + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut parts = trimmed.split_whitespace();
            match parts.next() {
                Some("v") => positions.push(read_vec3(parts, "vertex", line_no)?),
                Some("vn") => file_normals.push(read_vec3(parts, "normal", line_no)?),
                Some("f") => read_face(parts, line_no, &mut corners)?,
                _ => {}
            }
        }

        if positions.is_empty() {
            return Err(MeshError::Empty);
        }

        let mut mesh = assemble(&positions, &file_normals, &corners)?;
        if mesh.normals.iter().any(|n| *n == Vec3::ZERO) {
            mesh.recompute_normals();
        }
        Ok(mesh)
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Returns the three corner positions of triangle `index`.
    pub fn triangle(&self, index: usize) -> [Vec3; 3] {
        let i = index * 3;
        [
            self.positions[self.indices[i] as usize],
            self.positions[self.indices[i + 1] as usize],
            self.positions[self.indices[i + 2] as usize],
        ]
    }

    /// Radius of the bounding sphere around the local origin.
    pub fn bounding_radius(&self) -> f32 {
        self.positions
            .iter()
            .map(|p| p.length())
            .fold(0.0, f32::max)
    }

    /// Interleaves `position.xyz normal.xyz` for the GPU vertex buffer.
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.positions.len() * 6);
        for (position, normal) in self.positions.iter().zip(&self.normals) {
            out.extend_from_slice(&[position.x, position.y, position.z]);
            out.extend_from_slice(&[normal.x, normal.y, normal.z]);
        }
        out
    }

    /// Axis-aligned box with per-face normals. Backs the built-in
    /// stand-in meshes, which must be ray-testable like any loaded mesh.
    pub fn cuboid(min: Vec3, max: Vec3) -> Self {
        let corners = |axis: usize, sign: f32| -> [Vec3; 4] {
            let pick = |x: f32, y: f32, z: f32| Vec3::new(x, y, z);
            match (axis, sign > 0.0) {
                // +Z, -Z, +X, -X, +Y, -Y faces, counter-clockwise from outside
                (2, true) => [
                    pick(min.x, min.y, max.z),
                    pick(max.x, min.y, max.z),
                    pick(max.x, max.y, max.z),
                    pick(min.x, max.y, max.z),
                ],
                (2, false) => [
                    pick(max.x, min.y, min.z),
                    pick(min.x, min.y, min.z),
                    pick(min.x, max.y, min.z),
                    pick(max.x, max.y, min.z),
                ],
                (0, true) => [
                    pick(max.x, min.y, max.z),
                    pick(max.x, min.y, min.z),
                    pick(max.x, max.y, min.z),
                    pick(max.x, max.y, max.z),
                ],
                (0, false) => [
                    pick(min.x, min.y, min.z),
                    pick(min.x, min.y, max.z),
                    pick(min.x, max.y, max.z),
                    pick(min.x, max.y, min.z),
                ],
                (1, true) => [
                    pick(min.x, max.y, max.z),
                    pick(max.x, max.y, max.z),
                    pick(max.x, max.y, min.z),
                    pick(min.x, max.y, min.z),
                ],
                _ => [
                    pick(min.x, min.y, min.z),
                    pick(max.x, min.y, min.z),
                    pick(max.x, min.y, max.z),
                    pick(min.x, min.y, max.z),
                ],
            }
        };

        let mut mesh = MeshData::default();
        for (axis, sign) in [(2, 1.0), (2, -1.0), (0, 1.0), (0, -1.0), (1, 1.0), (1, -1.0)] {
            let base = mesh.positions.len() as u32;
            let mut normal = Vec3::ZERO;
            normal[axis] = sign;
            mesh.positions.extend(corners(axis, sign));
            mesh.normals.extend([normal; 4]);
            mesh.indices
                .extend([base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    fn recompute_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.positions.len()];
        for triangle in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [
                triangle[0] as usize,
                triangle[1] as usize,
                triangle[2] as usize,
            ];
            let face = (self.positions[i1] - self.positions[i0])
                .cross(self.positions[i2] - self.positions[i0]);
            if face.length_squared() > f32::EPSILON {
                let face = face.normalize();
                accum[i0] += face;
                accum[i1] += face;
                accum[i2] += face;
            }
        }
        self.normals = accum.into_iter().map(|n| n.normalize_or_zero()).collect();
    }
}

#[derive(Debug, Clone, Copy)]
struct Corner {
    position: i32,
    normal: Option<i32>,
}

fn read_vec3<'a>(
    mut parts: impl Iterator<Item = &'a str>,
    kind: &'static str,
    line: usize,
) -> Result<Vec3, MeshError> {
    let mut component = || -> Result<f32, MeshError> {
        parts
            .next()
            .and_then(|s| s.parse::<f32>().ok())
            .ok_or(MeshError::Malformed { kind, line })
    };
    Ok(Vec3::new(component()?, component()?, component()?))
}

fn read_face<'a>(
    parts: impl Iterator<Item = &'a str>,
    line: usize,
    corners: &mut Vec<Corner>,
) -> Result<(), MeshError> {
    let mut polygon = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let position = segments
            .next()
            .and_then(|s| s.parse::<i32>().ok())
            .ok_or(MeshError::Malformed { kind: "face", line })?;
        let _texcoord = segments.next();
        let normal = segments.next().and_then(|s| s.parse::<i32>().ok());
        polygon.push(Corner { position, normal });
    }
    if polygon.len() < 3 {
        return Err(MeshError::Malformed { kind: "face", line });
    }
    // Fan triangulation; demo assets only contain convex polygons.
    for i in 1..polygon.len() - 1 {
        corners.push(polygon[0]);
        corners.push(polygon[i]);
        corners.push(polygon[i + 1]);
    }
    Ok(())
}

fn assemble(
    positions: &[Vec3],
    file_normals: &[Vec3],
    corners: &[Corner],
) -> Result<MeshData, MeshError> {
    let mut lookup: HashMap<(usize, Option<usize>), u32> = HashMap::new();
    let mut mesh = MeshData::default();

    for corner in corners {
        let position = resolve_index(corner.position, positions.len())
            .ok_or(MeshError::IndexOutOfRange {
                index: corner.position,
            })?;
        let normal = corner
            .normal
            .and_then(|index| resolve_index(index, file_normals.len()));
        let key = (position, normal);
        let next = mesh.positions.len() as u32;
        let entry = lookup.entry(key).or_insert_with(|| {
            mesh.positions.push(positions[position]);
            mesh.normals
                .push(normal.map(|i| file_normals[i]).unwrap_or(Vec3::ZERO));
            next
        });
        mesh.indices.push(*entry);
    }

    Ok(mesh)
}

fn resolve_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let back = (-index) as usize;
        (back <= len).then(|| len - back)
    } else {
        None
    }
}

/// Shared name-to-mesh table populated by asset loads and read by the
/// raycaster and the renderer.
#[derive(Debug, Default)]
pub struct MeshRegistry {
    meshes: Arc<RwLock<HashMap<String, Arc<MeshData>>>>,
}

impl Clone for MeshRegistry {
    fn clone(&self) -> Self {
        Self {
            meshes: Arc::clone(&self.meshes),
        }
    }
}

impl MeshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, mesh: MeshData) {
        self.meshes.write().insert(name.into(), Arc::new(mesh));
    }

    pub fn get(&self, name: &str) -> Option<Arc<MeshData>> {
        self.meshes.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.meshes.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.meshes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

    #[test]
    fn parses_simple_triangle() {
        let mesh = MeshData::from_obj_str(TRIANGLE).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.triangle(0)[1], Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn synthesizes_missing_normals() {
        let mesh = MeshData::from_obj_str(TRIANGLE).unwrap();
        for normal in &mesh.normals {
            assert!((normal.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn triangulates_quads_and_relative_indices() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf -4 -3 -2 -1\n";
        let mesh = MeshData::from_obj_str(obj).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn empty_file_is_an_error() {
        assert!(matches!(
            MeshData::from_obj_str("# nothing\n"),
            Err(MeshError::Empty)
        ));
    }

    #[test]
    fn face_index_out_of_range_is_an_error() {
        let obj = "v 0 0 0\nf 1 2 3\n";
        assert!(matches!(
            MeshData::from_obj_str(obj),
            Err(MeshError::IndexOutOfRange { index: 2 })
        ));
    }

    #[test]
    fn bounding_radius_covers_all_vertices() {
        let obj = "v 0 0 0\nv 3 0 0\nv 0 4 0\nf 1 2 3\n";
        let mesh = MeshData::from_obj_str(obj).unwrap();
        assert_eq!(mesh.bounding_radius(), 4.0);
    }

    #[test]
    fn cuboid_has_one_quad_per_face() {
        let mesh = MeshData::cuboid(Vec3::splat(-0.5), Vec3::splat(0.5));
        assert_eq!(mesh.positions.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        assert_eq!(mesh.interleaved().len(), 24 * 6);
    }

    #[test]
    fn cuboid_normals_point_outward() {
        let mesh = MeshData::cuboid(Vec3::splat(-1.0), Vec3::splat(1.0));
        for (position, normal) in mesh.positions.iter().zip(&mesh.normals) {
            assert!(position.dot(*normal) > 0.0);
        }
    }

    #[test]
    fn registry_shares_meshes_between_clones() {
        let registry = MeshRegistry::new();
        let copy = registry.clone();
        registry.insert("cube", MeshData::from_obj_str(TRIANGLE).unwrap());
        assert!(copy.contains("cube"));
        assert_eq!(copy.len(), 1);
    }
}
