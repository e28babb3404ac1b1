//! Geometry clean-up applied to every imported mesh.
//!
//! Importers hand over loosely structured attribute streams. The passes here turn
//! them into triangle lists over deduplicated [`Vertex`] records.

use std::collections::HashMap;

use crate::data_structures::model::Vertex;

/// Processing steps requested from the importers.
///
/// The set is fixed; it is kept as a value so the import log states what was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportFlags {
    pub triangulate: bool,
    pub calc_tangent_space: bool,
    pub join_identical_vertices: bool,
    pub sort_by_primitive_type: bool,
}

impl Default for ImportFlags {
    fn default() -> Self {
        Self {
            triangulate: true,
            calc_tangent_space: true,
            join_identical_vertices: true,
            sort_by_primitive_type: true,
        }
    }
}

/// Attribute streams of one imported primitive before clean-up.
#[derive(Debug, Clone, Default)]
pub struct RawGeometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tex_coords: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl RawGeometry {
    /// Zip the streams into vertices. Missing normals and tex coords become zero.
    pub fn vertices(&self) -> Vec<Vertex> {
        self.positions
            .iter()
            .enumerate()
            .map(|(i, &position)| Vertex {
                position,
                normal: self.normals.get(i).copied().unwrap_or_default(),
                tex_coords: self.tex_coords.get(i).copied().unwrap_or_default(),
            })
            .collect()
    }
}

/// Triangle list indices for a triangle strip.
///
/// Every second triangle swaps its first two corners so all keep the strip's winding.
pub fn triangulate_strip(strip: &[u32]) -> Vec<u32> {
    strip
        .windows(3)
        .enumerate()
        .flat_map(|(i, w)| {
            if i % 2 == 0 {
                [w[0], w[1], w[2]]
            } else {
                [w[1], w[0], w[2]]
            }
        })
        .collect()
}

/// Triangle list indices for a triangle fan around its first index.
pub fn triangulate_fan(fan: &[u32]) -> Vec<u32> {
    match fan.split_first() {
        Some((&hub, rim)) => rim.windows(2).flat_map(|w| [hub, w[0], w[1]]).collect(),
        None => Vec::new(),
    }
}

/// Merge bit-identical vertices and remap `indices` onto the survivors.
///
/// Survivors keep the order of their first occurrence.
pub fn join_identical_vertices(vertices: &[Vertex], indices: &[u32]) -> (Vec<Vertex>, Vec<u32>) {
    let mut unique = Vec::with_capacity(vertices.len());
    let mut seen: HashMap<[u32; 8], u32> = HashMap::with_capacity(vertices.len());
    let remap: Vec<u32> = vertices
        .iter()
        .map(|v| {
            let key: [u32; 8] = bytemuck::cast(*v);
            *seen.entry(key).or_insert_with(|| {
                unique.push(*v);
                (unique.len() - 1) as u32
            })
        })
        .collect();
    let indices = indices
        .iter()
        .map(|&i| remap.get(i as usize).copied().unwrap_or(i))
        .collect();
    (unique, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f32) -> Vertex {
        Vertex {
            position: [x, 0.0, 0.0],
            ..Default::default()
        }
    }

    #[test]
    fn strips_keep_alternating_winding() {
        assert_eq!(triangulate_strip(&[0, 1, 2, 3, 4]), [0, 1, 2, 2, 1, 3, 2, 3, 4]);
        assert!(triangulate_strip(&[0, 1]).is_empty());
    }

    #[test]
    fn fans_share_the_first_vertex() {
        assert_eq!(triangulate_fan(&[0, 1, 2, 3]), [0, 1, 2, 0, 2, 3]);
        assert!(triangulate_fan(&[]).is_empty());
    }

    #[test]
    fn duplicates_collapse_onto_first_occurrence() {
        let vertices = [at(0.0), at(1.0), at(0.0), at(2.0), at(1.0)];
        let (unique, indices) = join_identical_vertices(&vertices, &[0, 1, 2, 2, 3, 4]);
        assert_eq!(unique, [at(0.0), at(1.0), at(2.0)]);
        assert_eq!(indices, [0, 1, 0, 0, 2, 1]);
    }

    #[test]
    fn vertices_differing_in_uv_stay_separate() {
        let mut other = at(0.0);
        other.tex_coords = [0.5, 0.5];
        let (unique, _) = join_identical_vertices(&[at(0.0), other], &[0, 1, 0]);
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn missing_attributes_default_to_zero() {
        let raw = RawGeometry {
            positions: vec![[1.0, 2.0, 3.0]],
            ..Default::default()
        };
        assert_eq!(raw.vertices()[0].normal, [0.0; 3]);
        assert_eq!(raw.vertices()[0].tex_coords, [0.0; 2]);
    }
}
