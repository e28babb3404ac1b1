//! Texture binding convention shared by meshes and shaders.
//!
//! Every texture of a mesh is bound to its own sampler unit, unit `i` for the `i`-th
//! texture. The shader finds out which unit holds which texture through integer
//! uniforms named `material.texture_<kind><n>`, where `n` counts occurrences of that
//! kind within the mesh starting at 1.

use std::fmt;

/// Number of sampler units in the material bind group.
pub const MAX_TEXTURE_UNITS: usize = 4;

/// Name of the per-draw uniform block as declared in WGSL.
pub const MATERIAL_UNIFORM: &str = "material";

/// Semantic slot of a material texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Diffuse,
    Specular,
    Normal,
    Height,
    Emissive,
    Occlusion,
}

impl TextureKind {
    pub const ALL: [TextureKind; 6] = [
        TextureKind::Diffuse,
        TextureKind::Specular,
        TextureKind::Normal,
        TextureKind::Height,
        TextureKind::Emissive,
        TextureKind::Occlusion,
    ];

    /// Uniform prefix used by shaders for this kind, e.g. `texture_diffuse`.
    pub fn uniform_prefix(self) -> &'static str {
        match self {
            TextureKind::Diffuse => "texture_diffuse",
            TextureKind::Specular => "texture_specular",
            TextureKind::Normal => "texture_normal",
            TextureKind::Height => "texture_height",
            TextureKind::Emissive => "texture_emissive",
            TextureKind::Occlusion => "texture_occlusion",
        }
    }

    /// Colour textures are sampled as sRGB, data textures as linear values.
    pub fn is_srgb(self) -> bool {
        matches!(self, TextureKind::Diffuse | TextureKind::Emissive)
    }
}

impl fmt::Display for TextureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uniform_prefix())
    }
}

/// Where one texture of a mesh is bound and which uniform announces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBinding {
    pub kind: TextureKind,
    pub uniform_name: String,
    pub unit: u32,
}

/// Assign sampler units and uniform names to textures in mesh order.
pub fn bind_textures(kinds: impl IntoIterator<Item = TextureKind>) -> Vec<TextureBinding> {
    let mut counters = [0u32; TextureKind::ALL.len()];
    kinds
        .into_iter()
        .enumerate()
        .map(|(unit, kind)| {
            let counter = &mut counters[kind as usize];
            *counter += 1;
            TextureBinding {
                kind,
                uniform_name: format!("{MATERIAL_UNIFORM}.{}{}", kind.uniform_prefix(), counter),
                unit: unit as u32,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn repeated_kinds_are_numbered_from_one() {
        let bindings = bind_textures([TextureKind::Diffuse, TextureKind::Diffuse]);
        let names: Vec<_> = bindings.iter().map(|b| b.uniform_name.as_str()).collect();
        assert_eq!(names, ["material.texture_diffuse1", "material.texture_diffuse2"]);
    }

    #[test]
    fn counters_are_tracked_per_kind() {
        let bindings = bind_textures([
            TextureKind::Diffuse,
            TextureKind::Specular,
            TextureKind::Diffuse,
            TextureKind::Normal,
        ]);
        let names: Vec<_> = bindings.iter().map(|b| b.uniform_name.as_str()).collect();
        assert_eq!(
            names,
            [
                "material.texture_diffuse1",
                "material.texture_specular1",
                "material.texture_diffuse2",
                "material.texture_normal1",
            ]
        );
    }

    #[test]
    fn every_texture_gets_its_own_unit() {
        let bindings = bind_textures([
            TextureKind::Diffuse,
            TextureKind::Specular,
            TextureKind::Specular,
            TextureKind::Height,
        ]);
        let units: HashSet<_> = bindings.iter().map(|b| b.unit).collect();
        assert_eq!(units.len(), bindings.len());
        assert_eq!(bindings.iter().map(|b| b.unit).collect::<Vec<_>>(), [0, 1, 2, 3]);
    }
}
