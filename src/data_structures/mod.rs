//! Engine data structures: vertices, meshes, textures and scenes.
//!
//! - `material` names the shader uniform and sampler unit of each material texture
//! - `model` contains the vertex format, validated mesh data and GPU meshes
//! - `scene` holds imported scenes before and after upload
//! - `texture` contains the GPU texture wrapper and creation utilities

pub mod material;
pub mod model;
pub mod scene;
pub mod texture;
