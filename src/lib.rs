//! scene-ngin
//!
//! A minimal real-time rendering bootstrap. It opens a window and a GPU context from a
//! JSON settings file, imports a glTF or OBJ scene into GPU meshes and draws them every
//! frame with a single user-supplied shader program. Material textures are bound to
//! shader uniforms by name (`material.texture_diffuse1`, `material.texture_specular1`, ...).
//!
//! High-level modules
//! - `camera`: frame uniform and the view that frames the imported scene
//! - `config`: settings record and its lenient JSON loader
//! - `context`: window surface, device, queue and the shared bind group layouts
//! - `data_structures`: vertices, meshes, textures, material naming and scenes
//! - `flow`: the frame driver and event loop
//! - `pipelines`: shader compilation, linking and uniform access
//! - `resources`: scene import and geometry post-processing
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod flow;
pub mod pipelines;
pub mod resources;
