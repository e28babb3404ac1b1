//! Render pipeline construction and the user shader program.

pub mod basic;
pub mod shader;
