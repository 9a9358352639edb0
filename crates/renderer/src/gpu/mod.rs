//! `wgpu` rendering context for on-screen windows.
//!
//! Shader stages arrive as GLSL and are handed to wgpu's naga front end; the
//! uniform block always sits at `set = 0, binding = 0`.

mod context;

pub use context::{WgpuContext, WindowTarget};
