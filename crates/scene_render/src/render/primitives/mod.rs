//! Camera and mesh primitives consumed by scenes

pub mod camera;
pub mod mesh;

pub use camera::{Camera, CameraId};
pub use mesh::{ChunkHandle, Mesh, MeshChunk, MeshId, MeshRegistry};
