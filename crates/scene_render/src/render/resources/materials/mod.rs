//! Material system
//!
//! Material definitions and the registry owning them.

pub mod material;
pub mod material_registry;

pub use material::{AlphaMode, Material, MaterialId, MaterialPass, PolygonMode, ProgramId};
pub use material_registry::MaterialRegistry;
