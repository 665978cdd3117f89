//! Material registry
//!
//! Central owner of materials, keyed by [`MaterialId`].

use std::collections::HashMap;

use super::{Material, MaterialId};

/// Central registry for materials
#[derive(Debug)]
pub struct MaterialRegistry {
    /// All registered materials
    materials: HashMap<MaterialId, Material>,
    /// Next available material ID
    next_id: u32,
}

impl MaterialRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            materials: HashMap::new(),
            next_id: 1, // 0 is the id of unregistered materials
        }
    }

    /// Register a material and assign it an id
    pub fn register(&mut self, mut material: Material) -> MaterialId {
        let id = MaterialId(self.next_id);
        self.next_id += 1;
        material.id = id;

        log::debug!(
            "Registered material {:?} ({}) with {} pass slots",
            id,
            material.name.as_deref().unwrap_or("unnamed"),
            material.pass_count()
        );
        self.materials.insert(id, material);
        id
    }

    /// Get a material by ID
    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(&id)
    }

    /// Get a mutable material by ID
    pub fn get_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(&id)
    }

    /// Remove a material
    pub fn remove(&mut self, id: MaterialId) -> Option<Material> {
        self.materials.remove(&id)
    }

    /// Get number of registered materials
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Whether no material is registered
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

impl Default for MaterialRegistry {
    fn default() -> Self {
        Self::new()
    }
}
