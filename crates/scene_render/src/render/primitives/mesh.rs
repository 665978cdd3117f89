//! Mesh and mesh chunk descriptions
//!
//! A mesh is a set of chunks sharing vertex and index buffers. Each chunk is
//! the unit of drawing: it carries its element range inside the mesh buffers
//! and a local-space bounding volume. Vertex data itself lives on the device.

use std::collections::HashMap;

use crate::scene::bounds::BoundingVolume;

/// Identifier of a mesh in a [`MeshRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

/// Identifies one chunk of one mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkHandle {
    /// Owning mesh
    pub mesh: MeshId,
    /// Chunk index inside the mesh
    pub index: u32,
}

/// One drawable range of a mesh
#[derive(Debug, Clone, PartialEq)]
pub struct MeshChunk {
    handle: ChunkHandle,
    vertices_count: u32,
    elements_count: u32,
    first_index: u32,
    base_vertex: i32,
    bounds: BoundingVolume,
    frustum_test: bool,
}

impl MeshChunk {
    /// Describe a chunk with `vertices_count` vertices and `elements_count` indices
    pub fn new(vertices_count: u32, elements_count: u32, bounds: BoundingVolume) -> Self {
        Self {
            handle: ChunkHandle {
                mesh: MeshId(0),
                index: 0,
            },
            vertices_count,
            elements_count,
            first_index: 0,
            base_vertex: 0,
            bounds,
            frustum_test: true,
        }
    }

    /// Set the range of this chunk inside the mesh buffers
    pub fn with_range(mut self, first_index: u32, base_vertex: i32) -> Self {
        self.first_index = first_index;
        self.base_vertex = base_vertex;
        self
    }

    /// Enable or disable frustum testing for nodes drawing this chunk
    pub fn with_frustum_test(mut self, enabled: bool) -> Self {
        self.frustum_test = enabled;
        self
    }

    /// Handle assigned when the chunk was added to a mesh
    pub fn handle(&self) -> ChunkHandle {
        self.handle
    }

    /// Vertex count
    pub fn vertices_count(&self) -> u32 {
        self.vertices_count
    }

    /// Index count
    pub fn elements_count(&self) -> u32 {
        self.elements_count
    }

    /// Triangles drawn per instance
    pub fn triangles_count(&self) -> u32 {
        if self.elements_count > 0 {
            self.elements_count / 3
        } else {
            self.vertices_count / 3
        }
    }

    /// First index inside the mesh index buffer
    pub fn first_index(&self) -> u32 {
        self.first_index
    }

    /// Offset added to each index
    pub fn base_vertex(&self) -> i32 {
        self.base_vertex
    }

    /// Local-space bounding volume
    pub fn bounds(&self) -> &BoundingVolume {
        &self.bounds
    }

    /// Whether nodes drawing this chunk take part in frustum culling
    pub fn frustum_test(&self) -> bool {
        self.frustum_test
    }
}

/// A named collection of chunks
#[derive(Debug, Clone)]
pub struct Mesh {
    id: MeshId,
    name: String,
    chunks: Vec<MeshChunk>,
    invalidated: bool,
}

impl Mesh {
    /// Mesh identifier
    pub fn id(&self) -> MeshId {
        self.id
    }

    /// Mesh name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a chunk, returning its handle
    ///
    /// Chunks without any geometry are skipped.
    pub fn add_chunk(&mut self, mut chunk: MeshChunk) -> Option<ChunkHandle> {
        if chunk.vertices_count == 0 && chunk.elements_count == 0 {
            log::warn!("Mesh '{}': skipping chunk without geometry", self.name);
            return None;
        }

        let handle = ChunkHandle {
            mesh: self.id,
            index: self.chunks.len() as u32,
        };
        chunk.handle = handle;
        self.chunks.push(chunk);
        Some(handle)
    }

    /// Chunk by index
    pub fn chunk(&self, index: u32) -> Option<&MeshChunk> {
        self.chunks.get(index as usize)
    }

    /// All chunks
    pub fn chunks(&self) -> &[MeshChunk] {
        &self.chunks
    }

    /// Replace the local bounds of a chunk; marks the mesh invalidated
    pub fn set_chunk_bounds(&mut self, index: u32, bounds: BoundingVolume) -> bool {
        match self.chunks.get_mut(index as usize) {
            Some(chunk) => {
                chunk.bounds = bounds;
                self.invalidated = true;
                true
            }
            None => false,
        }
    }

    /// Whether geometry or bounds changed since the last frame
    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    /// Mark geometry as changed
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    /// Clear the invalidated flag
    pub fn validate(&mut self) {
        self.invalidated = false;
    }
}

/// Owner of all meshes used by scenes
#[derive(Debug, Default)]
pub struct MeshRegistry {
    meshes: HashMap<MeshId, Mesh>,
    next_id: u32,
}

impl MeshRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            meshes: HashMap::new(),
            next_id: 1,
        }
    }

    /// Create an empty mesh
    pub fn create_mesh(&mut self, name: impl Into<String>) -> MeshId {
        let id = MeshId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        let name = name.into();
        log::debug!("Created mesh {:?} '{}'", id, name);
        self.meshes.insert(
            id,
            Mesh {
                id,
                name,
                chunks: Vec::new(),
                invalidated: true,
            },
        );
        id
    }

    /// Mesh by id
    pub fn get(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(&id)
    }

    /// Mutable mesh by id
    pub fn get_mut(&mut self, id: MeshId) -> Option<&mut Mesh> {
        self.meshes.get_mut(&id)
    }

    /// Chunk by handle
    pub fn chunk(&self, handle: ChunkHandle) -> Option<&MeshChunk> {
        self.meshes.get(&handle.mesh)?.chunk(handle.index)
    }

    /// Remove a mesh
    pub fn remove(&mut self, id: MeshId) -> Option<Mesh> {
        self.meshes.remove(&id)
    }

    /// Number of meshes
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Clear the invalidated flag of every mesh
    pub fn validate_all(&mut self) {
        for mesh in self.meshes.values_mut() {
            mesh.validate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    fn unit_bounds() -> BoundingVolume {
        BoundingVolume::from_min_max(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_chunks_get_sequential_handles() {
        let mut registry = MeshRegistry::new();
        let id = registry.create_mesh("box");
        let mesh = registry.get_mut(id).unwrap();

        let a = mesh.add_chunk(MeshChunk::new(24, 36, unit_bounds())).unwrap();
        let b = mesh.add_chunk(MeshChunk::new(4, 6, unit_bounds())).unwrap();

        assert_eq!(a, ChunkHandle { mesh: id, index: 0 });
        assert_eq!(b.index, 1);
        assert_eq!(registry.chunk(b).unwrap().triangles_count(), 2);
    }

    #[test]
    fn test_empty_chunk_skipped() {
        let mut registry = MeshRegistry::new();
        let id = registry.create_mesh("empty");
        let mesh = registry.get_mut(id).unwrap();
        assert!(mesh.add_chunk(MeshChunk::new(0, 0, unit_bounds())).is_none());
        assert!(mesh.chunks().is_empty());
    }

    #[test]
    fn test_bounds_change_invalidates_mesh() {
        let mut registry = MeshRegistry::new();
        let id = registry.create_mesh("box");
        registry.get_mut(id).unwrap().add_chunk(MeshChunk::new(3, 3, unit_bounds()));
        registry.validate_all();
        assert!(!registry.get(id).unwrap().is_invalidated());

        assert!(registry.get_mut(id).unwrap().set_chunk_bounds(0, BoundingVolume::default()));
        assert!(registry.get(id).unwrap().is_invalidated());
    }
}
