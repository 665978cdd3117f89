//! Material and material pass definitions
//!
//! A material owns an indexed list of passes. A look selects the pass index
//! it renders with; a material without a pass at that index, or with an
//! empty pass there, does not take part in that look. A pass that blends
//! places its nodes in the transparent stage.

use serde::{Deserialize, Serialize};

/// Unique identifier for materials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// Shader program identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub u32);

/// Alpha modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum AlphaMode {
    /// No transparency
    #[default]
    Opaque,
    /// Alpha testing with cutoff value
    Mask(f32),
    /// Alpha blending
    Blend,
}

/// Rasterization mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolygonMode {
    /// Filled triangles
    #[default]
    Fill,
    /// Wireframe
    Line,
    /// Vertices only
    Point,
}

/// One pass of a material
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialPass {
    program: Option<ProgramId>,
    alpha_mode: AlphaMode,
    double_sided: bool,
    polygon_mode: PolygonMode,
    texture_units: u32,
    uniform_blocks: u32,
}

impl MaterialPass {
    /// Pass drawn with `program`
    pub fn new(program: ProgramId) -> Self {
        Self {
            program: Some(program),
            ..Self::default()
        }
    }

    /// A pass without a program; nodes are skipped for it
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set the alpha mode
    pub fn with_alpha_mode(mut self, alpha_mode: AlphaMode) -> Self {
        self.alpha_mode = alpha_mode;
        self
    }

    /// Disable back-face culling
    pub fn with_double_sided(mut self, double_sided: bool) -> Self {
        self.double_sided = double_sided;
        self
    }

    /// Set the polygon mode
    pub fn with_polygon_mode(mut self, polygon_mode: PolygonMode) -> Self {
        self.polygon_mode = polygon_mode;
        self
    }

    /// Set the number of texture units and uniform blocks the pass binds
    pub fn with_bindings(mut self, texture_units: u32, uniform_blocks: u32) -> Self {
        self.texture_units = texture_units;
        self.uniform_blocks = uniform_blocks;
        self
    }

    /// Shader program
    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    /// Alpha mode
    pub fn alpha_mode(&self) -> AlphaMode {
        self.alpha_mode
    }

    /// Whether the pass draws in the transparent stage
    pub fn is_blended(&self) -> bool {
        matches!(self.alpha_mode, AlphaMode::Blend)
    }

    /// Whether back faces are drawn
    pub fn double_sided(&self) -> bool {
        self.double_sided
    }

    /// Polygon mode
    pub fn polygon_mode(&self) -> PolygonMode {
        self.polygon_mode
    }

    /// Texture units bound when applied
    pub fn texture_units(&self) -> u32 {
        self.texture_units
    }

    /// Uniform blocks bound when applied
    pub fn uniform_blocks(&self) -> u32 {
        self.uniform_blocks
    }

    /// Whether the pass has no program
    pub fn is_empty(&self) -> bool {
        self.program.is_none()
    }
}

/// Material resource
#[derive(Debug, Clone)]
pub struct Material {
    /// Unique identifier, assigned by the registry
    pub id: MaterialId,
    /// Optional name for debugging
    pub name: Option<String>,
    passes: Vec<Option<MaterialPass>>,
}

impl Material {
    /// Material without passes
    pub fn new() -> Self {
        Self {
            id: MaterialId(0),
            name: None,
            passes: Vec::new(),
        }
    }

    /// Material with `pass` at index 0
    pub fn with_pass(pass: MaterialPass) -> Self {
        let mut material = Self::new();
        material.set_pass(0, pass);
        material
    }

    /// Set material name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Install `pass` at `index`, leaving gaps empty
    pub fn set_pass(&mut self, index: u16, pass: MaterialPass) {
        let index = usize::from(index);
        if self.passes.len() <= index {
            self.passes.resize(index + 1, None);
        }
        self.passes[index] = Some(pass);
    }

    /// Pass at `index`, if any
    pub fn pass(&self, index: u16) -> Option<&MaterialPass> {
        self.passes.get(usize::from(index))?.as_ref()
    }

    /// Pass at `index` when it can be drawn
    pub fn drawable_pass(&self, index: u16) -> Option<&MaterialPass> {
        self.pass(index).filter(|pass| !pass.is_empty())
    }

    /// Number of pass slots
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_empty_passes_not_drawable() {
        let mut material = Material::with_pass(MaterialPass::new(ProgramId(1)));
        material.set_pass(2, MaterialPass::empty());

        assert!(material.drawable_pass(0).is_some());
        assert!(material.pass(1).is_none());
        assert!(material.pass(2).is_some());
        assert!(material.drawable_pass(2).is_none());
        assert!(material.drawable_pass(7).is_none());
        assert_eq!(material.pass_count(), 3);
    }

    #[test]
    fn test_blend_mode_selects_transparent_stage() {
        let opaque = MaterialPass::new(ProgramId(1)).with_alpha_mode(AlphaMode::Mask(0.5));
        let blended = MaterialPass::new(ProgramId(1)).with_alpha_mode(AlphaMode::Blend);
        assert!(!opaque.is_blended());
        assert!(blended.is_blended());
    }
}
