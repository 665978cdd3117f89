//! Render flag bitmasks consumed by scene renders and render targets

use bitflags::bitflags;

bitflags! {
    /// Per-look render flags
    ///
    /// Select which stages are drawn, which culling and sorting steps run,
    /// which buffers are cleared before the look and which outputs are written.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderFlags: u32 {
        /// Draw the opaque stage
        const OPAQUE = 1;
        /// Draw the alpha-blended stage
        const TRANSPARENT = 1 << 1;
        /// Clear the color buffer before this look
        const CLEAN_COLOR_BUF = 1 << 2;
        /// Clear the depth buffer before this look
        const CLEAN_DEPTH_BUF = 1 << 3;
        /// Clear the stencil buffer before this look
        const CLEAN_STENCIL_BUF = 1 << 4;
        /// Enable depth testing
        const DEPTH_TEST = 1 << 5;
        /// Write color output
        const COLOR_OUTPUT = 1 << 6;
        /// Write depth output
        const DEPTH_OUTPUT = 1 << 7;
        /// Write stencil output
        const STENCIL_OUTPUT = 1 << 8;
        /// Merge nodes sharing geometry and material into instanced draws
        const INSTANCING = 1 << 9;
        /// Issue and poll hardware occlusion queries
        const OCCLUSION_QUERY = 1 << 10;
        /// Reject nodes whose last occlusion query failed
        const OCCLUSION_CULLING = 1 << 11;
        /// Reject nodes outside the camera frustum
        const FRUSTUM_CULLING = 1 << 12;
        /// Ask the scene observer instead of the built-in frustum test
        const CUSTOM_VISIBILITY_CHECK = 1 << 13;
        /// Sort opaque nodes back to front
        const SORT_OPAQUE_TO_NEAR = 1 << 14;
        /// Sort opaque nodes front to back
        const SORT_OPAQUE_FROM_NEAR = 1 << 15;
        /// Sort blended nodes back to front
        const SORT_TRANSPARENT_TO_NEAR = 1 << 16;
        /// Sort blended nodes front to back
        const SORT_TRANSPARENT_FROM_NEAR = 1 << 17;

        /// Both stages, depth tested, color and depth written
        const DEFAULT = Self::OPAQUE.bits()
            | Self::TRANSPARENT.bits()
            | Self::DEPTH_TEST.bits()
            | Self::COLOR_OUTPUT.bits()
            | Self::DEPTH_OUTPUT.bits();
    }
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

bitflags! {
    /// Framebuffer attachments to clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Color attachment
        const COLOR = 1;
        /// Depth attachment
        const DEPTH = 1 << 1;
        /// Stencil attachment
        const STENCIL = 1 << 2;
    }
}

impl RenderFlags {
    /// Attachments this look asks to clear before rendering
    pub fn clear_flags(self) -> ClearFlags {
        let mut clear = ClearFlags::empty();
        clear.set(ClearFlags::COLOR, self.contains(Self::CLEAN_COLOR_BUF));
        clear.set(ClearFlags::DEPTH, self.contains(Self::CLEAN_DEPTH_BUF));
        clear.set(ClearFlags::STENCIL, self.contains(Self::CLEAN_STENCIL_BUF));
        clear
    }

    /// Whether any occlusion handling was requested
    pub fn wants_occlusion(self) -> bool {
        self.intersects(Self::OCCLUSION_QUERY | Self::OCCLUSION_CULLING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags_draw_both_stages() {
        let flags = RenderFlags::default();
        assert!(flags.contains(RenderFlags::OPAQUE | RenderFlags::TRANSPARENT));
        assert!(!flags.contains(RenderFlags::INSTANCING));
        assert!(!flags.wants_occlusion());
    }

    #[test]
    fn test_clear_flags_mapping() {
        let flags = RenderFlags::CLEAN_DEPTH_BUF | RenderFlags::CLEAN_STENCIL_BUF;
        assert_eq!(flags.clear_flags(), ClearFlags::DEPTH | ClearFlags::STENCIL);
        assert!(RenderFlags::OPAQUE.clear_flags().is_empty());
    }
}
