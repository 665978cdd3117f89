//! Render targets and looks
//!
//! A [`RenderTarget`] is a framebuffer plus an ordered list of [`Look`]s. A
//! look renders one scene through one camera with one material pass; looks
//! run in ascending priority and a target accepts at most one look per
//! (camera, priority) pair.

use std::fmt;

use crate::render::backend::FramebufferHandle;
use crate::render::flags::{ClearFlags, RenderFlags};
use crate::render::primitives::CameraId;
use crate::render::system::{SceneId, TargetId};
use crate::render::{RenderError, RenderResult};

/// Hook run before or after a target updates; `false` from a pre-update hook skips the target
pub type TargetHook = Box<dyn FnMut(TargetId) -> bool>;

/// Lifecycle state of a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    /// Skipped by the frame loop
    Disabled,
    /// Waiting for the next frame
    Enabled,
    /// Running its pre-update hook
    PreUpdate,
    /// Rendering its looks
    Updating,
    /// Running its post-update hook
    PostUpdate,
}

/// One scene rendered through one camera
#[derive(Debug, Clone, PartialEq)]
pub struct Look {
    /// Camera the scene is viewed through
    pub camera: CameraId,
    /// Scene rendered
    pub scene: SceneId,
    /// Material pass index
    pub pass: u16,
    /// Order within the target, lower first
    pub priority: i32,
    /// Stages, culling, sorting and output flags
    pub flags: RenderFlags,
    /// Framebuffer layers written by this look; empty selects the default
    pub layers: Vec<u32>,
}

impl Look {
    /// Look with default flags, pass 0 and priority 0
    pub fn new(camera: CameraId, scene: SceneId) -> Self {
        Self {
            camera,
            scene,
            pass: 0,
            priority: 0,
            flags: RenderFlags::default(),
            layers: Vec::new(),
        }
    }

    /// Set the material pass
    pub fn with_pass(mut self, pass: u16) -> Self {
        self.pass = pass;
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set render flags
    pub fn with_flags(mut self, flags: RenderFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Select framebuffer layers
    pub fn with_layers(mut self, layers: Vec<u32>) -> Self {
        self.layers = layers;
        self
    }
}

/// A framebuffer and the looks rendered into it
pub struct RenderTarget {
    framebuffer: FramebufferHandle,
    width: u32,
    height: u32,
    priority: i32,
    pub(crate) state: TargetState,
    clear_mask: ClearFlags,
    clear_color: [f32; 4],
    looks: Vec<Look>,
    pub(crate) pre_update: Option<TargetHook>,
    pub(crate) post_update: Option<TargetHook>,
}

impl RenderTarget {
    /// Enabled target clearing color and depth
    pub fn new(framebuffer: FramebufferHandle, width: u32, height: u32, priority: i32) -> Self {
        Self {
            framebuffer,
            width,
            height,
            priority,
            state: TargetState::Enabled,
            clear_mask: ClearFlags::COLOR | ClearFlags::DEPTH,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            looks: Vec::new(),
            pre_update: None,
            post_update: None,
        }
    }

    /// Framebuffer rendered into
    pub fn framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    /// Viewport width
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Viewport height
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Order among targets, lower first
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Current state
    pub fn state(&self) -> TargetState {
        self.state
    }

    /// Whether the frame loop renders this target
    pub fn is_enabled(&self) -> bool {
        self.state != TargetState::Disabled
    }

    /// Buffers cleared when the target is bound
    pub fn clear_mask(&self) -> ClearFlags {
        self.clear_mask
    }

    /// Clear color
    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Looks in render order
    pub fn looks(&self) -> &[Look] {
        &self.looks
    }

    /// Insert `look` keeping ascending priority
    ///
    /// Fails with [`RenderError::DuplicateLook`] when a look with the same
    /// camera and priority is already attached.
    pub fn attach_look(&mut self, look: Look) -> RenderResult<()> {
        if self
            .looks
            .iter()
            .any(|other| other.camera == look.camera && other.priority == look.priority)
        {
            return Err(RenderError::DuplicateLook {
                priority: look.priority,
            });
        }

        let position = self.looks.partition_point(|other| other.priority <= look.priority);
        self.looks.insert(position, look);
        Ok(())
    }

    /// Remove the look of `camera` at `priority`
    pub fn detach_look(&mut self, camera: CameraId, priority: i32) -> Option<Look> {
        let index = self
            .looks
            .iter()
            .position(|look| look.camera == camera && look.priority == priority)?;
        Some(self.looks.remove(index))
    }

    /// Remove every look through `camera`, returning how many were removed
    pub fn detach_camera(&mut self, camera: CameraId) -> usize {
        let before = self.looks.len();
        self.looks.retain(|look| look.camera != camera);
        before - self.looks.len()
    }

    /// Remove every look of `scene`, returning how many were removed
    pub fn detach_scene(&mut self, scene: SceneId) -> usize {
        let before = self.looks.len();
        self.looks.retain(|look| look.scene != scene);
        before - self.looks.len()
    }

    /// Take part in the frame loop again
    pub fn enable(&mut self) {
        if self.state == TargetState::Disabled {
            self.state = TargetState::Enabled;
        }
    }

    /// Leave the frame loop
    pub fn disable(&mut self) {
        self.state = TargetState::Disabled;
    }

    /// Change the viewport size
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Set the buffers cleared on bind and the clear color
    pub fn set_clear(&mut self, mask: ClearFlags, color: [f32; 4]) {
        self.clear_mask = mask;
        self.clear_color = color;
    }

    /// Install a hook run before the looks; returning `false` skips the target this frame
    pub fn set_pre_update(&mut self, hook: impl FnMut(TargetId) -> bool + 'static) {
        self.pre_update = Some(Box::new(hook));
    }

    /// Install a hook run after the looks
    pub fn set_post_update(&mut self, hook: impl FnMut(TargetId) -> bool + 'static) {
        self.post_update = Some(Box::new(hook));
    }
}

impl fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTarget")
            .field("framebuffer", &self.framebuffer)
            .field("size", &(self.width, self.height))
            .field("priority", &self.priority)
            .field("state", &self.state)
            .field("clear_mask", &self.clear_mask)
            .field("looks", &self.looks)
            .field("pre_update", &self.pre_update.is_some())
            .field("post_update", &self.post_update.is_some())
            .finish()
    }
}
