use super::device::Viewport;
use super::handle::{
    BlendStateId, BufferId, DepthStencilId, DepthStencilStateId, RasterizerStateId,
    RenderTargetId, ShaderId,
};
use super::states::{DefaultBlendState, DefaultRasterizerState, DEFAULT_DEPTH_STENCIL_STATE};

pub const MAX_RENDER_TARGETS: usize = 8;

/// The current pipeline configuration, consumed by every apply.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    pub active_shader: ShaderId,
    pub active_buffer: BufferId,
    pub active_rasterizer_state: RasterizerStateId,
    pub active_blend_state: BlendStateId,
    pub active_depth_stencil_state: DepthStencilStateId,
    pub bound_render_targets: [RenderTargetId; MAX_RENDER_TARGETS],
    pub bound_depth_stencil: DepthStencilId,
    pub main_render_target: RenderTargetId,
    pub viewport: Viewport,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            active_shader: ShaderId::INVALID,
            active_buffer: BufferId::INVALID,
            active_rasterizer_state: DefaultRasterizerState::CullBack.id(),
            active_blend_state: DefaultBlendState::Disabled.id(),
            active_depth_stencil_state: DEFAULT_DEPTH_STENCIL_STATE,
            bound_render_targets: [RenderTargetId::INVALID; MAX_RENDER_TARGETS],
            bound_depth_stencil: DepthStencilId::INVALID,
            main_render_target: RenderTargetId::INVALID,
            viewport: Viewport::from_size(1, 1),
        }
    }
}

impl PipelineState {
    /// Replaces the whole bound list; slots past `targets` become unbound.
    pub fn bind_render_targets(&mut self, targets: &[RenderTargetId]) {
        assert!(
            targets.len() <= MAX_RENDER_TARGETS,
            "{} render targets requested, at most {} can be bound",
            targets.len(),
            MAX_RENDER_TARGETS
        );
        self.bound_render_targets = [RenderTargetId::INVALID; MAX_RENDER_TARGETS];
        self.bound_render_targets[..targets.len()].copy_from_slice(targets);
    }

    pub fn unbind_render_targets(&mut self) {
        self.bound_render_targets = [RenderTargetId::INVALID; MAX_RENDER_TARGETS];
    }

    /// Bound slots in slot order, skipping unbound ones.
    pub fn bound_targets(&self) -> impl Iterator<Item = RenderTargetId> + '_ {
        self.bound_render_targets
            .iter()
            .copied()
            .filter(|id| id.is_valid())
    }

    pub fn reset(&mut self) {
        self.active_shader = ShaderId::INVALID;
        self.active_buffer = BufferId::INVALID;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::handle::Id;

    #[test]
    fn binding_replaces_the_whole_list() {
        let mut state = PipelineState::default();
        state.bind_render_targets(&[Id::new(1), Id::new(2)]);
        state.bind_render_targets(&[Id::new(3)]);
        let bound: Vec<_> = state.bound_targets().collect();
        assert_eq!(bound, vec![Id::new(3)]);
    }

    #[test]
    fn unbind_clears_every_slot() {
        let mut state = PipelineState::default();
        state.bind_render_targets(&[Id::new(0), Id::new(1), Id::new(2)]);
        state.unbind_render_targets();
        assert_eq!(state.bound_targets().count(), 0);
    }

    #[test]
    #[should_panic(expected = "at most 8")]
    fn too_many_targets_panics() {
        let mut state = PipelineState::default();
        state.bind_render_targets(&[Id::new(0); MAX_RENDER_TARGETS + 1]);
    }

    #[test]
    fn reset_only_clears_shader_and_buffer() {
        let mut state = PipelineState {
            active_shader: Id::new(4),
            active_buffer: Id::new(2),
            bound_depth_stencil: Id::new(0),
            ..PipelineState::default()
        };
        state.reset();
        assert!(!state.active_shader.is_valid());
        assert!(!state.active_buffer.is_valid());
        assert_eq!(state.bound_depth_stencil, Id::new(0));
    }
}
