use std::collections::VecDeque;

use super::device::ShaderStage;
use super::handle::{SamplerId, TextureId};
use super::shader::BindPoint;

/// Stage register a deferred binding targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindSlot {
    pub stage: ShaderStage,
    pub slot: u32,
}

impl From<&BindPoint> for BindSlot {
    fn from(point: &BindPoint) -> Self {
        Self {
            stage: point.stage,
            slot: point.slot,
        }
    }
}

/// Binds a texture's shader view at the next apply. An invalid ID unbinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetTextureCommand {
    pub bind_point: BindSlot,
    pub texture: TextureId,
}

/// Binds a sampler at the next apply. An invalid ID unbinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetSamplerCommand {
    pub bind_point: BindSlot,
    pub sampler: SamplerId,
}

/// FIFO of binding commands, emptied once per apply.
#[derive(Debug)]
pub struct BindingQueue<C> {
    pending: VecDeque<C>,
}

impl<C> Default for BindingQueue<C> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }
}

impl<C> BindingQueue<C> {
    pub fn push(&mut self, command: C) {
        self.pending.push_back(command);
    }

    /// Hands out every pending command in enqueue order.
    pub fn drain(&mut self) -> std::collections::vec_deque::Drain<'_, C> {
        self.pending.drain(..)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::handle::Id;

    fn texture_command(slot: u32, id: i32) -> SetTextureCommand {
        SetTextureCommand {
            bind_point: BindSlot {
                stage: ShaderStage::Pixel,
                slot,
            },
            texture: Id::new(id),
        }
    }

    #[test]
    fn drain_preserves_enqueue_order_and_empties() {
        let mut queue = BindingQueue::default();
        queue.push(texture_command(2, 7));
        queue.push(texture_command(0, 3));
        queue.push(texture_command(2, 1));

        let drained: Vec<_> = queue.drain().collect();
        assert_eq!(
            drained,
            vec![
                texture_command(2, 7),
                texture_command(0, 3),
                texture_command(2, 1)
            ]
        );
        assert!(queue.is_empty());
        assert_eq!(queue.drain().count(), 0);
    }

    #[test]
    fn bind_slot_from_bind_point() {
        let point = BindPoint {
            name: "shadow_map".into(),
            stage: ShaderStage::Vertex,
            slot: 4,
        };
        assert_eq!(
            BindSlot::from(&point),
            BindSlot {
                stage: ShaderStage::Vertex,
                slot: 4
            }
        );
    }
}
