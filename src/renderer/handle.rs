use std::fmt;
use std::marker::PhantomData;

/// Index into one of the renderer's resource tables.
///
/// The wrapped value is a small signed integer; `-1` is the "none" sentinel.
/// The type parameter keeps the namespaces apart, so a `TextureId` can never be
/// passed where a `ShaderId` is expected.
pub struct Id<T>(i32, PhantomData<fn() -> T>);

// Manual impls so `T` needs none of these traits.
impl<T> Copy for Id<T> {}
impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl<T> Eq for Id<T> {}

impl<T> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.0)
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::INVALID
    }
}

impl<T> Id<T> {
    pub const INVALID: Self = Id(-1, PhantomData);

    pub const fn new(raw: i32) -> Self {
        Id(raw, PhantomData)
    }

    pub(crate) fn from_index(idx: usize) -> Self {
        debug_assert!(idx <= i32::MAX as usize);
        Id(idx as i32, PhantomData)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// Table index, or `None` for the sentinel and other negative values.
    pub fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }
}

pub type ShaderId = Id<crate::renderer::shader::Shader>;
pub type TextureId = Id<crate::renderer::texture::Texture>;
pub type SamplerId = Id<crate::renderer::texture::Sampler>;
pub type RenderTargetId = Id<crate::renderer::texture::RenderTarget>;
pub type DepthStencilId = Id<crate::renderer::texture::DepthStencil>;
pub type RasterizerStateId = Id<crate::renderer::states::RasterizerState>;
pub type BlendStateId = Id<crate::renderer::states::BlendState>;
pub type DepthStencilStateId = Id<crate::renderer::states::DepthStencilState>;
pub type BufferId = Id<crate::renderer::buffer::BufferObject>;
pub type CpuConstantId = Id<crate::renderer::constants::CpuConstant>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_is_copy() {
        let h1: Id<String> = Id::new(5);
        let h2 = h1;
        let h3 = h1;
        assert_eq!(h1.index(), h2.index());
        assert_eq!(h1.index(), h3.index());
    }

    #[test]
    fn invalid_handle_has_no_index() {
        let h: Id<u8> = Id::INVALID;
        assert!(!h.is_valid());
        assert_eq!(h.raw(), -1);
        assert_eq!(h.index(), None);
        assert_eq!(Id::<u8>::default(), h);
    }
}
