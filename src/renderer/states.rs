use super::device::{
    BlendComponent, BlendDesc, BlendFactor, BlendOp, ColorWrites, CullMode, DepthStencilDesc,
    FillMode, GraphicsDevice, RasterizerDesc, RawResource, RawState,
};
use super::handle::{BlendStateId, DepthStencilStateId, Id, RasterizerStateId};

/// Native fixed-function state object plus the description it was built from.
#[derive(Debug, Clone, Copy)]
pub struct StateObject<T> {
    pub state: RawState,
    pub desc: T,
}

impl<T> StateObject<T> {
    pub(crate) fn release<D: GraphicsDevice>(&self, device: &mut D) {
        device.release(RawResource::State(self.state));
    }
}

pub type RasterizerState = StateObject<RasterizerDesc>;
pub type BlendState = StateObject<BlendDesc>;
pub type DepthStencilState = StateObject<DepthStencilDesc>;

/// Rasterizer states registered at startup, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultRasterizerState {
    CullBack,
    CullFront,
    CullNone,
}

impl DefaultRasterizerState {
    pub const ALL: [Self; 3] = [Self::CullBack, Self::CullFront, Self::CullNone];

    pub const fn id(self) -> RasterizerStateId {
        Id::new(self as i32)
    }

    pub fn desc(self) -> RasterizerDesc {
        let cull = match self {
            Self::CullBack => CullMode::Back,
            Self::CullFront => CullMode::Front,
            Self::CullNone => CullMode::None,
        };
        RasterizerDesc {
            cull,
            fill: FillMode::Solid,
            ..RasterizerDesc::default()
        }
    }
}

/// Blend states registered at startup, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultBlendState {
    Disabled,
    AdditiveColor,
    AlphaBlend,
}

impl DefaultBlendState {
    pub const ALL: [Self; 3] = [Self::Disabled, Self::AdditiveColor, Self::AlphaBlend];

    pub const fn id(self) -> BlendStateId {
        Id::new(self as i32)
    }

    pub fn desc(self) -> BlendDesc {
        match self {
            Self::Disabled => BlendDesc::default(),
            Self::AdditiveColor => {
                let add = BlendComponent {
                    src: BlendFactor::One,
                    dst: BlendFactor::One,
                    op: BlendOp::Add,
                };
                BlendDesc {
                    enabled: true,
                    color: add,
                    alpha: add,
                    write_mask: ColorWrites::ALL,
                }
            }
            Self::AlphaBlend => BlendDesc {
                enabled: true,
                color: BlendComponent {
                    src: BlendFactor::SrcAlpha,
                    dst: BlendFactor::OneMinusSrcAlpha,
                    op: BlendOp::Add,
                },
                alpha: BlendComponent {
                    src: BlendFactor::One,
                    dst: BlendFactor::OneMinusSrcAlpha,
                    op: BlendOp::Add,
                },
                write_mask: ColorWrites::ALL,
            },
        }
    }
}

/// Depth test less-equal, depth writes on.
pub const DEFAULT_DEPTH_STENCIL_STATE: DepthStencilStateId = Id::new(0);
