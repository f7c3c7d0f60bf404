//! Frame module

pub mod codec;

#[allow(clippy::module_inception)]
mod frame;
pub mod mask;
mod utf;

pub(crate) use self::utf::Utf8Checker;
pub use self::frame::{encode_control, CloseFrame, Frame, FrameHeader, HeaderRules};
