//! The slot/link model shared by every compiler stage.

mod arena;
mod document;
mod link;
mod node;

pub use arena::GraphArena;
pub use document::{Document, Extra};
pub use link::{FlowLink, Link, LinkId};
pub use node::{
    FLOW, FlowInput, FlowOutput, InputSlot, Node, NodeId, NodeMode, OutputSlot, Participation,
    WidgetRef,
};
