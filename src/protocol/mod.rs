//! Wire formats for both consoles: the mixer's JSON envelope and the
//! lighting console's length-prefixed OSC frames.

pub mod events;
pub mod messages;
pub mod opcodes;
pub mod osc;

pub use events::*;
pub use messages::*;
pub use opcodes::*;
pub use osc::{OscArg, OscCodec, OscError, OscMessage};
