//! Shared types for the ticklock runtime layer and its controller.
//!
//! Everything in this crate is part of the contract between the injected
//! layer and the companion process that drives it, so both sides link
//! against the same definitions.

pub mod flags;
pub mod messages;

pub use flags::RunFlags;
pub use messages::{
    MessageKind, WINDOW_ID_MESSAGE_LEN, WireError, WindowHandle, decode_window_id,
    encode_window_id, read_message_kind, write_message_kind,
};
