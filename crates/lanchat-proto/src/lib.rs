//! `LanChat` wire protocol.
//!
//! A connection carries UTF-8 lines. Each line is either a bare command tag
//! from the closed [`Command`] catalog or a single JSON-encoded record that
//! follows the tag it belongs to.

pub mod command;
pub mod error;
pub mod frame;
pub mod limits;
pub mod records;

pub use command::{Command, CommandRole};
pub use error::ProtocolError;
pub use frame::{Frame, FrameReader, FrameWriter, MAX_FRAME_BYTES};
pub use limits::{ValidationError, validate_content, validate_password, validate_username};
pub use records::{
    AuthResponse, BroadcastReceipt, ClientSummary, Credentials, Message, MessageLists,
};
