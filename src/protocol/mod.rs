//! Wire protocol module
//!
//! Implements the request/response protocol spoken between node and client.

pub mod handshake;
pub mod message;
pub mod wire;

// Re-export main types
pub use handshake::{answer_challenge, issue_challenge, AUTH_TIMEOUT, CHALLENGE_TOKEN_SIZE};
pub use message::{Message, MessageId};
pub use wire::{expect_message, read_frame, read_message, write_message, MAX_FRAME_SIZE};
