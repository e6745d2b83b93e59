// Message domain module
// Append-only agent/team messages grouped into threads

#![allow(clippy::module_inception)]

pub mod message;
pub mod value_objects;

pub use message::{Message, MessageContent, MessageFilter, NewMessage, Recipient};
pub use value_objects::{MessageStatus, MessageType, Priority};
