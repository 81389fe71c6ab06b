//! # taskmirror Protocol
//!
//! Wire types and decoders for the incremental task sync protocol.
//!
//! This crate provides:
//! - `SyncCursor` and `ResourceKind` for request scoping
//! - `Task`, `Project`, `Label` and `Due` value objects with tolerant decoders
//! - `Command` and `ItemArgs` for batched mutations
//! - `SyncRequest`, `SyncResponse` and `CommandResult` messages
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Decoding rules
//!
//! - `id` is the only required field of an entity record
//! - Identifier-like fields accept strings or numbers and are normalized to strings
//! - Every other field has a documented default when absent

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod cursor;
mod entity;
mod error;
mod messages;

pub use command::{new_command_uuid, new_temp_id, Command, CommandKind, ItemArgs};
pub use cursor::{ResourceKind, SyncCursor, RESET_CURSOR, WILDCARD_CURSOR};
pub use entity::{coerce_id, Due, Label, Project, SyncEntity, Task};
pub use error::{DecodeError, ProtocolResult};
pub use messages::{server_error, CommandFailure, CommandResult, SyncRequest, SyncResponse};
