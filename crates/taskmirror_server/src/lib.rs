//! # taskmirror Sync Server
//!
//! In-memory reference server for the incremental task sync protocol.
//!
//! This crate provides:
//! - The sync endpoint: cursor-based full and delta responses
//! - Command execution with per-command `sync_status` and temp id mapping
//! - Bearer token authentication (static or HMAC-SHA256 signed tokens)
//! - Fault injection for timeouts, rate limits, error statuses and cursor resets
//!
//! # Architecture
//!
//! The server keeps:
//! - The current record of every entity, deleted ones included
//! - A change log used to answer delta requests
//! - A cursor epoch; bumping it makes every issued cursor unknown, so the
//!   next request with an old cursor gets a `RESET` response
//!
//! # Authentication
//!
//! ```rust
//! use taskmirror_server::{AuthConfig, ServerConfig, TokenValidator};
//!
//! let secret = b"my-secure-secret-32-bytes-long!".to_vec();
//! let config = ServerConfig::default().with_auth(secret.clone());
//!
//! let validator = TokenValidator::new(AuthConfig::new(secret));
//! let token = validator.create_token("alice");
//! assert!(validator.validate_token(&token).is_ok());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod server;
mod store;

pub use auth::{AuthConfig, SimpleTokenValidator, TokenValidator};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::{Fault, ServerReply, SyncServer, Timeout};
pub use store::ServerStore;
