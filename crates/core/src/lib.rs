//! Domain building blocks shared by every pinrelay crate.
//!
//! - [`status`]: stage and status enums backed by SMALLINT lookup tables.
//! - [`session`]: the pure session state machine.
//! - [`messages`]: the [`ProgressEvent`](messages::ProgressEvent) wire schema.
//! - [`channels`]: deterministic per-job channel names.
//! - [`retry`]: explicit bounded retry policy for external calls.
//! - [`collaborators`]: seams to the browser-automation and scoring services.

pub mod channels;
pub mod collaborators;
pub mod error;
pub mod messages;
pub mod retry;
pub mod session;
pub mod status;
pub mod types;
