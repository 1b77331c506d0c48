//! Shared configuration, errors and path helpers for the Rewind pipeline.

pub mod config;
pub mod emitter;
pub mod error;
pub mod paths;

pub use config::RewindConfig;
pub use emitter::{Emitter, NullEmitter};
pub use error::{Result, RewindError};
