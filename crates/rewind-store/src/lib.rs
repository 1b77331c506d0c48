//! Persistent store for the Rewind pipeline.
//!
//! One embedded SQLite file, per-domain repositories, soft delete with
//! periodic retention cleanup. Agents coordinate exclusively through this
//! store; there are no direct calls between pipeline stages.

pub mod actions;
pub mod activities;
pub mod conversations;
pub mod db;
pub mod diaries;
pub mod error;
pub mod events;
pub mod knowledge;
pub mod models;
pub mod preferences;
pub mod settings;
pub mod store;
pub mod thumbnails;
pub mod todos;
pub mod types;
pub mod usage;

mod util;

pub use error::{Result, StoreError};
pub use store::Store;
