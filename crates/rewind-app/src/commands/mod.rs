//! Typed command surface exposed to the UI host. Transport (HTTP/IPC) is
//! supplied by the host; these are the handlers behind it. Every command
//! returns the `{success, data?, message?, timestamp}` envelope.

pub mod activities;
pub mod artifacts;
pub mod chat;
pub mod diary;
pub mod models;
pub mod system;
