//! Shared leaf crate for the Kestrel runtime.
//!
//! This crate holds the types every other runtime crate agrees on:
//!
//! - The error taxonomy for asynchronous actions (`error`): what a
//!   program-level callback may return, what a failed drain looks like,
//!   and the protocol-misuse errors of the coordination layer.
//! - Startup configuration (`config`): tick interval and wait-primitive
//!   backend, resolved once from the environment.
//!
//! It deliberately has no dependency on the thread substrate or the
//! signal layer so that both can depend on it.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod config;
pub mod error;

pub use config::{CoordConfig, WaitBackend};
pub use error::{
    fatal_error, ActionKind, AsyncResult, CallbackError, CoordError, DrainError,
};
