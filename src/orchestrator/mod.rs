//! Application-level orchestration.
//!
//! Owns the upload-and-classify state machine, the controller that runs its effects,
//! and post-request processing such as auto-save and export. UI/CLI layers call into
//! this module to keep responsibilities separated.

pub(crate) mod controller;
pub(crate) mod core;
mod post_process;

pub(crate) use controller::{run_controller, Controller, UiCommand};
pub(crate) use post_process::process_completion;
