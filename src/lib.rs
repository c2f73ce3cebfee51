//! Facade re-exporting [`metalad_core`] under the project's public name.
//!
//! Downstream crates should depend on this crate rather than on
//! `metalad-core` directly, the same way `heraclitus` historically
//! re-exported `heraclitus-core`.

pub extern crate metalad_core;

pub use metalad_core::*;
