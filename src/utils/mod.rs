//! Utility modules shared by the build and runtime sides.

pub mod path;
