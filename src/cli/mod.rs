//! Command-line interface module.
//!
//! | Command   | Side    | Purpose                                        |
//! |-----------|---------|------------------------------------------------|
//! | `publish` | build   | graph file -> manifest, retention sweep        |
//! | `follow`  | runtime | file-transport driver reporting reconciliation |
//! | `inspect` | either  | validate and summarize a manifest file         |

mod args;
pub mod follow;
pub mod inspect;
pub mod publish;

pub use args::{Cli, Commands, FollowArgs, PublishArgs};
