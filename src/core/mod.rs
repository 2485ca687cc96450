//! Process state shared by the CLI commands.

mod state;

pub use state::{is_shutdown, on_shutdown, setup_shutdown_handler};
