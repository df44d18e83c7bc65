//! Console commands
//!
//! Argument parsing (`parser`) and execution against the CRUD engine
//! (`handlers`).

pub mod handlers;
pub mod parser;

pub use handlers::Console;
pub use parser::{Cli, Command, parse_assignment, parse_assignments};
