//! CLI command handling

pub mod check;
pub mod output;
pub mod watch;

pub use check::*;
pub use output::*;
pub use watch::*;
