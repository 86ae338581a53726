//! Terminal output: a live per-application table fed by an actor thread.

pub mod actor;
pub mod engine;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use actor::{SummaryLine, UiActor, UiEvent};
pub use output::ConsoleReporter;
pub use theme::Theme;
