//! Terminal chat client that mirrors a polled backend onto two live lists.

pub mod config;
pub mod demo;
pub mod input;
pub mod logging;
pub mod media;
pub mod render;
pub mod scheduler;
pub mod state;
pub mod tui;

pub use config::{ConfigError, TuiConfig};
pub use scheduler::{PollIntervals, PollScheduler};
pub use state::{ChatLimits, ChatState};
