pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::WatchConfig;

pub use adapters::{PortalSession, TwilioNotifier};
pub use crate::core::polling::{CycleReport, LoopSettings, LoopState, PollingLoop};
pub use crate::core::registry::QueryRegistry;
pub use utils::error::{FatalError, Result, WatchError};
