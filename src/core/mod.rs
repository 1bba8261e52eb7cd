pub mod dispatch;
pub mod intro;
pub mod messages;
pub mod policy;
pub mod polling;
pub mod registry;
pub mod scanner;
pub mod throttle;

pub use crate::domain::model::{PhoneNumber, Query, ResultsView, RowState};
pub use crate::domain::ports::{Notifier, Session};
pub use crate::utils::error::Result;
