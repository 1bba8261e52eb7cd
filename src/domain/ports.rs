use crate::domain::model::{CallId, MessageId, PhoneNumber, Query, ResultsView, RowState};
use crate::utils::error::{AuthError, InspectError, NotifyError, SearchError};
use async_trait::async_trait;

/// Authenticated, stateful handle to the scheduling portal.
///
/// One instance is owned by the polling loop for the whole process. Calls are
/// strictly sequential: a search replaces the current results view, and
/// `inspect_row` reads from whichever view the last search produced.
#[async_trait]
pub trait Session: Send {
    async fn authenticate(&mut self) -> Result<(), AuthError>;
    async fn search_query(&mut self, query: &Query) -> Result<ResultsView, SearchError>;
    async fn inspect_row(&mut self, index: usize) -> Result<RowState, InspectError>;
    async fn close(&mut self);
}

/// Outbound text and voice delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, message: &str, contact: &PhoneNumber)
        -> Result<MessageId, NotifyError>;
    async fn place_call(&self, contact: &PhoneNumber) -> Result<CallId, NotifyError>;
}
