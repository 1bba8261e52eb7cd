use crate::domain::model::{PhoneNumber, Query};
use std::collections::BTreeSet;

/// Fixed set of watched queries, in polling order.
#[derive(Debug, Clone, Default)]
pub struct QueryRegistry {
    queries: Vec<Query>,
}

impl QueryRegistry {
    pub fn new(queries: Vec<Query>) -> Self {
        Self { queries }
    }

    pub fn all_queries(&self) -> &[Query] {
        &self.queries
    }

    pub(crate) fn query_mut(&mut self, index: usize) -> Option<&mut Query> {
        self.queries.get_mut(index)
    }

    /// Union of every query's text contacts; liveness pings go here.
    pub fn all_contacts(&self) -> BTreeSet<PhoneNumber> {
        self.queries
            .iter()
            .flat_map(|q| q.text_contacts.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}
