//! Text bodies sent to contacts.

use crate::domain::model::Query;

pub fn started(name: &str) -> String {
    format!("{} has started running.", name)
}

/// Centers are reported 1-based, the way the portal lists them.
pub fn spot_found(name: &str, query: &Query, index: usize) -> String {
    format!(
        "SPOT FOUND by {} near {} on {} {} at test center {}.",
        name,
        query.address,
        query.month,
        query.day,
        index + 1
    )
}

pub fn still_running(name: &str, cycles: u64) -> String {
    format!(
        "{} has searched {} times. Continuing with queries.",
        name, cycles
    )
}

pub fn degraded(name: &str, query: &Query, reason: &str) -> String {
    format!(
        "{} stopped watching {} after repeated errors: {}",
        name,
        query.label(),
        reason
    )
}

pub fn introduction(name: &str) -> String {
    format!("{} is fully functional. Updating as I go.", name)
}
