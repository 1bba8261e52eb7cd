use crate::domain::model::{PhoneNumber, Query};
use std::collections::BTreeSet;

/// How a contact will be reached by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntroKind {
    Text,
    Call,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Introduction {
    pub contact: PhoneNumber,
    pub kind: IntroKind,
}

/// Plans one introduction per contact not yet in `already_introduced`.
///
/// Pure: the caller owns the introduced set and receives the updated set back.
/// Queries are walked in order; within a query call contacts are classified
/// before text contacts, and a number on both lists of the same query is `Both`.
pub fn plan_introductions(
    queries: &[Query],
    already_introduced: BTreeSet<PhoneNumber>,
) -> (Vec<Introduction>, BTreeSet<PhoneNumber>) {
    let mut introduced = already_introduced;
    let mut plan = Vec::new();

    for query in queries {
        let mut pending: Vec<Introduction> = Vec::new();

        for contact in &query.call_contacts {
            if !introduced.contains(contact) {
                pending.push(Introduction {
                    contact: contact.clone(),
                    kind: IntroKind::Call,
                });
            }
        }

        for contact in &query.text_contacts {
            if introduced.contains(contact) {
                continue;
            }
            match pending.iter_mut().find(|i| &i.contact == contact) {
                Some(existing) => existing.kind = IntroKind::Both,
                None => pending.push(Introduction {
                    contact: contact.clone(),
                    kind: IntroKind::Text,
                }),
            }
        }

        for intro in pending {
            introduced.insert(intro.contact.clone());
            plan.push(intro);
        }
    }

    (plan, introduced)
}
