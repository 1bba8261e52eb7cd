use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// E.164-style phone number: `+` followed by 8 to 15 digits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix('+')
            .ok_or_else(|| format!("phone number '{}' must start with '+'", raw))?;
        if !(8..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!(
                "phone number '{}' must have 8 to 15 digits after '+'",
                raw
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Months the portal's calendar offers, in calendar order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Month {
    April,
    May,
    June,
    July,
    August,
    September,
}

impl Month {
    pub fn name(self) -> &'static str {
        match self {
            Month::April => "April",
            Month::May => "May",
            Month::June => "June",
            Month::July => "July",
            Month::August => "August",
            Month::September => "September",
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A watched search criterion plus its contacts and notification bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub address: String,
    pub month: Month,
    /// Two-digit day of month, e.g. "07".
    pub day: String,
    /// Result rows to inspect, in inspection order.
    pub center_indices: Vec<usize>,
    pub text_contacts: BTreeSet<PhoneNumber>,
    pub call_contacts: BTreeSet<PhoneNumber>,
    /// Only the notification throttle writes this after creation.
    pub last_notified_at: DateTime<Utc>,
}

impl Query {
    pub fn new(
        address: impl Into<String>,
        month: Month,
        day: impl Into<String>,
        center_indices: Vec<usize>,
        text_contacts: impl IntoIterator<Item = PhoneNumber>,
        call_contacts: impl IntoIterator<Item = PhoneNumber>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            address: address.into(),
            month,
            day: day.into(),
            center_indices,
            text_contacts: text_contacts.into_iter().collect(),
            call_contacts: call_contacts.into_iter().collect(),
            last_notified_at: created_at,
        }
    }

    pub fn label(&self) -> String {
        format!("{} on {} {}", self.address, self.month, self.day)
    }
}

/// Handle returned once the session shows results for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultsView {
    pub rows: usize,
}

/// Marker ids of one result row's sub-elements, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowState {
    pub markers: Vec<String>,
}

impl RowState {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    /// The first marker is the row's label slot and never counts.
    pub fn is_available(&self) -> bool {
        self.markers.iter().skip(1).any(|m| m.starts_with("hour"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageId(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallId(pub String);
