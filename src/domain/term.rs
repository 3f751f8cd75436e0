//! Portal catalog and slot types.
//!
//! These mirror the portal's JSON payloads (camelCase) closely enough to be
//! deserialized directly by the portal client.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// A catalog entry identifying one bookable medical service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceVariant {
    pub id: i64,
    pub name: String,
}

/// A doctor as listed by the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

impl Doctor {
    /// Case-insensitive first+last name match
    pub fn is_named(&self, first_name: &str, last_name: &str) -> bool {
        self.first_name.to_lowercase() == first_name.to_lowercase()
            && self.last_name.to_lowercase() == last_name.to_lowercase()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// One bookable slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    #[serde(default)]
    pub clinic: String,
    pub doctor: Doctor,
    #[serde(default)]
    pub clinic_id: i64,
    pub room_id: i64,
    pub schedule_id: i64,
    pub service_id: i64,
    #[serde(deserialize_with = "deserialize_portal_time")]
    pub date_time_from: NaiveDateTime,
    #[serde(deserialize_with = "deserialize_portal_time")]
    pub date_time_to: NaiveDateTime,
    #[serde(default)]
    pub is_telemedicine: bool,
}

/// Slots grouped by day, as the search endpoint returns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermsForDay {
    #[serde(deserialize_with = "deserialize_portal_time")]
    pub day: NaiveDateTime,
    #[serde(default)]
    pub terms: Vec<Term>,
}

/// Temporary reservation returned by a successful lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockHandle {
    pub temporary_reservation_id: i64,
    #[serde(default)]
    pub valuations: Vec<serde_json::Value>,
}

/// Result of confirming a locked slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    #[serde(default)]
    pub reservation_id: Option<i64>,
}

/// Portal timestamps come either as local wall-clock time or with an offset.
/// Both are reduced to wall-clock time in the portal's zone.
fn deserialize_portal_time<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_portal_time(&raw).map_err(serde::de::Error::custom)
}

pub(crate) fn parse_portal_time(raw: &str) -> Result<NaiveDateTime, String> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.naive_local());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| format!("invalid portal time {:?}: {}", raw, e))
}
