//! Domain identifier types with proper encapsulation.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Venue identifier - newtype for type safety.
///
/// Normalized to lowercase so `"Alpha"` and `"alpha"` name the same venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct VenueId(String);

impl VenueId {
    /// Create a new VenueId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_ascii_lowercase())
    }

    /// Get the venue ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VenueId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for VenueId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<VenueId> for String {
    fn from(id: VenueId) -> Self {
        id.0
    }
}

/// Opportunity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpportunityId(Uuid);

impl OpportunityId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for OpportunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_id_is_lowercased() {
        let id = VenueId::new("  Alpha ");
        assert_eq!(id.as_str(), "alpha");
        assert_eq!(id, VenueId::from("ALPHA"));
    }

    #[test]
    fn venue_id_display() {
        let id = VenueId::from("beta".to_string());
        assert_eq!(format!("{}", id), "beta");
    }

    #[test]
    fn venue_id_deserializes_normalized() {
        let id: VenueId = serde_json::from_str("\"GAMMA\"").unwrap();
        assert_eq!(id.as_str(), "gamma");
    }

    #[test]
    fn opportunity_ids_are_unique() {
        assert_ne!(OpportunityId::generate(), OpportunityId::generate());
    }
}
