//! # Shared Domain Enumerations
//!
//! Small, closed enumerations referenced by more than one module: the
//! catalog's object-type tag, facility list scopes and types, sim-object
//! data periods, and notification-group priority levels. Kept together so
//! the transport trait, the services, and the repository do not each
//! invent their own copy.

use serde::{Deserialize, Serialize};

/// A SimObject catalog entry's type tag (§3, §6.3).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectType {
    #[default]
    Aircraft,
    Helicopter,
    Boat,
    Ground,
    HotAirBalloon,
    Animal,
    UserAvatar,
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObjectType::Aircraft => "aircraft",
            ObjectType::Helicopter => "helicopter",
            ObjectType::Boat => "boat",
            ObjectType::Ground => "ground",
            ObjectType::HotAirBalloon => "hotAirBalloon",
            ObjectType::Animal => "animal",
            ObjectType::UserAvatar => "userAvatar",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "aircraft" => Ok(ObjectType::Aircraft),
            "helicopter" => Ok(ObjectType::Helicopter),
            "boat" => Ok(ObjectType::Boat),
            "ground" => Ok(ObjectType::Ground),
            "hotAirBalloon" => Ok(ObjectType::HotAirBalloon),
            "animal" => Ok(ObjectType::Animal),
            "userAvatar" => Ok(ObjectType::UserAvatar),
            other => Err(format!("unrecognised object type: {other}")),
        }
    }
}

/// The scope of a facility-list enumeration request (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacilityListScope {
    /// The entire navigation database.
    All,
    /// Only what falls within the current reality bubble.
    Bubble,
    /// Only what the simulator currently has cached in memory.
    Cache,
}

/// Which facility list is being enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacilityListType {
    Airport,
    Waypoint,
    Ndb,
    Vor,
}

/// How often a sim-object data subscription is re-sent by the host (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    /// Delivered exactly once.
    Once,
    /// Delivered once per rendered visual frame.
    VisualFrame,
    /// Delivered once per simulation frame.
    SimFrame,
    /// Delivered once per second.
    Second,
    /// Subscription is suspended; no further data is delivered.
    Never,
}

/// Notification-group priority level (§3, §4.9). Five discrete levels; no
/// arbitrary numeric priority is accepted, matching the host's own closed
/// set of sentinels.
///
/// Declared in raw-value order (most urgent first) so the derived
/// `Ord`/`PartialOrd` agree with [`Priority::raw`]: `Highest` sorts lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Highest,
    HighestMaskable,
    Standard,
    Default,
    Lowest,
}

impl Priority {
    /// The raw priority value passed to `set_notification_group_priority`.
    /// Mirrors the host SDK's well-known priority sentinels; the exact
    /// numeric values are vendor constants and kept abstract here.
    pub fn raw(self) -> i32 {
        match self {
            Priority::Highest => 1,
            Priority::HighestMaskable => 10_000_000,
            Priority::Standard => 1_900_000_000,
            Priority::Default => 2_000_000_000,
            Priority::Lowest => 2_100_000_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn object_type_round_trips_through_display_and_parse() {
        for ty in [
            ObjectType::Aircraft,
            ObjectType::Helicopter,
            ObjectType::Boat,
            ObjectType::Ground,
            ObjectType::HotAirBalloon,
            ObjectType::Animal,
            ObjectType::UserAvatar,
        ] {
            let text = ty.to_string();
            assert_eq!(ObjectType::from_str(&text).unwrap(), ty);
        }
    }

    #[test]
    fn priority_ordering_matches_host_semantics() {
        assert!(Priority::Highest < Priority::HighestMaskable);
        assert!(Priority::HighestMaskable < Priority::Standard);
        assert!(Priority::Standard < Priority::Default);
        assert!(Priority::Default < Priority::Lowest);
    }
}
