use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CollarError;

/// The record families the vendor API serves, one route segment each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataTypeSelector {
    Position,
    Activity,
    MortalityImplant,
    Mortality,
    Proximity,
    Separation,
    TrapEvent,
    VaginalImplant,
}

impl DataTypeSelector {
    pub const ALL: [DataTypeSelector; 8] = [
        Self::Position,
        Self::Activity,
        Self::MortalityImplant,
        Self::Mortality,
        Self::Proximity,
        Self::Separation,
        Self::TrapEvent,
        Self::VaginalImplant,
    ];

    /// Route segment in `/v2/collar/{id}/{segment}`.
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Position => "gps",
            Self::Activity => "act",
            Self::MortalityImplant => "mit",
            Self::Mortality => "mor",
            Self::Proximity => "prx",
            Self::Separation => "sep",
            Self::TrapEvent => "trap",
            Self::VaginalImplant => "vit",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Activity => "activity",
            Self::MortalityImplant => "mortality_implant",
            Self::Mortality => "mortality",
            Self::Proximity => "proximity",
            Self::Separation => "separation",
            Self::TrapEvent => "trap_event",
            Self::VaginalImplant => "vaginal_implant",
        }
    }
}

impl fmt::Display for DataTypeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataTypeSelector {
    type Err = CollarError;

    /// Accepts either the long name (`mortality_implant`) or the route
    /// segment (`mit`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|t| t.name() == wanted || t.path_segment() == wanted)
            .ok_or_else(|| CollarError::Config(format!("unknown data type {:?}", s)))
    }
}
