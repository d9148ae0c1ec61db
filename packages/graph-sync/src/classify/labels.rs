//! Closed label enumerations produced by the classifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A closed classification label with an explicit fallback.
pub trait Label: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Fallback when nothing matches.
    const DEFAULT: Self;

    /// Every label, in declaration order.
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;
}

macro_rules! label_display {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProgramLevel {
    Undergraduate,
    Graduate,
    Doctoral,
    Unknown,
}

impl Label for ProgramLevel {
    const DEFAULT: Self = ProgramLevel::Unknown;
    const ALL: &'static [Self] = &[
        ProgramLevel::Undergraduate,
        ProgramLevel::Graduate,
        ProgramLevel::Doctoral,
        ProgramLevel::Unknown,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            ProgramLevel::Undergraduate => "Undergraduate",
            ProgramLevel::Graduate => "Graduate",
            ProgramLevel::Doctoral => "Doctoral",
            ProgramLevel::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProgramType {
    Forestry,
    #[serde(rename = "Natural Resources")]
    NaturalResources,
    Geospatial,
    #[serde(rename = "Data Science")]
    DataScience,
    #[serde(rename = "Computer Science")]
    ComputerScience,
    Engineering,
    #[serde(rename = "Business/Management")]
    BusinessManagement,
    Science,
    Other,
}

impl Label for ProgramType {
    const DEFAULT: Self = ProgramType::Other;
    const ALL: &'static [Self] = &[
        ProgramType::Forestry,
        ProgramType::NaturalResources,
        ProgramType::Geospatial,
        ProgramType::DataScience,
        ProgramType::ComputerScience,
        ProgramType::Engineering,
        ProgramType::BusinessManagement,
        ProgramType::Science,
        ProgramType::Other,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            ProgramType::Forestry => "Forestry",
            ProgramType::NaturalResources => "Natural Resources",
            ProgramType::Geospatial => "Geospatial",
            ProgramType::DataScience => "Data Science",
            ProgramType::ComputerScience => "Computer Science",
            ProgramType::Engineering => "Engineering",
            ProgramType::BusinessManagement => "Business/Management",
            ProgramType::Science => "Science",
            ProgramType::Other => "Other",
        }
    }
}

/// Technology focus. The non-`Other` labels are the Topic vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TechnologyFocus {
    #[serde(rename = "AI/ML")]
    AiMl,
    #[serde(rename = "GIS")]
    Gis,
    #[serde(rename = "Remote Sensing")]
    RemoteSensing,
    #[serde(rename = "Drones/UAV")]
    DronesUav,
    #[serde(rename = "Data Science")]
    DataScience,
    Other,
}

impl TechnologyFocus {
    /// Labels that become Topic nodes.
    pub const TOPICS: [TechnologyFocus; 5] = [
        TechnologyFocus::AiMl,
        TechnologyFocus::Gis,
        TechnologyFocus::RemoteSensing,
        TechnologyFocus::DronesUav,
        TechnologyFocus::DataScience,
    ];

    pub fn is_topic(&self) -> bool {
        *self != TechnologyFocus::Other
    }
}

impl Label for TechnologyFocus {
    const DEFAULT: Self = TechnologyFocus::Other;
    const ALL: &'static [Self] = &[
        TechnologyFocus::AiMl,
        TechnologyFocus::Gis,
        TechnologyFocus::RemoteSensing,
        TechnologyFocus::DronesUav,
        TechnologyFocus::DataScience,
        TechnologyFocus::Other,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            TechnologyFocus::AiMl => "AI/ML",
            TechnologyFocus::Gis => "GIS",
            TechnologyFocus::RemoteSensing => "Remote Sensing",
            TechnologyFocus::DronesUav => "Drones/UAV",
            TechnologyFocus::DataScience => "Data Science",
            TechnologyFocus::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitFocus {
    #[serde(rename = "GIS")]
    Gis,
    #[serde(rename = "AI")]
    Ai,
    #[serde(rename = "Remote Sensing")]
    RemoteSensing,
    #[serde(rename = "Drones/UAV")]
    DronesUav,
    #[serde(rename = "Forestry/Environmental")]
    ForestryEnvironmental,
    #[serde(rename = "Computer Science")]
    ComputerScience,
    Other,
}

impl Label for UnitFocus {
    const DEFAULT: Self = UnitFocus::Other;
    const ALL: &'static [Self] = &[
        UnitFocus::Gis,
        UnitFocus::Ai,
        UnitFocus::RemoteSensing,
        UnitFocus::DronesUav,
        UnitFocus::ForestryEnvironmental,
        UnitFocus::ComputerScience,
        UnitFocus::Other,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            UnitFocus::Gis => "GIS",
            UnitFocus::Ai => "AI",
            UnitFocus::RemoteSensing => "Remote Sensing",
            UnitFocus::DronesUav => "Drones/UAV",
            UnitFocus::ForestryEnvironmental => "Forestry/Environmental",
            UnitFocus::ComputerScience => "Computer Science",
            UnitFocus::Other => "Other",
        }
    }
}

label_display!(ProgramLevel, ProgramType, TechnologyFocus, UnitFocus);

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_serde_matches_as_str<L: Label + Serialize>() {
        for label in L::ALL {
            let json = serde_json::to_string(label).unwrap();
            assert_eq!(json, format!("\"{}\"", label.as_str()));
        }
    }

    #[test]
    fn test_serialized_names_match_display() {
        assert_serde_matches_as_str::<ProgramLevel>();
        assert_serde_matches_as_str::<ProgramType>();
        assert_serde_matches_as_str::<TechnologyFocus>();
        assert_serde_matches_as_str::<UnitFocus>();
    }

    #[test]
    fn test_out_of_enumeration_label_rejected() {
        assert!(serde_json::from_str::<ProgramLevel>("\"Master\"").is_err());
        assert!(serde_json::from_str::<TechnologyFocus>("\"Blockchain\"").is_err());
    }

    #[test]
    fn test_defaults_are_fallbacks() {
        assert_eq!(ProgramLevel::DEFAULT, ProgramLevel::Unknown);
        assert_eq!(ProgramType::DEFAULT, ProgramType::Other);
        assert!(!TechnologyFocus::DEFAULT.is_topic());
        assert_eq!(UnitFocus::DEFAULT, UnitFocus::Other);
    }
}
