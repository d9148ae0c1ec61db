//! Keyword classifiers mapping free text onto closed label sets.
//!
//! Every category owns an ordered [`RuleTable`]. Classification is a pure
//! function of the text and the table: empty or absent text yields the
//! category's default label, never an error.
//!
//! Tables can be replaced from a JSON rules file:
//!
//! ```json
//! {
//!   "program_level": [
//!     {"label": "Doctoral", "words": ["phd"]},
//!     {"label": "Graduate", "contains": ["master"], "words": ["ms"]}
//!   ]
//! }
//! ```

pub mod labels;
pub mod tables;

use serde::{Deserialize, Serialize};

pub use labels::{Label, ProgramLevel, ProgramType, TechnologyFocus, UnitFocus};
pub use tables::{KeywordRule, RuleTable};

/// The four classification categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ProgramLevel,
    ProgramType,
    TechnologyFocus,
    UnitFocus,
}

/// All classifier tables. Missing categories in a rules file keep defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Classifier {
    pub program_level: RuleTable<ProgramLevel>,
    pub program_type: RuleTable<ProgramType>,
    pub technology_focus: RuleTable<TechnologyFocus>,
    pub unit_focus: RuleTable<UnitFocus>,
}

impl Classifier {
    /// `classify(text, category) -> label` over the string form of the label.
    pub fn classify(&self, text: Option<&str>, category: Category) -> &'static str {
        match category {
            Category::ProgramLevel => self.program_level.classify(text).as_str(),
            Category::ProgramType => self.program_type.classify(text).as_str(),
            Category::TechnologyFocus => self.technology_focus.classify(text).as_str(),
            Category::UnitFocus => self.unit_focus.classify(text).as_str(),
        }
    }

    pub fn program_level(&self, text: Option<&str>) -> ProgramLevel {
        self.program_level.classify(text)
    }

    pub fn program_type(&self, text: Option<&str>) -> ProgramType {
        self.program_type.classify(text)
    }

    pub fn technology_focus(&self, text: Option<&str>) -> TechnologyFocus {
        self.technology_focus.classify(text)
    }

    pub fn unit_focus(&self, text: Option<&str>) -> UnitFocus {
        self.unit_focus.classify(text)
    }

    /// Topic labels mentioned anywhere in `text`, in table order.
    pub fn topics(&self, text: Option<&str>) -> Vec<TechnologyFocus> {
        self.technology_focus
            .matching_labels(text)
            .into_iter()
            .filter(TechnologyFocus::is_topic)
            .collect()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            program_level: default_program_level(),
            program_type: default_program_type(),
            technology_focus: default_technology_focus(),
            unit_focus: default_unit_focus(),
        }
    }
}

fn default_program_level() -> RuleTable<ProgramLevel> {
    use ProgramLevel::*;
    RuleTable::new(vec![
        KeywordRule::new(
            Undergraduate,
            &["bachelor", "undergraduate", "associate degree", "associate of"],
            &["bs", "ba", "bsc", "bfa"],
        ),
        KeywordRule::new(Doctoral, &["doctor"], &["phd", "dphil", "edd"]),
        KeywordRule::new(
            Graduate,
            &["master", "graduate", "post baccalaureate"],
            &["ms", "ma", "mba", "msc", "mf", "mfa", "mps"],
        ),
    ])
}

fn default_program_type() -> RuleTable<ProgramType> {
    use ProgramType::*;
    RuleTable::new(vec![
        KeywordRule::new(Forestry, &["forestry", "forest", "silvicultur"], &[]),
        KeywordRule::new(
            NaturalResources,
            &["natural resource", "environmental", "ecology", "conservation", "wildlife"],
            &[],
        ),
        KeywordRule::new(
            Geospatial,
            &["geospatial", "geographic", "spatial", "remote sensing"],
            &["gis"],
        ),
        KeywordRule::new(
            DataScience,
            &["data science", "analytics", "informatics", "computational"],
            &[],
        ),
        KeywordRule::new(
            ComputerScience,
            &["computer science", "computing", "software", "programming"],
            &[],
        ),
        KeywordRule::new(Engineering, &["engineering", "technolog", "technical"], &[]),
        KeywordRule::new(
            BusinessManagement,
            &["business", "management", "administration", "policy"],
            &["mba"],
        ),
        KeywordRule::new(Science, &["science", "scientific", "research"], &[]),
    ])
}

fn default_technology_focus() -> RuleTable<TechnologyFocus> {
    use TechnologyFocus::*;
    RuleTable::new(vec![
        KeywordRule::new(
            AiMl,
            &[
                "artificial intelligence",
                "machine learning",
                "deep learning",
                "neural network",
                "computer vision",
                "natural language processing",
                "predictive model",
                "data mining",
                "pattern recognition",
            ],
            &["ai", "ml"],
        ),
        KeywordRule::new(
            Gis,
            &[
                "geographic information",
                "spatial analysis",
                "mapping",
                "cartograph",
                "geospatial",
                "spatial data",
                "spatial model",
            ],
            &["gis"],
        ),
        KeywordRule::new(
            RemoteSensing,
            &["remote sensing", "satellite", "lidar", "aerial photo", "spectral"],
            &["radar"],
        ),
        KeywordRule::new(
            DronesUav,
            &["drone", "unmanned aerial", "aerial survey"],
            &["uav", "uavs", "uas"],
        ),
        KeywordRule::new(
            DataScience,
            &[
                "data science",
                "big data",
                "data analytic",
                "statistical analysis",
                "quantitative method",
                "simulation",
                "optimization",
            ],
            &[],
        ),
    ])
}

fn default_unit_focus() -> RuleTable<UnitFocus> {
    use UnitFocus::*;
    RuleTable::new(vec![
        KeywordRule::new(
            Gis,
            &["geospatial", "geographic", "spatial", "mapping", "cartograph"],
            &["gis"],
        ),
        KeywordRule::new(
            Ai,
            &["artificial intelligence", "machine learning", "computational", "data science"],
            &["ai", "ml"],
        ),
        KeywordRule::new(
            RemoteSensing,
            &["remote sensing", "satellite", "aerial", "sensor", "earth observation", "spectral"],
            &[],
        ),
        KeywordRule::new(DronesUav, &["drone", "unmanned aerial"], &["uav", "uas"]),
        KeywordRule::new(
            ForestryEnvironmental,
            &["forestry", "forest", "natural resource", "environmental"],
            &[],
        ),
        KeywordRule::new(ComputerScience, &["computer science", "computing", "software"], &[]),
    ])
}
