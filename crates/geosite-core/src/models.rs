pub mod dataset;
pub mod narrative;
pub mod requirement;
pub mod rule;
pub mod selection;
pub mod site;

pub use dataset::SiteTable;
pub use narrative::{NarrationRequest, Narrative, SiteNarrative};
pub use requirement::{ConstraintCategory, HardConstraint, Requirement, RequirementSet, SubQuery};
pub use rule::{RawRule, Rule, RuleOp, RuleProposal, MIN_RULE_CONFIDENCE};
pub use selection::{sort_by_score_desc, Cluster, ScoreBreakdown, ScoringWeights, SiteScore};
pub use site::{columns, Site, SiteId};
