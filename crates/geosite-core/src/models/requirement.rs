use serde::{Deserialize, Serialize};
use std::fmt;

/// Requirement category as labelled by the request parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintCategory {
    Region,
    LandUse,
    Area,
    Cost,
    Amenity,
    #[default]
    Other,
}

impl ConstraintCategory {
    /// Parse a category label in either Chinese or English; unknown labels are `Other`
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "区域" | "region" | "district" => ConstraintCategory::Region,
            "用地类型" | "land_use" | "land use" | "landuse" => ConstraintCategory::LandUse,
            "面积" | "area" => ConstraintCategory::Area,
            "成本" | "cost" | "price" => ConstraintCategory::Cost,
            "配套" | "amenity" | "facilities" => ConstraintCategory::Amenity,
            _ => ConstraintCategory::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConstraintCategory::Region => "区域",
            ConstraintCategory::LandUse => "用地类型",
            ConstraintCategory::Area => "面积",
            ConstraintCategory::Cost => "成本",
            ConstraintCategory::Amenity => "配套",
            ConstraintCategory::Other => "其他",
        }
    }
}

impl fmt::Display for ConstraintCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One decomposed requirement produced by the request parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Requirement {
    pub positive: Option<String>,
    pub negative: Option<String>,
    pub is_hard_constraint: bool,
    pub category: ConstraintCategory,
}

impl Requirement {
    pub fn soft(positive: impl Into<String>) -> Self {
        Self {
            positive: Some(positive.into()),
            ..Default::default()
        }
    }

    pub fn hard(positive: impl Into<String>, category: ConstraintCategory) -> Self {
        Self {
            positive: Some(positive.into()),
            is_hard_constraint: true,
            category,
            ..Default::default()
        }
    }

    pub fn with_negative(mut self, negative: impl Into<String>) -> Self {
        self.negative = Some(negative.into());
        self
    }
}

/// A non-negotiable requirement driving rule-based filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardConstraint {
    pub text: String,
    pub category: ConstraintCategory,
    pub is_negative: bool,
}

/// One similarity sub-query issued during retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuery {
    pub positive: String,
    pub negative: Option<String>,
}

/// The decomposed request consumed read-only by a selection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementSet {
    /// Raw user request text
    pub request: String,
    pub requirements: Vec<Requirement>,
    pub hard_constraints: Vec<HardConstraint>,
    pub sub_queries: Vec<SubQuery>,
}

fn non_empty(text: &Option<String>) -> Option<String> {
    text.as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

impl RequirementSet {
    /// Split parsed requirements into hard constraints and retrieval sub-queries.
    ///
    /// When no requirement carries a positive text the raw request becomes the
    /// single sub-query.
    pub fn from_requirements(request: impl Into<String>, requirements: Vec<Requirement>) -> Self {
        let request = request.into();
        let mut hard_constraints = Vec::new();
        let mut sub_queries = Vec::new();

        for requirement in &requirements {
            let positive = non_empty(&requirement.positive);
            let negative = non_empty(&requirement.negative);

            if requirement.is_hard_constraint {
                if let Some(text) = &positive {
                    hard_constraints.push(HardConstraint {
                        text: text.clone(),
                        category: requirement.category,
                        is_negative: false,
                    });
                }
                if let Some(text) = &negative {
                    hard_constraints.push(HardConstraint {
                        text: text.clone(),
                        category: requirement.category,
                        is_negative: true,
                    });
                }
            }

            if let Some(positive) = positive {
                sub_queries.push(SubQuery { positive, negative });
            }
        }

        if sub_queries.is_empty() {
            sub_queries.push(SubQuery {
                positive: request.clone(),
                negative: None,
            });
        }

        Self {
            request,
            requirements,
            hard_constraints,
            sub_queries,
        }
    }

    /// Fallback used when the request parser is unavailable or returns nothing
    pub fn fallback(request: impl Into<String>) -> Self {
        Self::from_requirements(request, Vec::new())
    }

    pub fn positive_texts(&self) -> Vec<&str> {
        self.sub_queries.iter().map(|q| q.positive.as_str()).collect()
    }

    pub fn has_positive_region_constraint(&self) -> bool {
        self.hard_constraints
            .iter()
            .any(|c| c.category == ConstraintCategory::Region && !c.is_negative)
    }

    /// Hard constraints rendered for prompts, negatives prefixed with 不包含
    pub fn constraint_summary(&self) -> Vec<String> {
        self.hard_constraints
            .iter()
            .map(|c| {
                if c.is_negative {
                    format!("不包含:{}", c.text)
                } else {
                    c.text.clone()
                }
            })
            .collect()
    }
}
