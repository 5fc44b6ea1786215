//! Rule-based structural filtering.
//!
//! Hard constraints become column rules from two sources: a fixed keyword
//! vocabulary (transit modes, price sentiment) and, optionally, rules proposed
//! by the language model. Rules are evaluated over every site into a hard AND
//! mask and a per-site satisfaction fraction.

use crate::models::StageResult;
use geosite_core::models::{
    columns, sort_by_score_desc, HardConstraint, Rule, RuleOp, Site, SiteScore, SiteTable,
};
use geosite_core::models::site::{cell_number, cell_text};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

static DISTANCE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(\d{2,5})\s*米").ok());

const SUBWAY_KEYWORDS: &[&str] = &["地铁", "地铁站", "轨道", "metro", "subway"];
const BUS_KEYWORDS: &[&str] = &["公交", "公交站", "巴士", "bus"];
const TRAIN_KEYWORDS: &[&str] = &["火车", "火车站", "铁路", "train"];
const PARKING_KEYWORDS: &[&str] = &["停车", "停车场", "parking"];
const TRAFFIC_KEYWORDS: &[&str] = &["交通便利", "交通方便", "通勤便利", "出行便捷", "交通评分", "交通指数"];
const CHEAP_KEYWORDS: &[&str] = &["便宜", "低价", "预算有限", "性价比", "价格便宜", "划算", "降成本"];
const EXPENSIVE_KEYWORDS: &[&str] = &["昂贵", "高端", "高价", "高档", "高预算"];

/// A transit facility with its count and nearest-distance columns
struct TransitMode {
    keywords: &'static [&'static str],
    count_column: &'static str,
    nearest_column: &'static str,
    default_distance_m: f64,
}

const TRANSIT_MODES: [TransitMode; 4] = [
    TransitMode {
        keywords: SUBWAY_KEYWORDS,
        count_column: columns::SUBWAY_COUNT,
        nearest_column: columns::SUBWAY_NEAREST,
        default_distance_m: 800.0,
    },
    TransitMode {
        keywords: BUS_KEYWORDS,
        count_column: columns::BUS_COUNT,
        nearest_column: columns::BUS_NEAREST,
        default_distance_m: 300.0,
    },
    TransitMode {
        keywords: TRAIN_KEYWORDS,
        count_column: columns::TRAIN_COUNT,
        nearest_column: columns::TRAIN_NEAREST,
        default_distance_m: 2500.0,
    },
    TransitMode {
        keywords: PARKING_KEYWORDS,
        count_column: columns::PARKING_COUNT,
        nearest_column: columns::PARKING_NEAREST,
        default_distance_m: 800.0,
    },
];

/// Per-site outcome of evaluating a rule set
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluation {
    /// Row-aligned result of AND-ing every evaluated rule
    pub mask: Vec<bool>,

    /// Row-aligned fraction of evaluated rules each site satisfies
    pub satisfaction: Vec<f64>,

    /// Rules that were evaluated; skipped rules are not counted
    pub evaluated_rules: usize,
}

impl RuleEvaluation {
    fn all_pass(rows: usize) -> Self {
        Self {
            mask: vec![true; rows],
            satisfaction: vec![1.0; rows],
            evaluated_rules: 0,
        }
    }
}

/// Text-score range used to re-rank filtered candidates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextScoreRange {
    pub min: f64,
    pub max: f64,
}

impl TextScoreRange {
    pub fn of(candidates: &[SiteScore]) -> Self {
        if candidates.is_empty() {
            return Self { min: 0.0, max: 1.0 };
        }
        let min = candidates.iter().map(|c| c.score).fold(f64::INFINITY, f64::min);
        let max = candidates.iter().map(|c| c.score).fold(f64::NEG_INFINITY, f64::max);
        Self { min, max }
    }

    /// Min-max normalize into [0, 1]; a flat range divides by 1
    pub fn normalize(&self, score: f64) -> f64 {
        let span = self.max - self.min;
        let span = if span > 1e-8 { span } else { 1.0 };
        (score - self.min) / span
    }
}

/// Derives and evaluates column rules over a site table
pub struct ConstraintEngine {
    table: Arc<SiteTable>,
}

impl ConstraintEngine {
    pub fn new(table: Arc<SiteTable>) -> Self {
        Self { table }
    }

    /// Keyword-derived rules for the hard constraints.
    ///
    /// Thresholds come from dataset quantiles unless the constraint text names
    /// an explicit distance ("500米"). Rules on absent columns are not emitted.
    pub fn derive_preset_rules(&self, constraints: &[HardConstraint]) -> Vec<Rule> {
        let price_low = self.table.quantile(columns::PRICE_PER_M2, 0.25).unwrap_or(0.0);
        let price_high = self.table.quantile(columns::PRICE_PER_M2, 0.75).unwrap_or(999_999.0);
        let traffic_high = self.table.quantile(columns::TRAFFIC_SCORE, 0.75).unwrap_or(7.5);

        let mut rules = Vec::new();
        let mut add = |column: &str, op: RuleOp, value: f64, negative: bool| {
            if self.table.has_column(column) {
                rules.push(Rule::new(column, op, value).negated(negative));
            }
        };

        for constraint in constraints {
            let text = constraint.text.to_lowercase();
            let negative = constraint.is_negative;
            let mentions = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

            for mode in &TRANSIT_MODES {
                if mentions(mode.keywords) {
                    let distance = extract_distance(&text).unwrap_or(mode.default_distance_m);
                    add(mode.count_column, RuleOp::Ge, 1.0, negative);
                    add(mode.nearest_column, RuleOp::Le, distance, negative);
                }
            }
            if mentions(TRAFFIC_KEYWORDS) {
                add(columns::TRAFFIC_SCORE, RuleOp::Ge, traffic_high, negative);
            }
            if mentions(CHEAP_KEYWORDS) {
                add(columns::PRICE_PER_M2, RuleOp::Le, price_low, negative);
            }
            if mentions(EXPENSIVE_KEYWORDS) {
                add(columns::PRICE_PER_M2, RuleOp::Ge, price_high, negative);
            }
        }

        tracing::debug!(constraints = constraints.len(), rules = rules.len(), "Derived preset rules");
        rules
    }

    /// Evaluate rules over every site.
    ///
    /// Rules on absent columns, below the confidence threshold, or with an
    /// unusable value are skipped. An empty or fully skipped rule set passes
    /// every site with satisfaction 1.0.
    pub fn evaluate(&self, rules: &[Rule]) -> RuleEvaluation {
        let sites = self.table.sites();
        let mut evaluation = RuleEvaluation::all_pass(sites.len());
        let mut satisfied = vec![0.0; sites.len()];

        for rule in rules {
            if !rule.is_confident() || !self.table.has_column(&rule.column) {
                tracing::debug!(rule = %rule, "Skipping rule");
                continue;
            }
            let Some(matcher) = Matcher::compile(rule) else {
                tracing::debug!(rule = %rule, "Skipping rule with unusable value");
                continue;
            };

            evaluation.evaluated_rules += 1;
            for (row, site) in sites.iter().enumerate() {
                let passes = matcher.matches(site, &rule.column) != rule.negative;
                evaluation.mask[row] &= passes;
                if passes {
                    satisfied[row] += 1.0;
                }
            }
        }

        if evaluation.evaluated_rules > 0 {
            let total = evaluation.evaluated_rules as f64;
            evaluation.satisfaction = satisfied.into_iter().map(|s| s / total).collect();
        }
        evaluation
    }

    /// Keep candidates passing the mask and re-rank them by normalized text score.
    ///
    /// Filtering everything out discards the filter and returns the input.
    pub fn filter(
        &self,
        candidates: &[SiteScore],
        evaluation: &RuleEvaluation,
        text_scores: &HashMap<geosite_core::models::SiteId, f64>,
        range: TextScoreRange,
    ) -> StageResult<Vec<SiteScore>> {
        let mut kept: Vec<SiteScore> = candidates
            .iter()
            .filter(|c| {
                self.table
                    .row_of(c.site_id)
                    .and_then(|row| evaluation.mask.get(row).copied())
                    .unwrap_or(false)
            })
            .map(|c| {
                let text = text_scores.get(&c.site_id).copied().unwrap_or(range.min);
                SiteScore::new(c.site_id, range.normalize(text))
            })
            .collect();

        tracing::info!(kept = kept.len(), candidates = candidates.len(), "Structural filter applied");

        if kept.is_empty() {
            return StageResult::degraded(
                candidates.to_vec(),
                "structural filter removed every candidate; keeping unfiltered set",
            );
        }

        sort_by_score_desc(&mut kept);
        StageResult::Complete(kept)
    }
}

/// Explicit "N 米" distance in constraint text
fn extract_distance(text: &str) -> Option<f64> {
    DISTANCE_PATTERN
        .as_ref()?
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// A rule compiled against its value
enum Matcher {
    Numeric(RuleOp, f64),
    Equals(String),
    Contains(String),
    Pattern(Regex),
    AnyOf(Vec<String>),
}

impl Matcher {
    fn compile(rule: &Rule) -> Option<Self> {
        match rule.op {
            op if op.is_numeric() => cell_number(&rule.value).map(|v| Matcher::Numeric(op, v)),
            RuleOp::Eq => Some(Matcher::Equals(cell_text(&rule.value).to_lowercase())),
            RuleOp::Contains => Some(Matcher::Contains(cell_text(&rule.value).to_lowercase())),
            RuleOp::Regex => {
                let pattern = cell_text(&rule.value);
                match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                    Ok(regex) => Some(Matcher::Pattern(regex)),
                    Err(_) => Some(Matcher::Contains(pattern.to_lowercase())),
                }
            }
            RuleOp::In => {
                let items: Vec<String> = match &rule.value {
                    Value::Array(items) => items
                        .iter()
                        .filter(|v| !v.is_null())
                        .map(|v| cell_text(v).to_lowercase())
                        .collect(),
                    Value::Null => Vec::new(),
                    scalar => vec![cell_text(scalar).to_lowercase()],
                };
                (!items.is_empty()).then_some(Matcher::AnyOf(items))
            }
            _ => None,
        }
    }

    fn matches(&self, site: &Site, column: &str) -> bool {
        match self {
            Matcher::Numeric(op, threshold) => match site.number(column) {
                Some(v) => match op {
                    RuleOp::Le => v <= *threshold,
                    RuleOp::Ge => v >= *threshold,
                    RuleOp::Lt => v < *threshold,
                    RuleOp::Gt => v > *threshold,
                    _ => false,
                },
                None => false,
            },
            Matcher::Equals(expected) => site.text(column).to_lowercase() == *expected,
            Matcher::Contains(needle) => site.text(column).to_lowercase().contains(needle.as_str()),
            Matcher::Pattern(regex) => regex.is_match(&site.text(column)),
            Matcher::AnyOf(items) => {
                let cell = site.text(column).to_lowercase();
                items.iter().any(|item| cell.contains(item.as_str()))
            }
        }
    }
}
