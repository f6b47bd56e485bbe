//! Static failure-pattern catalog and the matcher over dimension scores.
//!
//! Everything here is pure: the same scores always produce the same matches
//! in the same order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::lenient::number_of;
use crate::profile::Dimension;

/// Base confidence of a predicate hit before the severity multiplier.
pub const BASE_CONFIDENCE: f64 = 0.7;

/// Nine dimension scores in `0..=5`; `0` means the dimension was not judged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub team: u8,
    pub problem: u8,
    pub product: u8,
    pub market: u8,
    pub traction: u8,
    pub gtm: u8,
    pub business: u8,
    pub vision: u8,
    pub operations: u8,
}

impl ScoreCard {
    pub fn get(&self, dimension: Dimension) -> u8 {
        match dimension {
            Dimension::Team => self.team,
            Dimension::Problem => self.problem,
            Dimension::Product => self.product,
            Dimension::Market => self.market,
            Dimension::Traction => self.traction,
            Dimension::Gtm => self.gtm,
            Dimension::Business => self.business,
            Dimension::Vision => self.vision,
            Dimension::Operations => self.operations,
        }
    }

    fn slot(&mut self, dimension: Dimension) -> &mut u8 {
        match dimension {
            Dimension::Team => &mut self.team,
            Dimension::Problem => &mut self.problem,
            Dimension::Product => &mut self.product,
            Dimension::Market => &mut self.market,
            Dimension::Traction => &mut self.traction,
            Dimension::Gtm => &mut self.gtm,
            Dimension::Business => &mut self.business,
            Dimension::Vision => &mut self.vision,
            Dimension::Operations => &mut self.operations,
        }
    }

    /// Pull scores out of an evaluation document. Accepts the evaluation
    /// report (`reports.team.score`), raw graph state (`team_report.score`)
    /// and flat maps (`team: 3` or `team: {score: 3}`), optionally nested
    /// under `scores`. Anything unreadable stays `0`.
    pub fn from_evaluation(value: &Value) -> Self {
        let mut card = ScoreCard::default();
        let roots = [
            value.get("reports"),
            value.get("scores"),
            value.get("evaluation").and_then(|v| v.get("reports")),
            Some(value),
        ];
        for dimension in Dimension::ALL {
            let found = roots.iter().flatten().find_map(|root| {
                root.get(dimension.as_str())
                    .or_else(|| root.get(dimension.report_key()))
                    .and_then(score_of)
            });
            if let Some(score) = found {
                *card.slot(dimension) = score;
            }
        }
        card
    }

    pub fn as_map(&self) -> serde_json::Map<String, Value> {
        Dimension::ALL
            .into_iter()
            .map(|d| (d.as_str().to_string(), Value::from(self.get(d))))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        Dimension::ALL.into_iter().all(|d| self.get(d) == 0)
    }
}

fn score_of(value: &Value) -> Option<u8> {
    match value {
        Value::Object(map) => map.get("score").and_then(score_of),
        other => number_of(other).map(|v| v.round().clamp(0.0, 5.0) as u8),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn multiplier(self) -> f64 {
        match self {
            Severity::High => 1.5,
            Severity::Medium => 1.3,
            Severity::Low => 1.1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Team,
    Problem,
    Product,
    Market,
    Traction,
    Gtm,
    Economics,
    Vision,
    Operations,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Team,
        Category::Problem,
        Category::Product,
        Category::Market,
        Category::Traction,
        Category::Gtm,
        Category::Economics,
        Category::Vision,
        Category::Operations,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Team => "team",
            Category::Problem => "problem",
            Category::Product => "product",
            Category::Market => "market",
            Category::Traction => "traction",
            Category::Gtm => "gtm",
            Category::Economics => "economics",
            Category::Vision => "vision",
            Category::Operations => "operations",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrengthLabel {
    Weak,
    Moderate,
    Strong,
}

impl StrengthLabel {
    pub fn from_score(strength: f64) -> Self {
        if strength > 1.0 {
            StrengthLabel::Strong
        } else if strength >= 0.5 {
            StrengthLabel::Moderate
        } else {
            StrengthLabel::Weak
        }
    }
}

pub struct Pattern {
    pub id: &'static str,
    pub name: &'static str,
    pub category: Category,
    pub severity: Severity,
    pub predicate: fn(&ScoreCard) -> bool,
    pub template: &'static str,
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("severity", &self.severity)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchedPattern {
    pub pattern_id: String,
    pub name: String,
    pub category: Category,
    pub severity: Severity,
    pub strength_score: f64,
    pub strength_label: StrengthLabel,
    pub template: String,
}

fn known(score: u8) -> bool {
    score > 0
}

fn low(score: u8) -> bool {
    (1..=2).contains(&score)
}

fn mid(score: u8) -> bool {
    score == 3
}

fn high(score: u8) -> bool {
    score >= 4
}

macro_rules! pattern {
    ($id:literal, $name:literal, $category:ident, $severity:ident, |$s:ident| $pred:expr, $template:literal) => {
        Pattern {
            id: $id,
            name: $name,
            category: Category::$category,
            severity: Severity::$severity,
            predicate: |$s: &ScoreCard| $pred,
            template: $template,
        }
    };
}

pub static CATALOG: [Pattern; 40] = [
    // Team
    pattern!("solo-founder-weak-team", "Solo founder without a bench", Team, High,
        |s| low(s.team) && s.operations <= 2,
        "Recruit a co-founder or senior hire who owns the function you are weakest in before raising."),
    pattern!("team-product-mismatch", "Team cannot carry the product", Team, Medium,
        |s| low(s.team) && s.product >= 3,
        "Show who will build and maintain the product long term; name the missing technical owner."),
    pattern!("execution-gap", "Capable team, thin execution", Team, Medium,
        |s| s.team >= 3 && low(s.operations),
        "Publish a shipping cadence and hit it for eight weeks to prove the team executes."),
    pattern!("no-team-data", "Team not described", Team, Low,
        |s| !known(s.team),
        "Fill in founder backgrounds, roles and years of direct experience."),
    pattern!("strong-team-weak-market", "Strong team in a weak market", Team, Low,
        |s| high(s.team) && low(s.market),
        "Point the team at a larger adjacent market or prove the niche expands."),
    // Problem
    pattern!("solution-in-search-of-problem", "Solution in search of a problem", Problem, High,
        |s| low(s.problem) && s.product >= 3,
        "Stop building and run 20 problem interviews before the next release."),
    pattern!("weak-pain", "Pain is not acute", Problem, High,
        |s| low(s.problem),
        "Quantify what the problem costs the customer per week; drop segments where it is trivial."),
    pattern!("unvalidated-problem", "Problem stated but not validated", Problem, Medium,
        |s| mid(s.problem) && low(s.traction),
        "Convert interview interest into pre-orders or signed pilots."),
    pattern!("no-problem-evidence", "Problem not described", Problem, Low,
        |s| !known(s.problem),
        "Write the problem statement with customer quotes and interview counts."),
    pattern!("vitamin-not-painkiller", "Vitamin, not painkiller", Problem, Medium,
        |s| mid(s.problem) && low(s.business),
        "Find the buyer who loses money without you and price against that loss."),
    // Product
    pattern!("product-not-ready", "Product not ready", Product, High,
        |s| low(s.product),
        "Cut scope to the one workflow that solves the core pain and ship it to design partners."),
    pattern!("feature-not-product", "Feature, not a product", Product, Medium,
        |s| mid(s.product) && low(s.vision),
        "Describe the product roadmap beyond the first feature and what stops incumbents copying it."),
    pattern!("tech-without-traction", "Technology without traction", Product, Medium,
        |s| high(s.product) && low(s.traction),
        "Put the product in front of paying users; measure weekly active usage."),
    pattern!("no-product-data", "Product not described", Product, Low,
        |s| !known(s.product),
        "Add product stage, demo link and what makes users return."),
    // Market
    pattern!("tiny-market", "Market too small", Market, High,
        |s| low(s.market),
        "Size the market bottom-up and identify the expansion path beyond the beachhead."),
    pattern!("crowded-market", "Crowded market, weak differentiation", Market, Medium,
        |s| mid(s.market) && low(s.product),
        "Name the three closest competitors and the one thing you do that they cannot."),
    pattern!("market-timing", "Big market, unclear pain", Market, Medium,
        |s| high(s.market) && low(s.problem),
        "Explain why now: the shift that makes the problem urgent this year."),
    pattern!("no-market-data", "Market not described", Market, Low,
        |s| !known(s.market),
        "State the beachhead market, its size and how you estimated it."),
    pattern!("big-market-no-wedge", "Big market without a wedge", Market, Low,
        |s| high(s.market) && low(s.gtm),
        "Pick one narrow segment and one channel to win first."),
    // Traction
    pattern!("no-traction", "No traction", Traction, High,
        |s| low(s.traction),
        "Set a 90-day target of paying customers or LOIs and report weekly."),
    pattern!("vanity-metrics", "Vanity metrics", Traction, Medium,
        |s| s.traction >= 3 && low(s.business),
        "Report revenue, retention and conversion instead of sign-ups."),
    pattern!("premature-scaling", "Premature scaling", Traction, High,
        |s| high(s.gtm) && low(s.traction),
        "Pause paid acquisition until retention proves product-market fit."),
    pattern!("no-traction-data", "Traction not described", Traction, Low,
        |s| !known(s.traction),
        "Add user counts, active usage, revenue and growth rate."),
    pattern!("leaky-bucket", "Leaky bucket", Traction, Medium,
        |s| mid(s.traction) && low(s.product),
        "Fix activation and retention before adding more top-of-funnel."),
    // GTM
    pattern!("no-distribution", "No distribution plan", Gtm, High,
        |s| low(s.gtm),
        "Test three acquisition channels with small budgets and keep the one with the best payback."),
    pattern!("channel-mismatch", "Channel does not fit the price point", Gtm, Medium,
        |s| mid(s.gtm) && low(s.business),
        "Match the sales motion to deal size: self-serve below $5k, sales-led above."),
    pattern!("founder-led-sales-ceiling", "Founder-led sales ceiling", Gtm, Low,
        |s| mid(s.gtm) && low(s.operations),
        "Document the sales playbook so someone other than the founder can close."),
    pattern!("no-gtm-data", "Go-to-market not described", Gtm, Low,
        |s| !known(s.gtm),
        "Describe buyer, user, channel, sales motion and cycle length."),
    // Economics
    pattern!("no-business-model", "No business model", Economics, High,
        |s| low(s.business),
        "Pick a pricing model and charge the next three customers."),
    pattern!("unit-economics-unproven", "Unit economics unproven", Economics, Medium,
        |s| mid(s.business) && low(s.traction),
        "Calculate CAC, gross margin and payback from real customers, not assumptions."),
    pattern!("pricing-power-weak", "Weak pricing power", Economics, Medium,
        |s| mid(s.business) && low(s.product),
        "Run a price test on new customers; raise until someone says no."),
    pattern!("no-economics-data", "Economics not described", Economics, Low,
        |s| !known(s.business),
        "Add pricing, margin, burn and runway."),
    pattern!("capital-intensive-early", "Capital intensive too early", Economics, Medium,
        |s| low(s.business) && low(s.operations),
        "Cut burn to extend runway past 18 months or raise against a clear milestone."),
    // Vision
    pattern!("no-long-term-vision", "No long-term vision", Vision, Medium,
        |s| low(s.vision),
        "Write the five-year vision and the category you intend to define."),
    pattern!("vision-execution-gap", "Vision outruns execution", Vision, Medium,
        |s| high(s.vision) && low(s.operations),
        "Tie the vision to the next three milestones and what each unlocks."),
    pattern!("no-moat", "No moat", Vision, High,
        |s| low(s.product) && s.market >= 3,
        "Identify the data, network or switching-cost advantage that compounds with usage."),
    pattern!("no-vision-data", "Vision not described", Vision, Low,
        |s| !known(s.vision),
        "Add the long-term vision, primary risk and use of funds."),
    // Operations
    pattern!("operational-fragility", "Operational fragility", Operations, High,
        |s| low(s.operations),
        "Assign an owner to every function and track burn against plan monthly."),
    pattern!("ops-cannot-scale", "Operations will not scale with growth", Operations, Medium,
        |s| mid(s.operations) && high(s.traction),
        "Automate the manual steps that break at ten times today's volume."),
    pattern!("no-ops-data", "Operations not described", Operations, Low,
        |s| !known(s.operations),
        "Describe who owns what, burn, runway and use of funds."),
];

pub fn strength(severity: Severity) -> f64 {
    BASE_CONFIDENCE * severity.multiplier()
}

/// Every catalog pattern whose predicate holds, strongest first, ties by id.
pub fn match_patterns(scores: &ScoreCard) -> Vec<MatchedPattern> {
    let mut matched: Vec<MatchedPattern> = CATALOG
        .iter()
        .filter(|p| (p.predicate)(scores))
        .map(|p| {
            let strength_score = strength(p.severity);
            MatchedPattern {
                pattern_id: p.id.to_string(),
                name: p.name.to_string(),
                category: p.category,
                severity: p.severity,
                strength_score,
                strength_label: StrengthLabel::from_score(strength_score),
                template: p.template.to_string(),
            }
        })
        .collect();
    matched.sort_by(|a, b| {
        b.strength_score
            .total_cmp(&a.strength_score)
            .then_with(|| a.pattern_id.cmp(&b.pattern_id))
    });
    matched
}
