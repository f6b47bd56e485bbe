//! Evidence classification and pain-score adjustment.
//!
//! The model's raw pain verdict is only as good as the evidence behind it, so
//! the raw score is scaled by how much evidence there is, how intense the
//! complaints read, and how credible the sources are.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceKind {
    Problem,
    Solution,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credibility {
    Low,
    Medium,
    High,
}

impl Credibility {
    pub fn score(self) -> f64 {
        match self {
            Credibility::High => 1.0,
            Credibility::Medium => 0.7,
            Credibility::Low => 0.4,
        }
    }
}

/// A community or review site that validation searches are scoped to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceSite {
    pub name: &'static str,
    pub domain: &'static str,
    pub weight: f64,
    pub credibility: Credibility,
}

pub const SOURCE_SITES: [SourceSite; 6] = [
    SourceSite {
        name: "reddit",
        domain: "reddit.com",
        weight: 1.0,
        credibility: Credibility::Medium,
    },
    SourceSite {
        name: "producthunt",
        domain: "producthunt.com",
        weight: 0.8,
        credibility: Credibility::Medium,
    },
    SourceSite {
        name: "trustpilot",
        domain: "trustpilot.com",
        weight: 1.2,
        credibility: Credibility::High,
    },
    SourceSite {
        name: "g2",
        domain: "g2.com",
        weight: 1.5,
        credibility: Credibility::High,
    },
    SourceSite {
        name: "twitter",
        domain: "twitter.com",
        weight: 0.6,
        credibility: Credibility::Low,
    },
    SourceSite {
        name: "hackernews",
        domain: "news.ycombinator.com",
        weight: 1.0,
        credibility: Credibility::Medium,
    },
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    #[serde(rename = "type")]
    pub kind: EvidenceKind,
    pub title: String,
    pub snippet: String,
    pub source: String,
    pub weight: f64,
    pub credibility: Credibility,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceTier {
    VeryStrong,
    Strong,
    Moderate,
    Weak,
    Minimal,
}

impl EvidenceTier {
    pub fn from_count(count: usize) -> Self {
        match count {
            n if n >= 10 => EvidenceTier::VeryStrong,
            n if n >= 8 => EvidenceTier::Strong,
            n if n >= 5 => EvidenceTier::Moderate,
            n if n >= 3 => EvidenceTier::Weak,
            _ => EvidenceTier::Minimal,
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            EvidenceTier::VeryStrong => 1.0,
            EvidenceTier::Strong => 0.9,
            EvidenceTier::Moderate => 0.7,
            EvidenceTier::Weak => 0.5,
            EvidenceTier::Minimal => 0.3,
        }
    }
}

static HIGH_PAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(hate|hated|frustrat\w*|nightmare|waste of|terrible|painful|desperate\w*|impossible|can'?t stand|worst|broken|unusable|fed up|struggl\w*)\b",
    )
    .expect("valid regex")
});

static LOW_PAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(nice to have|minor|not a big deal|would be nice|slightly|a bit annoying|occasionally|no big deal|works fine)\b",
    )
    .expect("valid regex")
});

/// Keyword hit counts over the evidence text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PainIntensity {
    pub high_pain_hits: usize,
    pub low_pain_hits: usize,
}

impl PainIntensity {
    pub fn scan(items: &[EvidenceItem]) -> Self {
        let mut intensity = Self::default();
        for item in items {
            for text in [&item.title, &item.snippet] {
                intensity.high_pain_hits += HIGH_PAIN.find_iter(text).count();
                intensity.low_pain_hits += LOW_PAIN.find_iter(text).count();
            }
        }
        intensity
    }

    pub fn multiplier(self) -> f64 {
        if self.high_pain_hits > 2 * self.low_pain_hits {
            1.3
        } else if self.low_pain_hits > 2 * self.high_pain_hits {
            0.7
        } else {
            1.0
        }
    }

    pub fn label(self) -> &'static str {
        match self.multiplier() {
            m if m > 1.0 => "high",
            m if m < 1.0 => "low",
            _ => "mixed",
        }
    }
}

/// Source-weighted mean credibility score; 0 for no evidence.
pub fn mean_weighted_credibility(items: &[EvidenceItem]) -> f64 {
    let total_weight = items.iter().map(|i| i.weight).sum::<f64>();
    if total_weight <= 0.0 {
        return 0.0;
    }
    items
        .iter()
        .map(|i| i.weight * i.credibility.score())
        .sum::<f64>()
        / total_weight
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PainVerdict {
    Validated,
    Moderate,
    InsufficientData,
    Weak,
}

impl PainVerdict {
    pub fn decide(adjusted_score: f64, evidence_count: usize) -> Self {
        if adjusted_score >= 70.0 && evidence_count >= 5 {
            PainVerdict::Validated
        } else if adjusted_score >= 50.0 && evidence_count >= 3 {
            PainVerdict::Moderate
        } else if evidence_count < 3 {
            PainVerdict::InsufficientData
        } else {
            PainVerdict::Weak
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PainVerdict::Validated => "VALIDATED",
            PainVerdict::Moderate => "MODERATE",
            PainVerdict::InsufficientData => "INSUFFICIENT_DATA",
            PainVerdict::Weak => "WEAK",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PainAssessment {
    pub raw_score: f64,
    pub adjusted_score: f64,
    pub evidence_count: usize,
    pub tier: EvidenceTier,
    pub evidence_multiplier: f64,
    pub intensity: PainIntensity,
    pub intensity_multiplier: f64,
    pub credibility_adjustment: f64,
    pub verdict: PainVerdict,
}

/// `raw × evidence × intensity × (0.8 + 0.4 × credibility)`, clamped to
/// `[0, 100]`. No evidence means no validated pain.
pub fn adjust_pain_score(
    raw_score: f64,
    evidence_count: usize,
    intensity: PainIntensity,
    mean_credibility: f64,
) -> PainAssessment {
    let tier = EvidenceTier::from_count(evidence_count);
    let credibility_adjustment = 0.8 + 0.4 * mean_credibility.clamp(0.0, 1.0);
    let adjusted_score = if evidence_count == 0 {
        0.0
    } else {
        (raw_score * tier.multiplier() * intensity.multiplier() * credibility_adjustment)
            .clamp(0.0, 100.0)
    };
    PainAssessment {
        raw_score,
        adjusted_score,
        evidence_count,
        tier,
        evidence_multiplier: tier.multiplier(),
        intensity,
        intensity_multiplier: intensity.multiplier(),
        credibility_adjustment,
        verdict: PainVerdict::decide(adjusted_score, evidence_count),
    }
}

/// Convenience over a collected evidence list.
pub fn assess_evidence(raw_score: f64, items: &[EvidenceItem]) -> PainAssessment {
    adjust_pain_score(
        raw_score,
        items.len(),
        PainIntensity::scan(items),
        mean_weighted_credibility(items),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(snippet: &str, site: &SourceSite) -> EvidenceItem {
        EvidenceItem {
            kind: EvidenceKind::Problem,
            title: String::new(),
            snippet: snippet.to_string(),
            source: site.name.to_string(),
            weight: site.weight,
            credibility: site.credibility,
        }
    }

    #[test]
    fn strong_evidence_saturates_at_one_hundred() {
        let intensity = PainIntensity {
            high_pain_hits: 6,
            low_pain_hits: 1,
        };
        let assessment = adjust_pain_score(80.0, 10, intensity, 0.85);
        assert_eq!(assessment.intensity_multiplier, 1.3);
        assert_eq!(assessment.evidence_multiplier, 1.0);
        assert!((assessment.credibility_adjustment - 1.14).abs() < 1e-9);
        assert_eq!(assessment.adjusted_score, 100.0);
        assert_eq!(assessment.verdict, PainVerdict::Validated);
    }

    #[test]
    fn no_evidence_means_insufficient_data() {
        let assessment = assess_evidence(90.0, &[]);
        assert_eq!(assessment.adjusted_score, 0.0);
        assert_eq!(assessment.verdict, PainVerdict::InsufficientData);
        assert_eq!(assessment.tier, EvidenceTier::Minimal);
    }

    #[test]
    fn tiers_follow_counts() {
        let tiers = [0, 3, 5, 8, 10, 25].map(EvidenceTier::from_count);
        assert_eq!(
            tiers,
            [
                EvidenceTier::Minimal,
                EvidenceTier::Weak,
                EvidenceTier::Moderate,
                EvidenceTier::Strong,
                EvidenceTier::VeryStrong,
                EvidenceTier::VeryStrong,
            ]
        );
    }

    #[test]
    fn verdict_thresholds() {
        assert_eq!(PainVerdict::decide(75.0, 4), PainVerdict::Moderate);
        assert_eq!(PainVerdict::decide(75.0, 2), PainVerdict::InsufficientData);
        assert_eq!(PainVerdict::decide(40.0, 6), PainVerdict::Weak);
        assert_eq!(PainVerdict::decide(50.0, 3), PainVerdict::Moderate);
    }

    #[test]
    fn keyword_scan_and_credibility() {
        let g2 = &SOURCE_SITES[3];
        let twitter = &SOURCE_SITES[4];
        let items = vec![
            item("I hate this, total nightmare", g2),
            item("Frustrating and broken", twitter),
            item("minor issue, nice to have", twitter),
        ];
        let intensity = PainIntensity::scan(&items);
        assert_eq!(intensity.high_pain_hits, 4);
        assert_eq!(intensity.low_pain_hits, 2);
        assert_eq!(intensity.label(), "mixed");
        let expected = (1.5 * 1.0 + 0.6 * 0.4 + 0.6 * 0.4) / (1.5 + 0.6 + 0.6);
        assert!((mean_weighted_credibility(&items) - expected).abs() < 1e-12);
    }

    #[test]
    fn evidence_items_serialize_with_type_tag() {
        let value = serde_json::to_value(item("x", &SOURCE_SITES[0])).unwrap();
        assert_eq!(value["type"], "PROBLEM");
        assert_eq!(value["credibility"], "medium");
    }
}
