//! Per-dimension scoring and the final memo.

use serde_json::json;
use std::collections::BTreeMap;

use super::model::{DimensionReport, Memo};
use crate::agents::{Agents, CallOptions, Role};
use crate::profile::{is_blank, Dimension};
use crate::prompts::Prompt;

pub const ACTION_PLAN_LEN: usize = 3;
const SYNTHESIS_TEMPERATURE: f64 = 0.2;

pub struct ScoringInputs<'a> {
    pub dimension: Dimension,
    pub view: &'a serde_json::Value,
    pub contradiction: &'a str,
    pub risk: &'a str,
    pub missing_fields: &'a [String],
    pub extra_evidence: &'a str,
}

/// Score one dimension. Never fails: an empty view scores `0` without a
/// model call, and a failed call yields the system-error report.
#[tracing::instrument(level = "debug", skip_all, fields(dimension = %inputs.dimension))]
pub async fn score_dimension(agents: &Agents, inputs: ScoringInputs<'_>) -> DimensionReport {
    if is_blank(inputs.view) {
        return DimensionReport::insufficient_data(inputs.missing_fields);
    }
    let prompt_inputs = json!({
        "dimension": inputs.dimension.label(),
        "rubric": inputs.dimension.rubric(),
        "profile": inputs.view,
        "contradiction_report": inputs.contradiction,
        "risk_report": inputs.risk,
        "missing_fields": inputs.missing_fields,
        "extra_evidence": inputs.extra_evidence,
    });
    match agents
        .run_structured::<DimensionReport>(
            Role::Scorer,
            Prompt::DimensionScore,
            &prompt_inputs,
            CallOptions::default().with_fallback(),
        )
        .await
    {
        Ok(report) => {
            tracing::info!(dimension = %inputs.dimension, score = report.score, "dimension scored");
            report
        }
        Err(err) => {
            tracing::warn!(dimension = %inputs.dimension, error = %err, "scoring failed");
            DimensionReport::system_error(err)
        }
    }
}

/// Mean of the non-zero scores; `0.0` when nothing was judged.
pub fn overall_score(reports: &BTreeMap<Dimension, DimensionReport>) -> f64 {
    let judged: Vec<f64> = reports
        .values()
        .filter(|r| r.score > 0)
        .map(|r| f64::from(r.score))
        .collect();
    if judged.is_empty() {
        0.0
    } else {
        let mean = judged.iter().sum::<f64>() / judged.len() as f64;
        (mean * 100.0).round() / 100.0
    }
}

/// Memo assembled from the reports alone.
pub fn fallback_memo(reports: &BTreeMap<Dimension, DimensionReport>) -> Memo {
    let insights = reports
        .iter()
        .map(|(dimension, report)| {
            let line = if report.score == 0 {
                format!("Not scored ({})", report.description)
            } else {
                format!("{}/5: {}", report.score, report.description)
            };
            (*dimension, line)
        })
        .collect();

    let mut judged: Vec<(&Dimension, &DimensionReport)> = reports.iter().filter(|(_, r)| r.score > 0).collect();
    judged.sort_by_key(|(dimension, report)| (report.score, **dimension));
    let executive_summary = match (judged.first(), judged.last()) {
        (Some((weakest, _)), Some((strongest, _))) => format!(
            "Overall {:.1}/5 across {} scored dimensions. Strongest: {}. Weakest: {}.",
            overall_score(reports),
            judged.len(),
            strongest.label(),
            weakest.label()
        ),
        _ => "No dimension could be scored from the data provided.".to_string(),
    };

    let mut action_plan: Vec<String> = judged
        .iter()
        .map(|(dimension, report)| match report.red_flags.first() {
            Some(flag) => format!("{}: address \"{flag}\"", dimension.label()),
            None => format!("{}: raise the score from {}/5", dimension.label(), report.score),
        })
        .take(ACTION_PLAN_LEN)
        .collect();
    pad_action_plan(&mut action_plan, reports);

    Memo {
        executive_summary,
        insights,
        action_plan,
    }
}

fn pad_action_plan(plan: &mut Vec<String>, reports: &BTreeMap<Dimension, DimensionReport>) {
    plan.truncate(ACTION_PLAN_LEN);
    let unscored = reports
        .iter()
        .filter(|(_, r)| r.score == 0)
        .map(|(dimension, _)| format!("{}: supply the missing data so it can be scored", dimension.label()));
    let generic = std::iter::repeat("Re-run the evaluation once the profile is complete".to_string());
    for item in unscored.chain(generic) {
        if plan.len() >= ACTION_PLAN_LEN {
            break;
        }
        if !plan.contains(&item) || item.starts_with("Re-run") {
            plan.push(item);
        }
    }
}

/// Final memo from the writer model; the deterministic memo on failure or
/// when nothing was scored.
#[tracing::instrument(level = "debug", skip_all)]
pub async fn synthesize(agents: &Agents, reports: &BTreeMap<Dimension, DimensionReport>) -> Memo {
    let fallback = fallback_memo(reports);
    if reports.values().all(|r| r.score == 0) {
        return fallback;
    }
    let inputs = json!({ "reports": reports });
    let memo = agents
        .run_structured::<Memo>(
            Role::Writer,
            Prompt::EvaluationSynthesis,
            &inputs,
            CallOptions::default().with_fallback().temperature(SYNTHESIS_TEMPERATURE),
        )
        .await;
    match memo {
        Ok(mut memo) if !memo.executive_summary.is_empty() => {
            for (dimension, line) in &fallback.insights {
                memo.insights.entry(*dimension).or_insert_with(|| line.clone());
            }
            pad_action_plan(&mut memo.action_plan, reports);
            memo
        }
        Ok(_) => {
            tracing::warn!("synthesis returned an empty memo; using the deterministic memo");
            fallback
        }
        Err(err) => {
            tracing::warn!(error = %err, "synthesis failed; using the deterministic memo");
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{agents_with, ScriptedLlm};
    use launchpad_graph::ProviderErrorKind;

    fn reports(scores: &[(Dimension, u8)]) -> BTreeMap<Dimension, DimensionReport> {
        Dimension::ALL
            .into_iter()
            .map(|d| {
                let score = scores.iter().find(|(x, _)| *x == d).map(|(_, s)| *s).unwrap_or(0);
                let report = DimensionReport {
                    score,
                    description: format!("{d} looks ok"),
                    red_flags: if score == 1 { vec!["no revenue".to_string()] } else { Vec::new() },
                    explanation: String::new(),
                };
                (d, report)
            })
            .collect()
    }

    #[test]
    fn overall_ignores_unscored_dimensions() {
        let r = reports(&[(Dimension::Team, 4), (Dimension::Market, 3), (Dimension::Gtm, 2)]);
        assert_eq!(overall_score(&r), 3.0);
        assert_eq!(overall_score(&reports(&[])), 0.0);
    }

    #[test]
    fn fallback_memo_has_three_actions_and_every_insight() {
        let r = reports(&[(Dimension::Team, 4), (Dimension::Business, 1)]);
        let memo = fallback_memo(&r);
        assert_eq!(memo.insights.len(), 9);
        assert_eq!(memo.action_plan.len(), ACTION_PLAN_LEN);
        assert_eq!(memo.action_plan[0], "Business model: address \"no revenue\"");
        assert!(memo.executive_summary.contains("Strongest: Team"));

        let empty = fallback_memo(&reports(&[]));
        assert_eq!(empty.action_plan.len(), ACTION_PLAN_LEN);
        assert!(empty.executive_summary.starts_with("No dimension"));
    }

    #[tokio::test]
    async fn blank_views_skip_the_model() {
        let llm = ScriptedLlm::new();
        let agents = agents_with(llm.clone());
        let report = score_dimension(
            &agents,
            ScoringInputs {
                dimension: Dimension::Team,
                view: &json!({ "founders": [], "company_name": null }),
                contradiction: "None",
                risk: "None",
                missing_fields: &["founders".to_string()],
                extra_evidence: "None",
            },
        )
        .await;
        assert_eq!(report.score, 0);
        assert_eq!(report.description, "insufficient data");
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn scoring_errors_become_the_sentinel() {
        let llm = ScriptedLlm::new().fail("venture scoring model", ProviderErrorKind::BadRequest);
        let report = score_dimension(
            &agents_with(llm),
            ScoringInputs {
                dimension: Dimension::Market,
                view: &json!({ "beachhead_market": "GCC fleets" }),
                contradiction: "None",
                risk: "None",
                missing_fields: &[],
                extra_evidence: "None",
            },
        )
        .await;
        assert_eq!(report.score, 0);
        assert_eq!(report.description, "system error");
        assert_eq!(report.explanation, "");
        assert_eq!(report.red_flags.len(), 1);
    }

    #[tokio::test]
    async fn synthesis_fills_gaps_in_the_model_memo() {
        let llm = ScriptedLlm::new().reply(
            "writes the final investment memo",
            r#"{"executive_summary": "Promising", "insights": {"team": "Experienced"}, "action_plan": ["Sign LOIs"]}"#,
        );
        let r = reports(&[(Dimension::Team, 4)]);
        let memo = synthesize(&agents_with(llm), &r).await;
        assert_eq!(memo.executive_summary, "Promising");
        assert_eq!(memo.insights[&Dimension::Team], "Experienced");
        assert_eq!(memo.insights.len(), 9);
        assert_eq!(memo.action_plan.len(), ACTION_PLAN_LEN);
        assert_eq!(memo.action_plan[0], "Sign LOIs");
    }
}
