use std::fs;
use std::path::Path;

use anyhow::Context;
use budgetflow_core::config::ConfigOverrides;
use budgetflow_core::domain::record::{RecommendationRecord, ReviewRecord};
use budgetflow_core::flows::{ApprovalFlow, FlowOutcome, FlowResolver, RejectionPolicy};
use serde::{Deserialize, Serialize};

use crate::commands::{load_config, render_flow_lines, CommandResult};

/// Records exported from the backend for one request.
#[derive(Debug, Default, Deserialize)]
pub struct ResolveInput {
    #[serde(default)]
    pub recommendations: Vec<RecommendationRecord>,
    #[serde(default)]
    pub reviews: Vec<ReviewRecord>,
}

#[derive(Debug, Serialize)]
struct ResolveReport<'a> {
    command: &'static str,
    status: &'static str,
    policy: RejectionPolicy,
    outcome: FlowOutcome,
    #[serde(flatten)]
    flow: &'a ApprovalFlow,
}

pub fn run(
    input: &Path,
    policy: Option<RejectionPolicy>,
    json: bool,
    config_path: Option<&Path>,
) -> CommandResult {
    let overrides = ConfigOverrides { rejection_policy: policy, ..ConfigOverrides::default() };
    let config = match load_config("resolve", config_path, overrides) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let records = match read_input(input) {
        Ok(records) => records,
        Err(error) => return CommandResult::failure("resolve", "input", format!("{error:#}"), 4),
    };

    let policy = config.flow.rejection_policy;
    let flow = FlowResolver::new(policy).resolve(&records.recommendations, &records.reviews);

    if json {
        return CommandResult::json(
            "resolve",
            &ResolveReport {
                command: "resolve",
                status: "ok",
                policy,
                outcome: flow.outcome(),
                flow: &flow,
            },
        );
    }

    let mut lines = vec![format!("approval flow ({} records, policy: {policy:?})", record_count(&records))];
    lines.extend(render_flow_lines(&flow));
    CommandResult::report(lines.join("\n"))
}

pub fn read_input(path: &Path) -> anyhow::Result<ResolveInput> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read input file `{}`", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("input file `{}` is not a recommendations/reviews document", path.display()))
}

fn record_count(records: &ResolveInput) -> usize {
    records.recommendations.len() + records.reviews.len()
}
