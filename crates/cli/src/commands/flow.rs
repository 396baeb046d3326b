use std::path::Path;

use budgetflow_client::BcrApiClient;
use budgetflow_core::approvals::options::{role_config_for, FormOption};
use budgetflow_core::approvals::{ActingCapability, ActingGate};
use budgetflow_core::config::ConfigOverrides;
use budgetflow_core::discussion::TimelineEntry;
use budgetflow_core::domain::record::BcrId;
use budgetflow_core::errors::ApplicationError;
use budgetflow_core::flows::{FlowOutcome, FlowResolver};
use budgetflow_core::source::{FlowLoader, LoadedFlow};
use serde::Serialize;

use crate::commands::{describe_outcome, load_config, runtime, CommandResult};

#[derive(Debug, Serialize)]
struct FlowReport {
    command: &'static str,
    status: &'static str,
    bcr_id: BcrId,
    correlation_id: String,
    outcome: FlowOutcome,
    pre_steps_completed: bool,
    final_step_completed: bool,
    entries: Vec<TimelineEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    acting: Option<ActingReport>,
}

#[derive(Debug, Serialize)]
struct ActingReport {
    role: String,
    capability: ActingCapability,
    may_act: bool,
    reasons: Vec<FormOption>,
    options: Vec<FormOption>,
}

impl ActingReport {
    fn new(role: &str, capability: ActingCapability, may_act: bool) -> Self {
        let form = role_config_for(role);
        Self {
            role: role.to_string(),
            capability,
            may_act,
            reasons: form.reason_options(),
            options: form.recommendation_options(),
        }
    }
}

pub fn run(bcr_id: u64, role: Option<&str>, json: bool, config_path: Option<&Path>) -> CommandResult {
    let config = match load_config("flow", config_path, ConfigOverrides::default()) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let client = match BcrApiClient::from_config(&config.api) {
        Ok(client) => client,
        Err(error) => return CommandResult::failure("flow", "config_validation", error.to_string(), 2),
    };
    let runtime = match runtime("flow") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let bcr_id = BcrId(bcr_id);
    let loader = FlowLoader::new(client, FlowResolver::new(config.flow.rejection_policy));
    let result = runtime.block_on(async {
        let loaded = loader.load(bcr_id).await?;
        let acting = match role {
            Some(role) => Some(ActingReport::new(
                role,
                loader.acting_capability(bcr_id, Some(role)).await?,
                ActingGate::check(Some(role), &loaded.flow).is_ok(),
            )),
            None => None,
        };
        Ok::<_, ApplicationError>((loaded, acting))
    });

    let (loaded, acting) = match result {
        Ok(value) => value,
        Err(error) => {
            return CommandResult::from_application_error("flow", error, format!("bcr-{bcr_id}"));
        }
    };

    if json {
        return CommandResult::json("flow", &report(&loaded, acting));
    }

    CommandResult::report(render_text(&loaded, acting.as_ref()))
}

fn report(loaded: &LoadedFlow, acting: Option<ActingReport>) -> FlowReport {
    FlowReport {
        command: "flow",
        status: "ok",
        bcr_id: loaded.bcr_id,
        correlation_id: loaded.correlation_id.clone(),
        outcome: loaded.flow.outcome(),
        pre_steps_completed: loaded.discussion.pre_steps_completed(),
        final_step_completed: loaded.discussion.final_step_completed(),
        entries: loaded.view().entries(),
        acting,
    }
}

fn render_text(loaded: &LoadedFlow, acting: Option<&ActingReport>) -> String {
    let mut lines = vec![format!("BCR {} approval flow", loaded.bcr_id)];
    for entry in loaded.view().entries() {
        let by = if entry.item.name.is_empty() { String::new() } else { format!(" by {}", entry.item.name) };
        let at = match entry.item.timestamp() {
            Some(at) => format!(" at {}", at.format("%Y-%m-%d %H:%M UTC")),
            None if entry.item.datetime.is_empty() => String::new(),
            None => format!(" at {}", entry.item.datetime),
        };
        lines.push(format!("  {:<5} {:<18}{by}{at}", entry.step.role.as_str(), entry.badge.label));
        if let Some(remark) = entry.item.remark.as_deref().filter(|remark| !remark.is_empty()) {
            lines.push(format!("        remark: {remark}"));
        }
    }
    lines.push(format!("outcome: {}", describe_outcome(&loaded.flow)));

    if let Some(acting) = acting {
        let turn = if acting.may_act { "it is this role's turn" } else { "not this role's turn" };
        lines.push(format!("role {}: {:?}, {turn}", acting.role, acting.capability));
        if acting.may_act {
            let values: Vec<&str> = acting.options.iter().map(|option| option.value).collect();
            lines.push(format!("  options: {}", values.join(", ")));
        }
    }
    lines.join("\n")
}
