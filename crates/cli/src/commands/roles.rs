use budgetflow_core::approvals::options::{role_config, FormOption};
use budgetflow_core::domain::role::{Role, ROLE_ORDER};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct RoleForm {
    role: Role,
    files: &'static str,
    reasons: Vec<FormOption>,
    recommendations: Vec<FormOption>,
}

pub fn run(role: Option<Role>, json: bool) -> CommandResult {
    let roles: Vec<Role> = match role {
        Some(role) => vec![role],
        None => ROLE_ORDER.to_vec(),
    };
    let forms: Vec<RoleForm> = roles.into_iter().map(form_for).collect();

    if json {
        return CommandResult::json("roles", &forms);
    }

    let mut lines = Vec::new();
    for form in &forms {
        lines.push(format!("{} ({})", form.role, form.files));
        if !form.reasons.is_empty() {
            lines.push("  reasons:".to_string());
            lines.extend(form.reasons.iter().map(|option| format!("    - {}", option.label)));
        }
        lines.push("  options:".to_string());
        lines.extend(
            form.recommendations
                .iter()
                .map(|option| format!("    - {:<22} {}", option.value, option.label)),
        );
    }
    CommandResult::report(lines.join("\n"))
}

fn form_for(role: Role) -> RoleForm {
    let config = role_config(role);
    RoleForm {
        role,
        files: if role.is_creator() { "recommendation" } else { "review" },
        reasons: config.reason_options(),
        recommendations: config.recommendation_options(),
    }
}
