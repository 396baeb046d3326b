use std::path::Path;
use std::str::FromStr;

use budgetflow_client::BcrApiClient;
use budgetflow_core::approvals::options::{ReasonOption, RecommendationOption};
use budgetflow_core::approvals::{ItemQuantity, Submission, SubmissionDraft};
use budgetflow_core::config::ConfigOverrides;
use budgetflow_core::domain::record::BcrId;
use budgetflow_core::flows::FlowResolver;
use budgetflow_core::source::FlowLoader;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::commands::{load_config, runtime, CommandResult};

pub struct SubmitArgs {
    pub bcr_id: u64,
    pub role: String,
    pub draft: SubmissionDraft,
}

pub fn run(args: SubmitArgs, config_path: Option<&Path>) -> CommandResult {
    let config = match load_config("submit", config_path, ConfigOverrides::default()) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let client = match BcrApiClient::from_config(&config.api) {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure("submit", "config_validation", error.to_string(), 2)
        }
    };
    let runtime = match runtime("submit") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let bcr_id = BcrId(args.bcr_id);
    let loader = FlowLoader::new(client, FlowResolver::new(config.flow.rejection_policy));
    let result = runtime.block_on(loader.submit(bcr_id, Some(&args.role), args.draft));

    match result {
        Ok(Submission::Recommendation(payload)) => CommandResult::success(
            "submit",
            format!("filed {} recommendation for BCR {bcr_id}", payload.recommendation_type),
        ),
        Ok(Submission::Review(payload)) => CommandResult::success(
            "submit",
            format!("filed {} review for BCR {bcr_id}", payload.review_type),
        ),
        Err(error) => CommandResult::from_application_error("submit", error, format!("bcr-{bcr_id}")),
    }
}

/// Accepts wire values such as `Approve_QS`.
pub fn parse_option(raw: &str) -> Result<RecommendationOption, String> {
    parse_wire(raw).map_err(|_| format!("unknown recommendation option `{raw}`"))
}

/// Accepts a reason's full label.
pub fn parse_reason(raw: &str) -> Result<ReasonOption, String> {
    parse_wire(raw).map_err(|_| format!("unknown reason `{raw}`"))
}

/// Parses `ITEM_ID=QTY`.
pub fn parse_item(raw: &str) -> Result<ItemQuantity, String> {
    let (id, quantity) =
        raw.split_once('=').ok_or_else(|| format!("expected ITEM_ID=QTY, got `{raw}`"))?;
    let budget_change_item_id =
        id.trim().parse::<u64>().map_err(|error| format!("invalid item id `{id}`: {error}"))?;
    let quantity = Decimal::from_str(quantity.trim())
        .map_err(|error| format!("invalid quantity `{quantity}`: {error}"))?;
    Ok(ItemQuantity { budget_change_item_id, quantity })
}

fn parse_wire<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::String(raw.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{parse_item, parse_option, parse_reason};
    use budgetflow_core::approvals::options::{ReasonOption, RecommendationOption};

    #[test]
    fn parses_wire_values_and_labels() {
        assert_eq!(parse_option("Approve_QS"), Ok(RecommendationOption::ApproveQs));
        assert!(parse_option("approve_qs").is_err());
        assert_eq!(parse_reason("Inaccurate budget"), Ok(ReasonOption::InaccurateBudget));
    }

    #[test]
    fn parses_item_quantities() {
        let item = parse_item("42=12.5").expect("item parses");
        assert_eq!(item.budget_change_item_id, 42);
        assert_eq!(item.quantity, Decimal::new(125, 1));
        assert!(parse_item("42").is_err());
        assert!(parse_item("x=1").is_err());
    }
}
