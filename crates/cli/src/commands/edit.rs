use std::path::Path;

use budgetflow_client::BcrApiClient;
use budgetflow_core::approvals::SubmissionDraft;
use budgetflow_core::config::ConfigOverrides;
use budgetflow_core::domain::record::BcrId;
use budgetflow_core::flows::FlowResolver;
use budgetflow_core::source::FlowLoader;

use crate::commands::{load_config, runtime, CommandResult};

pub struct EditArgs {
    pub bcr_id: u64,
    pub role: String,
    pub draft: SubmissionDraft,
}

pub fn run(args: EditArgs, config_path: Option<&Path>) -> CommandResult {
    let config = match load_config("edit", config_path, ConfigOverrides::default()) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let client = match BcrApiClient::from_config(&config.api) {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure("edit", "config_validation", error.to_string(), 2)
        }
    };
    let runtime = match runtime("edit") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let bcr_id = BcrId(args.bcr_id);
    let loader = FlowLoader::new(client, FlowResolver::new(config.flow.rejection_policy));

    match runtime.block_on(loader.edit(bcr_id, Some(&args.role), args.draft)) {
        Ok(edit) => CommandResult::success(
            "edit",
            format!(
                "updated recommendation {} to {} for BCR {bcr_id}",
                edit.recommendation_id, edit.payload.recommendation_type
            ),
        ),
        Err(error) => CommandResult::from_application_error("edit", error, format!("bcr-{bcr_id}")),
    }
}
