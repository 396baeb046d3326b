pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use budgetflow_core::approvals::options::{ReasonOption, RecommendationOption};
use budgetflow_core::approvals::{ItemQuantity, SubmissionDraft};
use budgetflow_core::domain::role::Role;
use budgetflow_core::flows::RejectionPolicy;
use clap::{Parser, Subcommand};

use crate::commands::edit::EditArgs;
use crate::commands::submit::{parse_item, parse_option, parse_reason, SubmitArgs};

#[derive(Debug, Parser)]
#[command(
    name = "budgetflow",
    about = "Budget change request approval flow CLI",
    long_about = "Resolve budget change request approval flows offline or against the budget service, \
                  inspect role form options, and file recommendations or reviews.",
    after_help = "Examples:\n  budgetflow resolve --input bcr-42.json --json\n  budgetflow flow 42 --role PD\n  budgetflow submit 42 --role CM --option Approve\n  budgetflow edit 42 --role SITE --option Keep_Original --reason \"Inaccurate budget\" --remark \"recounted\"\n  budgetflow roles SITE"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (defaults to budgetflow.toml or config/budgetflow.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Resolve an exported recommendations/reviews document without the network")]
    Resolve {
        #[arg(long, help = "JSON file with `recommendations` and `reviews` arrays")]
        input: PathBuf,
        #[arg(long, help = "What a rejection does to later roles: continue|halt")]
        policy: Option<RejectionPolicy>,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Load a request's flow and discussion from the budget service")]
    Flow {
        bcr_id: u64,
        #[arg(long, help = "Project role code to check acting capability for (exact, e.g. PD)")]
        role: Option<String>,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "File a recommendation or review for the role that holds the pending step")]
    Submit {
        bcr_id: u64,
        #[arg(long, help = "Project role code filing the submission (exact, e.g. SITE)")]
        role: String,
        #[arg(long, value_parser = parse_option, help = "Option wire value, e.g. Approve_QS")]
        option: RecommendationOption,
        #[arg(long, value_parser = parse_reason, help = "Reason label (QS and SITE only)")]
        reason: Option<ReasonOption>,
        #[arg(long)]
        remark: Option<String>,
        #[arg(long = "item", value_parser = parse_item, help = "ITEM_ID=QTY, repeatable")]
        items: Vec<ItemQuantity>,
    },
    #[command(about = "Rewrite the recommendation the role filed earlier; a remark is required")]
    Edit {
        bcr_id: u64,
        #[arg(long, help = "Project role code that filed the recommendation (QS or SITE)")]
        role: String,
        #[arg(long, value_parser = parse_option, help = "Option wire value, e.g. Specific_Quantity")]
        option: RecommendationOption,
        #[arg(long, value_parser = parse_reason, help = "Reason label")]
        reason: Option<ReasonOption>,
        #[arg(long)]
        remark: String,
        #[arg(long = "item", value_parser = parse_item, help = "ITEM_ID=QTY, repeatable")]
        items: Vec<ItemQuantity>,
    },
    #[command(about = "Show the reasons and options each role's form offers")]
    Roles {
        role: Option<Role>,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Command::Resolve { input, policy, json } => {
            commands::resolve::run(&input, policy, json, config_path)
        }
        Command::Flow { bcr_id, role, json } => {
            commands::flow::run(bcr_id, role.as_deref(), json, config_path)
        }
        Command::Submit { bcr_id, role, option, reason, remark, items } => commands::submit::run(
            SubmitArgs { bcr_id, role, draft: SubmissionDraft { option, reason, remark, items } },
            config_path,
        ),
        Command::Edit { bcr_id, role, option, reason, remark, items } => commands::edit::run(
            EditArgs {
                bcr_id,
                role,
                draft: SubmissionDraft { option, reason, remark: Some(remark), items },
            },
            config_path,
        ),
        Command::Roles { role, json } => commands::roles::run(role, json),
        Command::Config => commands::config::run(config_path),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
