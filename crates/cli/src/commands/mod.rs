pub mod config;
pub mod edit;
pub mod flow;
pub mod resolve;
pub mod roles;
pub mod submit;

use std::path::Path;

use budgetflow_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat, LoggingConfig};
use budgetflow_core::errors::{ApplicationError, InterfaceError};
use budgetflow_core::flows::{ApprovalFlow, FlowOutcome};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(&payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(&payload) }
    }

    /// Plain-text report printed as-is.
    pub fn report(output: String) -> Self {
        Self { exit_code: 0, output }
    }

    pub fn json<T: Serialize>(command: &str, report: &T) -> Self {
        match serde_json::to_string(report) {
            Ok(output) => Self { exit_code: 0, output },
            Err(error) => Self::failure(command, "serialization", error.to_string(), 3),
        }
    }

    pub fn from_application_error(
        command: &str,
        error: ApplicationError,
        correlation_id: impl Into<String>,
    ) -> Self {
        let (error_class, exit_code) = match &error {
            ApplicationError::Domain(_) => ("domain", 6),
            ApplicationError::Integration(_) | ApplicationError::Superseded { .. } => {
                ("integration", 5)
            }
            ApplicationError::Configuration(_) => ("config_validation", 2),
        };
        let detail = error.to_string();
        let interface: InterfaceError = error.into_interface(correlation_id);
        warn!(
            event_name = "cli.command.failed",
            command,
            error_class,
            exit_code,
            correlation_id = interface.correlation_id(),
            error = %detail,
            "command failed"
        );

        Self::failure(
            command,
            error_class,
            format!(
                "{} {detail} (correlation id: {})",
                interface.user_message(),
                interface.correlation_id()
            ),
            exit_code,
        )
    }
}

fn serialize_payload(payload: &CommandOutcome) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub fn load_config(
    command: &str,
    config_path: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<AppConfig, CommandResult> {
    let options = LoadOptions {
        config_path: config_path.map(Path::to_path_buf),
        require_file: config_path.is_some(),
        overrides,
    };

    let config = AppConfig::load(options).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })?;
    init_logging(&config.logging);
    debug!(
        event_name = "cli.command.started",
        command,
        config_file = ?config_path,
        rejection_policy = ?config.flow.rejection_policy,
        "configuration loaded"
    );
    Ok(config)
}

/// Logs go to stderr so stdout stays parseable.
pub fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed when commands run in-process.
    let _ = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

pub fn describe_outcome(flow: &ApprovalFlow) -> String {
    match flow.outcome() {
        FlowOutcome::InProgress { pending } => format!("in progress (pending: {pending})"),
        FlowOutcome::Approved => "approved".to_string(),
        FlowOutcome::Rejected { by } => format!("rejected (by {by})"),
    }
}

pub fn render_flow_lines(flow: &ApprovalFlow) -> Vec<String> {
    let mut lines: Vec<String> = flow
        .steps
        .iter()
        .map(|step| format!("  {:<5} {}", step.role.as_str(), step.status))
        .collect();
    for record in &flow.unmatched {
        lines.push(format!(
            "  ignored {:?} #{} with unknown role `{}`",
            record.source, record.record_id, record.raw_role
        ));
    }
    lines.push(format!("outcome: {}", describe_outcome(flow)));
    lines
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    use budgetflow_core::errors::{ApplicationError, DomainError};

    use super::CommandResult;

    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn captured_logs(run: impl FnOnce() -> CommandResult) -> (CommandResult, String) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::clone(&buffer);
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || Captured(Arc::clone(&writer)))
            .finish();

        let result = tracing::subscriber::with_default(subscriber, run);
        let logs = String::from_utf8(buffer.lock().expect("log buffer").clone()).expect("utf8 logs");
        (result, logs)
    }

    #[test]
    fn failures_are_logged_with_class_and_correlation_id() {
        let (result, logs) = captured_logs(|| {
            CommandResult::from_application_error(
                "edit",
                ApplicationError::Integration("PUT recommendations returned 502".to_string()),
                "bcr-9",
            )
        });

        assert_eq!(result.exit_code, 5);
        assert!(logs.contains("command failed"), "{logs}");
        assert!(logs.contains("cli.command.failed"), "{logs}");
        assert!(logs.contains("bcr-9"), "{logs}");
    }

    #[test]
    fn domain_failures_exit_with_domain_code() {
        let (result, logs) = captured_logs(|| {
            CommandResult::from_application_error(
                "submit",
                ApplicationError::from(DomainError::ActingDenied("step `SITE` is waiting".to_string())),
                "bcr-5",
            )
        });

        assert_eq!(result.exit_code, 6);
        assert!(result.output.contains("\"error_class\":\"domain\""));
        assert!(logs.contains("error_class=\"domain\"") || logs.contains("error_class=domain"), "{logs}");
    }
}
