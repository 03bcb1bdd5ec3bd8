//! Agent backed by an external command (e.g. a puppet kick)

use async_trait::async_trait;
use hmc_config::AgentConfig;
use hmc_errors::{DispatchError, Error};
use hmc_types::HostAction;
use std::process::Stdio;
use tokio::process::Command;

use crate::agent::{Agent, AgentReport};

const PLACEHOLDERS: [&str; 3] = ["host", "action", "roles"];

/// Longest stderr excerpt kept as error detail
const MAX_DETAIL_LEN: usize = 512;

/// Runs a configured program once per action.
///
/// Every argument may contain `{host}`, `{action}` and `{roles}`
/// placeholders; `{roles}` expands to the comma-separated role list.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    program: String,
    args: Vec<String>,
    success_exit_codes: Vec<i32>,
}

impl CommandAgent {
    /// Create an agent, validating the argument template
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemplate` for an empty program, an unknown
    /// placeholder or an unbalanced brace.
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        success_exit_codes: Vec<i32>,
    ) -> Result<Self, Error> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(DispatchError::InvalidTemplate {
                message: "agent program is empty".to_string(),
            }
            .into());
        }
        for arg in &args {
            validate_template(arg)?;
        }
        Ok(Self {
            program,
            args,
            success_exit_codes,
        })
    }

    /// Create an agent from the `[agent]` configuration section
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemplate` if the configured arguments are malformed.
    pub fn from_config(config: &AgentConfig) -> Result<Self, Error> {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.success_exit_codes.clone(),
        )
    }

    /// Arguments with placeholders substituted for one call
    #[must_use]
    pub fn render_args(&self, host: &str, action: &HostAction) -> Vec<String> {
        let roles = action.roles.join(",");
        self.args
            .iter()
            .map(|arg| {
                render(arg, |name| match name {
                    "host" => host,
                    "action" => action.kind.as_str(),
                    _ => roles.as_str(),
                })
            })
            .collect()
    }
}

/// Substitute placeholders in one pass; substituted text is never rescanned.
///
/// The template has already been checked by `validate_template`.
fn render<'a>(template: &str, value: impl Fn(&str) -> &'a str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str(value(&rest[open + 1..open + close]));
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

#[async_trait]
impl Agent for CommandAgent {
    async fn invoke(&self, host: &str, action: &HostAction) -> Result<AgentReport, Error> {
        let args = self.render_args(host, action);

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A dispatcher timeout drops this future; take the child with it
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DispatchError::SpawnFailed {
                command: self.program.clone(),
                message: e.to_string(),
            })?;

        match output.status.code() {
            Some(code) if self.success_exit_codes.contains(&code) => Ok(AgentReport::success()),
            Some(code) => Ok(AgentReport::failure(failure_detail(
                &format!("agent exited with code {code}"),
                &output.stderr,
            ))),
            None => Ok(AgentReport::failure(failure_detail(
                "agent terminated by signal",
                &output.stderr,
            ))),
        }
    }
}

fn failure_detail(summary: &str, stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        return summary.to_string();
    }

    // Keep the tail; agents print the actual failure last
    let start = stderr
        .char_indices()
        .rev()
        .nth(MAX_DETAIL_LEN - 1)
        .map_or(0, |(i, _)| i);
    format!("{summary}: {}", &stderr[start..])
}

fn validate_template(arg: &str) -> Result<(), Error> {
    let invalid = |message: String| -> Error { DispatchError::InvalidTemplate { message }.into() };

    let mut rest = arg;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| invalid(format!("unclosed '{{' in '{arg}'")))?;
        let name = &after[..close];
        if !PLACEHOLDERS.contains(&name) {
            return Err(invalid(format!("unknown placeholder '{{{name}}}' in '{arg}'")));
        }
        rest = &after[close + 1..];
    }
    if rest.contains('}') {
        return Err(invalid(format!("unmatched '}}' in '{arg}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmc_types::ActionKind;

    #[test]
    fn placeholders_are_substituted() {
        let agent = CommandAgent::new(
            "puppet",
            vec![
                "kick".into(),
                "--host={host}".into(),
                "--tag".into(),
                "{action}:{roles}".into(),
            ],
            vec![0],
        )
        .unwrap();

        let action = HostAction::new(
            ActionKind::PurgeData,
            vec!["NAMENODE".into(), "DATANODE".into()],
        );
        assert_eq!(
            agent.render_args("n1.example.com", &action),
            vec![
                "kick",
                "--host=n1.example.com",
                "--tag",
                "purge_data:NAMENODE,DATANODE"
            ]
        );
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let agent = CommandAgent::new("puppet", vec!["{host}/{roles}".into()], vec![0]).unwrap();
        let action = HostAction::new(ActionKind::Uninstall, vec!["{host}".into()]);
        assert_eq!(
            agent.render_args("n{action}1", &action),
            vec!["n{action}1/{host}"]
        );
    }

    #[test]
    fn malformed_templates_are_rejected() {
        for bad in ["{hostname}", "{host", "host}", "{}"] {
            assert!(
                CommandAgent::new("puppet", vec![bad.to_string()], vec![0]).is_err(),
                "accepted {bad}"
            );
        }
        assert!(CommandAgent::new(" ", vec![], vec![0]).is_err());
    }

    #[test]
    fn failure_detail_keeps_stderr_tail() {
        let long = "x".repeat(2000) + "the real error";
        let detail = failure_detail("agent exited with code 1", long.as_bytes());
        assert!(detail.starts_with("agent exited with code 1: "));
        assert!(detail.ends_with("the real error"));
        assert!(detail.len() < 600);
    }
}
