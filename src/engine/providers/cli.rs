// Daimon Engine — Command-line backend
//
// Runs an external program per call (typically a coding-agent CLI). The
// prompt goes to stdin; stdout is either a JSON object
//   {"result": "...", "session_id": "..."}
// or plain text. Such backends keep their own conversation, so a returned
// `session_id` becomes the thread's session handle and is passed back as
// `--resume <id>` on the next call.

use crate::atoms::error::ProviderError;
use crate::atoms::traits::AiProvider;
use crate::atoms::types::{GenerateRequest, Generation, ProviderConfig, ProviderKind};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Deserialize)]
struct CliOutput {
    #[serde(default)]
    result: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    is_error: bool,
}

pub struct CliProvider {
    name: String,
    program: String,
    args: Vec<String>,
    default_model: Option<String>,
}

impl CliProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let mut command = config.command.iter().cloned();
        CliProvider {
            name: config.id.clone(),
            program: command.next().unwrap_or_default(),
            args: command.collect(),
            default_model: config.default_model.clone(),
        }
    }

    fn build_args(&self, request: &GenerateRequest) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(model) = request.model.as_ref().or(self.default_model.as_ref()) {
            args.push("--model".into());
            args.push(model.clone());
        }
        if let Some(session) = &request.resume_session {
            args.push("--resume".into());
            args.push(session.clone());
        }
        args
    }

    fn parse_output(&self, stdout: &str) -> Result<Generation, ProviderError> {
        let trimmed = stdout.trim();
        if trimmed.starts_with('{') {
            match serde_json::from_str::<CliOutput>(trimmed) {
                Ok(out) if out.is_error => return Err(ProviderError::Api { status: 0, message: out.result }),
                Ok(out) => {
                    return Ok(Generation {
                        text: out.result,
                        session_handle: out.session_id.filter(|s| !s.is_empty()),
                        provider: self.name.clone(),
                    })
                }
                Err(e) => debug!("[provider] {} stdout is not JSON ({}), using as text", self.name, e),
            }
        }
        Ok(Generation { text: trimmed.to_string(), session_handle: None, provider: self.name.clone() })
    }
}

#[async_trait]
impl AiProvider for CliProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cli
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        if self.program.is_empty() {
            return Err(ProviderError::Unavailable(format!("{}: no command configured", self.name)));
        }
        let args = self.build_args(request);
        info!(
            "[provider] {} running {} (resume={})",
            self.name,
            self.program,
            request.resume_session.is_some()
        );

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProviderError::Unavailable(format!("{}: spawn {}: {}", self.name, self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.prompt.as_bytes())
                .await
                .map_err(|e| ProviderError::Transport(format!("{}: stdin: {}", self.name, e)))?;
            // Dropping closes the pipe so the child sees EOF.
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ProviderError::Transport(format!("{}: wait: {}", self.name, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message: String = stderr.trim().chars().take(200).collect();
            warn!("[provider] {} exited with {}: {}", self.name, output.status, message);
            return Err(ProviderError::Api { status: output.status.code().unwrap_or(0) as u16, message });
        }

        self.parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}
