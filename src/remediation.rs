use crate::timeline::Timeline;
use crate::event::UNKNOWN_SERVICE;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemediationError {
    #[error("service name cannot be empty")]
    EmptyService,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationRequest {
    pub service_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl RemediationRequest {
    pub fn new(service_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { service_name: service_name.into(), namespace: namespace.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum RemediationTool {
    Rollback,
    Restart,
    Scale { replicas: u32 },
}

/// A generated command. Nothing here is ever executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationCommand {
    pub tool: String,
    pub command: String,
    pub service: String,
    pub namespace: String,
    pub description: String,
}

/// Keep only ASCII alphanumerics and `-`.
pub fn sanitize(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '-').collect()
}

impl RemediationTool {
    pub fn name(&self) -> &'static str {
        match self {
            RemediationTool::Rollback => "rollback",
            RemediationTool::Restart => "restart",
            RemediationTool::Scale { .. } => "scale",
        }
    }

    pub fn command(&self, req: &RemediationRequest) -> Result<RemediationCommand, RemediationError> {
        let service = sanitize(&req.service_name);
        if service.is_empty() {
            return Err(RemediationError::EmptyService);
        }
        let mut namespace = sanitize(&req.namespace);
        if namespace.is_empty() {
            namespace = DEFAULT_NAMESPACE.to_string();
        }
        let (command, description) = match self {
            RemediationTool::Rollback => (
                format!("kubectl rollout undo deployment/{service} -n {namespace}"),
                format!("Roll back the latest deployment of {service}"),
            ),
            RemediationTool::Restart => (
                format!("kubectl rollout restart deployment/{service} -n {namespace}"),
                format!("Restart {service} to release exhausted resources"),
            ),
            RemediationTool::Scale { replicas } => (
                format!("kubectl scale deployment/{service} --replicas={replicas} -n {namespace}"),
                format!("Scale {service} to {replicas} replicas"),
            ),
        };
        tracing::info!(tool = self.name(), %service, %namespace, "generated remediation command");
        Ok(RemediationCommand { tool: self.name().to_string(), command, service, namespace, description })
    }
}

/// Resource exhaustion calls for a restart; anything else is treated as a
/// bad deployment or configuration change and rolled back.
pub fn choose_tool(analysis_text: &str) -> RemediationTool {
    let lower = analysis_text.to_lowercase();
    if lower.contains("exhausted") || lower.contains("pool") {
        RemediationTool::Restart
    } else {
        RemediationTool::Rollback
    }
}

/// Pick the service a remediation should target: the first timeline service
/// named in the analysis text (services ranked by error count, then overall
/// count), else the top-ranked service.
pub fn pick_service(analysis_text: &str, timeline: &Timeline) -> Option<String> {
    let lower = analysis_text.to_lowercase();
    let ranked: Vec<&str> = timeline
        .iter()
        .filter(|e| e.service != UNKNOWN_SERVICE)
        .map(|e| (e.service.as_str(), e.level.is_error()))
        .fold(std::collections::HashMap::<&str, (usize, usize)>::new(), |mut acc, (svc, is_err)| {
            let slot = acc.entry(svc).or_default();
            slot.0 += usize::from(is_err);
            slot.1 += 1;
            acc
        })
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)))
        .map(|(svc, _)| svc)
        .collect();
    ranked
        .iter()
        .find(|svc| lower.contains(&svc.to_lowercase()))
        .or_else(|| ranked.first())
        .map(|svc| svc.to_string())
}

/// Choose a tool and target from the analysis text and build the command.
pub fn suggest(analysis_text: &str, timeline: &Timeline, namespace: &str) -> Option<RemediationCommand> {
    let service = pick_service(analysis_text, timeline)?;
    let req = RemediationRequest::new(service, namespace);
    choose_tool(analysis_text).command(&req).ok()
}
