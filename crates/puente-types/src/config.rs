//! Global configuration types.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls how the
//! reference runner treats expired approvals and where exports are written.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.puente/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// What happens when an approval step outlives its `timeout_hours`.
///
/// No variant follows the approved branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutDisposition {
    /// Stay suspended and flag the approval as overdue.
    #[default]
    Block,
    /// Follow the rejected branch.
    Reject,
    /// Hand the decision to the escalation role.
    Escalate,
}

impl std::fmt::Display for TimeoutDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutDisposition::Block => write!(f, "block"),
            TimeoutDisposition::Reject => write!(f, "reject"),
            TimeoutDisposition::Escalate => write!(f, "escalate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default)]
    pub timeout_disposition: TimeoutDisposition,
    /// Role that receives escalated approvals.
    #[serde(default = "default_escalation_role")]
    pub escalation_role: String,
}

fn default_escalation_role() -> String {
    "director_catastro".to_string()
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout_disposition: TimeoutDisposition::default(),
            escalation_role: default_escalation_role(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Json,
    Yaml,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub format: ExportFormat,
    /// Output directory, relative to the data directory unless absolute.
    #[serde(default = "default_export_directory")]
    pub directory: String,
}

fn default_export_directory() -> String {
    "workflows".to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::default(),
            directory: default_export_directory(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Upper bound on transitions followed in one advance, guarding against
    /// predicate loops.
    #[serde(default = "default_max_transitions")]
    pub max_transitions: u32,
}

fn default_max_transitions() -> u32 {
    256
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_transitions: default_max_transitions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.approval.timeout_disposition, TimeoutDisposition::Block);
        assert_eq!(config.approval.escalation_role, "director_catastro");
        assert_eq!(config.export.format, ExportFormat::Json);
        assert_eq!(config.export.directory, "workflows");
        assert_eq!(config.runner.max_transitions, 256);
    }

    #[test]
    fn test_global_config_deserialize_with_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config, GlobalConfig::default());
    }

    #[test]
    fn test_global_config_deserialize_with_values() {
        let toml_str = r#"
[approval]
timeout_disposition = "escalate"
escalation_role = "jefe_valuacion"

[export]
format = "yaml"
directory = "/srv/puente/export"

[runner]
max_transitions = 64
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.approval.timeout_disposition, TimeoutDisposition::Escalate);
        assert_eq!(config.approval.escalation_role, "jefe_valuacion");
        assert_eq!(config.export.format, ExportFormat::Yaml);
        assert_eq!(config.export.format.extension(), "yaml");
        assert_eq!(config.export.directory, "/srv/puente/export");
        assert_eq!(config.runner.max_transitions, 64);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: GlobalConfig = toml::from_str("[approval]\ntimeout_disposition = \"reject\"\n").unwrap();
        assert_eq!(config.approval.timeout_disposition, TimeoutDisposition::Reject);
        assert_eq!(config.approval.escalation_role, "director_catastro");
    }

    #[test]
    fn test_unknown_disposition_rejected() {
        let result: Result<GlobalConfig, _> = toml::from_str("[approval]\ntimeout_disposition = \"approve\"\n");
        assert!(result.is_err());
    }
}
