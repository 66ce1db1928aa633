use serde::Deserialize;

use lintel_types::{AnalyzerKind, Diagnostic, Severity};

use super::{Analyzer, AnalyzerError, AnalyzerSettings, json_entries, tool_path};

/// Script linter speaking tslint's JSON formatter. Positions are already
/// 0-based and pass through unchanged.
#[derive(Debug, Clone)]
pub struct ScriptAnalyzer {
    settings: AnalyzerSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Finding {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    failure: String,
    #[serde(default)]
    start_position: Position,
    #[serde(default)]
    rule_name: Option<String>,
    #[serde(default)]
    rule_severity: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Position {
    #[serde(default)]
    line: u32,
    #[serde(default)]
    character: u32,
}

impl ScriptAnalyzer {
    #[must_use]
    pub fn new(settings: AnalyzerSettings) -> Self {
        Self { settings }
    }
}

impl Default for ScriptAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerSettings::for_kind(AnalyzerKind::Script))
    }
}

impl Analyzer for ScriptAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Script
    }

    fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    fn parse(&self, output: &str) -> Result<Vec<Diagnostic>, AnalyzerError> {
        let mut diagnostics = Vec::new();
        for entry in json_entries(self.name(), output)? {
            let finding: Finding = match serde_json::from_value(entry) {
                Ok(f) => f,
                Err(e) => {
                    tracing::debug!(analyzer = self.name(), "Skipping malformed finding: {e}");
                    continue;
                }
            };
            let Some(document) = finding.name.as_deref().and_then(tool_path) else {
                tracing::debug!(analyzer = self.name(), "Skipping finding without file name");
                continue;
            };

            let severity = finding
                .rule_severity
                .as_deref()
                .map_or(Severity::Warning, Severity::from_label);
            let diagnostic = Diagnostic::new(
                AnalyzerKind::Script,
                document,
                finding.start_position.line,
                finding.start_position.character,
                finding.failure,
            )
            .with_severity(severity)
            .with_rule_id(finding.rule_name);

            if self.settings.keeps(&diagnostic) {
                diagnostics.push(diagnostic);
            }
        }
        Ok(diagnostics)
    }
}
