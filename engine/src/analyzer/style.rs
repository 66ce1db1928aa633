use serde::Deserialize;

use lintel_types::{AnalyzerKind, Diagnostic, Severity};

use super::{Analyzer, AnalyzerError, AnalyzerSettings, json_entries, tool_path};

/// Stylesheet linter speaking stylelint's JSON formatter.
///
/// ```json
/// [{ "source": "a/b.scss",
///    "warnings": [{ "line": 10, "column": 4, "text": "...", "rule": "...", "severity": "error" }] }]
/// ```
///
/// Positions in the report are 1-based.
#[derive(Debug, Clone)]
pub struct StyleAnalyzer {
    settings: AnalyzerSettings,
}

#[derive(Debug, Deserialize)]
struct FileReport {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    warnings: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Warning {
    line: u32,
    column: u32,
    #[serde(default)]
    text: String,
    #[serde(default)]
    rule: Option<String>,
    #[serde(default)]
    severity: Option<String>,
}

impl StyleAnalyzer {
    #[must_use]
    pub fn new(settings: AnalyzerSettings) -> Self {
        Self { settings }
    }
}

impl Default for StyleAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerSettings::for_kind(AnalyzerKind::Style))
    }
}

impl Analyzer for StyleAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Style
    }

    fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    fn parse(&self, output: &str) -> Result<Vec<Diagnostic>, AnalyzerError> {
        let mut diagnostics = Vec::new();
        for entry in json_entries(self.name(), output)? {
            let file: FileReport = match serde_json::from_value(entry) {
                Ok(file) => file,
                Err(e) => {
                    tracing::debug!(analyzer = self.name(), "Skipping malformed file entry: {e}");
                    continue;
                }
            };
            let Some(document) = file.source.as_deref().and_then(tool_path) else {
                tracing::debug!(analyzer = self.name(), "Skipping file entry without source");
                continue;
            };

            for raw in file.warnings {
                let warning: Warning = match serde_json::from_value(raw) {
                    Ok(w) => w,
                    Err(e) => {
                        tracing::debug!(analyzer = self.name(), "Skipping malformed warning: {e}");
                        continue;
                    }
                };
                let severity = warning
                    .severity
                    .as_deref()
                    .map_or(Severity::Warning, Severity::from_label);
                let diagnostic = Diagnostic::new(
                    AnalyzerKind::Style,
                    document.clone(),
                    warning.line.saturating_sub(1),
                    warning.column.saturating_sub(1),
                    warning.text,
                )
                .with_severity(severity)
                .with_rule_id(warning.rule);

                if self.settings.keeps(&diagnostic) {
                    diagnostics.push(diagnostic);
                }
            }
        }
        Ok(diagnostics)
    }
}
