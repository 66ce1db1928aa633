//! The normalized diagnostic model shared by every analyzer.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    /// Map a tool-reported severity label. Only `"error"` escalates; everything
    /// else (including unknown labels) is a warning.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("error") {
            Self::Error
        } else {
            Self::Warning
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// Which analyzer variant produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    /// Stylesheet linter (stylelint JSON formatter).
    Style,
    /// Script linter (tslint JSON formatter).
    Script,
}

impl AnalyzerKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Style => "stylelint",
            Self::Script => "tslint",
        }
    }

    /// Documentation URL for `rule`, if the tool publishes per-rule pages.
    #[must_use]
    pub fn help_link(self, rule: &str) -> Option<String> {
        let rule = rule.trim();
        if rule.is_empty() {
            return None;
        }
        Some(match self {
            Self::Style => format!("https://stylelint.io/user-guide/rules/{rule}"),
            Self::Script => format!("https://palantir.github.io/tslint/rules/{rule}/"),
        })
    }
}

impl fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Document identity: a file path compared case-insensitively.
///
/// The original casing is kept for display; equality and hashing fold case so
/// `Foo.ts`, `foo.ts` and `FOO.TS` name the same document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentPath(String);

impl DocumentPath {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Build a document path from tool output: forward slashes become the host
    /// separator.
    #[must_use]
    pub fn from_tool_output(raw: &str) -> Self {
        Self(normalize_separators(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Case-insensitive match against a raw name.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        fold(&self.0).eq(fold(other))
    }

    /// Whether this document lies under `root` (case-insensitive prefix match
    /// on whole path components).
    #[must_use]
    pub fn is_under(&self, root: &Path) -> bool {
        let root = normalize_separators(&root.to_string_lossy());
        let root = root.trim_end_matches(MAIN_SEPARATOR);
        if root.is_empty() {
            return true;
        }
        let doc: Vec<char> = fold(&self.0).collect();
        let prefix: Vec<char> = fold(root).collect();
        if doc.len() < prefix.len() || doc[..prefix.len()] != prefix[..] {
            return false;
        }
        doc.len() == prefix.len() || doc[prefix.len()] == MAIN_SEPARATOR
    }
}

fn fold(s: &str) -> impl Iterator<Item = char> + '_ {
    s.chars().flat_map(char::to_lowercase)
}

fn normalize_separators(raw: &str) -> String {
    if MAIN_SEPARATOR == '/' {
        raw.to_string()
    } else {
        raw.replace('/', &MAIN_SEPARATOR.to_string())
    }
}

impl PartialEq for DocumentPath {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.0)
    }
}

impl Eq for DocumentPath {}

impl Hash for DocumentPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in fold(&self.0) {
            c.hash(state);
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentPath {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&Path> for DocumentPath {
    fn from(value: &Path) -> Self {
        Self(value.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for DocumentPath {
    fn from(value: PathBuf) -> Self {
        Self::from(value.as_path())
    }
}

/// One normalized analyzer finding.
///
/// Fields are private; equality is structural. `line` and `column` are
/// 0-indexed positions at the time the analysis ran.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Diagnostic {
    document: DocumentPath,
    line: u32,
    column: u32,
    message: String,
    severity: Severity,
    rule_id: Option<String>,
    source: AnalyzerKind,
}

impl Diagnostic {
    /// Construct a warning with no rule id. Use the `with_*` methods to refine.
    #[must_use]
    pub fn new(
        source: AnalyzerKind,
        document: impl Into<DocumentPath>,
        line: u32,
        column: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            document: document.into(),
            line,
            column,
            message: message.into(),
            severity: Severity::Warning,
            rule_id: None,
            source,
        }
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach a rule id. Blank ids are treated as absent.
    #[must_use]
    pub fn with_rule_id(mut self, rule_id: Option<String>) -> Self {
        self.rule_id = rule_id.filter(|r| !r.trim().is_empty());
        self
    }

    /// Re-home the diagnostic onto another document path (same identity rules).
    #[must_use]
    pub fn with_document(mut self, document: impl Into<DocumentPath>) -> Self {
        self.document = document.into();
        self
    }

    #[must_use]
    pub fn document(&self) -> &DocumentPath {
        &self.document
    }

    /// 0-indexed line number.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 0-indexed column.
    #[must_use]
    pub fn column(&self) -> u32 {
        self.column
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn rule_id(&self) -> Option<&str> {
        self.rule_id.as_deref()
    }

    #[must_use]
    pub fn source(&self) -> AnalyzerKind {
        self.source
    }

    #[must_use]
    pub fn help_link(&self) -> Option<String> {
        self.rule_id
            .as_deref()
            .and_then(|rule| self.source.help_link(rule))
    }

    /// Format as `path:line:col: severity: [source] message (rule)`, 1-indexed.
    #[must_use]
    pub fn display_line(&self) -> String {
        let mut out = format!(
            "{}:{}:{}: {}: [{}] {}",
            self.document,
            self.line + 1,
            self.column + 1,
            self.severity.label(),
            self.source,
            self.message,
        );
        if let Some(rule) = &self.rule_id {
            out.push_str(" (");
            out.push_str(rule);
            out.push(')');
        }
        out
    }
}
