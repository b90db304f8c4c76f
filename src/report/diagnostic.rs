// src/report/diagnostic.rs

//! Diagnostics emitted while a project builds, and parsing of build-tool
//! output lines into them.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::Importance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Message(Importance),
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Component that raised the diagnostic, when known.
    pub sender: Option<String>,
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
    pub code: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn message(importance: Importance, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Message(importance),
            sender: None,
            file: None,
            line: 0,
            column: 0,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Parse one line of build-tool output.
    ///
    /// Lines in the canonical `origin(line,col): error|warning CODE: text`
    /// shape become errors/warnings; anything else becomes a message of
    /// the given importance.
    pub fn parse_line(line: &str, fallback: Importance) -> Self {
        match CANONICAL.captures(line) {
            Some(caps) => {
                let severity = if caps["sev"].eq_ignore_ascii_case("error") {
                    Severity::Error
                } else {
                    Severity::Warning
                };
                let number = |name: &str| {
                    caps.name(name)
                        .and_then(|m| m.as_str().parse::<u32>().ok())
                        .unwrap_or(0)
                };
                let origin = caps["origin"].trim();

                Self {
                    severity,
                    sender: None,
                    file: (!origin.is_empty()).then(|| origin.to_string()),
                    line: number("line"),
                    column: number("col"),
                    code: caps.name("code").map(|m| m.as_str().to_string()),
                    message: caps["msg"].trim().to_string(),
                }
            }
            None => Self::message(fallback, line.trim_end()),
        }
    }
}

static CANONICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?P<origin>.*?)(?:\((?P<line>\d+)(?:,(?P<col>\d+))?\))?\s*:\s*(?:[^:]*\s)?(?P<sev>error|warning)(?:\s+(?P<code>[A-Z]+\d+))?\s*:\s*(?P<msg>.*)$",
    )
    .expect("canonical diagnostic regex is valid")
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compiler_error_with_position() {
        let d = Diagnostic::parse_line(
            "Program.cs(12,7): error CS1002: ; expected [/src/App.csproj]",
            Importance::Normal,
        );
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.file.as_deref(), Some("Program.cs"));
        assert_eq!((d.line, d.column), (12, 7));
        assert_eq!(d.code.as_deref(), Some("CS1002"));
        assert_eq!(d.message, "; expected [/src/App.csproj]");
    }

    #[test]
    fn parses_windows_path_warning() {
        let d = Diagnostic::parse_line(
            r"C:\src\Lib.cs(3,1): warning CS0168: unused variable",
            Importance::Normal,
        );
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.file.as_deref(), Some(r"C:\src\Lib.cs"));
        assert_eq!(d.line, 3);
    }

    #[test]
    fn parses_tool_error_without_position() {
        let d = Diagnostic::parse_line(
            "MSBUILD : error MSB1009: Project file does not exist.",
            Importance::Normal,
        );
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.file.as_deref(), Some("MSBUILD"));
        assert_eq!((d.line, d.column), (0, 0));
        assert_eq!(d.code.as_deref(), Some("MSB1009"));
    }

    #[test]
    fn plain_lines_become_messages() {
        let d = Diagnostic::parse_line("  Restored /src/App.csproj (in 80 ms).", Importance::Low);
        assert_eq!(d.severity, Severity::Message(Importance::Low));
        assert_eq!(d.message, "  Restored /src/App.csproj (in 80 ms).");
    }
}
