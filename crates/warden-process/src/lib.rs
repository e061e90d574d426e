/// Lifecycle of the one supervised server process.
///
/// There is no terminal state: the agent may relaunch the server
/// indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProcessState {
    Stopped,
    Launching,
    Running,
    Stopping,
    Crashed,
}

/// Severity class derived from a server console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Debug,
    Info,
}

impl Severity {
    /// Classify a console line by case-insensitive keyword match.
    pub fn classify(line: &str) -> Self {
        let lower = line.to_ascii_lowercase();
        if lower.contains("error") || lower.contains("critical") || lower.contains("exception") {
            Severity::Error
        } else if lower.contains("warn") || lower.contains("warning") {
            Severity::Warning
        } else if lower.contains("debug") {
            Severity::Debug
        } else {
            Severity::Info
        }
    }
}

/// One line of server console output, classified at read time.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OutputLine {
    pub text: String,
    pub severity: Severity,
}

impl OutputLine {
    pub fn classify(text: String) -> Self {
        let severity = Severity::classify(&text);
        Self { text, severity }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_error_keywords() {
        assert_eq!(Severity::classify("java.lang.NullPointerException"), Severity::Error);
        assert_eq!(Severity::classify("[12:00:01] CRITICAL failure"), Severity::Error);
        assert_eq!(Severity::classify("An ERROR occurred"), Severity::Error);
    }

    #[test]
    fn classify_warning_keywords() {
        assert_eq!(Severity::classify("[Server] WARN: skipping entity"), Severity::Warning);
        assert_eq!(Severity::classify("warning: deprecated option"), Severity::Warning);
    }

    #[test]
    fn classify_debug_keyword() {
        assert_eq!(Severity::classify("[DEBUG] tick took 48ms"), Severity::Debug);
    }

    #[test]
    fn classify_defaults_to_info() {
        assert_eq!(Severity::classify("Done (3.141s)! For help, type \"help\""), Severity::Info);
        assert_eq!(Severity::classify(""), Severity::Info);
    }

    #[test]
    fn error_wins_over_warning() {
        // A line carrying both keyword classes takes the more severe one.
        assert_eq!(
            Severity::classify("WARN: exception while saving chunk"),
            Severity::Error
        );
    }

    #[test]
    fn output_line_keeps_raw_text() {
        let line = OutputLine::classify("[Server] WARN: lag spike".to_string());
        assert_eq!(line.text, "[Server] WARN: lag spike");
        assert_eq!(line.severity, Severity::Warning);
    }
}
