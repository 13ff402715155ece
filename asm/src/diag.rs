//! Diagnostic sink (§7, §3's "listing collaborator"): the driver's own `Vec<Diagnostic>`
//! accumulator. Not a logging facade -- the teacher has none, and neither does any comparable
//! workspace member in the pack, so this is a plain `Display`-backed record type, matched to
//! "ambient concerns use the teacher's own way of doing it".

use crate::error::Severity;
use std::fmt;

/// One diagnostic attributed to a source line, ready to print or collect.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, line: u32, message: impl Into<String>) -> Self {
        Diagnostic { severity, line, message: message.into() }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self.severity {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Nonfatal => "error",
            Severity::Fatal => "fatal",
            Severity::Critical => "panic",
        };
        write!(f, "line {}: {}: {}", self.line, label, self.message)
    }
}

/// Whether a line's diagnostics should suppress the bytes it would otherwise have produced
/// (§7: "`fatal` aborts the current assembly" at instruction granularity -- the driver replaces
/// that one instruction with `I_none`, not the rest of the file).
pub fn is_line_fatal(severity: Severity) -> bool {
    severity >= Severity::Fatal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_with_line_and_severity_label() {
        let d = Diagnostic::new(Severity::Warning, 7, "overflow");
        assert_eq!(d.to_string(), "line 7: warning: overflow");
    }

    #[test]
    fn fatal_and_above_are_line_fatal() {
        assert!(is_line_fatal(Severity::Fatal));
        assert!(is_line_fatal(Severity::Critical));
        assert!(!is_line_fatal(Severity::Warning));
        assert!(!is_line_fatal(Severity::Nonfatal));
    }
}
