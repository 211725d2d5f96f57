//! Diagnostics shared by every pass.
//!
//! User-facing problems (structural errors found while building a module,
//! semantic errors found by the checker, unresolved operators) are reported
//! to a [`DiagnosticSink`]. Reporting never interrupts a pass: the sink counts
//! the error and returns so a single run surfaces as many problems as
//! possible. The error count is the externally visible success signal.
//!
//! Violations of the compiler's own invariants take the other path:
//! [`DiagnosticSink::fatal`] (or the [`internal_error!`] macro) aborts
//! immediately with the full context.

use std::{fmt, sync::Arc};

use colored::Colorize;
use strum::{Display, EnumIter};

/// Source position attached to a node when it is constructed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    file: Arc<str>,
    line: u32,
}

impl Location {
    pub fn new(file: impl Into<Arc<str>>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Location for nodes synthesized by a pass rather than read from input
    pub fn internal() -> Self {
        Self::new("<internal>", 0)
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// The part of the compiler a diagnostic originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Component {
    Builder,
    Dispatch,
    Registry,
    Checker,
    Canonicalizer,
    Codegen,
    Pipeline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub component: Component,
    pub message: String,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn new(component: Component, message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            component,
            message: message.into(),
            location,
        }
    }

    /// Renders the diagnostic for a terminal
    pub fn colored(&self) -> String {
        let mut rendered = format!(
            "{}{} {}",
            "error".red(),
            format!("[{}]:", self.component).red(),
            self.message
        );

        if let Some(location) = &self.location {
            rendered.push(' ');
            rendered.push_str(&format!("(at {location})").white().to_string());
        }

        rendered
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&strip_ansi_escapes::strip_str(self.colored()))
    }
}

/// Collects diagnostics for a single compilation
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    /// Print each diagnostic to stderr as it is reported
    echo: bool,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn echoing() -> Self {
        Self {
            diagnostics: Vec::new(),
            echo: true,
        }
    }

    /// Records a recoverable error and returns
    pub fn report(
        &mut self,
        component: Component,
        message: impl Into<String>,
        location: Option<&Location>,
    ) {
        let diagnostic = Diagnostic::new(component, message, location.cloned());

        log::debug!("{diagnostic}");

        if self.echo {
            eprintln!("{}", diagnostic.colored());
        }

        self.diagnostics.push(diagnostic);
    }

    /// Aborts on an implementer-invariant violation. Never used for problems
    /// in the input.
    #[track_caller]
    pub fn fatal(
        &self,
        component: Component,
        message: impl fmt::Display,
        location: Option<&Location>,
    ) -> ! {
        abort(component, message, location)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Moves diagnostics collected elsewhere (e.g. by the module builder) into
    /// this sink
    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for d in diagnostics {
            self.report(d.component, d.message, d.location.as_ref());
        }
    }
}

#[track_caller]
pub fn abort(component: Component, message: impl fmt::Display, location: Option<&Location>) -> ! {
    let position = location
        .map(|l| format!(" (at {l})"))
        .unwrap_or_default();

    eprintln!(
        "{}{} {message}{position}",
        "internal compiler error".red().bold(),
        format!("[{component}]:").red(),
    );

    panic!("internal compiler error [{component}]: {message}{position}")
}

/// Aborts with an internal compiler error
///
/// ```ignore
/// internal_error!(Component::Canonicalizer, Some(&location), "block {name} has no terminator");
/// ```
macro_rules! internal_error {
    ($component:expr, $location:expr, $($arg:tt)+) => {
        $crate::diagnostics::abort($component, format_args!($($arg)+), $location)
    };
}

pub(crate) use internal_error;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_and_keeps_going() {
        let mut sink = DiagnosticSink::new();
        let location = Location::new("a.ll", 3);

        sink.report(Component::Checker, "first", Some(&location));
        sink.report(Component::Canonicalizer, "second", None);

        assert_eq!(sink.error_count(), 2);
        assert_eq!(
            sink.diagnostics()[0].to_string(),
            "error[checker]: first (at a.ll:3)"
        );
        assert_eq!(sink.diagnostics()[1].to_string(), "error[canonicalizer]: second");
    }

    #[test]
    #[should_panic(expected = "internal compiler error [dispatch]: unreachable")]
    fn fatal_aborts() {
        let sink = DiagnosticSink::new();
        sink.fatal(Component::Dispatch, "unreachable", None);
    }
}
