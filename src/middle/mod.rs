//! The middle end: the IR, the dispatch framework every pass is built on,
//! the operator registry, and the passes themselves. A module is checked,
//! canonicalized, checked again and finally handed to code generation.

use strum::Display;
use thiserror::Error;

use crate::diagnostics::DiagnosticSink;

pub mod canonicalize;
pub mod checker;
pub mod codegen;
pub mod dispatch;
pub mod ir;
pub mod registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    Build,
    PreCheck,
    Canonicalize,
    PostCheck,
    Codegen,
}

/// A pass declined to run because errors were reported before it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} refused to run: {errors} error(s) already reported")]
pub struct Refused {
    pub stage: Stage,
    pub errors: usize,
}

pub(crate) fn ensure_clean(stage: Stage, sink: &DiagnosticSink) -> Result<(), Refused> {
    if sink.has_errors() {
        log::info!("{stage} skipped after {} error(s)", sink.error_count());
        return Err(Refused {
            stage,
            errors: sink.error_count(),
        });
    }

    Ok(())
}
