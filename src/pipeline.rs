//! Runs the middle end over one module: check, canonicalize, check again,
//! then hand the canonical module to a backend. Every stage refuses to run
//! once an earlier one has reported errors.

use thiserror::Error;

use crate::{
    backend::Backend,
    diagnostics::DiagnosticSink,
    middle::{
        canonicalize::canonicalize,
        checker::{check, Phase},
        codegen::generate,
        ensure_clean,
        ir::{builder::ModuleBuilder, Module},
        registry::OperatorRegistry,
        Refused, Stage,
    },
};

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Print diagnostics to stderr as they are reported
    pub echo: bool,
    /// Stop once this stage has run
    pub stop_after: Option<Stage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Refused(#[from] Refused),
    /// The pipeline was told to stop after a stage which reported errors
    #[error("{stage} reported {errors} error(s)")]
    Failed { stage: Stage, errors: usize },
}

pub struct Pipeline<'r> {
    registry: &'r OperatorRegistry,
    options: PipelineOptions,
    sink: DiagnosticSink,
}

impl<'r> Pipeline<'r> {
    pub fn new(registry: &'r OperatorRegistry, options: PipelineOptions) -> Self {
        let sink = if options.echo {
            DiagnosticSink::echoing()
        } else {
            DiagnosticSink::new()
        };

        Self {
            registry,
            options,
            sink,
        }
    }

    pub fn sink(&self) -> &DiagnosticSink {
        &self.sink
    }

    pub fn into_sink(self) -> DiagnosticSink {
        self.sink
    }

    /// Finishes a module under construction, collecting its structural
    /// errors
    pub fn build(&mut self, builder: ModuleBuilder) -> Result<Module, PipelineError> {
        let module = builder.finish(&mut self.sink);
        self.stage_done(Stage::Build)?;
        Ok(module)
    }

    /// Whether to stop after `stage`. Stopping on a stage with errors is an
    /// `Err`.
    fn stage_done(&self, stage: Stage) -> Result<bool, PipelineError> {
        let stop = self.options.stop_after == Some(stage);

        if stop && self.sink.has_errors() {
            return Err(PipelineError::Failed {
                stage,
                errors: self.sink.error_count(),
            });
        }

        log::debug!("{stage} done, {} error(s) so far", self.sink.error_count());
        Ok(stop)
    }

    /// Runs every stage from the first check onwards. Returns the last stage
    /// that ran.
    pub fn run<B: Backend>(&mut self, module: &mut Module, backend: &mut B) -> Result<Stage, PipelineError> {
        ensure_clean(Stage::PreCheck, &self.sink)?;
        check(module, self.registry, &mut self.sink, Phase::PreCanonical);
        if self.stage_done(Stage::PreCheck)? {
            return Ok(Stage::PreCheck);
        }

        canonicalize(module, &self.sink)?;
        if self.stage_done(Stage::Canonicalize)? {
            return Ok(Stage::Canonicalize);
        }

        ensure_clean(Stage::PostCheck, &self.sink)?;
        check(module, self.registry, &mut self.sink, Phase::PostCanonical);
        if self.stage_done(Stage::PostCheck)? {
            return Ok(Stage::PostCheck);
        }

        generate(module, self.registry, backend, &self.sink)?;
        self.stage_done(Stage::Codegen)?;
        Ok(Stage::Codegen)
    }
}
