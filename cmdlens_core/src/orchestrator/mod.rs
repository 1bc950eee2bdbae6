//! # Request Orchestrator
//!
//! Drives one directive through the per-unit pipeline:
//!
//! 1. **Validate** the unit against the allowlist. A rejected unit stops here;
//!    nothing is executed and the backend is never contacted.
//! 2. **Execute** the approved unit through a [`CommandRunner`].
//! 3. **Explain** the captured output (or the error text standing in for it)
//!    through an [`Explainer`].
//!
//! Units are independent. They fan out with bounded concurrency and the
//! outcomes are put back into input order before they are returned. Every
//! failure is recorded on its own unit's outcome, so a request always yields
//! exactly one outcome per unit.

mod outcome;
mod probes;

pub use outcome::{AggregateResponse, NO_OUTPUT_NOTE, Severity, UnitOutcome, UnitStatus};
pub use probes::{Probe, default_probes};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::allowlist::{Allowlist, CommandUnit, DEFAULT_DELIMITER, split_directive};
use crate::error::GatewayError;
use crate::explainer::{ExplainContext, Explainer, PromptTemplate};
use crate::sandbox::CommandRunner;

/// Default number of units of one request processed at the same time.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Where a request's units come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitSet {
    /// Split from the caller's directive.
    UserSupplied,
    /// The server's configured health probes; the directive is ignored.
    FixedProbeSet,
}

impl UnitSet {
    fn template(self) -> PromptTemplate {
        match self {
            UnitSet::UserSupplied => PromptTemplate::Explain,
            UnitSet::FixedProbeSet => PromptTemplate::HealthSeverity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub delimiter: String,
    pub max_concurrency: usize,
    pub probes: Vec<Probe>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            probes: default_probes(),
        }
    }
}

struct PlannedUnit {
    index: usize,
    unit: CommandUnit,
    probe: Option<Probe>,
}

/// Runs directives through validate, execute and explain.
///
/// Cheap to clone; all state is shared and read-only.
#[derive(Clone)]
pub struct RequestOrchestrator {
    allowlist: Arc<Allowlist>,
    runner: Arc<dyn CommandRunner>,
    explainer: Arc<dyn Explainer>,
    settings: Arc<OrchestratorSettings>,
}

impl RequestOrchestrator {
    pub fn new(
        allowlist: Arc<Allowlist>,
        runner: Arc<dyn CommandRunner>,
        explainer: Arc<dyn Explainer>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            allowlist,
            runner,
            explainer,
            settings: Arc::new(settings),
        }
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Process a directive and return one outcome per unit, in input order.
    ///
    /// Never fails: per-unit problems are recorded on the outcomes.
    pub async fn process(&self, directive: &str, unit_set: UnitSet) -> AggregateResponse {
        let planned = self.plan(directive, unit_set);
        let total = planned.len();
        let width = self.settings.max_concurrency.clamp(1, total.max(1));
        let template = unit_set.template();

        tracing::info!(units = total, concurrency = width, ?unit_set, "Processing directive");

        let mut indexed: Vec<(usize, UnitOutcome)> = stream::iter(planned)
            .map(|planned| async move {
                let index = planned.index;
                let span = tracing::info_span!("unit", unit_index = index);
                (index, self.run_unit(planned, template).instrument(span).await)
            })
            .buffer_unordered(width)
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);

        let outcomes: Vec<UnitOutcome> = indexed.into_iter().map(|(_, o)| o).collect();
        tracing::info!(
            units = outcomes.len(),
            rejected = outcomes
                .iter()
                .filter(|o| o.status == UnitStatus::Rejected)
                .count(),
            explained = outcomes
                .iter()
                .filter(|o| o.status == UnitStatus::Explained)
                .count(),
            "Directive processed"
        );

        AggregateResponse { unit_set, outcomes }
    }

    /// Like [`process`](Self::process), abandoning all in-flight work when
    /// `token` is cancelled.
    ///
    /// Dropping the work kills running process groups and closes open backend
    /// streams. Partial outcomes are discarded.
    pub async fn process_with_cancellation(
        &self,
        directive: &str,
        unit_set: UnitSet,
        token: &CancellationToken,
    ) -> Result<AggregateResponse, GatewayError> {
        if token.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::info!(?unit_set, "Request cancelled, abandoning in-flight units");
                Err(GatewayError::Cancelled)
            }
            response = self.process(directive, unit_set) => Ok(response),
        }
    }

    fn plan(&self, directive: &str, unit_set: UnitSet) -> Vec<PlannedUnit> {
        match unit_set {
            UnitSet::UserSupplied => split_directive(directive, &self.settings.delimiter)
                .into_iter()
                .enumerate()
                .map(|(index, unit)| PlannedUnit {
                    index,
                    unit,
                    probe: None,
                })
                .collect(),
            UnitSet::FixedProbeSet => self
                .settings
                .probes
                .iter()
                .enumerate()
                .map(|(index, probe)| PlannedUnit {
                    index,
                    unit: CommandUnit::new(probe.command.clone()),
                    probe: Some(probe.clone()),
                })
                .collect(),
        }
    }

    async fn run_unit(&self, planned: PlannedUnit, template: PromptTemplate) -> UnitOutcome {
        let PlannedUnit { unit, probe, .. } = planned;
        let probe_name = probe.as_ref().map(|p| p.name.clone());

        let validation = self.allowlist.validate(&unit);
        if !validation.allowed {
            tracing::info!(command = %unit.trimmed(), "Rejected command not on allowlist");
            return UnitOutcome::rejected(unit, probe_name);
        }

        let description = probe
            .as_ref()
            .map(|p| p.description.clone())
            .or(validation.description);

        let execution = self.runner.run(&unit).await;
        let executed_ok = execution.succeeded();
        let mut errors: Vec<GatewayError> = execution.failure().into_iter().collect();
        let raw_output = execution.explainable_output();

        let (explanation_text, explained_by_backend) = match &raw_output {
            // A failed run with no output at all is described by its failure.
            None if executed_ok => (Some(NO_OUTPUT_NOTE.to_string()), false),
            None => (None, false),
            Some(output) => {
                let context = ExplainContext {
                    command: unit.trimmed().to_string(),
                    description: description.clone(),
                    output: output.clone(),
                };
                match self.explainer.explain(template, &context).await {
                    Ok(text) => (Some(text), true),
                    Err(e) => {
                        errors.push(e.to_gateway_error());
                        (None, false)
                    }
                }
            }
        };

        let status = match (executed_ok, explanation_text.is_some()) {
            (false, _) => UnitStatus::ExecutionFailed,
            (true, true) => UnitStatus::Explained,
            (true, false) => UnitStatus::ExplanationFailed,
        };

        let severity = match (template, explained_by_backend, &explanation_text) {
            (PromptTemplate::HealthSeverity, true, Some(text)) => Some(Severity::detect(text)),
            _ => None,
        };

        tracing::debug!(
            command = %unit.trimmed(),
            ?status,
            errors = errors.len(),
            "Unit finished"
        );

        UnitOutcome {
            unit,
            probe: probe_name,
            status,
            description,
            raw_output,
            explanation_text,
            severity,
            exit_code: execution.exit_code,
            duration_ms: Some(execution.duration_ms),
            timed_out: execution.timed_out,
            errors,
        }
    }
}
