//! A compliance checker and reference driver for FMI 2.0 models.
//!
//! [`check`] drives a model through its Model Exchange interface with a fixed-step forward Euler
//! integrator and through its Co-Simulation interface with fixed communication steps, feeding it
//! samples from an optional input file and recording its outputs into an Arrow
//! [`RecordBatch`].
//!
//! ## Feature flags
#![doc = document_features::document_features!()]
#![deny(clippy::all)]

use arrow::{error::ArrowError, record_batch::RecordBatch};

use crate::{
    context::{CheckContext, MessageCounts},
    input::{InputData, ParseError},
    ledger::BufferLedger,
    options::FmiCheckOptions,
    schema::{Counts, VariableCounts},
    sim::{me::ConvergenceError, output::Recorder, params::SimParams, SimStats},
    traits::{CapabilityError, FmuImport, Interface},
};

pub mod context;
pub mod input;
pub mod ledger;
pub mod models;
pub mod options;
pub mod schema;
pub mod sim;
pub mod traits;
pub mod value;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{operation} failed at t = {time} with status {source}")]
    Capability {
        operation: &'static str,
        time: f64,
        source: CapabilityError,
    },

    #[error(transparent)]
    Convergence(#[from] ConvergenceError),

    #[error("Could not instantiate the model: {0}")]
    Instantiation(String),

    #[error("Invalid experiment setup: {0}")]
    Experiment(String),

    #[error("Invalid model description: {0}")]
    ModelDescription(String),

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

impl Error {
    /// The model reported `Fatal`; its instance must not be called again.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Capability {
                source: CapabilityError::Fatal,
                ..
            }
        )
    }
}

/// The outcome of simulating one interface.
#[derive(Debug)]
pub struct RunReport {
    pub interface: Interface,
    pub result: Result<SimStats, Error>,
    /// The recorded snapshots, also when the run failed part way.
    pub output: Option<RecordBatch>,
    /// Messages the model sent to the logger callback.
    pub messages: MessageCounts,
    pub allocations: usize,
    pub releases: usize,
}

impl RunReport {
    /// The run reached its end without error. A run ended by a discarded call has failed, one
    /// ended by the model's own termination request has not.
    pub fn passed(&self) -> bool {
        matches!(&self.result, Ok(stats) if !stats.discarded)
    }
}

#[derive(Debug)]
pub struct CheckReport {
    pub counts: Counts,
    pub runs: Vec<RunReport>,
}

impl CheckReport {
    pub fn passed(&self) -> bool {
        self.runs.iter().all(RunReport::passed)
    }

    pub fn run(&self, interface: Interface) -> Option<&RunReport> {
        self.runs.iter().find(|run| run.interface == interface)
    }
}

/// Check a model: report its variables, then simulate the Model Exchange interface followed by
/// the Co-Simulation interface, each as selected by `options` and supported by the model.
///
/// Errors that prevent any simulation (an unusable input file or experiment setup) are returned
/// directly; the outcome of each simulation is held in its [`RunReport`].
pub fn check<I: FmuImport>(import: &I, options: &FmiCheckOptions) -> Result<CheckReport, Error> {
    let md = import.model_description();
    log::info!(
        "Model name: {}, GUID: {}, FMI version: {}",
        md.model_name,
        md.guid,
        md.fmi_version
    );

    let counts = md.model_variables.model_counts();
    log::info!("{counts}");

    let params = SimParams::new_from_options(md, options)?;
    log::debug!("{params:?}");

    let data = match &options.input_file {
        Some(path) => InputData::from_path(path, md)?,
        None => {
            if md.has_inputs() {
                log::warn!(
                    "No input data provided. In case of simulation initial values from the model description will be used."
                );
            }
            InputData::empty()
        }
    };

    let mut runs = Vec::new();

    if cfg!(feature = "me") && options.run_me() {
        if md.model_exchange.is_some() {
            runs.push(simulate(Interface::ModelExchange, import, &data, &params));
        } else if options.me {
            log::warn!("{} does not provide a Model Exchange interface", md.model_name);
        }
    }

    if cfg!(feature = "cs") && options.run_cs() {
        if md.co_simulation.is_some() {
            runs.push(simulate(Interface::CoSimulation, import, &data, &params));
        } else if options.cs {
            log::warn!("{} does not provide a Co-Simulation interface", md.model_name);
        }
    }

    if runs.is_empty() {
        return Err(Error::Instantiation(format!(
            "{} provides none of the selected interfaces",
            md.model_name
        )));
    }

    Ok(CheckReport { counts, runs })
}

fn simulate<I: FmuImport>(
    interface: Interface,
    import: &I,
    data: &InputData,
    params: &SimParams,
) -> RunReport {
    let context = CheckContext::new(BufferLedger::new());
    let mut recorder = Recorder::new(import.model_description(), params);

    let result = match interface {
        Interface::ModelExchange => {
            sim::me::model_exchange(import, data, params, &context, &mut recorder)
        }
        Interface::CoSimulation => {
            sim::cs::co_simulation(import, data, params, &context, &mut recorder)
        }
    };

    let (result, output) = with_output(interface, result, recorder.finish());

    let ledger = context.ledger();
    if ledger.outstanding() != 0 {
        log::error!(
            "{interface} run leaked {} of {} buffers",
            ledger.outstanding(),
            ledger.allocations()
        );
    }

    RunReport {
        interface,
        result,
        output,
        messages: context.message_counts(),
        allocations: ledger.allocations(),
        releases: ledger.releases(),
    }
}

/// Combine the outcome of a run with its assembled output. A run whose output cannot be assembled
/// has failed.
fn with_output(
    interface: Interface,
    result: Result<SimStats, Error>,
    output: Result<RecordBatch, ArrowError>,
) -> (Result<SimStats, Error>, Option<RecordBatch>) {
    match output {
        Ok(batch) => (result, Some(batch)),
        Err(e) => {
            log::error!("Could not assemble the {interface} output: {e}");
            (result.and(Err(Error::Arrow(e))), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_failure_fails_run() {
        let stats = SimStats {
            end_time: 1.0,
            ..Default::default()
        };
        let failure = || Err(ArrowError::ComputeError("columns differ in length".to_owned()));

        let (result, output) = with_output(Interface::CoSimulation, Ok(stats.clone()), failure());
        assert!(matches!(result, Err(Error::Arrow(_))));
        assert!(output.is_none());

        // an earlier failure is kept
        let (result, _) = with_output(
            Interface::ModelExchange,
            Err(Error::Experiment("stop".to_owned())),
            failure(),
        );
        assert!(matches!(result, Err(Error::Experiment(_))));

        let batch = RecordBatch::new_empty(std::sync::Arc::new(arrow::datatypes::Schema::empty()));
        let (result, output) = with_output(Interface::CoSimulation, Ok(stats.clone()), Ok(batch));
        assert_eq!(result.unwrap(), stats);
        assert!(output.is_some());
    }
}
