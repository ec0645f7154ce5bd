//! Simulation drivers for the Model Exchange and Co-Simulation interfaces.

use crate::{
    schema::{ModelDescription, ScalarVariableElement},
    traits::{CapabilityError, Common},
    value::Value,
    Error,
};

pub mod cs;
pub mod input_state;
pub mod me;
pub mod output;
pub mod params;

#[derive(Default, Debug, Clone, PartialEq)]
pub struct SimStats {
    /// Simulation time at which the run ended.
    pub end_time: f64,
    /// Number of accepted steps.
    pub num_steps: usize,
    /// Number of handled events (ME only).
    pub num_events: usize,
    /// The run ended early because the model returned `Discard`.
    pub discarded: bool,
    /// The run ended early because the model requested termination.
    pub terminated_by_model: bool,
}

/// Attach the failing operation and simulation time to a capability status.
pub(crate) trait StatusExt<T> {
    fn at(self, operation: &'static str, time: f64) -> Result<T, Error>;
}

impl<T> StatusExt<T> for Result<T, CapabilityError> {
    fn at(self, operation: &'static str, time: f64) -> Result<T, Error> {
        self.map_err(|source| {
            log::error!("{operation} returned status {source} at t = {time}");
            Error::Capability {
                operation,
                time,
                source,
            }
        })
    }
}

/// Read the outputs, the derivatives and their states while in initialization mode.
pub(crate) fn check_initialization_outputs<C: Common>(
    md: &ModelDescription,
    inst: &mut C,
    time: f64,
) -> Result<(), Error> {
    let states = md.continuous_states().map_err(|name| {
        Error::ModelDescription(format!(
            "Derivative variable {name} is not declared to be the derivative of another variable"
        ))
    })?;

    let vars = md
        .outputs()
        .chain(states.iter().flat_map(|(state, der)| [*der, *state]));

    for var in vars {
        match Value::read(inst, var) {
            Ok(Value::Enum(v)) if matches!(var.elem, ScalarVariableElement::Enumeration(_)) => {
                if var.enum_item_name(v).is_none() {
                    log::error!("Could not get item name for enum variable {}", var.name);
                }
            }
            Ok(_) => {}
            Err(source) => {
                log::error!(
                    "Reading {} returned status {source} in initialization mode",
                    var.name
                );
                return Err(Error::Capability {
                    operation: "get outputs/continuous-time states and state derivatives while in initialization mode",
                    time,
                    source,
                });
            }
        }
    }
    Ok(())
}

/// Terminate the instance at the end of a run. A failing terminate call is logged only. After a
/// `Fatal` status the instance is not touched again.
pub(crate) fn terminate_instance<C: Common>(inst: &mut C, result: &Result<SimStats, Error>) {
    if let Err(e) = result {
        if e.is_fatal() {
            log::error!("Model returned Fatal status, skipping terminate");
            return;
        }
    }
    if let Err(e) = inst.terminate() {
        log::error!("terminate returned status {e}");
    }
}
