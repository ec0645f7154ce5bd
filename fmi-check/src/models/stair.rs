//! Port of the Stair model from the Reference FMUs.
//!
//! A discrete counter incremented by a time event every second. The model asks to terminate
//! once the counter reaches 10.

use crate::{
    schema::{
        Causality, CoSimulationCapabilities, DefaultExperiment, Integer, ModelDescription,
        ModelExchangeCapabilities, Real, ScalarVariable, ScalarVariableElement, ValueReference,
        Variability,
    },
    traits::{CapabilityError, EventFlags},
};

use super::{ModelContext, UserModel};

const VR_TIME: ValueReference = 0;
const VR_COUNTER: ValueReference = 1;

#[derive(Debug)]
pub struct Stair {
    /// Counter that increments every second
    pub counter: i32,
    next_event_time: f64,
}

impl Default for Stair {
    fn default() -> Self {
        Self {
            counter: 1,
            next_event_time: 1.0,
        }
    }
}

impl UserModel for Stair {
    const FIXED_SOLVER_STEP: f64 = 0.2;

    fn model_description() -> ModelDescription {
        ModelDescription {
            fmi_version: "2.0".to_owned(),
            model_name: "Stair".to_owned(),
            guid: "{BD403596-3166-4232-ABC2-132BDF73E644}".to_owned(),
            description: "This model generates a stair signal using time events.".to_owned(),
            number_of_event_indicators: 0,
            default_experiment: Some(DefaultExperiment {
                start_time: Some(0.0),
                stop_time: Some(10.0),
                step_size: Some(0.2),
                ..Default::default()
            }),
            model_variables: vec![
                ScalarVariable::new(
                    "time",
                    VR_TIME,
                    Causality::Independent,
                    Variability::Continuous,
                    ScalarVariableElement::Real(Real::default()),
                ),
                ScalarVariable::new(
                    "counter",
                    VR_COUNTER,
                    Causality::Output,
                    Variability::Discrete,
                    ScalarVariableElement::Integer(Integer { start: Some(1) }),
                )
                .with_description("counts the seconds"),
            ],
            model_exchange: Some(ModelExchangeCapabilities {
                model_identifier: "Stair".to_owned(),
                completed_integrator_step_not_needed: true,
            }),
            co_simulation: Some(CoSimulationCapabilities {
                model_identifier: "Stair".to_owned(),
                can_handle_variable_communication_step_size: false,
            }),
        }
    }

    fn get_real(&self, context: &ModelContext, vr: ValueReference) -> Result<f64, CapabilityError> {
        match vr {
            VR_TIME => Ok(context.time()),
            _ => Err(CapabilityError::Error),
        }
    }

    fn get_integer(&self, vr: ValueReference) -> Result<i32, CapabilityError> {
        match vr {
            VR_COUNTER => Ok(self.counter),
            _ => Err(CapabilityError::Error),
        }
    }

    fn event_update(
        &mut self,
        context: &ModelContext,
        flags: &mut EventFlags,
    ) -> Result<(), CapabilityError> {
        let epsilon = (1.0 + context.time().abs()) * f64::EPSILON;

        if context.time() + epsilon >= self.next_event_time {
            self.counter += 1;
            self.next_event_time += 1.0;
        }

        flags.next_event_time = Some(self.next_event_time);
        flags.terminate_simulation = self.counter >= 10;
        Ok(())
    }
}
