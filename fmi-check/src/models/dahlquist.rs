//! Port of the Dahlquist test equation `der(x) = -k * x` from the Reference FMUs.

use crate::{
    schema::{
        Causality, CoSimulationCapabilities, DefaultExperiment, ModelDescription,
        ModelExchangeCapabilities, Real, ScalarVariable, ScalarVariableElement, ValueReference,
        Variability,
    },
    traits::CapabilityError,
};

use super::{ModelContext, UserModel};

const VR_TIME: ValueReference = 0;
const VR_X: ValueReference = 1;
const VR_DER_X: ValueReference = 2;
const VR_K: ValueReference = 3;

#[derive(Debug)]
pub struct Dahlquist {
    /// The state variable
    pub x: f64,
    /// The parameter k
    pub k: f64,
}

impl Default for Dahlquist {
    fn default() -> Self {
        Self { x: 1.0, k: 1.0 }
    }
}

impl UserModel for Dahlquist {
    const FIXED_SOLVER_STEP: f64 = 0.1;

    fn model_description() -> ModelDescription {
        let real = |start, derivative| {
            ScalarVariableElement::Real(Real { start, derivative })
        };
        ModelDescription {
            fmi_version: "2.0".to_owned(),
            model_name: "Dahlquist".to_owned(),
            guid: "{221063D2-EF4A-45FE-B954-B5BFEEA9A59B}".to_owned(),
            description: "This model implements the Dahlquist test equation.".to_owned(),
            number_of_event_indicators: 0,
            default_experiment: Some(DefaultExperiment {
                start_time: Some(0.0),
                stop_time: Some(10.0),
                step_size: Some(0.1),
                ..Default::default()
            }),
            model_variables: vec![
                ScalarVariable::new(
                    "time",
                    VR_TIME,
                    Causality::Independent,
                    Variability::Continuous,
                    real(None, None),
                ),
                ScalarVariable::new(
                    "x",
                    VR_X,
                    Causality::Output,
                    Variability::Continuous,
                    real(Some(1.0), None),
                )
                .with_description("the only state"),
                ScalarVariable::new(
                    "der(x)",
                    VR_DER_X,
                    Causality::Local,
                    Variability::Continuous,
                    real(None, Some(2)),
                ),
                ScalarVariable::new(
                    "k",
                    VR_K,
                    Causality::Parameter,
                    Variability::Fixed,
                    real(Some(1.0), None),
                ),
            ],
            model_exchange: Some(ModelExchangeCapabilities {
                model_identifier: "Dahlquist".to_owned(),
                completed_integrator_step_not_needed: true,
            }),
            co_simulation: Some(CoSimulationCapabilities {
                model_identifier: "Dahlquist".to_owned(),
                can_handle_variable_communication_step_size: true,
            }),
        }
    }

    fn get_real(&self, context: &ModelContext, vr: ValueReference) -> Result<f64, CapabilityError> {
        match vr {
            VR_TIME => Ok(context.time()),
            VR_X => Ok(self.x),
            VR_DER_X => Ok(-self.k * self.x),
            VR_K => Ok(self.k),
            _ => Err(CapabilityError::Error),
        }
    }

    fn set_real(&mut self, vr: ValueReference, value: f64) -> Result<(), CapabilityError> {
        match vr {
            VR_K => self.k = value,
            _ => return Err(CapabilityError::Error),
        }
        Ok(())
    }

    fn get_continuous_states(&self, states: &mut [f64]) -> Result<(), CapabilityError> {
        states.copy_from_slice(&[self.x]);
        Ok(())
    }

    fn set_continuous_states(&mut self, states: &[f64]) -> Result<(), CapabilityError> {
        if let [x] = *states {
            self.x = x;
        }
        Ok(())
    }

    fn get_derivatives(
        &mut self,
        _context: &ModelContext,
        derivatives: &mut [f64],
    ) -> Result<(), CapabilityError> {
        derivatives.copy_from_slice(&[-self.k * self.x]);
        Ok(())
    }
}
