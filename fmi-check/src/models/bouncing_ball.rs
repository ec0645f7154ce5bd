//! Port of the BouncingBall model from the Reference FMUs.
//!
//! A ball falls from a height of 1 m and bounces off the ground, losing energy with every
//! bounce. The height is the single event indicator.

use crate::{
    context::Status,
    schema::{
        Causality, DefaultExperiment, ModelDescription, ModelExchangeCapabilities, Real,
        ScalarVariable, ScalarVariableElement, ValueReference, Variability,
    },
    traits::{CapabilityError, EventFlags},
};

use super::{ModelContext, UserModel};

const VR_TIME: ValueReference = 0;
const VR_H: ValueReference = 1;
const VR_DER_H: ValueReference = 2;
const VR_V: ValueReference = 3;
const VR_DER_V: ValueReference = 4;
const VR_G: ValueReference = 5;
const VR_E: ValueReference = 6;
const VR_V_MIN: ValueReference = 7;

#[derive(Debug)]
pub struct BouncingBall {
    /// Height above ground
    pub h: f64,
    /// Velocity of the ball
    pub v: f64,
    /// Gravitational acceleration
    pub g: f64,
    /// Coefficient of restitution
    pub e: f64,
    /// Velocity below which the ball stays on the ground
    pub v_min: f64,
}

impl Default for BouncingBall {
    fn default() -> Self {
        Self {
            h: 1.0,
            v: 0.0,
            g: -9.81,
            e: 0.7,
            v_min: 0.1,
        }
    }
}

fn real(start: f64) -> ScalarVariableElement {
    ScalarVariableElement::Real(Real {
        start: Some(start),
        derivative: None,
    })
}

fn derivative_of(index: usize) -> ScalarVariableElement {
    ScalarVariableElement::Real(Real {
        start: None,
        derivative: Some(index),
    })
}

impl UserModel for BouncingBall {
    fn model_description() -> ModelDescription {
        ModelDescription {
            fmi_version: "2.0".to_owned(),
            model_name: "BouncingBall".to_owned(),
            guid: "{1AE5E10D-9521-4DE3-80B9-D0EAAA7D5AF1}".to_owned(),
            description: "This model calculates the trajectory, over time, of a ball dropped from a height of 1 m.".to_owned(),
            number_of_event_indicators: 1,
            default_experiment: Some(DefaultExperiment {
                start_time: Some(0.0),
                stop_time: Some(3.0),
                step_size: Some(1e-2),
                ..Default::default()
            }),
            model_variables: vec![
                ScalarVariable::new(
                    "time",
                    VR_TIME,
                    Causality::Independent,
                    Variability::Continuous,
                    ScalarVariableElement::Real(Real::default()),
                )
                .with_description("Simulation time"),
                ScalarVariable::new("h", VR_H, Causality::Output, Variability::Continuous, real(1.0))
                    .with_description("Position of the ball"),
                ScalarVariable::new(
                    "der(h)",
                    VR_DER_H,
                    Causality::Local,
                    Variability::Continuous,
                    derivative_of(2),
                )
                .with_description("Derivative of h"),
                ScalarVariable::new("v", VR_V, Causality::Output, Variability::Continuous, real(0.0))
                    .with_description("Velocity of the ball"),
                ScalarVariable::new(
                    "der(v)",
                    VR_DER_V,
                    Causality::Local,
                    Variability::Continuous,
                    derivative_of(4),
                )
                .with_description("Derivative of v"),
                ScalarVariable::new("g", VR_G, Causality::Parameter, Variability::Fixed, real(-9.81))
                    .with_description("Gravity acting on the ball"),
                ScalarVariable::new("e", VR_E, Causality::Parameter, Variability::Tunable, real(0.7))
                    .with_description("Coefficient of restitution"),
                ScalarVariable::new(
                    "v_min",
                    VR_V_MIN,
                    Causality::Local,
                    Variability::Constant,
                    real(0.1),
                )
                .with_description("Velocity below which the ball stops bouncing"),
            ],
            model_exchange: Some(ModelExchangeCapabilities {
                model_identifier: "BouncingBall".to_owned(),
                completed_integrator_step_not_needed: true,
            }),
            co_simulation: None,
        }
    }

    fn get_real(&self, context: &ModelContext, vr: ValueReference) -> Result<f64, CapabilityError> {
        match vr {
            VR_TIME => Ok(context.time()),
            VR_H => Ok(self.h),
            VR_DER_H | VR_V => Ok(self.v),
            VR_DER_V | VR_G => Ok(self.g),
            VR_E => Ok(self.e),
            VR_V_MIN => Ok(self.v_min),
            _ => Err(CapabilityError::Error),
        }
    }

    fn set_real(&mut self, vr: ValueReference, value: f64) -> Result<(), CapabilityError> {
        match vr {
            VR_G => self.g = value,
            VR_E => self.e = value,
            _ => return Err(CapabilityError::Error),
        }
        Ok(())
    }

    fn get_continuous_states(&self, states: &mut [f64]) -> Result<(), CapabilityError> {
        states.copy_from_slice(&[self.h, self.v]);
        Ok(())
    }

    fn set_continuous_states(&mut self, states: &[f64]) -> Result<(), CapabilityError> {
        if let [h, v] = *states {
            self.h = h;
            self.v = v;
        }
        Ok(())
    }

    fn get_derivatives(
        &mut self,
        _context: &ModelContext,
        derivatives: &mut [f64],
    ) -> Result<(), CapabilityError> {
        derivatives.copy_from_slice(&[self.v, self.g]);
        Ok(())
    }

    fn get_event_indicators(
        &mut self,
        _context: &ModelContext,
        indicators: &mut [f64],
    ) -> Result<(), CapabilityError> {
        if let Some(z) = indicators.first_mut() {
            // a resting ball must not produce further crossings
            *z = if self.h == 0.0 && self.v == 0.0 { 1.0 } else { self.h };
        }
        Ok(())
    }

    fn event_update(
        &mut self,
        context: &ModelContext,
        flags: &mut EventFlags,
    ) -> Result<(), CapabilityError> {
        if self.h <= 0.0 && self.v < 0.0 {
            self.h = f64::MIN_POSITIVE;
            self.v = -self.v * self.e;

            if self.v < self.v_min {
                self.h = 0.0;
                self.v = 0.0;
                self.g = 0.0;
            }
            context.log(
                Status::OK,
                "logEvents",
                format_args!("Ball bounced at t = {} with v = {}", context.time(), self.v),
            );
            flags.values_of_continuous_states_changed = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::CheckContext,
        models::ModelImport,
        traits::{Common, FmuImport, ModelExchange},
    };

    #[test]
    fn test_description() {
        let md = BouncingBall::model_description();
        let states = md.continuous_states().unwrap();
        let names: Vec<_> = states.iter().map(|(s, d)| (&*s.name, &*d.name)).collect();
        assert_eq!(names, [("h", "der(h)"), ("v", "der(v)")]);
    }

    #[test_log::test]
    fn test_bounce() {
        let import = ModelImport::<BouncingBall>::new();
        let ctx = CheckContext::default();
        ctx.expect_instance("ball");
        let mut inst = import.instantiate_me("ball", ctx.clone()).unwrap();
        inst.setup_experiment(None, 0.0, None).unwrap();
        inst.enter_initialization_mode().unwrap();
        inst.exit_initialization_mode().unwrap();
        inst.enter_continuous_time_mode().unwrap();
        inst.set_continuous_states(&[-0.01, -4.0]).unwrap();
        inst.enter_event_mode().unwrap();

        let mut flags = EventFlags::default();
        inst.new_discrete_states(&mut flags).unwrap();
        assert!(flags.values_of_continuous_states_changed);

        let mut states = [0.0; 2];
        inst.get_continuous_states(&mut states).unwrap();
        assert_eq!(states, [f64::MIN_POSITIVE, 2.8]);
        assert_eq!(ctx.message_counts().info, 1);
    }
}
