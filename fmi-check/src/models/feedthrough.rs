//! Port of the Feedthrough model from the Reference FMUs: every input is copied to the output of
//! the same type.

use crate::{
    schema::{
        Alias, Boolean, Causality, CoSimulationCapabilities, DefaultExperiment, Enumeration,
        Integer, ModelDescription, ModelExchangeCapabilities, Real, ScalarVariable,
        ScalarVariableElement, ValueReference, Variability,
    },
    traits::CapabilityError,
};

use super::{ModelContext, UserModel};

const VR_TIME: ValueReference = 0;
const VR_CONTINUOUS_INPUT: ValueReference = 1;
const VR_CONTINUOUS_OUTPUT: ValueReference = 2;
const VR_DISCRETE_INPUT: ValueReference = 3;
const VR_DISCRETE_OUTPUT: ValueReference = 4;
const VR_INT_INPUT: ValueReference = 5;
const VR_INT_OUTPUT: ValueReference = 6;
const VR_BOOL_INPUT: ValueReference = 7;
const VR_BOOL_OUTPUT: ValueReference = 8;
const VR_ENUM_INPUT: ValueReference = 9;
const VR_ENUM_OUTPUT: ValueReference = 10;
const VR_STRING_PARAMETER: ValueReference = 11;

#[derive(Debug)]
pub struct Feedthrough {
    pub continuous_input: f64,
    pub discrete_input: f64,
    pub int_input: i32,
    pub bool_input: bool,
    pub enum_input: i32,
    pub string_parameter: String,
}

impl Default for Feedthrough {
    fn default() -> Self {
        Self {
            continuous_input: 0.0,
            discrete_input: 0.0,
            int_input: 0,
            bool_input: false,
            enum_input: 1,
            string_parameter: "Set me!".to_owned(),
        }
    }
}

fn real() -> ScalarVariableElement {
    ScalarVariableElement::Real(Real {
        start: Some(0.0),
        derivative: None,
    })
}

fn enumeration() -> ScalarVariableElement {
    ScalarVariableElement::Enumeration(Enumeration {
        start: Some(1),
        items: vec![(1, "Option 1".to_owned()), (2, "Option 2".to_owned())],
    })
}

impl UserModel for Feedthrough {
    fn model_description() -> ModelDescription {
        use Causality::{Input, Output};
        use Variability::{Continuous, Discrete};

        ModelDescription {
            fmi_version: "2.0".to_owned(),
            model_name: "Feedthrough".to_owned(),
            guid: "{37B954F1-CC86-4D8F-B97F-C7C36F6670D2}".to_owned(),
            description: "A model to test different variable types, causalities, and variabilities".to_owned(),
            number_of_event_indicators: 0,
            default_experiment: Some(DefaultExperiment {
                start_time: Some(0.0),
                stop_time: Some(2.0),
                ..Default::default()
            }),
            model_variables: vec![
                ScalarVariable::new(
                    "time",
                    VR_TIME,
                    Causality::Independent,
                    Continuous,
                    ScalarVariableElement::Real(Real::default()),
                ),
                ScalarVariable::new(
                    "Float64_continuous_input",
                    VR_CONTINUOUS_INPUT,
                    Input,
                    Continuous,
                    real(),
                ),
                ScalarVariable::new(
                    "Float64_continuous_input_negated",
                    VR_CONTINUOUS_INPUT,
                    Input,
                    Continuous,
                    real(),
                )
                .with_alias(Alias::Negated {
                    base: "Float64_continuous_input".to_owned(),
                }),
                ScalarVariable::new(
                    "Float64_continuous_output",
                    VR_CONTINUOUS_OUTPUT,
                    Output,
                    Continuous,
                    real(),
                ),
                ScalarVariable::new(
                    "Float64_discrete_input",
                    VR_DISCRETE_INPUT,
                    Input,
                    Discrete,
                    real(),
                ),
                ScalarVariable::new(
                    "Float64_discrete_output",
                    VR_DISCRETE_OUTPUT,
                    Output,
                    Discrete,
                    real(),
                ),
                ScalarVariable::new(
                    "Int32_input",
                    VR_INT_INPUT,
                    Input,
                    Discrete,
                    ScalarVariableElement::Integer(Integer { start: Some(0) }),
                ),
                ScalarVariable::new(
                    "Int32_output",
                    VR_INT_OUTPUT,
                    Output,
                    Discrete,
                    ScalarVariableElement::Integer(Integer::default()),
                ),
                ScalarVariable::new(
                    "Boolean_input",
                    VR_BOOL_INPUT,
                    Input,
                    Discrete,
                    ScalarVariableElement::Boolean(Boolean { start: Some(false) }),
                ),
                ScalarVariable::new(
                    "Boolean_output",
                    VR_BOOL_OUTPUT,
                    Output,
                    Discrete,
                    ScalarVariableElement::Boolean(Boolean::default()),
                ),
                ScalarVariable::new(
                    "Enumeration_input",
                    VR_ENUM_INPUT,
                    Input,
                    Discrete,
                    enumeration(),
                ),
                ScalarVariable::new(
                    "Enumeration_output",
                    VR_ENUM_OUTPUT,
                    Output,
                    Discrete,
                    enumeration(),
                ),
                ScalarVariable::new(
                    "String_parameter",
                    VR_STRING_PARAMETER,
                    Causality::Parameter,
                    Variability::Fixed,
                    ScalarVariableElement::String,
                ),
            ],
            model_exchange: Some(ModelExchangeCapabilities {
                model_identifier: "Feedthrough".to_owned(),
                completed_integrator_step_not_needed: true,
            }),
            co_simulation: Some(CoSimulationCapabilities {
                model_identifier: "Feedthrough".to_owned(),
                can_handle_variable_communication_step_size: true,
            }),
        }
    }

    fn get_real(&self, context: &ModelContext, vr: ValueReference) -> Result<f64, CapabilityError> {
        match vr {
            VR_TIME => Ok(context.time()),
            VR_CONTINUOUS_INPUT | VR_CONTINUOUS_OUTPUT => Ok(self.continuous_input),
            VR_DISCRETE_INPUT | VR_DISCRETE_OUTPUT => Ok(self.discrete_input),
            _ => Err(CapabilityError::Error),
        }
    }

    fn set_real(&mut self, vr: ValueReference, value: f64) -> Result<(), CapabilityError> {
        match vr {
            VR_CONTINUOUS_INPUT => self.continuous_input = value,
            VR_DISCRETE_INPUT => self.discrete_input = value,
            _ => return Err(CapabilityError::Error),
        }
        Ok(())
    }

    fn get_integer(&self, vr: ValueReference) -> Result<i32, CapabilityError> {
        match vr {
            VR_INT_INPUT | VR_INT_OUTPUT => Ok(self.int_input),
            VR_ENUM_INPUT | VR_ENUM_OUTPUT => Ok(self.enum_input),
            _ => Err(CapabilityError::Error),
        }
    }

    fn set_integer(&mut self, vr: ValueReference, value: i32) -> Result<(), CapabilityError> {
        match vr {
            VR_INT_INPUT => self.int_input = value,
            VR_ENUM_INPUT => self.enum_input = value,
            _ => return Err(CapabilityError::Error),
        }
        Ok(())
    }

    fn get_boolean(&self, vr: ValueReference) -> Result<bool, CapabilityError> {
        match vr {
            VR_BOOL_INPUT | VR_BOOL_OUTPUT => Ok(self.bool_input),
            _ => Err(CapabilityError::Error),
        }
    }

    fn set_boolean(&mut self, vr: ValueReference, value: bool) -> Result<(), CapabilityError> {
        match vr {
            VR_BOOL_INPUT => self.bool_input = value,
            _ => return Err(CapabilityError::Error),
        }
        Ok(())
    }

    fn get_string(&self, vr: ValueReference) -> Result<String, CapabilityError> {
        match vr {
            VR_STRING_PARAMETER => Ok(self.string_parameter.clone()),
            _ => Err(CapabilityError::Error),
        }
    }

    fn set_string(&mut self, vr: ValueReference, value: &str) -> Result<(), CapabilityError> {
        match vr {
            VR_STRING_PARAMETER => value.clone_into(&mut self.string_parameter),
            _ => return Err(CapabilityError::Error),
        }
        Ok(())
    }
}
