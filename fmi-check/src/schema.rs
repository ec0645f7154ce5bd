//! The queryable model-description catalog.
//!
//! This is the subset of an FMI 2.0 `modelDescription.xml` that the checker needs in order to
//! drive a model: the declared variables, the default experiment and the capability flags of the
//! two interfaces.

use std::fmt::Display;

/// Value reference of a declared variable.
pub type ValueReference = u32;

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub enum Causality {
    Parameter,
    CalculatedParameter,
    Input,
    Output,
    #[default]
    Local,
    Independent,
}

/// Enumeration that defines the time dependency of the variable, in other words it defines the
/// time instants when a variable can change its value.
///
/// The default is [`Variability::Continuous`].
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub enum Variability {
    /// The value of the variable never changes.
    Constant,
    /// The value of the variable is fixed after initialization.
    Fixed,
    /// The value of the variable is constant between external events (ModelExchange) and between
    /// Communication Points (CoSimulation).
    Tunable,
    /// * ModelExchange: The value of the variable is constant between external and internal
    ///   events (= time, state, step events defined implicitly in the FMU).
    /// * CoSimulation: By convention, the variable is from a "real" sampled data system and its
    ///   value is only changed at Communication Points.
    Discrete,
    /// Only a variable of type = "Real" can be "continuous".
    #[default]
    Continuous,
}

/// Alias relationship of a variable to the variable that owns its value reference.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub enum Alias {
    #[default]
    NoAlias,
    /// Identical to the named base variable.
    Alias { base: String },
    /// Identical to the negated value of the named base variable.
    Negated { base: String },
}

impl Alias {
    pub fn is_negated(&self) -> bool {
        matches!(self, Alias::Negated { .. })
    }
}

#[derive(Clone, Default, PartialEq, Debug)]
pub struct Real {
    /// Value before initialization.
    pub start: Option<f64>,
    /// If present, this variable is the derivative of the variable with this (1-based)
    /// ScalarVariable index.
    pub derivative: Option<usize>,
}

#[derive(Clone, Default, PartialEq, Debug)]
pub struct Integer {
    pub start: Option<i32>,
}

#[derive(Clone, Default, PartialEq, Debug)]
pub struct Boolean {
    pub start: Option<bool>,
}

#[derive(Clone, Default, PartialEq, Debug)]
pub struct Enumeration {
    pub start: Option<i32>,
    /// Declared items as `(value, name)` pairs.
    pub items: Vec<(i32, String)>,
}

/// The declared base type of a variable.
#[derive(Clone, PartialEq, Debug)]
pub enum ScalarVariableElement {
    Real(Real),
    Integer(Integer),
    Boolean(Boolean),
    String,
    Enumeration(Enumeration),
}

impl Default for ScalarVariableElement {
    fn default() -> Self {
        Self::Real(Real::default())
    }
}

impl ScalarVariableElement {
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarVariableElement::Real(_) => "Real",
            ScalarVariableElement::Integer(_) => "Integer",
            ScalarVariableElement::Boolean(_) => "Boolean",
            ScalarVariableElement::String => "String",
            ScalarVariableElement::Enumeration(_) => "Enumeration",
        }
    }

    pub fn data_type(&self) -> arrow::datatypes::DataType {
        match self {
            ScalarVariableElement::Real(_) => arrow::datatypes::DataType::Float64,
            ScalarVariableElement::Integer(_) => arrow::datatypes::DataType::Int32,
            ScalarVariableElement::Boolean(_) => arrow::datatypes::DataType::Boolean,
            ScalarVariableElement::String => arrow::datatypes::DataType::Utf8,
            ScalarVariableElement::Enumeration(_) => arrow::datatypes::DataType::Int32,
        }
    }
}

#[derive(Clone, Default, Debug)]
pub struct ScalarVariable {
    /// The full, unique name of the variable.
    pub name: String,

    /// A handle of the variable to efficiently identify the variable value in the model interface.
    pub value_reference: ValueReference,

    /// An optional description string describing the meaning of the variable.
    pub description: String,

    pub causality: Causality,

    pub variability: Variability,

    pub alias: Alias,

    pub elem: ScalarVariableElement,
}

impl ScalarVariable {
    pub fn new(
        name: impl Into<String>,
        value_reference: ValueReference,
        causality: Causality,
        variability: Variability,
        elem: ScalarVariableElement,
    ) -> Self {
        Self {
            name: name.into(),
            value_reference,
            causality,
            variability,
            elem,
            ..Default::default()
        }
    }

    pub fn with_alias(mut self, alias: Alias) -> Self {
        self.alias = alias;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Variables that may be set from an input file.
    pub fn is_settable_input(&self) -> bool {
        matches!(self.causality, Causality::Input | Causality::Parameter)
    }

    /// Name of the enumeration item declared for `value`, if any.
    pub fn enum_item_name(&self, value: i32) -> Option<&str> {
        match &self.elem {
            ScalarVariableElement::Enumeration(e) => e
                .items
                .iter()
                .find(|(v, _)| *v == value)
                .map(|(_, name)| name.as_str()),
            _ => None,
        }
    }
}

#[derive(Clone, Default, PartialEq, Debug)]
pub struct DefaultExperiment {
    pub start_time: Option<f64>,
    pub stop_time: Option<f64>,
    pub tolerance: Option<f64>,
    pub step_size: Option<f64>,
}

#[derive(Clone, Default, Debug)]
pub struct ModelExchangeCapabilities {
    pub model_identifier: String,
    pub completed_integrator_step_not_needed: bool,
}

#[derive(Clone, Default, Debug)]
pub struct CoSimulationCapabilities {
    pub model_identifier: String,
    pub can_handle_variable_communication_step_size: bool,
}

#[derive(Clone, Default, Debug)]
pub struct ModelDescription {
    pub fmi_version: String,
    pub model_name: String,
    pub guid: String,
    pub description: String,
    pub number_of_event_indicators: usize,
    pub default_experiment: Option<DefaultExperiment>,
    pub model_variables: Vec<ScalarVariable>,
    pub model_exchange: Option<ModelExchangeCapabilities>,
    pub co_simulation: Option<CoSimulationCapabilities>,
}

impl ModelDescription {
    pub fn variable_by_name(&self, name: &str) -> Option<&ScalarVariable> {
        self.model_variables.iter().find(|v| v.name == name)
    }

    /// The derivative variables paired with the state each one is the derivative of.
    ///
    /// Fails with the name of the first derivative whose `derivative` index does not resolve.
    pub fn continuous_states(&self) -> Result<Vec<(&ScalarVariable, &ScalarVariable)>, String> {
        self.model_variables
            .iter()
            .filter_map(|der| match &der.elem {
                ScalarVariableElement::Real(Real {
                    derivative: Some(idx),
                    ..
                }) => Some(
                    idx.checked_sub(1)
                        .and_then(|i| self.model_variables.get(i))
                        .map(|state| (state, der))
                        .ok_or_else(|| der.name.clone()),
                ),
                _ => None,
            })
            .collect()
    }

    pub fn number_of_continuous_states(&self) -> usize {
        self.model_variables
            .iter()
            .filter(|v| matches!(v.elem, ScalarVariableElement::Real(Real { derivative: Some(_), .. })))
            .count()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &ScalarVariable> {
        self.model_variables
            .iter()
            .filter(|v| v.causality == Causality::Output)
    }

    pub fn has_inputs(&self) -> bool {
        self.model_variables
            .iter()
            .any(|v| v.causality == Causality::Input)
    }
}

/// Collects counts of variables in the model
#[derive(Debug, Default, PartialEq)]
pub struct Counts {
    pub num_constants: usize,
    pub num_parameters: usize,
    pub num_discrete: usize,
    pub num_continuous: usize,
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub num_local: usize,
    pub num_independent: usize,
    pub num_calculated_parameters: usize,
    pub num_real_vars: usize,
    pub num_integer_vars: usize,
    pub num_enum_vars: usize,
    pub num_bool_vars: usize,
    pub num_string_vars: usize,
}

impl Display for Counts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable Counts")
            .field("Constants", &self.num_constants)
            .field("Parameters", &self.num_parameters)
            .field("Discrete", &self.num_discrete)
            .field("Continuous", &self.num_continuous)
            .field("Inputs", &self.num_inputs)
            .field("Outputs", &self.num_outputs)
            .field("Local", &self.num_local)
            .field("Independent", &self.num_independent)
            .field("Calculated parameters", &self.num_calculated_parameters)
            .field("Real", &self.num_real_vars)
            .field("Integer", &self.num_integer_vars)
            .field("Enumeration", &self.num_enum_vars)
            .field("Boolean", &self.num_bool_vars)
            .field("String", &self.num_string_vars)
            .finish()
    }
}

pub trait VariableCounts {
    fn model_counts(&self) -> Counts;
}

impl VariableCounts for [ScalarVariable] {
    fn model_counts(&self) -> Counts {
        self.iter().fold(Counts::default(), |mut cts, sv| {
            match sv.variability {
                Variability::Constant => cts.num_constants += 1,
                Variability::Fixed | Variability::Tunable => cts.num_parameters += 1,
                Variability::Discrete => cts.num_discrete += 1,
                Variability::Continuous => cts.num_continuous += 1,
            }
            match sv.causality {
                Causality::CalculatedParameter => cts.num_calculated_parameters += 1,
                Causality::Parameter => {}
                Causality::Input => cts.num_inputs += 1,
                Causality::Output => cts.num_outputs += 1,
                Causality::Local => cts.num_local += 1,
                Causality::Independent => cts.num_independent += 1,
            }
            match sv.elem {
                ScalarVariableElement::Real(_) => cts.num_real_vars += 1,
                ScalarVariableElement::Integer(_) => cts.num_integer_vars += 1,
                ScalarVariableElement::Enumeration(_) => cts.num_enum_vars += 1,
                ScalarVariableElement::Boolean(_) => cts.num_bool_vars += 1,
                ScalarVariableElement::String => cts.num_string_vars += 1,
            }
            cts
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md() -> ModelDescription {
        ModelDescription {
            model_variables: vec![
                ScalarVariable::new(
                    "time",
                    0,
                    Causality::Independent,
                    Variability::Continuous,
                    ScalarVariableElement::Real(Real::default()),
                ),
                ScalarVariable::new(
                    "h",
                    1,
                    Causality::Output,
                    Variability::Continuous,
                    ScalarVariableElement::Real(Real::default()),
                ),
                ScalarVariable::new(
                    "der(h)",
                    2,
                    Causality::Local,
                    Variability::Continuous,
                    ScalarVariableElement::Real(Real {
                        derivative: Some(2),
                        ..Default::default()
                    }),
                ),
                ScalarVariable::new(
                    "mode",
                    3,
                    Causality::Parameter,
                    Variability::Fixed,
                    ScalarVariableElement::Enumeration(Enumeration {
                        start: Some(1),
                        items: vec![(1, "fast".to_owned()), (2, "slow".to_owned())],
                    }),
                ),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_continuous_states() {
        let md = md();
        let states = md.continuous_states().unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].0.name, "h");
        assert_eq!(states[0].1.name, "der(h)");
        assert_eq!(md.number_of_continuous_states(), 1);
    }

    #[test]
    fn test_dangling_derivative() {
        let mut md = md();
        md.model_variables[2].elem = ScalarVariableElement::Real(Real {
            derivative: Some(42),
            ..Default::default()
        });
        assert_eq!(md.continuous_states().unwrap_err(), "der(h)");
    }

    #[test]
    fn test_counts() {
        let counts = md().model_variables.model_counts();
        assert_eq!(counts.num_parameters, 1);
        assert_eq!(counts.num_outputs, 1);
        assert_eq!(counts.num_real_vars, 3);
        assert_eq!(counts.num_enum_vars, 1);
    }

    #[test]
    fn test_enum_items() {
        let md = md();
        let mode = md.variable_by_name("mode").unwrap();
        assert_eq!(mode.enum_item_name(2), Some("slow"));
        assert_eq!(mode.enum_item_name(3), None);
        assert!(mode.is_settable_input());
        assert!(!md.variable_by_name("h").unwrap().is_settable_input());
    }
}
