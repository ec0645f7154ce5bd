//! Time-series input data read from a delimited text file.
//!
//! The file has a header row naming model variables, the first column being `time`, and one row
//! per sample. [`InputData`] holds the immutable [`TimeSeries`] together with the
//! [`VariableCatalog`] describing its columns; both are shared read-only by every simulation run
//! of a model, while each run keeps its own [`interpolation::InterpolationState`] and
//! [`events::EventScanState`] cursors.

use std::path::Path;

use crate::schema::{ModelDescription, ScalarVariable, ScalarVariableElement, Variability};

pub mod events;
pub mod interpolation;
mod reader;
mod writer;

pub use writer::write_input_file;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Could not read input file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed input file header: {0}")]
    MalformedHeader(String),

    #[error("Variable '{name}' cannot be used as input: {reason}")]
    InvalidInputVariable { name: String, reason: &'static str },

    #[error("Variable '{name}' of type {base_type} is not supported in input files")]
    UnsupportedInputType {
        name: String,
        base_type: &'static str,
    },

    #[error("Could not read value of variable '{variable}' at line {line} (time {time})")]
    DataRowError {
        line: usize,
        time: f64,
        variable: String,
    },

    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: &'static str },

    #[error("Time {time} at line {line} is smaller than the previous time {previous}")]
    TimeNotMonotonic {
        line: usize,
        time: f64,
        previous: f64,
    },

    #[error("Could not decode input data: {0}")]
    Csv(#[from] arrow::error::ArrowError),
}

/// Which row store a column of the input file lands in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bucket {
    Real,
    Integer,
    Boolean,
}

/// Describes the columns of an input file in terms of model variables.
#[derive(Clone, Debug, Default)]
pub struct VariableCatalog {
    /// Every input column, in file order, with its bucket and position within that bucket.
    all_inputs: Vec<(ScalarVariable, Bucket, usize)>,
    real_inputs: Vec<ScalarVariable>,
    /// Positions within `real_inputs` of the continuous reals.
    continuous_reals: Vec<usize>,
    /// Positions within `real_inputs` of the reals that only change at events.
    discrete_reals: Vec<usize>,
    integer_inputs: Vec<ScalarVariable>,
    boolean_inputs: Vec<ScalarVariable>,
}

impl VariableCatalog {
    /// Resolve the header names against the model's declared variables.
    pub fn from_names<S: AsRef<str>>(
        md: &ModelDescription,
        names: &[S],
    ) -> Result<Self, ParseError> {
        let mut catalog = Self::default();
        for name in names {
            let name = name.as_ref();
            let var = md
                .variable_by_name(name)
                .ok_or_else(|| ParseError::InvalidInputVariable {
                    name: name.to_owned(),
                    reason: "no such variable in the model description",
                })?;
            if !var.is_settable_input() {
                return Err(ParseError::InvalidInputVariable {
                    name: name.to_owned(),
                    reason: "only parameters and inputs can be set",
                });
            }
            catalog.push(var.clone())?;
        }
        Ok(catalog)
    }

    fn push(&mut self, var: ScalarVariable) -> Result<(), ParseError> {
        let (bucket, index) = match var.elem {
            ScalarVariableElement::Real(_) => {
                let index = self.real_inputs.len();
                if var.variability == Variability::Continuous {
                    self.continuous_reals.push(index);
                } else {
                    self.discrete_reals.push(index);
                }
                self.real_inputs.push(var.clone());
                (Bucket::Real, index)
            }
            ScalarVariableElement::Integer(_) | ScalarVariableElement::Enumeration(_) => {
                self.integer_inputs.push(var.clone());
                (Bucket::Integer, self.integer_inputs.len() - 1)
            }
            ScalarVariableElement::Boolean(_) => {
                self.boolean_inputs.push(var.clone());
                (Bucket::Boolean, self.boolean_inputs.len() - 1)
            }
            ScalarVariableElement::String => {
                return Err(ParseError::UnsupportedInputType {
                    base_type: var.elem.type_name(),
                    name: var.name,
                })
            }
        };
        self.all_inputs.push((var, bucket, index));
        Ok(())
    }

    pub fn all_inputs(&self) -> impl ExactSizeIterator<Item = &ScalarVariable> {
        self.all_inputs.iter().map(|(var, _, _)| var)
    }

    pub(crate) fn columns(&self) -> &[(ScalarVariable, Bucket, usize)] {
        &self.all_inputs
    }

    pub fn real_inputs(&self) -> &[ScalarVariable] {
        &self.real_inputs
    }

    pub fn continuous_reals(&self) -> &[usize] {
        &self.continuous_reals
    }

    pub fn discrete_reals(&self) -> &[usize] {
        &self.discrete_reals
    }

    pub fn integer_inputs(&self) -> &[ScalarVariable] {
        &self.integer_inputs
    }

    pub fn boolean_inputs(&self) -> &[ScalarVariable] {
        &self.boolean_inputs
    }

    pub fn is_empty(&self) -> bool {
        self.all_inputs.is_empty()
    }
}

/// Time-ordered samples, one row per timestamp in each of the three type buckets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeSeries {
    timestamps: Vec<f64>,
    real_rows: Vec<Vec<f64>>,
    integer_rows: Vec<Vec<i32>>,
    boolean_rows: Vec<Vec<bool>>,
}

impl TimeSeries {
    /// Append a sample. The caller guarantees `time` is not smaller than the last timestamp.
    pub fn push(&mut self, time: f64, reals: Vec<f64>, integers: Vec<i32>, booleans: Vec<bool>) {
        debug_assert!(self.last_time().map_or(true, |last| last <= time));
        self.timestamps.push(time);
        self.real_rows.push(reals);
        self.integer_rows.push(integers);
        self.boolean_rows.push(booleans);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn first_time(&self) -> Option<f64> {
        self.timestamps.first().copied()
    }

    pub fn last_time(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }

    pub fn real_row(&self, index: usize) -> &[f64] {
        &self.real_rows[index]
    }

    pub fn integer_row(&self, index: usize) -> &[i32] {
        &self.integer_rows[index]
    }

    pub fn boolean_row(&self, index: usize) -> &[bool] {
        &self.boolean_rows[index]
    }
}

/// The parsed contents of an input file.
#[derive(Clone, Debug, Default)]
pub struct InputData {
    pub series: TimeSeries,
    pub catalog: VariableCatalog,
}

impl InputData {
    /// No input file: every apply call is a no-op.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_path<P: AsRef<Path>>(path: P, md: &ModelDescription) -> Result<Self, ParseError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Reading input file {}", path.as_ref().display());
        Self::from_text(&text, md)
    }

    /// Parse the contents of an input file.
    pub fn from_text(text: &str, md: &ModelDescription) -> Result<Self, ParseError> {
        reader::parse(text, md)
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// `true` if rows `k` and `k + 1` differ in any value that only changes at events.
    pub fn discrete_change(&self, k: usize) -> bool {
        let s = &self.series;
        s.boolean_rows[k] != s.boolean_rows[k + 1]
            || s.integer_rows[k] != s.integer_rows[k + 1]
            || self
                .catalog
                .discrete_reals
                .iter()
                .any(|&i| s.real_rows[k][i] != s.real_rows[k + 1][i])
    }
}
