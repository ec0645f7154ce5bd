use std::sync::Arc;

use arrow::{
    array::{
        ArrayBuilder, ArrayRef, BooleanBuilder, Float64Builder, Int32Builder, StringBuilder,
    },
    datatypes::{DataType, Field, Schema},
    error::ArrowError,
    record_batch::RecordBatch,
};

use crate::{
    schema::{Causality, ModelDescription, ScalarVariable},
    traits::Common,
    value::Value,
    Error,
};

use super::params::SimParams;

/// Where in the stepping loop a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    /// After a completed step or after event handling.
    Regular,
    /// Before event handling, the left limit at an event.
    LeftLimit,
}

/// Receives the variable snapshots of a simulation run.
pub trait OutputSink {
    fn emit<C: Common>(&mut self, time: f64, inst: &mut C, snapshot: Snapshot)
        -> Result<(), Error>;
}

/// Limits the recorded rows to a budget of output points spread over `[start_time, stop_time]`.
#[derive(Debug)]
struct OutputThrottle {
    start_time: f64,
    stop_time: f64,
    max_points: usize,
    next_point: usize,
}

impl OutputThrottle {
    fn threshold(&self) -> f64 {
        self.start_time
            + (self.stop_time - self.start_time) * self.next_point as f64 / self.max_points as f64
    }

    fn admit(&mut self, time: f64) -> bool {
        if self.max_points == 0 || self.stop_time <= self.start_time {
            return true;
        }
        let tol = 1e-9 * self.start_time.abs().max(self.stop_time.abs()).max(1.0);
        if time + tol < self.threshold() && time < self.stop_time {
            return false;
        }
        while self.threshold() <= time + tol {
            self.next_point += 1;
        }
        true
    }
}

enum ColumnBuilder {
    Real(Float64Builder),
    Integer(Int32Builder),
    Boolean(BooleanBuilder),
    String(StringBuilder),
}

impl ColumnBuilder {
    fn new(data_type: &DataType, capacity: usize) -> Self {
        match data_type {
            DataType::Float64 => Self::Real(Float64Builder::with_capacity(capacity)),
            DataType::Boolean => Self::Boolean(BooleanBuilder::with_capacity(capacity)),
            DataType::Utf8 => Self::String(StringBuilder::new()),
            _ => Self::Integer(Int32Builder::with_capacity(capacity)),
        }
    }

    fn append(&mut self, value: Option<Value>) {
        match (self, value) {
            (Self::Real(b), Some(Value::Real(v))) => b.append_value(v),
            (Self::Integer(b), Some(Value::Integer(v) | Value::Enum(v))) => b.append_value(v),
            (Self::Boolean(b), Some(Value::Boolean(v))) => b.append_value(v),
            (Self::String(b), Some(Value::String(v))) => b.append_value(v),
            (Self::Real(b), _) => b.append_null(),
            (Self::Integer(b), _) => b.append_null(),
            (Self::Boolean(b), _) => b.append_null(),
            (Self::String(b), _) => b.append_null(),
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            Self::Real(b) => Arc::new(b.finish()),
            Self::Integer(b) => Arc::new(b.finish()),
            Self::Boolean(b) => Arc::new(b.finish()),
            Self::String(b) => Arc::new(b.finish()),
        }
    }
}

/// Records snapshots into Arrow arrays, one column per variable plus a leading `time` column.
pub struct Recorder {
    schema: Schema,
    variables: Vec<ScalarVariable>,
    time: Float64Builder,
    columns: Vec<ColumnBuilder>,
    throttle: OutputThrottle,
}

impl Recorder {
    pub fn new(md: &ModelDescription, params: &SimParams) -> Self {
        let variables: Vec<ScalarVariable> = md
            .model_variables
            .iter()
            .filter(|v| {
                if params.output_all_variables {
                    v.causality != Causality::Independent
                } else {
                    v.causality == Causality::Output
                }
            })
            .cloned()
            .collect();

        let capacity = match params.max_output_points {
            0 => ((params.stop_time - params.start_time) / params.step_size).ceil() as usize + 1,
            n => n + 1,
        };

        let fields = std::iter::once(Field::new("time", DataType::Float64, false))
            .chain(
                variables
                    .iter()
                    .map(|v| Field::new(&v.name, v.elem.data_type(), true)),
            )
            .collect::<Vec<_>>();
        let schema = Schema::new(fields);

        let columns = variables
            .iter()
            .map(|v| ColumnBuilder::new(&v.elem.data_type(), capacity))
            .collect();

        Self {
            schema,
            variables,
            time: Float64Builder::with_capacity(capacity),
            columns,
            throttle: OutputThrottle {
                start_time: params.start_time,
                stop_time: params.stop_time,
                max_points: params.max_output_points,
                next_point: 0,
            },
        }
    }

    pub fn num_rows(&self) -> usize {
        self.time.len()
    }

    /// Build the recorded rows into a [`RecordBatch`].
    pub fn finish(mut self) -> Result<RecordBatch, ArrowError> {
        let columns = std::iter::once(Arc::new(self.time.finish()) as ArrayRef)
            .chain(self.columns.iter_mut().map(ColumnBuilder::finish))
            .collect();
        RecordBatch::try_new(Arc::new(self.schema), columns)
    }
}

impl OutputSink for Recorder {
    fn emit<C: Common>(
        &mut self,
        time: f64,
        inst: &mut C,
        snapshot: Snapshot,
    ) -> Result<(), Error> {
        if snapshot == Snapshot::Regular && !self.throttle.admit(time) {
            return Ok(());
        }
        log::trace!("Recording {snapshot:?} values at t = {time}");

        self.time.append_value(time);
        for (var, column) in self.variables.iter().zip(self.columns.iter_mut()) {
            let value = match Value::read(inst, var) {
                Ok(value) => Some(value),
                Err(e) => {
                    log::warn!(
                        "Reading {} returned status {e} at t = {time}",
                        var.name
                    );
                    None
                }
            };
            column.append(value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle() {
        let mut throttle = OutputThrottle {
            start_time: 0.0,
            stop_time: 1.0,
            max_points: 4,
            next_point: 0,
        };
        let admitted: Vec<f64> = (0..=10)
            .map(|i| i as f64 * 0.1)
            .filter(|&t| throttle.admit(t))
            .collect();
        assert_eq!(admitted.len(), 5);
        assert_eq!(admitted[0], 0.0);
        assert_eq!(*admitted.last().unwrap(), 1.0);
    }

    #[test]
    fn test_throttle_late_start() {
        let mut throttle = OutputThrottle {
            start_time: 10.0,
            stop_time: 11.0,
            max_points: 4,
            next_point: 0,
        };
        let admitted: Vec<f64> = (0..=10)
            .map(|i| 10.0 + i as f64 * 0.1)
            .filter(|&t| throttle.admit(t))
            .collect();
        assert_eq!(admitted.len(), 5);
        assert_eq!(admitted[0], 10.0);
        assert_eq!(*admitted.last().unwrap(), 11.0);
    }

    #[test]
    fn test_unthrottled() {
        let mut throttle = OutputThrottle {
            start_time: 0.0,
            stop_time: 1.0,
            max_points: 0,
            next_point: 0,
        };
        assert!((0..100).all(|i| throttle.admit(i as f64 * 1e-3)));
    }
}
