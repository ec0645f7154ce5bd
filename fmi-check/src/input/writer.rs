use std::{io::Write, sync::Arc};

use arrow::{
    array::{ArrayRef, Float64Array, Int32Array},
    csv::WriterBuilder,
    datatypes::{DataType, Field, Schema},
    error::ArrowError,
    record_batch::RecordBatch,
};

use super::{Bucket, InputData};

/// Collect the samples into a batch with one column per header entry. Booleans become `0` / `1`.
fn input_batch(data: &InputData) -> Result<RecordBatch, ArrowError> {
    let series = &data.series;
    let rows = 0..series.len();

    let mut fields = vec![Field::new("time", DataType::Float64, false)];
    let mut columns: Vec<ArrayRef> =
        vec![Arc::new(Float64Array::from(series.timestamps().to_vec()))];

    for (var, bucket, index) in data.catalog.columns() {
        let column: ArrayRef = match bucket {
            Bucket::Real => Arc::new(Float64Array::from_iter_values(
                rows.clone().map(|row| series.real_row(row)[*index]),
            )),
            Bucket::Integer => Arc::new(Int32Array::from_iter_values(
                rows.clone().map(|row| series.integer_row(row)[*index]),
            )),
            Bucket::Boolean => Arc::new(Int32Array::from_iter_values(
                rows.clone()
                    .map(|row| i32::from(series.boolean_row(row)[*index])),
            )),
        };
        fields.push(Field::new(&var.name, column.data_type().clone(), false));
        columns.push(column);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
}

/// Write `data` in the input file format, so that reading it back yields the same samples.
pub fn write_input_file<W: Write>(data: &InputData, w: W, sep: char) -> Result<(), ArrowError> {
    let delimiter = u8::try_from(sep)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| {
            ArrowError::InvalidArgumentError(format!("separator '{sep}' is not an ASCII character"))
        })?;

    let batch = input_batch(data)?;
    let mut writer = WriterBuilder::new().with_delimiter(delimiter).build(w);
    writer.write(&batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{feedthrough::Feedthrough, UserModel};

    #[test]
    fn test_write() {
        let md = Feedthrough::model_description();
        let data = InputData::from_text(
            "time;Boolean_input;Float64_continuous_input\n0;1;0.5\n2;0;-1\n",
            &md,
        )
        .unwrap();

        let mut out = Vec::new();
        write_input_file(&data, &mut out, '\t').unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("time\tBoolean_input\tFloat64_continuous_input")
        );
        let first = lines.next().unwrap().split('\t').collect::<Vec<_>>();
        assert_eq!(first[1], "1");
        assert_eq!(first[2].parse::<f64>().unwrap(), 0.5);
        assert_eq!(lines.count(), 1);

        assert!(write_input_file(&data, Vec::new(), 'ä').is_err());
    }
}
