use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, AsArray},
    compute::{cast, concat_batches},
    csv::{reader::Format, ReaderBuilder},
    datatypes::{DataType, Field, Float64Type, Int32Type, Schema},
    error::ArrowError,
};

use crate::schema::ModelDescription;

use super::{Bucket, InputData, ParseError, TimeSeries, VariableCatalog};

fn header_error(msg: &str) -> ParseError {
    ParseError::MalformedHeader(msg.to_owned())
}

/// Line structure of an input file, determined before the text is handed to the CSV decoder.
#[derive(Debug)]
struct Layout {
    sep: u8,
    /// Byte length of the header including its line break.
    header_len: usize,
    /// Source line number of the first line after the header.
    first_data_line: usize,
    /// Source line number of every non-empty line after the header.
    data_lines: Vec<usize>,
}

impl Layout {
    /// Source line of the data record `row`.
    fn line(&self, row: usize) -> usize {
        self.data_lines
            .get(row)
            .copied()
            .unwrap_or(self.first_data_line + row)
    }

    /// Translate a decoder error that names a record into a row error.
    fn row_error(&self, err: ArrowError) -> ParseError {
        if let ArrowError::CsvError(msg) = &err {
            let record = msg
                .strip_prefix("incorrect number of fields for line ")
                .and_then(|rest| rest.split(|c: char| !c.is_ascii_digit()).next())
                .and_then(|n| n.parse::<usize>().ok());
            if let Some(record) = record {
                // the decoder counts the header as record 1
                return ParseError::MalformedRow {
                    line: self.line(record.saturating_sub(2)),
                    reason: "number of values does not match the header",
                };
            }
        }
        ParseError::Csv(err)
    }
}

/// Find the separator, the extent of the header and the data lines.
///
/// The separator is the character following `time`. Line breaks are `\n` or `\r\n`.
fn scan(text: &str) -> Result<Layout, ParseError> {
    let bytes = text.as_bytes();
    let after_time = bytes
        .strip_prefix(b"time")
        .or_else(|| bytes.strip_prefix(b"\"time\""))
        .ok_or_else(|| header_error("first column must be 'time'"))?;

    let sep = match after_time.first() {
        None => return Err(header_error("unexpected end of file after 'time'")),
        Some(b'\n' | b'\r') => b',',
        Some(&c) if c.is_ascii() && c != b'"' => c,
        Some(_) => return Err(header_error("separator must be a single ASCII character")),
    };

    let mut quoted = false;
    let header_len = bytes
        .iter()
        .position(|&c| {
            if c == b'"' {
                quoted = !quoted;
            }
            c == b'\n' && !quoted
        })
        .map(|end| end + 1)
        .ok_or_else(|| header_error("header is not terminated by a line break"))?;

    let lone_cr = text
        .match_indices('\r')
        .map(|(pos, _)| pos)
        .find(|&pos| bytes.get(pos + 1) != Some(&b'\n'));
    if let Some(pos) = lone_cr {
        if pos < header_len {
            return Err(header_error("carriage return not followed by line feed"));
        }
        return Err(ParseError::MalformedRow {
            line: bytes[..pos].iter().filter(|&&c| c == b'\n').count() + 1,
            reason: "carriage return not followed by line feed",
        });
    }

    let first_data_line = bytes[..header_len].iter().filter(|&&c| c == b'\n').count() + 1;
    let data_lines = (first_data_line..)
        .zip(text[header_len..].split('\n'))
        .filter(|(_, line)| !line.trim_end_matches('\r').is_empty())
        .map(|(line, _)| line)
        .collect();

    Ok(Layout {
        sep,
        header_len,
        first_data_line,
        data_lines,
    })
}

/// Scan the file and read the column names after `time`.
fn header(text: &str) -> Result<(Layout, Vec<String>), ParseError> {
    let layout = scan(text)?;
    let (schema, _) = Format::default()
        .with_header(true)
        .with_delimiter(layout.sep)
        .infer_schema(&text.as_bytes()[..layout.header_len], Some(0))
        .map_err(|e| ParseError::MalformedHeader(e.to_string()))?;

    let mut names = schema.fields().iter().map(|f| f.name().clone());
    if names.next().as_deref() != Some("time") {
        return Err(header_error("first column must be 'time'"));
    }
    Ok((layout, names.collect()))
}

/// Arrow type a column of the given bucket is converted to. Booleans are read as integers so that
/// only `0` and `1` are accepted.
fn column_type(bucket: Bucket) -> DataType {
    match bucket {
        Bucket::Real => DataType::Float64,
        Bucket::Integer | Bucket::Boolean => DataType::Int32,
    }
}

pub(super) fn parse(text: &str, md: &ModelDescription) -> Result<InputData, ParseError> {
    let (layout, names) = header(text)?;
    let catalog = VariableCatalog::from_names(md, &names)?;
    log::debug!(
        "Input file has {} columns ({} real, {} integer, {} boolean), separator '{}'",
        names.len(),
        catalog.real_inputs().len(),
        catalog.integer_inputs().len(),
        catalog.boolean_inputs().len(),
        layout.sep as char,
    );

    // Decode every column as text first, so that a bad value is reported with its row and
    // variable instead of failing the whole batch.
    let fields = std::iter::once("time")
        .chain(names.iter().map(String::as_str))
        .map(|name| Field::new(name, DataType::Utf8, true))
        .collect::<Vec<_>>();
    let schema = Arc::new(Schema::new(fields));

    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_delimiter(layout.sep)
        .with_truncated_rows(true)
        .build(text.as_bytes())?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| layout.row_error(e))?;
    let batch = concat_batches(&schema, &batches)?;

    let times = cast(batch.column(0), &DataType::Float64)?;
    let times = times.as_primitive::<Float64Type>();
    let columns = catalog
        .columns()
        .iter()
        .enumerate()
        .map(|(i, (_, bucket, _))| cast(batch.column(i + 1), &column_type(*bucket)))
        .collect::<Result<Vec<ArrayRef>, _>>()?;

    let mut series = TimeSeries::default();
    for row in 0..batch.num_rows() {
        let line = layout.line(row);
        if times.is_null(row) {
            return Err(ParseError::MalformedRow {
                line,
                reason: "could not read time value",
            });
        }
        let time = times.value(row);

        if let Some(previous) = series.last_time() {
            if time < previous {
                return Err(ParseError::TimeNotMonotonic {
                    line,
                    time,
                    previous,
                });
            }
        }

        let mut reals = vec![0.0; catalog.real_inputs().len()];
        let mut integers = vec![0; catalog.integer_inputs().len()];
        let mut booleans = vec![false; catalog.boolean_inputs().len()];

        for ((var, bucket, index), column) in catalog.columns().iter().zip(&columns) {
            let row_error = || ParseError::DataRowError {
                line,
                time,
                variable: var.name.clone(),
            };
            if column.is_null(row) {
                return Err(row_error());
            }
            match bucket {
                Bucket::Real => reals[*index] = column.as_primitive::<Float64Type>().value(row),
                Bucket::Integer => {
                    integers[*index] = column.as_primitive::<Int32Type>().value(row)
                }
                Bucket::Boolean => {
                    booleans[*index] = match column.as_primitive::<Int32Type>().value(row) {
                        0 => false,
                        1 => true,
                        _ => return Err(row_error()),
                    }
                }
            }
        }

        series.push(time, reals, integers, booleans);
    }

    log::info!(
        "Read {} input samples{}",
        series.len(),
        series
            .first_time()
            .zip(series.last_time())
            .map(|(t0, t1)| format!(" from t = {t0} to t = {t1}"))
            .unwrap_or_default()
    );

    Ok(InputData { series, catalog })
}
