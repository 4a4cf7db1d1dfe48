use crate::process::{date_parser, utils};
use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{Array, ArrayRef, StringArray, TimestampMicrosecondBuilder},
    compute::cast,
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Retype each of `columns` to `Timestamp(Microsecond)`.
///
/// Text columns are parsed value by value; date columns become midnight
/// timestamps and timestamp columns are only rescaled, so cleaning an already cleaned batch is a no-op. Nulls and
/// empty strings become null. Row count is never changed.
#[instrument(level = "info", skip(batch), fields(rows = batch.num_rows()))]
pub fn clean(batch: &RecordBatch, columns: &[String]) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut arrays: Vec<ArrayRef> = batch.columns().to_vec();

    for name in columns {
        let idx = schema
            .index_of(name)
            .map_err(|_| anyhow!("column {} is missing", name))?;

        let converted = to_timestamp_micros(&arrays[idx])
            .with_context(|| format!("converting column {}", name))?;
        debug!(column = %name, from = ?arrays[idx].data_type(), "retyped");

        fields[idx] = fields[idx]
            .clone()
            .with_data_type(converted.data_type().clone());
        arrays[idx] = converted;
    }

    let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    RecordBatch::try_new(schema, arrays).context("building cleaned record batch")
}

fn to_timestamp_micros(arr: &ArrayRef) -> Result<ArrayRef> {
    match arr.data_type() {
        DataType::Timestamp(TimeUnit::Microsecond, _) => Ok(arr.clone()),
        DataType::Timestamp(_, tz) => {
            let target = DataType::Timestamp(TimeUnit::Microsecond, tz.clone());
            cast(arr.as_ref(), &target).map_err(Into::into)
        }
        DataType::Date32 | DataType::Date64 => {
            let target = DataType::Timestamp(TimeUnit::Microsecond, None);
            cast(arr.as_ref(), &target).map_err(Into::into)
        }
        DataType::Utf8 => parse_strings(downcast_utf8(arr)?),
        DataType::LargeUtf8 | DataType::Utf8View => {
            let utf8 = cast(arr.as_ref(), &DataType::Utf8)?;
            parse_strings(downcast_utf8(&utf8)?)
        }
        other => bail!("expected text, date or timestamp values, found {:?}", other),
    }
}

fn downcast_utf8(arr: &ArrayRef) -> Result<&StringArray> {
    arr.as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("expected StringArray, got {:?}", arr.data_type()))
}

fn parse_strings(sarr: &StringArray) -> Result<ArrayRef> {
    let mut b = TimestampMicrosecondBuilder::with_capacity(sarr.len());
    for (row, opt) in sarr.iter().enumerate() {
        match opt.map(utils::clean_str) {
            None | Some("") => b.append_null(),
            Some(s) => {
                let ts = date_parser::parse_timestamp_micros(s)
                    .ok_or_else(|| anyhow!("unparseable datetime {:?} at row {}", s, row))?;
                b.append_value(ts);
            }
        }
    }
    Ok(Arc::new(b.finish()) as ArrayRef)
}
