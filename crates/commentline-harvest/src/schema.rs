//! Arrow schema for comment records and conversions to/from record batches

use std::sync::{Arc, LazyLock};

use arrow::array::{Array, ArrayRef, RecordBatch, StringArray, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::classify::Category;
use crate::identifier::Identifier;

/// One harvested comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub identifier: Identifier,
    pub text: String,
    pub category: Category,
    pub capture_time: DateTime<Utc>,
}

// `text` is nullable: CSV reads an empty field back as null.
static RECORDS: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("identifier", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, true),
        Field::new("category", DataType::Utf8, false),
        Field::new("capture_time", DataType::Utf8, false),
    ]))
});

pub fn records_schema() -> SchemaRef {
    RECORDS.clone()
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Columnar builder for [`Record`]s
pub struct RecordAccumulator {
    identifier: StringBuilder,
    text: StringBuilder,
    category: StringBuilder,
    capture_time: StringBuilder,
    len: usize,
}

impl Default for RecordAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordAccumulator {
    pub fn new() -> Self {
        Self {
            identifier: StringBuilder::new(),
            text: StringBuilder::new(),
            category: StringBuilder::new(),
            capture_time: StringBuilder::new(),
            len: 0,
        }
    }

    pub fn push(&mut self, record: &Record) {
        self.identifier.append_value(record.identifier.as_str());
        self.text.append_value(&record.text);
        self.category.append_value(record.category.as_str());
        self.capture_time.append_value(format_time(&record.capture_time));
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drain the builders into a batch
    pub fn take_batch(&mut self) -> Result<RecordBatch, ArrowError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(self.identifier.finish()),
            Arc::new(self.text.finish()),
            Arc::new(self.category.finish()),
            Arc::new(self.capture_time.finish()),
        ];
        self.len = 0;
        RecordBatch::try_new(records_schema(), columns)
    }
}

pub fn records_to_batch<'a>(
    records: impl IntoIterator<Item = &'a Record>,
) -> Result<RecordBatch, ArrowError> {
    let mut acc = RecordAccumulator::new();
    for r in records {
        acc.push(r);
    }
    acc.take_batch()
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, ArrowError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ArrowError::SchemaError(format!("missing column {name}")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| ArrowError::SchemaError(format!("column {name} is not Utf8")))
}

/// Decode a batch read back from a partition. Null text decodes as empty.
pub fn records_from_batch(batch: &RecordBatch) -> Result<Vec<Record>, ArrowError> {
    let identifier = string_column(batch, "identifier")?;
    let text = string_column(batch, "text")?;
    let category = string_column(batch, "category")?;
    let capture_time = string_column(batch, "capture_time")?;

    let invalid = |row: usize, what: &str, value: &str| {
        ArrowError::InvalidArgumentError(format!("row {row}: invalid {what} {value:?}"))
    };

    let mut out = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let id = identifier.value(row);
        let cat = category.value(row);
        let time = capture_time.value(row);
        out.push(Record {
            identifier: Identifier::parse(id).ok_or_else(|| invalid(row, "identifier", id))?,
            text: if text.is_null(row) {
                String::new()
            } else {
                text.value(row).to_string()
            },
            category: Category::from_name(cat).ok_or_else(|| invalid(row, "category", cat))?,
            capture_time: DateTime::parse_from_rfc3339(time)
                .map_err(|_| invalid(row, "capture_time", time))?
                .with_timezone(&Utc),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, text: &str, category: Category) -> Record {
        Record {
            identifier: Identifier::parse(id).unwrap(),
            text: text.into(),
            category,
            capture_time: DateTime::parse_from_rfc3339("2026-10-18T08:30:00.250Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn batch_has_schema_columns() {
        let batch = records_to_batch(&[record("AAAAAAAAAAA", "nalla", Category::CodeMixed)]).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.schema(), records_schema());
        let time = string_column(&batch, "capture_time").unwrap().value(0);
        assert_eq!(time, "2026-10-18T08:30:00.250Z");
    }

    #[test]
    fn decode_restores_records() {
        let records = vec![
            record("AAAAAAAAAAA", "nalla video bro", Category::CodeMixed),
            record("BBBBBBBBBBB", "", Category::Empty),
        ];
        let batch = records_to_batch(&records).unwrap();
        assert_eq!(records_from_batch(&batch).unwrap(), records);
    }

    #[test]
    fn decode_rejects_unknown_category() {
        let batch = RecordBatch::try_new(
            records_schema(),
            vec![
                Arc::new(StringArray::from(vec!["AAAAAAAAAAA"])),
                Arc::new(StringArray::from(vec!["x"])),
                Arc::new(StringArray::from(vec!["weird"])),
                Arc::new(StringArray::from(vec!["2026-10-18T08:30:00Z"])),
            ],
        )
        .unwrap();
        let err = records_from_batch(&batch).unwrap_err();
        assert!(err.to_string().contains("category"));
    }

    #[test]
    fn null_text_decodes_as_empty() {
        let batch = RecordBatch::try_new(
            records_schema(),
            vec![
                Arc::new(StringArray::from(vec!["AAAAAAAAAAA"])),
                Arc::new(StringArray::from(vec![None::<&str>])),
                Arc::new(StringArray::from(vec!["empty"])),
                Arc::new(StringArray::from(vec!["2026-10-18T08:30:00Z"])),
            ],
        )
        .unwrap();
        assert_eq!(records_from_batch(&batch).unwrap()[0].text, "");
    }

    #[test]
    fn accumulator_resets_after_take() {
        let mut acc = RecordAccumulator::new();
        acc.push(&record("AAAAAAAAAAA", "a", Category::Plain));
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.take_batch().unwrap().num_rows(), 1);
        assert!(acc.is_empty());
        assert_eq!(acc.take_batch().unwrap().num_rows(), 0);
    }
}
