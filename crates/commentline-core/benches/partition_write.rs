use std::sync::Arc;

use arrow::array::{RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use commentline_core::write_table;

fn synthetic_partition(n: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("identifier", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, true),
    ]));
    let ids = StringArray::from((0..n).map(|i| format!("id{i:09}")).collect::<Vec<_>>());
    let texts = StringArray::from(
        (0..n)
            .map(|i| format!("super video bro, comment number {i}"))
            .collect::<Vec<_>>(),
    );
    RecordBatch::try_new(schema, vec![Arc::new(ids), Arc::new(texts)]).unwrap()
}

#[divan::bench(args = [1, 3, 9])]
fn partition_write_zstd(bencher: divan::Bencher, zstd_level: i32) {
    // a full 100-identifier batch at the default 500-comment cap
    let batch = synthetic_partition(50_000);
    let dir = tempfile::tempdir().unwrap();
    let stem = dir.path().join("bench");
    bencher.bench(|| write_table(&stem, &batch, zstd_level).unwrap());
}

fn main() {
    divan::main();
}
