use crate::{arrow_schemas, Db, StoreError};
use arrow::array::{ArrayRef, Int64Builder, StringBuilder};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use rusqlite::Row;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const CHUNK: usize = 10_000;

impl Db {
    /// Write every audit row to a ZSTD-compressed Parquet file, oldest first.
    /// Returns the number of rows written.
    pub fn export_audits_parquet(&self, out: &Path) -> Result<usize, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id,url,query,status,overall_score,query_fit_score,module_scores_json,error,created_at,created_at_ms
             FROM audits ORDER BY created_at_ms, id",
        )?;
        let mut rows = stmt.query([])?;

        let schema = Arc::new(arrow_schemas::audits_schema());
        let props = WriterProperties::builder().set_compression(Compression::ZSTD(ZstdLevel::default())).build();
        let file = std::fs::File::create(out)?;
        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

        let mut total = 0;
        loop {
            let mut batch = AuditBatch::default();
            while batch.len < CHUNK {
                let Some(row) = rows.next()? else { break };
                batch.push(row)?;
            }
            if batch.len == 0 {
                break;
            }
            total += batch.len;
            let rb = RecordBatch::try_new(schema.clone(), batch.finish())?;
            writer.write(&rb)?;
        }

        writer.close()?;
        info!(rows = total, path = %out.display(), "exported audits to parquet");
        Ok(total)
    }
}

#[derive(Default)]
struct AuditBatch {
    len: usize,
    id: StringBuilder,
    url: StringBuilder,
    query: StringBuilder,
    status: StringBuilder,
    overall_score: Int64Builder,
    query_fit_score: Int64Builder,
    module_scores: StringBuilder,
    error: StringBuilder,
    created_at: StringBuilder,
    created_at_ms: Int64Builder,
}

impl AuditBatch {
    fn push(&mut self, row: &Row) -> Result<(), StoreError> {
        self.id.append_value(row.get::<_, String>(0)?);
        self.url.append_value(row.get::<_, String>(1)?);
        self.query.append_option(row.get::<_, Option<String>>(2)?);
        self.status.append_value(row.get::<_, String>(3)?);
        self.overall_score.append_option(row.get::<_, Option<i64>>(4)?);
        self.query_fit_score.append_option(row.get::<_, Option<i64>>(5)?);
        self.module_scores.append_option(row.get::<_, Option<String>>(6)?);
        self.error.append_option(row.get::<_, Option<String>>(7)?);
        self.created_at.append_value(row.get::<_, String>(8)?);
        self.created_at_ms.append_value(row.get::<_, i64>(9)?);
        self.len += 1;
        Ok(())
    }

    fn finish(mut self) -> Vec<ArrayRef> {
        vec![
            Arc::new(self.id.finish()),
            Arc::new(self.url.finish()),
            Arc::new(self.query.finish()),
            Arc::new(self.status.finish()),
            Arc::new(self.overall_score.finish()),
            Arc::new(self.query_fit_score.finish()),
            Arc::new(self.module_scores.finish()),
            Arc::new(self.error.finish()),
            Arc::new(self.created_at.finish()),
            Arc::new(self.created_at_ms.finish()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use crate::Db;
    use arrow::array::{Array, Int64Array, StringArray};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    #[test]
    fn exports_every_audit() {
        let db = Db::open_in_memory().unwrap();
        let a = db.create_audit("https://example.com/a", Some("what is aeo")).unwrap();
        db.create_audit("https://example.com/b", None).unwrap();
        db.mark_processing(&a.id).unwrap();
        db.fail_audit(&a.id, "fetch timed out").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("audits.parquet");
        assert_eq!(db.export_audits_parquet(&out).unwrap(), 2);

        let file = std::fs::File::open(&out).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file).unwrap().build().unwrap();
        let batches: Vec<_> = reader.map(|b| b.unwrap()).collect();
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 2);

        let b = &batches[0];
        let urls = b.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        let mut got: Vec<&str> = (0..urls.len()).map(|i| urls.value(i)).collect();
        got.sort_unstable();
        assert_eq!(got, vec!["https://example.com/a", "https://example.com/b"]);
        let scores = b.column(4).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(scores.null_count(), 2);
    }

    #[test]
    fn empty_store_writes_a_valid_file() {
        let db = Db::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("empty.parquet");
        assert_eq!(db.export_audits_parquet(&out).unwrap(), 0);
        let file = std::fs::File::open(&out).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        assert_eq!(builder.schema().fields().len(), 10);
    }
}
