use arrow::datatypes::{DataType, Field, Schema};

pub fn audits_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("url", DataType::Utf8, false),
        Field::new("query", DataType::Utf8, true),
        Field::new("status", DataType::Utf8, false),
        Field::new("overall_score", DataType::Int64, true),
        Field::new("query_fit_score", DataType::Int64, true),
        Field::new("module_scores_json", DataType::Utf8, true),
        Field::new("error", DataType::Utf8, true),
        Field::new("created_at", DataType::Utf8, false),
        Field::new("created_at_ms", DataType::Int64, false),
    ])
}
