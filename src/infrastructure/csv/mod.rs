// ============================================================
// CSV INFRASTRUCTURE LAYER
// ============================================================
// Test plan import: encoding fallback, delimiter detection, header mapping

mod csv_parser;

pub use csv_parser::CsvParser;
