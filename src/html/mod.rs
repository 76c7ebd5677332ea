pub mod extractor;

pub use extractor::{extract, filter_month, parse_document, ExtractionResult, RawShift, SelectorConfig};
