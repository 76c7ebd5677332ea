use std::io::{Cursor, Read};

use crate::error::PipelineError;

/// The ODS member holding the spreadsheet's XML body.
const CONTENT_PART: &str = "content.xml";

/// Container check (size limit, ZIP validity) plus part extraction.
/// Only these two failures are fatal — everything past this point
/// accumulates into a [`crate::validation::ValidationResult`] instead.
pub fn extract_content_xml(bytes: &[u8], max_bytes: usize) -> Result<Vec<u8>, PipelineError> {
    if bytes.len() > max_bytes {
        return Err(PipelineError::TooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    let cursor = Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor).map_err(|_| PipelineError::NotAZip)?;

    let mut file = archive
        .by_name(CONTENT_PART)
        .map_err(|_| PipelineError::MissingContentPart)?;

    let mut out = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut out)
        .map_err(|e| PipelineError::Internal(anyhow::anyhow!("reading {CONTENT_PART}: {e}")))?;
    Ok(out)
}
