use crate::error::Result;
use crate::extraction::{PageImage, PageSource};
use crate::schema::{ReportDocument, StatementType};
use std::fs;

/// Sends the whole report as one inline document and lets the model find
/// the statement pages itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct WholeDocumentPages;

impl PageSource for WholeDocumentPages {
    fn pages_for(&self, report: &ReportDocument, _: StatementType) -> Result<Vec<PageImage>> {
        let bytes = fs::read(&report.path)?;
        let mime_type = mime_guess::from_path(&report.path)
            .first_or_octet_stream()
            .to_string();
        Ok(vec![PageImage { mime_type, bytes }])
    }
}
