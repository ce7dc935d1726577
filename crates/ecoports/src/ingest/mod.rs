//! PDF report ingestion: extraction and metric parsing.

pub mod extractor;
pub mod parser;

pub use extractor::{ExtractionError, PdfTextExtractor, TextExtractor};
pub use parser::{MetricParser, MetricUpdate, NoMatchingData};

/// Runs uploaded report bytes through extract-then-parse.
#[derive(Debug)]
pub struct ReportImporter {
    extractor: Box<dyn TextExtractor>,
    parser: MetricParser,
}

impl ReportImporter {
    pub fn new(extractor: Box<dyn TextExtractor>) -> Self {
        Self {
            extractor,
            parser: MetricParser::new(),
        }
    }

    pub fn import(&self, bytes: &[u8]) -> Result<MetricUpdate, ReportImportError> {
        let text = self.extractor.extract_text(bytes)?;
        let update = self.parser.parse(&text)?;
        Ok(update)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportImportError {
    #[error("failed to extract text: {0}")]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    NoMatchingData(#[from] NoMatchingData),
}
