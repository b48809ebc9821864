use crate::error::ChatError;
use crate::models::SourceDocument;
use lopdf::Document;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Turns the raw bytes of one PDF into its non-empty pages.
///
/// Errors are plain strings; [`extract_corpus`] attaches the document name.
pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, String> {
        let document = Document::load_mem(bytes).map_err(|error| error.to_string())?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| error.to_string())?;

            // Image-only pages have no text layer; they are skipped, not failed.
            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        Ok(pages)
    }
}

/// Concatenates the page texts of every document, in upload order, one page per line block.
///
/// The first document that fails to parse aborts the whole batch.
pub fn extract_corpus(
    extractor: &dyn PdfExtractor,
    documents: &[SourceDocument],
) -> Result<String, ChatError> {
    let mut corpus = String::new();

    for document in documents {
        let pages = extractor
            .extract_pages(&document.bytes)
            .map_err(|details| ChatError::DocumentParse {
                document: document.name.clone(),
                details,
            })?;

        debug!(document = %document.name, pages = pages.len(), "extracted pdf text");

        for page in pages {
            corpus.push_str(page.text.trim_end());
            corpus.push('\n');
        }
    }

    Ok(corpus)
}
