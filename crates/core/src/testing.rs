//! In-memory providers and document builders shared by the unit tests.

use crate::embeddings::{words, EmbeddingProvider};
use crate::error::ProviderError;
use crate::extractor::{PageText, PdfExtractor};
use crate::generation::GenerationProvider;
use crate::models::{GenerationRequest, SourceDocument, Turn};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Builds a PDF with one page per entry; every line of an entry becomes its own text block.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::new();
    for page in pages {
        let mut operations = Vec::new();
        for (line_no, line) in page.lines().enumerate() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), Object::Integer(10)]));
            operations.push(Operation::new(
                "Td",
                vec![Object::Integer(40), Object::Integer(800 - 12 * line_no as i64)],
            ));
            operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
            operations.push(Operation::new("ET", vec![]));
        }

        let content = Content { operations };
        let encoded = content.encode().expect("content stream should encode");
        let content_id = document.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }

    let page_count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ],
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    document
        .save_to(&mut bytes)
        .expect("pdf should serialize to memory");
    bytes
}

/// Treats document bytes as UTF-8 text with pages separated by form feeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormFeedExtractor;

impl PdfExtractor for FormFeedExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, String> {
        let text = std::str::from_utf8(bytes).map_err(|error| error.to_string())?;
        Ok(text
            .split('\u{000C}')
            .enumerate()
            .filter(|(_, page)| !page.trim().is_empty())
            .map(|(index, page)| PageText {
                number: index as u32 + 1,
                text: page.to_string(),
            })
            .collect())
    }
}

pub fn text_documents(documents: &[(&str, &str)]) -> Vec<SourceDocument> {
    documents
        .iter()
        .map(|(name, text)| SourceDocument::new(*name, text.as_bytes().to_vec()))
        .collect()
}

fn tokens(text: &str) -> Vec<String> {
    words(text).collect()
}

/// Bag-of-words over a tiny fixed vocabulary, so similarity is predictable in tests.
#[derive(Debug, Clone)]
pub struct KeywordEmbedder {
    vocabulary: Vec<&'static str>,
}

impl Default for KeywordEmbedder {
    fn default() -> Self {
        Self {
            vocabulary: vec![
                "revenue", "q3", "q4", "costs", "weather", "headcount", "people", "profit",
                "outlook", "question",
            ],
        }
    }
}

impl KeywordEmbedder {
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let words = tokens(text);
        self.vocabulary
            .iter()
            .map(|term| words.iter().filter(|word| word.as_str() == *term).count() as f32)
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.vector(text)).collect())
    }
}

pub struct FailingEmbedder {
    status: u16,
}

impl FailingEmbedder {
    pub fn unauthorized() -> Self {
        Self { status: 401 }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing-test"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(status_error(self.status))
    }
}

fn status_error(status: u16) -> ProviderError {
    ProviderError::Status {
        status,
        body: format!("simulated provider failure {status}"),
    }
}

/// Shared on/off failure switch; `0` means healthy.
#[derive(Debug, Clone, Default)]
pub struct FailureSwitch(Arc<AtomicU16>);

impl FailureSwitch {
    fn check(&self) -> Result<(), ProviderError> {
        match self.0.load(Ordering::SeqCst) {
            0 => Ok(()),
            status => Err(status_error(status)),
        }
    }
}

/// Keyword embedder that can be made to fail with an HTTP status mid-test.
#[derive(Debug, Clone, Default)]
pub struct SwitchableEmbedder {
    inner: KeywordEmbedder,
    switch: FailureSwitch,
}

impl SwitchableEmbedder {
    pub fn fail_with_status(&self, status: u16) {
        self.switch.0.store(status, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.switch.0.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for SwitchableEmbedder {
    fn model_name(&self) -> &str {
        "switchable-test"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.switch.check()?;
        self.inner.embed(texts).await
    }
}

/// Answers with the context line sharing the most words with the question.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextEchoGenerator;

pub fn echo_answer(request: &GenerationRequest<'_>) -> String {
    let question = tokens(request.question);
    let best = request
        .context
        .iter()
        .flat_map(|chunk| chunk.lines())
        .map(|line| {
            let shared = tokens(line)
                .iter()
                .filter(|word| question.contains(word))
                .count();
            (shared, line.trim())
        })
        .filter(|(shared, _)| *shared > 0)
        .fold(None, |best: Option<(usize, &str)>, candidate| match best {
            Some(current) if current.0 >= candidate.0 => Some(current),
            _ => Some(candidate),
        });

    match best {
        Some((_, line)) => format!("According to the documents: {line}"),
        None => "I don't know.".to_string(),
    }
}

#[async_trait]
impl GenerationProvider for ContextEchoGenerator {
    fn model_name(&self) -> &str {
        "echo-test"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ProviderError> {
        Ok(echo_answer(request))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub context: Vec<String>,
    pub history: Vec<Turn>,
    pub question: String,
}

/// Records every request; replies from a script, then falls back to echoing the context.
#[derive(Debug, Clone, Default)]
pub struct RecordingGenerator {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    replies: Arc<Mutex<VecDeque<String>>>,
}

impl RecordingGenerator {
    pub fn with_replies(replies: &[&str]) -> Self {
        let generator = Self::default();
        generator
            .replies
            .lock()
            .unwrap()
            .extend(replies.iter().map(|reply| reply.to_string()));
        generator
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for RecordingGenerator {
    fn model_name(&self) -> &str {
        "recording-test"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            context: request.context.iter().map(|text| text.to_string()).collect(),
            history: request.history.to_vec(),
            question: request.question.to_string(),
        });

        let scripted = self.replies.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| echo_answer(request)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SwitchableGenerator {
    switch: FailureSwitch,
}

impl SwitchableGenerator {
    pub fn fail_with_status(&self, status: u16) {
        self.switch.0.store(status, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.switch.0.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerationProvider for SwitchableGenerator {
    fn model_name(&self) -> &str {
        "switchable-test"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ProviderError> {
        self.switch.check()?;
        Ok(echo_answer(request))
    }
}

/// Sleeps before answering; the delay can be changed while the generator is shared.
#[derive(Debug, Clone, Default)]
pub struct SlowGenerator {
    delay_ms: Arc<AtomicU64>,
}

impl SlowGenerator {
    pub fn new(delay: Duration) -> Self {
        let generator = Self::default();
        generator.set_delay(delay);
        generator
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerationProvider for SlowGenerator {
    fn model_name(&self) -> &str {
        "slow-test"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ProviderError> {
        let delay = Duration::from_millis(self.delay_ms.load(Ordering::SeqCst));
        tokio::time::sleep(delay).await;
        Ok(echo_answer(request))
    }
}

/// Keyword embedder that sleeps on every call and counts calls, with an optional batch limit.
#[derive(Debug, Clone, Default)]
pub struct DelayedEmbedder {
    inner: KeywordEmbedder,
    delay_ms: Arc<AtomicU64>,
    calls: Arc<AtomicUsize>,
    batch_size: Option<usize>,
}

impl DelayedEmbedder {
    pub fn new(delay: Duration) -> Self {
        let embedder = Self::default();
        embedder.set_delay(delay);
        embedder
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for DelayedEmbedder {
    fn model_name(&self) -> &str {
        "delayed-test"
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size.unwrap_or(usize::MAX)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = Duration::from_millis(self.delay_ms.load(Ordering::SeqCst));
        tokio::time::sleep(delay).await;
        self.inner.embed(texts).await
    }
}
