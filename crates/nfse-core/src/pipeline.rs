//! Per-document orchestration of the extraction-and-repair stages.
//!
//! Pages run sequentially in page order: normalize, recognize, merge, repair,
//! structure. The structured pages are joined with one blank line and the
//! required fields are checked once on the whole text. The first failing page
//! stops the document; pages after it are not processed.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::DynamicImage;
use tracing::{error, info, instrument, warn};

use crate::error::{NfseError, PageError, PreprocessError, RasterError, Stage};
use crate::models::config::{NfseConfig, PdfConfig};
use crate::models::result::{PageReport, PipelineResult, PipelineStatus};
use crate::ocr::{ImageNormalizer, OcrEngine, RecognitionAdapter};
use crate::pdf::Rasterizer;
use crate::text::{repair, structure, validate, RuleSet};

/// Separator between the text of consecutive pages.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Cooperative cancellation, checked between pages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder<E: OcrEngine, R: Rasterizer> {
    engine: E,
    rasterizer: R,
    config: NfseConfig,
    rules: Option<Arc<RuleSet>>,
    cancel: CancelFlag,
}

impl<E: OcrEngine, R: Rasterizer> PipelineBuilder<E, R> {
    /// Create a builder with default configuration.
    pub fn new(engine: E, rasterizer: R) -> Self {
        Self {
            engine,
            rasterizer,
            config: NfseConfig::default(),
            rules: None,
            cancel: CancelFlag::new(),
        }
    }

    /// Set configuration.
    pub fn with_config(mut self, config: NfseConfig) -> Self {
        self.config = config;
        self
    }

    /// Use these rules instead of the configured or embedded table.
    pub fn with_rules(mut self, rules: Arc<RuleSet>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Share a cancellation flag with the caller.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Validate the configuration, load the rules and build the pipeline.
    pub fn build(self) -> Result<Pipeline<E, R>, NfseError> {
        self.config.validate()?;

        let rules = match (self.rules, &self.config.rules.rule_file) {
            (Some(rules), _) => rules,
            (None, Some(path)) => Arc::new(RuleSet::from_file(path)?),
            (None, None) => Arc::new(RuleSet::embedded().clone()),
        };

        let normalizer = ImageNormalizer::new(self.config.normalizer.clone())
            .map_err(|e| NfseError::Config(e.to_string()))?;
        let adapter = RecognitionAdapter::new(self.engine, &self.config.ocr);

        Ok(Pipeline {
            rasterizer: Arc::new(self.rasterizer),
            normalizer,
            adapter,
            rules,
            pdf: self.config.pdf,
            currency_marker: self.config.ocr.currency_marker,
            cancel: self.cancel,
        })
    }
}

/// Extraction-and-repair pipeline for one document at a time.
pub struct Pipeline<E: OcrEngine, R: Rasterizer> {
    rasterizer: Arc<R>,
    normalizer: ImageNormalizer,
    adapter: RecognitionAdapter<E>,
    rules: Arc<RuleSet>,
    pdf: PdfConfig,
    currency_marker: String,
    cancel: CancelFlag,
}

impl<E: OcrEngine, R: Rasterizer + 'static> Pipeline<E, R> {
    /// Create a new builder.
    pub fn builder(engine: E, rasterizer: R) -> PipelineBuilder<E, R> {
        PipelineBuilder::new(engine, rasterizer)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Rasterize a PDF and process all of its pages.
    ///
    /// Rasterization and normalization run on the blocking thread pool.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn process_document(&self, path: &Path) -> PipelineResult {
        let rasterizer = Arc::clone(&self.rasterizer);
        let owned_path = path.to_path_buf();
        let pdf = self.pdf.clone();
        let rasterized = tokio::task::spawn_blocking(move || rasterizer.rasterize(&owned_path, &pdf))
            .await
            .unwrap_or_else(|e| Err(RasterError::Worker(e.to_string())));

        let pages = match rasterized {
            Ok(pages) => pages,
            Err(e) => {
                let err = NfseError::from(e);
                error!("{}", err);
                return PipelineResult::new(PipelineStatus::from(&err), String::new(), Vec::new());
            }
        };

        self.process_pages(&pages).await
    }

    /// Process already rasterized pages, in order.
    #[instrument(skip_all, fields(pages = pages.len()))]
    pub async fn process_pages(&self, pages: &[DynamicImage]) -> PipelineResult {
        let mut reports = Vec::with_capacity(pages.len());

        for (index, image) in pages.iter().enumerate() {
            if self.cancel.is_cancelled() {
                let err = NfseError::Cancelled {
                    completed: reports.len(),
                };
                warn!("{}", err);
                return failed(&err, reports);
            }

            match self.process_page(index + 1, image).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    error!("{}", err);
                    return failed(&err, reports);
                }
            }
        }

        let text = join_pages(&reports);
        evaluate(text, reports, &self.rules)
    }

    /// Run every per-page stage on one page (1-based `number`).
    pub async fn process_page(
        &self,
        number: usize,
        image: &DynamicImage,
    ) -> Result<PageReport, NfseError> {
        let normalizer = self.normalizer.clone();
        let page = image.clone();
        let normalized = tokio::task::spawn_blocking(move || normalizer.normalize(&page))
            .await
            .unwrap_or_else(|e| Err(PreprocessError::Worker(e.to_string())))
            .map_err(|e| page_error(number, Stage::Normalize, e.into()))?;

        let recognition = self
            .adapter
            .recognize(&normalized)
            .await
            .map_err(|e| page_error(number, Stage::Recognize, e.into()))?;

        let merged = recognition.merged(&self.currency_marker);
        let text = post_process(&merged, &self.rules);

        info!("Page {} processed", number);

        Ok(PageReport {
            number,
            raw_text: recognition.primary,
            numeric_pass: recognition.secondary.is_some(),
            text,
        })
    }
}

fn page_error(page: usize, stage: Stage, source: PageError) -> NfseError {
    NfseError::Page { page, stage, source }
}

fn failed(err: &NfseError, reports: Vec<PageReport>) -> PipelineResult {
    PipelineResult::new(PipelineStatus::from(err), join_pages(&reports), reports)
}

/// Repair then structure recognized text.
pub fn post_process(text: &str, rules: &RuleSet) -> String {
    structure(&repair(text, rules), rules)
}

/// Concatenate page texts in page order, one blank line between pages.
///
/// Pages with no recognized text are left out of the join.
pub fn join_pages(pages: &[PageReport]) -> String {
    pages
        .iter()
        .map(|p| p.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

/// Validate assembled text and build the final result.
pub fn evaluate(text: String, pages: Vec<PageReport>, rules: &RuleSet) -> PipelineResult {
    let missing = validate(&text, rules);
    let status = if missing.is_empty() {
        info!("All required fields found");
        PipelineStatus::Success
    } else {
        PipelineStatus::MissingFields { fields: missing }
    };
    PipelineResult::new(status, text, pages)
}

/// Run the text stages on already recognized text, without OCR.
pub fn process_text(text: &str, rules: &RuleSet) -> PipelineResult {
    let structured = post_process(text, rules);
    let page = PageReport {
        number: 1,
        raw_text: text.to_string(),
        numeric_pass: false,
        text: structured.trim().to_string(),
    };
    evaluate(page.text.clone(), vec![page], rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrError;
    use crate::models::config::NormalizerConfig;
    use crate::ocr::RecognitionConfig;
    use image::{GrayImage, Luma};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::thread::{self, ThreadId};

    /// Engine answering per page, keyed by image width.
    struct PageEngine {
        pages: HashMap<u32, (&'static str, &'static str)>,
    }

    impl OcrEngine for PageEngine {
        async fn recognize(
            &self,
            image: &GrayImage,
            config: &RecognitionConfig,
        ) -> Result<String, OcrError> {
            let (primary, numeric) = self.pages.get(&image.width()).copied().unwrap_or(("", ""));
            Ok(if config.char_whitelist.is_some() { numeric } else { primary }.to_string())
        }
    }

    struct FixedRasterizer(Result<Vec<DynamicImage>, String>);

    impl Rasterizer for FixedRasterizer {
        fn rasterize(&self, _path: &Path, _config: &PdfConfig) -> crate::pdf::Result<Vec<DynamicImage>> {
            self.0.clone().map_err(RasterError::Tool)
        }
    }

    const PAGE_ONE: &str = "NOTA FISCAL DE SERVIÇOS ELETRÔNICA - NFS-e\nPRESTADOR DE SERVIÇOS\nSustentamais Consultoria\nCNPJ 40,621.411/0001-53";
    const PAGE_TWO: &str = "DISCRIMINAÇÃO DOS SERVIÇÕE\n1.  Relatorode sustentabilidade\nVALOR TOTAL DA NOTA R$ 7S0,0O";

    fn page(width: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, 8, Luma([220])))
    }

    fn test_config() -> NfseConfig {
        NfseConfig {
            normalizer: NormalizerConfig {
                denoise_template_window: 3,
                denoise_search_window: 3,
                threshold_block_size: 3,
                clahe_tile_grid: (2, 2),
                ..NormalizerConfig::default()
            },
            ..NfseConfig::default()
        }
    }

    fn pipeline(pages: Result<Vec<DynamicImage>, String>) -> Pipeline<PageEngine, FixedRasterizer> {
        let engine = PageEngine {
            pages: HashMap::from([
                (10, (PAGE_ONE, "49.621.411/0001-93")),
                (11, (PAGE_TWO, "R$ 750,00")),
                (12, ("PAGE THREE MARKER", "")),
                (13, ("NFS-e Sustentamais Consultoria sem total", "")),
            ]),
        };
        Pipeline::builder(engine, FixedRasterizer(pages))
            .with_config(test_config())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_two_pages_joined_in_order() {
        let pipeline = pipeline(Ok(vec![page(10), page(11)]));
        let result = pipeline.process_document(Path::new("nfse.pdf")).await;

        let expected = "NOTA FISCAL DE SERVIÇOS ELETRÔNICA - NFS-e\n\nPRESTADOR DE SERVIÇOS\n------------------------------\nSustentamais Consultoria\nCNPJ 49.621.411/0001-93\n\nDISCRIMINAÇÃO DOS SERVIÇOS\n------------------------------\n1. Relatório de sustentabilidade\nVALOR TOTAL DA NOTA R$ 750,00";

        assert_eq!(result.status, PipelineStatus::Success);
        assert_eq!(result.text, expected);
        assert_eq!(result.pages.len(), 2);
        assert!(result.pages.iter().all(|p| p.numeric_pass));
        assert_eq!(result.pages[1].raw_text, PAGE_TWO);
    }

    #[tokio::test]
    async fn test_missing_total_reported_with_text() {
        let pipeline = pipeline(Ok(vec![page(13)]));
        let result = pipeline.process_document(Path::new("nfse.pdf")).await;

        assert_eq!(
            result.status,
            PipelineStatus::MissingFields {
                fields: vec!["Valor Total".to_string()]
            }
        );
        assert_eq!(result.text, "NFS-e Sustentamais Consultoria sem total");
        assert!(!result.pages[0].numeric_pass);
    }

    #[tokio::test]
    async fn test_failure_on_page_two_stops_document() {
        let pipeline = pipeline(Ok(vec![page(10), DynamicImage::new_luma8(0, 0), page(12)]));
        let result = pipeline.process_document(Path::new("nfse.pdf")).await;

        match &result.status {
            PipelineStatus::Error { message, page, stage } => {
                assert_eq!(*page, Some(2));
                assert_eq!(stage.as_deref(), Some("normalize"));
                assert!(message.contains("page 2"));
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(result.pages.len(), 1);
        assert!(result.text.starts_with("NOTA FISCAL"));
        assert!(!result.text.contains("PAGE THREE"));
    }

    #[tokio::test]
    async fn test_rasterization_failure() {
        let pipeline = pipeline(Err("unreadable PDF".to_string()));
        let result = pipeline.process_document(Path::new("broken.pdf")).await;

        match &result.status {
            PipelineStatus::Error { message, page, stage } => {
                assert_eq!(*page, None);
                assert_eq!(stage.as_deref(), Some("rasterize"));
                assert!(message.contains("unreadable PDF"));
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert!(result.text.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let pipeline = pipeline(Ok(vec![page(10), page(11)]));
        pipeline.cancel_flag().cancel();

        let result = pipeline.process_document(Path::new("nfse.pdf")).await;
        assert!(matches!(&result.status, PipelineStatus::Error { message, .. } if message.contains("cancelled")));
        assert!(result.pages.is_empty());
    }

    #[tokio::test]
    async fn test_empty_page_left_out_of_join() {
        let pipeline = pipeline(Ok(vec![page(12), page(14), page(13)]));
        let result = pipeline.process_document(Path::new("nfse.pdf")).await;

        assert_eq!(
            result.text,
            "PAGE THREE MARKER\n\nNFS-e Sustentamais Consultoria sem total"
        );
        assert_eq!(result.pages.len(), 3);
        assert_eq!(result.pages[1].text, "");
    }

    /// Records the thread each rasterization ran on.
    struct ThreadRecordingRasterizer(Mutex<Option<ThreadId>>);

    impl Rasterizer for ThreadRecordingRasterizer {
        fn rasterize(&self, _path: &Path, _config: &PdfConfig) -> crate::pdf::Result<Vec<DynamicImage>> {
            *self.0.lock().unwrap() = Some(thread::current().id());
            Ok(vec![page(13)])
        }
    }

    #[tokio::test]
    async fn test_rasterization_runs_off_the_runtime_thread() {
        let engine = PageEngine {
            pages: HashMap::from([(13, ("NFS-e", ""))]),
        };
        let pipeline = Pipeline::builder(engine, ThreadRecordingRasterizer(Mutex::new(None)))
            .with_config(test_config())
            .build()
            .unwrap();

        let result = pipeline.process_document(Path::new("nfse.pdf")).await;
        assert_eq!(result.text, "NFS-e");

        let recorded = *pipeline.rasterizer.0.lock().unwrap();
        assert!(recorded.is_some());
        assert_ne!(recorded, Some(thread::current().id()));
    }

    #[test]
    fn test_process_text_without_ocr() {
        let result = process_text("NFS-e\nCNPJ 40,621.411/0001-53\nTotal R$75000", RuleSet::embedded());
        assert!(result.is_success());
        assert_eq!(result.text, "NFS-e\nCNPJ 49.621.411/0001-93\nTotal R$ 750,00");
    }

    #[test]
    fn test_join_pages_trims_each_page() {
        let report = |n: usize, text: &str| PageReport {
            number: n,
            raw_text: String::new(),
            numeric_pass: false,
            text: text.to_string(),
        };
        let pages = vec![report(1, "\n\nPRIMEIRA\n"), report(2, "SEGUNDA\n\n")];
        assert_eq!(join_pages(&pages), "PRIMEIRA\n\nSEGUNDA");

        let with_blank = vec![report(1, "UM"), report(2, "  \n "), report(3, "TRES")];
        assert_eq!(join_pages(&with_blank), "UM\n\nTRES");
    }

    #[test]
    fn test_invalid_normalizer_config_rejected() {
        let mut config = test_config();
        config.normalizer.threshold_block_size = 4;
        let engine = PageEngine { pages: HashMap::new() };
        let result = Pipeline::builder(engine, FixedRasterizer(Ok(Vec::new())))
            .with_config(config)
            .build();
        assert!(matches!(result, Err(NfseError::Config(_))));
    }
}
