//! Dual-pass recognition: full text, then an optional numeric re-scan.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::config::RecognitionConfig;
use super::engine::OcrEngine;
use super::merge::merge;
use super::preprocessing::NormalizedImage;
use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// Whether the primary text mentions monetary or identifier content.
///
/// Triggers are matched as case-sensitive substrings.
pub fn needs_numeric_pass<S: AsRef<str>>(primary: &str, triggers: &[S]) -> bool {
    triggers
        .iter()
        .any(|t| !t.as_ref().is_empty() && primary.contains(t.as_ref()))
}

/// Output of both recognition passes for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    /// Full-text pass.
    pub primary: String,
    /// Numeric pass, when it was triggered.
    pub secondary: Option<String>,
}

impl Recognition {
    /// Primary text with the numeric pass merged in.
    pub fn merged(&self, marker: &str) -> String {
        match &self.secondary {
            Some(secondary) => merge(&self.primary, secondary, marker),
            None => self.primary.clone(),
        }
    }
}

/// Drives an [`OcrEngine`] through the general and numeric passes.
pub struct RecognitionAdapter<E: OcrEngine> {
    engine: E,
    general: RecognitionConfig,
    numeric: RecognitionConfig,
    triggers: Vec<String>,
    timeout: Duration,
}

impl<E: OcrEngine> RecognitionAdapter<E> {
    /// Create an adapter from the OCR section of the configuration.
    pub fn new(engine: E, config: &OcrConfig) -> Self {
        let general = RecognitionConfig::general(config);
        let numeric = general.numeric(config);
        Self {
            engine,
            general,
            numeric,
            triggers: config.numeric_triggers.clone(),
            timeout: config.timeout(),
        }
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn general_config(&self) -> &RecognitionConfig {
        &self.general
    }

    pub fn numeric_config(&self) -> &RecognitionConfig {
        &self.numeric
    }

    /// Run the primary pass and, if triggered, the numeric pass.
    pub async fn recognize(&self, image: &NormalizedImage) -> Result<Recognition, OcrError> {
        let primary = self.run_pass(image, &self.general).await?;

        let secondary = if needs_numeric_pass(&primary, &self.triggers) {
            debug!("Numeric content detected, running numeric pass");
            Some(self.run_pass(image, &self.numeric).await?)
        } else {
            None
        };

        Ok(Recognition { primary, secondary })
    }

    async fn run_pass(
        &self,
        image: &NormalizedImage,
        config: &RecognitionConfig,
    ) -> Result<String, OcrError> {
        let start = Instant::now();
        match tokio::time::timeout(self.timeout, self.engine.recognize(image.as_gray(), config)).await {
            Ok(result) => {
                debug!(
                    "Pass --psm {} finished in {}ms",
                    config.page_segmentation,
                    start.elapsed().as_millis()
                );
                result
            }
            Err(_) => {
                warn!(
                    "OCR pass --psm {} timed out after {:?}",
                    config.page_segmentation, self.timeout
                );
                Err(OcrError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::NormalizerConfig;
    use crate::ocr::ImageNormalizer;
    use image::{DynamicImage, GrayImage};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Engine returning canned text per pass.
    struct FakeEngine {
        primary: String,
        numeric: String,
        calls: Mutex<Vec<RecognitionConfig>>,
    }

    impl FakeEngine {
        fn new(primary: &str, numeric: &str) -> Self {
            Self {
                primary: primary.to_string(),
                numeric: numeric.to_string(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl OcrEngine for FakeEngine {
        async fn recognize(
            &self,
            _image: &GrayImage,
            config: &RecognitionConfig,
        ) -> Result<String, OcrError> {
            self.calls.lock().unwrap().push(config.clone());
            if config.char_whitelist.is_some() {
                Ok(self.numeric.clone())
            } else {
                Ok(self.primary.clone())
            }
        }
    }

    struct SlowEngine;

    impl OcrEngine for SlowEngine {
        async fn recognize(
            &self,
            _image: &GrayImage,
            _config: &RecognitionConfig,
        ) -> Result<String, OcrError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(String::new())
        }
    }

    fn blank_page() -> NormalizedImage {
        let config = NormalizerConfig {
            denoise_template_window: 3,
            denoise_search_window: 3,
            threshold_block_size: 3,
            ..NormalizerConfig::default()
        };
        ImageNormalizer::new(config)
            .unwrap()
            .normalize(&DynamicImage::ImageLuma8(GrayImage::new(8, 8)))
            .unwrap()
    }

    #[test]
    fn test_trigger_decision() {
        let triggers = ["R$", "CNPJ", "CPF"];
        assert!(needs_numeric_pass("Valor R$ 10", &triggers));
        assert!(needs_numeric_pass("CPF/CNPJ:", &triggers));
        assert!(!needs_numeric_pass("cnpj em minúsculas", &triggers));
        assert!(!needs_numeric_pass("Relatório", &triggers));
        assert!(!needs_numeric_pass::<&str>("R$", &[]));
    }

    #[tokio::test]
    async fn test_numeric_pass_skipped_without_trigger() {
        let adapter = RecognitionAdapter::new(
            FakeEngine::new("PRESTADOR DE SERVIÇOS", "999"),
            &OcrConfig::default(),
        );

        let recognition = adapter.recognize(&blank_page()).await.unwrap();

        assert_eq!(recognition.secondary, None);
        assert_eq!(recognition.merged("R$"), "PRESTADOR DE SERVIÇOS");
        assert_eq!(adapter.engine().call_count(), 1);
    }

    #[tokio::test]
    async fn test_numeric_pass_uses_numeric_config() {
        let adapter = RecognitionAdapter::new(
            FakeEngine::new("Total R$ XXXX", "garbage R$ 750,00"),
            &OcrConfig::default(),
        );

        let recognition = adapter.recognize(&blank_page()).await.unwrap();
        assert_eq!(recognition.secondary.as_deref(), Some("garbage R$ 750,00"));
        assert_eq!(recognition.merged("R$"), "Total R$ 750,00");

        let calls = adapter.engine().calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].page_segmentation, 6);
        assert_eq!(calls[1].page_segmentation, 11);
        assert!(calls[1].char_whitelist.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_recognition_error() {
        let adapter = RecognitionAdapter::new(SlowEngine, &OcrConfig::default())
            .with_timeout(Duration::from_secs(2));

        let result = adapter.recognize(&blank_page()).await;
        assert!(matches!(result, Err(OcrError::Timeout(d)) if d == Duration::from_secs(2)));
    }
}
