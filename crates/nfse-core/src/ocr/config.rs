//! Recognition configurations handed to the OCR engine.

use std::fmt;

use crate::models::config::OcrConfig;

/// Engine invocation parameters for one recognition pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionConfig {
    /// OCR engine mode.
    pub engine_mode: u8,
    /// Page segmentation (layout analysis) mode.
    pub page_segmentation: u8,
    /// Language set, `+`-separated.
    pub languages: String,
    pub preserve_interword_spaces: bool,
    /// Characters the engine must never emit.
    pub char_blacklist: Option<String>,
    /// Only these characters may be emitted.
    pub char_whitelist: Option<String>,
}

impl RecognitionConfig {
    /// Full-text pass: uniform text block, bilingual dictionary.
    pub fn general(config: &OcrConfig) -> Self {
        Self {
            engine_mode: config.engine_mode,
            page_segmentation: config.page_segmentation,
            languages: config.languages.clone(),
            preserve_interword_spaces: config.preserve_interword_spaces,
            char_blacklist: Some(config.char_blacklist.clone()).filter(|s| !s.is_empty()),
            char_whitelist: None,
        }
    }

    /// Numeric re-scan derived from `self`: sparse text layout, digits and
    /// currency punctuation only.
    pub fn numeric(&self, config: &OcrConfig) -> Self {
        Self {
            page_segmentation: config.numeric_page_segmentation,
            char_whitelist: Some(config.numeric_whitelist.clone()),
            ..self.clone()
        }
    }

    /// Command-line arguments for the tesseract binary.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--oem".to_string(),
            self.engine_mode.to_string(),
            "--psm".to_string(),
            self.page_segmentation.to_string(),
            "-l".to_string(),
            self.languages.clone(),
        ];

        if self.preserve_interword_spaces {
            args.push("-c".to_string());
            args.push("preserve_interword_spaces=1".to_string());
        }
        if let Some(blacklist) = &self.char_blacklist {
            args.push("-c".to_string());
            args.push(format!("tessedit_char_blacklist={}", blacklist));
        }
        if let Some(whitelist) = &self.char_whitelist {
            args.push("-c".to_string());
            args.push(format!("tessedit_char_whitelist={}", whitelist));
        }

        args
    }
}

impl fmt::Display for RecognitionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_args().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_config_args() {
        let config = RecognitionConfig::general(&OcrConfig::default());
        assert_eq!(
            config.to_string(),
            "--oem 3 --psm 6 -l por+eng -c preserve_interword_spaces=1 -c tessedit_char_blacklist=®©™•§"
        );
    }

    #[test]
    fn test_numeric_config_overrides_layout_and_charset() {
        let ocr = OcrConfig::default();
        let general = RecognitionConfig::general(&ocr);
        let numeric = general.numeric(&ocr);

        assert_eq!(numeric.page_segmentation, 11);
        assert_eq!(numeric.char_whitelist.as_deref(), Some("0123456789R$.,/"));
        assert_eq!(numeric.languages, general.languages);
        assert_eq!(numeric.char_blacklist, general.char_blacklist);
        assert!(numeric
            .to_args()
            .contains(&"tessedit_char_whitelist=0123456789R$.,/".to_string()));
    }

    #[test]
    fn test_empty_blacklist_omitted() {
        let ocr = OcrConfig {
            char_blacklist: String::new(),
            ..OcrConfig::default()
        };
        let config = RecognitionConfig::general(&ocr);
        assert!(!config.to_string().contains("blacklist"));
    }
}
