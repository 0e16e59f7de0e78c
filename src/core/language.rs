// Language registry
//
// Source and target languages are drawn from a fixed set. Unknown names are
// not rejected: they resolve to a configured default with a warning.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Languages the pipeline accepts as source or target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Japanese,
    English,
    Chinese,
    Korean,
    Spanish,
    French,
    German,
    Russian,
    Italian,
    Portuguese,
    Arabic,
}

impl Language {
    pub const ALL: [Language; 11] = [
        Language::Japanese,
        Language::English,
        Language::Chinese,
        Language::Korean,
        Language::Spanish,
        Language::French,
        Language::German,
        Language::Russian,
        Language::Italian,
        Language::Portuguese,
        Language::Arabic,
    ];

    /// English display name, also the canonical serialized form
    pub fn name(self) -> &'static str {
        match self {
            Language::Japanese => "Japanese",
            Language::English => "English",
            Language::Chinese => "Chinese",
            Language::Korean => "Korean",
            Language::Spanish => "Spanish",
            Language::French => "French",
            Language::German => "German",
            Language::Russian => "Russian",
            Language::Italian => "Italian",
            Language::Portuguese => "Portuguese",
            Language::Arabic => "Arabic",
        }
    }

    /// ISO 639-1 code, as used by translation APIs
    pub fn iso_code(self) -> &'static str {
        match self {
            Language::Japanese => "ja",
            Language::English => "en",
            Language::Chinese => "zh",
            Language::Korean => "ko",
            Language::Spanish => "es",
            Language::French => "fr",
            Language::German => "de",
            Language::Russian => "ru",
            Language::Italian => "it",
            Language::Portuguese => "pt",
            Language::Arabic => "ar",
        }
    }

    /// Tesseract traineddata name
    pub fn tesseract_code(self) -> &'static str {
        match self {
            Language::Japanese => "jpn",
            Language::English => "eng",
            Language::Chinese => "chi_sim",
            Language::Korean => "kor",
            Language::Spanish => "spa",
            Language::French => "fra",
            Language::German => "deu",
            Language::Russian => "rus",
            Language::Italian => "ita",
            Language::Portuguese => "por",
            Language::Arabic => "ara",
        }
    }

    /// Parse an English name (any case) or an ISO code
    pub fn parse(value: &str) -> Option<Language> {
        let value = value.trim();
        Self::ALL.into_iter().find(|lang| {
            lang.name().eq_ignore_ascii_case(value) || lang.iso_code().eq_ignore_ascii_case(value)
        })
    }

    /// Parse `value`, falling back to `default` for anything outside the registry
    pub fn resolve(value: &str, default: Language) -> Language {
        match Self::parse(value) {
            Some(lang) => lang,
            None => {
                warn!(
                    "Unsupported language '{}', falling back to {}",
                    value,
                    default.name()
                );
                default
            }
        }
    }

    /// CJK scripts pack more meaning per glyph
    pub fn is_cjk(self) -> bool {
        matches!(self, Language::Japanese | Language::Chinese | Language::Korean)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// All supported languages, in registry order
pub fn languages() -> &'static [Language] {
    &Language::ALL
}
