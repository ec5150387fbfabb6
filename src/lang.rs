//! Language codes and stemmer selection.
//!
//! Descriptions carry a one-byte language code; the word/stem index and the
//! designation logic use it to pick a Snowball stemmer and to match language
//! preferences. Refset language bitmaps use the discriminant as a bit index,
//! so every variant must stay below 64.

use rust_stemmers::{Algorithm, Stemmer};

// ─── Language ────────────────────────────────────────────────────────

/// Languages with first-class handling. Everything else is `Other` and
/// stems with the English stemmer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Language {
    En = 0,
    Fr = 1,
    Nl = 2,
    Es = 3,
    Da = 4,
    Sv = 5,
    De = 6,
    It = 7,
    No = 8,
    Pt = 9,
    Other = 10,
}

impl Language {
    /// Parse the primary subtag of a BCP-47 tag ("en-GB" → En).
    /// Returns None only for the empty string.
    pub fn from_tag(tag: &str) -> Option<Language> {
        let primary = tag.split('-').next().unwrap_or("");
        if primary.is_empty() {
            return None;
        }
        Some(match primary.to_ascii_lowercase().as_str() {
            "en" => Language::En,
            "fr" => Language::Fr,
            "nl" => Language::Nl,
            "es" => Language::Es,
            "da" => Language::Da,
            "sv" => Language::Sv,
            "de" => Language::De,
            "it" => Language::It,
            "no" | "nb" | "nn" => Language::No,
            "pt" => Language::Pt,
            _ => Language::Other,
        })
    }

    /// The stored one-byte code.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Language {
        match code {
            0 => Language::En,
            1 => Language::Fr,
            2 => Language::Nl,
            3 => Language::Es,
            4 => Language::Da,
            5 => Language::Sv,
            6 => Language::De,
            7 => Language::It,
            8 => Language::No,
            9 => Language::Pt,
            _ => Language::Other,
        }
    }

    /// The BCP-47 primary subtag.
    pub fn tag(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Fr => "fr",
            Language::Nl => "nl",
            Language::Es => "es",
            Language::Da => "da",
            Language::Sv => "sv",
            Language::De => "de",
            Language::It => "it",
            Language::No => "no",
            Language::Pt => "pt",
            Language::Other => "und",
        }
    }

    /// The Snowball stemmer for this language.
    ///
    /// Danish, Swedish and German fall back to the English stemmer. This
    /// under-stems those languages but matches the behaviour existing caches
    /// were built with; see DESIGN.md.
    pub fn stemmer(self) -> Stemmer {
        let algorithm = match self {
            Language::En | Language::Da | Language::Sv | Language::De | Language::Other => {
                Algorithm::English
            }
            Language::Fr => Algorithm::French,
            Language::Nl => Algorithm::Dutch,
            Language::Es => Algorithm::Spanish,
            Language::It => Algorithm::Italian,
            Language::No => Algorithm::Norwegian,
            Language::Pt => Algorithm::Portuguese,
        };
        Stemmer::create(algorithm)
    }

    /// Bit for this language in a refset language bitmap.
    pub fn bit(self) -> u64 {
        1u64 << (self as u8)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}
