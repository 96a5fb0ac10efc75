//! Editing languages and the buffer hand-over when the language changes.

use std::fmt;
use std::str::FromStr;

use codeshare_core::{BoundaryConfig, BoundaryEnforcer};
use serde::{Deserialize, Serialize};

/// Supported editing languages, identified on the wire by short codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "py")]
    Python,
    #[serde(rename = "js")]
    JavaScript,
    #[serde(rename = "cpp")]
    Cpp,
    #[serde(rename = "java")]
    Java,
    #[serde(rename = "sql")]
    Sql,
    #[serde(rename = "dart")]
    Dart,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Python,
        Language::JavaScript,
        Language::Cpp,
        Language::Java,
        Language::Sql,
        Language::Dart,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::JavaScript => "js",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Sql => "sql",
            Language::Dart => "dart",
        }
    }

    /// Parse a code, falling back to Python for anything unknown.
    pub fn from_code_or_default(code: &str) -> Self {
        code.parse().unwrap_or_default()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLanguage(pub String);

impl fmt::Display for UnknownLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown language code: {}", self.0)
    }
}

impl std::error::Error for UnknownLanguage {}

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|l| l.code() == s)
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

/// A language change announced by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSwitch {
    pub language: Language,
    pub boundary: BoundaryConfig,
    /// Body supplied externally for the new language.
    pub initial_body: String,
}

/// Where the re-initialized buffer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Surface,
    Document,
    Initial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchResolution {
    pub source: ContentSource,
    /// Full buffer to show.
    pub content: String,
    /// The adopted body, if `content` carries the new scaffold.
    pub body: Option<String>,
}

/// Tracks the current language and resolves buffer content on a switch.
#[derive(Debug, Clone)]
pub struct LanguageSwitchController {
    language: Language,
}

impl LanguageSwitchController {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Apply a switch. Returns `None` when neither the language nor the
    /// scaffold changes.
    ///
    /// On a real language change, non-blank live content wins, then the
    /// replica's non-blank text, then the supplied initial body. The cached
    /// body is replaced only if the resolved content carries the new
    /// scaffold.
    pub fn switch(
        &mut self,
        switch: &LanguageSwitch,
        surface_text: &str,
        document_text: &str,
        enforcer: &mut BoundaryEnforcer,
    ) -> Option<SwitchResolution> {
        let language_changed = switch.language != self.language;
        if !language_changed && enforcer.config() == &switch.boundary {
            return None;
        }

        log::info!("Language switch {} -> {}", self.language, switch.language);
        self.language = switch.language;
        enforcer.set_config(switch.boundary.clone());

        let (source, content) = if !language_changed {
            (ContentSource::Initial, switch.boundary.wrap(&switch.initial_body))
        } else if !surface_text.trim().is_empty() {
            (ContentSource::Surface, surface_text.to_string())
        } else if !document_text.trim().is_empty() {
            (ContentSource::Document, document_text.to_string())
        } else {
            (ContentSource::Initial, switch.boundary.wrap(&switch.initial_body))
        };

        let body = enforcer.adopt_if_conforming(&content);
        if body.is_none() {
            log::debug!(
                "Content from {source:?} does not carry the {} scaffold yet; keeping cached body",
                switch.language
            );
        }

        Some(SwitchResolution { source, content, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn js_switch(initial: &str) -> LanguageSwitch {
        LanguageSwitch {
            language: Language::JavaScript,
            boundary: BoundaryConfig::new("function f() {\n  ", "\n}"),
            initial_body: initial.to_string(),
        }
    }

    #[test]
    fn test_language_codes() {
        for lang in Language::ALL {
            assert_eq!(lang.code().parse::<Language>().unwrap(), lang);
        }
        assert_eq!(Language::default(), Language::Python);
        assert!("rust".parse::<Language>().is_err());
        assert_eq!(Language::from_code_or_default("cobol"), Language::Python);
    }

    #[test]
    fn test_language_serde_codes() {
        assert_eq!(serde_json::to_string(&Language::Cpp).unwrap(), "\"cpp\"");
        let lang: Language = serde_json::from_str("\"dart\"").unwrap();
        assert_eq!(lang, Language::Dart);
    }

    #[test]
    fn test_live_content_wins() {
        let mut controller = LanguageSwitchController::new(Language::Python);
        let mut enforcer = BoundaryEnforcer::new(BoundaryConfig::new("def f():\n    ", ""), "pass");
        let live = "function f() {\n  return 1\n}";

        let res = controller
            .switch(&js_switch("/* default */"), live, "stale", &mut enforcer)
            .unwrap();
        assert_eq!(res.source, ContentSource::Surface);
        assert_eq!(res.content, live);
        assert_eq!(res.body.as_deref(), Some("return 1"));
        assert_eq!(enforcer.last_known_good(), "return 1");
        assert_eq!(controller.language(), Language::JavaScript);
    }

    #[test]
    fn test_blank_surface_falls_back_to_document() {
        let mut controller = LanguageSwitchController::new(Language::Python);
        let mut enforcer = BoundaryEnforcer::new(BoundaryConfig::unbounded(), "");
        let doc = "function f() {\n  x\n}";

        let res = controller.switch(&js_switch(""), "  \n", doc, &mut enforcer).unwrap();
        assert_eq!(res.source, ContentSource::Document);
        assert_eq!(res.body.as_deref(), Some("x"));
    }

    #[test]
    fn test_everything_blank_uses_initial() {
        let mut controller = LanguageSwitchController::new(Language::Python);
        let mut enforcer = BoundaryEnforcer::new(BoundaryConfig::unbounded(), "");

        let res = controller.switch(&js_switch("let a;"), "", "", &mut enforcer).unwrap();
        assert_eq!(res.source, ContentSource::Initial);
        assert_eq!(res.content, "function f() {\n  let a;\n}");
        assert_eq!(enforcer.last_known_good(), "let a;");
    }

    #[test]
    fn test_nonconforming_content_keeps_cached_body() {
        let mut controller = LanguageSwitchController::new(Language::Python);
        let mut enforcer = BoundaryEnforcer::new(BoundaryConfig::new("def f():\n    ", ""), "pass");

        // Live buffer still carries the old scaffold.
        let res = controller
            .switch(&js_switch(""), "def f():\n    pass", "", &mut enforcer)
            .unwrap();
        assert_eq!(res.source, ContentSource::Surface);
        assert!(res.body.is_none());
        assert_eq!(enforcer.last_known_good(), "pass");
        assert_eq!(enforcer.config().prefix, "function f() {\n  ");
    }

    #[test]
    fn test_same_language_same_scaffold_is_noop() {
        let mut controller = LanguageSwitchController::new(Language::JavaScript);
        let switch = js_switch("");
        let mut enforcer = BoundaryEnforcer::new(switch.boundary.clone(), "x");
        assert!(controller.switch(&switch, "anything", "", &mut enforcer).is_none());
        assert_eq!(enforcer.last_known_good(), "x");
    }

    #[test]
    fn test_same_language_new_scaffold_uses_initial() {
        let mut controller = LanguageSwitchController::new(Language::JavaScript);
        let mut enforcer = BoundaryEnforcer::new(BoundaryConfig::unbounded(), "x");

        let res = controller
            .switch(&js_switch("y"), "live text", "", &mut enforcer)
            .unwrap();
        assert_eq!(res.source, ContentSource::Initial);
        assert_eq!(res.body.as_deref(), Some("y"));
    }
}
