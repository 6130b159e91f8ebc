//! Translation path templates.
//!
//! Templates use the remote platform's `%token%` convention. File tokens are
//! derived from the source path, language tokens from the language being
//! expanded, optionally overridden through the project's language mapping.
//! Substitution is a single regex pass, so a value that happens to contain
//! `%...%` is never expanded a second time.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%([a-z_]+)%").expect("valid placeholder regex"));

/// Target language as reported by the remote project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Language {
    pub id: String,
    pub name: String,
    pub two_letters_code: String,
    pub three_letters_code: String,
    pub locale: String,
    pub android_code: String,
    pub osx_code: String,
    pub osx_locale: String,
}

impl Language {
    /// Built-in value for a language token (without `%`).
    fn builtin_value(&self, key: &str) -> Option<String> {
        let value = match key {
            "language" => self.name.clone(),
            "two_letters_code" => self.two_letters_code.clone(),
            "three_letters_code" => self.three_letters_code.clone(),
            "locale" => self.locale.clone(),
            "locale_with_underscore" => self.locale.replace('-', "_"),
            "android_code" => self.android_code.clone(),
            "osx_code" => self.osx_code.clone(),
            "osx_locale" => self.osx_locale.clone(),
            _ => return None,
        };
        Some(value)
    }
}

/// Per-language overrides of language tokens, keyed by language id and then
/// by token name (`two_letters_code`, `locale`, `name`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageMapping(HashMap<String, HashMap<String, String>>);

impl LanguageMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        language_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.0
            .entry(language_id.into())
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn get(&self, language_id: &str, key: &str) -> Option<&str> {
        let overrides = self.0.get(language_id)?;
        // `%language%` is stored under `name` by the platform
        let lookup = if key == "language" { "name" } else { key };
        overrides.get(lookup).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// File-derived token values for one source path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTokens {
    original_file_name: String,
    file_name: String,
    file_extension: String,
    original_path: String,
}

impl SourceTokens {
    pub fn from_path(source_path: &str) -> Self {
        let normalized = normalize_path(source_path);
        let (original_path, original_file_name) = match normalized.rsplit_once('/') {
            Some((parent, name)) => (parent.to_string(), name.to_string()),
            None => (String::new(), normalized.clone()),
        };
        let (file_name, file_extension) = match original_file_name.rsplit_once('.') {
            Some((stem, ext)) => (stem.to_string(), ext.to_string()),
            None => (original_file_name.clone(), String::new()),
        };

        Self {
            original_file_name,
            file_name,
            file_extension,
            original_path,
        }
    }

    fn value(&self, key: &str) -> Option<&str> {
        match key {
            "original_file_name" => Some(&self.original_file_name),
            "file_name" => Some(&self.file_name),
            "file_extension" => Some(&self.file_extension),
            "original_path" => Some(&self.original_path),
            _ => None,
        }
    }
}

/// Expands every known token of `template` for one (source, language) pair
/// and normalises the result. Unknown tokens are kept verbatim.
pub fn resolve(
    template: &str,
    source: &SourceTokens,
    language: &Language,
    mapping: &LanguageMapping,
) -> String {
    let expanded = PLACEHOLDER_REGEX.replace_all(template, |caps: &Captures| {
        let key = &caps[1];
        if let Some(value) = source.value(key) {
            return value.to_string();
        }
        if let Some(value) = mapping.get(&language.id, key) {
            return value.to_string();
        }
        language
            .builtin_value(key)
            .unwrap_or_else(|| caps[0].to_string())
    });
    normalize_path(&expanded)
}

/// Expands `template` for one source across all `languages`, in language
/// order.
///
/// Two languages may yield the same path when the template carries no
/// language token; both entries are returned and consumers keyed by path
/// keep the later one.
pub fn expand<'a>(
    template: &str,
    source_path: &str,
    languages: &'a [Language],
    mapping: &LanguageMapping,
) -> Vec<(&'a Language, String)> {
    let tokens = SourceTokens::from_path(source_path);
    languages
        .iter()
        .map(|language| (language, resolve(template, &tokens, language, mapping)))
        .collect()
}

/// Slash-separated, relative form of a path: backslashes become `/`, empty
/// and `.` segments are dropped.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Joins slash-separated fragments, skipping empty ones.
pub fn join_paths(parts: &[&str]) -> String {
    normalize_path(&parts.join("/"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn language(id: &str, two: &str, locale: &str) -> Language {
        Language {
            id: id.to_string(),
            name: id.to_uppercase(),
            two_letters_code: two.to_string(),
            three_letters_code: format!("{two}x"),
            locale: locale.to_string(),
            android_code: locale.replace('-', "-r"),
            osx_code: format!("{two}.lproj"),
            osx_locale: two.to_string(),
        }
    }

    #[test]
    fn splits_source_tokens() {
        let tokens = SourceTokens::from_path("/src/a/strings.en.json");
        assert_eq!(tokens.value("original_file_name"), Some("strings.en.json"));
        assert_eq!(tokens.value("file_name"), Some("strings.en"));
        assert_eq!(tokens.value("file_extension"), Some("json"));
        assert_eq!(tokens.value("original_path"), Some("src/a"));

        let bare = SourceTokens::from_path("Makefile");
        assert_eq!(bare.value("file_extension"), Some(""));
        assert_eq!(bare.value("original_path"), Some(""));
    }

    #[test]
    fn expands_per_language() {
        let languages = vec![language("fr", "fr", "fr-FR"), language("de", "de", "de-DE")];
        let paths = expand(
            "translations/%two_letters_code%/%file_name%.json",
            "strings.json",
            &languages,
            &LanguageMapping::new(),
        );
        let rendered: Vec<_> = paths.iter().map(|(_, path)| path.as_str()).collect();
        assert_eq!(
            rendered,
            vec!["translations/fr/strings.json", "translations/de/strings.json"]
        );
    }

    #[test]
    fn original_file_name_keeps_the_extension() {
        let fr = language("fr", "fr", "fr-FR");
        let path = resolve(
            "/%locale_with_underscore%/%original_path%/%original_file_name%",
            &SourceTokens::from_path("values/strings.xml"),
            &fr,
            &LanguageMapping::new(),
        );
        assert_eq!(path, "fr_FR/values/strings.xml");
    }

    #[test]
    fn mapping_overrides_builtin_codes() {
        let pt = language("pt-BR", "pt", "pt-BR");
        let mut mapping = LanguageMapping::new();
        mapping.insert("pt-BR", "two_letters_code", "br");
        mapping.insert("pt-BR", "name", "Brasileiro");

        let path = resolve(
            "%two_letters_code%/%language%/%locale%.json",
            &SourceTokens::from_path("a.json"),
            &pt,
            &mapping,
        );
        assert_eq!(path, "br/Brasileiro/pt-BR.json");
    }

    #[test]
    fn unknown_tokens_are_left_untouched() {
        let fr = language("fr", "fr", "fr-FR");
        let path = resolve(
            "%custom%/%two_letters_code%",
            &SourceTokens::from_path("a.json"),
            &fr,
            &LanguageMapping::new(),
        );
        assert_eq!(path, "%custom%/fr");
    }

    #[test]
    fn values_are_not_expanded_twice() {
        let fr = language("fr", "fr", "fr-FR");
        let path = resolve(
            "out/%original_file_name%",
            &SourceTokens::from_path("%locale%.json"),
            &fr,
            &LanguageMapping::new(),
        );
        assert_eq!(path, "out/%locale%.json");
    }

    #[test]
    fn template_without_language_tokens_collapses() {
        let languages = vec![language("fr", "fr", "fr-FR"), language("de", "de", "de-DE")];
        let mapping = LanguageMapping::new();
        let paths = expand("static/%original_file_name%", "a.json", &languages, &mapping);
        assert_eq!(paths[0].1, paths[1].1);
    }

    #[test]
    fn normalizes_separators() {
        assert_eq!(normalize_path("\\a\\\\b/./c/"), "a/b/c");
        assert_eq!(join_paths(&["", "src", "/x/y.json"]), "src/x/y.json");
    }
}
