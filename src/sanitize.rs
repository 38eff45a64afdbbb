//! Pattern-based redaction of sensitive values in logged text.
//!
//! Three rule families are compiled from [`SanitizerRules`] and applied in a
//! fixed order (JSON fields, then URL-form-encoded fields, then raw regex
//! rules), each rule's output feeding the next one.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

use crate::config::SanitizerRules;
use crate::error::SetupError;

/// Marker written in place of a redacted JSON or form value.
pub const SCRUBBED: &str = "****";

/// Replacement used for raw regex rules that do not configure their own.
pub const DEFAULT_REGEX_REPLACEMENT: &str = "************";

lazy_static! {
    static ref VIEW_STATE_RULES: Vec<Replacement> = ["__VIEWSTATE", "__EVENTVALIDATION"]
        .iter()
        .map(|name| Replacement::url_form_encoded(name).expect("view state pattern compiles"))
        .collect();
    static ref DEFAULT_PORTS: Regex = Regex::new(r":(?:8080|80)([/?#]|$)").unwrap();
}

/// A single compiled pattern + replacement pair.
#[derive(Debug, Clone)]
struct Replacement {
    regex: Regex,
    replacement: String,
}

impl Replacement {
    fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, SetupError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| SetupError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Replacement {
            regex,
            replacement: replacement.into(),
        })
    }

    /// `"field":"value"`, `\"field\":\"value\"` or `"field": value` where an
    /// unquoted value runs up to the next comma, quote or newline.
    fn json(field: &str) -> Result<Self, SetupError> {
        let pattern = format!(
            r#"(\\?"?{}(?:"|\\")?\s*:\s*)(?:(\\?")(?:[^"\\\r\n]|\\[^"\r\n])*(\\?")?|[^,"\r\n]*)"#,
            regex::escape(field)
        );
        Self::new(&pattern, format!("${{1}}${{2}}{SCRUBBED}${{3}}"))
    }

    /// `field=value` at the start of the text or right after `&`.
    fn url_form_encoded(field: &str) -> Result<Self, SetupError> {
        let pattern = format!(r"((?:^|&){}=)[^&]+", regex::escape(field));
        Self::new(&pattern, format!("${{1}}{SCRUBBED}"))
    }

    fn apply(&self, content: &str) -> String {
        self.regex
            .replace_all(content, self.replacement.as_str())
            .into_owned()
    }
}

/// Compiled, immutable sensitive-field rule set.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    rules: Vec<Replacement>,
    /// Lowercased JSON and form field names.
    sensitive_fields: Vec<String>,
}

impl Sanitizer {
    /// Compile every configured rule. Fails only if a raw regex rule does
    /// not compile; field names are escaped.
    pub fn new(rules: &SanitizerRules) -> Result<Self, SetupError> {
        let mut compiled = Vec::with_capacity(
            rules.json_fields.len()
                + rules.url_form_encoded_fields.len()
                + rules.regex_replacements.len(),
        );
        for field in &rules.json_fields {
            compiled.push(Replacement::json(field)?);
        }
        for field in &rules.url_form_encoded_fields {
            compiled.push(Replacement::url_form_encoded(field)?);
        }
        for rule in &rules.regex_replacements {
            let replacement = rule
                .replacement
                .clone()
                .unwrap_or_else(|| DEFAULT_REGEX_REPLACEMENT.to_string());
            compiled.push(Replacement::new(&rule.pattern, replacement)?);
        }
        let mut sensitive_fields: Vec<String> = rules
            .json_fields
            .iter()
            .chain(&rules.url_form_encoded_fields)
            .map(|f| f.to_ascii_lowercase())
            .collect();
        sensitive_fields.sort();
        sensitive_fields.dedup();
        Ok(Sanitizer {
            rules: compiled,
            sensitive_fields,
        })
    }

    /// A sanitizer with no rules; every input passes through unchanged.
    pub fn disabled() -> Self {
        Sanitizer {
            rules: Vec::new(),
            sensitive_fields: Vec::new(),
        }
    }

    /// Whether `name` is a configured JSON or form field, ignoring case and
    /// any `+Type` key suffix.
    pub fn is_sensitive_field(&self, name: &str) -> bool {
        let base = name.split('+').next().unwrap_or(name);
        self.sensitive_fields
            .iter()
            .any(|f| f.eq_ignore_ascii_case(base))
    }

    /// Redact every configured sensitive value in `content`.
    pub fn sanitize(&self, content: &str) -> String {
        if content.is_empty() {
            return String::new();
        }
        self.rules
            .iter()
            .fold(content.to_string(), |acc, rule| rule.apply(&acc))
    }

    pub fn sanitize_opt(&self, content: Option<&str>) -> Option<String> {
        content.map(|c| self.sanitize(c))
    }

    /// Sanitization applied to every text value entering a property map.
    pub fn sanitize_property(&self, content: &str) -> String {
        remove_view_state(&self.sanitize(content))
    }
}

/// Scrub the ASP.NET `__VIEWSTATE` and `__EVENTVALIDATION` form fields.
pub fn remove_view_state(content: &str) -> String {
    VIEW_STATE_RULES
        .iter()
        .fold(content.to_string(), |acc, rule| rule.apply(&acc))
}

/// URL-decode a query string (or URL) and drop the default `:80` / `:8080`
/// port suffixes. Blank input yields an empty string.
pub fn clean_query_string(query: &str) -> String {
    if query.trim().is_empty() {
        return String::new();
    }
    let plus_decoded = query.replace('+', " ");
    let decoded = urlencoding::decode_binary(plus_decoded.as_bytes());
    let decoded = String::from_utf8_lossy(&decoded);
    DEFAULT_PORTS.replace_all(&decoded, "${1}").into_owned()
}
