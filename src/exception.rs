//! Errors as seen by the logger.
//!
//! Rust has no exception objects, so callers describe a failure with an
//! [`Exception`] value: type name, message, captured stack frames, auxiliary
//! data and an owned chain of inner exceptions. The logger turns it into an
//! immutable, sanitized [`ExceptionInfo`] snapshot once per record.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::backtrace::Backtrace;
use std::error::Error;

use crate::properties::sanitize_map;
use crate::sanitize::Sanitizer;

/// Inner-exception chains are cut off below this depth.
pub const MAX_EXCEPTION_DEPTH: usize = 16;

lazy_static! {
    static ref FRAME_SYMBOL: Regex = Regex::new(r"^\s*\d+:\s+(.+?)\s*$").unwrap();
    static ref FRAME_LOCATION: Regex = Regex::new(r"^\s*at\s+(.+?):(\d+)(?::\d+)?\s*$").unwrap();
    static ref SYMBOL_HASH: Regex = Regex::new(r"::h[0-9a-f]{16}$").unwrap();
}

/// One captured stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    pub declaring_type: String,
    pub method: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl StackFrame {
    pub fn new(declaring_type: impl Into<String>, method: impl Into<String>) -> Self {
        StackFrame {
            declaring_type: declaring_type.into(),
            method: method.into(),
            file: None,
            line: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// Split a demangled symbol path (`my_app::orders::place`) into its
    /// declaring path and method name.
    pub fn from_symbol(symbol: &str) -> Self {
        let symbol = SYMBOL_HASH.replace(symbol.trim(), "");
        match symbol.rsplit_once("::") {
            Some((declaring_type, method)) => StackFrame::new(declaring_type, method),
            None => StackFrame::new("", symbol.as_ref()),
        }
    }

    /// `"{declaring type}.{method}(), {file} line {line}"`
    pub fn description(&self) -> String {
        format!(
            "{}.{}(), {} line {}",
            self.declaring_type,
            self.method,
            self.file.as_deref().unwrap_or(""),
            self.line.unwrap_or(0)
        )
    }
}

/// Parse the textual form of a captured [`Backtrace`] into frames.
pub fn parse_backtrace(text: &str) -> Vec<StackFrame> {
    let mut frames: Vec<StackFrame> = Vec::new();
    for line in text.lines() {
        if let Some(caps) = FRAME_LOCATION.captures(line) {
            if let Some(frame) = frames.last_mut() {
                frame.file = Some(caps[1].to_string());
                frame.line = caps[2].parse().ok();
            }
        } else if let Some(caps) = FRAME_SYMBOL.captures(line) {
            frames.push(StackFrame::from_symbol(&caps[1]));
        }
    }
    frames
}

/// Frames of the capture machinery itself, which precede the caller.
fn is_capture_frame(frame: &StackFrame) -> bool {
    let path = frame.declaring_type.trim_start_matches('<');
    path.starts_with("std::backtrace") || path.starts_with("fluent_log_sink::exception::Exception")
}

/// Parsed frames with the leading capture frames dropped, so the first
/// frame is the code that captured the backtrace.
fn caller_frames(text: &str) -> Vec<StackFrame> {
    parse_backtrace(text)
        .into_iter()
        .skip_while(is_capture_frame)
        .collect()
}

/// A failure handed to the logger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exception {
    pub type_name: String,
    pub message: String,
    pub source: Option<String>,
    /// Innermost (throwing) frame first.
    pub frames: Vec<StackFrame>,
    /// Raw stack text; rendered from `frames` when absent.
    pub stack_trace: Option<String>,
    pub data: Map<String, Value>,
    pub inner: Option<Box<Exception>>,
    /// Set for HTTP-layer failures that carry a numeric error code.
    pub http_error_code: Option<i32>,
}

impl Exception {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Exception {
            type_name: type_name.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// Like [`Exception::new`], with the current stack captured.
    pub fn capture(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(type_name, message).with_backtrace(&Backtrace::force_capture())
    }

    /// Snapshot a Rust error and its `source()` chain.
    pub fn from_error<E: Error + 'static>(error: &E) -> Self {
        let mut exception = Exception::new(std::any::type_name::<E>(), error.to_string());
        exception.inner = error
            .source()
            .map(|source| Box::new(Self::from_source(source, 2)));
        exception
    }

    fn from_source(error: &(dyn Error + 'static), depth: usize) -> Self {
        let mut exception = Exception::new("std::error::Error", error.to_string());
        if depth < MAX_EXCEPTION_DEPTH {
            exception.inner = error
                .source()
                .map(|source| Box::new(Self::from_source(source, depth + 1)));
        }
        exception
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_frame(mut self, frame: StackFrame) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn with_frames(mut self, frames: impl IntoIterator<Item = StackFrame>) -> Self {
        self.frames.extend(frames);
        self
    }

    pub fn with_backtrace(mut self, backtrace: &Backtrace) -> Self {
        let text = backtrace.to_string();
        self.frames = caller_frames(&text);
        self.stack_trace = Some(text);
        self
    }

    pub fn with_stack_trace(mut self, text: impl Into<String>) -> Self {
        self.stack_trace = Some(text.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_inner(mut self, inner: Exception) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    pub fn with_http_error_code(mut self, code: i32) -> Self {
        self.http_error_code = Some(code);
        self
    }

    /// Stack text: the raw capture if present, otherwise one `at` line per
    /// frame. Empty when nothing was captured.
    pub fn stack_trace_text(&self) -> String {
        match &self.stack_trace {
            Some(text) => text.clone(),
            None => self
                .frames
                .iter()
                .map(|f| format!("   at {}", f.description()))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn has_stack_trace(&self) -> bool {
        !self.frames.is_empty() || self.stack_trace.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Immutable, sanitized snapshot of an [`Exception`] stored in the record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExceptionInfo {
    pub message: String,
    pub source: Option<String>,
    pub stack_trace: Option<String>,
    pub exception_type_name: String,
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner_exception: Option<Box<ExceptionInfo>>,
}

impl ExceptionInfo {
    pub fn new(exception: &Exception, sanitizer: &Sanitizer) -> Self {
        Self::at_depth(exception, sanitizer, 1)
    }

    fn at_depth(exception: &Exception, sanitizer: &Sanitizer, depth: usize) -> Self {
        let stack_trace = exception.stack_trace_text();
        let inner_exception = match &exception.inner {
            Some(inner) if depth < MAX_EXCEPTION_DEPTH => {
                Some(Box::new(Self::at_depth(inner, sanitizer, depth + 1)))
            }
            _ => None,
        };
        ExceptionInfo {
            message: sanitizer.sanitize(&exception.message),
            source: sanitizer.sanitize_opt(exception.source.as_deref()),
            stack_trace: (!stack_trace.is_empty()).then(|| sanitizer.sanitize(&stack_trace)),
            exception_type_name: exception.type_name.clone(),
            data: sanitize_map(sanitizer, exception.data.clone()),
            inner_exception,
        }
    }

    /// Number of snapshots in the chain, this one included.
    pub fn depth(&self) -> usize {
        1 + self.inner_exception.as_ref().map_or(0, |inner| inner.depth())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RegexReplacementRule, SanitizerRules};
    use std::fmt;

    #[test]
    fn describes_frames() {
        let frame = StackFrame::new("my_app::orders::OrderService", "place").at("src/orders.rs", 42);
        assert_eq!(
            frame.description(),
            "my_app::orders::OrderService.place(), src/orders.rs line 42"
        );
        assert_eq!(StackFrame::new("a", "b").description(), "a.b(),  line 0");
    }

    #[test]
    fn splits_symbols_and_strips_hashes() {
        let frame = StackFrame::from_symbol("my_app::orders::place::h0123456789abcdef");
        assert_eq!(frame.declaring_type, "my_app::orders");
        assert_eq!(frame.method, "place");
    }

    #[test]
    fn parses_backtrace_text() {
        let text = "   0: my_app::orders::place\n             at ./src/orders.rs:42:9\n   1: my_app::main\n             at ./src/main.rs:7:5\n   2: std::rt::lang_start\n";
        let frames = parse_backtrace(text);
        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames[0].description(),
            "my_app::orders.place(), ./src/orders.rs line 42"
        );
        assert_eq!(frames[1].line, Some(7));
        assert_eq!(frames[2].file, None);
    }

    #[test]
    fn capture_frames_are_skipped() {
        let text = "   0: std::backtrace_rs::backtrace::libunwind::trace\n   1: std::backtrace::Backtrace::create\n   2: std::backtrace::Backtrace::force_capture\n   3: fluent_log_sink::exception::Exception::capture\n             at ./src/exception.rs:132:41\n   4: my_app::orders::place\n             at ./src/orders.rs:42:9\n   5: std::backtrace::report\n";
        let frames = caller_frames(text);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].description(), "my_app::orders.place(), ./src/orders.rs line 42");
    }

    #[inline(never)]
    fn capture_here() -> Exception {
        Exception::capture("E", "boom")
    }

    #[test]
    fn captured_exception_starts_at_the_caller() {
        let exception = capture_here();
        assert!(!exception.frames.iter().take(1).any(is_capture_frame));
        assert!(exception.stack_trace.is_some());
    }

    #[derive(Debug)]
    struct Outer(Inner);
    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("outer failed")
        }
    }
    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("inner failed")
        }
    }
    impl Error for Outer {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }
    impl Error for Inner {}

    #[test]
    fn from_error_walks_the_source_chain() {
        let exception = Exception::from_error(&Outer(Inner));
        assert!(exception.type_name.ends_with("Outer"));
        assert_eq!(exception.message, "outer failed");
        assert_eq!(exception.inner.as_ref().unwrap().message, "inner failed");
    }

    #[test]
    fn snapshot_sanitizes_message_and_data() {
        let sanitizer = Sanitizer::new(&SanitizerRules {
            regex_replacements: vec![RegexReplacementRule {
                pattern: r#"password=\\?".*"#.into(),
                replacement: None,
            }],
            ..SanitizerRules::default()
        })
        .unwrap();

        let exception = Exception::new(
            "HttpRequestValidationException",
            "A potentially dangerous Request.Form value was detected from the client (_ctl0:ContentBody:conSignIn:txtExistingPassword=\"Aa9W7+&#+%@\").",
        )
        .with_data("form", "password=abc")
        .with_data("missing", Value::Null);

        let info = ExceptionInfo::new(&exception, &sanitizer);
        assert_eq!(
            info.message,
            "A potentially dangerous Request.Form value was detected from the client (_ctl0:ContentBody:conSignIn:txtExisting************"
        );
        assert_eq!(info.data["form"], "password=****");
        assert!(!info.data.contains_key("missing"));
        assert_eq!(info.stack_trace, None);
    }

    #[test]
    fn snapshot_caps_inner_chain_depth() {
        let mut exception = Exception::new("Leaf", "leaf");
        for i in 0..40 {
            exception = Exception::new("Wrapper", format!("level {i}")).with_inner(exception);
        }
        let info = ExceptionInfo::new(&exception, &Sanitizer::disabled());
        assert_eq!(info.depth(), MAX_EXCEPTION_DEPTH);
    }

    #[test]
    fn serializes_with_pascal_case_keys() {
        let info = ExceptionInfo::new(
            &Exception::new("E", "boom").with_inner(Exception::new("I", "cause")),
            &Sanitizer::disabled(),
        );
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["ExceptionTypeName"], "E");
        assert_eq!(value["InnerException"]["Message"], "cause");
    }
}
