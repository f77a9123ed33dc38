//! Сбор, упорядочивание и оформление диагностик всех стадий.
//!
//! Стадии не бросают восстанавливаемые ошибки, а складывают их в явный
//! приёмник [`Diagnostics`], который передаётся по `&mut`. В конце
//! [`ErrorReporter`] сортирует их по позиции и дополняет фрагментом
//! исходника и подсказками.

use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::parser::{LexError, ParseError};
use crate::semantic::SemanticError;

/// Серьёзность диагностики.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Стадия, на которой обнаружена проблема.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Lex,
    Syntax,
    Semantic,
    /// Нарушение инварианта конвейера; прерывает компиляцию.
    Internal,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Lex => "lex",
            Self::Syntax => "syntax",
            Self::Semantic => "semantic",
            Self::Internal => "internal",
        }
    }
}

/// Диагностика в том виде, в каком её видит потребитель результата.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerError {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub line: usize,
    pub column: usize,
    /// Строки исходника вокруг ошибки; заполняется [`ErrorReporter`].
    pub context: String,
    /// Подсказки; заполняются [`ErrorReporter`].
    pub suggestions: Vec<String>,
}

impl CompilerError {
    pub fn new(kind: ErrorKind, severity: Severity, message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            line,
            column,
            context: String::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for CompilerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        writeln!(f, "{}[{}]: {}", severity, self.kind.name(), self.message)?;
        write!(f, "  --> {}:{}", self.line, self.column)?;
        if !self.context.is_empty() {
            write!(f, "\n{}", self.context)?;
        }
        for suggestion in &self.suggestions {
            write!(f, "\n  help: {}", suggestion)?;
        }
        Ok(())
    }
}

impl From<LexError> for CompilerError {
    fn from(err: LexError) -> Self {
        let (line, column) = err.position();
        Self::new(ErrorKind::Lex, Severity::Error, err.to_string(), line, column)
    }
}

impl From<ParseError> for CompilerError {
    fn from(err: ParseError) -> Self {
        let (line, column) = err.position();
        let kind = if err.is_fatal() {
            ErrorKind::Internal
        } else {
            ErrorKind::Syntax
        };
        Self::new(kind, Severity::Error, err.to_string(), line, column)
    }
}

impl From<SemanticError> for CompilerError {
    fn from(err: SemanticError) -> Self {
        let (line, column) = err.position();
        let severity = if err.is_warning() {
            Severity::Warning
        } else {
            Severity::Error
        };
        Self::new(ErrorKind::Semantic, severity, err.to_string(), line, column)
    }
}

impl From<CompileError> for CompilerError {
    fn from(err: CompileError) -> Self {
        let (line, column) = err.position();
        Self::new(ErrorKind::Internal, Severity::Error, err.to_string(), line, column)
    }
}

/// Накопитель диагностик одного запуска компиляции.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<CompilerError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавить диагностику.
    pub fn push(&mut self, err: impl Into<CompilerError>) {
        self.entries.push(err.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompilerError> {
        self.entries.iter()
    }

    /// Есть ли хотя бы одна ошибка (предупреждения не считаются).
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(CompilerError::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.entries.len() - self.error_count()
    }

    /// Диагностики одной стадии.
    pub fn of_kind(&self, kind: ErrorKind) -> Vec<&CompilerError> {
        self.entries.iter().filter(|e| e.kind == kind).collect()
    }

    pub fn lex_errors(&self) -> Vec<&CompilerError> {
        self.of_kind(ErrorKind::Lex)
    }

    pub fn syntax_errors(&self) -> Vec<&CompilerError> {
        self.of_kind(ErrorKind::Syntax)
    }

    pub fn semantic_errors(&self) -> Vec<&CompilerError> {
        self.of_kind(ErrorKind::Semantic)
    }

    pub fn into_vec(self) -> Vec<CompilerError> {
        self.entries
    }
}

/// Подсказки по шаблонам сообщений. Проверяются по порядку, первое
/// совпадение побеждает.
const SUGGESTION_RULES: &[(&[&str], &[&str])] = &[
    (
        &["unexpected token", "unexpected character"],
        &[
            "Check for a missing operator, separator or ';' before this token",
            "Make sure parentheses and braces are balanced",
            "Remove the token if it is not needed here",
        ],
    ),
    (
        &["undeclared", "undefined"],
        &[
            "Declare the name with 'let', 'var' or 'const' before using it",
            "Check the spelling of the identifier",
            "Make sure the declaration is in an enclosing scope",
        ],
    ),
    (
        &["type mismatch"],
        &[
            "Make both operands the same type",
            "Check the declared type of the variable",
            "Convert the value explicitly before using it here",
        ],
    ),
    (
        &["missing", "expected"],
        &[
            "Add the missing element shown in the message",
            "Check that every '(' '[' '{' has a matching closing symbol",
        ],
    ),
];

const GENERIC_SUGGESTIONS: &[&str] = &[
    "Check the syntax near the reported position",
    "Compare the statement with a working example",
    "Split the statement into smaller parts to isolate the problem",
];

/// Подсказки для сообщения об ошибке.
pub fn suggestions_for(message: &str) -> Vec<String> {
    let lower = message.to_lowercase();
    let suggestions = SUGGESTION_RULES
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| mentions(&lower, p)))
        .map_or(GENERIC_SUGGESTIONS, |(_, suggestions)| *suggestions);
    suggestions.iter().map(|s| s.to_string()).collect()
}

/// Шаблон встречается в сообщении с начала слова: `expected` не
/// совпадает внутри `unexpected`.
fn mentions(message: &str, pattern: &str) -> bool {
    message.match_indices(pattern).any(|(at, _)| {
        !message[..at]
            .chars()
            .next_back()
            .is_some_and(char::is_alphanumeric)
    })
}

/// Сводит диагностики всех стадий в один упорядоченный список.
pub struct ErrorReporter<'a> {
    lines: Vec<&'a str>,
    context_lines: usize,
}

impl<'a> ErrorReporter<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines().collect(),
            context_lines: 2,
        }
    }

    /// Сколько строк показывать до и после строки с ошибкой.
    pub fn with_context_lines(mut self, context_lines: usize) -> Self {
        self.context_lines = context_lines;
        self
    }

    /// Отсортировать по (строка, столбец) и дополнить контекстом и подсказками.
    ///
    /// Сортировка устойчивая: диагностики с одинаковой позицией сохраняют
    /// порядок стадий.
    pub fn aggregate(&self, errors: impl IntoIterator<Item = CompilerError>) -> Vec<CompilerError> {
        let mut errors: Vec<CompilerError> = errors.into_iter().collect();
        errors.sort_by_key(|e| (e.line, e.column));
        for err in &mut errors {
            err.context = self.context_snippet(err.line);
            err.suggestions = suggestions_for(&err.message);
        }
        errors
    }

    /// Строки вокруг `line` с номерами; строка ошибки помечена `>`.
    pub fn context_snippet(&self, line: usize) -> String {
        if self.lines.is_empty() {
            return String::new();
        }
        let line = line.clamp(1, self.lines.len());
        let first = line.saturating_sub(self.context_lines).max(1);
        let last = (line + self.context_lines).min(self.lines.len());
        let width = last.to_string().len();

        (first..=last)
            .map(|n| {
                let marker = if n == line { '>' } else { ' ' };
                format!("{} {:>width$} | {}", marker, n, self.lines[n - 1], width = width)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_at(message: &str, line: usize, column: usize) -> CompilerError {
        CompilerError::new(ErrorKind::Syntax, Severity::Error, message, line, column)
    }

    #[test]
    fn test_aggregate_orders_by_position() {
        let reporter = ErrorReporter::new("a\nb\nc\n");
        let errors = reporter.aggregate(vec![
            error_at("third", 3, 1),
            error_at("second", 1, 5),
            error_at("first", 1, 2),
        ]);
        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_context_snippet_is_clamped() {
        let reporter = ErrorReporter::new("l1\nl2\nl3\nl4\nl5\nl6");
        assert_eq!(reporter.context_snippet(1), "> 1 | l1\n  2 | l2\n  3 | l3");
        assert_eq!(
            reporter.context_snippet(4),
            "  2 | l2\n  3 | l3\n> 4 | l4\n  5 | l5\n  6 | l6"
        );
        // Позиция за концом файла прижимается к последней строке
        assert!(reporter.context_snippet(99).ends_with("> 6 | l6"));
    }

    #[test]
    fn test_context_snippet_empty_source() {
        assert_eq!(ErrorReporter::new("").context_snippet(1), "");
    }

    #[test]
    fn test_suggestions_follow_rule_order() {
        let unexpected = suggestions_for("unexpected token ';' at line 1, column 3: expected expression");
        assert!(unexpected[0].contains("missing operator"));

        let undeclared = suggestions_for("undeclared variable 'x' at line 1, column 1");
        assert!(undeclared[0].contains("Declare"));

        let mismatch = suggestions_for("type mismatch at line 2, column 4: cannot add boolean");
        assert!(mismatch[0].contains("same type"));

        let missing = suggestions_for("missing '}' at line 3, column 1: block is never closed");
        assert!(missing[0].contains("missing element"));

        let generic = suggestions_for("redeclaration of 'x'");
        assert_eq!(generic.len(), 3);
    }

    #[test]
    fn test_unexpected_character_is_not_a_missing_element() {
        let lex = suggestions_for("unexpected character '@' at line 1, column 5");
        assert!(lex[0].contains("missing operator"));

        let lex_error: CompilerError = LexError::UnexpectedCharacter {
            ch: '@',
            line: 1,
            column: 5,
        }
        .into();
        let reported = ErrorReporter::new("let a@ = 1;").aggregate(vec![lex_error]);
        assert!(!reported[0].suggestions.iter().any(|s| s.contains("missing element")));

        let expected = suggestions_for("expected ')' at line 2, column 1");
        assert!(expected[0].contains("missing element"));
        assert!(!mentions("unexpected end", "expected"));
    }

    #[test]
    fn test_diagnostics_counts() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(error_at("e", 1, 1));
        diagnostics.push(CompilerError::new(
            ErrorKind::Semantic,
            Severity::Warning,
            "w",
            2,
            1,
        ));
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(diagnostics.warning_count(), 1);
        assert_eq!(diagnostics.semantic_errors().len(), 1);
    }

    #[test]
    fn test_display_includes_help() {
        let reporter = ErrorReporter::new("let = 1;");
        let errors = reporter.aggregate(vec![error_at("unexpected token '='", 1, 5)]);
        let rendered = errors[0].to_string();
        assert!(rendered.starts_with("error[syntax]: unexpected token '='"));
        assert!(rendered.contains("> 1 | let = 1;"));
        assert!(rendered.contains("help: "));
    }
}
