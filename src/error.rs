//! Неисправимые ошибки конвейера.
//!
//! Восстанавливаемые ошибки (лексические, синтаксические, семантические)
//! собираются в [`crate::diagnostics::Diagnostics`]. Здесь описаны только
//! сбои, после которых компиляция прерывается целиком.

use thiserror::Error;

/// Основной тип `Result` для стадий конвейера.
pub type CompileResult<T> = Result<T, CompileError>;

/// Сбой, прерывающий компиляцию.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("nesting deeper than {limit} levels at line {line}, column {column}")]
    NestingTooDeep {
        limit: usize,
        line: usize,
        column: usize,
    },

    #[error("{stage}: node {node} not found in parse tree")]
    NodeNotFound { stage: &'static str, node: usize },

    #[error("{stage}: malformed {construct} node at line {line}, column {column}")]
    MalformedNode {
        stage: &'static str,
        construct: &'static str,
        line: usize,
        column: usize,
    },

    #[error("control flow: {0}")]
    InvalidControlFlow(String),

    /// Сбой, известный только по тексту сообщения (например, паника стадии).
    #[error("internal error at line {line}, column {column}: {message}")]
    Internal {
        message: String,
        line: usize,
        column: usize,
    },
}

impl CompileError {
    /// Позиция сбоя; `(1, 1)`, если она неизвестна.
    pub fn position(&self) -> (usize, usize) {
        match self {
            Self::NestingTooDeep { line, column, .. }
            | Self::MalformedNode { line, column, .. }
            | Self::Internal { line, column, .. } => (*line, *column),
            Self::NodeNotFound { .. } | Self::InvalidControlFlow(_) => (1, 1),
        }
    }

    /// Построить ошибку из произвольного текста.
    ///
    /// Совместимость со строковыми ошибками: позиция извлекается из
    /// подстрок `line N` и `column N`.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let (line, column) = extract_position(&message);
        Self::Internal {
            message,
            line,
            column,
        }
    }
}

impl From<crate::parser::ParseError> for CompileError {
    fn from(err: crate::parser::ParseError) -> Self {
        match err {
            crate::parser::ParseError::NestingTooDeep {
                limit,
                line,
                column,
            } => Self::NestingTooDeep {
                limit,
                line,
                column,
            },
            other => Self::from_message(other.to_string()),
        }
    }
}

/// Извлечь позицию из сообщения об ошибке.
fn extract_position(message: &str) -> (usize, usize) {
    let lower = message.to_lowercase();
    let line = number_after(&lower, "line ").unwrap_or(1);
    let column = number_after(&lower, "column ").unwrap_or(1);
    (line.max(1), column.max(1))
}

/// Число сразу после первого вхождения `prefix`, за которым идёт цифра.
fn number_after(text: &str, prefix: &str) -> Option<usize> {
    text.match_indices(prefix).find_map(|(idx, _)| {
        let rest = &text[idx + prefix.len()..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    })
}
