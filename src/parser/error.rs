//! Ошибки лексера и парсера.

use super::token::Token;
use thiserror::Error;

/// Ошибка лексического анализа.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    /// Строковый литерал не закрыт до конца строки.
    #[error("unterminated string literal at line {line}, column {column}")]
    UnterminatedString { line: usize, column: usize },

    /// Блочный комментарий не закрыт до конца файла.
    #[error("unterminated block comment at line {line}, column {column}")]
    UnterminatedComment { line: usize, column: usize },

    /// Символ, не подходящий ни под одно правило.
    #[error("unexpected character '{ch}' at line {line}, column {column}")]
    UnexpectedCharacter { ch: char, line: usize, column: usize },
}

impl LexError {
    /// Получить позицию ошибки.
    pub fn position(&self) -> (usize, usize) {
        match self {
            Self::UnterminatedString { line, column }
            | Self::UnterminatedComment { line, column }
            | Self::UnexpectedCharacter { line, column, .. } => (*line, *column),
        }
    }
}

/// Ошибка синтаксического анализа.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Неожиданный токен.
    #[error("unexpected token '{found}' at line {line}, column {column}: expected {expected}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },

    /// Неожиданный конец ввода.
    #[error("missing {expected} at line {line}, column {column}: unexpected end of input")]
    UnexpectedEof {
        expected: String,
        line: usize,
        column: usize,
    },

    /// Незакрытый блок.
    #[error("missing '}}' at line {line}, column {column}: {construct} opened at line {opened_line} is never closed")]
    UnclosedBlock {
        construct: String,
        opened_line: usize,
        line: usize,
        column: usize,
    },

    /// Неверный литерал.
    #[error("invalid literal '{text}' at line {line}, column {column}")]
    InvalidLiteral {
        text: String,
        line: usize,
        column: usize,
    },

    /// Превышена допустимая глубина вложенности. Не восстанавливается.
    #[error("nesting deeper than {limit} levels at line {line}, column {column}")]
    NestingTooDeep {
        limit: usize,
        line: usize,
        column: usize,
    },
}

impl ParseError {
    /// Создать ошибку "неожиданный токен".
    pub fn unexpected_token(expected: impl Into<String>, found: &Token) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.lexeme.clone(),
            line: found.line,
            column: found.column,
        }
    }

    /// Создать ошибку "неожиданный конец".
    pub fn unexpected_eof(expected: impl Into<String>, line: usize, column: usize) -> Self {
        Self::UnexpectedEof {
            expected: expected.into(),
            line,
            column,
        }
    }

    /// Получить позицию ошибки.
    pub fn position(&self) -> (usize, usize) {
        match self {
            Self::UnexpectedToken { line, column, .. }
            | Self::UnexpectedEof { line, column, .. }
            | Self::UnclosedBlock { line, column, .. }
            | Self::InvalidLiteral { line, column, .. }
            | Self::NestingTooDeep { line, column, .. } => (*line, *column),
        }
    }

    /// Ошибка прерывает весь конвейер, а не только текущую конструкцию.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NestingTooDeep { .. })
    }
}
