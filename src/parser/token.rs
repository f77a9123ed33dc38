//! Токены и позиции в исходном коде.

use serde::{Deserialize, Serialize};

/// Позиция в исходном коде (байтовый диапазон).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Начальная позиция (байт).
    pub start: usize,
    /// Конечная позиция (байт, не включительно).
    pub end: usize,
}

impl Span {
    /// Создать новый Span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Категория токена.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Keyword,
    Identifier,
    /// Числовой литерал.
    Number,
    /// Строковый литерал (лексема включает кавычки).
    String,
    /// `true` / `false`.
    Boolean,
    Operator,
    Punctuation,
    /// Комментарий. Попадает в поток только в режиме `Lexer::with_comments`.
    Comment,
}

/// Токен с позицией. Строки и столбцы считаются с 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Точный фрагмент исходника.
    pub lexeme: String,
    pub span: Span,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, span: Span, line: usize, column: usize) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            span,
            line,
            column,
        }
    }

    /// Проверить, что токен является пунктуацией или оператор с данным текстом.
    pub fn is(&self, text: &str) -> bool {
        matches!(self.kind, TokenKind::Punctuation | TokenKind::Operator) && self.lexeme == text
    }

    /// Проверить, что токен является данным ключевым словом.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Keyword && self.lexeme == keyword
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.lexeme)
    }
}

/// Восстановить текст фрагмента по токенам.
///
/// Между токенами, которые в исходнике были разделены пробелами или
/// комментариями, вставляется ровно один пробел.
pub fn slice_text(tokens: &[Token]) -> String {
    let mut text = String::new();
    let mut prev_end: Option<usize> = None;
    for token in tokens {
        if let Some(end) = prev_end {
            if token.span.start > end {
                text.push(' ');
            }
        }
        text.push_str(&token.lexeme);
        prev_end = Some(token.span.end);
    }
    text
}

/// Индекс начал строк для перевода байтового смещения в (строка, столбец).
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            source,
            line_starts,
        }
    }

    /// Позиция (строка, столбец) для смещения; столбец считается в символах.
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        let start = self.line_starts[line];
        let column = match self.source.get(start..offset) {
            Some(prefix) => prefix.chars().count(),
            None => offset - start,
        };
        (line + 1, column + 1)
    }

    /// Количество строк в исходнике.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index_positions() {
        let index = LineIndex::new("ab\ncd\n\nx");
        assert_eq!(index.position(0), (1, 1));
        assert_eq!(index.position(1), (1, 2));
        assert_eq!(index.position(3), (2, 1));
        assert_eq!(index.position(6), (3, 1));
        assert_eq!(index.position(7), (4, 1));
        assert_eq!(index.line_count(), 4);
    }

    #[test]
    fn test_line_index_counts_chars_not_bytes() {
        let index = LineIndex::new("\"жж\" x");
        // "жж" занимает 4 байта, но 2 символа
        assert_eq!(index.position(6), (1, 5));
        assert_eq!(index.position(7), (1, 6));
    }

    #[test]
    fn test_slice_text_spacing() {
        let tokens = vec![
            Token::new(TokenKind::Identifier, "i", Span::new(0, 1), 1, 1),
            Token::new(TokenKind::Operator, "<", Span::new(2, 3), 1, 3),
            Token::new(TokenKind::Identifier, "n", Span::new(3, 4), 1, 4),
        ];
        assert_eq!(slice_text(&tokens), "i <n");
    }
}
