//! Лексер на базе logos.

use logos::Logos;

use super::error::LexError;
use super::token::{LineIndex, Span, Token, TokenKind};
use crate::diagnostics::Diagnostics;

/// Внутренние токены для logos.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")] // Пропускаем пробелы
enum LogosToken {
    // Комментарии
    #[regex(r"//[^\n]*")]
    LineComment,

    #[token("/*", block_comment)]
    BlockComment,

    // Ключевые слова (#[token] приоритетнее regex идентификатора)
    #[token("let")]
    #[token("var")]
    #[token("const")]
    #[token("function")]
    #[token("return")]
    #[token("if")]
    #[token("else")]
    #[token("while")]
    #[token("for")]
    #[token("break")]
    #[token("continue")]
    Keyword,

    #[token("true")]
    #[token("false")]
    Boolean,

    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,

    #[token("\"", string_literal)]
    String,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,

    // Операторы (многосимвольные выбираются по длине совпадения)
    #[token("==")]
    #[token("!=")]
    #[token("<=")]
    #[token(">=")]
    #[token("&&")]
    #[token("||")]
    #[token("++")]
    #[token("--")]
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token("%=")]
    #[token("+")]
    #[token("-")]
    #[token("*")]
    #[token("/")]
    #[token("%")]
    #[token("=")]
    #[token("<")]
    #[token(">")]
    #[token("!")]
    Operator,

    #[token("(")]
    #[token(")")]
    #[token("{")]
    #[token("}")]
    #[token("[")]
    #[token("]")]
    #[token(";")]
    #[token(",")]
    #[token(":")]
    Punctuation,
}

/// Дочитать блочный комментарий до `*/`. Без закрытия ошибка тянется до конца файла.
fn block_comment(lex: &mut logos::Lexer<LogosToken>) -> bool {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => {
            lex.bump(lex.remainder().len());
            false
        }
    }
}

/// Дочитать строковый литерал до закрывающей кавычки в пределах строки.
fn string_literal(lex: &mut logos::Lexer<LogosToken>) -> bool {
    let mut escaped = false;
    for (i, c) in lex.remainder().char_indices() {
        match c {
            '\n' => {
                lex.bump(i);
                return false;
            }
            '\\' if !escaped => escaped = true,
            '"' if !escaped => {
                lex.bump(i + 1);
                return true;
            }
            _ => escaped = false,
        }
    }
    lex.bump(lex.remainder().len());
    false
}

/// Обработка escape-последовательностей в строке.
pub fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some('0') => result.push('\0'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// Лексер. Не хранит состояния между вызовами `tokenize`.
pub struct Lexer<'a> {
    source: &'a str,
    lines: LineIndex<'a>,
    keep_comments: bool,
}

impl<'a> Lexer<'a> {
    /// Создать новый лексер.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            lines: LineIndex::new(source),
            keep_comments: false,
        }
    }

    /// Выдавать комментарии как токены `TokenKind::Comment`.
    pub fn with_comments(mut self, keep: bool) -> Self {
        self.keep_comments = keep;
        self
    }

    /// Разбить исходник на токены.
    ///
    /// Ошибки складываются в `diagnostics`, лексер продолжает работу
    /// со следующего символа.
    pub fn tokenize(&self, diagnostics: &mut Diagnostics) -> Vec<Token> {
        self.scan(|err| {
            diagnostics.push(err);
            true
        })
    }

    /// Разбить исходник на токены, остановившись на первой ошибке.
    pub fn try_tokenize(&self) -> Result<Vec<Token>, LexError> {
        let mut first = None;
        let tokens = self.scan(|err| {
            first = Some(err);
            false
        });
        match first {
            Some(err) => Err(err),
            None => Ok(tokens),
        }
    }

    /// Основной цикл. `on_error` возвращает `false`, чтобы остановить разбор.
    fn scan(&self, mut on_error: impl FnMut(LexError) -> bool) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut logos = LogosToken::lexer(self.source);

        while let Some(result) = logos.next() {
            let range = logos.span();
            let span = Span::new(range.start, range.end);
            match result {
                Ok(raw) => {
                    let kind = match raw {
                        LogosToken::LineComment | LogosToken::BlockComment => {
                            if !self.keep_comments {
                                continue;
                            }
                            TokenKind::Comment
                        }
                        LogosToken::Keyword => TokenKind::Keyword,
                        LogosToken::Boolean => TokenKind::Boolean,
                        LogosToken::Number => TokenKind::Number,
                        LogosToken::String => TokenKind::String,
                        LogosToken::Identifier => TokenKind::Identifier,
                        LogosToken::Operator => TokenKind::Operator,
                        LogosToken::Punctuation => TokenKind::Punctuation,
                    };
                    let (line, column) = self.lines.position(span.start);
                    tokens.push(Token::new(kind, logos.slice(), span, line, column));
                }
                Err(()) => {
                    if let Some(err) = self.classify_error(span) {
                        if !on_error(err) {
                            break;
                        }
                    }
                }
            }
        }

        tokens
    }

    /// Определить вид ошибки по фрагменту, на котором logos сдался.
    fn classify_error(&self, span: Span) -> Option<LexError> {
        // Хвост многобайтового символа: ошибка уже выдана на его первом байте.
        let rest = self.source.get(span.start..)?;
        let (line, column) = self.lines.position(span.start);
        if rest.starts_with("/*") {
            Some(LexError::UnterminatedComment { line, column })
        } else if rest.starts_with('"') {
            Some(LexError::UnterminatedString { line, column })
        } else {
            let ch = rest.chars().next()?;
            Some(LexError::UnexpectedCharacter { ch, line, column })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> (Vec<Token>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let tokens = Lexer::new(source).tokenize(&mut diagnostics);
        (tokens, diagnostics)
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lexer_basic() {
        let (tokens, diagnostics) = lex("let x = 42;");
        assert!(diagnostics.is_empty());
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Keyword,
                TokenKind::Identifier,
                TokenKind::Operator,
                TokenKind::Number,
                TokenKind::Punctuation,
            ]
        );
        assert_eq!(tokens[1].lexeme, "x");
        assert_eq!((tokens[3].line, tokens[3].column), (1, 9));
    }

    #[test]
    fn test_lexer_keywords_vs_identifiers() {
        let (tokens, _) = lex("if iffy for format true trueish");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Keyword,
                TokenKind::Identifier,
                TokenKind::Keyword,
                TokenKind::Identifier,
                TokenKind::Boolean,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn test_lexer_multichar_operators() {
        let (tokens, _) = lex("i++ <= += == != && ||");
        let lexemes: Vec<&str> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["i", "++", "<=", "+=", "==", "!=", "&&", "||"]);
    }

    #[test]
    fn test_lexer_string_keeps_quotes() {
        let (tokens, diagnostics) = lex(r#"s = "a \"b\" c";"#);
        assert!(diagnostics.is_empty());
        assert_eq!(tokens[2].kind, TokenKind::String);
        assert_eq!(tokens[2].lexeme, r#""a \"b\" c""#);
        assert_eq!(unescape_string(&tokens[2].lexeme[1..tokens[2].lexeme.len() - 1]), "a \"b\" c");
    }

    #[test]
    fn test_lexer_comments_are_trivia() {
        let (tokens, _) = lex("// comment\nx /* block\n comment */ y");
        assert_eq!(tokens.len(), 2);
        assert_eq!((tokens[0].line, tokens[0].column), (2, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (3, 13));
    }

    #[test]
    fn test_lexer_keeps_comments_on_request() {
        let mut diagnostics = Diagnostics::new();
        let tokens = Lexer::new("x // note")
            .with_comments(true)
            .tokenize(&mut diagnostics);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].kind, TokenKind::Comment);
        assert_eq!(tokens[1].lexeme, "// note");
    }

    #[test]
    fn test_lexer_unterminated_string() {
        let (tokens, diagnostics) = lex("let s = \"oops;\nlet t = 1;");
        let errors = diagnostics.lex_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("unterminated string"));
        assert_eq!((errors[0].line, errors[0].column), (1, 9));
        // Следующая строка разобрана нормально
        assert!(tokens.iter().any(|t| t.lexeme == "t" && t.line == 2));
    }

    #[test]
    fn test_lexer_unterminated_comment() {
        let (_, diagnostics) = lex("x = 1; /* never closed");
        let errors = diagnostics.lex_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("unterminated block comment"));
    }

    #[test]
    fn test_lexer_unexpected_character_recovers() {
        let (tokens, diagnostics) = lex("x = 1 @ 2;");
        let errors = diagnostics.lex_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("'@'"));
        assert_eq!(tokens.len(), 5);
    }

    #[test]
    fn test_lexer_lossless_modulo_trivia() {
        let source = "for (let i = 0; i < n; i++) {\n  total += i; // sum\n}\n";
        let mut diagnostics = Diagnostics::new();
        let tokens = Lexer::new(source).with_comments(true).tokenize(&mut diagnostics);

        let mut rebuilt = String::new();
        let mut cursor = 0;
        for token in &tokens {
            let gap = &source[cursor..token.span.start];
            assert!(gap.chars().all(char::is_whitespace));
            rebuilt.push_str(gap);
            rebuilt.push_str(&token.lexeme);
            cursor = token.span.end;
        }
        rebuilt.push_str(&source[cursor..]);
        assert_eq!(rebuilt, source);
    }
}
