//! Лексер и парсер входного языка.
//!
//! Входной язык: небольшое императивное подмножество в стиле C/JavaScript.
//!
//! # Синтаксис
//!
//! ```text
//! let x: number = 1;          // объявление (let | var | const)
//! x += 2; x++;                // присваивание и инкремент
//! if (x > 2) { ... } else { ... }
//! while (x < 10) { ... }
//! for (let i = 0; i < n; i++) { ... }
//! function f(a, b: string) { return a; }
//! let xs = [1, 2, 3];         // массив
//! /* блочный */ // и строчный комментарии
//! ```
//!
//! # Пример
//!
//! ```rust,ignore
//! use flowscope::diagnostics::Diagnostics;
//! use flowscope::parser::{parse, Lexer};
//!
//! let mut diagnostics = Diagnostics::new();
//! let tokens = Lexer::new("let x = 1;").tokenize(&mut diagnostics);
//! let tree = parse(&tokens, &mut diagnostics).unwrap();
//! ```

pub mod error;
pub mod lexer;
#[allow(clippy::module_inception)]
pub mod parser;
pub mod token;
pub mod tree;

pub use error::{LexError, ParseError};
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::{Span, Token, TokenKind};
pub use tree::{NodeId, NodeKind, ParseNode, ParseTree};

use crate::diagnostics::Diagnostics;

/// Разбить исходник на токены, остановившись на первой лексической ошибке.
///
/// Для накопления всех ошибок используйте [`Lexer::tokenize`] с
/// собственным [`Diagnostics`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).try_tokenize()
}

/// Разобрать токены в дерево. Комментарии, если они есть в потоке,
/// пропускаются.
///
/// Синтаксические ошибки попадают в `diagnostics`; `Err` означает
/// фатальную ошибку.
pub fn parse(tokens: &[Token], diagnostics: &mut Diagnostics) -> Result<ParseTree, ParseError> {
    parse_with_depth(tokens, diagnostics, parser::DEFAULT_MAX_DEPTH)
}

/// То же, что [`parse`], с явным лимитом вложенности.
pub fn parse_with_depth(
    tokens: &[Token],
    diagnostics: &mut Diagnostics,
    max_depth: usize,
) -> Result<ParseTree, ParseError> {
    if tokens.iter().any(|t| t.kind == TokenKind::Comment) {
        let filtered: Vec<Token> = tokens
            .iter()
            .filter(|t| t.kind != TokenKind::Comment)
            .cloned()
            .collect();
        Parser::new(&filtered, diagnostics)
            .with_max_depth(max_depth)
            .parse_program()
    } else {
        Parser::new(tokens, diagnostics)
            .with_max_depth(max_depth)
            .parse_program()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_ok() {
        let tokens = tokenize("while (x) { x = x - 1; }").unwrap();
        assert_eq!(tokens.len(), 12);
        assert_eq!(tokens[0].lexeme, "while");
    }

    #[test]
    fn test_tokenize_fails_on_first_error() {
        let err = tokenize("let s = \"open").unwrap_err();
        assert_eq!(err, LexError::UnterminatedString { line: 1, column: 9 });
    }

    #[test]
    fn test_parse_skips_comment_tokens() {
        let mut diagnostics = Diagnostics::new();
        let tokens = Lexer::new("let x = /* one */ 1; // done")
            .with_comments(true)
            .tokenize(&mut diagnostics);
        let tree = parse(&tokens, &mut diagnostics).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(tree.find_all(|k| matches!(k, NodeKind::VarDecl { .. })).len(), 1);
    }
}
