//! # Flowscope
//!
//! Статический анализатор небольшого императивного языка в стиле C/JavaScript.
//!
//! ## Конвейер
//!
//! - [`parser`] - лексер (logos) и парсер рекурсивным спуском с panic-mode
//!   восстановлением
//! - [`semantic`] - области видимости, разрешение имён, проверка типов
//! - [`control_flow`] - дерево потока управления
//! - [`complexity`] - цикломатическая сложность, оценки времени и памяти
//! - [`diagnostics`] - сбор и оформление ошибок всех стадий
//! - [`compiler`] - оркестратор, функция [`compile`]
//!
//! ## Пример
//!
//! ```rust,ignore
//! use flowscope::compile;
//!
//! let result = compile("for (let i = 0; i < n; i++) { total += i; }");
//! let complexity = result.complexity.unwrap();
//! assert_eq!(complexity.time_complexity.to_string(), "O(n)");
//! ```

// === Основные модули ===
pub mod compiler;
pub mod complexity;
pub mod control_flow;
pub mod diagnostics;
pub mod error;
pub mod parser;
pub mod semantic;

// === Re-exports для удобства ===
pub use compiler::{compile, CompilationResult, Compiler, CompilerOptions};
pub use complexity::{ComplexityClass, ComplexityEstimator, ComplexityInfo};
pub use control_flow::{ControlFlow, ControlFlowBuilder, FlowKind, FlowNode};
pub use diagnostics::{CompilerError, Diagnostics, ErrorKind, ErrorReporter, Severity};
pub use error::{CompileError, CompileResult};
pub use parser::{parse, tokenize, Lexer, ParseTree, Token, TokenKind};
pub use semantic::{ScopeTree, SemanticAnalyzer, SemanticError};
