//! Модуль `compiler`
//!
//! Оркестратор конвейера: лексер → парсер → семантический анализ →
//! поток управления → оценка сложности.
//!
//! Восстанавливаемые ошибки стадий копятся в общем [`Diagnostics`] и в конце
//! сводятся [`ErrorReporter`]. Неисправимый сбой (включая панику стадии)
//! прерывает компиляцию: результат содержит пустые структуры и ровно одну
//! ошибку.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::complexity::{ComplexityEstimator, ComplexityInfo};
use crate::control_flow::{ControlFlow, ControlFlowBuilder};
use crate::diagnostics::{CompilerError, Diagnostics, ErrorReporter};
use crate::error::{CompileError, CompileResult};
use crate::parser::{self, Lexer, ParseTree, Token};
use crate::semantic::{ScopeTree, SemanticAnalyzer};

/// Настройки компиляции.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Предел вложенности конструкций; превышение считается неисправимым сбоем.
    pub max_nesting_depth: usize,
    /// Строк контекста до и после строки с ошибкой.
    pub context_lines: usize,
    /// Выдавать комментарии в `tokens`.
    pub keep_comments: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_nesting_depth: parser::parser::DEFAULT_MAX_DEPTH,
            context_lines: 2,
            keep_comments: false,
        }
    }
}

impl CompilerOptions {
    /// Прочитать настройки из JSON; отсутствующие поля берутся по умолчанию.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Результат одной компиляции. Имена полей в JSON стабильны.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationResult {
    pub tokens: Vec<Token>,
    pub parse_tree: Option<ParseTree>,
    pub scopes: ScopeTree,
    pub control_flow: Option<ControlFlow>,
    pub complexity: Option<ComplexityInfo>,
    /// Все диагностики по возрастанию (строка, столбец); пуст, если их нет.
    pub errors: Vec<CompilerError>,
}

impl CompilationResult {
    /// Есть ли ошибки (предупреждения не считаются).
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(CompilerError::is_error)
    }

    /// Компиляция была прервана сбоем.
    pub fn is_aborted(&self) -> bool {
        self.parse_tree.is_none()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Компилятор с фиксированными настройками. Не хранит состояния между
/// вызовами `compile`.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompilerOptions,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Скомпилировать исходник.
    pub fn compile(&self, source: &str) -> CompilationResult {
        let reporter = ErrorReporter::new(source).with_context_lines(self.options.context_lines);

        let fault = match guarded(|| self.run(source, &reporter)) {
            Ok(result) => {
                log::info!(
                    "compiled {} tokens: {} error(s), {} diagnostic(s) total",
                    result.tokens.len(),
                    result.errors.iter().filter(|e| e.is_error()).count(),
                    result.errors.len()
                );
                return result;
            }
            Err(fault) => fault,
        };

        log::warn!("compilation aborted: {}", fault);
        CompilationResult {
            tokens: Vec::new(),
            parse_tree: None,
            scopes: ScopeTree::empty(),
            control_flow: None,
            complexity: None,
            errors: reporter.aggregate([CompilerError::from(fault)]),
        }
    }

    fn run(&self, source: &str, reporter: &ErrorReporter<'_>) -> CompileResult<CompilationResult> {
        let mut diagnostics = Diagnostics::new();

        let tokens = Lexer::new(source)
            .with_comments(self.options.keep_comments)
            .tokenize(&mut diagnostics);
        log::debug!("lexer: {} tokens", tokens.len());

        let tree = parser::parse_with_depth(&tokens, &mut diagnostics, self.options.max_nesting_depth)?;
        log::debug!("parser: {} nodes", tree.len());

        let scopes = SemanticAnalyzer::new(&tree).analyze(&mut diagnostics)?;
        let control_flow = ControlFlowBuilder::new(&tree).build()?;
        let complexity = ComplexityEstimator::new(&control_flow).estimate();

        Ok(CompilationResult {
            tokens,
            parse_tree: Some(tree),
            scopes,
            control_flow: Some(control_flow),
            complexity: Some(complexity),
            errors: reporter.aggregate(diagnostics.into_vec()),
        })
    }
}

/// Выполнить стадию, превратив панику в [`CompileError`].
fn guarded<T>(stage: impl FnOnce() -> CompileResult<T>) -> CompileResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(stage)) {
        Ok(result) => result,
        Err(payload) => Err(CompileError::from_message(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "compiler stage panicked".to_string()
    }
}

/// Скомпилировать исходник с настройками по умолчанию.
pub fn compile(source: &str) -> CompilationResult {
    Compiler::default().compile(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complexity::ComplexityClass;
    use crate::control_flow::FlowKind;
    use crate::diagnostics::{ErrorKind, Severity};
    use crate::parser::NodeKind;

    fn clause_lexemes(tree: &ParseTree, id: parser::NodeId) -> Vec<String> {
        match &tree.get(id).unwrap().kind {
            NodeKind::ForInit { tokens }
            | NodeKind::ForCondition { tokens }
            | NodeKind::ForIncrement { tokens }
            | NodeKind::ForBody { tokens } => tokens.iter().map(|t| t.lexeme.clone()).collect(),
            other => panic!("not a for clause: {:?}", other),
        }
    }

    #[test]
    fn test_compile_clean_program() {
        let result = compile("let x: number = 1;\nwhile (x < 10) { x = x * 2; }");
        assert!(result.errors.is_empty());
        assert!(!result.is_aborted());
        assert!(result.control_flow.is_some());
        let complexity = result.complexity.unwrap();
        assert_eq!(complexity.time_complexity, ComplexityClass::Polynomial(1));
    }

    #[test]
    fn test_errors_never_absent() {
        for source in ["", "let", "}", "x = ;", "\"open"] {
            let result = compile(source);
            let json = serde_json::to_value(&result).unwrap();
            assert!(json["errors"].is_array(), "source {:?}", source);
        }
        assert!(compile("").errors.is_empty());
    }

    #[test]
    fn test_for_loop_clauses_and_linear_time() {
        let result = compile("for(i=0;i<n;i++){x=x+1;}");
        let tree = result.parse_tree.as_ref().unwrap();
        let root = tree.get(tree.root()).unwrap();
        let for_node = tree.get(root.children[0]).unwrap();
        assert!(matches!(for_node.kind, NodeKind::For { .. }));

        let tags: Vec<&str> = for_node
            .children
            .iter()
            .map(|&id| tree.get(id).unwrap().kind.tag())
            .collect();
        assert_eq!(tags, vec!["FOR_INIT", "FOR_CONDITION", "FOR_INCREMENT", "FOR_BODY"]);
        assert_eq!(clause_lexemes(tree, for_node.children[0]), vec!["i", "=", "0"]);
        assert_eq!(clause_lexemes(tree, for_node.children[1]), vec!["i", "<", "n"]);
        assert_eq!(clause_lexemes(tree, for_node.children[2]), vec!["i", "++"]);
        assert_eq!(
            clause_lexemes(tree, for_node.children[3]),
            vec!["x", "=", "x", "+", "1", ";"]
        );

        assert_eq!(result.complexity.unwrap().time_complexity.to_string(), "O(n)");
    }

    #[test]
    fn test_nested_for_loops_are_quadratic() {
        let result = compile("for(j=0;j<n;j++){for(i=0;i<n;i++){x=x+1;}}");
        assert_eq!(result.complexity.unwrap().time_complexity.to_string(), "O(n^2)");
    }

    #[test]
    fn test_unterminated_block_is_recoverable() {
        let result = compile("function f() {\n  let x = 1;\n");
        let syntax: Vec<&CompilerError> = result
            .errors
            .iter()
            .filter(|e| e.kind == ErrorKind::Syntax)
            .collect();
        assert_eq!(syntax.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert!(syntax[0].message.starts_with("missing '}'"));
        assert!(!syntax[0].suggestions.is_empty());
        assert!(!syntax[0].context.is_empty());
        assert!(result.parse_tree.is_some());
        assert!(result.control_flow.is_some());
    }

    #[test]
    fn test_unterminated_block_fault_aborts() {
        let compiler = Compiler::new(CompilerOptions {
            max_nesting_depth: 2,
            ..CompilerOptions::default()
        });
        let result = compiler.compile("if (a) {\n  while (b) {\n    x = 1;\n  }\n");
        assert!(result.is_aborted());
        assert!(result.parse_tree.is_none());
        assert!(result.control_flow.is_none());
        assert!(result.complexity.is_none());
        assert!(result.tokens.is_empty());
        assert_eq!(result.errors.len(), 1);

        let error = &result.errors[0];
        assert_eq!(error.kind, ErrorKind::Internal);
        // Третий уровень вложенности начинается с `while`
        assert_eq!((error.line, error.column), (2, 3));
        assert!(error.message.contains("nesting deeper than 2"));
        assert!(!error.suggestions.is_empty());
    }

    #[test]
    fn test_panic_becomes_single_fault() {
        let fault = guarded::<()>(|| panic!("index out of range at line 4, column 2")).unwrap_err();
        assert_eq!(fault.position(), (4, 2));

        let fault = guarded::<()>(|| std::panic::panic_any(17u8)).unwrap_err();
        assert_eq!(fault.position(), (1, 1));
        assert!(fault.to_string().contains("compiler stage panicked"));
    }

    #[test]
    fn test_multiple_errors_ordered() {
        let result = compile("let a = b;\nlet = 2;\nlet c = \"s\" - 1;\nlet a = 3;");
        let lines: Vec<usize> = result.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![1, 2, 3, 4]);
        assert_eq!(result.errors[1].kind, ErrorKind::Syntax);
        assert!(result.errors[2].message.contains("type mismatch"));
    }

    #[test]
    fn test_warning_does_not_count_as_error() {
        let result = compile("function f() { return 1; f(); }");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].severity, Severity::Warning);
        assert!(!result.has_errors());
    }

    #[test]
    fn test_compile_is_deterministic() {
        let source = "function fib(n) {\n  if (n < 2) { return n; }\n  return fib(n - 1) + fib(n - 2);\n}\nlet r = fib(10);";
        let first = compile(source);
        let second = compile(source);
        assert_eq!(first, second);
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn test_result_json_shape() {
        let json = serde_json::to_value(compile("let a = 1;")).unwrap();
        for key in ["tokens", "parseTree", "scopes", "controlFlow", "complexity", "errors"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["complexity"]["cyclomaticComplexity"], 1);
        assert_eq!(json["complexity"]["timeComplexity"], "O(1)");
        assert_eq!(json["controlFlow"]["nodes"][0]["kind"], "ENTRY");
    }

    #[test]
    fn test_control_flow_invariants_hold() {
        let result = compile("if (a) { b(); } else { while (c) { d(); } }\nreturn;");
        let flow = result.control_flow.unwrap();
        let entries = flow.nodes().iter().filter(|n| n.kind == FlowKind::Entry).count();
        assert_eq!(entries, 1);
        assert!(flow.reachable().iter().any(|n| n.kind == FlowKind::Exit));
        assert_eq!(
            result.complexity.unwrap().cyclomatic_complexity,
            flow.decision_count() + 1
        );
    }

    #[test]
    fn test_scope_depth_follows_block_nesting() {
        let source = "let a = true;\nfunction f() {\n  if (a) {\n    while (a) { a = false; }\n  }\n}";
        let result = compile(source);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.scopes.max_depth(), 3);
    }

    #[test]
    fn test_jump_outside_loop_is_recoverable() {
        for source in ["break;", "x = 1;\n{ continue; }"] {
            let result = compile(source);
            assert!(!result.is_aborted(), "source {:?}: {:?}", source, result.errors);
            assert!(result.parse_tree.is_some());
            assert!(result.complexity.is_some());
            assert!(result
                .errors
                .iter()
                .any(|e| e.kind == ErrorKind::Semantic && e.message.contains("outside of a loop")));
            assert!(result.errors.iter().all(|e| e.kind != ErrorKind::Internal));

            let flow = result.control_flow.unwrap();
            assert!(flow.reachable().iter().any(|n| n.kind == FlowKind::Exit));
        }
    }

    #[test]
    fn test_keep_comments_option() {
        let options = CompilerOptions::from_json(r#"{ "keep_comments": true }"#).unwrap();
        assert_eq!(options.max_nesting_depth, 256);
        let result = Compiler::new(options).compile("x = 1; // note");
        assert!(result
            .tokens
            .iter()
            .any(|t| t.kind == parser::TokenKind::Comment));
    }
}
