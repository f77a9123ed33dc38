//! Семантический анализ: области видимости, разрешение имён, проверка типов.
//!
//! Анализатор обходит дерево разбора в глубину. Функция и цикл открывают
//! одну область, и их непосредственный блок-тело живёт в ней же; любой
//! другой блок открывает собственную область. Переменные из заголовка
//! `for` принадлежат области цикла.
//!
//! Функции верхнего уровня поднимаются: их можно вызвать до объявления.

pub mod scope;

pub use scope::{Scope, ScopeId, ScopeKind, ScopeTree, Symbol, SymbolKind, ValueType};

use std::collections::HashSet;

use thiserror::Error;

use crate::diagnostics::{CompilerError, Diagnostics};
use crate::error::{CompileError, CompileResult};
use crate::parser::tree::{
    AssignOp, BinaryOp, DeclKeyword, LiteralValue, NodeId, NodeKind, ParseNode, ParseTree, UnaryOp,
};

const STAGE: &str = "semantic analysis";

/// Семантическая ошибка или предупреждение.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("undeclared variable '{name}' at line {line}, column {column}")]
    UndeclaredVariable {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("undefined function '{name}' at line {line}, column {column}")]
    UndefinedFunction {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("redeclaration of '{name}' at line {line}, column {column} (first declared at line {previous_line})")]
    Redeclaration {
        name: String,
        previous_line: usize,
        line: usize,
        column: usize,
    },

    #[error("type mismatch at line {line}, column {column}: {detail}")]
    TypeMismatch {
        detail: String,
        line: usize,
        column: usize,
    },

    #[error("assignment to constant '{name}' at line {line}, column {column}")]
    ConstAssignment {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("function '{name}' expects {expected} argument(s) but got {found} at line {line}, column {column}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        line: usize,
        column: usize,
    },

    #[error("'{name}' is not a function at line {line}, column {column}")]
    NotCallable {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("'{keyword}' outside of {context} at line {line}, column {column}")]
    MisplacedJump {
        keyword: &'static str,
        context: &'static str,
        line: usize,
        column: usize,
    },

    #[error("unreachable code after '{after}' at line {line}, column {column}")]
    UnreachableCode {
        after: &'static str,
        line: usize,
        column: usize,
    },
}

impl SemanticError {
    pub fn position(&self) -> (usize, usize) {
        match self {
            Self::UndeclaredVariable { line, column, .. }
            | Self::UndefinedFunction { line, column, .. }
            | Self::Redeclaration { line, column, .. }
            | Self::TypeMismatch { line, column, .. }
            | Self::ConstAssignment { line, column, .. }
            | Self::ArityMismatch { line, column, .. }
            | Self::NotCallable { line, column, .. }
            | Self::MisplacedJump { line, column, .. }
            | Self::UnreachableCode { line, column, .. } => (*line, *column),
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Self::UnreachableCode { .. })
    }
}

/// Анализатор одного дерева разбора.
pub struct SemanticAnalyzer<'a> {
    tree: &'a ParseTree,
    scopes: ScopeTree,
    current: ScopeId,
    errors: Vec<SemanticError>,
    /// Функции, объявленные заранее при подъёме.
    hoisted: HashSet<NodeId>,
    function_depth: usize,
    loop_depth: usize,
}

impl<'a> SemanticAnalyzer<'a> {
    pub fn new(tree: &'a ParseTree) -> Self {
        let scopes = ScopeTree::new();
        let current = scopes.global();
        Self {
            tree,
            scopes,
            current,
            errors: Vec::new(),
            hoisted: HashSet::new(),
            function_depth: 0,
            loop_depth: 0,
        }
    }

    /// Построить дерево областей. Ошибки попадают в `diagnostics`
    /// в порядке (строка, столбец).
    pub fn analyze(mut self, diagnostics: &mut Diagnostics) -> CompileResult<ScopeTree> {
        let root = self.node(self.tree.root())?;
        if !matches!(root.kind, NodeKind::Program) {
            return Err(CompileError::MalformedNode {
                stage: STAGE,
                construct: "program",
                line: root.line,
                column: root.column,
            });
        }

        self.hoist_functions(&root.children)?;
        self.statements(&root.children)?;

        self.errors.sort_by_key(SemanticError::position);
        for err in self.errors {
            diagnostics.push(err);
        }
        log::debug!("semantic: {} scopes", self.scopes.len());
        Ok(self.scopes)
    }

    // === Обход операторов ===

    fn node(&self, id: NodeId) -> CompileResult<&'a ParseNode> {
        self.tree.get(id).ok_or(CompileError::NodeNotFound {
            stage: STAGE,
            node: id.0,
        })
    }

    fn child(&self, node: &ParseNode, index: usize, construct: &'static str) -> CompileResult<NodeId> {
        node.children
            .get(index)
            .copied()
            .ok_or(CompileError::MalformedNode {
                stage: STAGE,
                construct,
                line: node.line,
                column: node.column,
            })
    }

    fn hoist_functions(&mut self, items: &[NodeId]) -> CompileResult<()> {
        for &id in items {
            let node = self.node(id)?;
            if let NodeKind::Function { name, params } = &node.kind {
                self.declare_function(node, name, params.len());
                self.hoisted.insert(id);
            }
        }
        Ok(())
    }

    fn declare_function(&mut self, node: &ParseNode, name: &str, arity: usize) {
        self.declare(Symbol {
            name: name.to_string(),
            ty: ValueType::Function,
            kind: SymbolKind::Function,
            line: node.line,
            column: node.column,
            arity: Some(arity),
        });
    }

    fn declare(&mut self, symbol: Symbol) {
        let (name, line, column) = (symbol.name.clone(), symbol.line, symbol.column);
        if let Err(previous) = self.scopes.declare(self.current, symbol) {
            self.errors.push(SemanticError::Redeclaration {
                name,
                previous_line: previous.line,
                line,
                column,
            });
        }
    }

    /// Последовательность операторов одного блока.
    fn statements(&mut self, items: &[NodeId]) -> CompileResult<()> {
        let mut jumped: Option<&'static str> = None;
        let mut reported = false;
        for &id in items {
            let node = self.node(id)?;
            if let Some(after) = jumped {
                if !reported && !matches!(node.kind, NodeKind::Error { .. }) {
                    self.errors.push(SemanticError::UnreachableCode {
                        after,
                        line: node.line,
                        column: node.column,
                    });
                    reported = true;
                }
            }
            self.statement(node)?;
            if jumped.is_none() {
                jumped = node.kind.jump_keyword();
            }
        }
        Ok(())
    }

    fn statement(&mut self, node: &'a ParseNode) -> CompileResult<()> {
        match &node.kind {
            NodeKind::VarDecl { keyword, name, ty } => {
                let init = match node.children.first() {
                    Some(&value) => Some(self.expression(value)?),
                    None => None,
                };
                let declared = ty.map(ValueType::from);
                if let (Some(declared), Some(init)) = (declared, init) {
                    if declared.is_known() && init.is_known() && declared != init {
                        self.mismatch(
                            format!("cannot initialize '{}' of type {} with {}", name, declared, init),
                            node,
                        );
                    }
                }
                let kind = match keyword {
                    DeclKeyword::Const => SymbolKind::Constant,
                    DeclKeyword::Let | DeclKeyword::Var => SymbolKind::Variable,
                };
                self.declare(Symbol {
                    name: name.clone(),
                    ty: declared.or(init).unwrap_or(ValueType::Unknown),
                    kind,
                    line: node.line,
                    column: node.column,
                    arity: None,
                });
            }
            NodeKind::Assign { op } => self.assignment(node, *op)?,
            NodeKind::If { .. } => {
                let condition = self.child(node, 0, "if")?;
                self.condition(condition)?;
                for &branch in node.children.iter().skip(1) {
                    self.statement(self.node(branch)?)?;
                }
            }
            NodeKind::While { .. } => {
                let condition = self.child(node, 0, "while")?;
                let body = self.child(node, 1, "while")?;
                if matches!(self.node(body)?.kind, NodeKind::Block) {
                    self.in_scope(ScopeKind::Loop, node.id, |a| {
                        a.condition(condition)?;
                        a.loop_body(body)
                    })?;
                } else {
                    self.condition(condition)?;
                    self.loop_body(body)?;
                }
            }
            NodeKind::For { .. } => {
                if node.children.len() != 4 {
                    return Err(CompileError::MalformedNode {
                        stage: STAGE,
                        construct: "for",
                        line: node.line,
                        column: node.column,
                    });
                }
                self.in_scope(ScopeKind::Loop, node.id, |a| {
                    for &clause in &node.children {
                        a.for_clause(a.node(clause)?)?;
                    }
                    Ok(())
                })?;
            }
            NodeKind::Function { name, params } => {
                if !self.hoisted.contains(&node.id) {
                    self.declare_function(node, name, params.len());
                }
                let body = self.node(self.child(node, 0, "function")?)?;
                let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
                self.function_depth += 1;
                let result = self.in_scope(ScopeKind::Function, node.id, |a| {
                    for param in params {
                        a.declare(Symbol {
                            name: param.name.clone(),
                            ty: param.ty.map_or(ValueType::Unknown, ValueType::from),
                            kind: SymbolKind::Parameter,
                            line: param.line,
                            column: param.column,
                            arity: None,
                        });
                    }
                    a.statements(&body.children)
                });
                self.function_depth -= 1;
                self.loop_depth = saved_loops;
                result?;
            }
            NodeKind::Return => {
                if self.function_depth == 0 {
                    self.misplaced("return", "a function", node);
                }
                if let Some(&value) = node.children.first() {
                    self.expression(value)?;
                }
            }
            NodeKind::Break | NodeKind::Continue => {
                if self.loop_depth == 0 {
                    let keyword = node.kind.jump_keyword().unwrap_or("break");
                    self.misplaced(keyword, "a loop", node);
                }
            }
            NodeKind::ExprStmt => {
                let expr = self.child(node, 0, "expression statement")?;
                self.expression(expr)?;
            }
            NodeKind::Block => {
                self.in_scope(ScopeKind::Block, node.id, |a| a.statements(&node.children))?;
            }
            NodeKind::Error { .. } => {}
            _ => {
                self.expression(node.id)?;
            }
        }
        Ok(())
    }

    /// Выполнить `f` в новой области, принадлежащей `owner`.
    fn in_scope(
        &mut self,
        kind: ScopeKind,
        owner: NodeId,
        f: impl FnOnce(&mut Self) -> CompileResult<()>,
    ) -> CompileResult<()> {
        let outer = self.current;
        self.current = self.scopes.push(kind, owner, outer);
        let result = f(self);
        self.current = outer;
        result
    }

    /// Тело цикла. Блок-тело не открывает второй области.
    fn loop_body(&mut self, body: NodeId) -> CompileResult<()> {
        let node = self.node(body)?;
        self.loop_depth += 1;
        let result = if matches!(node.kind, NodeKind::Block) {
            self.statements(&node.children)
        } else {
            self.statement(node)
        };
        self.loop_depth -= 1;
        result
    }

    fn for_clause(&mut self, clause: &'a ParseNode) -> CompileResult<()> {
        match &clause.kind {
            NodeKind::ForInit { .. } | NodeKind::ForIncrement { .. } => {
                for &id in &clause.children {
                    self.statement(self.node(id)?)?;
                }
            }
            NodeKind::ForCondition { .. } => {
                for &id in &clause.children {
                    self.condition(id)?;
                }
            }
            NodeKind::ForBody { .. } => {
                self.loop_depth += 1;
                let result = self.statements(&clause.children);
                self.loop_depth -= 1;
                result?;
            }
            _ => {
                return Err(CompileError::MalformedNode {
                    stage: STAGE,
                    construct: "for clause",
                    line: clause.line,
                    column: clause.column,
                })
            }
        }
        Ok(())
    }

    fn assignment(&mut self, node: &'a ParseNode, op: AssignOp) -> CompileResult<()> {
        let target_id = self.child(node, 0, "assignment")?;
        let value_id = self.child(node, 1, "assignment")?;
        let target = self.node(target_id)?;
        let value = self.expression(value_id)?;

        let NodeKind::Identifier { name } = &target.kind else {
            self.expression(target_id)?;
            return Ok(());
        };
        let Some((scope, symbol)) = self.scopes.resolve(self.current, name) else {
            self.undeclared(name, target);
            return Ok(());
        };
        let (current_ty, kind) = (symbol.ty, symbol.kind);

        if kind == SymbolKind::Constant {
            self.errors.push(SemanticError::ConstAssignment {
                name: name.clone(),
                line: target.line,
                column: target.column,
            });
        }
        let result = match op {
            AssignOp::Assign => value,
            AssignOp::Compound(op) => self.binary_type(op, current_ty, value, node),
        };
        if !current_ty.is_known() {
            if result.is_known() {
                self.scopes.refine(scope, name, result);
            }
        } else if result.is_known() && result != current_ty {
            self.mismatch(
                format!("cannot assign {} to '{}' of type {}", result, name, current_ty),
                node,
            );
        }
        Ok(())
    }

    // === Выражения ===

    fn condition(&mut self, id: NodeId) -> CompileResult<()> {
        self.expression(id).map(|_| ())
    }

    /// Вывести тип выражения, попутно проверив его.
    fn expression(&mut self, id: NodeId) -> CompileResult<ValueType> {
        let node = self.node(id)?;
        let ty = match &node.kind {
            NodeKind::Literal { value } => match value {
                LiteralValue::Number(_) => ValueType::Number,
                LiteralValue::String(_) => ValueType::String,
                LiteralValue::Boolean(_) => ValueType::Boolean,
            },
            NodeKind::Identifier { name } => match self.scopes.resolve(self.current, name) {
                Some((_, symbol)) => symbol.ty,
                None => {
                    self.undeclared(name, node);
                    ValueType::Unknown
                }
            },
            NodeKind::Binary { op } => {
                let lhs = self.expression(self.child(node, 0, "binary expression")?)?;
                let rhs = self.expression(self.child(node, 1, "binary expression")?)?;
                self.binary_type(*op, lhs, rhs, node)
            }
            NodeKind::Unary { op } => {
                let operand = self.expression(self.child(node, 0, "unary expression")?)?;
                let expected = match op {
                    UnaryOp::Neg => ValueType::Number,
                    UnaryOp::Not => ValueType::Boolean,
                };
                if operand.is_known() && operand != expected {
                    let symbol = if *op == UnaryOp::Neg { "-" } else { "!" };
                    self.mismatch(
                        format!("operator '{}' cannot be applied to {}", symbol, operand),
                        node,
                    );
                }
                expected
            }
            NodeKind::Update { .. } => {
                let target_id = self.child(node, 0, "update expression")?;
                let target = self.node(target_id)?;
                if let NodeKind::Identifier { name } = &target.kind {
                    let constant = self
                        .scopes
                        .resolve(self.current, name)
                        .is_some_and(|(_, s)| s.kind == SymbolKind::Constant);
                    if constant {
                        self.errors.push(SemanticError::ConstAssignment {
                            name: name.clone(),
                            line: target.line,
                            column: target.column,
                        });
                    }
                }
                let operand = self.expression(target_id)?;
                if operand.is_known() && operand != ValueType::Number {
                    self.mismatch(format!("cannot increment or decrement {}", operand), node);
                }
                ValueType::Number
            }
            NodeKind::Call { callee } => {
                for &arg in &node.children {
                    self.expression(arg)?;
                }
                self.call(callee, node);
                ValueType::Unknown
            }
            NodeKind::Index => {
                let target = self.expression(self.child(node, 0, "index expression")?)?;
                let index = self.expression(self.child(node, 1, "index expression")?)?;
                if index.is_known() && index != ValueType::Number {
                    self.mismatch(format!("index must be number, found {}", index), node);
                }
                match target {
                    ValueType::String => ValueType::String,
                    ValueType::Array | ValueType::Unknown => ValueType::Unknown,
                    other => {
                        self.mismatch(format!("cannot index into {}", other), node);
                        ValueType::Unknown
                    }
                }
            }
            NodeKind::Array => {
                for &element in &node.children {
                    self.expression(element)?;
                }
                ValueType::Array
            }
            NodeKind::Error { .. } => ValueType::Unknown,
            _ => {
                return Err(CompileError::MalformedNode {
                    stage: STAGE,
                    construct: node.kind.tag(),
                    line: node.line,
                    column: node.column,
                })
            }
        };
        Ok(ty)
    }

    fn call(&mut self, callee: &str, node: &ParseNode) {
        let found = node.children.len();
        match self.scopes.resolve(self.current, callee).map(|(_, s)| (s.kind, s.ty, s.arity)) {
            None => self.errors.push(SemanticError::UndefinedFunction {
                name: callee.to_string(),
                line: node.line,
                column: node.column,
            }),
            Some((SymbolKind::Function, _, Some(expected))) if expected != found => {
                self.errors.push(SemanticError::ArityMismatch {
                    name: callee.to_string(),
                    expected,
                    found,
                    line: node.line,
                    column: node.column,
                })
            }
            Some((_, ty, _)) if ty.is_known() && ty != ValueType::Function => {
                self.errors.push(SemanticError::NotCallable {
                    name: callee.to_string(),
                    line: node.line,
                    column: node.column,
                })
            }
            Some(_) => {}
        }
    }

    /// Тип результата бинарной операции.
    ///
    /// Неизвестный операнд не порождает ошибок, чтобы не размножать
    /// следствия одной исходной проблемы.
    fn binary_type(&mut self, op: BinaryOp, lhs: ValueType, rhs: ValueType, node: &ParseNode) -> ValueType {
        use ValueType::*;

        let (ok, result) = match op {
            BinaryOp::Add => match (lhs, rhs) {
                (Number, Number) => (true, Number),
                (String, String | Number | Unknown) | (Number | Unknown, String) => (true, String),
                (Unknown, _) | (_, Unknown) => (true, Unknown),
                _ => (false, Unknown),
            },
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                (operand_is(lhs, Number) && operand_is(rhs, Number), Number)
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ok = match (lhs, rhs) {
                    (Unknown, other) | (other, Unknown) => matches!(other, Number | String | Unknown),
                    (l, r) => l == r && matches!(l, Number | String),
                };
                (ok, Boolean)
            }
            BinaryOp::Eq | BinaryOp::Ne => (!lhs.is_known() || !rhs.is_known() || lhs == rhs, Boolean),
            BinaryOp::And | BinaryOp::Or => {
                (operand_is(lhs, Boolean) && operand_is(rhs, Boolean), Boolean)
            }
        };

        if !ok {
            self.mismatch(
                format!(
                    "operator '{}' cannot be applied to {} and {}",
                    op.symbol(),
                    lhs,
                    rhs
                ),
                node,
            );
        }
        result
    }

    // === Ошибки ===

    fn mismatch(&mut self, detail: String, node: &ParseNode) {
        self.errors.push(SemanticError::TypeMismatch {
            detail,
            line: node.line,
            column: node.column,
        });
    }

    fn undeclared(&mut self, name: &str, node: &ParseNode) {
        self.errors.push(SemanticError::UndeclaredVariable {
            name: name.to_string(),
            line: node.line,
            column: node.column,
        });
    }

    fn misplaced(&mut self, keyword: &'static str, context: &'static str, node: &ParseNode) {
        self.errors.push(SemanticError::MisplacedJump {
            keyword,
            context,
            line: node.line,
            column: node.column,
        });
    }
}

fn operand_is(actual: ValueType, expected: ValueType) -> bool {
    !actual.is_known() || actual == expected
}

/// Проанализировать дерево: области видимости и упорядоченный список
/// семантических диагностик.
pub fn analyze(tree: &ParseTree) -> CompileResult<(ScopeTree, Vec<CompilerError>)> {
    let mut diagnostics = Diagnostics::new();
    let scopes = SemanticAnalyzer::new(tree).analyze(&mut diagnostics)?;
    Ok((scopes, diagnostics.into_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::parser::{parse, Lexer};

    fn check(source: &str) -> (ScopeTree, Vec<CompilerError>) {
        let mut diagnostics = Diagnostics::new();
        let tokens = Lexer::new(source).tokenize(&mut diagnostics);
        let tree = parse(&tokens, &mut diagnostics).unwrap();
        assert!(diagnostics.is_empty(), "unexpected syntax errors: {:?}", diagnostics);
        analyze(&tree).unwrap()
    }

    fn messages(errors: &[CompilerError]) -> Vec<&str> {
        errors.iter().map(|e| e.message.as_str()).collect()
    }

    #[test]
    fn test_clean_program() {
        let (scopes, errors) = check(
            "let total: number = 0;\n\
             for (let i = 0; i < 10; i++) { total += i; }\n\
             function twice(x: number) { return x * 2; }\n\
             total = twice(total);",
        );
        assert!(errors.is_empty(), "{:?}", messages(&errors));
        let global = scopes.get(scopes.global()).unwrap();
        let names: Vec<&str> = global.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["twice", "total"]);
    }

    #[test]
    fn test_undeclared_variable() {
        let (_, errors) = check("let a = 1;\na = b + 1;");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("undeclared variable 'b'"));
        assert_eq!((errors[0].line, errors[0].column), (2, 5));
    }

    #[test]
    fn test_redeclaration_only_in_same_scope() {
        let (_, errors) = check("let x = 1;\n{ let x = 2; }\nlet x = 3;");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("redeclaration of 'x'"));
        assert!(errors[0].message.contains("first declared at line 1"));
        assert_eq!(errors[0].line, 3);
    }

    #[test]
    fn test_type_mismatch() {
        let (_, errors) = check("let s = \"a\";\nlet n = s - 1;\nlet t: boolean = 5;");
        let found = messages(&errors);
        assert_eq!(found.len(), 2, "{:?}", found);
        assert!(found[0].contains("operator '-' cannot be applied to string and number"));
        assert!(found[1].contains("cannot initialize 't' of type boolean with number"));
        assert!(errors.iter().all(|e| e.message.starts_with("type mismatch")));
    }

    #[test]
    fn test_string_concatenation_allowed() {
        let (_, errors) = check("let s = \"n = \" + 1;\nlet t: string = s + \"!\";");
        assert!(errors.is_empty(), "{:?}", messages(&errors));
    }

    #[test]
    fn test_assignment_refines_untyped_declaration() {
        let (scopes, errors) = check("let x;\nx = \"text\";\nx = 4;");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot assign number to 'x' of type string"));
        let (_, x) = scopes.resolve(scopes.global(), "x").unwrap();
        assert_eq!(x.ty, ValueType::String);
    }

    #[test]
    fn test_unreachable_code_is_warning() {
        let (_, errors) = check("function f() {\n  return 1;\n  let dead = 2;\n  dead = 3;\n}");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].severity, Severity::Warning);
        assert!(errors[0].message.starts_with("unreachable code after 'return'"));
        assert_eq!(errors[0].line, 3);
    }

    #[test]
    fn test_const_reassignment() {
        let (_, errors) = check("const limit = 10;\nlimit = 11;\nlimit++;");
        let found = messages(&errors);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|m| m.starts_with("assignment to constant 'limit'")));
    }

    #[test]
    fn test_function_hoisting_and_arity() {
        let (_, errors) = check("let r = add(1);\nfunction add(a, b) { return a + b; }\nmissing();");
        let found = messages(&errors);
        assert_eq!(found.len(), 2, "{:?}", found);
        assert!(found[0].contains("expects 2 argument(s) but got 1"));
        assert!(found[1].starts_with("undefined function 'missing'"));
    }

    #[test]
    fn test_misplaced_jumps() {
        let (_, errors) = check("{ return 1; }\n{ break; }\nwhile (true) { function f() { continue; } break; }");
        let found = messages(&errors);
        assert_eq!(found.len(), 3, "{:?}", found);
        assert!(found[0].starts_with("'return' outside of a function"));
        assert!(found[1].starts_with("'break' outside of a loop"));
        assert!(found[2].starts_with("'continue' outside of a loop"));
    }

    #[test]
    fn test_loop_variables_live_in_loop_scope() {
        let (scopes, errors) = check("for (let i = 0; i < 3; i++) { let y = i; }\ni = 1;");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("undeclared variable 'i'"));

        let loop_scope = scopes.iter().find(|s| s.kind == ScopeKind::Loop).unwrap();
        let names: Vec<&str> = loop_scope.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["i", "y"]);
        assert_eq!(scopes.len(), 2);
    }

    #[test]
    fn test_scope_depth_follows_block_nesting() {
        let (scopes, _) = check(
            "function f(a) {\n  if (a > 0) {\n    while (a > 0) { a = a - 1; }\n  }\n}",
        );
        let kinds: Vec<ScopeKind> = scopes.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![ScopeKind::Global, ScopeKind::Function, ScopeKind::Block, ScopeKind::Loop]
        );
        assert_eq!(scopes.max_depth(), 3);
    }

    #[test]
    fn test_parameters_record_their_position() {
        let (scopes, errors) = check("function add(a, b) { return a + b; }");
        assert!(errors.is_empty(), "{:?}", messages(&errors));
        let function = scopes.iter().find(|s| s.kind == ScopeKind::Function).unwrap();
        let positions: Vec<(&str, usize, usize)> = function
            .symbols
            .iter()
            .map(|s| (s.name.as_str(), s.line, s.column))
            .collect();
        assert_eq!(positions, vec![("a", 1, 14), ("b", 1, 17)]);
    }

    #[test]
    fn test_braceless_while_opens_no_scope() {
        let (scopes, errors) = check("let a = 1;
while (a > 0) a = a - 1;");
        assert!(errors.is_empty(), "{:?}", messages(&errors));
        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes.max_depth(), 0);
    }

    #[test]
    fn test_errors_sorted_by_position() {
        let (_, errors) = check("function f() { return q; }\nlet a = b;\nlet c = \"x\" * 2;");
        let positions: Vec<(usize, usize)> = errors.iter().map(|e| (e.line, e.column)).collect();
        let mut sorted = positions.clone();
        sorted.sort();
        assert_eq!(positions, sorted);
        assert_eq!(errors.len(), 3);
    }
}
