//! Парсер методом рекурсивного спуска.

use std::ops::Range;

use super::error::ParseError;
use super::lexer::unescape_string;
use super::token::{slice_text, Token, TokenKind};
use super::tree::{
    AssignOp, BinaryOp, DeclKeyword, NodeId, NodeKind, Param, ParseNode, ParseTree, TypeName,
    UnaryOp, UpdateOp,
};
use crate::diagnostics::Diagnostics;

type PResult<T> = Result<T, ParseError>;

/// Глубина вложенности по умолчанию.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Приоритет бинарного оператора (чем больше, тем сильнее связывает).
fn precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::And => 2,
        BinaryOp::Eq | BinaryOp::Ne => 3,
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
        BinaryOp::Add | BinaryOp::Sub => 5,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 6,
    }
}

/// Парсер поверх готовой последовательности токенов.
///
/// Синтаксические ошибки складываются в `diagnostics`, после чего парсер
/// пропускает токены до `;` или закрывающей `}` и продолжает работу.
/// Наружу через `Err` выходит только фатальная ошибка (слишком глубокая
/// вложенность).
pub struct Parser<'t, 'd> {
    tokens: &'t [Token],
    pos: usize,
    /// Правая граница текущего окна (для разбора частей заголовка `for`).
    end: usize,
    nodes: Vec<ParseNode>,
    depth: usize,
    max_depth: usize,
    diagnostics: &'d mut Diagnostics,
}

impl<'t, 'd> Parser<'t, 'd> {
    /// Создать новый парсер.
    pub fn new(tokens: &'t [Token], diagnostics: &'d mut Diagnostics) -> Self {
        Self {
            tokens,
            pos: 0,
            end: tokens.len(),
            nodes: Vec::new(),
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            diagnostics,
        }
    }

    /// Ограничить глубину вложенности конструкций.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Разобрать всю программу.
    pub fn parse_program(mut self) -> PResult<ParseTree> {
        let (line, column) = self.tokens.first().map_or((1, 1), |t| (t.line, t.column));
        let items = self.statement_list(false)?;
        let root = self.alloc(NodeKind::Program, line, column, items);
        Ok(ParseTree::from_parts(self.nodes, root))
    }

    // === Токены ===

    fn peek(&self) -> Option<&'t Token> {
        if self.pos < self.end {
            self.tokens.get(self.pos)
        } else {
            None
        }
    }

    fn advance(&mut self) -> Option<&'t Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, text: &str) -> bool {
        self.peek().is_some_and(|t| t.is(text))
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.check(text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Позиция сразу за последним доступным токеном.
    fn end_position(&self) -> (usize, usize) {
        if let Some(token) = self.tokens.get(self.end) {
            return (token.line, token.column);
        }
        match self.tokens.last() {
            Some(last) => (last.line, last.column + last.lexeme.chars().count()),
            None => (1, 1),
        }
    }

    fn current_position(&self) -> (usize, usize) {
        match self.peek() {
            Some(token) => (token.line, token.column),
            None => self.end_position(),
        }
    }

    /// Ошибка "ожидалось `expected`" в текущей позиции.
    fn error_here(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::unexpected_token(expected, token),
            None => {
                let (line, column) = self.end_position();
                ParseError::unexpected_eof(expected, line, column)
            }
        }
    }

    fn expect(&mut self, text: &str, expected: &str) -> PResult<&'t Token> {
        match self.peek() {
            Some(token) if token.is(text) => {
                self.pos += 1;
                Ok(token)
            }
            _ => Err(self.error_here(expected)),
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> PResult<&'t Token> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Identifier => {
                self.pos += 1;
                Ok(token)
            }
            _ => Err(self.error_here(expected)),
        }
    }

    // === Арена ===

    fn alloc(&mut self, kind: NodeKind, line: usize, column: usize, children: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(ParseNode {
            id,
            kind,
            line,
            column,
            text: None,
            children,
        });
        id
    }

    fn set_text(&mut self, id: NodeId, range: Range<usize>) {
        let text = slice_text(&self.tokens[range]);
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.text = Some(text);
        }
    }

    fn kind_of(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.0).map(|n| &n.kind)
    }

    fn position_of(&self, id: NodeId) -> (usize, usize) {
        self.nodes.get(id.0).map_or((1, 1), |n| (n.line, n.column))
    }

    /// Спуститься на уровень глубже, проверив лимит.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= self.max_depth {
            let (line, column) = self.current_position();
            return Err(ParseError::NestingTooDeep {
                limit: self.max_depth,
                line,
                column,
            });
        }
        self.depth += 1;
        let result = stacker::maybe_grow(64 * 1024, 2 * 1024 * 1024, || f(self));
        self.depth -= 1;
        result
    }

    /// Разобрать диапазон токенов как отдельное окно.
    fn within<T>(&mut self, range: Range<usize>, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        let saved = (self.pos, self.end);
        self.pos = range.start;
        self.end = range.end;
        let result = f(self);
        self.pos = saved.0;
        self.end = saved.1;
        result
    }

    // === Восстановление ===

    /// Записать ошибку и вернуть узел-заглушку.
    fn recover(&mut self, err: ParseError) -> NodeId {
        let (line, column) = err.position();
        let message = err.to_string();
        self.diagnostics.push(err);
        self.alloc(NodeKind::Error { message }, line, column, Vec::new())
    }

    /// Panic mode: пропустить токены до `;` (включительно) или до
    /// закрывающей `}` текущего блока (не включая её).
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            if token.is("{") {
                depth += 1;
            } else if token.is("}") {
                if depth == 0 {
                    return;
                }
                depth -= 1;
            } else if token.is(";") && depth == 0 {
                self.pos += 1;
                return;
            }
            self.pos += 1;
        }
    }

    // === Операторы ===

    /// Последовательность операторов до конца окна или до `}` (если `in_block`).
    fn statement_list(&mut self, in_block: bool) -> PResult<Vec<NodeId>> {
        let mut items = Vec::new();
        while let Some(token) = self.peek() {
            if token.is("}") {
                if in_block {
                    break;
                }
                self.pos += 1;
                let err = ParseError::unexpected_token("statement", token);
                items.push(self.recover(err));
                continue;
            }

            let start = self.pos;
            match self.statement() {
                Ok(Some(id)) => items.push(id),
                Ok(None) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    items.push(self.recover(err));
                    self.synchronize();
                    if self.pos == start {
                        self.pos += 1;
                    }
                }
            }
        }
        Ok(items)
    }

    /// Разобрать один оператор. `None` для пустого оператора `;`.
    fn statement(&mut self) -> PResult<Option<NodeId>> {
        self.nested(|p| {
            let Some(token) = p.peek() else {
                return Ok(None);
            };
            let start = p.pos;

            if token.kind == TokenKind::Keyword {
                let id = match token.lexeme.as_str() {
                    "let" | "var" | "const" => {
                        let id = p.declaration()?;
                        p.expect(";", "';' after declaration")?;
                        p.set_text(id, start..p.pos);
                        id
                    }
                    "function" => p.function()?,
                    "if" => p.if_statement()?,
                    "while" => p.while_statement()?,
                    "for" => p.for_statement()?,
                    "return" => p.return_statement()?,
                    "break" | "continue" => {
                        p.pos += 1;
                        let kind = if token.lexeme == "break" {
                            NodeKind::Break
                        } else {
                            NodeKind::Continue
                        };
                        let id = p.alloc(kind, token.line, token.column, Vec::new());
                        p.expect(";", "';'")?;
                        p.set_text(id, start..p.pos);
                        id
                    }
                    _ => return Err(ParseError::unexpected_token("statement", token)),
                };
                return Ok(Some(id));
            }

            if token.is("{") {
                return p.block("block").map(Some);
            }
            if token.is(";") {
                p.pos += 1;
                return Ok(None);
            }

            let id = p.simple_statement()?;
            p.expect(";", "';' after statement")?;
            p.set_text(id, start..p.pos);
            Ok(Some(id))
        })
    }

    /// Обязательное тело конструкции: пустой `;` превращается в пустой блок.
    fn body_statement(&mut self, what: &str) -> PResult<NodeId> {
        let (line, column) = self.current_position();
        if self.peek().is_none() {
            return Err(self.error_here(what));
        }
        match self.statement()? {
            Some(id) => Ok(id),
            None => Ok(self.alloc(NodeKind::Block, line, column, Vec::new())),
        }
    }

    /// Блок `{ ... }`. Для незакрытого блока пишется ошибка, но узел всё равно строится.
    fn block(&mut self, construct: &str) -> PResult<NodeId> {
        let open = self.expect("{", &format!("'{{' to open {}", construct))?;
        let items = self.statement_list(true)?;
        if !self.eat("}") {
            let (line, column) = self.end_position();
            self.diagnostics.push(ParseError::UnclosedBlock {
                construct: construct.to_string(),
                opened_line: open.line,
                line,
                column,
            });
        }
        Ok(self.alloc(NodeKind::Block, open.line, open.column, items))
    }

    /// `let|var|const name (: type)? (= expr)?` без `;`.
    fn declaration(&mut self) -> PResult<NodeId> {
        let keyword_token = self.keyword()?;
        let keyword = match keyword_token.lexeme.as_str() {
            "const" => DeclKeyword::Const,
            "var" => DeclKeyword::Var,
            _ => DeclKeyword::Let,
        };
        let name = self.expect_identifier("variable name")?;

        let ty = if self.eat(":") {
            let ty_token = self.expect_identifier("type name")?;
            match TypeName::from_name(&ty_token.lexeme) {
                Some(ty) => Some(ty),
                None => {
                    return Err(ParseError::unexpected_token(
                        "type (number, string, boolean, array)",
                        ty_token,
                    ))
                }
            }
        } else {
            None
        };

        let mut children = Vec::new();
        if self.eat("=") {
            children.push(self.expression()?);
        }

        Ok(self.alloc(
            NodeKind::VarDecl {
                keyword,
                name: name.lexeme.clone(),
                ty,
            },
            keyword_token.line,
            keyword_token.column,
            children,
        ))
    }

    /// Взять ключевое слово, с которого начинается конструкция.
    fn keyword(&mut self) -> PResult<&'t Token> {
        self.advance().ok_or_else(|| self.error_here("keyword"))
    }

    /// Присваивание или выражение-оператор, без `;`.
    fn simple_statement(&mut self) -> PResult<NodeId> {
        let target = self.expression()?;

        let assign = self
            .peek()
            .filter(|t| t.kind == TokenKind::Operator)
            .and_then(|t| AssignOp::from_symbol(&t.lexeme).map(|op| (op, t)));

        match assign {
            Some((op, op_token)) => {
                if !matches!(
                    self.kind_of(target),
                    Some(NodeKind::Identifier { .. } | NodeKind::Index)
                ) {
                    return Err(ParseError::unexpected_token("assignable target before", op_token));
                }
                self.pos += 1;
                let value = self.expression()?;
                let (line, column) = self.position_of(target);
                Ok(self.alloc(NodeKind::Assign { op }, line, column, vec![target, value]))
            }
            None => {
                let (line, column) = self.position_of(target);
                Ok(self.alloc(NodeKind::ExprStmt, line, column, vec![target]))
            }
        }
    }

    /// Часть заголовка `for`: объявление, присваивание или выражение.
    fn clause_statement(&mut self) -> PResult<NodeId> {
        if self.check_keyword("let") || self.check_keyword("var") || self.check_keyword("const") {
            self.declaration()
        } else {
            self.simple_statement()
        }
    }

    fn function(&mut self) -> PResult<NodeId> {
        let keyword = self.keyword()?;
        let name = self.expect_identifier("function name")?;
        self.expect("(", "'(' after function name")?;

        let mut params = Vec::new();
        if !self.check(")") {
            loop {
                let param = self.expect_identifier("parameter name")?;
                let ty = if self.eat(":") {
                    let ty_token = self.expect_identifier("type name")?;
                    Some(TypeName::from_name(&ty_token.lexeme).ok_or_else(|| {
                        ParseError::unexpected_token("type (number, string, boolean, array)", ty_token)
                    })?)
                } else {
                    None
                };
                params.push(Param {
                    name: param.lexeme.clone(),
                    ty,
                    line: param.line,
                    column: param.column,
                });
                if !self.eat(",") {
                    break;
                }
            }
        }
        self.expect(")", "')' after parameters")?;

        let body = self.block("function body")?;
        Ok(self.alloc(
            NodeKind::Function {
                name: name.lexeme.clone(),
                params,
            },
            keyword.line,
            keyword.column,
            vec![body],
        ))
    }

    /// `( expr )` заголовка if/while; возвращает узел условия и его текст.
    fn parenthesized_condition(&mut self, construct: &str) -> PResult<(NodeId, String)> {
        self.expect("(", &format!("'(' after '{}'", construct))?;
        let start = self.pos;
        let condition = self.expression()?;
        let text = slice_text(&self.tokens[start..self.pos]);
        self.expect(")", &format!("')' after {} condition", construct))?;
        Ok((condition, text))
    }

    fn if_statement(&mut self) -> PResult<NodeId> {
        let keyword = self.keyword()?;
        let (condition, text) = self.parenthesized_condition("if")?;
        let then_branch = self.body_statement("statement after if condition")?;

        let mut children = vec![condition, then_branch];
        if self.check_keyword("else") {
            self.pos += 1;
            children.push(self.body_statement("statement after 'else'")?);
        }

        Ok(self.alloc(
            NodeKind::If { condition: text },
            keyword.line,
            keyword.column,
            children,
        ))
    }

    fn while_statement(&mut self) -> PResult<NodeId> {
        let keyword = self.keyword()?;
        let (condition, text) = self.parenthesized_condition("while")?;
        let body = self.body_statement("loop body")?;
        Ok(self.alloc(
            NodeKind::While { condition: text },
            keyword.line,
            keyword.column,
            vec![condition, body],
        ))
    }

    fn return_statement(&mut self) -> PResult<NodeId> {
        let start = self.pos;
        let keyword = self.keyword()?;
        let mut children = Vec::new();
        if self.peek().is_some() && !self.check(";") && !self.check("}") {
            children.push(self.expression()?);
        }
        let id = self.alloc(NodeKind::Return, keyword.line, keyword.column, children);
        self.expect(";", "';' after return")?;
        self.set_text(id, start..self.pos);
        Ok(id)
    }

    // === Цикл for ===

    /// `for (init; cond; incr) body`.
    ///
    /// Заголовок режется на три отрезка токенов: до первой `;` верхнего
    /// уровня, до следующей `;` и до парной `)`. Тело в фигурных скобках:
    /// сбалансированный по `{`/`}` отрезок без внешней пары. Каждый отрезок
    /// хранится в своём узле и дополнительно разбирается как окно.
    fn for_statement(&mut self) -> PResult<NodeId> {
        let keyword = self.keyword()?;
        self.expect("(", "'(' after 'for'")?;

        let init = self.scan_to_semicolon("';' after for-loop initializer")?;
        let cond = self.scan_to_semicolon("';' after for-loop condition")?;
        let incr = self.scan_to_close_paren()?;

        let tokens = self.tokens;
        let condition_text = slice_text(&tokens[cond.clone()]);

        let init_node = self.for_clause(
            init.clone(),
            NodeKind::ForInit {
                tokens: tokens[init].to_vec(),
            },
            "initializer",
            Self::clause_statement,
        )?;
        let cond_node = self.for_clause(
            cond.clone(),
            NodeKind::ForCondition {
                tokens: tokens[cond].to_vec(),
            },
            "condition",
            Self::expression,
        )?;
        let incr_node = self.for_clause(
            incr.clone(),
            NodeKind::ForIncrement {
                tokens: tokens[incr].to_vec(),
            },
            "increment",
            Self::simple_statement,
        )?;
        let body_node = self.for_body()?;

        Ok(self.alloc(
            NodeKind::For {
                condition: condition_text,
            },
            keyword.line,
            keyword.column,
            vec![init_node, cond_node, incr_node, body_node],
        ))
    }

    /// Отрезок до `;` верхнего уровня (по круглым скобкам). `;` поглощается.
    fn scan_to_semicolon(&mut self, expected: &str) -> PResult<Range<usize>> {
        let start = self.pos;
        let mut depth = 0usize;
        let mut i = start;
        while i < self.end {
            let token = &self.tokens[i];
            if token.is("(") {
                depth += 1;
            } else if token.is(")") {
                if depth == 0 {
                    return Err(ParseError::unexpected_token(expected, token));
                }
                depth -= 1;
            } else if token.is(";") && depth == 0 {
                self.pos = i + 1;
                return Ok(start..i);
            } else if (token.is("{") || token.is("}")) && depth == 0 {
                return Err(ParseError::unexpected_token(expected, token));
            }
            i += 1;
        }
        let (line, column) = self.end_position();
        Err(ParseError::unexpected_eof(expected, line, column))
    }

    /// Отрезок до парной `)`. Скобка поглощается.
    fn scan_to_close_paren(&mut self) -> PResult<Range<usize>> {
        let expected = "')' after for-loop increment";
        let start = self.pos;
        let mut depth = 0usize;
        let mut i = start;
        while i < self.end {
            let token = &self.tokens[i];
            if token.is("(") {
                depth += 1;
            } else if token.is(")") {
                if depth == 0 {
                    self.pos = i + 1;
                    return Ok(start..i);
                }
                depth -= 1;
            } else if depth == 0 && (token.is(";") || token.is("{") || token.is("}")) {
                return Err(ParseError::unexpected_token(expected, token));
            }
            i += 1;
        }
        let (line, column) = self.end_position();
        Err(ParseError::unexpected_eof(expected, line, column))
    }

    /// Построить узел части заголовка и разобрать её содержимое.
    fn for_clause(
        &mut self,
        range: Range<usize>,
        kind: NodeKind,
        what: &str,
        parse: fn(&mut Self) -> PResult<NodeId>,
    ) -> PResult<NodeId> {
        // Пустая часть получает позицию разделителя, стоящего на её месте.
        let (line, column) = self
            .tokens
            .get(range.start)
            .map_or_else(|| self.end_position(), |t| (t.line, t.column));

        let mut children = Vec::new();
        if !range.is_empty() {
            let parsed = self.within(range.clone(), |p| {
                let id = parse(p)?;
                match p.peek() {
                    Some(extra) => Err(ParseError::unexpected_token(
                        format!("end of for-loop {}", what),
                        extra,
                    )),
                    None => Ok(id),
                }
            });
            match parsed {
                Ok(id) => {
                    self.set_text(id, range);
                    children.push(id);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => children.push(self.recover(err)),
            }
        }

        Ok(self.alloc(kind, line, column, children))
    }

    fn for_body(&mut self) -> PResult<NodeId> {
        let Some(open) = self.peek().filter(|t| t.is("{")) else {
            let (line, column) = self.current_position();
            let start = self.pos;
            let statement = self.body_statement("for-loop body")?;
            let tokens = self.tokens[start..self.pos].to_vec();
            return Ok(self.alloc(NodeKind::ForBody { tokens }, line, column, vec![statement]));
        };
        self.pos += 1;

        let start = self.pos;
        let mut depth = 0usize;
        let mut close = None;
        for i in start..self.end {
            let token = &self.tokens[i];
            if token.is("{") {
                depth += 1;
            } else if token.is("}") {
                if depth == 0 {
                    close = Some(i);
                    break;
                }
                depth -= 1;
            }
        }

        let body_end = close.unwrap_or(self.end);
        if close.is_none() {
            let (line, column) = self.end_position();
            self.diagnostics.push(ParseError::UnclosedBlock {
                construct: "for-loop body".to_string(),
                opened_line: open.line,
                line,
                column,
            });
        }

        let tokens = self.tokens[start..body_end].to_vec();
        let items = self.within(start..body_end, |p| p.statement_list(false))?;
        self.pos = match close {
            Some(i) => i + 1,
            None => body_end,
        };

        Ok(self.alloc(NodeKind::ForBody { tokens }, open.line, open.column, items))
    }

    // === Выражения ===

    /// Разобрать выражение.
    pub(crate) fn expression(&mut self) -> PResult<NodeId> {
        self.nested(|p| p.binary(1))
    }

    /// Precedence climbing по таблице `precedence`.
    fn binary(&mut self, min_precedence: u8) -> PResult<NodeId> {
        let mut lhs = self.unary()?;
        while let Some(token) = self.peek() {
            if token.kind != TokenKind::Operator {
                break;
            }
            let Some(op) = BinaryOp::from_symbol(&token.lexeme) else {
                break;
            };
            let prec = precedence(op);
            if prec < min_precedence {
                break;
            }
            self.pos += 1;
            let rhs = self.binary(prec + 1)?;
            let (line, column) = self.position_of(lhs);
            lhs = self.alloc(NodeKind::Binary { op }, line, column, vec![lhs, rhs]);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> PResult<NodeId> {
        let Some(token) = self.peek() else {
            return Err(self.error_here("expression"));
        };
        if token.kind == TokenKind::Operator {
            let op = match token.lexeme.as_str() {
                "!" => Some(UnaryOp::Not),
                "-" => Some(UnaryOp::Neg),
                _ => None,
            };
            if let Some(op) = op {
                self.pos += 1;
                let operand = self.nested(|p| p.unary())?;
                return Ok(self.alloc(NodeKind::Unary { op }, token.line, token.column, vec![operand]));
            }
            let update = match token.lexeme.as_str() {
                "++" => Some(UpdateOp::Increment),
                "--" => Some(UpdateOp::Decrement),
                _ => None,
            };
            if let Some(op) = update {
                self.pos += 1;
                let operand = self.postfix()?;
                self.check_update_target(operand, token)?;
                return Ok(self.alloc(
                    NodeKind::Update { op, prefix: true },
                    token.line,
                    token.column,
                    vec![operand],
                ));
            }
        }
        self.postfix()
    }

    fn check_update_target(&self, operand: NodeId, op_token: &Token) -> PResult<()> {
        if matches!(
            self.kind_of(operand),
            Some(NodeKind::Identifier { .. } | NodeKind::Index)
        ) {
            Ok(())
        } else {
            Err(ParseError::unexpected_token("assignable target for", op_token))
        }
    }

    fn postfix(&mut self) -> PResult<NodeId> {
        let mut expr = self.primary()?;
        loop {
            if self.check("(") {
                let Some(NodeKind::Identifier { name }) = self.kind_of(expr).cloned() else {
                    break;
                };
                self.pos += 1;
                let mut args = Vec::new();
                if !self.check(")") {
                    loop {
                        args.push(self.expression()?);
                        if !self.eat(",") {
                            break;
                        }
                    }
                }
                self.expect(")", "')' after arguments")?;
                let (line, column) = self.position_of(expr);
                expr = self.alloc(NodeKind::Call { callee: name }, line, column, args);
            } else if self.eat("[") {
                let index = self.expression()?;
                self.expect("]", "']' after index")?;
                let (line, column) = self.position_of(expr);
                expr = self.alloc(NodeKind::Index, line, column, vec![expr, index]);
            } else if let Some(token) = self.peek().filter(|t| t.is("++") || t.is("--")) {
                self.check_update_target(expr, token)?;
                self.pos += 1;
                let op = if token.lexeme == "++" {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                };
                let (line, column) = self.position_of(expr);
                expr = self.alloc(NodeKind::Update { op, prefix: false }, line, column, vec![expr]);
                break;
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> PResult<NodeId> {
        let Some(token) = self.peek() else {
            return Err(self.error_here("expression"));
        };

        let kind = match token.kind {
            TokenKind::Number => {
                let value = token.lexeme.parse::<f64>().map_err(|_| ParseError::InvalidLiteral {
                    text: token.lexeme.clone(),
                    line: token.line,
                    column: token.column,
                })?;
                NodeKind::Literal {
                    value: super::tree::LiteralValue::Number(value),
                }
            }
            TokenKind::String => {
                let inner = token
                    .lexeme
                    .get(1..token.lexeme.len().saturating_sub(1))
                    .unwrap_or_default();
                NodeKind::Literal {
                    value: super::tree::LiteralValue::String(unescape_string(inner)),
                }
            }
            TokenKind::Boolean => NodeKind::Literal {
                value: super::tree::LiteralValue::Boolean(token.lexeme == "true"),
            },
            TokenKind::Identifier => NodeKind::Identifier {
                name: token.lexeme.clone(),
            },
            TokenKind::Punctuation if token.is("(") => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(")", "')' after expression")?;
                return Ok(inner);
            }
            TokenKind::Punctuation if token.is("[") => {
                self.pos += 1;
                let mut elements = Vec::new();
                if !self.check("]") {
                    loop {
                        elements.push(self.expression()?);
                        if !self.eat(",") {
                            break;
                        }
                    }
                }
                self.expect("]", "']' after array elements")?;
                return Ok(self.alloc(NodeKind::Array, token.line, token.column, elements));
            }
            _ => return Err(ParseError::unexpected_token("expression", token)),
        };

        self.pos += 1;
        Ok(self.alloc(kind, token.line, token.column, Vec::new()))
    }
}
