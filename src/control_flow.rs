//! Дерево потока управления.
//!
//! Поток хранится как дерево, а не как произвольный граф: обратная дуга
//! цикла хранится отдельным листом [`FlowKind::LoopBack`] со ссылкой на узел цикла.
//! Так результат остаётся вложенной структурой, которую легко отрисовать.
//!
//! Раскладка детей:
//! - `Entry` и `Function`: последовательность узлов, заканчивающаяся `Exit`;
//! - `If`: `[Branch(True), Branch(False)?]`;
//! - `For` / `While`: `[Branch(Body), LoopBack]`;
//! - `Branch`: последовательность узлов ветки.

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};
use crate::parser::tree::{NodeId, NodeKind, ParseNode, ParseTree};

const STAGE: &str = "control flow";

/// Дескриптор узла потока управления.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    True,
    False,
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowKind {
    Entry,
    Exit,
    If,
    For,
    While,
    Statement,
    Function { name: String },
    Branch { branch: BranchKind },
    /// Возврат к проверке условия цикла `target`.
    LoopBack { target: FlowId },
}

impl FlowKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Entry => "ENTRY",
            Self::Exit => "EXIT",
            Self::If => "IF",
            Self::For => "FOR",
            Self::While => "WHILE",
            Self::Statement => "STATEMENT",
            Self::Function { .. } => "FUNCTION",
            Self::Branch { .. } => "BRANCH",
            Self::LoopBack { .. } => "LOOP_BACK",
        }
    }

    /// Точка ветвления для метрики Маккейба.
    pub fn is_decision(&self) -> bool {
        matches!(self, Self::If | Self::For | Self::While)
    }

    pub fn is_loop(&self) -> bool {
        matches!(self, Self::For | Self::While)
    }
}

/// Узел потока управления.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: FlowId,
    #[serde(flatten)]
    pub kind: FlowKind,
    /// Текст операторов или условие.
    pub label: String,
    pub line: usize,
    /// Имена вызываемых функций, по одному на место вызова.
    pub calls: Vec<String>,
    /// Узел создаёт массив.
    pub allocates: bool,
    pub children: Vec<FlowId>,
}

/// Дерево потока управления с единственным корнем `Entry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlow {
    nodes: Vec<FlowNode>,
    entry: FlowId,
}

impl ControlFlow {
    pub fn entry(&self) -> FlowId {
        self.entry
    }

    pub fn get(&self, id: FlowId) -> Option<&FlowNode> {
        self.nodes.get(id.0)
    }

    pub fn nodes(&self) -> &[FlowNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Узлы, достижимые из `Entry`, в порядке обхода в глубину.
    pub fn reachable(&self) -> Vec<&FlowNode> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.entry];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.get(id) {
                out.push(node);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Число узлов-ветвлений (`If`, `For`, `While`).
    pub fn decision_count(&self) -> usize {
        self.reachable().iter().filter(|n| n.kind.is_decision()).count()
    }

    /// Проверить структурные инварианты дерева.
    pub fn validate(&self) -> CompileResult<()> {
        let entries = self
            .nodes
            .iter()
            .filter(|n| n.kind == FlowKind::Entry)
            .count();
        if entries != 1 {
            return Err(CompileError::InvalidControlFlow(format!(
                "expected exactly one ENTRY node, found {}",
                entries
            )));
        }
        if self.get(self.entry).map(|n| &n.kind) != Some(&FlowKind::Entry) {
            return Err(CompileError::InvalidControlFlow(
                "root is not the ENTRY node".to_string(),
            ));
        }
        for node in &self.nodes {
            if let Some(child) = node.children.iter().find(|c| c.0 >= self.nodes.len()) {
                return Err(CompileError::InvalidControlFlow(format!(
                    "node {} points to missing node {}",
                    node.id.0, child.0
                )));
            }
            if let FlowKind::LoopBack { target } = node.kind {
                if !self.get(target).is_some_and(|t| t.kind.is_loop()) {
                    return Err(CompileError::InvalidControlFlow(format!(
                        "loop-back node {} does not target a loop",
                        node.id.0
                    )));
                }
            }
        }
        if !self.reachable().iter().any(|n| n.kind == FlowKind::Exit) {
            return Err(CompileError::InvalidControlFlow(
                "no EXIT node is reachable from ENTRY".to_string(),
            ));
        }
        Ok(())
    }

    /// Текстовый контур дерева с отступами.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.outline_node(self.entry, 0, &mut out);
        out
    }

    fn outline_node(&self, id: FlowId, depth: usize, out: &mut String) {
        let Some(node) = self.get(id) else {
            return;
        };
        out.push_str(&"  ".repeat(depth));
        match &node.kind {
            FlowKind::Branch { branch } => out.push_str(&format!("{:?}", branch).to_uppercase()),
            FlowKind::LoopBack { target } => out.push_str(&format!("LOOP_BACK -> {}", target.0)),
            kind => out.push_str(kind.tag()),
        }
        if !node.label.is_empty() {
            out.push_str(&format!(" {}", node.label));
        }
        out.push('\n');
        for &child in &node.children {
            self.outline_node(child, depth + 1, out);
        }
    }
}

/// Строит дерево потока управления по дереву разбора.
pub struct ControlFlowBuilder<'a> {
    tree: &'a ParseTree,
    nodes: Vec<FlowNode>,
}

/// Чем закончилась последовательность операторов.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    /// Управление уходит дальше.
    FallThrough,
    /// `break` или `continue`.
    Jump,
    /// `return`: последним узлом стоит `Exit`.
    Exit,
}

/// Результат разбора последовательности.
struct Sequence {
    nodes: Vec<FlowId>,
    ending: Ending,
}

impl Sequence {
    /// Нужен ли завершающий `Exit` телу программы или функции.
    fn needs_exit(&self) -> bool {
        self.ending != Ending::Exit
    }
}

impl<'a> ControlFlowBuilder<'a> {
    pub fn new(tree: &'a ParseTree) -> Self {
        Self {
            tree,
            nodes: Vec::new(),
        }
    }

    pub fn build(mut self) -> CompileResult<ControlFlow> {
        let root = self.node(self.tree.root())?;
        if !matches!(root.kind, NodeKind::Program) {
            return Err(CompileError::MalformedNode {
                stage: STAGE,
                construct: "program",
                line: root.line,
                column: root.column,
            });
        }

        let entry = self.alloc(FlowKind::Entry, String::new(), root.line);
        let mut body = self.sequence(&root.children)?;
        if body.needs_exit() {
            let line = self.last_line(root);
            body.nodes.push(self.alloc(FlowKind::Exit, String::new(), line));
        }
        self.nodes[entry.0].children = body.nodes;

        let flow = ControlFlow {
            nodes: self.nodes,
            entry,
        };
        flow.validate()?;
        log::debug!("control flow: {} nodes", flow.len());
        Ok(flow)
    }

    fn node(&self, id: NodeId) -> CompileResult<&'a ParseNode> {
        self.tree.get(id).ok_or(CompileError::NodeNotFound {
            stage: STAGE,
            node: id.0,
        })
    }

    fn alloc(&mut self, kind: FlowKind, label: String, line: usize) -> FlowId {
        let id = FlowId(self.nodes.len());
        self.nodes.push(FlowNode {
            id,
            kind,
            label,
            line,
            calls: Vec::new(),
            allocates: false,
            children: Vec::new(),
        });
        id
    }

    /// Строка последнего оператора программы (для завершающего `Exit`).
    fn last_line(&self, root: &ParseNode) -> usize {
        root.children
            .last()
            .and_then(|&id| self.tree.get(id))
            .map_or(root.line, |n| n.line)
    }

    /// Последовательность операторов. Подряд идущие простые операторы
    /// сливаются в один узел `Statement`; всё после перехода отбрасывается.
    fn sequence(&mut self, items: &[NodeId]) -> CompileResult<Sequence> {
        stacker::maybe_grow(64 * 1024, 2 * 1024 * 1024, || {
            let mut out = Vec::new();
            let mut run: Vec<&'a ParseNode> = Vec::new();

            for &id in items {
                let node = self.node(id)?;
                match &node.kind {
                    NodeKind::Error { .. } => continue,
                    NodeKind::If { .. }
                    | NodeKind::While { .. }
                    | NodeKind::For { .. }
                    | NodeKind::Function { .. }
                    | NodeKind::Block => {}
                    kind if kind.is_jump() => {}
                    _ => {
                        run.push(node);
                        continue;
                    }
                }

                self.flush(&mut run, &mut out)?;
                match &node.kind {
                    NodeKind::If { condition } => out.push(self.if_node(node, condition)?),
                    NodeKind::While { condition } | NodeKind::For { condition } => {
                        out.push(self.loop_node(node, condition)?)
                    }
                    NodeKind::Function { name, params } => {
                        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
                        let label = format!("{}({})", name, names.join(", "));
                        out.push(self.function(node, name, label)?);
                    }
                    NodeKind::Block => {
                        let inner = self.sequence(&node.children)?;
                        out.extend(inner.nodes);
                        if inner.ending != Ending::FallThrough {
                            return Ok(Sequence {
                                nodes: out,
                                ending: inner.ending,
                            });
                        }
                    }
                    _ => {
                        // return, break, continue
                        let (kind, ending) = if matches!(node.kind, NodeKind::Return) {
                            (FlowKind::Exit, Ending::Exit)
                        } else {
                            (FlowKind::Statement, Ending::Jump)
                        };
                        let id = self.alloc(kind, statement_label(node), node.line);
                        self.annotate(id, &[node.id])?;
                        out.push(id);
                        return Ok(Sequence { nodes: out, ending });
                    }
                }
            }

            self.flush(&mut run, &mut out)?;
            Ok(Sequence {
                nodes: out,
                ending: Ending::FallThrough,
            })
        })
    }

    /// Превратить накопленные простые операторы в один узел.
    fn flush(&mut self, run: &mut Vec<&'a ParseNode>, out: &mut Vec<FlowId>) -> CompileResult<()> {
        let Some(first) = run.first() else {
            return Ok(());
        };
        let label = run
            .iter()
            .map(|n| statement_label(n))
            .collect::<Vec<_>>()
            .join(" ");
        let id = self.alloc(FlowKind::Statement, label, first.line);
        let roots: Vec<NodeId> = run.iter().map(|n| n.id).collect();
        self.annotate(id, &roots)?;
        out.push(id);
        run.clear();
        Ok(())
    }

    /// Записать в узел вызовы и создание массивов из поддеревьев `roots`.
    fn annotate(&mut self, id: FlowId, roots: &[NodeId]) -> CompileResult<()> {
        let mut calls = Vec::new();
        let mut allocates = false;
        let mut stack: Vec<NodeId> = roots.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            let node = self.node(current)?;
            match &node.kind {
                NodeKind::Call { callee } => calls.push(callee.clone()),
                NodeKind::Array => allocates = true,
                _ => {}
            }
            stack.extend(node.children.iter().rev().copied());
        }
        let flow = &mut self.nodes[id.0];
        flow.calls = calls;
        flow.allocates = allocates;
        Ok(())
    }

    /// Ветка: блок разворачивается, одиночный оператор идёт как есть.
    fn branch(&mut self, branch: BranchKind, body: NodeId) -> CompileResult<FlowId> {
        let node = self.node(body)?;
        let items = if node.kind.is_statement_list() {
            node.children.clone()
        } else {
            vec![body]
        };
        let id = self.alloc(FlowKind::Branch { branch }, String::new(), node.line);
        let inner = self.sequence(&items)?;
        self.nodes[id.0].children = inner.nodes;
        Ok(id)
    }

    fn if_node(&mut self, node: &'a ParseNode, condition: &str) -> CompileResult<FlowId> {
        let (Some(&cond), Some(&then)) = (node.children.first(), node.children.get(1)) else {
            return Err(malformed("if", node));
        };
        let id = self.alloc(FlowKind::If, condition.to_string(), node.line);
        self.annotate(id, &[cond])?;

        let mut children = vec![self.branch(BranchKind::True, then)?];
        if let Some(&otherwise) = node.children.get(2) {
            children.push(self.branch(BranchKind::False, otherwise)?);
        }
        self.nodes[id.0].children = children;
        Ok(id)
    }

    fn loop_node(&mut self, node: &'a ParseNode, condition: &str) -> CompileResult<FlowId> {
        let (kind, header, body) = match node.kind {
            NodeKind::While { .. } if node.children.len() == 2 => {
                (FlowKind::While, vec![node.children[0]], node.children[1])
            }
            NodeKind::For { .. } if node.children.len() == 4 => {
                (FlowKind::For, node.children[..3].to_vec(), node.children[3])
            }
            _ => return Err(malformed("loop", node)),
        };
        let label = match node.kind {
            NodeKind::For { .. } => self.for_header(&header)?,
            _ => condition.to_string(),
        };

        let id = self.alloc(kind, label, node.line);
        self.annotate(id, &header)?;
        let body = self.branch(BranchKind::Body, body)?;
        let back = self.alloc(FlowKind::LoopBack { target: id }, condition.to_string(), node.line);
        self.nodes[id.0].children = vec![body, back];
        Ok(id)
    }

    /// Заголовок `for` в виде `init; cond; incr`.
    fn for_header(&self, clauses: &[NodeId]) -> CompileResult<String> {
        let mut parts = Vec::with_capacity(clauses.len());
        for &clause in clauses {
            let text = match &self.node(clause)?.kind {
                NodeKind::ForInit { tokens }
                | NodeKind::ForCondition { tokens }
                | NodeKind::ForIncrement { tokens } => crate::parser::token::slice_text(tokens),
                _ => String::new(),
            };
            parts.push(text);
        }
        Ok(parts.join("; "))
    }

    fn function(&mut self, node: &'a ParseNode, name: &str, label: String) -> CompileResult<FlowId> {
        let Some(&body) = node.children.first() else {
            return Err(malformed("function", node));
        };
        let body = self.node(body)?;
        let id = self.alloc(
            FlowKind::Function {
                name: name.to_string(),
            },
            label,
            node.line,
        );
        let mut inner = self.sequence(&body.children)?;
        if inner.needs_exit() {
            let line = self.last_line(body);
            inner.nodes.push(self.alloc(FlowKind::Exit, String::new(), line));
        }
        self.nodes[id.0].children = inner.nodes;
        Ok(id)
    }
}

fn statement_label(node: &ParseNode) -> String {
    node.text.clone().unwrap_or_else(|| node.kind.tag().to_lowercase())
}

fn malformed(construct: &'static str, node: &ParseNode) -> CompileError {
    CompileError::MalformedNode {
        stage: STAGE,
        construct,
        line: node.line,
        column: node.column,
    }
}

/// Построить дерево потока управления.
pub fn build_control_flow(tree: &ParseTree) -> CompileResult<ControlFlow> {
    ControlFlowBuilder::new(tree).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::parser::{parse, Lexer};

    fn flow(source: &str) -> ControlFlow {
        let mut diagnostics = Diagnostics::new();
        let tokens = Lexer::new(source).tokenize(&mut diagnostics);
        let tree = parse(&tokens, &mut diagnostics).unwrap();
        build_control_flow(&tree).unwrap()
    }

    fn kinds(flow: &ControlFlow, ids: &[FlowId]) -> Vec<&'static str> {
        ids.iter().map(|&id| flow.get(id).unwrap().kind.tag()).collect()
    }

    fn entry(flow: &ControlFlow) -> &FlowNode {
        flow.get(flow.entry()).unwrap()
    }

    #[test]
    fn test_straight_line_merges() {
        let flow = flow("let a = 1;\nlet b = a + 1;\nb = b * 2;");
        let root = entry(&flow);
        assert_eq!(kinds(&flow, &root.children), vec!["STATEMENT", "EXIT"]);
        let statement = flow.get(root.children[0]).unwrap();
        assert_eq!(statement.label, "let a = 1; let b = a + 1; b = b * 2;");
        assert_eq!(statement.line, 1);
    }

    #[test]
    fn test_empty_program() {
        let flow = flow("");
        assert_eq!(kinds(&flow, &entry(&flow).children), vec!["EXIT"]);
        assert!(flow.validate().is_ok());
    }

    #[test]
    fn test_if_branches() {
        let flow = flow("let x = 1;\nif (x > 0) { x = 2; } else { x = 3; }\nx = 4;");
        let root = entry(&flow);
        assert_eq!(
            kinds(&flow, &root.children),
            vec!["STATEMENT", "IF", "STATEMENT", "EXIT"]
        );
        let if_node = flow.get(root.children[1]).unwrap();
        assert_eq!(if_node.label, "x > 0");
        let branches: Vec<&FlowKind> = if_node
            .children
            .iter()
            .map(|&id| &flow.get(id).unwrap().kind)
            .collect();
        assert_eq!(
            branches,
            vec![
                &FlowKind::Branch { branch: BranchKind::True },
                &FlowKind::Branch { branch: BranchKind::False }
            ]
        );
    }

    #[test]
    fn test_loop_has_body_and_loop_back() {
        let flow = flow("for (i = 0; i < n; i++) { x = x + 1; }");
        let root = entry(&flow);
        let loop_id = root.children[0];
        let loop_node = flow.get(loop_id).unwrap();
        assert_eq!(loop_node.kind, FlowKind::For);
        assert_eq!(loop_node.label, "i = 0; i < n; i++");
        assert_eq!(kinds(&flow, &loop_node.children), vec!["BRANCH", "LOOP_BACK"]);

        let back = flow.get(loop_node.children[1]).unwrap();
        assert_eq!(back.kind, FlowKind::LoopBack { target: loop_id });
        assert!(back.children.is_empty());

        let body = flow.get(loop_node.children[0]).unwrap();
        assert_eq!(kinds(&flow, &body.children), vec!["STATEMENT"]);
    }

    #[test]
    fn test_function_with_multiple_returns() {
        let flow = flow(
            "function sign(x) {\n  if (x < 0) { return -1; }\n  if (x == 0) { return 0; }\n  return 1;\n}",
        );
        let exits = flow
            .reachable()
            .iter()
            .filter(|n| n.kind == FlowKind::Exit)
            .count();
        // Три return и завершение программы
        assert_eq!(exits, 4);

        let function = flow.get(entry(&flow).children[0]).unwrap();
        assert_eq!(function.label, "sign(x)");
        assert_eq!(kinds(&flow, &function.children), vec!["IF", "IF", "EXIT"]);
    }

    #[test]
    fn test_dead_code_is_dropped() {
        let flow = flow("while (true) { break; x = 1; }\ny = 2;");
        let loop_node = flow.get(entry(&flow).children[0]).unwrap();
        let body = flow.get(loop_node.children[0]).unwrap();
        assert_eq!(body.children.len(), 1);
        assert_eq!(flow.get(body.children[0]).unwrap().label, "break;");
    }

    #[test]
    fn test_break_does_not_replace_exit() {
        let program = flow("break;");
        assert_eq!(kinds(&program, &entry(&program).children), vec!["STATEMENT", "EXIT"]);
        assert!(program.validate().is_ok());

        let nested = flow("function f() {\n  { continue; }\n}");
        let function = nested.get(entry(&nested).children[0]).unwrap();
        assert_eq!(kinds(&nested, &function.children), vec!["STATEMENT", "EXIT"]);
    }

    #[test]
    fn test_calls_and_allocations_recorded() {
        let flow = flow("let xs = [1, 2];\nlet y = f(g(1), 2);");
        let statement = flow.get(entry(&flow).children[0]).unwrap();
        assert_eq!(statement.calls, vec!["f".to_string(), "g".to_string()]);
        assert!(statement.allocates);
    }

    #[test]
    fn test_single_entry_and_reachable_exit() {
        let flow = flow("if (a) { while (b) { c(); } }");
        let entries = flow.nodes().iter().filter(|n| n.kind == FlowKind::Entry).count();
        assert_eq!(entries, 1);
        assert!(flow.reachable().iter().any(|n| n.kind == FlowKind::Exit));
        assert_eq!(flow.decision_count(), 2);
    }

    #[test]
    fn test_outline() {
        let flow = flow("while (n > 0) { n = n - 1; }");
        let outline = flow.outline();
        assert!(outline.starts_with("ENTRY\n  WHILE n > 0\n    BODY\n"));
        assert!(outline.contains("LOOP_BACK -> 1"));
        assert!(outline.trim_end().ends_with("EXIT"));
    }

    #[test]
    fn test_validate_rejects_missing_exit() {
        let broken = ControlFlow {
            nodes: vec![FlowNode {
                id: FlowId(0),
                kind: FlowKind::Entry,
                label: String::new(),
                line: 1,
                calls: Vec::new(),
                allocates: false,
                children: Vec::new(),
            }],
            entry: FlowId(0),
        };
        assert!(matches!(broken.validate(), Err(CompileError::InvalidControlFlow(_))));
    }
}
