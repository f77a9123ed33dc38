//! Дерево разбора, хранящееся в арене узлов.
//!
//! Все узлы принадлежат [`ParseTree`]; дети адресуются целочисленными
//! дескрипторами [`NodeId`], а не указателями.

use serde::{Deserialize, Serialize};

use super::token::Token;

/// Дескриптор узла в арене дерева разбора.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Аннотация типа в объявлении.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeName {
    Number,
    String,
    Boolean,
    Array,
}

impl TypeName {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "number" => Some(Self::Number),
            "string" => Some(Self::String),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            _ => None,
        }
    }
}

/// Ключевое слово объявления.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclKeyword {
    Let,
    Var,
    Const,
}

/// Параметр функции.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Option<TypeName>,
    pub line: usize,
    pub column: usize,
}

/// Бинарные операторы.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Mod,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "&&" => Self::And,
            "||" => Self::Or,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// Унарные операторы.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Операторы присваивания (`=`, `+=`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    /// Составное присваивание `op=`.
    Compound(BinaryOp),
}

impl AssignOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "=" => Self::Assign,
            "+=" => Self::Compound(BinaryOp::Add),
            "-=" => Self::Compound(BinaryOp::Sub),
            "*=" => Self::Compound(BinaryOp::Mul),
            "/=" => Self::Compound(BinaryOp::Div),
            "%=" => Self::Compound(BinaryOp::Mod),
            _ => return None,
        })
    }
}

/// Инкремент / декремент.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

/// Значение литерала.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Number(f64),
    String(String),
    Boolean(bool),
}

/// Вид узла вместе с данными, нужными только этому виду.
///
/// Раскладка детей:
/// - `Program`, `Block`, `ForBody`: последовательность операторов;
/// - `VarDecl`: `[init?]`;
/// - `Assign`: `[target, value]`;
/// - `If`: `[condition, then, else?]`;
/// - `While`: `[condition, body]`;
/// - `For`: `[ForInit, ForCondition, ForIncrement, ForBody]`;
/// - `ForInit` / `ForCondition` / `ForIncrement`: `[clause?]`;
/// - `Function`: `[body]`;
/// - `Return`: `[value?]`, `ExprStmt`, `[expr]`;
/// - `Binary`: `[lhs, rhs]`, `Unary` / `Update`, `[operand]`;
/// - `Call`: аргументы, `Index`, `[target, index]`, `Array`, элементы.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Program,
    Block,
    VarDecl {
        keyword: DeclKeyword,
        name: String,
        ty: Option<TypeName>,
    },
    Assign {
        op: AssignOp,
    },
    If {
        condition: String,
    },
    While {
        condition: String,
    },
    For {
        condition: String,
    },
    ForInit {
        tokens: Vec<Token>,
    },
    ForCondition {
        tokens: Vec<Token>,
    },
    ForIncrement {
        tokens: Vec<Token>,
    },
    ForBody {
        tokens: Vec<Token>,
    },
    Function {
        name: String,
        params: Vec<Param>,
    },
    Return,
    Break,
    Continue,
    ExprStmt,
    Binary {
        op: BinaryOp,
    },
    Unary {
        op: UnaryOp,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
    },
    Call {
        callee: String,
    },
    Index,
    Array,
    Literal {
        value: LiteralValue,
    },
    Identifier {
        name: String,
    },
    /// Фрагмент, пропущенный при восстановлении после ошибки.
    Error {
        message: String,
    },
}

impl NodeKind {
    /// Короткое имя вида, как в сериализованной форме.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Program => "PROGRAM",
            Self::Block => "BLOCK",
            Self::VarDecl { .. } => "VAR_DECL",
            Self::Assign { .. } => "ASSIGN",
            Self::If { .. } => "IF",
            Self::While { .. } => "WHILE",
            Self::For { .. } => "FOR",
            Self::ForInit { .. } => "FOR_INIT",
            Self::ForCondition { .. } => "FOR_CONDITION",
            Self::ForIncrement { .. } => "FOR_INCREMENT",
            Self::ForBody { .. } => "FOR_BODY",
            Self::Function { .. } => "FUNCTION",
            Self::Return => "RETURN",
            Self::Break => "BREAK",
            Self::Continue => "CONTINUE",
            Self::ExprStmt => "EXPR_STMT",
            Self::Binary { .. } => "BINARY",
            Self::Unary { .. } => "UNARY",
            Self::Update { .. } => "UPDATE",
            Self::Call { .. } => "CALL",
            Self::Index => "INDEX",
            Self::Array => "ARRAY",
            Self::Literal { .. } => "LITERAL",
            Self::Identifier { .. } => "IDENTIFIER",
            Self::Error { .. } => "ERROR",
        }
    }

    /// Содержит ли узел последовательность операторов.
    pub fn is_statement_list(&self) -> bool {
        matches!(self, Self::Program | Self::Block | Self::ForBody { .. })
    }

    /// Безусловная передача управления: всё после неё в том же блоке недостижимо.
    pub fn is_jump(&self) -> bool {
        self.jump_keyword().is_some()
    }

    /// Ключевое слово перехода (`return`, `break`, `continue`).
    pub fn jump_keyword(&self) -> Option<&'static str> {
        match self {
            Self::Return => Some("return"),
            Self::Break => Some("break"),
            Self::Continue => Some("continue"),
            _ => None,
        }
    }
}

/// Узел дерева разбора.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseNode {
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
    pub line: usize,
    pub column: usize,
    /// Текст оператора, восстановленный по токенам (только для операторов).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub children: Vec<NodeId>,
}

/// Дерево разбора: арена узлов и корень.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseTree {
    nodes: Vec<ParseNode>,
    root: NodeId,
}

impl ParseTree {
    pub(crate) fn from_parts(nodes: Vec<ParseNode>, root: NodeId) -> Self {
        Self { nodes, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Найти узел по дескриптору.
    pub fn get(&self, id: NodeId) -> Option<&ParseNode> {
        self.nodes.get(id.0)
    }

    /// Все узлы в порядке создания.
    pub fn nodes(&self) -> &[ParseNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Обход в глубину (pre-order) от корня.
    pub fn preorder(&self) -> Vec<&ParseNode> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.get(id) {
                out.push(node);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Все узлы, подходящие под предикат, в порядке обхода.
    pub fn find_all(&self, pred: impl Fn(&NodeKind) -> bool) -> Vec<&ParseNode> {
        self.preorder()
            .into_iter()
            .filter(|node| pred(&node.kind))
            .collect()
    }

    /// Текстовый контур дерева с отступами.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.outline_node(self.root, 0, &mut out);
        out
    }

    fn outline_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let Some(node) = self.get(id) else {
            return;
        };
        out.push_str(&"  ".repeat(depth));
        out.push_str(node.kind.tag());
        match &node.kind {
            NodeKind::VarDecl { name, .. } | NodeKind::Identifier { name } => {
                out.push_str(&format!(" {}", name));
            }
            NodeKind::Function { name, params } => {
                let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
                out.push_str(&format!(" {}({})", name, names.join(", ")));
            }
            NodeKind::Call { callee } => out.push_str(&format!(" {}", callee)),
            NodeKind::If { condition }
            | NodeKind::While { condition }
            | NodeKind::For { condition } => out.push_str(&format!(" ({})", condition)),
            NodeKind::Binary { op } => out.push_str(&format!(" {}", op.symbol())),
            NodeKind::Literal { value } => out.push_str(&format!(" {:?}", value)),
            NodeKind::Error { message } => out.push_str(&format!(" {}", message)),
            _ => {}
        }
        out.push_str(&format!("  [{}:{}]\n", node.line, node.column));
        for &child in &node.children {
            self.outline_node(child, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: usize, kind: NodeKind) -> ParseNode {
        ParseNode {
            id: NodeId(id),
            kind,
            line: 1,
            column: id + 1,
            text: None,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_preorder_follows_child_order() {
        let a = leaf(0, NodeKind::Identifier { name: "a".into() });
        let b = leaf(1, NodeKind::Identifier { name: "b".into() });
        let mut root = leaf(2, NodeKind::Program);
        root.children = vec![NodeId(0), NodeId(1)];
        let tree = ParseTree::from_parts(vec![a, b, root], NodeId(2));

        let order: Vec<usize> = tree.preorder().iter().map(|n| n.id.0).collect();
        assert_eq!(order, vec![2, 0, 1]);
        assert_eq!(tree.find_all(|k| matches!(k, NodeKind::Identifier { .. })).len(), 2);
    }

    #[test]
    fn test_node_kind_serializes_with_tag() {
        let node = leaf(0, NodeKind::ForInit { tokens: Vec::new() });
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"], "FOR_INIT");
        assert_eq!(json["id"], 0);
    }

    #[test]
    fn test_operator_tables() {
        assert_eq!(BinaryOp::from_symbol("<="), Some(BinaryOp::Le));
        assert_eq!(BinaryOp::Le.symbol(), "<=");
        assert_eq!(AssignOp::from_symbol("+="), Some(AssignOp::Compound(BinaryOp::Add)));
        assert_eq!(AssignOp::from_symbol("=="), None);
        assert_eq!(TypeName::from_name("boolean"), Some(TypeName::Boolean));
    }
}
