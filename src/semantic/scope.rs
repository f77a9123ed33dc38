//! Дерево областей видимости и таблицы символов.

use serde::{Deserialize, Serialize};

use crate::parser::tree::{NodeId, TypeName};

/// Дескриптор области видимости.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub usize);

/// Тип значения в минимальной системе типов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Number,
    String,
    Boolean,
    Array,
    Function,
    /// Тип ещё не выведен (объявление без инициализатора, результат вызова).
    Unknown,
}

impl ValueType {
    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

impl From<TypeName> for ValueType {
    fn from(name: TypeName) -> Self {
        match name {
            TypeName::Number => Self::Number,
            TypeName::String => Self::String,
            TypeName::Boolean => Self::Boolean,
            TypeName::Array => Self::Array,
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Function => "function",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Global,
    Function,
    Block,
    Loop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Variable,
    Constant,
    Parameter,
    Function,
}

/// Объявленное имя.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub ty: ValueType,
    pub kind: SymbolKind,
    pub line: usize,
    pub column: usize,
    /// Число параметров (только для функций).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arity: Option<usize>,
}

/// Область видимости. Символы хранятся в порядке объявления.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    /// Конструкция, открывшая область (`None` у глобальной).
    pub owner: Option<NodeId>,
    pub parent: Option<ScopeId>,
    pub depth: usize,
    pub symbols: Vec<Symbol>,
}

impl Scope {
    /// Найти имя только в этой области.
    pub fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }
}

/// Все области одной компиляции; индекс 0 у глобальной.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    /// Дерево из одной глобальной области.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                id: ScopeId(0),
                kind: ScopeKind::Global,
                owner: None,
                parent: None,
                depth: 0,
                symbols: Vec::new(),
            }],
        }
    }

    /// Пустое дерево (результат прерванной компиляции).
    pub fn empty() -> Self {
        Self { scopes: Vec::new() }
    }

    pub fn global(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Открыть дочернюю область.
    pub fn push(&mut self, kind: ScopeKind, owner: NodeId, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        let depth = self.get(parent).map_or(0, |p| p.depth + 1);
        self.scopes.push(Scope {
            id,
            kind,
            owner: Some(owner),
            parent: Some(parent),
            depth,
            symbols: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Максимальная глубина вложенности областей.
    ///
    /// Совпадает с вложенностью фигурных скобок, кроме `for` без скобок:
    /// его заголовок всё равно открывает область для переменных цикла.
    pub fn max_depth(&self) -> usize {
        self.scopes.iter().map(|s| s.depth).max().unwrap_or(0)
    }

    /// Объявить имя. Если оно уже есть в этой же области, возвращается
    /// прежнее объявление.
    pub fn declare(&mut self, scope: ScopeId, symbol: Symbol) -> Result<(), Symbol> {
        let Some(target) = self.scopes.get_mut(scope.0) else {
            return Ok(());
        };
        if let Some(existing) = target.lookup_local(&symbol.name) {
            return Err(existing.clone());
        }
        target.symbols.push(symbol);
        Ok(())
    }

    /// Найти имя, поднимаясь от `from` к глобальной области.
    pub fn resolve(&self, from: ScopeId, name: &str) -> Option<(ScopeId, &Symbol)> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = self.get(id)?;
            if let Some(symbol) = scope.lookup_local(name) {
                return Some((id, symbol));
            }
            current = scope.parent;
        }
        None
    }

    /// Уточнить тип ранее объявленного имени.
    pub fn refine(&mut self, scope: ScopeId, name: &str, ty: ValueType) {
        if let Some(symbol) = self
            .scopes
            .get_mut(scope.0)
            .and_then(|s| s.symbols.iter_mut().find(|s| s.name == name))
        {
            symbol.ty = ty;
        }
    }
}
