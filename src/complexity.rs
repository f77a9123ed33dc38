//! Эвристическая оценка сложности по дереву потока управления.
//!
//! Все оценки приближённые:
//! - цикломатическая сложность = число узлов `If`/`For`/`While` + 1
//!   (`&&` и `||` точками ветвления не считаются);
//! - время оценивается по максимальной глубине вложенности циклов `d`: `O(1)` при
//!   `d = 0`, иначе `O(n^d)`. Вызов функции внутри цикла добавляет
//!   глубину циклов вызываемой функции;
//! - рекурсия: функция в цикле вызовов с одним местом вызова внутри цикла
//!   считается линейной, `O(n)` (или `O(n^(d+1))`, если в ней есть циклы
//!   глубины `d`); с несколькими местами вызова `O(2^n)`;
//! - память: `O(n)`, если массив создаётся внутри цикла или есть
//!   рекурсия, иначе `O(1)`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::control_flow::{ControlFlow, FlowId, FlowKind};

/// Асимптотический класс.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ComplexityClass {
    Constant,
    /// `O(n^d)`, `d >= 1`.
    Polynomial(u32),
    Exponential,
}

impl ComplexityClass {
    /// Класс для глубины вложенности циклов.
    pub fn from_depth(depth: usize) -> Self {
        match depth {
            0 => Self::Constant,
            d => Self::Polynomial(u32::try_from(d).unwrap_or(u32::MAX)),
        }
    }
}

impl fmt::Display for ComplexityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant => write!(f, "O(1)"),
            Self::Polynomial(1) => write!(f, "O(n)"),
            Self::Polynomial(d) => write!(f, "O(n^{})", d),
            Self::Exponential => write!(f, "O(2^n)"),
        }
    }
}

impl From<ComplexityClass> for String {
    fn from(class: ComplexityClass) -> Self {
        class.to_string()
    }
}

impl TryFrom<String> for ComplexityClass {
    type Error = String;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        match text.as_str() {
            "O(1)" => Ok(Self::Constant),
            "O(n)" => Ok(Self::Polynomial(1)),
            "O(2^n)" => Ok(Self::Exponential),
            other => other
                .strip_prefix("O(n^")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|d| d.parse::<u32>().ok())
                .filter(|&d| d >= 1)
                .map(Self::Polynomial)
                .ok_or_else(|| format!("unknown complexity class '{}'", other)),
        }
    }
}

/// Итог оценки.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityInfo {
    pub cyclomatic_complexity: usize,
    pub time_complexity: ComplexityClass,
    pub space_complexity: ComplexityClass,
    pub max_loop_depth: usize,
    /// Функции, участвующие в рекурсии, по алфавиту.
    pub recursive_functions: Vec<String>,
}

/// Оценщик для одного дерева потока управления.
pub struct ComplexityEstimator<'a> {
    flow: &'a ControlFlow,
    /// Первое объявление каждой функции.
    functions: BTreeMap<&'a str, FlowId>,
    depth_cache: HashMap<&'a str, usize>,
    in_progress: HashSet<&'a str>,
}

impl<'a> ComplexityEstimator<'a> {
    pub fn new(flow: &'a ControlFlow) -> Self {
        let mut functions = BTreeMap::new();
        for node in flow.reachable() {
            if let FlowKind::Function { name } = &node.kind {
                functions.entry(name.as_str()).or_insert(node.id);
            }
        }
        Self {
            flow,
            functions,
            depth_cache: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    pub fn estimate(mut self) -> ComplexityInfo {
        let cyclomatic_complexity = self.flow.decision_count() + 1;

        let mut max_loop_depth = self.nesting(self.flow.entry(), 0);
        let names: Vec<&'a str> = self.functions.keys().copied().collect();
        for name in names {
            max_loop_depth = max_loop_depth.max(self.function_depth(name));
        }

        let recursion = self.recursion();
        let mut time = ComplexityClass::from_depth(max_loop_depth);
        for class in recursion.values() {
            time = time.max(*class);
        }

        let space = if !recursion.is_empty() || self.allocates_in_loop(self.flow.entry(), 0) {
            ComplexityClass::Polynomial(1)
        } else {
            ComplexityClass::Constant
        };

        let recursive_functions: Vec<String> = recursion.keys().map(|s| s.to_string()).collect();
        log::debug!(
            "complexity: cyclomatic {}, time {}, space {}",
            cyclomatic_complexity,
            time,
            space
        );

        ComplexityInfo {
            cyclomatic_complexity,
            time_complexity: time,
            space_complexity: space,
            max_loop_depth,
            recursive_functions,
        }
    }

    // === Вложенность циклов ===

    /// Наибольшая глубина циклов в поддереве `id`, считая с `depth`.
    /// Тела функций пропускаются: они оцениваются отдельно.
    fn nesting(&mut self, id: FlowId, depth: usize) -> usize {
        let flow = self.flow;
        let Some(node) = flow.get(id) else {
            return depth;
        };
        let inner = if node.kind.is_loop() { depth + 1 } else { depth };
        let mut best = inner;
        for callee in &node.calls {
            best = best.max(inner + self.function_depth(callee));
        }
        for &child in &node.children {
            let is_function = flow
                .get(child)
                .is_some_and(|c| matches!(c.kind, FlowKind::Function { .. }));
            if !is_function {
                best = best.max(self.nesting(child, inner));
            }
        }
        best
    }

    /// Глубина циклов внутри функции с учётом её вызовов.
    /// Рекурсивный вызов вклада не даёт.
    fn function_depth(&mut self, name: &str) -> usize {
        let Some((&key, &id)) = self.functions.get_key_value(name) else {
            return 0;
        };
        if let Some(&depth) = self.depth_cache.get(key) {
            return depth;
        }
        if !self.in_progress.insert(key) {
            return 0;
        }
        let flow = self.flow;
        let mut depth = 0;
        for &child in flow.get(id).map_or(&[][..], |n| n.children.as_slice()) {
            if !flow
                .get(child)
                .is_some_and(|c| matches!(c.kind, FlowKind::Function { .. }))
            {
                depth = depth.max(self.nesting(child, 0));
            }
        }
        self.in_progress.remove(key);
        self.depth_cache.insert(key, depth);
        depth
    }

    // === Рекурсия ===

    /// Места вызова в теле функции (без вложенных функций).
    fn body_calls(&self, id: FlowId) -> Vec<&'a str> {
        let flow = self.flow;
        let mut calls = Vec::new();
        let mut stack: Vec<FlowId> = flow
            .get(id)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(current) = stack.pop() {
            let Some(node) = flow.get(current) else {
                continue;
            };
            if matches!(node.kind, FlowKind::Function { .. }) {
                continue;
            }
            calls.extend(node.calls.iter().map(String::as_str));
            stack.extend(node.children.iter().rev().copied());
        }
        calls
    }

    /// Класс каждой рекурсивной функции.
    fn recursion(&mut self) -> BTreeMap<&'a str, ComplexityClass> {
        let mut graph: BTreeMap<&'a str, Vec<&'a str>> = BTreeMap::new();
        for (&name, &id) in &self.functions {
            let calls = self
                .body_calls(id)
                .into_iter()
                .filter(|callee| self.functions.contains_key(callee))
                .collect();
            graph.insert(name, calls);
        }

        let reach: BTreeMap<&'a str, BTreeSet<&'a str>> = graph
            .keys()
            .map(|&name| (name, reachable_from(&graph, name)))
            .collect();

        let mut classes = BTreeMap::new();
        for (&name, reached) in &reach {
            if !reached.contains(name) {
                continue;
            }
            // Вызовы функций из того же цикла вызовов
            let sites = graph[name]
                .iter()
                .filter(|callee| reach.get(*callee).is_some_and(|r| r.contains(name)))
                .count();
            let class = if sites <= 1 {
                let loops = self.function_depth(name);
                ComplexityClass::from_depth(loops + 1)
            } else {
                ComplexityClass::Exponential
            };
            classes.insert(name, class);
        }
        classes
    }

    // === Память ===

    fn allocates_in_loop(&self, id: FlowId, depth: usize) -> bool {
        let Some(node) = self.flow.get(id) else {
            return false;
        };
        if node.allocates && depth > 0 {
            return true;
        }
        let inner = match node.kind {
            FlowKind::For | FlowKind::While => depth + 1,
            FlowKind::Function { .. } => 0,
            _ => depth,
        };
        node.children
            .iter()
            .any(|&child| self.allocates_in_loop(child, inner))
    }
}

/// Функции, достижимые из `start` хотя бы одним вызовом.
fn reachable_from<'a>(graph: &BTreeMap<&'a str, Vec<&'a str>>, start: &'a str) -> BTreeSet<&'a str> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<&'a str> = graph.get(start).cloned().unwrap_or_default();
    while let Some(name) = stack.pop() {
        if seen.insert(name) {
            if let Some(next) = graph.get(name) {
                stack.extend(next.iter().copied());
            }
        }
    }
    seen
}

/// Оценить сложность дерева потока управления.
pub fn estimate(flow: &ControlFlow) -> ComplexityInfo {
    ComplexityEstimator::new(flow).estimate()
}
