//! Comment threading.
//!
//! Answers arrive as a flat list where each record may point at a parent. The
//! builder turns that list into a forest without re-sorting: roots and siblings
//! keep their input order. A parent that is missing from the list, or that
//! points back at the record itself, makes the record a root. Records on a
//! parent-pointer cycle also become roots, so every input record appears in
//! the forest exactly once.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use bulsho_shared::types::{Answer, AnswerId, ChangeEvent, QuestionId};
use tracing::debug;

/// A record that can be placed in a thread.
pub trait Threaded {
    type Id: Copy + Eq + Hash;

    fn id(&self) -> Self::Id;
    fn parent_id(&self) -> Option<Self::Id>;
}

impl Threaded for Answer {
    type Id = AnswerId;

    fn id(&self) -> AnswerId {
        self.id
    }

    fn parent_id(&self) -> Option<AnswerId> {
        self.parent_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadNode<T> {
    pub item: T,
    pub children: Vec<ThreadNode<T>>,
}

impl<T> ThreadNode<T> {
    /// Number of nodes in this subtree, including this one.
    pub fn size(&self) -> usize {
        let mut size = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            size += 1;
            stack.extend(node.children.iter());
        }
        size
    }
}

// Threads can be arbitrarily deep; tear them down without recursion.
impl<T> Drop for ThreadNode<T> {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}

const UNVISITED: u8 = 0;
const ON_PATH: u8 = 1;
const DONE: u8 = 2;

/// Build a forest from a flat list in O(n).
pub fn build_forest<T: Threaded>(items: impl IntoIterator<Item = T>) -> Vec<ThreadNode<T>> {
    let items: Vec<T> = items.into_iter().collect();
    let n = items.len();

    let mut index: HashMap<T::Id, usize> = HashMap::with_capacity(n);
    for (i, item) in items.iter().enumerate() {
        index.entry(item.id()).or_insert(i);
    }

    let mut parents: Vec<Option<usize>> = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.parent_id()
                .and_then(|parent| index.get(&parent).copied())
                .filter(|&parent| parent != i)
        })
        .collect();

    break_cycles(&mut parents);

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots = Vec::new();
    for (i, parent) in parents.iter().enumerate() {
        match parent {
            Some(parent) => children[*parent].push(i),
            None => roots.push(i),
        }
    }

    // Pre-order walk; building in reverse guarantees children exist before parents.
    let mut order = Vec::with_capacity(n);
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(i) = stack.pop() {
        order.push(i);
        stack.extend(children[i].iter().rev().copied());
    }

    let mut items: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut built: Vec<Option<ThreadNode<T>>> = (0..n).map(|_| None).collect();
    for &i in order.iter().rev() {
        let node_children = children[i]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        if let Some(item) = items[i].take() {
            built[i] = Some(ThreadNode {
                item,
                children: node_children,
            });
        }
    }

    roots
        .into_iter()
        .filter_map(|root| built[root].take())
        .collect()
}

/// Detach every node that sits on a parent-pointer cycle.
///
/// Each node has at most one parent, so walking from every unvisited node
/// either ends at a root, at an already finished node, or at a node on the
/// current path. Every node is walked once.
fn break_cycles(parents: &mut [Option<usize>]) {
    let mut state = vec![UNVISITED; parents.len()];
    let mut path = Vec::new();

    for start in 0..parents.len() {
        if state[start] != UNVISITED {
            continue;
        }

        let mut current = Some(start);
        while let Some(i) = current {
            match state[i] {
                UNVISITED => {
                    state[i] = ON_PATH;
                    path.push(i);
                    current = parents[i];
                }
                ON_PATH => {
                    let cycle_start = path.iter().rposition(|&p| p == i).unwrap_or(0);
                    for &node in &path[cycle_start..] {
                        parents[node] = None;
                    }
                    debug!(length = path.len() - cycle_start, "Detached parent cycle");
                    break;
                }
                _ => break,
            }
        }

        for node in path.drain(..) {
            state[node] = DONE;
        }
    }
}

/// Depth-first walk yielding `(depth, item)` in display order.
pub fn walk<T>(forest: &[ThreadNode<T>]) -> Vec<(usize, &T)> {
    let mut out = Vec::new();
    let mut stack: Vec<(usize, &ThreadNode<T>)> = forest.iter().rev().map(|n| (0, n)).collect();
    while let Some((depth, node)) = stack.pop() {
        out.push((depth, &node.item));
        stack.extend(node.children.iter().rev().map(|c| (depth + 1, c)));
    }
    out
}

/// The answers of one question, threaded, plus any open reply drafts.
///
/// Realtime events rebuild the forest from the flat list. Drafts are keyed by
/// answer id and survive rebuilds for as long as their answer exists.
#[derive(Debug, Clone)]
pub struct CommentThread {
    question_id: QuestionId,
    answers: Vec<Answer>,
    drafts: HashMap<AnswerId, String>,
    forest: Vec<ThreadNode<Answer>>,
}

impl CommentThread {
    /// `answers` must already be in display order, usually `created_at` ascending.
    pub fn new(question_id: QuestionId, answers: Vec<Answer>) -> Self {
        let mut thread = Self {
            question_id,
            answers,
            drafts: HashMap::new(),
            forest: Vec::new(),
        };
        thread.rebuild();
        thread
    }

    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }

    pub fn forest(&self) -> &[ThreadNode<Answer>] {
        &self.forest
    }

    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn contains(&self, id: AnswerId) -> bool {
        self.answers.iter().any(|answer| answer.id == id)
    }

    /// Store a reply draft under `parent`. Returns `false` if no such answer exists.
    pub fn set_draft(&mut self, parent: AnswerId, text: impl Into<String>) -> bool {
        if !self.contains(parent) {
            return false;
        }
        self.drafts.insert(parent, text.into());
        true
    }

    pub fn draft(&self, parent: AnswerId) -> Option<&str> {
        self.drafts.get(&parent).map(String::as_str)
    }

    pub fn take_draft(&mut self, parent: AnswerId) -> Option<String> {
        self.drafts.remove(&parent)
    }

    /// Reduce a change event into the thread. Returns whether the forest changed.
    pub fn apply_event(&mut self, event: &ChangeEvent) -> bool {
        let changed = match event {
            ChangeEvent::AnswerInserted(answer) => {
                if answer.question_id != self.question_id || self.contains(answer.id) {
                    false
                } else {
                    self.answers.push(answer.clone());
                    true
                }
            }
            ChangeEvent::AnswerUpdated(answer) => {
                match self.answers.iter_mut().find(|a| a.id == answer.id) {
                    Some(existing) if existing != answer => {
                        *existing = answer.clone();
                        true
                    }
                    _ => false,
                }
            }
            ChangeEvent::AnswerDeleted { id } => {
                let before = self.answers.len();
                self.answers.retain(|answer| answer.id != *id);
                self.drafts.remove(id);
                self.answers.len() != before
            }
            ChangeEvent::RelationChanged { .. } | ChangeEvent::AggregateRefreshed { .. } => false,
        };

        if changed {
            self.rebuild();
        }
        changed
    }

    fn rebuild(&mut self) {
        self.forest = build_forest(self.answers.iter().cloned());
    }
}

/// Open threads keyed by question, shared with the change-feed orchestrator.
#[derive(Debug, Clone, Default)]
pub struct SharedThreads {
    inner: Arc<Mutex<HashMap<QuestionId, CommentThread>>>,
}

impl SharedThreads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a thread, replacing any previous one for the question.
    pub fn insert(&self, thread: CommentThread) {
        self.lock().insert(thread.question_id(), thread);
    }

    pub fn remove(&self, question_id: QuestionId) -> Option<CommentThread> {
        self.lock().remove(&question_id)
    }

    /// Run `f` on the thread of `question_id`, if it is tracked.
    pub fn with<R>(&self, question_id: QuestionId, f: impl FnOnce(&mut CommentThread) -> R) -> Option<R> {
        self.lock().get_mut(&question_id).map(f)
    }

    /// Route an answer event to the thread it belongs to.
    pub fn apply_event(&self, event: &ChangeEvent) -> bool {
        let mut threads = self.lock();
        match event {
            ChangeEvent::AnswerInserted(answer) | ChangeEvent::AnswerUpdated(answer) => threads
                .get_mut(&answer.question_id)
                .map(|thread| thread.apply_event(event))
                .unwrap_or(false),
            // Deletes only carry the id.
            ChangeEvent::AnswerDeleted { .. } => threads
                .values_mut()
                .fold(false, |changed, thread| thread.apply_event(event) || changed),
            ChangeEvent::RelationChanged { .. } | ChangeEvent::AggregateRefreshed { .. } => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<QuestionId, CommentThread>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
