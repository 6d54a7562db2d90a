//! Tracking of who uses whom.
//!
//! A [`Manager`] records, for every live node, the set of `(consumer,
//! position)` pairs whose operand at `position` is that node. Passes read it
//! and mutate edges only through [`Manager::set_edge`] and
//! [`Manager::replace`], which keep the program and the map in step.

use crate::ir::{NodeId, Program};
use hashbrown::HashSet;
use indexmap::{IndexMap, IndexSet};
use log::trace;

/// A use of a node: the consumer and the operand position it occupies there.
pub type Use = (NodeId, usize);

/// The user-edge map of a [`Program`].
#[derive(Debug, Clone, Default)]
pub struct Manager {
    users: IndexMap<NodeId, IndexSet<Use>>,
    tracked: HashSet<NodeId>,
    roots: HashSet<NodeId>,
}

impl Manager {
    /// Builds the user map of every node reachable from a sub-graph output.
    #[must_use]
    pub fn new(program: &Program) -> Self {
        let mut manager = Self::default();
        for (_, graph) in program.graphs() {
            if let Some(output) = graph.output() {
                manager.roots.insert(output);
                manager.track(program, output);
            }
        }
        manager
    }

    /// Returns `true` if `node` is live, i.e. reachable from some output.
    #[must_use]
    pub fn is_tracked(&self, node: NodeId) -> bool {
        self.tracked.contains(&node)
    }

    /// The uses of `node`, in the order they were recorded.
    #[must_use]
    pub fn users_of(&self, node: NodeId) -> Vec<Use> {
        self.users
            .get(&node)
            .map(|users| users.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Records the edges of `root` and of every node below it that is not
    /// tracked yet.
    pub fn track(&mut self, program: &Program, root: NodeId) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !self.tracked.insert(node) {
                continue;
            }
            if let Some(operands) = program.operands(node) {
                for (pos, &operand) in operands.iter().enumerate() {
                    self.users.entry(operand).or_default().insert((node, pos));
                    stack.push(operand);
                }
            }
        }
    }

    /// Points operand `pos` of `consumer` at `new`.
    pub fn set_edge(&mut self, program: &mut Program, consumer: NodeId, pos: usize, new: NodeId) {
        let old = match program.set_operand(consumer, pos, new) {
            Some(old) => old,
            None => return,
        };
        trace!("set edge {}#{}: {} -> {}", consumer, pos, old, new);
        if let Some(users) = self.users.get_mut(&old) {
            users.shift_remove(&(consumer, pos));
        }
        self.track(program, new);
        self.users.entry(new).or_default().insert((consumer, pos));
        self.drop_if_dead(program, old);
    }

    /// Points every use of `old` at `new`. Returns `false` if `old` had no
    /// uses to redirect.
    pub fn replace(&mut self, program: &mut Program, old: NodeId, new: NodeId) -> bool {
        if old == new {
            return false;
        }
        let users = self.users_of(old);
        if users.is_empty() {
            return false;
        }
        self.track(program, new);
        for (consumer, pos) in users {
            self.set_edge(program, consumer, pos, new);
        }
        true
    }

    /// Forgets `node`, and recursively its operands, once nothing uses it.
    fn drop_if_dead(&mut self, program: &Program, node: NodeId) {
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            let unused = self.users.get(&node).map_or(true, IndexSet::is_empty);
            if !unused || self.roots.contains(&node) || !self.tracked.remove(&node) {
                continue;
            }
            self.users.shift_remove(&node);
            if let Some(operands) = program.operands(node) {
                for (pos, &operand) in operands.iter().enumerate() {
                    if let Some(users) = self.users.get_mut(&operand) {
                        users.shift_remove(&(node, pos));
                    }
                    stack.push(operand);
                }
            }
        }
    }
}
