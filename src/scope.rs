use std::collections::HashMap;

use crate::timestamp::Timestamp;
use crate::value::Value;

/// A named, parameterized instruction range. Registered once in pass 1,
/// immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Procedure {
    /// Index of the first body instruction (the one after the `proc` line).
    pub start_index: usize,
    /// Ordered formal argument names, unique within the procedure.
    pub params: Vec<String>,
}

/// One procedure activation. Scopes form an explicit chain instead of host
/// recursion so per-iteration time bookkeeping and the recursion ban stay
/// auditable.
#[derive(Debug)]
pub struct Scope {
    pub parent: Option<Box<Scope>>,
    pub start_index: usize,
    /// Instruction index to resume at in the parent when this scope pops.
    pub return_index: usize,
    pub current_iteration: u32,
    pub iterations: u32,
    /// Global time of the activation's local zero.
    pub start_time: Timestamp,
    /// Extra offset applied per loop iteration.
    pub every: Timestamp,
    locals: HashMap<String, Value>,
}

impl Scope {
    pub fn root(start_index: usize) -> Self {
        Self {
            parent: None,
            start_index,
            return_index: 0,
            current_iteration: 0,
            iterations: 1,
            start_time: Timestamp::ZERO,
            every: Timestamp::ZERO,
            locals: HashMap::new(),
        }
    }

    pub fn child(
        parent: Scope,
        start_index: usize,
        return_index: usize,
        iterations: u32,
        start_time: Timestamp,
        every: Timestamp,
    ) -> Self {
        Self {
            parent: Some(Box::new(parent)),
            start_index,
            return_index,
            current_iteration: 0,
            iterations,
            start_time,
            every,
            locals: HashMap::new(),
        }
    }

    /// Pops this activation, returning the parent scope (None at the root).
    pub fn into_parent(self) -> Option<Scope> {
        self.parent.map(|b| *b)
    }

    /// Local lookup only; `iter` and `count` are reserved virtual locals that
    /// always reflect the live iteration state.
    pub fn local(&self, name: &str) -> Option<Value> {
        match name {
            "iter" => Some(Value::Int(self.current_iteration as i32)),
            "count" => Some(Value::Int(self.iterations as i32)),
            _ => self.locals.get(name).cloned(),
        }
    }

    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    /// Composes a locally-authored time with this activation's base start
    /// time and per-iteration offset.
    pub fn global_time(&self, local: Timestamp) -> Timestamp {
        local + self.start_time + self.every * (self.current_iteration as i32)
    }

    /// Advances to the next iteration; true while more remain.
    pub fn next_iteration(&mut self) -> bool {
        self.current_iteration += 1;
        self.current_iteration < self.iterations
    }

    /// True if activating a procedure starting at `start_index` would re-enter
    /// an activation already on this chain. Any match is rejected: the
    /// compiler is an eager unroller and bans recursion by policy, not by
    /// depth limit.
    pub fn would_recurse(&self, start_index: usize) -> bool {
        let mut cur = Some(self);
        while let Some(s) = cur {
            if s.start_index == start_index {
                return true;
            }
            cur = s.parent.as_deref();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::Fixed;

    fn beats(b: i32) -> Timestamp {
        Timestamp::from_beats(Fixed::from_int(b))
    }

    #[test]
    fn iter_and_count_are_reserved_locals() {
        let mut s = Scope::root(0);
        s.iterations = 3;
        assert_eq!(s.local("iter"), Some(Value::Int(0)));
        assert_eq!(s.local("count"), Some(Value::Int(3)));
        s.next_iteration();
        assert_eq!(s.local("iter"), Some(Value::Int(1)));
    }

    #[test]
    fn global_time_composes_start_and_iteration_offset() {
        let root = Scope::root(0);
        let mut s = Scope::child(root, 5, 2, 4, beats(8), beats(2));
        assert_eq!(s.global_time(beats(1)), beats(9));
        s.next_iteration();
        s.next_iteration();
        assert_eq!(s.global_time(beats(1)), beats(13)); // 1 + 8 + 2*2
    }

    #[test]
    fn next_iteration_reports_remaining() {
        let root = Scope::root(0);
        let mut s = Scope::child(root, 5, 2, 3, Timestamp::ZERO, Timestamp::ZERO);
        assert!(s.next_iteration());
        assert!(s.next_iteration());
        assert!(!s.next_iteration());
    }

    #[test]
    fn recursion_guard_walks_the_whole_chain() {
        let root = Scope::root(usize::MAX);
        let a = Scope::child(root, 10, 0, 1, Timestamp::ZERO, Timestamp::ZERO);
        let b = Scope::child(a, 20, 0, 1, Timestamp::ZERO, Timestamp::ZERO);
        assert!(b.would_recurse(20)); // direct
        assert!(b.would_recurse(10)); // transitive
        assert!(!b.would_recurse(30));
    }

    #[test]
    fn locals_shadow_nothing_but_themselves() {
        let mut s = Scope::root(0);
        s.set_local("x", Value::Int(1));
        s.set_local("x", Value::Int(2));
        assert_eq!(s.local("x"), Some(Value::Int(2)));
        assert_eq!(s.local("y"), None);
    }
}
