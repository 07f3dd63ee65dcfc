//! Arena-backed hierarchical state machine.
//!
//! States form a tree rooted at a single node. Each node has at most one
//! active child and knows its parent only by [`StateId`]. Nodes live in an
//! arena owned by the [`StateMachine`], so there are no back-pointers and no
//! shared ownership. Data shared by all states is passed as an explicit
//! context on every call.
//!
//! A state changes the tree by returning a [`Transition`] from
//! [`HierarchicalState::update`]:
//! - [`Transition::Child`] replaces the state's own child.
//! - [`Transition::Replace`] asks the parent to replace the state itself,
//!   which is how a state moves to a sibling it knows nothing about.
//!
//! A state installed by a transition runs in the same update pass, so the
//! effect of a transition is visible on the tick it was decided.

use bevy::prelude::*;

/// Chained replacements allowed below one node per update pass.
const MAX_CHAINED_TRANSITIONS: usize = 4;

/// Non-owning handle to a node of a [`StateMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(usize);

/// What a state asks for at the end of its update.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<S> {
    /// Stay as is.
    None,
    /// Replace this state's active child.
    Child(S),
    /// Ask the parent to replace this state. At the root this replaces the root's child.
    Replace(S),
}

/// Lifecycle hooks of one state. `C` is the context shared by every state.
pub trait HierarchicalState<C>: Sized {
    /// Called when the state becomes active. May return an initial child.
    fn enter(&mut self, _ctx: &mut C) -> Option<Self> {
        None
    }

    /// Called every pass before the active child is updated.
    fn update(&mut self, _ctx: &mut C) -> Transition<Self> {
        Transition::None
    }

    /// Called every pass after the active child was updated.
    fn late_update(&mut self, _ctx: &mut C) {}

    /// Called when the state is removed, after its children have exited.
    fn exit(&mut self, _ctx: &mut C) {}
}

struct Node<S> {
    state: S,
    parent: Option<StateId>,
    child: Option<StateId>,
}

/// Owner of a tree of states.
pub struct StateMachine<S> {
    nodes: Vec<Option<Node<S>>>,
    free: Vec<usize>,
    root: Option<StateId>,
}

impl<S> Default for StateMachine<S> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
        }
    }
}

impl<S> StateMachine<S> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn root(&self) -> Option<StateId> {
        self.root
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.root.is_some()
    }

    pub fn state(&self, id: StateId) -> Option<&S> {
        self.node(id).map(|node| &node.state)
    }

    pub fn parent(&self, id: StateId) -> Option<StateId> {
        self.node(id).and_then(|node| node.parent)
    }

    pub fn child(&self, id: StateId) -> Option<StateId> {
        self.node(id).and_then(|node| node.child)
    }

    /// Active states from the root down to the deepest leaf.
    pub fn active_path(&self) -> Vec<&S> {
        let mut path = Vec::new();
        let mut cursor = self.root;
        while let Some(id) = cursor {
            let Some(node) = self.node(id) else {
                break;
            };
            path.push(&node.state);
            cursor = node.child;
        }
        path
    }

    /// Deepest active state.
    pub fn leaf(&self) -> Option<&S> {
        self.active_path().pop()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn node(&self, id: StateId) -> Option<&Node<S>> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: StateId) -> Option<&mut Node<S>> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    fn alloc(&mut self, state: S, parent: Option<StateId>) -> StateId {
        let node = Node {
            state,
            parent,
            child: None,
        };
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = Some(node);
                StateId(index)
            }
            None => {
                self.nodes.push(Some(node));
                StateId(self.nodes.len() - 1)
            }
        }
    }

    /// Install `root` and enter it, replacing any running tree.
    pub fn start<C>(&mut self, root: S, ctx: &mut C) -> StateId
    where
        S: HierarchicalState<C>,
    {
        self.stop(ctx);
        let id = self.alloc(root, None);
        self.root = Some(id);
        self.enter_node(id, ctx);
        id
    }

    /// Exit every active state, deepest first.
    pub fn stop<C>(&mut self, ctx: &mut C)
    where
        S: HierarchicalState<C>,
    {
        if let Some(root) = self.root.take() {
            self.exit_subtree(root, ctx);
        }
    }

    /// Replace the active child of `id` with `state`.
    ///
    /// The old child subtree exits deepest first, then `state` is entered.
    /// Returns the new child, or `None` if `id` is not a live node.
    pub fn change_state<C>(&mut self, id: StateId, state: S, ctx: &mut C) -> Option<StateId>
    where
        S: HierarchicalState<C>,
    {
        let old = self.node(id)?.child;
        if let Some(old) = old {
            self.exit_subtree(old, ctx);
        }

        let child = self.alloc(state, Some(id));
        if let Some(node) = self.node_mut(id) {
            node.child = Some(child);
        }
        self.enter_node(child, ctx);
        Some(child)
    }

    fn enter_node<C>(&mut self, id: StateId, ctx: &mut C)
    where
        S: HierarchicalState<C>,
    {
        let initial = match self.node_mut(id) {
            Some(node) => node.state.enter(ctx),
            None => return,
        };
        if let Some(initial) = initial {
            self.change_state(id, initial, ctx);
        }
    }

    fn exit_subtree<C>(&mut self, id: StateId, ctx: &mut C)
    where
        S: HierarchicalState<C>,
    {
        if let Some(child) = self.child(id) {
            self.exit_subtree(child, ctx);
        }

        let Some(mut node) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        node.state.exit(ctx);
        self.free.push(id.0);

        if let Some(parent) = node.parent.and_then(|parent| self.node_mut(parent)) {
            if parent.child == Some(id) {
                parent.child = None;
            }
        }
    }

    /// Run one update pass over the active path.
    pub fn update<C>(&mut self, ctx: &mut C)
    where
        S: HierarchicalState<C>,
    {
        if let Some(root) = self.root {
            self.update_node(root, ctx);
        }
    }

    /// Returns `true` if the node was replaced by its parent.
    fn update_node<C>(&mut self, id: StateId, ctx: &mut C) -> bool
    where
        S: HierarchicalState<C>,
    {
        let transition = match self.node_mut(id) {
            Some(node) => node.state.update(ctx),
            None => return false,
        };

        match transition {
            Transition::None => {}
            Transition::Child(state) => {
                self.change_state(id, state, ctx);
            }
            Transition::Replace(state) => match self.parent(id) {
                Some(parent) => {
                    self.change_state(parent, state, ctx);
                    return true;
                }
                None => {
                    self.change_state(id, state, ctx);
                }
            },
        }

        let mut remaining = MAX_CHAINED_TRANSITIONS;
        while let Some(child) = self.child(id) {
            if !self.update_node(child, ctx) {
                break;
            }
            if remaining == 0 {
                warn!("state machine exceeded {MAX_CHAINED_TRANSITIONS} chained transitions in one pass");
                break;
            }
            remaining -= 1;
        }

        if let Some(node) = self.node_mut(id) {
            node.state.late_update(ctx);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Toy {
        Root,
        Left,
        LeftLeaf,
        Right,
        Other,
    }

    #[derive(Default)]
    struct Log {
        events: Vec<String>,
        go_right: bool,
        swap_leaf: bool,
    }

    impl HierarchicalState<Log> for Toy {
        fn enter(&mut self, log: &mut Log) -> Option<Self> {
            log.events.push(format!("enter {self:?}"));
            match self {
                Toy::Root => Some(Toy::Left),
                Toy::Left => Some(Toy::LeftLeaf),
                _ => None,
            }
        }

        fn update(&mut self, log: &mut Log) -> Transition<Self> {
            log.events.push(format!("update {self:?}"));
            match self {
                Toy::Left if log.go_right => Transition::Replace(Toy::Right),
                Toy::LeftLeaf if log.swap_leaf => {
                    log.swap_leaf = false;
                    Transition::Replace(Toy::Other)
                }
                _ => Transition::None,
            }
        }

        fn late_update(&mut self, log: &mut Log) {
            log.events.push(format!("late {self:?}"));
        }

        fn exit(&mut self, log: &mut Log) {
            log.events.push(format!("exit {self:?}"));
        }
    }

    fn started() -> (StateMachine<Toy>, Log) {
        let mut machine = StateMachine::new();
        let mut log = Log::default();
        machine.start(Toy::Root, &mut log);
        (machine, log)
    }

    #[test]
    fn start_installs_initial_children() {
        let (machine, log) = started();
        assert_eq!(machine.active_path(), vec![&Toy::Root, &Toy::Left, &Toy::LeftLeaf]);
        assert_eq!(log.events, ["enter Root", "enter Left", "enter LeftLeaf"]);
    }

    #[test]
    fn update_is_depth_first_with_late_update_on_the_way_out() {
        let (mut machine, mut log) = started();
        log.events.clear();
        machine.update(&mut log);
        assert_eq!(
            log.events,
            [
                "update Root",
                "update Left",
                "update LeftLeaf",
                "late LeftLeaf",
                "late Left",
                "late Root",
            ]
        );
    }

    #[test]
    fn replace_exits_subtree_deepest_first() {
        let (mut machine, mut log) = started();
        log.events.clear();
        log.go_right = true;
        machine.update(&mut log);

        assert_eq!(machine.active_path(), vec![&Toy::Root, &Toy::Right]);
        assert_eq!(
            log.events,
            [
                "update Root",
                "update Left",
                "exit LeftLeaf",
                "exit Left",
                "enter Right",
                "update Right",
                "late Right",
                "late Root",
            ]
        );
    }

    #[test]
    fn leaf_replacement_runs_in_the_same_pass() {
        let (mut machine, mut log) = started();
        log.events.clear();
        log.swap_leaf = true;
        machine.update(&mut log);

        assert_eq!(machine.leaf(), Some(&Toy::Other));
        assert!(log.events.contains(&"update Other".to_string()));
        assert!(!log.events.contains(&"late LeftLeaf".to_string()));
    }

    #[test]
    fn slots_are_reused() {
        let (mut machine, mut log) = started();
        assert_eq!(machine.len(), 3);
        log.go_right = true;
        machine.update(&mut log);
        assert_eq!(machine.len(), 2);
        assert_eq!(machine.nodes.len(), 3);

        let root = machine.root().unwrap();
        machine.change_state(root, Toy::Left, &mut log);
        assert_eq!(machine.len(), 3);
        assert_eq!(machine.nodes.len(), 3);
    }

    #[test]
    fn child_links_point_at_parent() {
        let (machine, _) = started();
        let root = machine.root().unwrap();
        let left = machine.child(root).unwrap();
        let leaf = machine.child(left).unwrap();
        assert_eq!(machine.parent(leaf), Some(left));
        assert_eq!(machine.parent(left), Some(root));
        assert_eq!(machine.parent(root), None);
    }

    #[test]
    fn stop_exits_everything() {
        let (mut machine, mut log) = started();
        log.events.clear();
        machine.stop(&mut log);
        assert_eq!(log.events, ["exit LeftLeaf", "exit Left", "exit Root"]);
        assert!(!machine.is_running());
        assert!(machine.is_empty());
        assert!(machine.leaf().is_none());
    }

    #[test]
    fn ping_pong_is_bounded() {
        #[derive(Debug)]
        enum Flip {
            Root,
            A,
            B,
        }
        impl HierarchicalState<usize> for Flip {
            fn enter(&mut self, _: &mut usize) -> Option<Self> {
                matches!(self, Flip::Root).then_some(Flip::A)
            }
            fn update(&mut self, updates: &mut usize) -> Transition<Self> {
                *updates += 1;
                match self {
                    Flip::Root => Transition::None,
                    Flip::A => Transition::Replace(Flip::B),
                    Flip::B => Transition::Replace(Flip::A),
                }
            }
        }

        let mut machine = StateMachine::new();
        let mut updates = 0;
        machine.start(Flip::Root, &mut updates);
        machine.update(&mut updates);
        assert_eq!(updates, 1 + MAX_CHAINED_TRANSITIONS + 1);
    }
}
