use std::fmt::Debug;

/// Dense identifier of a state inside an [`crate::Automaton`]'s arena.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct StateId(pub u32);

impl StateId {
    /// Returns the position of the state in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Creates an id from an arena position.
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

impl Debug for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "q{}", self.0)
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for StateId {
    fn from(value: usize) -> Self {
        Self::from_index(value)
    }
}

/// Bit flags recording whether an accepting and/or a rejecting state is reachable from a state.
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash)]
pub struct Productive(u8);

impl Productive {
    /// Neither an accepting nor a rejecting state is reachable.
    pub const NONE: Productive = Productive(0);
    /// An accepting state is reachable.
    pub const ACCEPTING: Productive = Productive(1);
    /// A rejecting state is reachable.
    pub const REJECTING: Productive = Productive(2);

    /// Returns true if an accepting state is reachable.
    pub fn accepting(self) -> bool {
        self.0 & Self::ACCEPTING.0 != 0
    }

    /// Returns true if a rejecting state is reachable.
    pub fn rejecting(self) -> bool {
        self.0 & Self::REJECTING.0 != 0
    }

    /// Returns the union of both flag sets.
    pub fn with(self, other: Productive) -> Productive {
        Productive(self.0 | other.0)
    }
}

impl Debug for Productive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.accepting() {
            f.write_str("A")?;
        }
        if self.rejecting() {
            f.write_str("R")?;
        }
        Ok(())
    }
}

/// The scalar fields of a [`State`], saved and restored as a unit by the undo log.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct StateFields {
    pub(crate) parent: Option<StateId>,
    pub(crate) accepting: bool,
    pub(crate) rejecting: bool,
    pub(crate) depth: u32,
    pub(crate) weight: u32,
    pub(crate) traffic: u32,
    pub(crate) alive: bool,
}

/// A single state of the automaton. States are owned by the automaton's arena and refer to
/// each other by [`StateId`]; once merges happen the successor relation is an arbitrary graph.
#[derive(Clone, PartialEq)]
pub struct State {
    pub(crate) children: Box<[Option<StateId>]>,
    pub(crate) edge_counts: Box<[u32]>,
    pub(crate) parent: Option<StateId>,
    pub(crate) accepting: bool,
    pub(crate) rejecting: bool,
    pub(crate) productive: Productive,
    pub(crate) depth: u32,
    pub(crate) weight: u32,
    pub(crate) traffic: u32,
    pub(crate) alive: bool,
    pub(crate) conflicts: Vec<StateId>,
}

impl State {
    pub(crate) fn new(alphabet_size: usize, parent: Option<StateId>, depth: u32) -> Self {
        Self {
            children: vec![None; alphabet_size].into_boxed_slice(),
            edge_counts: vec![0; alphabet_size].into_boxed_slice(),
            parent,
            accepting: false,
            rejecting: false,
            productive: Productive::NONE,
            depth,
            weight: 0,
            traffic: 0,
            alive: true,
            conflicts: Vec::new(),
        }
    }

    pub(crate) fn fields(&self) -> StateFields {
        StateFields {
            parent: self.parent,
            accepting: self.accepting,
            rejecting: self.rejecting,
            depth: self.depth,
            weight: self.weight,
            traffic: self.traffic,
            alive: self.alive,
        }
    }

    pub(crate) fn restore(&mut self, fields: StateFields) {
        self.parent = fields.parent;
        self.accepting = fields.accepting;
        self.rejecting = fields.rejecting;
        self.depth = fields.depth;
        self.weight = fields.weight;
        self.traffic = fields.traffic;
        self.alive = fields.alive;
    }

    /// Returns the successor on `symbol`, if there is one.
    pub fn child(&self, symbol: usize) -> Option<StateId> {
        self.children.get(symbol).copied().flatten()
    }

    /// Iterates over all outgoing edges as `(symbol, target)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (usize, StateId)> + '_ {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(symbol, child)| child.map(|c| (symbol, c)))
    }

    /// Number of sample strings that traverse the edge labeled `symbol`.
    pub fn edge_count(&self, symbol: usize) -> u32 {
        self.edge_counts.get(symbol).copied().unwrap_or(0)
    }

    /// All edge traversal counts, indexed by symbol.
    pub fn edge_counts(&self) -> &[u32] {
        &self.edge_counts
    }

    /// The tree parent. Only meaningful for states that have not been merged into the red region.
    pub fn parent(&self) -> Option<StateId> {
        self.parent
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn is_rejecting(&self) -> bool {
        self.rejecting
    }

    /// Returns `Some(true)` for accepting, `Some(false)` for rejecting and `None` for unlabeled states.
    pub fn label(&self) -> Option<bool> {
        match (self.accepting, self.rejecting) {
            (true, false) => Some(true),
            (false, true) => Some(false),
            _ => None,
        }
    }

    pub fn productive(&self) -> Productive {
        self.productive
    }

    /// Minimum distance from the root among all prefix-tree states folded into this one.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of samples ending in this state.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Number of samples whose run visits this state.
    pub fn traffic(&self) -> u32 {
        self.traffic
    }

    /// A state stops being alive once it has been folded into another one.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Red states this state is already known to be incompatible with.
    pub fn known_conflicts(&self) -> &[StateId] {
        &self.conflicts
    }
}

impl Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.label() {
            Some(true) => "+",
            Some(false) => "-",
            None if self.accepting => "!",
            None => "?",
        };
        write!(
            f,
            "[{label} w{} t{} d{} {:?}] ",
            self.weight, self.traffic, self.depth, self.productive
        )?;
        f.debug_list()
            .entries(self.children.iter().map(|c| c.map(|s| s.0)))
            .finish()
    }
}
