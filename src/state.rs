//! State keys, packed payloads and the push / undo transitions.
//!
//! A key is the agent region (represented by its smallest cell) plus the box
//! bitset. Payloads carry path bookkeeping and are stored next to the key in
//! the open and closed maps, always expressed in the key's canonical frame so
//! that `undo` can run without knowing which automorphism was applied.

use crate::bits::{BoxSet, CellSet};
use crate::board::{Board, Cell, Direction, Symmetry};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct StateKey {
    pub agent: Cell,
    pub boxes: BoxSet,
}

impl StateKey {
    /// Key with the agent moved to the smallest cell of its region.
    pub fn normalized(board: &Board, agent: Cell, boxes: BoxSet) -> Self {
        normalize(board, agent, boxes).0
    }

    #[inline(always)]
    pub fn has_box(&self, cell: Cell) -> bool {
        self.boxes.contains(cell as usize)
    }

    /// Whether the agent can stand on `cell` without pushing anything.
    pub fn agent_can_reach(&self, board: &Board, cell: Cell) -> bool {
        board.reach(self.agent, &self.boxes).contains(cell as usize)
    }

    /// Every box on a goal. Also true for reduced box sets with spare goals.
    #[inline]
    pub fn is_solved(&self, board: &Board) -> bool {
        self.boxes.is_subset(board.goal_set())
    }
}

/// Normalised key plus the agent's reach region.
pub fn normalize(board: &Board, agent: Cell, boxes: BoxSet) -> (StateKey, CellSet) {
    let reach = board.reach(agent, &boxes);
    let agent = reach.first().map_or(agent, |c| c as Cell);
    (StateKey { agent, boxes }, reach)
}

/// Canonical representative under the board's automorphisms, with the index
/// of the automorphism used (`None` when the key was already canonical).
pub fn canonical(board: &Board, key: StateKey, reach: &CellSet) -> (StateKey, Option<usize>) {
    let syms = board.symmetries();
    if syms.is_empty() {
        return (key, None);
    }
    syms.canonicalize(key, reach)
}

/// Canonical key of an arbitrary (agent, boxes) pair.
pub fn canonical_of(board: &Board, agent: Cell, boxes: BoxSet) -> StateKey {
    let (key, reach) = normalize(board, agent, boxes);
    canonical(board, key, &reach).0
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Payload {
    /// Pushes from the start state.
    pub dist: u32,
    /// `dist` plus the (possibly weighted) heuristic.
    pub total: u32,
    pub dir: Direction,
    /// Pushes in the producing macro step; 0 only for the start state.
    pub pushes: u8,
    /// Agent cell just before the macro step began.
    pub prev_agent: Cell,
    /// Cell the pushed box ended on.
    pub box_cell: Cell,
}

impl Payload {
    pub fn start(agent: Cell, total: u32) -> Self {
        Payload {
            dist: 0,
            total,
            dir: Direction::Up,
            pushes: 0,
            prev_agent: agent,
            box_cell: agent,
        }
    }

    #[inline(always)]
    pub fn is_start(&self) -> bool {
        self.pushes == 0
    }

    #[inline]
    pub fn pack(&self) -> [u64; 2] {
        [
            self.dist as u64 | (self.total as u64) << 32,
            self.dir as u64
                | (self.pushes as u64) << 8
                | (self.prev_agent as u64) << 16
                | (self.box_cell as u64) << 32,
        ]
    }

    #[inline]
    pub fn unpack(words: [u64; 2]) -> Self {
        Payload {
            dist: words[0] as u32,
            total: (words[0] >> 32) as u32,
            dir: Direction::from_index((words[1] & 0xFF) as usize),
            pushes: (words[1] >> 8) as u8,
            prev_agent: (words[1] >> 16) as u16,
            box_cell: (words[1] >> 32) as u16,
        }
    }

    /// The same step seen through an automorphism.
    pub fn transformed(&self, sym: &Symmetry) -> Self {
        if self.is_start() {
            return Payload {
                prev_agent: sym.map_cell(self.prev_agent),
                box_cell: sym.map_cell(self.box_cell),
                ..*self
            };
        }
        Payload {
            dir: sym.map_dir(self.dir),
            prev_agent: sym.map_cell(self.prev_agent),
            box_cell: sym.map_cell(self.box_cell),
            ..*self
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Successor {
    pub boxes: BoxSet,
    /// Where the agent actually stands after the last push.
    pub agent: Cell,
    pub box_to: Cell,
    pub pushes: u8,
}

/// Push the box on `from` one cell in `dir`, then keep pushing while both
/// agent and box sit in a one-wide tunnel (when `tunnels` is set).
///
/// The destination must already be known free and alive; see
/// [`crate::deadlock::DeadlockDetector::simple_push_deadlock`].
pub fn push(board: &Board, boxes: &BoxSet, from: Cell, dir: Direction, tunnels: bool) -> Option<Successor> {
    let mut to = board.neighbor(from, dir)?;
    if boxes.contains(to as usize) || !board.is_alive(to) {
        return None;
    }
    let mut agent = from;
    let mut pushes = 1u8;
    while tunnels
        && pushes < u8::MAX
        && !board.is_goal(to)
        && board.is_tunnel(agent, dir)
        && board.is_tunnel(to, dir)
    {
        match board.neighbor(to, dir) {
            Some(next) if board.is_alive(next) && !boxes.contains(next as usize) => {
                agent = to;
                to = next;
                pushes += 1;
            }
            _ => break,
        }
    }
    let mut out = *boxes;
    out.remove(from as usize);
    out.insert(to as usize);
    Some(Successor {
        boxes: out,
        agent,
        box_to: to,
        pushes,
    })
}

/// Parent key (not yet canonical) of `key`, reached by reversing the step
/// recorded in `payload`. Both must be in the same frame.
pub fn undo(board: &Board, key: &StateKey, payload: &Payload) -> Option<StateKey> {
    if payload.is_start() {
        return None;
    }
    let back = payload.dir.reverse();
    let mut orig = payload.box_cell;
    for _ in 0..payload.pushes {
        orig = board.neighbor(orig, back)?;
    }
    let mut boxes = key.boxes;
    debug_assert!(boxes.contains(payload.box_cell as usize));
    boxes.remove(payload.box_cell as usize);
    boxes.insert(orig as usize);
    Some(StateKey::normalized(board, payload.prev_agent, boxes))
}
