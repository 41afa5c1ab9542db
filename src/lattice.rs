//! The lattice: a DAG of candidate morphemes keyed by byte position, with
//! on-line Viterbi relaxation (this module) and backward A* N-best search
//! (`BackwardPath`, below).
//!
//! Nodes never hold references to each other — only `(back_pos, back_index)`
//! coordinates into `snodes`. That keeps the whole graph as two flat
//! `Vec<Vec<Node>>` arenas with no ownership cycles.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::dictionary::DicEntry;
use crate::error::{KotobaError, Result};
use crate::matrix::Matrix;

/// Sentinel accumulated cost for a node that hasn't been relaxed yet.
pub const COST_INFINITY: i32 = 0x7FFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Bos,
    Eos,
    SysDict,
    UserDict,
    Unknown,
}

/// A candidate morpheme. Cheap to copy: the only owned-ish data is two
/// borrowed byte slices (into the input buffer and the mmapped dictionary
/// respectively), everything else is scalar.
#[derive(Debug, Clone, Copy)]
pub struct Node<'m, 'i> {
    pub original: Option<&'i [u8]>,
    pub feature: Option<&'m [u8]>,
    pub node_len: usize,
    pub pos: usize,
    pub epos: usize,
    pub index: i64,
    pub left_id: u16,
    pub right_id: u16,
    pub cost: i32,
    pub min_cost: i32,
    pub back_pos: i64,
    pub back_index: i64,
    pub skip: bool,
    pub node_type: NodeType,
}

impl<'m, 'i> Node<'m, 'i> {
    pub fn bos() -> Self {
        Node {
            original: None,
            feature: None,
            node_len: 1,
            pos: 0,
            epos: 1,
            index: -1,
            left_id: 0,
            right_id: 0,
            cost: 0,
            min_cost: 0,
            back_pos: -1,
            back_index: -1,
            skip: false,
            node_type: NodeType::Bos,
        }
    }

    pub fn eos(pos: usize) -> Self {
        Node {
            original: None,
            feature: None,
            node_len: 1,
            pos,
            epos: pos + 1,
            index: 0,
            left_id: 0,
            right_id: 0,
            cost: 0,
            min_cost: COST_INFINITY,
            back_pos: -1,
            back_index: -1,
            skip: false,
            node_type: NodeType::Eos,
        }
    }

    pub fn from_entry(entry: &DicEntry<'m, 'i>, node_type: NodeType) -> Self {
        Node {
            original: Some(entry.original),
            feature: Some(entry.feature),
            node_len: entry.original.len().max(1),
            pos: 0,
            epos: 0,
            index: entry.posid as i64,
            left_id: entry.lc_attr,
            right_id: entry.rc_attr,
            cost: entry.wcost as i32,
            min_cost: COST_INFINITY,
            back_pos: -1,
            back_index: -1,
            skip: entry.skip,
            node_type,
        }
    }

    pub fn is_bos(&self) -> bool {
        self.original.is_none() && self.pos == 0
    }

    pub fn is_eos(&self) -> bool {
        self.original.is_none() && self.pos != 0
    }
}

pub struct Lattice<'m, 'i> {
    snodes: Vec<Vec<Node<'m, 'i>>>,
    enodes: Vec<Vec<Node<'m, 'i>>>,
    p: usize,
}

impl<'m, 'i> Lattice<'m, 'i> {
    pub fn new(size: usize) -> Self {
        let bos = Node::bos();

        let mut snodes = Vec::with_capacity(size + 2);
        snodes.push(vec![bos]);
        for _ in 0..=size {
            snodes.push(Vec::new());
        }

        let mut enodes = Vec::with_capacity(size + 3);
        enodes.push(Vec::new());
        enodes.push(vec![bos]);
        for _ in 0..=size {
            enodes.push(Vec::new());
        }

        Lattice { snodes, enodes, p: 1 }
    }

    pub fn current_pos(&self) -> usize {
        self.p
    }

    /// Viterbi relaxation at the current cursor: finds the best predecessor
    /// among `enodes[p]` (treating `skip` nodes as transparent bridges to
    /// *their* predecessors), sets the node's final position and cost, and
    /// records it in both `snodes` and `enodes`.
    pub fn add(&mut self, mut node: Node<'m, 'i>, matrix: &Matrix) {
        let p = self.p;
        let mut min_cost = node.min_cost;
        let mut best_node = self.enodes[p][0];

        for &enode in &self.enodes[p] {
            if enode.skip {
                for &enode2 in &self.enodes[enode.pos] {
                    let cost = enode2.min_cost
                        + matrix.get_trans_cost(enode2.right_id, node.left_id) as i32;
                    if cost < min_cost {
                        min_cost = cost;
                        best_node = enode2;
                    }
                }
            } else {
                let cost =
                    enode.min_cost + matrix.get_trans_cost(enode.right_id, node.left_id) as i32;
                if cost < min_cost {
                    min_cost = cost;
                    best_node = enode;
                }
            }
        }

        node.min_cost = min_cost + node.cost;
        node.back_index = best_node.index;
        node.back_pos = best_node.pos as i64;
        node.pos = p;
        node.epos = p + node.node_len;
        node.index = self.snodes[p].len() as i64;

        self.snodes[node.pos].push(node);
        self.enodes[node.epos].push(node);
    }

    /// Advances the cursor to the next byte position with at least one node
    /// ending there, returning how many byte positions were skipped.
    ///
    /// If nothing ever ends beyond the current position the lattice can't
    /// make progress; callers always feed an unknown-word fallback so this
    /// never triggers in practice, but it's reported rather than indexing
    /// past the arena.
    pub fn forward(&mut self) -> Result<usize> {
        let old_p = self.p;
        self.p += 1;
        while self.p < self.enodes.len() && self.enodes[self.p].is_empty() {
            self.p += 1;
        }
        if self.p >= self.enodes.len() {
            return Err(KotobaError::NoCandidateAtPosition {
                byte_offset: old_p.saturating_sub(1),
            });
        }
        Ok(self.p - old_p)
    }

    /// Adds the EOS sentinel at the current cursor and truncates the
    /// arenas to their used prefix.
    pub fn end(&mut self, matrix: &Matrix) {
        let eos = Node::eos(self.p);
        self.add(eos, matrix);
        self.snodes.truncate(self.p + 1);
        self.enodes.truncate(self.p + 2);
    }

    /// The 1-best path from BOS to EOS, inclusive, in forward order.
    pub fn backward(&self) -> Vec<Node<'m, 'i>> {
        let mut path = Vec::new();
        let mut pos = self.snodes.len() as i64 - 1;
        let mut index = 0i64;
        while pos >= 0 {
            let slot = &self.snodes[pos as usize];
            // BOS's own `index` field is -1 by construction; resolve it the
            // same way a negative list index would, which always lands on
            // BOS since `snodes[0]` holds nothing else.
            let resolved = if index < 0 {
                (slot.len() as i64 + index) as usize
            } else {
                index as usize
            };
            let node = slot[resolved];
            index = node.back_index;
            pos = node.back_pos;
            path.push(node);
        }
        path.reverse();
        path
    }

    /// The `n` best paths from BOS to EOS, inclusive, best first.
    ///
    /// Unlike `add`'s Viterbi relaxation, skip nodes are *not* treated as
    /// transparent bridges here: the backward expansion walks `enodes`
    /// directly, so a skip node is just an ordinary path member.
    pub fn backward_astar(&self, n: usize, matrix: &Matrix) -> Vec<Vec<Node<'m, 'i>>> {
        let mut paths = Vec::new();
        if n == 0 {
            return paths;
        }

        let epos = self.enodes.len() - 1;
        let eos = self.enodes[epos][0];
        debug_assert!(eos.is_eos());

        let mut heap = BinaryHeap::new();
        heap.push(BackwardPath::seed(eos));
        let mut remaining = n;

        while remaining > 0 {
            let Some(bp) = heap.pop() else { break };
            if bp.is_complete() {
                let mut path = bp.back_path.clone();
                path.reverse();
                paths.push(path);
                remaining -= 1;
            } else {
                let last = *bp.back_path.last().unwrap();
                let epos = last.epos - last.node_len;
                for &pred in &self.enodes[epos] {
                    heap.push(bp.extend(matrix, pred));
                }
            }
        }
        paths
    }
}

/// A partial path growing backward from EOS toward BOS, ordered for the
/// A* priority queue by `cost_from_bos + cost_from_eos` ascending.
/// `cost_from_bos` is the rightmost node's Viterbi `min_cost` — an
/// admissible, consistent heuristic for the remaining distance to BOS.
#[derive(Clone)]
struct BackwardPath<'m, 'i> {
    cost_from_bos: i32,
    cost_from_eos: i32,
    back_path: Vec<Node<'m, 'i>>,
}

impl<'m, 'i> BackwardPath<'m, 'i> {
    fn seed(eos: Node<'m, 'i>) -> Self {
        debug_assert!(eos.is_eos());
        BackwardPath {
            cost_from_bos: eos.min_cost,
            cost_from_eos: 0,
            back_path: vec![eos],
        }
    }

    fn extend(&self, matrix: &Matrix, node: Node<'m, 'i>) -> Self {
        let neighbor = *self.back_path.last().unwrap();
        let cost_from_eos = self.cost_from_eos
            + neighbor.cost
            + matrix.get_trans_cost(node.right_id, neighbor.left_id) as i32;
        let mut back_path = self.back_path.clone();
        back_path.push(node);
        BackwardPath {
            cost_from_bos: node.min_cost,
            cost_from_eos,
            back_path,
        }
    }

    fn is_complete(&self) -> bool {
        self.back_path.last().unwrap().is_bos()
    }

    fn total(&self) -> i32 {
        self.cost_from_bos + self.cost_from_eos
    }
}

impl PartialEq for BackwardPath<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        self.total() == other.total()
    }
}

impl Eq for BackwardPath<'_, '_> {}

impl PartialOrd for BackwardPath<'_, '_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BackwardPath<'_, '_> {
    /// Reversed so `BinaryHeap` (a max-heap) pops the lowest total cost
    /// first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.total().cmp(&self.total())
    }
}
