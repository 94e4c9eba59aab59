// Copyright 2019 Karl Sundequist Blomdahl <karl.sundequist.blomdahl@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The node/edge store. `Node`s live in an arena owned by
//! `MctsTree` and are addressed by `NodeId` rather than by pointer -- a
//! natural mapping for a pointer graph whose only back-edges
//! (child -> parent) are non-owning.

use std::collections::HashMap;
use std::collections::HashSet;

use dg_position::{Coord, Position, Symmetry, ZobristHash};

/// Per-move edge statistics. `N` and `W` give `Q = W / (1 + N)`; `P` is the
/// prior after any noise injection, `P_original` the untouched prior.
///
/// Exactly 16 bytes, so any array of `Edge` is automatically padded to a
/// 16-byte multiple, which keeps the SIMD4 action-score kernel's loads
/// aligned for free.
#[derive(Clone, Copy, Debug)]
pub struct Edge {
    pub n: u32,
    pub w: f32,
    pub p: f32,
    pub p_original: f32
}

impl Edge {
    pub fn new() -> Self {
        Self { n: 0, w: 0.0, p: 0.0, p_original: 0.0 }
    }

    pub fn q(&self) -> f32 {
        self.w / (1.0 + self.n as f32)
    }
}

impl Default for Edge {
    fn default() -> Self {
        Self::new()
    }
}

/// An index into `MctsTree`'s node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a node's own `N`/`W`/`P` physically live: inside the parent's edge
/// array (the common case), or in the tree's dedicated `root_edge` slot (the
/// game-root has no parent to store them in).
#[derive(Clone, Copy, Debug)]
pub enum EdgeStatsTarget {
    Root,
    Parent { parent: NodeId, slot: usize }
}

pub struct Node<P: Position> {
    pub parent: Option<NodeId>,
    pub edge_stats_target: EdgeStatsTarget,

    /// The move that produced this node, or `Coord::invalid()` for the game
    /// root.
    pub mov: Coord,

    /// One edge per candidate move, width `position.board_size().num_moves()`.
    pub edges: Box<[Edge]>,

    /// Whether `position.legal_move(i)` held at expansion time, indexed the
    /// same way as `edges`. Computed once so action-score no longer needs to
    /// re-derive legality from `edges[i].p == 0.0`, which would be ambiguous
    /// before expansion.
    pub legal_mask: Box<[bool]>,

    /// Lazily created on first selection through this node.
    pub children: HashMap<usize, NodeId>,

    pub position: P,

    /// Set once an inference result (or a terminal value) has been
    /// incorporated.
    pub is_expanded: bool,

    /// `Some(inverse)` iff the position's Zobrist hash is uniquely smallest
    /// under one of the eight symmetries; inherited from the parent once
    /// already computed there, per the lazy canonical-symmetry Design Note.
    pub canonical_symmetry: Option<Symmetry>,

    /// Nonzero only while this node is part of an in-flight batch.
    pub num_virtual_losses_applied: u32,

    /// Present only on nodes whose depth is a multiple of 8: the Zobrist
    /// hashes of every ancestor position plus self.
    pub superko_cache: Option<HashSet<ZobristHash>>,

    pub depth: u32
}

impl<P: Position> Node<P> {
    pub fn new_root(position: P) -> Self {
        let num_moves = position.board_size().num_moves();
        let legal_mask = position.legal_moves().into_boxed_slice();

        Self {
            parent: None,
            edge_stats_target: EdgeStatsTarget::Root,
            mov: Coord::invalid(),
            edges: vec![Edge::new(); num_moves].into_boxed_slice(),
            legal_mask,
            children: HashMap::new(),
            position,
            is_expanded: false,
            canonical_symmetry: None,
            num_virtual_losses_applied: 0,
            superko_cache: None,
            depth: 0
        }
    }

    pub fn new_child(
        parent: NodeId,
        slot: usize,
        mov: Coord,
        position: P,
        depth: u32
    ) -> Self {
        let num_moves = position.board_size().num_moves();
        let legal_mask = position.legal_moves().into_boxed_slice();

        Self {
            parent: Some(parent),
            edge_stats_target: EdgeStatsTarget::Parent { parent, slot },
            mov,
            edges: vec![Edge::new(); num_moves].into_boxed_slice(),
            legal_mask,
            children: HashMap::new(),
            position,
            is_expanded: false,
            canonical_symmetry: None,
            num_virtual_losses_applied: 0,
            superko_cache: None,
            depth
        }
    }

    /// Drops all children and resets this node's own edge array, used by
    /// fastplay when switching back to full-readout mode.
    pub fn clear_subtrees(&mut self) {
        self.children.clear();

        for edge in self.edges.iter_mut() {
            *edge = Edge::new();
        }

        self.is_expanded = false;
    }
}
