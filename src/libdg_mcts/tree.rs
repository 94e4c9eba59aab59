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

//! The search tree: leaf selection under PUCT, virtual-loss-based
//! concurrent selection, backup, noise injection, target-pruning reshape,
//! and the superko-aware position tracking that `Position::play_move` needs.

use std::collections::{HashMap, HashSet};

use ordered_float::OrderedFloat;
use rand::Rng;

use dg_position::{BoardSize, Coord, Position, PositionExt, Symmetry, ZobristHash, ZobristHistory};

use crate::asm::{action_score_simd4, normalize_finite_f32, sum_finite_f32, u_scale};
use crate::dirichlet;
use crate::inference_cache::CacheKey;
use crate::node::{Edge, EdgeStatsTarget, Node, NodeId};
use crate::zobrist;

/// Every 8th ply gets its own sparse ancestor index.
const SUPERKO_CACHE_STRIDE: u32 = 8;

/// One game's search tree. Owns an arena of `Node`s addressed by `NodeId`;
/// the game-root's own `N`/`W`/`P` live in `root_edge`, outside the arena,
/// since it has no parent to store them in.
pub struct MctsTree<P: Position> {
    nodes: Vec<Node<P>>,
    root: NodeId,
    root_edge: Edge,
    komi: f32
}

/// Hands the sparse superko index to `Position::play_move` without `Position`
/// needing to know anything about how the tree stores its ancestry.
struct TreeZobristHistory<'a, P: Position> {
    tree: &'a MctsTree<P>,
    start: NodeId
}

impl<'a, P: Position> ZobristHistory for TreeZobristHistory<'a, P> {
    fn has_position_been_played_before(&self, hash: ZobristHash) -> bool {
        self.tree.has_hash_on_path(self.start, hash)
    }
}

impl<P: Position> MctsTree<P> {
    pub fn new(position: P, komi: f32) -> Self {
        let canonical_symmetry = zobrist::canonical_symmetry(&position);
        let stone_hash = position.stone_hash();
        let mut root_node = Node::new_root(position);
        root_node.canonical_symmetry = canonical_symmetry;

        let mut cache = HashSet::new();
        cache.insert(stone_hash);
        root_node.superko_cache = Some(cache); // depth 0 is always a multiple of 8

        Self {
            nodes: vec![root_node],
            root: NodeId(0),
            root_edge: Edge::new(),
            komi
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_edge(&self) -> Edge {
        self.root_edge
    }

    pub fn komi(&self) -> f32 {
        self.komi
    }

    pub fn node(&self, id: NodeId) -> &Node<P> {
        &self.nodes[id.index()]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn board_size(&self) -> BoardSize {
        self.nodes[self.root.index()].position.board_size()
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.nodes[id.index()].is_expanded
    }

    /// Two consecutive passes -- resignation is a driver-level decision, not
    /// a tree state.
    pub fn is_game_over(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.index()];
        let last_move = if node.mov.is_invalid() { None } else { Some(node.mov) };
        let second_to_last = node.parent.and_then(|parent| {
            let parent_mov = self.nodes[parent.index()].mov;
            if parent_mov.is_invalid() { None } else { Some(parent_mov) }
        });

        node.position.is_game_over(last_move, second_to_last)
    }

    fn own_edge(&self, id: NodeId) -> Edge {
        match self.nodes[id.index()].edge_stats_target {
            EdgeStatsTarget::Root => self.root_edge,
            EdgeStatsTarget::Parent { parent, slot } => self.nodes[parent.index()].edges[slot]
        }
    }

    fn own_edge_mut(&mut self, id: NodeId) -> &mut Edge {
        match self.nodes[id.index()].edge_stats_target {
            EdgeStatsTarget::Root => &mut self.root_edge,
            EdgeStatsTarget::Parent { parent, slot } => &mut self.nodes[parent.index()].edges[slot]
        }
    }

    pub fn visit_count(&self, id: NodeId) -> u32 {
        self.own_edge(id).n
    }

    fn has_hash_on_path(&self, start: NodeId, hash: ZobristHash) -> bool {
        let mut current = Some(start);

        while let Some(id) = current {
            let node = &self.nodes[id.index()];

            if node.position.stone_hash() == hash {
                return true;
            }
            if let Some(cache) = &node.superko_cache {
                return cache.contains(&hash);
            }

            current = node.parent;
        }

        false
    }

    /// Copies the nearest ancestor's superko cache and adds the intervening
    /// stone hashes rather than recomputing the whole ancestry each time.
    fn compute_superko_cache(&self, parent: NodeId, own_hash: ZobristHash) -> HashSet<ZobristHash> {
        let mut hashes = HashSet::new();
        hashes.insert(own_hash);

        let mut current = Some(parent);
        while let Some(id) = current {
            let node = &self.nodes[id.index()];
            hashes.insert(node.position.stone_hash());

            if let Some(cache) = &node.superko_cache {
                hashes.extend(cache.iter().copied());
                break;
            }

            current = node.parent;
        }

        hashes
    }

    fn create_child(&mut self, parent: NodeId, slot: usize) -> NodeId {
        let (position, mov, depth, inherited_symmetry) = {
            let parent_node = &self.nodes[parent.index()];
            let side = parent_node.position.side_to_play();
            let mov = Coord::from_index(slot);
            let history = TreeZobristHistory { tree: &*self, start: parent };
            let position = parent_node.position.play_move(mov, side, &history);

            (position, mov, parent_node.depth + 1, parent_node.canonical_symmetry)
        };

        let canonical_symmetry = inherited_symmetry.or_else(|| zobrist::canonical_symmetry(&position));
        let mut child = Node::new_child(parent, slot, mov, position, depth);
        child.canonical_symmetry = canonical_symmetry;

        if depth % SUPERKO_CACHE_STRIDE == 0 {
            let own_hash = child.position.stone_hash();
            child.superko_cache = Some(self.compute_superko_cache(parent, own_hash));
        }

        let child_id = NodeId(self.nodes.len() as u32);
        self.nodes.push(child);
        self.nodes[parent.index()].children.insert(slot, child_id);

        child_id
    }

    /// Leaf selection under PUCT. Returns `None` only if called
    /// on a tree whose root has no legal moves at all, which cannot happen
    /// since pass is always legal.
    pub fn select_leaf(&mut self, allow_pass: bool) -> Option<NodeId> {
        let mut current = self.root;

        loop {
            if !self.nodes[current.index()].is_expanded {
                return Some(current);
            }

            let best = {
                let node = &self.nodes[current.index()];
                let board_size = node.position.board_size();
                let num_moves = board_size.num_moves();
                let pass_idx = num_moves - 1;
                let n_parent = self.own_edge(current).n;
                let scale = u_scale(n_parent);
                let sqrt_term = ((n_parent as i64 - 1).max(1) as f32).sqrt();
                let to_play_sign = node.position.side_to_play().sign();

                let mut scores = vec![0f32; num_moves];
                action_score_simd4(&node.edges, &node.legal_mask, scale, sqrt_term, to_play_sign, &mut scores);

                if !allow_pass {
                    scores[pass_idx] = std::f32::NEG_INFINITY;
                }

                // Go-specific hack: once a pass has been played, investigate
                // the double-pass (game end) before anything else.
                let forced_pass = node.mov.is_pass(board_size) && node.edges[pass_idx].n == 0;

                let chosen = if forced_pass {
                    pass_idx
                } else {
                    (0..num_moves)
                        .max_by_key(|&i| OrderedFloat(scores[i]))
                        .unwrap()
                };

                if node.legal_mask[chosen] { chosen } else { pass_idx }
            };

            current = match self.nodes[current.index()].children.get(&best) {
                Some(&id) => id,
                None => self.create_child(current, best)
            };
        }
    }

    /// Adjusts `W` by `-to_play_sign(leaf)` and increments `N` along the
    /// leaf-to-root path, as if the in-flight evaluation were guaranteed to
    /// be a loss for whoever is to move at the leaf. Because
    /// backup never flips sign per level (the alternating `to_play_sign` at
    /// each ancestor already does that), a single raw delta propagated
    /// unchanged up the path discourages the whole path consistently.
    pub fn add_virtual_loss(&mut self, leaf: NodeId) {
        let delta = -self.nodes[leaf.index()].position.side_to_play().sign();
        self.walk_to_root(leaf, |edge| { edge.w += delta; edge.n += 1; }, 1);
    }

    pub fn revert_virtual_loss(&mut self, leaf: NodeId) {
        let delta = self.nodes[leaf.index()].position.side_to_play().sign();
        self.walk_to_root(leaf, |edge| { edge.w += delta; edge.n -= 1; }, -1);
    }

    fn walk_to_root(&mut self, leaf: NodeId, mut f: impl FnMut(&mut Edge), vl_delta: i32) {
        let mut current = Some(leaf);

        while let Some(id) = current {
            f(self.own_edge_mut(id));

            if vl_delta >= 0 {
                self.nodes[id.index()].num_virtual_losses_applied += vl_delta as u32;
            } else {
                self.nodes[id.index()].num_virtual_losses_applied -= (-vl_delta) as u32;
            }

            if id == self.root {
                break;
            }
            current = self.nodes[id.index()].parent;
        }
    }

    /// Walks leaf -> root adding `value` to each `W` and incrementing each
    /// `N`. Terminates at the root, never goes above it.
    pub fn backup_value(&mut self, leaf: NodeId, value: f32) {
        self.walk_to_root(leaf, |edge| { edge.w += value; edge.n += 1; }, 0);
    }

    /// Back-propagates a terminal (game-over) value directly without
    /// consulting the evaluator; `is_expanded` is left `false` so the leaf
    /// is never reopened.
    pub fn backup_terminal(&mut self, leaf: NodeId) {
        let score = self.nodes[leaf.index()].position.calculate_score(self.komi);
        let value = if score > 0.0 { 1.0 } else if score < 0.0 { -1.0 } else { 0.0 };

        self.backup_value(leaf, value);
    }

    /// Incorporates an evaluator result into `leaf`. A no-op if
    /// the leaf was already merged in by a concurrent/earlier call.
    pub fn incorporate_results(&mut self, leaf: NodeId, policy: &[f32], value: f32, value_init_penalty: f32) {
        if self.nodes[leaf.index()].is_expanded {
            return;
        }

        let num_moves = self.nodes[leaf.index()].edges.len();
        debug_assert_eq!(policy.len(), num_moves);

        let mut normalized = policy.to_vec();
        {
            let legal_mask = &self.nodes[leaf.index()].legal_mask;
            for i in 0..num_moves {
                if !legal_mask[i] {
                    normalized[i] = 0.0;
                }
            }
        }

        let sum = sum_finite_f32(&normalized);
        if sum > std::f32::MIN_POSITIVE {
            normalize_finite_f32(&mut normalized, sum);
        } else {
            for p in normalized.iter_mut() { *p = 0.0; }
        }

        let to_play_sign = self.nodes[leaf.index()].position.side_to_play().sign();
        let reduced = (value - value_init_penalty * to_play_sign).max(-1.0).min(1.0);

        {
            let node = &mut self.nodes[leaf.index()];
            for i in 0..num_moves {
                node.edges[i].w += reduced;
                node.edges[i].p = normalized[i];
                node.edges[i].p_original = normalized[i];
            }
            node.is_expanded = true;
        }

        self.backup_value(leaf, value);
    }

    /// Mixes Dirichlet noise into the root's prior. Only ever
    /// called on the root, and only once it is expanded.
    pub fn inject_noise<R: Rng>(&mut self, rng: &mut R, alpha: f32, mix: f32) {
        let root = self.root;
        let legal_mask = self.nodes[root.index()].legal_mask.clone();
        let node = &mut self.nodes[root.index()];
        let mut p: Vec<f32> = node.edges.iter().map(|e| e.p).collect();

        dirichlet::add(rng, &mut p, &legal_mask, alpha, mix);

        for (edge, &value) in node.edges.iter_mut().zip(p.iter()) {
            edge.p = value;
        }
    }

    /// Target-pruning reshape: reduces the
    /// visit count of every non-best move to the smallest value at which the
    /// best move's action score still strictly exceeds it, so the training
    /// target reflects regret rather than raw exploration.
    pub fn reshape_final_visits(&mut self, restrict_pass_alive: bool, pass_alive_points: &[Coord]) {
        let root_id = self.root;
        let board_size = self.board_size();
        let num_moves = board_size.num_moves();
        let n_parent = self.own_edge(root_id).n;
        let to_play_sign = self.nodes[root_id.index()].position.side_to_play().sign();
        let scale = u_scale(n_parent);
        let sqrt_term = ((n_parent as i64 - 1).max(1) as f32).sqrt();
        let sqrt_n_parent = (n_parent as f32).sqrt();

        let legal_mask = self.nodes[root_id.index()].legal_mask.clone();
        let edges_before: Vec<Edge> = self.nodes[root_id.index()].edges.to_vec();

        let mut scores = vec![0f32; num_moves];
        action_score_simd4(&edges_before, &legal_mask, scale, sqrt_term, to_play_sign, &mut scores);

        let best = (0..num_moves)
            .filter(|&i| legal_mask[i])
            .max_by_key(|&i| OrderedFloat(scores[i]))
            .unwrap_or(num_moves - 1);
        let best_cas = scores[best];

        let root = &mut self.nodes[root_id.index()];
        for i in 0..num_moves {
            if i == best || !legal_mask[i] || root.edges[i].n == 0 {
                continue;
            }

            let q_signed = root.edges[i].q() * to_play_sign;
            let denom = q_signed - best_cas;
            let new_n = if denom >= 0.0 {
                0.0
            } else {
                (-scale * root.edges[i].p * sqrt_n_parent / denom).floor() - 1.0
            };

            root.edges[i].n = new_n.max(0.0).min(root.edges[i].n as f32) as u32;
        }

        if restrict_pass_alive {
            for &coord in pass_alive_points {
                let idx = coord.to_index(board_size);
                root.edges[idx].n = 0;
            }

            let total: u32 = root.edges.iter().map(|e| e.n).sum();
            if total == 0 {
                let pass_idx = num_moves - 1;
                root.edges[pass_idx].n = 1;
            }
        }
    }

    /// The post-search (and, if applied, post-reshape) visit distribution
    /// over the root's moves -- the training target.
    pub fn root_visit_distribution(&self) -> Vec<u32> {
        self.nodes[self.root.index()].edges.iter().map(|e| e.n).collect()
    }

    /// Picks the next move. `soft_pick_enabled` and
    /// `move_number < soft_pick_cutoff` together gate a stochastic pick over
    /// the board-point entries weighted by `N(i)^policy_softmax_temp`;
    /// otherwise the most-visited legal move wins, ties broken by action
    /// score. `restrict_pass_alive` excludes pass-alive points from
    /// consideration (pass itself is always a candidate).
    pub fn pick_move<R: Rng>(
        &self,
        rng: &mut R,
        soft_pick_enabled: bool,
        soft_pick_cutoff: usize,
        policy_softmax_temp: f32,
        restrict_pass_alive: bool,
        pass_alive_points: &[Coord]
    ) -> Coord {
        let root = &self.nodes[self.root.index()];
        let board_size = root.position.board_size();
        let num_moves = board_size.num_moves();
        let pass_idx = num_moves - 1;
        let move_number = root.position.move_number();

        let pass_alive_set: HashSet<usize> = pass_alive_points.iter()
            .map(|&c| c.to_index(board_size))
            .collect();
        let excluded = |i: usize| restrict_pass_alive && i != pass_idx && pass_alive_set.contains(&i);

        if soft_pick_enabled && move_number < soft_pick_cutoff {
            let board_points = board_size.side() * board_size.side();
            let weights: Vec<f32> = (0..board_points)
                .map(|i| {
                    if excluded(i) || !root.legal_mask[i] {
                        0.0
                    } else {
                        (root.edges[i].n as f32).powf(policy_softmax_temp)
                    }
                })
                .collect();

            let total: f32 = weights.iter().sum();
            if total <= 0.0 {
                return Coord::pass(board_size);
            }

            let threshold = rng.gen::<f32>() * total;
            let mut acc = 0.0f32;
            for (i, &w) in weights.iter().enumerate() {
                acc += w;
                if acc >= threshold {
                    return Coord::from_index(i);
                }
            }

            return Coord::pass(board_size);
        }

        let n_parent = self.own_edge(self.root).n;
        let scale = u_scale(n_parent);
        let sqrt_term = ((n_parent as i64 - 1).max(1) as f32).sqrt();
        let to_play_sign = root.position.side_to_play().sign();

        let mut scores = vec![0f32; num_moves];
        action_score_simd4(&root.edges, &root.legal_mask, scale, sqrt_term, to_play_sign, &mut scores);

        let mut best_idx = pass_idx;
        let mut best_n: i64 = -1;
        let mut best_score = std::f32::NEG_INFINITY;

        for i in 0..num_moves {
            if !root.legal_mask[i] || excluded(i) {
                continue;
            }

            let n = root.edges[i].n as i64;
            if n > best_n || (n == best_n && scores[i] > best_score) {
                best_n = n;
                best_score = scores[i];
                best_idx = i;
            }
        }

        Coord::from_index(best_idx)
    }

    pub fn cache_key(&self, leaf: NodeId) -> Option<CacheKey> {
        let node = &self.nodes[leaf.index()];

        node.canonical_symmetry.map(|sym| CacheKey {
            to_move: node.position.side_to_play(),
            canonical_symmetry: sym,
            canonical_stone_hash: zobrist::canonical_hash(&node.position, sym)
        })
    }

    /// Plays `c`, discarding every sibling of the chosen subtree and
    /// carrying the played child's own accumulated stats forward into
    /// `root_edge`. All siblings of the played child are dropped, so only
    /// the chosen subtree is retained.
    pub fn play_move(&mut self, c: Coord) -> NodeId {
        let board_size = self.board_size();
        let slot = c.to_index(board_size);
        let root = self.root;

        let child_id = match self.nodes[root.index()].children.get(&slot) {
            Some(&id) => id,
            None => self.create_child(root, slot)
        };

        self.rebase(child_id);
        self.root
    }

    fn rebase(&mut self, new_root_old_id: NodeId) {
        let new_root_edge = self.own_edge(new_root_old_id);

        let mut new_nodes = Vec::with_capacity(self.nodes.len());
        Self::copy_subtree(&self.nodes, new_root_old_id, None, EdgeStatsTarget::Root, 0, &mut new_nodes);

        self.nodes = new_nodes;
        self.root = NodeId(0);
        self.root_edge = new_root_edge;

        self.recompute_superko_caches();
    }

    fn copy_subtree(
        old_nodes: &[Node<P>],
        old_id: NodeId,
        new_parent: Option<NodeId>,
        edge_stats_target: EdgeStatsTarget,
        depth: u32,
        new_nodes: &mut Vec<Node<P>>
    ) -> NodeId {
        let old = &old_nodes[old_id.index()];
        let new_id = NodeId(new_nodes.len() as u32);

        new_nodes.push(Node {
            parent: new_parent,
            edge_stats_target,
            mov: if new_parent.is_none() { Coord::invalid() } else { old.mov },
            edges: old.edges.clone(),
            legal_mask: old.legal_mask.clone(),
            children: HashMap::new(),
            position: old.position.clone(),
            is_expanded: old.is_expanded,
            canonical_symmetry: old.canonical_symmetry,
            num_virtual_losses_applied: 0,
            superko_cache: None,
            depth
        });

        let mut child_ids = Vec::with_capacity(old.children.len());
        for (&slot, &old_child_id) in old.children.iter() {
            let target = EdgeStatsTarget::Parent { parent: new_id, slot };
            let child_new_id = Self::copy_subtree(old_nodes, old_child_id, Some(new_id), target, depth + 1, new_nodes);
            child_ids.push((slot, child_new_id));
        }

        for (slot, id) in child_ids {
            new_nodes[new_id.index()].children.insert(slot, id);
        }

        new_id
    }

    /// Recomputes every `superko_cache` from scratch after a rebase, since
    /// depths are now relative to the new root. Relies on nodes being laid
    /// out parent-before-child (true of `copy_subtree`'s pre-order push).
    fn recompute_superko_caches(&mut self) {
        for i in 0..self.nodes.len() {
            let id = NodeId(i as u32);
            let depth = self.nodes[i].depth;

            if depth % SUPERKO_CACHE_STRIDE == 0 {
                let own_hash = self.nodes[i].position.stone_hash();
                let cache = match self.nodes[i].parent {
                    Some(parent) => self.compute_superko_cache(parent, own_hash),
                    None => {
                        let mut set = HashSet::new();
                        set.insert(own_hash);
                        set
                    }
                };
                self.nodes[i].superko_cache = Some(cache);
            } else {
                self.nodes[i].superko_cache = None;
            }
        }
    }

    /// Used by fastplay when switching back to full-readout mode: discards
    /// every node but the current root and resets its own edges, so the
    /// next search starts from a clean slate at the same position.
    pub fn clear_subtrees(&mut self) {
        let position = self.nodes[self.root.index()].position.clone();
        let komi = self.komi;

        *self = MctsTree::new(position, komi);
    }

    /// The symmetry used to present this leaf's features to the evaluator:
    /// `mix(Zobrist(position)) mod 8`, independent of whatever symmetry the
    /// cache happens to use for canonicalization.
    pub fn inference_symmetry(&self, id: NodeId) -> Symmetry {
        const LARGE_PRIME: u64 = 0x9E3779B97F4A7C15;
        let hash = self.nodes[id.index()].position.stone_hash();
        let index = (hash.wrapping_mul(LARGE_PRIME) % 8) as usize;

        dg_position::symmetry::ALL[index]
    }

    /// Snapshots of `id`'s position and up to `history_len - 1` ancestors,
    /// most-recent-first. Shorter than `history_len` only near the start of
    /// the game, where there simply are no older ancestors to include.
    pub fn ancestor_positions(&self, id: NodeId, history_len: usize) -> Vec<P> {
        let mut positions = Vec::with_capacity(history_len);
        let mut current = Some(id);

        while let Some(node_id) = current {
            if positions.len() == history_len {
                break;
            }

            let node = &self.nodes[node_id.index()];
            positions.push(node.position.clone());
            current = node.parent;
        }

        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dg_position::Color;

    /// A minimal 9x9 rules engine for exercising tree mechanics in
    /// isolation: no captures, no ko, scoring by stone count only. Good
    /// enough to drive `select_leaf`/`incorporate_results`/`backup_value`
    /// through their real code paths.
    #[derive(Clone)]
    struct ToyPosition {
        stones: Vec<Option<Color>>,
        move_number: usize,
        last_was_pass: bool
    }

    impl ToyPosition {
        fn empty() -> Self {
            Self { stones: vec![None; 9 * 9], move_number: 0, last_was_pass: false }
        }
    }

    impl Position for ToyPosition {
        fn board_size(&self) -> BoardSize {
            BoardSize::Nine
        }

        fn side_to_play(&self) -> Color {
            if self.move_number % 2 == 0 { Color::Black } else { Color::White }
        }

        fn move_number(&self) -> usize {
            self.move_number
        }

        fn legal_move(&self, coord: Coord) -> bool {
            let board_size = self.board_size();
            coord.is_pass(board_size) || (coord.is_point(board_size) && self.stones[coord.to_index(board_size)].is_none())
        }

        fn play_move(&self, coord: Coord, side: Color, _history: &dyn ZobristHistory) -> Self {
            let board_size = self.board_size();
            let mut stones = self.stones.clone();

            if coord.is_point(board_size) {
                stones[coord.to_index(board_size)] = Some(side);
            }

            Self { stones, move_number: self.move_number + 1, last_was_pass: coord.is_pass(board_size) }
        }

        fn stone_hash(&self) -> ZobristHash {
            let mut hash = 0u64;
            for (i, s) in self.stones.iter().enumerate() {
                if let Some(color) = s {
                    let bit = (i as u64).wrapping_mul(0x9E3779B97F4A7C15) ^ (*color as u64 + 1);
                    hash ^= bit;
                }
            }
            hash
        }

        fn calculate_score(&self, _komi: f32) -> f32 {
            let black = self.stones.iter().filter(|s| **s == Some(Color::Black)).count() as f32;
            let white = self.stones.iter().filter(|s| **s == Some(Color::White)).count() as f32;
            black - white
        }

        fn calculate_pass_alive_regions(&self) -> Vec<Coord> {
            Vec::new()
        }

        fn calculate_whole_board_pass_alive(&self) -> bool {
            false
        }

        fn stones(&self) -> Vec<Option<Color>> {
            self.stones.clone()
        }
    }

    fn skewed_policy(num_moves: usize, favored: usize) -> Vec<f32> {
        let mut p = vec![0.1 / (num_moves - 2) as f32; num_moves];
        p[favored] = 0.9;
        p[num_moves - 1] = 0.0; // pass
        p
    }

    #[test]
    fn select_leaf_returns_the_root_when_unexpanded() {
        let mut tree = MctsTree::new(ToyPosition::empty(), 7.5);
        let leaf = tree.select_leaf(true).unwrap();

        assert_eq!(leaf, tree.root());
    }

    #[test]
    fn incorporate_and_backup_match_hand_derivation() {
        let mut tree = MctsTree::new(ToyPosition::empty(), 7.5);
        let num_moves = tree.board_size().num_moves();

        let leaf1 = tree.select_leaf(true).unwrap();
        assert_eq!(leaf1, tree.root());
        tree.incorporate_results(leaf1, &skewed_policy(num_moves, 0), -1.0, 0.0);

        assert_eq!(tree.root_edge().q(), -0.5);

        let leaf2 = tree.select_leaf(true).unwrap();
        assert_ne!(leaf2, tree.root(), "the skewed prior must pull selection into a real child");
        tree.incorporate_results(leaf2, &skewed_policy(num_moves, 1), -0.2, 0.0);

        assert_eq!(tree.node(tree.root()).edges[0].q(), -0.6);
        assert_eq!(tree.root_edge().q(), -0.4);
    }

    #[test]
    fn virtual_loss_reverts_to_exactly_zero() {
        let mut tree = MctsTree::new(ToyPosition::empty(), 7.5);
        let num_moves = tree.board_size().num_moves();
        let root = tree.root();
        tree.incorporate_results(root, &skewed_policy(num_moves, 3), 0.0, 0.0);

        let leaf = tree.select_leaf(true).unwrap();
        let before = tree.node(root).edges.to_vec();
        let root_edge_before = tree.root_edge();

        tree.add_virtual_loss(leaf);
        assert_eq!(tree.node(leaf).num_virtual_losses_applied, 1);

        tree.revert_virtual_loss(leaf);
        assert_eq!(tree.node(leaf).num_virtual_losses_applied, 0);
        assert_eq!(tree.root_edge().n, root_edge_before.n);
        assert_eq!(tree.root_edge().w, root_edge_before.w);

        for (a, b) in tree.node(root).edges.iter().zip(before.iter()) {
            assert_eq!(a.n, b.n);
            assert_eq!(a.w, b.w);
        }
    }

    #[test]
    fn double_pass_is_game_over() {
        let mut tree = MctsTree::new(ToyPosition::empty(), 7.5);
        let board_size = tree.board_size();
        let root = tree.root();

        let pass_idx = Coord::pass(board_size).to_index(board_size);
        let first_pass = tree.create_child(root, pass_idx);
        assert!(!tree.is_game_over(first_pass));

        let second_pass = tree.create_child(first_pass, pass_idx);
        assert!(tree.is_game_over(second_pass));
    }

    #[test]
    fn play_move_drops_siblings_and_carries_stats_forward() {
        let mut tree = MctsTree::new(ToyPosition::empty(), 7.5);
        let num_moves = tree.board_size().num_moves();
        let root = tree.root();
        tree.incorporate_results(root, &skewed_policy(num_moves, 0), 0.0, 0.0);

        let kept = tree.create_child(root, 0);
        let dropped = tree.create_child(root, 1);
        tree.incorporate_results(kept, &skewed_policy(num_moves, 2), 0.3, 0.0);
        let kept_edge_before = tree.node(root).edges[0];

        let new_root = tree.play_move(Coord::from_index(0));

        assert_eq!(new_root, tree.root());
        assert_eq!(tree.root_edge().n, kept_edge_before.n);
        assert_eq!(tree.root_edge().w, kept_edge_before.w);
        assert!(tree.node(new_root).children.get(&1).is_none());
        assert_eq!(tree.node_count(), 1, "the dropped sibling must not survive the rebase");
        let _ = dropped; // old id, no longer meaningful after rebase
    }

    #[test]
    fn cache_key_is_shared_between_symmetric_positions() {
        // (1, 2) lies off both diagonals of a 9x9 board, so its orbit under
        // the eight symmetries has no fixed points and all eight hashes are
        // distinct -- a corner or center stone would not exercise this path.
        let mut a = ToyPosition::empty();
        a.stones[2 * 9 + 1] = Some(Color::Black); // (1, 2)
        let tree_a = MctsTree::new(a, 7.5);

        let mut b = ToyPosition::empty();
        b.stones[1 * 9 + 6] = Some(Color::Black); // (6, 1), the Rot270 image of (1, 2)
        let tree_b = MctsTree::new(b, 7.5);

        let key_a = tree_a.cache_key(tree_a.root());
        let key_b = tree_b.cache_key(tree_b.root());

        assert!(key_a.is_some());
        assert_eq!(key_a.unwrap().canonical_stone_hash, key_b.unwrap().canonical_stone_hash);
    }

    #[test]
    fn virtual_loss_batch_of_fifty_reverts_to_zero_everywhere() {
        let mut tree = MctsTree::new(ToyPosition::empty(), 7.5);
        let num_moves = tree.board_size().num_moves();
        let root = tree.root();
        tree.incorporate_results(root, &skewed_policy(num_moves, 5), 0.0, 0.0);

        let mut leaves = Vec::with_capacity(50);
        for _ in 0..50 {
            let leaf = tree.select_leaf(true).unwrap();
            tree.add_virtual_loss(leaf);
            leaves.push(leaf);
        }

        for leaf in leaves {
            tree.revert_virtual_loss(leaf);
        }

        for i in 0..tree.node_count() {
            let id = NodeId(i as u32);
            assert_eq!(tree.node(id).num_virtual_losses_applied, 0, "node {} retained virtual loss", i);
        }
    }

    #[test]
    fn reshape_final_visits_never_touches_the_best_move_and_never_increases_visits() {
        let mut tree = MctsTree::new(ToyPosition::empty(), 7.5);
        let num_moves = tree.board_size().num_moves();
        let root = tree.root();
        tree.incorporate_results(root, &skewed_policy(num_moves, 4), 0.0, 0.0);

        for _ in 0..500 {
            let leaf = tree.select_leaf(true).unwrap();
            tree.incorporate_results(leaf, &skewed_policy(num_moves, 4), 0.1, 0.0);
        }

        let before: Vec<Edge> = tree.node(root).edges.to_vec();
        let total_before: u32 = before.iter().map(|e| e.n).sum();

        tree.reshape_final_visits(false, &[]);

        let after = &tree.node(root).edges;
        let total_after: u32 = after.iter().map(|e| e.n).sum();

        assert!(total_after <= total_before, "reshape must never increase total visits");

        for i in 0..num_moves {
            assert!(after[i].n <= before[i].n, "edge {} visits increased", i);
        }
    }

    #[test]
    fn superko_sparse_cache_detects_positions_across_cache_strides() {
        // 18 plies, crossing the stride-8 cache boundary twice, so the walk
        // in `has_hash_on_path` must hop through at least two cached nodes
        // to reach the root.
        let mut tree = MctsTree::new(ToyPosition::empty(), 7.5);
        let mut path = vec![tree.root()];
        let mut current = tree.root();

        for slot in 0..18usize {
            current = tree.create_child(current, slot);
            path.push(current);
        }

        let leaf = *path.last().unwrap();

        for (offset, &ancestor) in path.iter().enumerate() {
            let hash = tree.node(ancestor).position.stone_hash();
            assert!(tree.has_hash_on_path(leaf, hash), "offset {} not detected on path", offset);
        }

        assert!(!tree.has_hash_on_path(leaf, 0xDEAD_BEEFu64));
    }
}
