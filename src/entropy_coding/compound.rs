// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Leaf models of the MANIAC tree. During the training pass every leaf
//! carries, besides its real model, one virtual model pair per candidate
//! property ("above"/"below" the running split value); when a virtual pair
//! would have coded the leaf's history significantly cheaper than the real
//! model, the leaf is split. The final pass (and the decoder) keep only the
//! real models.

use crate::entropy_coding::chance::ChanceTable;
use crate::entropy_coding::rac::{RacInput, RacOutput};
use crate::entropy_coding::symbol::{SymbolChance, read_symbol, write_symbol};
use crate::entropy_coding::tree::{Ranges, Tree};
use crate::io::{ByteSink, ByteSource};

/// Training-time state of one leaf.
#[derive(Debug, Clone)]
pub struct CompoundSymbolChances {
    pub real: SymbolChance,
    /// One (above, below) pair per candidate property.
    pub virt: Vec<(SymbolChance, SymbolChance)>,
    pub real_size: u64,
    pub virt_size: Vec<u64>,
    pub virt_prop_sum: Vec<i64>,
    pub count: u32,
    /// Candidate property whose virtual models are currently the cheapest,
    /// or -1 when the real model is winning.
    pub best_property: i32,
}

impl CompoundSymbolChances {
    pub fn new(nb_properties: usize, zero_chance: u16) -> CompoundSymbolChances {
        let sc = SymbolChance::new(zero_chance);
        CompoundSymbolChances {
            virt: vec![(sc.clone(), sc.clone()); nb_properties],
            real: sc,
            real_size: 0,
            virt_size: vec![0; nb_properties],
            virt_prop_sum: vec![0; nb_properties],
            count: 0,
            best_property: -1,
        }
    }

    pub fn reset_counters(&mut self) {
        self.best_property = -1;
        self.real_size = 0;
        self.count = 0;
        self.virt_prop_sum.fill(0);
        self.virt_size.fill(0);
    }
}

/// Floor division, also for negative sums.
#[inline]
fn div_down(sum: i64, count: u32) -> i32 {
    let count = count as i64;
    if sum >= 0 {
        (sum / count) as i32
    } else {
        (-((-sum + count - 1) / count)) as i32
    }
}

/// Training-pass coder: builds the tree while feeding every residual
/// through the leaf models. It writes no bytes; only probability state and
/// cost accounting advance.
pub struct PropertySymbolCoder {
    table: ChanceTable,
    range: Ranges,
    nb_properties: usize,
    leaf_node: Vec<CompoundSymbolChances>,
    tree: Tree,
    selection: Vec<bool>,
    split_threshold: u64,
}

impl PropertySymbolCoder {
    pub fn new(
        range: Ranges,
        zero_chance: u16,
        split_threshold: u64,
        cutoff: i32,
        alpha: u32,
    ) -> PropertySymbolCoder {
        let nb_properties = range.len();
        PropertySymbolCoder {
            table: ChanceTable::new(cutoff, alpha),
            range,
            nb_properties,
            leaf_node: vec![CompoundSymbolChances::new(nb_properties, zero_chance)],
            tree: Tree::new(),
            selection: vec![false; nb_properties],
            split_threshold,
        }
    }

    /// Split value for a candidate property: prefer 0 when the current
    /// range straddles it, otherwise the floor of the running mean,
    /// clamped below the upper bound.
    fn compute_splitval(leaf: &CompoundSymbolChances, p: usize, crange: &Ranges) -> i32 {
        if crange[p].0 < 0 && crange[p].1 > 0 {
            return 0;
        }
        let mut splitval = div_down(leaf.virt_prop_sum[p], leaf.count);
        if splitval >= crange[p].1 {
            // can happen because of rounding and the running average
            splitval = crange[p].1 - 1;
        }
        splitval
    }

    /// Descends to the leaf for `properties`, updating the per-property
    /// virtual selection, and splits the leaf when a virtual pair has paid
    /// for itself. Returns the leaf index to code into.
    fn find_leaf(&mut self, properties: &[i32]) -> usize {
        let mut pos = 0usize;
        let mut current_ranges = self.range.clone();
        while self.tree.nodes[pos].property >= 0 {
            let n = self.tree.nodes[pos];
            let p = n.property as usize;
            if properties[p] > n.splitval {
                current_ranges[p].0 = n.splitval + 1;
                pos = n.child_id as usize;
            } else {
                current_ranges[p].1 = n.splitval;
                pos = (n.child_id + 1) as usize;
            }
        }
        let leaf_id = self.tree.nodes[pos].child_id as usize;

        // update counters and the above/below selection
        {
            let leaf = &mut self.leaf_node[leaf_id];
            leaf.count += 1;
            for i in 0..self.nb_properties {
                leaf.virt_prop_sum[i] += properties[i] as i64;
                let splitval = Self::compute_splitval(leaf, i, &current_ranges);
                self.selection[i] = properties[i] > splitval;
            }
        }

        let leaf = &self.leaf_node[leaf_id];
        let best = leaf.best_property;
        if best >= 0
            && leaf.real_size > leaf.virt_size[best as usize] + self.split_threshold
            && self.leaf_node.len() < 0xffff
            && self.tree.nodes.len() < 0xffff
            && current_ranges[best as usize].0 < current_ranges[best as usize].1
        {
            let p = best as usize;
            let splitval = Self::compute_splitval(leaf, p, &current_ranges);

            let new_inner = self.tree.nodes.len() as u32;
            let old_node = self.tree.nodes[pos];
            self.tree.nodes.push(old_node);
            self.tree.nodes.push(old_node);
            self.tree.nodes[pos].splitval = splitval;
            self.tree.nodes[pos].property = p as i32;
            let new_leaf = self.leaf_node.len();
            self.leaf_node[leaf_id].reset_counters();
            let clone = self.leaf_node[leaf_id].clone();
            self.leaf_node.push(clone);
            let old_leaf = self.tree.nodes[pos].child_id;
            self.tree.nodes[pos].child_id = new_inner;
            self.tree.nodes[new_inner as usize].child_id = old_leaf;
            self.tree.nodes[new_inner as usize + 1].child_id = new_leaf as u32;
            return if properties[p] > splitval {
                old_leaf as usize
            } else {
                new_leaf
            };
        }
        leaf_id
    }

    pub fn write_int(&mut self, properties: &[i32], min: i32, max: i32, value: i32) {
        if min == max {
            debug_assert_eq!(value, min);
            return;
        }
        debug_assert_eq!(properties.len(), self.nb_properties);
        let leaf_id = self.find_leaf(properties);
        let leaf = &mut self.leaf_node[leaf_id];
        let selection = &self.selection;
        let table = &self.table;
        write_symbol(min, max, value, &mut |bit, t| {
            let real = leaf.real.bit(t);
            leaf.real_size += real.estim(bit);
            real.put(bit, table);

            let mut best_property = -1;
            let mut best_size = leaf.real_size;
            for (j, pair) in leaf.virt.iter_mut().enumerate() {
                let virt = if selection[j] {
                    pair.0.bit(t)
                } else {
                    pair.1.bit(t)
                };
                leaf.virt_size[j] += virt.estim(bit);
                virt.put(bit, table);
                if leaf.virt_size[j] < best_size {
                    best_size = leaf.virt_size[j];
                    best_property = j as i32;
                }
            }
            leaf.best_property = best_property;
        });
    }

    /// Destructive post-order pruning of subtrees whose pixel counts do not
    /// justify their transmission cost. Empty leaves carry a penalty so
    /// they never survive on their own.
    pub fn simplify(&mut self, divisor: i64, min_size: i64) {
        let _ = divisor; // kept for parity with the configuration constants
        self.simplify_subtree(0, min_size);
    }

    fn simplify_subtree(&mut self, pos: usize, min_size: i64) -> i64 {
        let n = self.tree.nodes[pos];
        if n.property < 0 {
            let count = self.leaf_node[n.child_id as usize].count as i64;
            if count == 0 {
                return -100;
            }
            return count;
        }
        let child = n.child_id as usize;
        let mut subtree_size = 0i64;
        subtree_size += self.simplify_subtree(child, min_size);
        subtree_size += self.simplify_subtree(child + 1, min_size);
        if subtree_size < min_size {
            // The children stay in the node pool but become unreachable;
            // leaf relabeling only walks reachable nodes.
            self.tree.nodes[pos].property = -1;
        }
        subtree_size
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }
}

/// Final-pass coder: the tree is frozen, each leaf holds one fresh real
/// model. Identical on the encoder and the decoder.
pub struct FinalPropertySymbolCoder {
    table: ChanceTable,
    tree: Tree,
    leaf_node: Vec<SymbolChance>,
    nb_properties: usize,
}

impl FinalPropertySymbolCoder {
    /// `tree` must have its leaves relabelled densely; `nb_leaves` is the
    /// count returned by `Tree::relabel_leaves`.
    pub fn new(
        tree: Tree,
        nb_properties: usize,
        nb_leaves: usize,
        zero_chance: u16,
        cutoff: i32,
        alpha: u32,
    ) -> FinalPropertySymbolCoder {
        FinalPropertySymbolCoder {
            table: ChanceTable::new(cutoff, alpha),
            tree,
            leaf_node: vec![SymbolChance::new(zero_chance); nb_leaves.max(1)],
            nb_properties,
        }
    }

    #[inline]
    fn find_leaf(&self, properties: &[i32]) -> usize {
        let mut pos = 0usize;
        loop {
            let n = self.tree.nodes[pos];
            if n.property < 0 {
                return n.child_id as usize;
            }
            pos = if properties[n.property as usize] > n.splitval {
                n.child_id as usize
            } else {
                (n.child_id + 1) as usize
            };
        }
    }

    pub fn single_leaf(&self) -> bool {
        self.tree.len() == 1
    }

    pub fn write_int<S: ByteSink>(
        &mut self,
        rac: &mut RacOutput<S>,
        properties: &[i32],
        min: i32,
        max: i32,
        value: i32,
    ) {
        if min == max {
            debug_assert_eq!(value, min);
            return;
        }
        debug_assert_eq!(properties.len(), self.nb_properties);
        let leaf_id = self.find_leaf(properties);
        let leaf = &mut self.leaf_node[leaf_id];
        let table = &self.table;
        write_symbol(min, max, value, &mut |bit, t| {
            let ch = leaf.bit(t);
            rac.write_12bit_chance(ch.get(), bit);
            ch.put(bit, table);
        });
    }

    pub fn read_int<S: ByteSource>(
        &mut self,
        rac: &mut RacInput<S>,
        properties: &[i32],
        min: i32,
        max: i32,
    ) -> i32 {
        if min == max {
            return min;
        }
        let leaf_id = self.find_leaf(properties);
        let leaf = &mut self.leaf_node[leaf_id];
        let table = &self.table;
        read_symbol(min, max, &mut |t| {
            let ch = leaf.bit(t);
            let bit = rac.read_12bit_chance(ch.get());
            ch.put(bit, table);
            bit
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy_coding::symbol::ZERO_CHANCE;
    use crate::io::{BlobReader, BlobWriter};

    #[test]
    fn training_learns_a_split_on_a_bimodal_source() {
        // Property 0 perfectly predicts the residual distribution: when it
        // is high the values are large, when it is low they are zero.
        let range: Ranges = vec![(0, 255)];
        let mut coder = PropertySymbolCoder::new(range, ZERO_CHANCE, 5461 * 8 * 2, 2, 0xffff_ffff / 19);
        for i in 0..4000 {
            let p = if i % 2 == 0 { 200 } else { 20 };
            let v = if p > 100 { 90 + (i % 7) as i32 } else { 0 };
            coder.write_int(&[p], -100, 100, v);
        }
        let mut tree = coder.into_tree();
        assert!(tree.len() > 1, "expected at least one split");
        assert_eq!(tree.nodes[0].property, 0);
        let leaves = tree.relabel_leaves();
        assert!(leaves >= 2);
    }

    #[test]
    fn pruning_removes_underpopulated_subtrees() {
        let range: Ranges = vec![(0, 255)];
        let mut coder = PropertySymbolCoder::new(range, ZERO_CHANCE, 1, 2, 0xffff_ffff / 19);
        // Tiny sample: any split that appears cannot accumulate the counts
        // needed to survive a min_size of 1000.
        for i in 0..64 {
            coder.write_int(&[(i * 4) as i32], -100, 100, (i % 5) as i32 - 2);
        }
        coder.simplify(1, 1000);
        let tree = coder.into_tree();
        assert!(tree.nodes[0].property < 0, "root must fold back to a leaf");
    }

    #[test]
    fn final_coder_round_trips_with_a_real_tree() {
        let range: Ranges = vec![(0, 255), (-10, 10)];
        let mut training =
            PropertySymbolCoder::new(range.clone(), ZERO_CHANCE, 5461 * 8 * 2, 6, 0x0d00_0000);
        let samples: Vec<([i32; 2], i32)> = (0..3000)
            .map(|i| {
                let p0 = (i * 37) % 256;
                let p1 = (i % 21) as i32 - 10;
                let v = if p0 > 128 { (i % 13) as i32 - 6 } else { 0 };
                ([p0 as i32, p1], v)
            })
            .collect();
        for (props, v) in &samples {
            training.write_int(props, -200, 200, *v);
        }
        training.simplify(1, 10);
        let mut tree = training.into_tree();
        let nb_leaves = tree.relabel_leaves();

        let mut sink = BlobWriter::new();
        {
            let mut rac = RacOutput::new(&mut sink);
            let mut coder =
                FinalPropertySymbolCoder::new(tree.clone(), 2, nb_leaves, ZERO_CHANCE, 6, 0x0d00_0000);
            for (props, v) in &samples {
                coder.write_int(&mut rac, props, -200, 200, *v);
            }
            rac.flush();
        }
        let bytes = sink.into_bytes();
        let mut source = BlobReader::new(&bytes);
        let mut rac = RacInput::new(&mut source);
        let mut coder =
            FinalPropertySymbolCoder::new(tree, 2, nb_leaves, ZERO_CHANCE, 6, 0x0d00_0000);
        for (props, v) in &samples {
            assert_eq!(coder.read_int(&mut rac, props, -200, 200), *v);
        }
    }

    #[test]
    fn div_down_rounds_toward_negative_infinity() {
        assert_eq!(div_down(7, 2), 3);
        assert_eq!(div_down(-7, 2), -4);
        assert_eq!(div_down(-1, 3), -1);
        assert_eq!(div_down(0, 5), 0);
        assert_eq!(div_down(-6, 3), -2);
    }
}
