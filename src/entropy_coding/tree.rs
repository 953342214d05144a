// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The MANIAC context tree: inner nodes split on an integer property
//! against a threshold, leaves index a pool of symbol models. The tree is
//! serialized in preorder, the `>` subtree first, with split values coded
//! inside the property range narrowed by the path so far.

use crate::entropy_coding::rac::{RacInput, RacOutput};
use crate::entropy_coding::symbol::SimpleSymbolCoder;
use crate::error::{Error, Result};
use crate::io::{ByteSink, ByteSource};

/// Per-property (lo, hi) bounds, inclusive on both ends.
pub type Ranges = Vec<(i32, i32)>;

/// Decode-side guard against degenerate streams that describe enormous
/// trees one narrow split at a time.
const TREE_SIZE_LIMIT: usize = 1 << 22;

#[derive(Debug, Clone, Copy)]
pub struct PropertyDecisionNode {
    /// Property index, or -1 for a leaf.
    pub property: i32,
    pub splitval: i32,
    /// For an inner node the index of the `>` child (the `<=` child is at
    /// `child_id + 1`); for a leaf an index into the leaf pool.
    pub child_id: u32,
}

impl PropertyDecisionNode {
    pub fn leaf() -> PropertyDecisionNode {
        PropertyDecisionNode {
            property: -1,
            splitval: 0,
            child_id: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    pub nodes: Vec<PropertyDecisionNode>,
}

impl Tree {
    /// A tree with a single leaf.
    pub fn new() -> Tree {
        Tree {
            nodes: vec![PropertyDecisionNode::leaf()],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Renumbers the leaves reachable from the root densely, in the
    /// serialization order (`>` subtree before `<=` subtree). Both the
    /// final-pass encoder and the decoder call this, so leaf identities
    /// agree on the two sides. Returns the number of reachable leaves.
    pub fn relabel_leaves(&mut self) -> usize {
        let mut next_leaf = 0u32;
        let mut stack = vec![0usize];
        while let Some(pos) = stack.pop() {
            if self.nodes[pos].property < 0 {
                self.nodes[pos].child_id = next_leaf;
                next_leaf += 1;
            } else {
                let child = self.nodes[pos].child_id as usize;
                stack.push(child + 1);
                stack.push(child);
            }
        }
        next_leaf as usize
    }
}

impl Default for Tree {
    fn default() -> Tree {
        Tree::new()
    }
}

enum Walk {
    Visit { pos: usize, narrow: Option<(usize, i32, i32)> },
    Restore { prop: usize, lo: i32, hi: i32 },
}

/// Reads and writes the tree itself. The symbol models here always start
/// from the default zero chance, even when the surrounding group carries a
/// zero-chance override; the override applies to sample residuals only.
pub struct MetaTreeCoder {
    prop_coder: SimpleSymbolCoder,
    split_coder: SimpleSymbolCoder,
    range: Ranges,
}

impl MetaTreeCoder {
    pub fn new(range: Ranges) -> MetaTreeCoder {
        MetaTreeCoder {
            prop_coder: SimpleSymbolCoder::new(),
            split_coder: SimpleSymbolCoder::new(),
            range,
        }
    }

    pub fn write_tree<S: ByteSink>(&mut self, rac: &mut RacOutput<S>, tree: &Tree) {
        let nb_properties = self.range.len();
        let mut range = self.range.clone();
        let mut stack = vec![Walk::Visit {
            pos: 0,
            narrow: None,
        }];
        while let Some(step) = stack.pop() {
            match step {
                Walk::Visit { pos, narrow } => {
                    if let Some((p, lo, hi)) = narrow {
                        range[p] = (lo, hi);
                    }
                    let n = tree.nodes[pos];
                    self.prop_coder
                        .write_int2(rac, 0, nb_properties as i32, n.property + 1);
                    if n.property < 0 {
                        continue;
                    }
                    let p = n.property as usize;
                    let (oldmin, oldmax) = range[p];
                    debug_assert!(oldmin < oldmax);
                    self.split_coder.write_int2(rac, oldmin, oldmax - 1, n.splitval);
                    let child = n.child_id as usize;
                    stack.push(Walk::Restore {
                        prop: p,
                        lo: oldmin,
                        hi: oldmax,
                    });
                    stack.push(Walk::Visit {
                        pos: child + 1,
                        narrow: Some((p, oldmin, n.splitval)),
                    });
                    stack.push(Walk::Visit {
                        pos: child,
                        narrow: Some((p, n.splitval + 1, oldmax)),
                    });
                }
                Walk::Restore { prop, lo, hi } => range[prop] = (lo, hi),
            }
        }
    }

    pub fn read_tree<S: ByteSource>(&mut self, rac: &mut RacInput<S>) -> Result<Tree> {
        let nb_properties = self.range.len();
        let mut range = self.range.clone();
        let mut tree = Tree::new();
        let mut stack = vec![Walk::Visit {
            pos: 0,
            narrow: None,
        }];
        while let Some(step) = stack.pop() {
            match step {
                Walk::Visit { pos, narrow } => {
                    if let Some((p, lo, hi)) = narrow {
                        range[p] = (lo, hi);
                    }
                    let property = self.prop_coder.read_int2(rac, 0, nb_properties as i32) - 1;
                    tree.nodes[pos].property = property;
                    if property < 0 {
                        continue;
                    }
                    let p = property as usize;
                    let (oldmin, oldmax) = range[p];
                    if oldmin >= oldmax {
                        return Err(Error::TreeSplitOnEmptyRange(p));
                    }
                    let splitval = self.split_coder.read_int2(rac, oldmin, oldmax - 1);
                    let child = tree.nodes.len();
                    if child + 2 > TREE_SIZE_LIMIT {
                        return Err(Error::TreeTooLarge(child));
                    }
                    tree.nodes[pos].splitval = splitval;
                    tree.nodes[pos].child_id = child as u32;
                    tree.nodes.push(PropertyDecisionNode::leaf());
                    tree.nodes.push(PropertyDecisionNode::leaf());
                    stack.push(Walk::Restore {
                        prop: p,
                        lo: oldmin,
                        hi: oldmax,
                    });
                    stack.push(Walk::Visit {
                        pos: child + 1,
                        narrow: Some((p, oldmin, splitval)),
                    });
                    stack.push(Walk::Visit {
                        pos: child,
                        narrow: Some((p, splitval + 1, oldmax)),
                    });
                }
                Walk::Restore { prop, lo, hi } => range[prop] = (lo, hi),
            }
        }
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BlobReader, BlobWriter};

    fn build_test_tree() -> Tree {
        // root: p0 > 3 ? (p1 > -2 ? leaf : leaf) : leaf
        let mut tree = Tree::new();
        tree.nodes[0] = PropertyDecisionNode {
            property: 0,
            splitval: 3,
            child_id: 1,
        };
        tree.nodes.push(PropertyDecisionNode {
            property: 1,
            splitval: -2,
            child_id: 3,
        });
        tree.nodes.push(PropertyDecisionNode::leaf());
        tree.nodes.push(PropertyDecisionNode::leaf());
        tree.nodes.push(PropertyDecisionNode::leaf());
        tree
    }

    #[test]
    fn relabel_assigns_dense_preorder_ids() {
        let mut tree = build_test_tree();
        assert_eq!(tree.relabel_leaves(), 3);
        // preorder with the `>` child first: node1's subtree before node2
        assert_eq!(tree.nodes[3].child_id, 0);
        assert_eq!(tree.nodes[4].child_id, 1);
        assert_eq!(tree.nodes[2].child_id, 2);
    }

    #[test]
    fn tree_round_trips_through_the_coder() {
        let ranges: Ranges = vec![(0, 10), (-5, 5), (0, 100)];
        let mut tree = build_test_tree();
        tree.relabel_leaves();

        let mut sink = BlobWriter::new();
        {
            let mut rac = RacOutput::new(&mut sink);
            let mut coder = MetaTreeCoder::new(ranges.clone());
            coder.write_tree(&mut rac, &tree);
            rac.flush();
        }
        let bytes = sink.into_bytes();
        let mut source = BlobReader::new(&bytes);
        let mut rac = RacInput::new(&mut source);
        let mut coder = MetaTreeCoder::new(ranges);
        let mut decoded = coder.read_tree(&mut rac).unwrap();
        decoded.relabel_leaves();

        assert_eq!(decoded.len(), tree.len());
        for (a, b) in decoded.nodes.iter().zip(tree.nodes.iter()) {
            assert_eq!(a.property, b.property);
            if a.property >= 0 {
                assert_eq!(a.splitval, b.splitval);
            } else {
                assert_eq!(a.child_id, b.child_id);
            }
        }
    }

    #[test]
    fn single_leaf_tree_round_trips() {
        let ranges: Ranges = vec![(0, 1)];
        let tree = Tree::new();
        let mut sink = BlobWriter::new();
        {
            let mut rac = RacOutput::new(&mut sink);
            let mut coder = MetaTreeCoder::new(ranges.clone());
            coder.write_tree(&mut rac, &tree);
            rac.flush();
        }
        let bytes = sink.into_bytes();
        let mut source = BlobReader::new(&bytes);
        let mut rac = RacInput::new(&mut source);
        let mut coder = MetaTreeCoder::new(ranges);
        let decoded = coder.read_tree(&mut rac).unwrap();
        assert_eq!(decoded.len(), 1);
        assert!(decoded.nodes[0].property < 0);
    }
}
