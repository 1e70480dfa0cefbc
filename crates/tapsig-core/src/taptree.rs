//! Taptree construction.
//!
//! Two ways to build the same Merkle tree of leaf scripts:
//!
//! - [`depth_first_taptree`]: the BIP-371 PSBT encoding, an ordered list of
//!   leaves each tagged with its depth.
//! - [`huffman_taptree`]: a greedy Huffman tree over scripts weighted by
//!   expected usage, so likely scripts get shorter proofs.
//!
//! Both return the root and one authentication path per input leaf, in
//! input order. Paths list siblings from the leaf upward.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use bitcoin::taproot::TapNodeHash;
use bitcoin::{Script, ScriptBuf};

use crate::error::{Result, TaprootError};
use crate::hash::{hash_tap_branch, hash_tap_leaf, TAPSCRIPT_LEAF_VERSION};

/// Maximum depth of a taptree (BIP-341).
pub const TAPROOT_CONTROL_MAX_NODE_COUNT: usize = 128;

/// A leaf script as it appears in a PSBT output's tap tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapLeaf {
    pub script: ScriptBuf,
    pub leaf_version: u8,
    /// Required by [`depth_first_taptree`], ignored by the weighted construction.
    pub depth: Option<u8>,
}

impl TapLeaf {
    pub fn new(script: ScriptBuf, depth: u8) -> Self {
        TapLeaf {
            script,
            leaf_version: TAPSCRIPT_LEAF_VERSION,
            depth: Some(depth),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taptree {
    pub root: TapNodeHash,
    /// `paths[i]` is the authentication path of input leaf `i`.
    pub paths: Vec<Vec<TapNodeHash>>,
}

// ─── Depth-first ────────────────────────────────────────────────────────────

/// Rebuild a taptree from leaves listed depth-first with explicit depths.
///
/// Fails on a missing depth, a depth over 128, leaves that run out before
/// the tree closes, leaves left over after it closes, or a leaf shallower
/// than the slot it would have to fill.
pub fn depth_first_taptree(leaves: &[TapLeaf]) -> Result<Taptree> {
    if leaves.is_empty() {
        return Err(TaprootError::InvalidTaptree(
            "at least one leaf is required".to_string(),
        ));
    }

    let mut paths = vec![Vec::new(); leaves.len()];
    let mut iter = leaves.iter().enumerate();
    let subtree = recurse_taptree(&mut iter, 0, &mut paths)?;

    if iter.next().is_some() {
        return Err(TaprootError::InvalidTaptree(
            "no path to some leaves".to_string(),
        ));
    }
    Ok(Taptree {
        root: subtree.root,
        paths,
    })
}

struct Subtree {
    root: TapNodeHash,
    leaves: Vec<usize>,
}

fn recurse_taptree<'a, I>(
    leaves: &mut I,
    target_depth: u8,
    paths: &mut [Vec<TapNodeHash>],
) -> Result<Subtree>
where
    I: Iterator<Item = (usize, &'a TapLeaf)>,
{
    let (index, leaf) = leaves.next().ok_or_else(|| {
        TaprootError::InvalidTaptree("insufficient leaves to reconstruct tap tree".to_string())
    })?;
    let depth = leaf
        .depth
        .ok_or_else(|| TaprootError::InvalidTaptree(format!("leaf {} has no depth", index)))?;
    if depth as usize > TAPROOT_CONTROL_MAX_NODE_COUNT {
        return Err(TaprootError::InvalidTaptree(format!(
            "leaf {} depth {} exceeds {}",
            index, depth, TAPROOT_CONTROL_MAX_NODE_COUNT
        )));
    }
    if depth < target_depth {
        return Err(TaprootError::InvalidTaptree(format!(
            "leaf {} depth {} is shallower than its position {}",
            index, depth, target_depth
        )));
    }

    let mut tree = Subtree {
        root: TapNodeHash::from(hash_tap_leaf(&leaf.script, leaf.leaf_version)),
        leaves: vec![index],
    };
    for level in (target_depth + 1..=depth).rev() {
        let sibling = recurse_taptree(leaves, level, paths)?;
        for &i in &tree.leaves {
            paths[i].push(sibling.root);
        }
        for &i in &sibling.leaves {
            paths[i].push(tree.root);
        }
        tree.root = hash_tap_branch(&tree.root, &sibling.root);
        tree.leaves.extend(sibling.leaves);
    }
    Ok(tree)
}

// ─── Weighted (Huffman) ─────────────────────────────────────────────────────

/// Build a Huffman taptree over tapscript (0xc0) leaves.
///
/// `weights[i]` is the relative spend likelihood of `scripts[i]`; a missing
/// or `None` weight counts as 1, a zero weight or a weight without a script
/// is rejected. Equal weights
/// are combined in insertion order.
pub fn huffman_taptree(scripts: &[ScriptBuf], weights: &[Option<u32>]) -> Result<Taptree> {
    let leaves: Vec<(&Script, u8)> = scripts
        .iter()
        .map(|s| (s.as_script(), TAPSCRIPT_LEAF_VERSION))
        .collect();
    huffman_taptree_with_versions(&leaves, weights)
}

/// [`huffman_taptree`] with an explicit leaf version per script.
pub fn huffman_taptree_with_versions(
    leaves: &[(&Script, u8)],
    weights: &[Option<u32>],
) -> Result<Taptree> {
    if leaves.is_empty() {
        return Err(TaprootError::InvalidTaptree(
            "at least one script is required to construct a tap tree".to_string(),
        ));
    }
    if weights.len() > leaves.len() {
        return Err(TaprootError::InvalidTaptree(format!(
            "{} weights given for {} scripts",
            weights.len(),
            leaves.len()
        )));
    }

    // Nodes live in an arena; the heap orders (weight, insertion sequence).
    let mut nodes: Vec<Subtree> = Vec::with_capacity(leaves.len() * 2);
    let mut heap = BinaryHeap::new();
    for (index, (script, leaf_version)) in leaves.iter().enumerate() {
        let weight = weights.get(index).copied().flatten().unwrap_or(1);
        if weight == 0 {
            return Err(TaprootError::InvalidTaptree(format!(
                "script {} weight must be a positive value",
                index
            )));
        }
        nodes.push(Subtree {
            root: TapNodeHash::from(hash_tap_leaf(script, *leaf_version)),
            leaves: vec![index],
        });
        heap.push(Reverse((u64::from(weight), nodes.len() - 1)));
    }

    let mut paths = vec![Vec::new(); leaves.len()];
    while heap.len() > 1 {
        let (Some(Reverse((w1, n1))), Some(Reverse((w2, n2)))) = (heap.pop(), heap.pop()) else {
            break;
        };
        let (root1, root2) = (nodes[n1].root, nodes[n2].root);
        for &i in &nodes[n1].leaves {
            paths[i].push(root2);
        }
        for &i in &nodes[n2].leaves {
            paths[i].push(root1);
        }
        let mut merged = std::mem::take(&mut nodes[n1].leaves);
        merged.append(&mut nodes[n2].leaves);
        nodes.push(Subtree {
            root: hash_tap_branch(&root1, &root2),
            leaves: merged,
        });
        heap.push(Reverse((w1 + w2, nodes.len() - 1)));
    }

    let Some(Reverse((_, root_index))) = heap.pop() else {
        return Err(TaprootError::InvalidTaptree("empty tree".to_string()));
    };
    Ok(Taptree {
        root: nodes[root_index].root,
        paths,
    })
}
