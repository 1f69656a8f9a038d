//! RFC 6962 Merkle tree over entry hashes
//!
//! Leaves are hashed with a `0x00` prefix and interior nodes with `0x01`,
//! so a leaf digest can never be replayed as an interior node. Unbalanced
//! trees split at the largest power of two strictly below the leaf count.
//! Proofs carry the audit path in leaf-to-root order and verify against a
//! published root with no access to the ledger.

use serde::{Deserialize, Serialize};
use verity_crypto::{from_hex, hash_bytes, to_hex, Hash32};

use crate::error::LedgerError;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

fn leaf_hash(data: &[u8]) -> Hash32 {
    let mut message = Vec::with_capacity(1 + data.len());
    message.push(LEAF_PREFIX);
    message.extend_from_slice(data);
    hash_bytes(&message)
}

fn node_hash(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut message = [0u8; 65];
    message[0] = NODE_PREFIX;
    message[1..33].copy_from_slice(left);
    message[33..].copy_from_slice(right);
    hash_bytes(&message)
}

/// Largest power of two strictly less than `n`; `n` must be at least 2.
fn split_point(n: usize) -> usize {
    let mut k = 1;
    while k * 2 < n {
        k *= 2;
    }
    k
}

/// An append-only Merkle tree keyed by leaf insertion order.
#[derive(Clone, Debug, Default)]
pub struct MerkleTree {
    leaves: Vec<Hash32>,
    /// Roots of the maximal perfect subtrees, leftmost first; one per set
    /// bit of the leaf count. Keeps `root` at O(log n) instead of
    /// recomputing over every leaf.
    peaks: Vec<(usize, Hash32)>,
}

impl MerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a leaf; returns its index. Amortized O(1): at most the
    /// carry chain of equal-sized peaks is merged.
    pub fn push(&mut self, data: &[u8]) -> u64 {
        let leaf = leaf_hash(data);
        self.leaves.push(leaf);
        self.peaks.push((1, leaf));
        loop {
            let n = self.peaks.len();
            if n < 2 || self.peaks[n - 2].0 != self.peaks[n - 1].0 {
                break;
            }
            let (size, right) = self.peaks[n - 1];
            let (_, left) = self.peaks[n - 2];
            self.peaks.truncate(n - 2);
            self.peaks.push((size * 2, node_hash(&left, &right)));
        }
        (self.leaves.len() - 1) as u64
    }

    pub fn len(&self) -> u64 {
        self.leaves.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Current root, folded from the cached peaks right to left; this is
    /// exactly the split-at-largest-power-of-two shape. The empty tree's
    /// root is the hash of the empty string.
    pub fn root(&self) -> Hash32 {
        let mut peaks = self.peaks.iter().rev();
        match peaks.next() {
            None => hash_bytes(&[]),
            Some((_, rightmost)) => {
                let mut acc = *rightmost;
                for (_, peak) in peaks {
                    acc = node_hash(peak, &acc);
                }
                acc
            }
        }
    }

    pub fn root_hex(&self) -> String {
        to_hex(&self.root())
    }

    /// Audit path for the leaf at `index`.
    pub fn proof(&self, index: u64) -> Result<MerkleProof, LedgerError> {
        let len = self.len();
        if index >= len {
            return Err(LedgerError::IndexOutOfRange { index, len });
        }
        let mut path = Vec::new();
        audit_path(&self.leaves, index as usize, &mut path);
        Ok(MerkleProof {
            leaf_index: index,
            tree_size: len,
            path: path.iter().map(to_hex).collect(),
        })
    }
}

fn subtree_root(leaves: &[Hash32]) -> Hash32 {
    match leaves {
        [single] => *single,
        _ => {
            let k = split_point(leaves.len());
            node_hash(&subtree_root(&leaves[..k]), &subtree_root(&leaves[k..]))
        }
    }
}

fn audit_path(leaves: &[Hash32], index: usize, out: &mut Vec<Hash32>) {
    if leaves.len() == 1 {
        return;
    }
    let k = split_point(leaves.len());
    if index < k {
        audit_path(&leaves[..k], index, out);
        out.push(subtree_root(&leaves[k..]));
    } else {
        audit_path(&leaves[k..], index - k, out);
        out.push(subtree_root(&leaves[..k]));
    }
}

/// A self-contained inclusion proof: leaf position, tree size at issuance,
/// and the hex-encoded sibling path in leaf-to-root order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: u64,
    pub tree_size: u64,
    pub path: Vec<String>,
}

impl MerkleProof {
    /// Check that `leaf_data` sits at `leaf_index` in the tree whose root
    /// is `root_hex`. Malformed hex in the path or root fails closed.
    pub fn verify(&self, leaf_data: &[u8], root_hex: &str) -> bool {
        let Ok(root) = from_hex(root_hex) else {
            return false;
        };
        let Ok(path) = self
            .path
            .iter()
            .map(|h| from_hex(h))
            .collect::<Result<Vec<Hash32>, _>>()
        else {
            return false;
        };
        if self.leaf_index >= self.tree_size || self.tree_size == 0 {
            return false;
        }
        let leaf = leaf_hash(leaf_data);
        match compute_root(
            self.leaf_index as usize,
            self.tree_size as usize,
            leaf,
            &path,
        ) {
            Some(computed) => computed == root,
            None => false,
        }
    }
}

/// Fold the audit path back up to a root. The path is consumed from the
/// top: its last element is the sibling of the highest split.
fn compute_root(index: usize, size: usize, leaf: Hash32, path: &[Hash32]) -> Option<Hash32> {
    if size == 1 {
        return if path.is_empty() { Some(leaf) } else { None };
    }
    let (sibling, rest) = path.split_last()?;
    let k = split_point(size);
    if index < k {
        Some(node_hash(&compute_root(index, k, leaf, rest)?, sibling))
    } else {
        Some(node_hash(
            sibling,
            &compute_root(index - k, size - k, leaf, rest)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tree_with(n: usize) -> (MerkleTree, Vec<Vec<u8>>) {
        let mut tree = MerkleTree::new();
        let mut data = Vec::new();
        for i in 0..n {
            let leaf = format!("entry-{i}").into_bytes();
            tree.push(&leaf);
            data.push(leaf);
        }
        (tree, data)
    }

    #[test]
    fn single_leaf_root_is_the_leaf_hash() {
        let (tree, data) = tree_with(1);
        assert_eq!(tree.root(), leaf_hash(&data[0]));
    }

    #[test]
    fn cached_peaks_agree_with_full_recomputation() {
        // The incrementally maintained root must match the recursive
        // definition at every size, including every power-of-two carry.
        let mut tree = MerkleTree::new();
        for i in 0..33 {
            tree.push(format!("entry-{i}").as_bytes());
            assert_eq!(tree.root(), subtree_root(&tree.leaves), "size {}", i + 1);
        }
    }

    #[test]
    fn domain_separation_between_leaves_and_nodes() {
        // A two-leaf root must differ from the leaf hash of the
        // concatenation, else a leaf could impersonate a subtree.
        let (tree, data) = tree_with(2);
        let mut concat = data[0].clone();
        concat.extend_from_slice(&data[1]);
        assert_ne!(tree.root(), leaf_hash(&concat));
    }

    #[test]
    fn proofs_verify_for_every_leaf_of_unbalanced_trees() {
        for n in 1..=17 {
            let (tree, data) = tree_with(n);
            let root = tree.root_hex();
            for (i, leaf) in data.iter().enumerate() {
                let proof = tree.proof(i as u64).unwrap();
                assert!(proof.verify(leaf, &root), "leaf {i} of {n}");
            }
        }
    }

    #[test]
    fn tampered_leaf_is_rejected() {
        let (tree, _) = tree_with(8);
        let proof = tree.proof(3).unwrap();
        assert!(!proof.verify(b"entry-3-tampered", &tree.root_hex()));
    }

    #[test]
    fn proof_does_not_transfer_to_another_position() {
        let (tree, data) = tree_with(8);
        let mut proof = tree.proof(3).unwrap();
        proof.leaf_index = 4;
        assert!(!proof.verify(&data[3], &tree.root_hex()));
    }

    #[test]
    fn stale_root_rejects_a_newer_proof() {
        let (mut tree, data) = tree_with(4);
        let old_root = tree.root_hex();
        tree.push(b"entry-4");
        let proof = tree.proof(0).unwrap();
        assert!(!proof.verify(&data[0], &old_root));
        assert!(proof.verify(&data[0], &tree.root_hex()));
    }

    #[test]
    fn out_of_range_proof_is_an_error() {
        let (tree, _) = tree_with(3);
        assert!(matches!(
            tree.proof(3),
            Err(LedgerError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn path_length_is_logarithmic() {
        let (tree, _) = tree_with(16);
        assert_eq!(tree.proof(0).unwrap().path.len(), 4);
    }

    proptest! {
        #[test]
        fn every_leaf_proves_inclusion(n in 1usize..64, pick in 0usize..64) {
            let (tree, data) = tree_with(n);
            let i = pick % n;
            let proof = tree.proof(i as u64).unwrap();
            prop_assert!(proof.verify(&data[i], &tree.root_hex()));
        }
    }
}
