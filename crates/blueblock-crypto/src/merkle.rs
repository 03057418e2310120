use blueblock_types::MerkleRoot;
use serde::Serialize;

use crate::hasher::HashAlgorithm;
use crate::json::to_leaf_json;
use crate::leaf::CanonicalLeaf;

/// Errors from Merkle construction.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("serialization error at item {index}: {reason}")]
    Serialization { index: usize, reason: String },
}

/// Deterministic binary Merkle root builder.
///
/// Construction:
/// - empty batch: the hash of the empty byte string;
/// - leaf: `H(canonical bytes)`;
/// - each level pairs digests left-to-right, duplicating the last digest when
///   the level has an odd count; parent = `H(left || right)`.
///
/// Because of the duplication rule, `[a, b, c]` and `[a, b, c, c]` share a
/// root. Changing that would invalidate every root already anchored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MerkleBuilder {
    algorithm: HashAlgorithm,
}

impl MerkleBuilder {
    pub const fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The fixed root of an empty batch.
    pub fn empty_root(&self) -> MerkleRoot {
        MerkleRoot::from_hash(self.algorithm.hash(b""))
    }

    /// Digest of one serialized item.
    pub fn leaf_digest(&self, item: &[u8]) -> [u8; 32] {
        self.algorithm.hash(item)
    }

    /// Digest of an interior node.
    pub fn parent_digest(&self, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        self.algorithm.hash_concat(left, right)
    }

    /// Build the root of an ordered batch.
    pub fn build_root<I>(&self, batch: I) -> MerkleRoot
    where
        I: IntoIterator,
        I::Item: CanonicalLeaf,
    {
        let leaves: Vec<[u8; 32]> = batch
            .into_iter()
            .map(|item| self.leaf_digest(item.canonical_bytes()))
            .collect();
        self.root_from_leaves(leaves)
    }

    /// Build the root of a batch of serializable records, hashing each
    /// record's compact JSON encoding (see [`to_leaf_json`]).
    pub fn build_root_json<T: Serialize>(&self, batch: &[T]) -> Result<MerkleRoot, MerkleError> {
        let leaves = self.json_leaves(batch)?;
        Ok(self.root_from_leaves(leaves))
    }

    /// Reduce pre-computed leaf digests to a root.
    pub fn root_from_leaves(&self, leaves: Vec<[u8; 32]>) -> MerkleRoot {
        if leaves.is_empty() {
            return self.empty_root();
        }

        let mut current = leaves;
        while current.len() > 1 {
            current = self.next_level(&current);
        }
        MerkleRoot::from_hash(current[0])
    }

    /// Every level of the reduction, leaves first and root last.
    ///
    /// Levels are recorded before odd-count padding, so a level's length is
    /// the number of distinct nodes at that height. An empty batch yields no
    /// levels.
    pub fn levels<I>(&self, batch: I) -> Vec<Vec<[u8; 32]>>
    where
        I: IntoIterator,
        I::Item: CanonicalLeaf,
    {
        let leaves: Vec<[u8; 32]> = batch
            .into_iter()
            .map(|item| self.leaf_digest(item.canonical_bytes()))
            .collect();
        if leaves.is_empty() {
            return Vec::new();
        }

        let mut levels = vec![leaves];
        while let Some(last) = levels.last().filter(|level| level.len() > 1) {
            let next = self.next_level(last);
            levels.push(next);
        }
        levels
    }

    fn next_level(&self, level: &[[u8; 32]]) -> Vec<[u8; 32]> {
        level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => self.parent_digest(left, right),
                // Odd node: paired with a duplicate of itself.
                [last] => self.parent_digest(last, last),
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect()
    }

    fn json_leaves<T: Serialize>(&self, batch: &[T]) -> Result<Vec<[u8; 32]>, MerkleError> {
        batch
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let encoded = to_leaf_json(item).map_err(|e| MerkleError::Serialization {
                    index,
                    reason: e.to_string(),
                })?;
                Ok(self.leaf_digest(&encoded))
            })
            .collect()
    }
}

/// Root of an ordered batch using SHA-256.
pub fn build_root<I>(batch: I) -> MerkleRoot
where
    I: IntoIterator,
    I::Item: CanonicalLeaf,
{
    MerkleBuilder::default().build_root(batch)
}

/// Root of a batch of serializable records using SHA-256 over compact JSON.
pub fn build_root_json<T: Serialize>(batch: &[T]) -> Result<MerkleRoot, MerkleError> {
    MerkleBuilder::default().build_root_json(batch)
}

/// SHA-256 of the empty byte string: the root of an empty batch.
pub fn empty_root() -> MerkleRoot {
    MerkleBuilder::default().empty_root()
}

/// Recompute a batch's SHA-256 root and compare it with an anchored one.
pub fn verify_batch<I>(batch: I, expected: &MerkleRoot) -> bool
where
    I: IntoIterator,
    I::Item: CanonicalLeaf,
{
    build_root(batch) == *expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sha2::{Digest, Sha256};

    fn sha(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn sha_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut joined = Vec::with_capacity(64);
        joined.extend_from_slice(left);
        joined.extend_from_slice(right);
        sha(&joined)
    }

    #[test]
    fn empty_batch_is_hash_of_empty_string() {
        let batch: Vec<Vec<u8>> = vec![];
        let root = build_root(batch);
        assert_eq!(
            root.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(root, empty_root());
    }

    #[test]
    fn single_item_root_is_its_leaf() {
        let root = build_root(["only"]);
        assert_eq!(*root.as_bytes(), sha(b"only"));
    }

    #[test]
    fn two_items_hash_concatenated_leaves() {
        let root = build_root(["a", "b"]);
        assert_eq!(*root.as_bytes(), sha_pair(&sha(b"a"), &sha(b"b")));
    }

    #[test]
    fn odd_count_duplicates_last_leaf() {
        let (a, b, c) = (sha(b"a"), sha(b"b"), sha(b"c"));
        let left = sha_pair(&a, &b);
        let right = sha_pair(&c, &c);
        let expected = sha_pair(&left, &right);

        assert_eq!(*build_root(["a", "b", "c"]).as_bytes(), expected);
    }

    #[test]
    fn duplicated_trailing_item_collides() {
        assert_eq!(build_root(["a", "b", "c"]), build_root(["a", "b", "c", "c"]));
    }

    #[test]
    fn order_matters() {
        assert_ne!(build_root(["a", "b"]), build_root(["b", "a"]));
        assert_ne!(build_root(["x", "y", "z"]), build_root(["z", "y", "x"]));
    }

    #[test]
    fn json_leaves_hash_compact_encoding() {
        let records = vec![
            serde_json::json!({"site_id": "site_001", "height": 45.2}),
            serde_json::json!({"site_id": "site_002", "height": 38.7}),
        ];
        let expected = build_root(
            records
                .iter()
                .map(|r| serde_json::to_vec(r).unwrap())
                .collect::<Vec<_>>(),
        );
        assert_eq!(build_root_json(&records).unwrap(), expected);
    }

    #[test]
    fn integral_float_leaves_match_stringified_form() {
        let records = vec![
            serde_json::json!({"site_id": "site_001", "height": 45.0}),
            serde_json::json!({"site_id": "site_002", "height": 38.5}),
        ];
        let stringified = [
            r#"{"site_id":"site_001","height":45}"#,
            r#"{"site_id":"site_002","height":38.5}"#,
        ];
        let root = build_root_json(&records).unwrap();
        assert_eq!(root, build_root(stringified));
        assert_eq!(
            root.to_hex(),
            "ef6d9487fd4acc814bdedc965d2e92a0840345135248b397cea0865d47fa5ec9"
        );
    }

    #[test]
    fn empty_json_batch_is_empty_root() {
        let records: Vec<serde_json::Value> = vec![];
        assert_eq!(build_root_json(&records).unwrap(), empty_root());
    }

    #[test]
    fn levels_end_at_root() {
        let builder = MerkleBuilder::default();
        let levels = builder.levels(["a", "b", "c", "d", "e"]);
        let sizes: Vec<usize> = levels.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![5, 3, 2, 1]);
        assert_eq!(
            levels.last().unwrap()[0],
            *builder.build_root(["a", "b", "c", "d", "e"]).as_bytes()
        );
    }

    #[test]
    fn levels_of_empty_batch_is_empty() {
        let batch: Vec<&str> = vec![];
        assert!(MerkleBuilder::default().levels(batch).is_empty());
    }

    #[test]
    fn blake3_builder_uses_blake3() {
        let builder = MerkleBuilder::new(HashAlgorithm::Blake3);
        assert_eq!(
            *builder.build_root(["only"]).as_bytes(),
            *blake3::hash(b"only").as_bytes()
        );
        assert_ne!(builder.build_root(["a", "b"]), build_root(["a", "b"]));
    }

    #[test]
    fn verify_batch_detects_tampering() {
        let root = build_root(["r1", "r2", "r3"]);
        assert!(verify_batch(["r1", "r2", "r3"], &root));
        assert!(!verify_batch(["r1", "r2", "rX"], &root));
        assert!(!verify_batch(["r1", "r2"], &root));
    }

    proptest! {
        #[test]
        fn root_is_deterministic(batch in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 0..40)) {
            prop_assert_eq!(build_root(&batch), build_root(&batch));
        }

        #[test]
        fn odd_padding_is_invisible(batch in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..8), 1..20)) {
            prop_assume!(batch.len() % 2 == 1 && batch.len() > 1);
            let mut padded = batch.clone();
            padded.push(batch[batch.len() - 1].clone());
            prop_assert_eq!(build_root(&batch), build_root(&padded));
        }

        #[test]
        fn swapping_distinct_neighbours_changes_root(
            batch in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..8), 2..20),
            at in any::<prop::sample::Index>(),
        ) {
            let i = at.index(batch.len() - 1);
            prop_assume!(batch[i] != batch[i + 1]);
            let mut swapped = batch.clone();
            swapped.swap(i, i + 1);
            prop_assert_ne!(build_root(&batch), build_root(&swapped));
        }
    }
}
