/// Canonical byte serialization of one batch item.
///
/// A leaf digest is the hash of exactly these bytes, so two items that are
/// meant to commit identically must return identical bytes. Implementations
/// must be deterministic and must not depend on in-memory layout.
pub trait CanonicalLeaf {
    fn canonical_bytes(&self) -> &[u8];
}

impl CanonicalLeaf for [u8] {
    fn canonical_bytes(&self) -> &[u8] {
        self
    }
}

impl<const N: usize> CanonicalLeaf for [u8; N] {
    fn canonical_bytes(&self) -> &[u8] {
        self
    }
}

impl CanonicalLeaf for Vec<u8> {
    fn canonical_bytes(&self) -> &[u8] {
        self
    }
}

/// Strings commit as their UTF-8 bytes.
impl CanonicalLeaf for str {
    fn canonical_bytes(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl CanonicalLeaf for String {
    fn canonical_bytes(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl<T: CanonicalLeaf + ?Sized> CanonicalLeaf for &T {
    fn canonical_bytes(&self) -> &[u8] {
        (**self).canonical_bytes()
    }
}
