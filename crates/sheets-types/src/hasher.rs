use crate::object::ObjectId;

/// Domain-separated BLAKE3 hasher.
///
/// The domain tag is fed to the hasher ahead of the content, so objects of
/// different kinds never collide even when their bytes are equal.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for blob objects (record files, attachments).
    pub const BLOB: Self = Self::new("sheets-blob-v1");
    /// Hasher for tree objects.
    pub const TREE: Self = Self::new("sheets-tree-v1");
    /// Hasher for commit objects.
    pub const COMMIT: Self = Self::new("sheets-commit-v1");

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }

    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}
