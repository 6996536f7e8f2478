use crate::foundation::Hash32;

/// Helper to build storage keys consistently.
pub struct KeyBuilder {
    buf: Vec<u8>,
}

impl KeyBuilder {
    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: Vec::with_capacity(cap) }
    }

    pub fn prefix(mut self, prefix: &[u8]) -> Self {
        self.buf.extend_from_slice(prefix);
        self
    }

    pub fn hash32(mut self, hash: &Hash32) -> Self {
        self.buf.extend_from_slice(hash);
        self
    }

    pub fn str(mut self, value: &str) -> Self {
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn u32_be(mut self, value: u32) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

pub const CF_METADATA: &str = "metadata";
pub const CF_RESOURCE: &str = "resource";
pub const CF_PENDING: &str = "pending";
pub const CF_POINTER: &str = "pointer";

pub const ALL_COLUMN_FAMILIES: &[&str] = &[CF_METADATA, CF_RESOURCE, CF_PENDING, CF_POINTER];
