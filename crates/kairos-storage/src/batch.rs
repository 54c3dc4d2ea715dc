//! Write batch for atomic operations.

/// A single batch operation.
#[derive(Debug, Clone)]
pub struct BatchOperation {
    /// Key to write.
    pub key: Vec<u8>,
    /// Value to write.
    pub value: Vec<u8>,
}

/// A batch of put operations to be executed atomically.
#[derive(Debug, Default)]
pub struct WriteBatch {
    /// Collected operations.
    pub(crate) operations: Vec<BatchOperation>,
}

impl WriteBatch {
    /// Create a new empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a batch with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            operations: Vec::with_capacity(capacity),
        }
    }

    /// Add a put operation to the batch.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.operations.push(BatchOperation {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Get the number of operations in the batch.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Iterate over the queued operations.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.operations
            .iter()
            .map(|op| (op.key.as_slice(), op.value.as_slice()))
    }
}
