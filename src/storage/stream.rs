use futures::stream::{BoxStream, StreamExt};

/// A lazily produced sequence of rows that can be cut into fixed-size partitions.
pub struct PartitionedStream<T> {
    inner: BoxStream<'static, T>,
}

impl<T: Send + 'static> PartitionedStream<T> {
    pub fn new(inner: BoxStream<'static, T>) -> Self {
        Self { inner }
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        Self::new(futures::stream::iter(items).boxed())
    }

    /// Groups rows into partitions of at most `size` (a size of 0 is treated as 1).
    pub fn partition(self, size: usize) -> BoxStream<'static, Vec<T>> {
        self.inner.chunks(size.max(1)).boxed()
    }

    pub fn into_inner(self) -> BoxStream<'static, T> {
        self.inner
    }
}
