//! Splits normalized contacts into upsert batches.

/// Contiguous groups of at most `size` items, in input order.
///
/// A zero `size` is treated as 1 so the iterator always makes progress.
pub fn batches<T>(items: &[T], size: usize) -> impl Iterator<Item = &[T]> {
    items.chunks(size.max(1)).filter(|chunk| !chunk.is_empty())
}
