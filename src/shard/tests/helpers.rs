use crate::buffer::{BufferView, MutableBuffer};
use crate::record::KeyValue;

pub type Rec = KeyValue<u64, u64>;

/// Builds a buffer view from `(key, value, tombstone)` triples appended
/// in order.
pub fn view_of(entries: &[(u64, u64, bool)]) -> BufferView<Rec> {
    let mut buffer = MutableBuffer::new(entries.len().max(1));
    for &(k, v, tombstone) in entries {
        buffer.append(KeyValue::new(k, v), tombstone).unwrap();
    }
    buffer.view()
}

/// Builds a view holding `(k, k)` for every key in `range`.
pub fn sequential_view(range: std::ops::Range<u64>) -> BufferView<Rec> {
    let entries: Vec<_> = range.map(|k| (k, k, false)).collect();
    view_of(&entries)
}
