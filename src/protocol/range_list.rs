use anyhow::bail;

use crate::protocol::bit_stream::{BitReader, BitWriter};

/// A closed interval `[min, max]` of sequence numbers.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Range {
    pub min: i32,
    pub max: i32,
}

impl Range {
    pub fn new(min: i32, max: i32) -> Range {
        Range { min, max }
    }

    fn singleton(n: i32) -> Range {
        Range { min: n, max: n }
    }

    pub fn contains(&self, n: i32) -> bool {
        n >= self.min && n <= self.max
    }
}

/// A set of sequence numbers, stored as a minimal list of closed ranges so
///  that sparse sets (e.g. acknowledged packet numbers) serialize to few
///  bytes.
///
/// Invariant: ranges are sorted by `min`, pairwise non-overlapping and
///  non-adjacent - two ranges with `prev.max + 1 == curr.min` are merged
///  into one.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RangeList {
    ranges: Vec<Range>,
}

impl RangeList {
    pub fn new() -> RangeList {
        RangeList { ranges: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// number of ranges (not the number of covered values)
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn contains(&self, n: i32) -> bool {
        self.ranges.iter().any(|r| r.contains(n))
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn add(&mut self, n: i32) {
        for i in 0..self.ranges.len() {
            let range = &mut self.ranges[i];
            if range.contains(n) {
                return;
            }
            if range.min.checked_sub(1) == Some(n) {
                range.min = n;
                self.normalize();
                return;
            }
            if range.max.checked_add(1) == Some(n) {
                range.max = n;
                self.normalize();
                return;
            }
        }
        self.ranges.push(Range::singleton(n));
    }

    /// Restores the invariant after an extension made two ranges overlap or
    ///  become adjacent: sort by `min`, then fold in a single forward pass
    ///  into a fresh list.
    fn normalize(&mut self) {
        if self.ranges.len() < 2 {
            return;
        }
        self.ranges.sort_by_key(|r| r.min);

        let mut folded: Vec<Range> = Vec::with_capacity(self.ranges.len());
        for range in self.ranges.drain(..) {
            match folded.last_mut() {
                Some(prev) if i64::from(prev.max) + 1 >= i64::from(range.min) => {
                    prev.max = prev.max.max(range.max);
                }
                _ => folded.push(range),
            }
        }
        self.ranges = folded;
    }

    /// full membership of the set, ascending
    pub fn to_vec(&self) -> Vec<i32> {
        let mut result = Vec::new();
        for range in &self.ranges {
            result.extend(range.min..=range.max);
        }
        result.sort_unstable();
        result
    }

    /// Wire format: compressed-u16 range count, then per range one bit
    ///  flagging a singleton, the min, and the max only for non-singletons.
    pub fn serialize(&self, writer: &mut BitWriter) -> anyhow::Result<()> {
        if self.ranges.len() > usize::from(u16::MAX) {
            bail!("range list with {} ranges exceeds wire format limit", self.ranges.len());
        }
        writer.write_compressed_u16(self.ranges.len() as u16);

        for range in &self.ranges {
            writer.write_bit(range.min == range.max);
            writer.write_i32(range.min);
            if range.min != range.max {
                writer.write_i32(range.max);
            }
        }
        Ok(())
    }

    pub fn deserialize(reader: &mut BitReader) -> anyhow::Result<RangeList> {
        let count = reader.read_compressed_u16()?;

        let mut result = RangeList::new();
        for _ in 0..count {
            let is_singleton = reader.read_bit()?;
            let min = reader.read_i32()?;
            let max = if is_singleton { min } else { reader.read_i32()? };
            if max < min {
                bail!("invalid range [{}, {}] in serialized range list", min, max);
            }
            result.ranges.push(Range::new(min, max));
        }

        // wire order carries no semantics - re-establish the invariant
        result.normalize();
        Ok(result)
    }
}
