//! Offset maps between expansion output and the invocation body

use serde::{Deserialize, Serialize};

/// `len` bytes at `output` in the expansion are a copy of `len` bytes at
/// `source` in the invocation body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedRange {
    /// Offset in the invocation body
    pub source: u32,
    /// Offset in the expansion text
    pub output: u32,
    /// Length in bytes
    pub len: u32,
}

impl MappedRange {
    /// Creates a range
    pub const fn new(source: u32, output: u32, len: u32) -> Self {
        Self { source, output, len }
    }

    /// Exclusive end in the invocation body
    pub const fn source_end(&self) -> u32 {
        self.source + self.len
    }

    /// Exclusive end in the expansion text
    pub const fn output_end(&self) -> u32 {
        self.output + self.len
    }
}

/// Sorted, non-overlapping output ranges with their call-site origin
///
/// Output offsets not covered by any range come from the definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeMap {
    ranges: Vec<MappedRange>,
}

impl RangeMap {
    /// Creates an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `range`, extending the last range when both sides continue it
    ///
    /// Ranges separated by the same single byte on both sides are merged
    /// too: the renderer only ever inserts one space, and a one-byte gap
    /// in the call body can only be whitespace.
    pub fn merge_add(&mut self, range: MappedRange) {
        if range.len == 0 {
            return;
        }
        let Some(last) = self.ranges.last_mut() else {
            self.ranges.push(range);
            return;
        };
        let source_gap = range.source.checked_sub(last.source_end());
        let output_gap = range.output.checked_sub(last.output_end());
        match (source_gap, output_gap) {
            (Some(source_gap), Some(output_gap)) if source_gap == output_gap && source_gap <= 1 => {
                last.len = range.output_end() - last.output;
            }
            _ => self.ranges.push(range),
        }
    }

    /// All ranges in output order
    pub fn ranges(&self) -> &[MappedRange] {
        &self.ranges
    }

    /// Whether nothing in the output maps to the call site
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Call-site offset of an output offset
    pub fn map_to_source(&self, offset: u32) -> Option<u32> {
        self.ranges
            .iter()
            .find(|range| range.output <= offset && offset < range.output_end())
            .map(|range| range.source + (offset - range.output))
    }

    /// Every output offset that copies the call-site offset `offset`
    ///
    /// A capture used twice in the template maps to two places.
    pub fn map_to_output(&self, offset: u32) -> Vec<u32> {
        self.ranges
            .iter()
            .filter(|range| range.source <= offset && offset < range.source_end())
            .map(|range| range.output + (offset - range.source))
            .collect()
    }

    /// Same map with every call-site offset moved by `delta`
    ///
    /// Used when a cached expansion is reused for a call whose body starts
    /// elsewhere but has the same text.
    #[must_use]
    pub fn shifted_source(&self, delta: i64) -> Self {
        let ranges = self
            .ranges
            .iter()
            .map(|range| MappedRange {
                source: (i64::from(range.source) + delta).max(0) as u32,
                ..*range
            })
            .collect();
        Self { ranges }
    }

    /// Ranges whose text differs between `source` and `output`
    pub fn mismatches<'map>(&'map self, source: &'map str, output: &'map str) -> impl Iterator<Item = MappedRange> + 'map {
        self.ranges.iter().copied().filter(move |range| {
            let from = source.get(range.source as usize..range.source_end() as usize);
            let to = output.get(range.output as usize..range.output_end() as usize);
            from.is_none() || from != to
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_add_joins_contiguous_runs() {
        let mut map = RangeMap::new();
        map.merge_add(MappedRange::new(0, 10, 3));
        map.merge_add(MappedRange::new(3, 13, 2));
        map.merge_add(MappedRange::new(6, 16, 1));
        // Different gap on each side
        map.merge_add(MappedRange::new(9, 18, 1));
        map.merge_add(MappedRange::new(10, 19, 0));
        assert_eq!(map.ranges(), &[MappedRange::new(0, 10, 7), MappedRange::new(9, 18, 1)]);
    }

    #[test]
    fn test_map_both_directions() {
        let mut map = RangeMap::new();
        map.merge_add(MappedRange::new(4, 0, 3));
        map.merge_add(MappedRange::new(4, 10, 3));
        assert_eq!(map.map_to_source(1), Some(5));
        assert_eq!(map.map_to_source(5), None);
        assert_eq!(map.map_to_output(6), vec![2, 12]);
        assert_eq!(map.shifted_source(-4).map_to_source(11), Some(1));
    }

    #[test]
    fn test_mismatches() {
        let mut map = RangeMap::new();
        map.merge_add(MappedRange::new(0, 3, 3));
        assert_eq!(map.mismatches("abc", "fn abc").count(), 0);
        assert_eq!(map.mismatches("abd", "fn abc").count(), 1);
    }
}
