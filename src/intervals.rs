/// Interval collection with inclusive bounds based on sorted [Vec]s
///
/// Intervals may overlap. A point lookup returns the containing interval with the greatest start,
/// and among intervals sharing that start the one with the smallest end, so the narrowest of
/// nested intervals wins regardless of insertion order.
#[derive(Clone, Debug)]
pub struct IntervalVec<K, V> {
    starts: Vec<K>,
    ends: Vec<K>,
    // max_ends[i] is the largest end among the first i + 1 intervals
    max_ends: Vec<K>,
    values: Vec<V>,
}

impl<K, V> IntervalVec<K, V>
where
    K: Ord + Copy,
{
    pub fn new() -> Self {
        Self {
            starts: vec![],
            ends: vec![],
            max_ends: vec![],
            values: vec![],
        }
    }

    /// Build from `(start, end, value)` triples given in any order
    pub fn from_unsorted(mut items: Vec<(K, K, V)>) -> Self {
        // Equal starts go by descending end, so the backward scan in `position` meets the
        // narrowest one first
        items.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));

        let mut slf = Self {
            starts: Vec::with_capacity(items.len()),
            ends: Vec::with_capacity(items.len()),
            max_ends: Vec::with_capacity(items.len()),
            values: Vec::with_capacity(items.len()),
        };
        for (start, end, value) in items {
            let max_end = match slf.max_ends.last() {
                Some(&max_end) if max_end > end => max_end,
                _ => end,
            };
            slf.starts.push(start);
            slf.ends.push(end);
            slf.max_ends.push(max_end);
            slf.values.push(value);
        }
        slf
    }

    // Walks back over every interval starting between an enclosing wide interval and the key, so
    // a key in a gap behind one huge range and many narrow ones costs linear time. On disjoint
    // data the walk stops after one step.
    fn position(&self, key: K) -> Option<usize> {
        // intervals [0, upper) start at or before the key
        let upper = self.starts.partition_point(|&start| start <= key);
        (0..upper)
            .rev()
            .take_while(|&index| self.max_ends[index] >= key)
            .find(|&index| self.ends[index] >= key)
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.position(key).map(|index| &self.values[index])
    }

    pub fn contains(&self, key: K) -> bool {
        self.position(key).is_some()
    }

    /// Bounds and value of the interval containing the key
    pub fn get_entry(&self, key: K) -> Option<(K, K, &V)> {
        self.position(key)
            .map(|index| (self.starts[index], self.ends[index], &self.values[index]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, K, &V)> + '_ {
        self.starts
            .iter()
            .zip(self.ends.iter())
            .zip(self.values.iter())
            .map(|((&start, &end), value)| (start, end, value))
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }
}

impl<K, V> Default for IntervalVec<K, V>
where
    K: Ord + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, K, V)> for IntervalVec<K, V>
where
    K: Ord + Copy,
{
    fn from_iter<I: IntoIterator<Item = (K, K, V)>>(iter: I) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}
