use num_bigint::BigUint;

/// Every concrete integer consistent with a vector's unknown mask.
///
/// The sequence is finite and restartable: calling
/// [`BitVec::values`](super::BitVec::values) again starts over. Values are
/// produced in increasing order of the assignment to the unknown positions.
#[derive(Debug, Clone)]
pub struct Values {
    base: BigUint,
    positions: Vec<usize>,
    next: u64,
    end: u64,
}

impl Values {
    pub(super) fn new(value: &BigUint, mask: &BigUint, width: usize) -> Self {
        let positions: Vec<usize> = (0..width).filter(|&i| mask.bit(i as u64)).collect();
        assert!(
            positions.len() < 64,
            "values(): cannot enumerate {} unknown bits",
            positions.len()
        );
        Self {
            base: value.clone(),
            end: 1u64 << positions.len(),
            positions,
            next: 0,
        }
    }

    /// Number of concrete values in the whole sequence.
    pub fn total(&self) -> u64 {
        self.end
    }
}

impl Iterator for Values {
    type Item = BigUint;

    fn next(&mut self) -> Option<BigUint> {
        if self.next >= self.end {
            return None;
        }
        let combination = self.next;
        self.next += 1;

        let mut value = self.base.clone();
        for (i, &pos) in self.positions.iter().enumerate() {
            if combination >> i & 1 == 1 {
                value.set_bit(pos as u64, true);
            }
        }
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Values {}
