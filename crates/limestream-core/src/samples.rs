//! IQ sample blocks.
//!
//! Samples are carried as interleaved `i16` components (`I0 Q0 I1 Q1 ...`).
//! The radio front-end converts 12 bits per component, so every component is
//! expected to lie in [`IQ_MIN`]`..=`[`IQ_MAX`]. The streaming engine does
//! not validate amplitudes; values outside the range are a caller contract
//! violation and are passed through unchanged.

/// Smallest representable 12-bit component value.
pub const IQ_MIN: i16 = -2048;

/// Largest representable 12-bit component value.
pub const IQ_MAX: i16 = 2047;

/// Whether every component of `iq` lies within the 12-bit range.
pub fn in_iq_range(iq: &[i16]) -> bool {
    iq.iter().all(|v| (IQ_MIN..=IQ_MAX).contains(v))
}

/// A contiguous run of IQ samples for one channel.
///
/// `timestamp` is the device sample-clock tick of the first sample. In
/// unsynchronized mode the value is a running sample counter and carries no
/// scheduling meaning.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleBlock {
    /// Device tick of the first sample.
    pub timestamp: u64,
    /// Interleaved I/Q components.
    pub iq: Vec<i16>,
}

impl SampleBlock {
    /// Create a new block. A trailing unpaired component is dropped.
    pub fn new(timestamp: u64, mut iq: Vec<i16>) -> Self {
        if iq.len() % 2 != 0 {
            iq.pop();
        }
        SampleBlock { timestamp, iq }
    }

    /// An empty block stamped with `timestamp`.
    pub fn empty(timestamp: u64) -> Self {
        SampleBlock {
            timestamp,
            iq: Vec::new(),
        }
    }

    /// Number of IQ samples (component pairs) in the block.
    pub fn len(&self) -> usize {
        self.iq.len() / 2
    }

    /// Whether the block holds no samples.
    pub fn is_empty(&self) -> bool {
        self.iq.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_len_counts_pairs() {
        let block = SampleBlock::new(1000, vec![1, -1, 2, -2, 3, -3]);
        assert_eq!(block.len(), 3);
        assert_eq!(block.timestamp, 1000);
        assert!(!block.is_empty());
    }

    #[test]
    fn block_drops_unpaired_component() {
        let block = SampleBlock::new(0, vec![5, 6, 7]);
        assert_eq!(block.iq, vec![5, 6]);
        assert_eq!(block.len(), 1);
    }

    #[test]
    fn empty_block() {
        let block = SampleBlock::empty(42);
        assert!(block.is_empty());
        assert_eq!(block.len(), 0);
        assert_eq!(block.timestamp, 42);
    }

    #[test]
    fn range_check() {
        assert!(in_iq_range(&[IQ_MIN, IQ_MAX, 0]));
        assert!(!in_iq_range(&[2048]));
        assert!(!in_iq_range(&[-2049]));
    }
}
