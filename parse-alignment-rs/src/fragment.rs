use crate::alignment::{AlignmentRecord, AlignmentSource};
use anyhow::Result;

/// One read's alignment: the first mate, and the second mate when both aligned as a proper pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub first: AlignmentRecord,
    pub second: AlignmentRecord,
    pub paired: bool,
}

impl Fragment {
    pub fn name(&self) -> &str {
        &self.first.name
    }

    /// An empty name marks end of stream.
    pub fn is_valid(&self) -> bool {
        !self.first.name.is_empty()
    }

    pub fn second_mate(&self) -> Option<&AlignmentRecord> {
        self.paired.then_some(&self.second)
    }

    pub fn copy_from(&mut self, other: &Fragment) {
        self.first.copy_from(&other.first);
        self.second.copy_from(&other.second);
        self.paired = other.paired;
    }
}

/// Groups records into fragments with one fragment of lookahead.
///
/// The source must keep all records of one read contiguous (name-sorted or
/// aligner output order). This is not checked; unsorted input is silently
/// mis-grouped.
pub struct FragmentReader<S> {
    source: S,
    current: Fragment,
    next: Fragment,
}

impl<S: AlignmentSource> FragmentReader<S> {
    /// Wrap `source` and load the first fragment into the lookahead buffer.
    pub fn new(source: S) -> Result<Self> {
        let mut reader = Self {
            source,
            current: Fragment::default(),
            next: Fragment::default(),
        };
        reader.advance()?;
        Ok(reader)
    }

    /// Move the lookahead fragment into `current` and read the following one.
    ///
    /// Returns `false` once `current` is the end-of-stream sentinel. The last
    /// real fragment is still returned after the sentinel has been loaded
    /// into the lookahead.
    pub fn advance(&mut self) -> Result<bool> {
        std::mem::swap(&mut self.current, &mut self.next);
        let current_ok = self.current.is_valid();

        if !self.source.read_record(&mut self.next.first)? {
            self.next.first.clear();
            self.next.paired = false;
            return Ok(current_ok);
        }
        // Only proper pairs are grouped; the following record is taken as the mate.
        self.next.paired = self.next.first.flags.is_properly_segmented()
            && self.source.read_record(&mut self.next.second)?;
        Ok(current_ok)
    }

    pub fn current(&self) -> &Fragment {
        &self.current
    }

    pub fn next(&self) -> &Fragment {
        &self.next
    }

    /// True when `current` is the last fragment of its read.
    pub fn at_read_end(&self) -> bool {
        self.current.name() != self.next.name()
    }
}
