use crate::fragment::Fragment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Both mates aligned as a proper pair.
    PairedAligned,
    /// First mate aligned on its own; the second is unmapped or absent.
    HalfPairFirstMate,
    /// Second mate aligned on its own.
    HalfPairSecondMate,
    /// Flagged as paired but neither the first nor the last segment bit is set.
    WeirdHalfPair,
    SingleEndAligned,
    Unmapped,
}

impl Classification {
    pub fn is_mapped(self) -> bool {
        self != Classification::Unmapped
    }
}

/// Classify a fragment from the flags of its first mate and its pairing state.
pub fn classify(fragment: &Fragment) -> Classification {
    let flags = fragment.first.flags;
    if flags.is_unmapped() {
        Classification::Unmapped
    } else if fragment.paired {
        Classification::PairedAligned
    } else if flags.is_segmented() {
        if flags.is_first_segment() {
            Classification::HalfPairFirstMate
        } else if flags.is_last_segment() {
            Classification::HalfPairSecondMate
        } else {
            Classification::WeirdHalfPair
        }
    } else {
        Classification::SingleEndAligned
    }
}

/// Mapped-alignment tallies by category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    pub paired: u64,
    pub first: u64,
    pub second: u64,
    pub weird: u64,
    pub single: u64,
}

impl CategoryCounts {
    pub fn record(&mut self, class: Classification) {
        match class {
            Classification::PairedAligned => self.paired += 1,
            Classification::HalfPairFirstMate => self.first += 1,
            Classification::HalfPairSecondMate => self.second += 1,
            Classification::WeirdHalfPair => self.weird += 1,
            Classification::SingleEndAligned => self.single += 1,
            Classification::Unmapped => {}
        }
    }

    pub fn half_pairs(&self) -> u64 {
        self.first + self.second + self.weird
    }

    pub fn total(&self) -> u64 {
        self.paired + self.half_pairs() + self.single
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
