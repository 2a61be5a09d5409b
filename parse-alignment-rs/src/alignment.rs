use anyhow::Result;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::RecordBuf;
use std::collections::VecDeque;

/// The fields of one alignment record that the pipeline and the read model consume.
///
/// Records are filled in place by an [`AlignmentSource`] so the name buffer is
/// reused from one record to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentRecord {
    pub name: String,
    pub flags: Flags,
    /// 0-based reference (transcript) index.
    pub ref_id: Option<usize>,
    /// 1-based, inclusive alignment start on the transcript.
    pub start: Option<u32>,
    /// 1-based, inclusive alignment end on the transcript.
    pub end: Option<u32>,
    pub template_length: i32,
    pub read_len: usize,
    /// Edit distance (`NM` tag).
    pub mismatches: Option<u32>,
    /// Mean phred base quality; `None` when qualities are absent.
    pub mean_quality: Option<f64>,
}

impl AlignmentRecord {
    /// Marks the end-of-stream sentinel.
    pub fn clear(&mut self) {
        self.name.clear();
        self.flags = Flags::empty();
        self.ref_id = None;
        self.start = None;
        self.end = None;
        self.template_length = 0;
        self.read_len = 0;
        self.mismatches = None;
        self.mean_quality = None;
    }

    /// Copy `other` into `self` without giving up `self`'s name allocation.
    pub fn copy_from(&mut self, other: &AlignmentRecord) {
        self.name.clear();
        self.name.push_str(&other.name);
        self.flags = other.flags;
        self.ref_id = other.ref_id;
        self.start = other.start;
        self.end = other.end;
        self.template_length = other.template_length;
        self.read_len = other.read_len;
        self.mismatches = other.mismatches;
        self.mean_quality = other.mean_quality;
    }

    /// Refill from a decoded SAM/BAM record.
    pub fn fill_from(&mut self, record: &RecordBuf) {
        self.name.clear();
        match record.name() {
            Some(name) => self
                .name
                .push_str(&String::from_utf8_lossy(<_ as AsRef<[u8]>>::as_ref(name))),
            // `*` QNAME. The empty name is reserved for end of stream.
            None => self.name.push('*'),
        }
        self.flags = record.flags();
        self.ref_id = record.reference_sequence_id();
        self.start = record.alignment_start().map(|p| p.get() as u32);
        self.end = record.alignment_end().map(|p| p.get() as u32);
        self.template_length = record.template_length();
        self.read_len = record.sequence().len();
        self.mismatches = record
            .data()
            .get(&Tag::EDIT_DISTANCE)
            .and_then(|v| v.as_int())
            .and_then(|n| u32::try_from(n).ok());
        let quals: &[u8] = record.quality_scores().as_ref();
        self.mean_quality = if quals.is_empty() || quals.iter().all(|&q| q == 0xff) {
            None
        } else {
            let sum: u64 = quals.iter().map(|&q| u64::from(q)).sum();
            Some(sum as f64 / quals.len() as f64)
        };
    }
}

/// A stream of alignment records ordered so that all records of one read are contiguous.
pub trait AlignmentSource {
    /// Read the next record into `record`. Returns `Ok(false)` at end of stream.
    fn read_record(&mut self, record: &mut AlignmentRecord) -> Result<bool>;
}

impl<S: AlignmentSource + ?Sized> AlignmentSource for &mut S {
    fn read_record(&mut self, record: &mut AlignmentRecord) -> Result<bool> {
        (**self).read_record(record)
    }
}

/// In-memory source, used when records were produced by something other than a file reader.
#[derive(Debug, Default, Clone)]
pub struct VecSource {
    records: VecDeque<AlignmentRecord>,
}

impl VecSource {
    pub fn new(records: Vec<AlignmentRecord>) -> Self {
        Self { records: records.into() }
    }
}

impl AlignmentSource for VecSource {
    fn read_record(&mut self, record: &mut AlignmentRecord) -> Result<bool> {
        match self.records.pop_front() {
            Some(next) => {
                record.copy_from(&next);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
