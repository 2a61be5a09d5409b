#![allow(dead_code)]
//! Record builders and a deterministic read model shared by the integration tests.

use noodles::sam::alignment::record::Flags;
use parse_alignment_rs::{
    assign_probabilities, count_and_train, AlignmentProbability, AlignmentRecord, Fragment,
    Interrupt, PipelineConfig, ReadModel, VecSource,
};
use parse_alignment_rs::output::ProbabilityWriter;
use parse_alignment_rs::pipeline::{PassOne, PassTwo};
use std::collections::HashSet;

pub const READ_LEN: usize = 50;

fn mapped(name: &str, flags: Flags, ref_id: usize, start: u32) -> AlignmentRecord {
    AlignmentRecord {
        name: name.to_string(),
        flags,
        ref_id: Some(ref_id),
        start: Some(start),
        end: Some(start + READ_LEN as u32 - 1),
        template_length: 0,
        read_len: READ_LEN,
        mismatches: Some(0),
        mean_quality: None,
    }
}

pub fn single(name: &str, ref_id: usize, start: u32) -> AlignmentRecord {
    mapped(name, Flags::empty(), ref_id, start)
}

pub fn unmapped(name: &str) -> AlignmentRecord {
    AlignmentRecord {
        name: name.to_string(),
        flags: Flags::UNMAPPED,
        read_len: READ_LEN,
        ..Default::default()
    }
}

/// Both mates of a proper pair, first mate first.
pub fn pair(name: &str, ref_id: usize, start1: u32, start2: u32) -> Vec<AlignmentRecord> {
    let base = Flags::SEGMENTED | Flags::PROPERLY_SEGMENTED;
    let mut first = mapped(name, base | Flags::FIRST_SEGMENT, ref_id, start1);
    let mut second = mapped(name, base | Flags::LAST_SEGMENT | Flags::REVERSE_COMPLEMENTED, ref_id, start2);
    let tlen = (start2 + READ_LEN as u32) as i32 - start1 as i32;
    first.template_length = tlen;
    second.template_length = -tlen;
    vec![first, second]
}

/// One mate of a pair aligned on its own.
pub fn half(name: &str, ref_id: usize, start: u32, first_mate: bool) -> AlignmentRecord {
    let segment = if first_mate { Flags::FIRST_SEGMENT } else { Flags::LAST_SEGMENT };
    mapped(name, Flags::SEGMENTED | Flags::MATE_UNMAPPED | segment, ref_id, start)
}

/// Paired flag without either mate bit.
pub fn weird_half(name: &str, ref_id: usize, start: u32) -> AlignmentRecord {
    mapped(name, Flags::SEGMENTED | Flags::MATE_UNMAPPED, ref_id, start)
}

/// Scores alignment to reference `i` as `ln p = -1 - i`, noise `-20 + i`.
/// Alignments to references in `failing` cannot be scored.
#[derive(Debug, Default)]
pub struct StubModel {
    pub failing: HashSet<usize>,
    pub observed: Vec<Fragment>,
    pub normalized: bool,
    pub scored: Vec<String>,
}

impl StubModel {
    pub fn failing_on(refs: &[usize]) -> Self {
        Self {
            failing: refs.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn observed_names(&self) -> Vec<&str> {
        self.observed.iter().map(|f| f.name()).collect()
    }
}

impl ReadModel for StubModel {
    fn observe(&mut self, fragment: &Fragment) {
        self.observed.push(fragment.clone());
    }

    fn normalize(&mut self) {
        self.normalized = true;
    }

    fn probability(&mut self, fragment: &Fragment) -> Option<AlignmentProbability> {
        self.scored.push(fragment.name().to_string());
        let id = fragment.first.ref_id?;
        if self.failing.contains(&id) {
            return None;
        }
        Some(AlignmentProbability {
            prob: -1.0 - id as f64,
            noise: -20.0 + id as f64,
        })
    }

    fn effective_lengths(&self) -> Vec<f64> {
        Vec::new()
    }
}

pub fn config(max_alignments: u64) -> PipelineConfig {
    PipelineConfig {
        max_alignments,
        train: true,
        track_failed: true,
    }
}

pub struct Run {
    pub pass_one: PassOne,
    pub pass_two: PassTwo,
    pub output: String,
}

impl Run {
    /// Read lines of the probability file, without the header.
    pub fn lines(&self) -> Vec<&str> {
        self.output.lines().filter(|l| !l.starts_with('#')).collect()
    }
}

/// Run pass 1, normalize, then pass 2 into an in-memory buffer.
pub fn run_both(records: &[AlignmentRecord], model: &mut StubModel, config: &PipelineConfig) -> Run {
    let interrupt = Interrupt::new();
    let pass_one = count_and_train(VecSource::new(records.to_vec()), model, config, &interrupt)
        .expect("pass 1");
    model.normalize();
    let mut writer = ProbabilityWriter::new(Vec::new());
    writer
        .write_header(pass_one.stats.n_total, pass_one.stats.n_map)
        .expect("header");
    let pass_two = assign_probabilities(
        VecSource::new(records.to_vec()),
        model,
        &pass_one.ignored,
        config,
        &mut writer,
        &interrupt,
        pass_one.stats.n_total,
    )
    .expect("pass 2");
    let output = String::from_utf8(writer.finish().expect("flush")).expect("utf8");
    Run { pass_one, pass_two, output }
}
