//! parse-alignment-rs: pre-compute per-alignment probabilities of reads aligned to a transcriptome.
//!
//! # Library usage
//!
//! ```no_run
//! use parse_alignment_rs::{count_and_train, assign_probabilities, Interrupt, PipelineConfig};
//! use parse_alignment_rs::bam_input::{AlignmentReader, InputFormat};
//! use parse_alignment_rs::model::{ModelConfig, ReadDistribution, ReadModel};
//! use parse_alignment_rs::output::ProbabilityWriter;
//! use parse_alignment_rs::transcript_info::TranscriptInfo;
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let path = Path::new("reads.bam");
//! let mut input = AlignmentReader::open(path, InputFormat::Bam, 1)?;
//! let info = TranscriptInfo::from_references(input.reference_sequences());
//! let mut model = ReadDistribution::new(info.lengths(), &ModelConfig::default())?;
//! let config = PipelineConfig { max_alignments: 100, train: true, track_failed: false };
//! let interrupt = Interrupt::new();
//!
//! let pass_one = count_and_train(&mut input, &mut model, &config, &interrupt)?;
//! model.normalize();
//!
//! let mut writer = ProbabilityWriter::create(Path::new("reads.prob"))?;
//! writer.write_header(pass_one.stats.n_total, pass_one.stats.n_map)?;
//! let mut input = input.reopen()?;
//! assign_probabilities(&mut input, &mut model, &pass_one.ignored, &config, &mut writer, &interrupt, 0)?;
//! writer.finish()?;
//! # Ok(())
//! # }
//! ```

pub mod alignment;
pub mod bam_input;
pub mod classify;
pub mod cli;
pub mod fasta;
pub mod fragment;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod transcript_info;
pub(crate) mod types;

// Flat re-exports for the most commonly used public types.
pub use alignment::{AlignmentRecord, AlignmentSource, VecSource};
pub use classify::{classify, CategoryCounts, Classification};
pub use fragment::{Fragment, FragmentReader};
pub use model::{AlignmentProbability, ReadModel};
pub use output::TagAlignment;
pub use pipeline::{
    assign_probabilities, count_and_train, IgnoreSet, Interrupt, PipelineConfig, PassOneStats,
    PassTwoStats,
};
pub use types::TrId;
