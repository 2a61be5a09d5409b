//! Two-pass alignment probability pipeline.
//!
//! Pass 1 counts reads, trains the read model on uniquely aligned reads and
//! collects reads with too many alignments. Pass 2 re-streams the same input
//! and writes one probability line per read.

use crate::alignment::AlignmentSource;
use crate::bam_input::{self, AlignmentReader};
use crate::classify::{classify, CategoryCounts};
use crate::cli::Args;
use crate::fasta::TranscriptSequence;
use crate::fragment::{Fragment, FragmentReader};
use crate::model::{ModelConfig, ReadDistribution, ReadModel};
use crate::output::{self, ProbabilityWriter, TagAlignment};
use crate::transcript_info::{InfoWritten, TranscriptInfo};
use crate::types::{HashSet, HashSetExt, TrId};
use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, polled once per fragment.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<()> {
        if self.is_triggered() {
            bail!("interrupted");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Reads with more alignments than this are skipped; 0 disables the limit.
    pub max_alignments: u64,
    /// Feed uniquely aligned reads to the model in pass 1.
    pub train: bool,
    /// Collect names of reads without a usable alignment in pass 2.
    pub track_failed: bool,
}

/// Read names excluded from pass 2. Built by pass 1 and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    names: HashSet<String>,
}

impl IgnoreSet {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<String> for IgnoreSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut names = HashSet::new();
        names.extend(iter);
        Self { names }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassOneStats {
    pub fragments: u64,
    /// Reads seen (Ntotal).
    pub n_total: u64,
    /// Reads with at least one mapped alignment and not ignored (Nmap).
    pub n_map: u64,
    pub counts: CategoryCounts,
    /// Reads submitted to the model.
    pub observed: u64,
    /// Paired reads where neither mate bit is set.
    pub reads_without_end_info: u64,
    /// Reads reported both as a proper pair and as single-end.
    pub reads_paired_and_single: u64,
}

#[derive(Debug, Default)]
pub struct PassOne {
    pub stats: PassOneStats,
    pub ignored: IgnoreSet,
}

/// Pass 1: count reads and alignment categories, train `model`, build the ignore set.
pub fn count_and_train<S, M>(
    source: S,
    model: &mut M,
    config: &PipelineConfig,
    interrupt: &Interrupt,
) -> Result<PassOne>
where
    S: AlignmentSource,
    M: ReadModel + ?Sized,
{
    let mut reader = FragmentReader::new(source)?;
    let mut stats = PassOneStats::default();
    let mut ignored: Vec<String> = Vec::new();
    let mut read_counts = CategoryCounts::default();
    // The read's first mapped fragment; it is the training fragment when the read turns out unique.
    let mut unique = Fragment::default();

    while reader.advance()? {
        interrupt.check()?;
        let fragment = reader.current();
        stats.fragments += 1;

        let class = classify(fragment);
        if class.is_mapped() {
            read_counts.record(class);
            stats.counts.record(class);
            if read_counts.total() == 1 {
                unique.copy_from(fragment);
            }
        }

        if !reader.at_read_end() {
            continue;
        }
        stats.n_total += 1;
        let all = read_counts.total();
        if all == 0 {
            continue;
        }
        stats.n_map += 1;
        if read_counts.weird > 0 {
            stats.reads_without_end_info += 1;
        }
        if read_counts.single > 0 && read_counts.paired > 0 {
            stats.reads_paired_and_single += 1;
        }
        if all == 1 {
            if config.train {
                model.observe(&unique);
                stats.observed += 1;
            }
        } else if config.max_alignments > 0 && all > config.max_alignments {
            ignored.push(fragment.name().to_string());
            stats.n_map -= 1;
        }
        read_counts.reset();
    }

    Ok(PassOne {
        stats,
        ignored: ignored.into_iter().collect(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassTwoStats {
    pub reads: u64,
    /// Alignments that were scored, by category.
    pub counts: CategoryCounts,
    /// Alignments the model could not score.
    pub invalid: u64,
    /// Reads without any mapped alignment.
    pub no_alignment: u64,
    pub ignored_reads: u64,
    /// Lines written to the probability file.
    pub lines: u64,
}

#[derive(Debug, Default)]
pub struct PassTwo {
    pub stats: PassTwoStats,
    pub failed: BTreeSet<String>,
}

struct Progress {
    total: u64,
    next_percent: u64,
}

impl Progress {
    fn new(total: u64) -> Self {
        Self { total, next_percent: 10 }
    }

    fn update(&mut self, done: u64) {
        if self.total == 0 || self.next_percent > 100 {
            return;
        }
        let percent = done.saturating_mul(100) / self.total;
        if percent >= self.next_percent {
            tracing::info!(reads = done, "{}% of reads processed", percent.min(100));
            self.next_percent = (percent / 10 + 1) * 10;
        }
    }
}

/// Pass 2: score every alignment of every non-ignored read and write one line per read.
///
/// `expected_reads` is only used for progress reporting.
pub fn assign_probabilities<S, M, W>(
    source: S,
    model: &mut M,
    ignored: &IgnoreSet,
    config: &PipelineConfig,
    writer: &mut ProbabilityWriter<W>,
    interrupt: &Interrupt,
    expected_reads: u64,
) -> Result<PassTwo>
where
    S: AlignmentSource,
    M: ReadModel + ?Sized,
    W: Write,
{
    let mut reader = FragmentReader::new(source)?;
    let mut stats = PassTwoStats::default();
    let mut failed = BTreeSet::new();
    let mut alignments: Vec<TagAlignment> = Vec::new();
    let mut had_invalid = false;
    let mut progress = Progress::new(expected_reads);
    let lines_before = writer.lines();

    while reader.advance()? {
        interrupt.check()?;

        if ignored.contains(reader.current().name()) {
            while !reader.at_read_end() {
                interrupt.check()?;
                if !reader.advance()? {
                    break;
                }
            }
            stats.reads += 1;
            stats.ignored_reads += 1;
            progress.update(stats.reads);
            continue;
        }

        let fragment = reader.current();
        let class = classify(fragment);
        if class.is_mapped() {
            match model.probability(fragment) {
                Some(p) => {
                    alignments.push(TagAlignment {
                        tr_id: fragment.first.ref_id.map_or(0, |id| id as TrId + 1),
                        prob: p.prob,
                        noise: p.noise,
                    });
                    stats.counts.record(class);
                }
                None => {
                    stats.invalid += 1;
                    had_invalid = true;
                }
            }
        }

        if !reader.at_read_end() {
            continue;
        }
        stats.reads += 1;
        progress.update(stats.reads);
        let name = fragment.name();
        if !alignments.is_empty() {
            writer.write_read(name, &alignments)?;
            alignments.clear();
        } else {
            if had_invalid {
                // Keeps the number of lines equal to Nmap.
                writer.write_placeholder(name)?;
            } else {
                stats.no_alignment += 1;
            }
            if config.track_failed {
                failed.insert(name.to_string());
                if let Some(second) = fragment.second_mate() {
                    failed.insert(second.name.clone());
                }
            }
        }
        had_invalid = false;
    }

    stats.lines = writer.lines() - lines_before;
    Ok(PassTwo { stats, failed })
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub pass_one: PassOneStats,
    pub pass_two: PassTwoStats,
    pub ignored: usize,
}

/// Transcript information from the alignment header, or from `--trInfoFile` when the header has none.
///
/// In the second case the loaded transcripts also become the reader's reference dictionary.
pub fn initialize_transcript_info(args: &Args, reader: &mut AlignmentReader) -> Result<TranscriptInfo> {
    let refs = reader.reference_sequences();
    if !refs.is_empty() {
        tracing::debug!(transcripts = refs.len(), "using alignment header for transcript information");
        return Ok(TranscriptInfo::from_references(refs));
    }
    let Some(path) = &args.tr_info_file else {
        bail!(
            "alignment file does not contain a header, or the header is empty; \
             include the header in the alignment file or provide a transcript information file \
             (--trInfoFile, lines of <gene name> <transcript name> <transcript length>)"
        );
    };
    tracing::info!(path = %path.display(), "using transcript information file");
    let info = TranscriptInfo::load(path).context("can't get transcript information")?;
    reader.set_reference_sequences(info.references())?;
    Ok(info)
}

/// Run both passes from the command line arguments.
pub fn run(args: &Args, interrupt: &Interrupt) -> Result<RunSummary> {
    let format = bam_input::detect_format(&args.alignments, args.format.as_deref())?;
    let mut alignments = AlignmentReader::open(&args.alignments, format, args.threads)?;
    let mut tr_info = initialize_transcript_info(args, &mut alignments)?;

    tracing::debug!("initializing transcript sequences");
    let tr_seq = TranscriptSequence::load(&args.tr_seq_file)?;
    tr_seq.validate(&tr_info)?;
    tr_seq.apply_gene_names(&mut tr_info)?;

    if !args.uniform {
        tracing::warn!("non-uniform read distribution is not available; using the uniform read distribution");
    }
    let model_config = ModelConfig {
        fragment_length: args.len_mu.zip(args.len_sigma),
        noise_mismatches: args.noise_mismatches,
    };
    let mut model = ReadDistribution::new(tr_info.lengths(), &model_config)?;
    let config = PipelineConfig {
        max_alignments: args.max_alignments,
        train: model.needs_training(),
        track_failed: args.failed.is_some(),
    };

    let pass_one = count_and_train(&mut alignments, &mut model, &config, interrupt)?;
    let s1 = &pass_one.stats;
    tracing::info!(n_total = s1.n_total, n_map = s1.n_map, "reads counted");
    if !pass_one.ignored.is_empty() {
        tracing::info!(
            ignored = pass_one.ignored.len(),
            max_alignments = config.max_alignments,
            "reads skipped due to having too many alignments"
        );
    }
    if s1.reads_without_end_info > 0 {
        tracing::warn!(
            reads = s1.reads_without_end_info,
            "reads were paired, but do not have \"end\" information (is your alignment file valid?)"
        );
    }
    if s1.reads_paired_and_single > 0 {
        tracing::warn!(
            reads = s1.reads_paired_and_single,
            "reads were reported as both paired and single end (is your alignment file valid?)"
        );
    }

    tracing::debug!("normalizing read distribution");
    model.normalize();
    if let Some(path) = &args.distribution_file {
        model.write_distribution(path)?;
    }

    let mut alignments = alignments.reopen().context("failed re-reading alignments")?;
    tracing::info!(path = %args.out_file.display(), "writing alignment probabilities");
    let mut writer = ProbabilityWriter::create(&args.out_file)?;
    let n_total = match args.reads_n {
        Some(n) if n >= s1.n_total => n,
        Some(n) => {
            tracing::warn!(reads_n = n, counted = s1.n_total, "--readsN is smaller than the number of reads in the alignment file");
            s1.n_total
        }
        None => s1.n_total,
    };
    writer.write_header(n_total, s1.n_map)?;
    let pass_two = assign_probabilities(
        &mut alignments,
        &mut model,
        &pass_one.ignored,
        &config,
        &mut writer,
        interrupt,
        s1.n_total,
    )?;
    writer.finish()?;
    drop(alignments);

    log_pass_two(&pass_two.stats, pass_one.ignored.len());
    model.write_warnings();

    if let Some(path) = &args.failed {
        output::write_failed_reads(path, &pass_two.failed)?;
    }

    if let Some(path) = &args.tr_info_file {
        tracing::debug!("computing effective lengths");
        tr_info.set_effective_lengths(&model.effective_lengths())?;
        match tr_info.write_preserving(path) {
            Ok(InfoWritten::Primary(p) | InfoWritten::Fallback(p)) => {
                tracing::info!(path = %p.display(), "transcript information saved");
            }
            Err(e) => tracing::warn!(error = %e, "writing transcript information failed"),
        }
    }

    Ok(RunSummary {
        pass_one: pass_one.stats,
        pass_two: pass_two.stats,
        ignored: pass_one.ignored.len(),
    })
}

fn log_pass_two(stats: &PassTwoStats, ignored: usize) {
    let counts = &stats.counts;
    tracing::info!(reads = stats.reads, alignments = counts.total(), "analyzed reads");
    if ignored > 0 {
        tracing::debug!(ignored, "reads ignored due to --limitA");
    }
    if stats.invalid > 0 {
        tracing::debug!(invalid = stats.invalid, "alignments could not be scored");
    }
    if stats.no_alignment > 0 {
        tracing::debug!(reads = stats.no_alignment, "reads had no alignments");
    }
    tracing::debug!(
        paired = counts.paired,
        half = counts.half_pairs(),
        single = counts.single,
        "scored alignments by type"
    );
}
