use crate::model::DEFAULT_NOISE_MISMATCHES;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "parse-alignment",
    about = "Pre-compute probabilities of (observed) reads' alignments",
    long_about = "Pre-compute probabilities of (observed) reads' alignments.\n\
                  The alignment file should be in either SAM or BAM format, with all \
                  alignments of one read next to each other.",
    version
)]
pub struct Args {
    /// Alignment file (SAM or BAM)
    pub alignments: PathBuf,

    /// Output probability file
    #[arg(short = 'o', long = "outFile", value_name = "FILE")]
    pub out_file: PathBuf,

    /// Input format: SAM or BAM (default: from the file extension)
    #[arg(short = 'f', long = "format")]
    pub format: Option<String>,

    /// Transcript information file. Read when the alignment header has no
    /// reference sequences; otherwise transcript information is written into it
    #[arg(short = 't', long = "trInfoFile", value_name = "FILE")]
    pub tr_info_file: Option<PathBuf>,

    /// Transcript sequences in FASTA format
    #[arg(short = 's', long = "trSeqFile", value_name = "FASTA")]
    pub tr_seq_file: PathBuf,

    /// Total number of reads. Not needed if the alignment file also contains
    /// reads with no valid alignments
    #[arg(short = 'N', long = "readsN")]
    pub reads_n: Option<u64>,

    /// File to save names of reads without any usable alignment
    #[arg(long = "failed", value_name = "FILE")]
    pub failed: Option<PathBuf>,

    /// Use uniform read distribution
    #[arg(long)]
    pub uniform: bool,

    /// Mean of the log fragment length distribution (l_frag ~ LogNormal(mu, sigma^2))
    #[arg(long = "lenMu", requires = "len_sigma")]
    pub len_mu: Option<f64>,

    /// sigma^2 of the log fragment length distribution (l_frag ~ LogNormal(mu, sigma^2))
    #[arg(long = "lenSigma", requires = "len_mu")]
    pub len_sigma: Option<f64>,

    /// File to which the read distribution should be saved
    #[arg(long = "distributionFile", value_name = "FILE")]
    pub distribution_file: Option<PathBuf>,

    /// Maximum number of threads; used for BAM decompression
    #[arg(short = 'P', long = "procN", default_value_t = 3)]
    pub threads: usize,

    /// Number of mismatches to be considered as noise
    #[arg(long = "noiseMismatches", default_value_t = DEFAULT_NOISE_MISMATCHES)]
    pub noise_mismatches: u32,

    /// Limit maximum number of alignments per read; reads with more are skipped (0 = no limit)
    #[arg(short = 'l', long = "limitA", default_value_t = 0)]
    pub max_alignments: u64,

    /// Verbose output: progress and summaries
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose output: adds debug detail
    #[arg(long = "veryVerbose")]
    pub very_verbose: bool,

    /// Only log errors
    #[arg(short = 'q', long, conflicts_with_all = ["verbose", "very_verbose"])]
    pub quiet: bool,
}
