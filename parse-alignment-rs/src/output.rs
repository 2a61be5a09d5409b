use crate::types::TrId;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One scored alignment of a read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagAlignment {
    pub tr_id: TrId,
    /// Natural-log probability.
    pub prob: f64,
    /// Natural-log noise floor.
    pub noise: f64,
}

/// Format like C's `%.9e`: nine fractional digits and a signed, at least two digit exponent.
pub fn format_scientific(value: f64, out: &mut String) {
    if !value.is_finite() {
        let s = if value.is_nan() {
            "nan"
        } else if value > 0.0 {
            "inf"
        } else {
            "-inf"
        };
        out.push_str(s);
        return;
    }
    let s = format!("{value:.9e}");
    let (mantissa, exp) = s.split_once('e').unwrap_or((s.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    let _ = write!(out, "{mantissa}e{sign}{:02}", exp.unsigned_abs());
}

/// Writer for the per-read alignment probability file.
pub struct ProbabilityWriter<W: Write> {
    out: W,
    line: String,
    lines: u64,
}

impl ProbabilityWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("unable to open output file {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> ProbabilityWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            line: String::new(),
            lines: 0,
        }
    }

    pub fn write_header(&mut self, n_total: u64, n_map: u64) -> Result<()> {
        writeln!(self.out, "# Ntotal {n_total}")?;
        writeln!(self.out, "# Nmap {n_map}")?;
        writeln!(self.out, "# LOGFORMAT (probabilities saved on log scale.)")?;
        writeln!(self.out, "# r_name num_alignments (tr_id prob )^*{{num_alignments}}")?;
        Ok(())
    }

    /// `name <count+1> (trId prob)* 0 <minNoise>`; the trailing entry is the noise placeholder.
    pub fn write_read(&mut self, name: &str, alignments: &[TagAlignment]) -> Result<()> {
        debug_assert!(!alignments.is_empty());
        self.line.clear();
        let _ = write!(self.line, "{} {}", name, alignments.len() + 1);
        let mut min_noise = f64::INFINITY;
        for aln in alignments {
            min_noise = min_noise.min(aln.noise);
            let _ = write!(self.line, " {} ", aln.tr_id);
            format_scientific(aln.prob, &mut self.line);
        }
        self.line.push_str(" 0 ");
        format_scientific(min_noise, &mut self.line);
        self.line.push('\n');
        self.out.write_all(self.line.as_bytes())?;
        self.lines += 1;
        Ok(())
    }

    /// Placeholder for a mapped read none of whose alignments could be scored.
    pub fn write_placeholder(&mut self, name: &str) -> Result<()> {
        writeln!(self.out, "{name} 1 0 0")?;
        self.lines += 1;
        Ok(())
    }

    /// Read lines written so far.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// One read name per line, in sorted order.
pub fn write_failed_reads(path: &Path, names: &BTreeSet<String>) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create failed-reads file {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for name in names {
        writeln!(out, "{name}")?;
    }
    out.flush()?;
    Ok(())
}
