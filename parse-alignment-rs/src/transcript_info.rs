use anyhow::{anyhow, bail, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::types::{HashSet, HashSetExt};

/// Gene name used when the transcript source carries none.
pub const NO_GENE: &str = "none";

#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub gene: String,
    pub name: String,
    pub length: u64,
    pub effective_length: f64,
}

/// Transcript table indexed by the alignment header's reference index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptInfo {
    transcripts: Vec<Transcript>,
}

/// Outcome of writing the transcript info file without clobbering an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoWritten {
    Primary(PathBuf),
    Fallback(PathBuf),
}

impl TranscriptInfo {
    /// Build from `(name, length)` pairs, e.g. the alignment header's `@SQ` lines.
    pub fn from_references(refs: Vec<(String, u64)>) -> Self {
        let transcripts = refs
            .into_iter()
            .map(|(name, length)| Transcript {
                gene: NO_GENE.to_string(),
                name,
                length,
                effective_length: length as f64,
            })
            .collect();
        Self { transcripts }
    }

    /// Read `<gene> <transcript> <length> [<effective length>]` lines; `#` lines are comments.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open transcript info file {}", path.display()))?;
        let mut transcripts = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(gene), Some(name), Some(length)) = (fields.next(), fields.next(), fields.next())
            else {
                bail!(
                    "{}:{}: expected <gene name> <transcript name> <transcript length>",
                    path.display(),
                    lineno + 1
                );
            };
            let length: u64 = length
                .parse()
                .with_context(|| format!("{}:{}: invalid transcript length", path.display(), lineno + 1))?;
            let effective_length = match fields.next() {
                Some(v) => v.parse().with_context(|| {
                    format!("{}:{}: invalid effective length", path.display(), lineno + 1)
                })?,
                None => length as f64,
            };
            transcripts.push(Transcript {
                gene: gene.to_string(),
                name: name.to_string(),
                length,
                effective_length,
            });
        }
        if transcripts.is_empty() {
            return Err(anyhow!("no transcripts in {}", path.display()));
        }
        Ok(Self { transcripts })
    }

    pub fn len(&self) -> usize {
        self.transcripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcripts.is_empty()
    }

    pub fn length_of(&self, idx: usize) -> Option<u64> {
        self.transcripts.get(idx).map(|t| t.length)
    }

    pub fn lengths(&self) -> Vec<u64> {
        self.transcripts.iter().map(|t| t.length).collect()
    }

    /// `(name, length)` pairs in index order, the shape of an `@SQ` dictionary.
    pub fn references(&self) -> Vec<(String, u64)> {
        self.transcripts.iter().map(|t| (t.name.clone(), t.length)).collect()
    }

    pub fn transcripts(&self) -> &[Transcript] {
        &self.transcripts
    }

    /// Number of distinct gene names.
    pub fn gene_count(&self) -> usize {
        let mut genes = HashSet::new();
        for t in &self.transcripts {
            genes.insert(t.gene.as_str());
        }
        genes.len()
    }

    pub fn update_gene_names(&mut self, genes: &[String]) -> Result<()> {
        if genes.len() != self.transcripts.len() {
            bail!(
                "gene name count {} does not match transcript count {}",
                genes.len(),
                self.transcripts.len()
            );
        }
        for (t, gene) in self.transcripts.iter_mut().zip(genes) {
            t.gene.clone_from(gene);
        }
        Ok(())
    }

    pub fn set_effective_lengths(&mut self, lengths: &[f64]) -> Result<()> {
        if lengths.len() != self.transcripts.len() {
            bail!(
                "effective length count {} does not match transcript count {}",
                lengths.len(),
                self.transcripts.len()
            );
        }
        for (t, &len) in self.transcripts.iter_mut().zip(lengths) {
            t.effective_length = len;
        }
        Ok(())
    }

    /// Write the table. With `overwrite == false` an existing file is left alone
    /// and an `AlreadyExists` error is returned.
    pub fn write(&self, path: &Path, overwrite: bool) -> Result<()> {
        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options
            .open(path)
            .with_context(|| format!("failed to write transcript info {}", path.display()))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "# M {}", self.transcripts.len())?;
        for t in &self.transcripts {
            writeln!(out, "{} {} {} {:.1}", t.gene, t.name, t.length, t.effective_length)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Write to `path`, or to `<path>-NEW` when `path` already exists.
    pub fn write_preserving(&self, path: &Path) -> Result<InfoWritten> {
        match self.write(path, false) {
            Ok(()) => Ok(InfoWritten::Primary(path.to_path_buf())),
            Err(e) if is_already_exists(&e) => {
                let mut fallback = path.as_os_str().to_owned();
                fallback.push("-NEW");
                let fallback = PathBuf::from(fallback);
                tracing::warn!(
                    path = %path.display(),
                    fallback = %fallback.display(),
                    "transcript info file already exists; saving new transcript info to the fallback path"
                );
                self.write(&fallback, true)?;
                Ok(InfoWritten::Fallback(fallback))
            }
            Err(e) => Err(e),
        }
    }
}

fn is_already_exists(e: &anyhow::Error) -> bool {
    e.chain()
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .any(|io| io.kind() == ErrorKind::AlreadyExists)
}
