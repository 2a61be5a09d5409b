use crate::transcript_info::TranscriptInfo;
use anyhow::{bail, Result};
use needletail::parse_fastx_file;
use std::path::Path;

use crate::types::{HashSet, HashSetExt};

#[derive(Debug, Clone)]
pub struct TranscriptRecord {
    pub name: String,
    pub gene: Option<String>,
    pub length: u64,
}

/// Transcript sequences, kept as names and lengths in file order.
#[derive(Debug, Default)]
pub struct TranscriptSequence {
    records: Vec<TranscriptRecord>,
}

impl TranscriptSequence {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = parse_fastx_file(path)
            .map_err(|e| anyhow::anyhow!("failed to open FASTA {}: {}", path.display(), e))?;
        let mut records = Vec::new();

        while let Some(result) = reader.next() {
            let record = result
                .map_err(|e| anyhow::anyhow!("failed to parse FASTA record: {}", e))?;
            let header = String::from_utf8_lossy(record.id());
            let (name, gene) = parse_header(&header);
            records.push(TranscriptRecord {
                name,
                gene,
                length: record.num_bases() as u64,
            });
        }

        Ok(Self { records })
    }

    pub fn from_records(records: Vec<TranscriptRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TranscriptRecord] {
        &self.records
    }

    /// True when every record's header names a gene.
    pub fn has_gene_names(&self) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| r.gene.is_some())
    }

    pub fn gene_names(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.gene.clone().unwrap_or_else(|| crate::transcript_info::NO_GENE.to_string()))
            .collect()
    }

    pub fn gene_count(&self) -> usize {
        let mut genes = HashSet::new();
        for r in &self.records {
            if let Some(gene) = &r.gene {
                genes.insert(gene.as_str());
            }
        }
        genes.len()
    }

    /// Transcript count and every length must agree with `info`.
    pub fn validate(&self, info: &TranscriptInfo) -> Result<()> {
        if self.len() != info.len() {
            bail!(
                "number of transcripts in the alignment file and the sequence file are different: {} vs {}",
                info.len(),
                self.len()
            );
        }
        for (i, (record, tr)) in self.records.iter().zip(info.transcripts()).enumerate() {
            if record.length != tr.length {
                bail!(
                    "transcript info length and sequence length of transcript {} ({}) do not match: {} vs {}",
                    i,
                    tr.name,
                    tr.length,
                    record.length
                );
            }
        }
        Ok(())
    }

    /// Copy gene names into `info` when it has only the placeholder gene.
    pub fn apply_gene_names(&self, info: &mut TranscriptInfo) -> Result<()> {
        if !self.has_gene_names() || self.gene_count() <= 1 {
            return Ok(());
        }
        if info.gene_count() == 1 {
            tracing::info!("found gene names in sequence file, updating transcript information");
            info.update_gene_names(&self.gene_names())?;
        } else if info.gene_count() != self.gene_count() {
            tracing::warn!(
                info_genes = info.gene_count(),
                sequence_genes = self.gene_count(),
                "different number of genes in transcript information and sequence file"
            );
        }
        Ok(())
    }
}

/// Split a FASTA header into the transcript name and an optional `gene=`/`gene:` value.
fn parse_header(header: &str) -> (String, Option<String>) {
    let mut tokens = header.split_whitespace();
    let name = tokens.next().unwrap_or("").to_string();
    let gene = tokens
        .filter_map(|t| t.strip_prefix("gene=").or_else(|| t.strip_prefix("gene:")))
        .find(|g| !g.is_empty())
        .map(str::to_string);
    (name, gene)
}
