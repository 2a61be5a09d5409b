use crate::alignment::{AlignmentRecord, AlignmentSource};
use anyhow::{anyhow, Context, Result};
use noodles::bgzf::io::{MultithreadedReader, Reader as BgzfReader};
use noodles::sam::alignment::RecordBuf;
use noodles::sam::header::record::value::{map::ReferenceSequence, Map};
use noodles::{bam, sam};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Sam,
    Bam,
}

impl InputFormat {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sam" => Some(Self::Sam),
            "bam" => Some(Self::Bam),
            _ => None,
        }
    }
}

/// Pick the input format from an explicit `--format` value, falling back to the file extension.
pub fn detect_format(path: &Path, explicit: Option<&str>) -> Result<InputFormat> {
    if let Some(name) = explicit {
        if let Some(format) = InputFormat::parse(name) {
            return Ok(format);
        }
        tracing::warn!(format = name, "unknown input format");
    }
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    match InputFormat::parse(ext) {
        Some(format) => {
            tracing::debug!(?format, "assuming alignment format from file extension");
            Ok(format)
        }
        None => Err(anyhow!(
            "couldn't determine the type of input file from extension .{}; use --format SAM or BAM",
            ext
        )),
    }
}

pub enum BgzfInput {
    SingleThreaded(BgzfReader<File>),
    MultiThreaded(MultithreadedReader<File>),
}

impl Read for BgzfInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BgzfInput::SingleThreaded(r) => r.read(buf),
            BgzfInput::MultiThreaded(r) => r.read(buf),
        }
    }
}

impl BufRead for BgzfInput {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            BgzfInput::SingleThreaded(r) => r.fill_buf(),
            BgzfInput::MultiThreaded(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            BgzfInput::SingleThreaded(r) => r.consume(amt),
            BgzfInput::MultiThreaded(r) => r.consume(amt),
        }
    }
}

enum Inner {
    Sam(sam::io::Reader<BufReader<File>>),
    Bam(bam::io::Reader<BgzfInput>),
}

/// SAM/BAM alignment reader. The header is read on open.
pub struct AlignmentReader {
    path: PathBuf,
    format: InputFormat,
    threads: usize,
    header: sam::Header,
    /// Reference dictionary supplied from outside the file, reapplied on `reopen`.
    references: Option<Vec<(String, u64)>>,
    inner: Inner,
    buf: RecordBuf,
}

impl AlignmentReader {
    pub fn open(path: &Path, format: InputFormat, threads: usize) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open alignment file {}", path.display()))?;
        let (inner, header) = match format {
            InputFormat::Sam => {
                let mut reader = sam::io::Reader::new(BufReader::new(file));
                let header = reader
                    .read_header()
                    .with_context(|| format!("failed to read SAM header from {}", path.display()))?;
                (Inner::Sam(reader), header)
            }
            InputFormat::Bam => {
                let bgzf = match NonZeroUsize::new(threads).filter(|n| n.get() > 1) {
                    Some(worker_count) => BgzfInput::MultiThreaded(
                        MultithreadedReader::with_worker_count(worker_count, file),
                    ),
                    None => BgzfInput::SingleThreaded(BgzfReader::new(file)),
                };
                let mut reader = bam::io::Reader::from(bgzf);
                let header = reader
                    .read_header()
                    .with_context(|| format!("failed to read BAM header from {}", path.display()))?;
                (Inner::Bam(reader), header)
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            format,
            threads,
            header,
            references: None,
            inner,
            buf: RecordBuf::default(),
        })
    }

    /// Open the same file again from the start. Used instead of seeking so that
    /// non-seekable formats behave the same.
    pub fn reopen(&self) -> Result<Self> {
        let mut reader = Self::open(&self.path, self.format, self.threads)?;
        if let Some(references) = &self.references {
            reader.set_reference_sequences(references.clone())?;
        }
        Ok(reader)
    }

    /// Replace the header's `@SQ` dictionary so records naming these transcripts
    /// decode when the file itself carries no header.
    pub fn set_reference_sequences(&mut self, references: Vec<(String, u64)>) -> Result<()> {
        let dictionary = self.header.reference_sequences_mut();
        dictionary.clear();
        for (name, length) in &references {
            let length = usize::try_from(*length)
                .ok()
                .and_then(NonZeroUsize::new)
                .ok_or_else(|| anyhow!("transcript {name} has an invalid length {length}"))?;
            dictionary.insert(name.as_str().into(), Map::<ReferenceSequence>::new(length));
        }
        self.references = Some(references);
        Ok(())
    }

    /// Transcript names and lengths from `@SQ` lines, in reference index order.
    pub fn reference_sequences(&self) -> Vec<(String, u64)> {
        self.header
            .reference_sequences()
            .iter()
            .map(|(name, map)| (name.to_string(), map.length().get() as u64))
            .collect()
    }
}

impl AlignmentSource for AlignmentReader {
    fn read_record(&mut self, record: &mut AlignmentRecord) -> Result<bool> {
        let n = match &mut self.inner {
            Inner::Sam(reader) => reader.read_record_buf(&self.header, &mut self.buf),
            Inner::Bam(reader) => reader.read_record_buf(&self.header, &mut self.buf),
        }
        .with_context(|| format!("failed to read alignment from {}", self.path.display()))?;
        if n == 0 {
            return Ok(false);
        }
        record.fill_from(&self.buf);
        Ok(true)
    }
}
