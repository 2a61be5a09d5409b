/// End-to-end runs of the `parse-alignment` binary on a small generated SAM file.
use noodles::sam::alignment::io::Write as _;
use noodles::{bam, sam};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

// ── helpers ──────────────────────────────────────────────────────────────────

const HEADER: &str = "@HD\tVN:1.6\n@SQ\tSN:t1\tLN:300\n@SQ\tSN:t2\tLN:200\n";

fn record(name: &str, flag: u16, rname: &str, pos: u32, rnext: &str, pnext: u32, tlen: i32) -> String {
    let (cigar, seq) = if flag & 4 != 0 { ("*", "*".to_string()) } else { ("50M", "A".repeat(50)) };
    format!("{name}\t{flag}\t{rname}\t{pos}\t255\t{cigar}\t{rnext}\t{pnext}\t{tlen}\t{seq}\t*\tNM:i:0\n")
}

fn alignments() -> String {
    let mut sam = String::new();
    sam += &record("r1", 0, "t1", 11, "*", 0, 0);
    sam += &record("r2", 4, "*", 0, "*", 0, 0);
    sam += &record("r3", 0, "t1", 21, "*", 0, 0);
    sam += &record("r3", 256, "t2", 31, "*", 0, 0);
    sam += &record("p1", 99, "t1", 1, "=", 101, 150);
    sam += &record("p1", 147, "t1", 101, "=", 1, -150);
    for pos in [1, 41, 81, 121] {
        sam += &record("many", 256, "t1", pos, "*", 0, 0);
    }
    sam
}

fn fasta(len_t2: usize) -> String {
    format!(">t1 gene=G1\n{}\n>t2 gene=G2\n{}\n", "ACGT".repeat(75), "A".repeat(len_t2))
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new(header: &str, len_t2: usize) -> Self {
        Self::with_records(header, &alignments(), len_t2)
    }

    fn with_records(header: &str, records: &str, len_t2: usize) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("reads.sam"), format!("{header}{records}")).unwrap();
        fs::write(dir.path().join("tr.fa"), fasta(len_t2)).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run(&self, extra: &[&str]) -> Output {
        self.run_on("reads.sam", "reads.prob", extra)
    }

    fn run_on(&self, input: &str, out: &str, extra: &[&str]) -> Output {
        Command::new(bin())
            .arg(self.path(input))
            .arg("-o")
            .arg(self.path(out))
            .arg("-s")
            .arg(self.path("tr.fa"))
            .args(extra)
            .arg("-q")
            .output()
            .expect("failed to spawn parse-alignment")
    }
}

fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_parse-alignment"))
}

/// Re-encode a SAM file as BAM.
fn sam_to_bam(src: &Path, dst: &Path) {
    let mut reader = sam::io::Reader::new(BufReader::new(File::open(src).unwrap()));
    let header = reader.read_header().unwrap();
    let mut writer = bam::io::Writer::new(File::create(dst).unwrap());
    writer.write_header(&header).unwrap();
    for result in reader.record_bufs(&header) {
        writer.write_alignment_record(&header, &result.unwrap()).unwrap();
    }
    writer.finish(&header).unwrap();
}

fn assert_success(out: &Output) {
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[test]
fn writes_probability_file() {
    let fx = Fixture::new(HEADER, 200);
    let out = fx.run(&["--limitA", "3", "--uniform"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let text = read(&fx.path("reads.prob"));
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("# Ntotal 5"));
    assert_eq!(lines.next(), Some("# Nmap 3"));
    assert_eq!(lines.next(), Some("# LOGFORMAT (probabilities saved on log scale.)"));
    assert_eq!(lines.next(), Some("# r_name num_alignments (tr_id prob )^*{num_alignments}"));

    let reads: Vec<Vec<&str>> = lines.map(|l| l.split(' ').collect()).collect();
    let names: Vec<&str> = reads.iter().map(|f| f[0]).collect();
    assert_eq!(names, vec!["r1", "r3", "p1"]);

    assert_eq!(&reads[0][1..3], &["2", "1"]);
    assert_eq!(reads[1][1], "3");
    assert_eq!(reads[1][2], "1");
    assert_eq!(reads[1][4], "2");
    assert_eq!(&reads[2][1..3], &["2", "1"]);
    for fields in &reads {
        assert_eq!(fields[fields.len() - 2], "0");
        for value in fields[2..].iter().skip(1).step_by(2) {
            let p: f64 = value.parse().unwrap();
            assert!(p < 0.0, "log probability {value} should be negative");
            assert!(value.contains("e-") || value.contains("e+"), "{value}");
        }
    }
}

#[test]
fn reads_n_raises_total() {
    let fx = Fixture::new(HEADER, 200);
    let out = fx.run(&["-N", "1000"]);
    assert!(out.status.success());
    assert!(read(&fx.path("reads.prob")).starts_with("# Ntotal 1000\n# Nmap 4\n"));
}

#[test]
fn failed_reads_and_transcript_info_are_exported() {
    let fx = Fixture::new(HEADER, 200);
    let failed = fx.path("failed.txt");
    let tr = fx.path("out.tr");
    let dist = fx.path("dist.txt");
    let out = fx.run(&[
        "--failed",
        failed.to_str().unwrap(),
        "-t",
        tr.to_str().unwrap(),
        "--distributionFile",
        dist.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    assert_eq!(read(&failed), "r2\n");
    let info = read(&tr);
    let rows: Vec<&str> = info.lines().collect();
    assert_eq!(rows[0], "# M 2");
    assert!(rows[1].starts_with("G1 t1 300 "), "{}", rows[1]);
    assert!(rows[2].starts_with("G2 t2 200 "), "{}", rows[2]);
    assert!(read(&dist).contains("reads_observed"));

    // A second run must not clobber the existing transcript info.
    let out = fx.run(&["-t", tr.to_str().unwrap()]);
    assert!(out.status.success());
    assert_eq!(read(&tr), info);
    assert!(fx.path("out.tr-NEW").exists());
}

#[test]
fn missing_header_needs_transcript_info() {
    let fx = Fixture::new("", 200);
    let out = fx.run(&[]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("header"));
}

#[test]
fn transcript_length_mismatch_is_fatal() {
    let fx = Fixture::new(HEADER, 199);
    let out = fx.run(&[]);
    assert!(!out.status.success());
    assert!(!fx.path("reads.prob").exists());
}

#[test]
fn unknown_format_is_fatal() {
    let fx = Fixture::new(HEADER, 200);
    fs::rename(fx.path("reads.sam"), fx.path("reads.txt")).unwrap();
    let out = Command::new(bin())
        .arg(fx.path("reads.txt"))
        .arg("-o")
        .arg(fx.path("reads.prob"))
        .arg("-s")
        .arg(fx.path("tr.fa"))
        .output()
        .expect("spawn");
    assert!(!out.status.success());

    let out = Command::new(bin())
        .arg(fx.path("reads.txt"))
        .args(["-f", "sam", "-q", "-o"])
        .arg(fx.path("reads.prob"))
        .arg("-s")
        .arg(fx.path("tr.fa"))
        .output()
        .expect("spawn");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
}

#[test]
fn headerless_alignments_use_transcript_info_file() {
    let with_header = Fixture::new(HEADER, 200);
    assert_success(&with_header.run(&["--limitA", "3"]));

    let fx = Fixture::new("", 200);
    let info = fx.path("in.tr");
    fs::write(&info, "# M 2\nG1 t1 300\nG2 t2 200\n").unwrap();
    assert_success(&fx.run(&["--limitA", "3", "-t", info.to_str().unwrap()]));

    assert_eq!(read(&fx.path("reads.prob")), read(&with_header.path("reads.prob")));
    assert_eq!(read(&info), "# M 2\nG1 t1 300\nG2 t2 200\n");
    assert!(read(&fx.path("in.tr-NEW")).starts_with("# M 2\nG1 t1 300 "));
}

#[test]
fn star_read_name_does_not_end_input() {
    let mut records = String::new();
    records += &record("r1", 0, "t1", 11, "*", 0, 0);
    records += &record("*", 0, "t1", 51, "*", 0, 0);
    records += &record("r9", 0, "t2", 5, "*", 0, 0);
    let fx = Fixture::with_records(HEADER, &records, 200);
    assert_success(&fx.run(&[]));

    let text = read(&fx.path("reads.prob"));
    assert!(text.starts_with("# Ntotal 3\n# Nmap 3\n"), "{text}");
    let names: Vec<&str> = text
        .lines()
        .filter(|l| !l.starts_with('#'))
        .filter_map(|l| l.split(' ').next())
        .collect();
    assert_eq!(names, vec!["r1", "*", "r9"]);
}

#[test]
fn bam_input_matches_sam_for_any_thread_count() {
    let fx = Fixture::new(HEADER, 200);
    sam_to_bam(&fx.path("reads.sam"), &fx.path("reads.bam"));

    assert_success(&fx.run(&["--limitA", "3"]));
    assert_success(&fx.run_on("reads.bam", "single.prob", &["--limitA", "3", "-P", "1"]));
    assert_success(&fx.run_on("reads.bam", "multi.prob", &["--limitA", "3", "-P", "3"]));

    let expected = read(&fx.path("reads.prob"));
    assert_eq!(read(&fx.path("single.prob")), expected);
    assert_eq!(read(&fx.path("multi.prob")), expected);
}

#[test]
fn verbose_flag_enables_progress_messages() {
    let fx = Fixture::new(HEADER, 200);
    let run = |flags: &[&str]| {
        let out = Command::new(bin())
            .arg(fx.path("reads.sam"))
            .arg("-o")
            .arg(fx.path("reads.prob"))
            .arg("-s")
            .arg(fx.path("tr.fa"))
            .args(flags)
            .env_remove("RUST_LOG")
            .output()
            .expect("spawn");
        assert_success(&out);
        String::from_utf8_lossy(&out.stderr).into_owned()
    };

    assert!(!run(&["--uniform"]).contains("analyzed reads"));
    assert!(run(&["--uniform", "-v"]).contains("analyzed reads"));
    assert!(run(&["--uniform", "-q"]).is_empty());
}
