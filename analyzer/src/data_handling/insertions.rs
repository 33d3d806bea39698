use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::data_handling::refseq::GeneSpan;

/// Experimental channel an insertion was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    High,
    Low,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::High => "high",
            Channel::Low => "low",
        }
    }
}

/// One mapped insertion site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub chan: Channel,
    pub chrom: String,
    pub strand: char,
    pub pos: i32,
}

/// Orientation of an insertion relative to the strand of the gene it
/// falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sense,
    Antisense,
}

/// Archived insertion files use one fixed-width 6-byte record per
/// insertion: chromosome id (i8), strand character, position (i32,
/// host byte order). Field order and widths must stay bit-for-bit
/// compatible with the existing archives.
const RECORD_SIZE: usize = 6;

/// Chromosome ids run 0-25 with 23 unused: 0-22 are chr0-chr22, 24 is
/// chrX and 25 is chrY.
fn chrom_name(id: i8) -> Option<String> {
    match id {
        0..=22 => Some(format!("chr{}", id)),
        24 => Some("chrX".to_string()),
        25 => Some("chrY".to_string()),
        _ => None,
    }
}

fn read_channel(path: &Path, chan: Channel, out: &mut Vec<Insertion>) -> Result<()> {
    let file = File::open(path)
        .with_context(|| format!("opening insertion file {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut buf = [0u8; RECORD_SIZE];

    loop {
        match reader.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("reading insertion record"),
        }
        let chrom_id = buf[0] as i8;
        let Some(chrom) = chrom_name(chrom_id) else {
            bail!(
                "invalid chromosome id {} in {}",
                chrom_id,
                path.display()
            );
        };
        out.push(Insertion {
            chan,
            chrom,
            strand: buf[1] as char,
            pos: i32::from_ne_bytes([buf[2], buf[3], buf[4], buf[5]]),
        });
    }
    Ok(())
}

/// Read both channel files (`high`, `low`) of one screen.
pub fn read_insertions(
    data_dir: &Path,
    screen_name: &str,
    assembly: &str,
    trim_length: &str,
) -> Result<Vec<Insertion>> {
    let data_path = data_dir.join(screen_name).join(assembly).join(trim_length);

    let mut insertions = Vec::new();
    for chan in [Channel::High, Channel::Low] {
        read_channel(&data_path.join(chan.as_str()), chan, &mut insertions)?;
    }
    info!(
        screen_name,
        count = insertions.len(),
        "loaded insertion records"
    );
    Ok(insertions)
}

/// Insertions on one chromosome within `[start - padd, end + padd]`.
/// `end` defaults to `start` for point queries.
pub fn read_insertions_region(
    data_dir: &Path,
    screen_name: &str,
    assembly: &str,
    trim_length: &str,
    chrom: &str,
    start: i32,
    end: Option<i32>,
    padd: i32,
) -> Result<Vec<Insertion>> {
    let end = end.unwrap_or(start);
    let (lo, hi) = (start - padd, end + padd);

    let mut insertions = read_insertions(data_dir, screen_name, assembly, trim_length)?;
    insertions.retain(|ins| ins.chrom == chrom && ins.pos > lo && ins.pos < hi);
    Ok(insertions)
}

/// Insertions within a gene's span (plus padding), each labelled
/// sense/antisense relative to the gene strand.
pub fn gene_insertions(
    insertions: &[Insertion],
    span: &GeneSpan,
    padding: i64,
) -> Vec<(Insertion, Direction)> {
    let lo = span.tx_start - padding;
    let hi = span.tx_end + padding;

    insertions
        .iter()
        .filter(|ins| {
            ins.chrom == span.chrom && (ins.pos as i64) >= lo && (ins.pos as i64) <= hi
        })
        .map(|ins| {
            let dir = if ins.strand == span.strand {
                Direction::Sense
            } else {
                Direction::Antisense
            };
            (ins.clone(), dir)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record(chrom_id: i8, strand: char, pos: i32) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0] = chrom_id as u8;
        buf[1] = strand as u8;
        buf[2..6].copy_from_slice(&pos.to_ne_bytes());
        buf
    }

    fn write_channel(dir: &Path, name: &str, records: &[[u8; RECORD_SIZE]]) {
        let mut f = File::create(dir.join(name)).unwrap();
        for r in records {
            f.write_all(r).unwrap();
        }
    }

    #[test]
    fn reads_fixed_width_records() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("screen/hg38/50");
        std::fs::create_dir_all(&path).unwrap();
        write_channel(
            &path,
            "high",
            &[record(9, '-', 4_983_150), record(24, '+', 100)],
        );
        write_channel(&path, "low", &[record(25, '+', 42)]);

        let ins = read_insertions(tmp.path(), "screen", "hg38", "50").unwrap();
        assert_eq!(ins.len(), 3);
        assert_eq!(ins[0].chrom, "chr9");
        assert_eq!(ins[0].strand, '-');
        assert_eq!(ins[0].pos, 4_983_150);
        assert_eq!(ins[0].chan, Channel::High);
        assert_eq!(ins[1].chrom, "chrX");
        assert_eq!(ins[2].chrom, "chrY");
        assert_eq!(ins[2].chan, Channel::Low);
    }

    #[test]
    fn invalid_chromosome_id_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("screen/hg38/50");
        std::fs::create_dir_all(&path).unwrap();
        write_channel(&path, "high", &[record(23, '+', 1)]);
        write_channel(&path, "low", &[]);

        assert!(read_insertions(tmp.path(), "screen", "hg38", "50").is_err());
    }

    #[test]
    fn region_read_filters_by_interval() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("screen/hg38/50");
        std::fs::create_dir_all(&path).unwrap();
        write_channel(
            &path,
            "high",
            &[record(1, '+', 500), record(1, '+', 5000), record(2, '+', 500)],
        );
        write_channel(&path, "low", &[]);

        let ins = read_insertions_region(
            tmp.path(),
            "screen",
            "hg38",
            "50",
            "chr1",
            400,
            Some(600),
            50,
        )
        .unwrap();
        assert_eq!(ins.len(), 1);
        assert_eq!(ins[0].pos, 500);
    }

    #[test]
    fn gene_insertions_label_orientation() {
        let span = GeneSpan {
            chrom: "chr1".to_string(),
            strand: '+',
            tx_start: 100,
            tx_end: 200,
        };
        let ins = vec![
            Insertion { chan: Channel::High, chrom: "chr1".into(), strand: '+', pos: 150 },
            Insertion { chan: Channel::Low, chrom: "chr1".into(), strand: '-', pos: 160 },
            Insertion { chan: Channel::High, chrom: "chr2".into(), strand: '+', pos: 150 },
        ];
        let labelled = gene_insertions(&ins, &span, 0);
        assert_eq!(labelled.len(), 2);
        assert_eq!(labelled[0].1, Direction::Sense);
        assert_eq!(labelled[1].1, Direction::Antisense);
    }
}
