use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

/// One transcript row of the NCBI gene annotation table. Extra columns
/// in the file (bin, score, frame annotations) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Transcript {
    pub name: String,
    pub chrom: String,
    pub strand: char,
    #[serde(rename = "txStart")]
    pub tx_start: i64,
    #[serde(rename = "txEnd")]
    pub tx_end: i64,
    #[serde(rename = "cdsStart")]
    pub cds_start: i64,
    #[serde(rename = "cdsEnd")]
    pub cds_end: i64,
    pub name2: String,
    #[serde(rename = "exonStarts")]
    pub exon_starts: String,
    #[serde(rename = "exonEnds")]
    pub exon_ends: String,
}

impl Transcript {
    /// Exon boundaries parsed from the comma-separated coordinate
    /// lists (which carry a trailing comma in the source files).
    pub fn exons(&self) -> Vec<(i64, i64)> {
        let parse = |s: &str| -> Vec<i64> {
            s.split(',')
                .filter(|t| !t.is_empty())
                .filter_map(|t| t.parse().ok())
                .collect()
        };
        parse(&self.exon_starts)
            .into_iter()
            .zip(parse(&self.exon_ends))
            .collect()
    }
}

/// Collapsed location of one gene: union of its transcripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneSpan {
    pub chrom: String,
    pub strand: char,
    pub tx_start: i64,
    pub tx_end: i64,
}

/// Protein-coding annotation for one assembly, indexed by gene symbol.
#[derive(Debug, Default)]
pub struct Refseq {
    transcripts: Vec<Transcript>,
    by_gene: HashMap<String, Vec<usize>>,
}

/// Read an annotation table, keeping only protein-coding transcripts
/// (names starting `NM` or `XM`, predicted included) on primary
/// chromosomes (no `_` in the chromosome name).
pub fn read_refseq(path: &Path) -> Result<Refseq> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("opening annotation table {}", path.display()))?;

    let mut refseq = Refseq::default();
    for row in reader.deserialize() {
        let tx: Transcript = row.context("parsing annotation row")?;
        if !(tx.name.starts_with("NM") || tx.name.starts_with("XM")) {
            continue;
        }
        if tx.chrom.contains('_') {
            continue;
        }
        refseq
            .by_gene
            .entry(tx.name2.clone())
            .or_default()
            .push(refseq.transcripts.len());
        refseq.transcripts.push(tx);
    }
    info!(
        transcripts = refseq.transcripts.len(),
        genes = refseq.by_gene.len(),
        "loaded annotation table"
    );
    Ok(refseq)
}

impl Refseq {
    /// All transcripts of one gene symbol.
    pub fn gene_positions(&self, gene: &str) -> Vec<&Transcript> {
        self.by_gene
            .get(gene)
            .map(|idxs| idxs.iter().map(|&i| &self.transcripts[i]).collect())
            .unwrap_or_default()
    }

    /// Collapse a gene's transcripts into one span. Genes annotated on
    /// more than one chromosome or strand produce a warning and take
    /// the first entry; that is a documented policy, not an error.
    pub fn gene_span(&self, gene: &str) -> Option<GeneSpan> {
        let txs = self.gene_positions(gene);
        let first = txs.first()?;

        if txs.iter().any(|t| t.chrom != first.chrom) {
            warn!(gene, "gene is annotated on more than one chromosome, taking the first");
        }
        if txs.iter().any(|t| t.strand != first.strand) {
            warn!(gene, "gene is annotated on more than one strand, taking the first");
        }
        let same_chrom: Vec<&&Transcript> =
            txs.iter().filter(|t| t.chrom == first.chrom).collect();

        Some(GeneSpan {
            chrom: first.chrom.clone(),
            strand: first.strand,
            tx_start: same_chrom.iter().map(|t| t.tx_start).min()?,
            tx_end: same_chrom.iter().map(|t| t.tx_end).max()?,
        })
    }

    /// Collapsed spans for every gene, for genome-wide masking.
    pub fn gene_spans(&self) -> Vec<GeneSpan> {
        let mut genes: Vec<&String> = self.by_gene.keys().collect();
        genes.sort();
        genes
            .into_iter()
            .filter_map(|g| self.gene_span(g))
            .collect()
    }

    pub fn genes(&self) -> Vec<&str> {
        let mut genes: Vec<&str> = self.by_gene.keys().map(|s| s.as_str()).collect();
        genes.sort_unstable();
        genes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str =
        "name\tchrom\tstrand\ttxStart\ttxEnd\tcdsStart\tcdsEnd\tname2\texonStarts\texonEnds\n";

    fn write_table(rows: &[&str]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(HEADER.as_bytes()).unwrap();
        for row in rows {
            writeln!(f, "{}", row).unwrap();
        }
        f
    }

    #[test]
    fn keeps_only_coding_primary_transcripts() {
        let f = write_table(&[
            "NM_001\tchr9\t+\t100\t200\t120\t180\tJAK2\t100,150,\t140,200,",
            "XM_002\tchr9\t+\t90\t210\t120\t180\tJAK2\t90,\t210,",
            "NR_003\tchr9\t+\t100\t200\t120\t180\tJAK2\t100,\t200,",
            "NM_004\tchr9_alt\t+\t100\t200\t120\t180\tJAK2\t100,\t200,",
        ]);
        let refseq = read_refseq(f.path()).unwrap();
        assert_eq!(refseq.gene_positions("JAK2").len(), 2);
    }

    #[test]
    fn gene_span_collapses_transcripts() {
        let f = write_table(&[
            "NM_001\tchr9\t+\t100\t200\t120\t180\tJAK2\t100,\t200,",
            "XM_002\tchr9\t+\t90\t210\t120\t180\tJAK2\t90,\t210,",
        ]);
        let refseq = read_refseq(f.path()).unwrap();
        let span = refseq.gene_span("JAK2").unwrap();
        assert_eq!(span.tx_start, 90);
        assert_eq!(span.tx_end, 210);
        assert_eq!(span.chrom, "chr9");
    }

    #[test]
    fn multi_chromosome_gene_takes_first_entry() {
        let f = write_table(&[
            "NM_001\tchr9\t+\t100\t200\t120\t180\tDUP\t100,\t200,",
            "NM_002\tchr5\t-\t900\t950\t900\t950\tDUP\t900,\t950,",
        ]);
        let refseq = read_refseq(f.path()).unwrap();
        let span = refseq.gene_span("DUP").unwrap();
        assert_eq!(span.chrom, "chr9");
        assert_eq!(span.strand, '+');
        assert_eq!(span.tx_end, 200);
    }

    #[test]
    fn unknown_gene_has_no_span() {
        let f = write_table(&[]);
        let refseq = read_refseq(f.path()).unwrap();
        assert!(refseq.gene_span("NOPE").is_none());
        assert!(refseq.gene_positions("NOPE").is_empty());
    }

    #[test]
    fn exon_lists_parse_with_trailing_comma() {
        let f = write_table(&[
            "NM_001\tchr9\t+\t100\t200\t120\t180\tJAK2\t100,150,\t140,200,",
        ]);
        let refseq = read_refseq(f.path()).unwrap();
        let tx = refseq.gene_positions("JAK2")[0];
        assert_eq!(tx.exons(), vec![(100, 140), (150, 200)]);
    }
}
