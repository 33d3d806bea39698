use std::collections::BTreeMap;

use anyhow::Result;

use crate::analysis::scoring::{fdr, log2_mi, nonzero, p_values, ScoringOptions};
use crate::data_handling::insertions::{Channel, Insertion};
use crate::data_handling::refseq::GeneSpan;

/// Insertion counts of one fixed-size genomic window.
#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    pub chrom: String,
    /// 1-based bin index within the chromosome.
    pub bin: usize,
    /// Window interval `[start, end)` in bp.
    pub start: i64,
    pub end: i64,
    pub low_counts: u64,
    pub high_counts: u64,
}

/// A bin with the enrichment statistics attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBin {
    pub bin: Bin,
    pub log2_mi: f64,
    pub p: f64,
    pub p_fdr: f64,
}

/// Drop insertions that fall inside any annotated gene span, leaving
/// the intergenic background for gene-agnostic scoring.
pub fn drop_ins_in_genes(insertions: Vec<Insertion>, spans: &[GeneSpan]) -> Vec<Insertion> {
    let mut by_chrom: BTreeMap<&str, Vec<(i64, i64)>> = BTreeMap::new();
    for span in spans {
        by_chrom
            .entry(span.chrom.as_str())
            .or_default()
            .push((span.tx_start, span.tx_end));
    }

    insertions
        .into_iter()
        .filter(|ins| {
            let pos = ins.pos as i64;
            by_chrom
                .get(ins.chrom.as_str())
                .map_or(true, |spans| {
                    !spans.iter().any(|&(s, e)| pos >= s && pos < e)
                })
        })
        .collect()
}

/// Count insertions per channel in fixed windows of `step` bp,
/// separately per chromosome. Windows that caught no insertion in
/// either channel do not appear; a zero in one channel of an emitted
/// bin is a measured zero.
pub fn bin_insertions(insertions: &[Insertion], step: i64) -> Vec<Bin> {
    let mut counts: BTreeMap<(String, i64), (u64, u64)> = BTreeMap::new();
    for ins in insertions {
        let start = (ins.pos as i64 / step) * step;
        let entry = counts.entry((ins.chrom.clone(), start)).or_default();
        match ins.chan {
            Channel::Low => entry.0 += 1,
            Channel::High => entry.1 += 1,
        }
    }

    let mut bins = Vec::with_capacity(counts.len());
    let mut last_chrom = String::new();
    let mut bin_id = 0;
    for ((chrom, start), (low, high)) in counts {
        if chrom != last_chrom {
            last_chrom = chrom.clone();
            bin_id = 0;
        }
        bin_id += 1;
        bins.push(Bin {
            chrom,
            bin: bin_id,
            start,
            end: start + step,
            low_counts: low,
            high_counts: high,
        });
    }
    bins
}

/// Score every bin with the shared enrichment statistic, using the
/// genome-wide channel sums as the reference frame, and apply the FDR
/// correction within each chromosome.
pub fn score_bins(bins: Vec<Bin>, opts: &ScoringOptions) -> Result<Vec<ScoredBin>> {
    let tot_low: u64 = bins.iter().map(|b| nonzero(b.low_counts)).sum();
    let tot_high: u64 = bins.iter().map(|b| nonzero(b.high_counts)).sum();

    let counts: Vec<(u64, u64)> = bins
        .iter()
        .map(|b| (b.low_counts, b.high_counts))
        .collect();
    let p = p_values(&counts, tot_low, tot_high, opts)?;

    // FDR scope is the chromosome, not the genome. Bins arrive grouped
    // by chromosome, so contiguous index ranges cover each group.
    let mut p_corr = vec![0.0; p.len()];
    let mut lo = 0;
    while lo < bins.len() {
        let chrom = &bins[lo].chrom;
        let hi = bins[lo..]
            .iter()
            .position(|b| &b.chrom != chrom)
            .map_or(bins.len(), |off| lo + off);
        for (i, q) in fdr(&p[lo..hi]).into_iter().enumerate() {
            p_corr[lo + i] = q;
        }
        lo = hi;
    }

    Ok(bins
        .into_iter()
        .zip(p.into_iter().zip(p_corr))
        .map(|(bin, (p, p_fdr))| ScoredBin {
            log2_mi: log2_mi(bin.low_counts, bin.high_counts, tot_low, tot_high),
            bin,
            p,
            p_fdr,
        })
        .collect())
}
