use std::collections::BTreeMap;

use tracing::warn;

use crate::analysis::flagging::get_flagged_genes;
use crate::analysis::scoring::neg_log10;
use crate::models::{Flag, OptimizedResult, SweepGrid};

/// For each flagged gene, find the configuration that pushes the
/// enrichment furthest in the direction of its baseline sign: maximize
/// for genes enriched at the transcript boundaries, minimize for
/// depleted ones. The improvement over the (0, 0) baseline must exceed
/// `delta_mi_thr` or the gene is dropped from the output.
///
/// Returning an empty vector is a valid outcome, not a failure.
pub fn optimize_flagged_genes(
    flags: &[Flag],
    sweeps: &BTreeMap<String, SweepGrid>,
    screen: &str,
    delta_mi_thr: f64,
) -> Vec<OptimizedResult> {
    let mut results = Vec::new();

    for gene in get_flagged_genes(flags) {
        let Some(grid) = sweeps.get(&gene) else {
            warn!(gene = %gene, "flagged gene has no sweep grid, skipping");
            continue;
        };
        let Some(baseline) = grid.baseline() else {
            warn!(gene = %gene, "no counts at the transcript boundaries, skipping");
            continue;
        };

        let enriched = baseline.log2_mi >= 0.0;
        let best = grid.iter().max_by(|(_, a), (_, b)| {
            let (a, b) = (a.log2_mi, b.log2_mi);
            if enriched {
                a.total_cmp(&b)
            } else {
                b.total_cmp(&a)
            }
        });
        let Some((&(srt_off, end_off), best)) = best else {
            continue;
        };

        let improvement = if enriched {
            best.log2_mi - baseline.log2_mi
        } else {
            baseline.log2_mi - best.log2_mi
        };
        if improvement <= delta_mi_thr {
            continue;
        }

        results.push(OptimizedResult {
            gene_name: gene.clone(),
            screen: screen.to_string(),
            mi_at_tx: baseline.log2_mi,
            p_at_tx: baseline.p,
            p_fdr_at_tx: baseline.p_fdr,
            low_at_tx: baseline.low_counts,
            high_at_tx: baseline.high_counts,
            mi_opt: best.log2_mi,
            p_opt: best.p,
            p_fdr_opt: best.p_fdr,
            low_opt: best.low_counts,
            high_opt: best.high_counts,
            srt_off_opt: srt_off,
            end_off_opt: end_off,
            delta_log2_mi: best.log2_mi - baseline.log2_mi,
            delta_log10_p: neg_log10(best.p) - neg_log10(baseline.p),
        });
    }
    results
}
