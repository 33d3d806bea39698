use std::cmp::Ordering;

use anyhow::Result;
use statrs::distribution::{ContinuousCDF, Discrete, Hypergeometric, Normal};

use crate::models::SweepGrid;

/// Substitute for p-values of exactly 0 before taking log10.
pub const P_FLOOR: f64 = 1e-300;

/// Caller-supplied scoring knobs. The source screens were analyzed
/// with several slightly different constants over time, so none of
/// these are hard-coded at call sites.
#[derive(Debug, Clone, Copy)]
pub struct ScoringOptions {
    /// Approximate p-values below this are recomputed exactly. The
    /// normal approximation degrades around 1e-5.
    pub precision_floor: f64,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        ScoringOptions { precision_floor: 1e-5 }
    }
}

/// Zero counts are replaced by 1 before any ratio or log. This is a
/// deliberate smoothing policy carried over from the screen analysis
/// protocol, not an error fix.
pub fn nonzero(count: u64) -> u64 {
    count.max(1)
}

/// Odds-ratio-style enrichment of one cell's share of the high channel
/// against its share of the low channel:
/// `log2((high / (tot_high - high)) / (low / (tot_low - low)))`.
///
/// Totals are the channel grand sums of the reference frame (sweep
/// window for per-gene grids, whole genome for binned mode), computed
/// over zero-substituted counts.
pub fn log2_mi(low: u64, high: u64, tot_low: u64, tot_high: u64) -> f64 {
    let high = nonzero(high) as f64;
    let low = nonzero(low) as f64;
    let rest_high = (tot_high as f64 - high).max(1.0);
    let rest_low = (tot_low as f64 - low).max(1.0);
    ((high / rest_high) / (low / rest_low)).log2()
}

/// Two-sided Fisher's exact test on the 2x2 table `[[a, b], [c, d]]`,
/// summing all hypergeometric outcomes at most as probable as the
/// observed one.
pub fn fisher_exact(a: u64, b: u64, c: u64, d: u64) -> Result<f64> {
    let population = a + b + c + d;
    let successes = a + b;
    let draws = a + c;
    let dist = Hypergeometric::new(population, successes, draws)?;

    let observed = dist.pmf(a);
    // Tolerance keeps ties with the observed table in the sum despite
    // rounding in the pmf.
    let cutoff = observed * (1.0 + 1e-7);

    let lo = (successes + draws).saturating_sub(population);
    let hi = successes.min(draws);
    let mut p = 0.0;
    for x in lo..=hi {
        let pr = dist.pmf(x);
        if pr <= cutoff {
            p += pr;
        }
    }
    Ok(p.min(1.0))
}

/// Fast normal approximation to the two-sided Fisher test (continuity
/// corrected). Cheap enough to run over every cell of every gene, but
/// unreliable in the far tail; `p_values` re-does the small ones
/// exactly.
pub fn fisher_approx(a: u64, b: u64, c: u64, d: u64) -> Result<f64> {
    let population = (a + b + c + d) as f64;
    let successes = (a + b) as f64;
    let draws = (a + c) as f64;
    if population <= 1.0 {
        return Ok(1.0);
    }

    let mean = draws * successes / population;
    let var = mean * (1.0 - successes / population) * (population - draws)
        / (population - 1.0);
    if var <= 0.0 {
        return Ok(1.0);
    }

    let z = ((a as f64 - mean).abs() - 0.5).max(0.0) / var.sqrt();
    let norm = Normal::new(0.0, 1.0)?;
    Ok((2.0 * norm.cdf(-z)).min(1.0))
}

/// Two-phase p-value computation over `(low, high)` count pairs
/// against the channel totals: a bulk approximate pass, then exact
/// recomputation of every value below the precision floor. The second
/// pass is a correctness requirement, not an optimization.
pub fn p_values(
    counts: &[(u64, u64)],
    tot_low: u64,
    tot_high: u64,
    opts: &ScoringOptions,
) -> Result<Vec<f64>> {
    let mut p = Vec::with_capacity(counts.len());
    for &(low, high) in counts {
        p.push(fisher_approx(high, tot_high, low, tot_low)?);
    }
    for (i, &(low, high)) in counts.iter().enumerate() {
        if p[i] < opts.precision_floor {
            p[i] = fisher_exact(high, tot_high, low, tot_low)?;
        }
    }
    Ok(p)
}

/// Average (1-based) ranks with standard tie handling.
fn average_ranks(vals: &[f64]) -> Vec<f64> {
    let mut idx: Vec<usize> = (0..vals.len()).collect();
    idx.sort_by(|&i, &j| vals[i].partial_cmp(&vals[j]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; vals.len()];
    let mut i = 0;
    while i < idx.len() {
        let mut j = i;
        while j + 1 < idx.len() && vals[idx[j + 1]] == vals[idx[i]] {
            j += 1;
        }
        let avg = (i + j + 2) as f64 / 2.0;
        for &k in &idx[i..=j] {
            ranks[k] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Benjamini-Hochberg correction: scale each p-value by `n / rank`,
/// enforce monotonicity in rank order, clip to 1. Applied within one
/// gene's grid, or within one chromosome's bins in binned mode.
pub fn fdr(p_vals: &[f64]) -> Vec<f64> {
    if p_vals.is_empty() {
        return Vec::new();
    }
    let n = p_vals.len() as f64;
    let ranks = average_ranks(p_vals);

    let mut q: Vec<f64> = p_vals
        .iter()
        .zip(&ranks)
        .map(|(&p, &r)| (p * n / r).min(1.0))
        .collect();

    // Step-up: a smaller p must never end up with a larger corrected
    // value than the p-values ranked above it.
    let mut order: Vec<usize> = (0..p_vals.len()).collect();
    order.sort_by(|&i, &j| {
        p_vals[i].partial_cmp(&p_vals[j]).unwrap_or(Ordering::Equal)
    });
    let mut running = 1.0_f64;
    for &i in order.iter().rev() {
        running = running.min(q[i]);
        q[i] = running;
    }
    q
}

/// `-log10(p)` with the zero floor, for downstream delta columns.
pub fn neg_log10(p: f64) -> f64 {
    -(p.max(P_FLOOR)).log10()
}

/// Score one gene's grid in place: enrichment, two-phase p-values and
/// per-gene FDR. Used when count files carry raw counts instead of
/// upstream-computed statistics.
pub fn score_grid(grid: &mut SweepGrid, opts: &ScoringOptions) -> Result<()> {
    let tot_low: u64 = grid.iter().map(|(_, c)| nonzero(c.low_counts)).sum();
    let tot_high: u64 = grid.iter().map(|(_, c)| nonzero(c.high_counts)).sum();

    let counts: Vec<(u64, u64)> = grid
        .iter()
        .map(|(_, c)| (c.low_counts, c.high_counts))
        .collect();
    let p = p_values(&counts, tot_low, tot_high, opts)?;
    let p_fdr = fdr(&p);

    for (i, (_, cell)) in grid.iter_mut().enumerate() {
        cell.log2_mi = log2_mi(cell.low_counts, cell.high_counts, tot_low, tot_high);
        cell.p = p[i];
        cell.p_fdr = p_fdr[i];
    }
    Ok(())
}
