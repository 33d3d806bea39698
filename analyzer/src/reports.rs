use std::fs::{create_dir_all, File};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::models::{AnalyzeError, Flag, OptimizedResult, ScreenParams};

/// Reports are append-only analysis artifacts: an existing file is
/// never overwritten, the caller has to delete or rename it first.
fn create_report_file(path: &Path) -> Result<File> {
    if path.exists() {
        return Err(AnalyzeError::ReportExists(path.to_path_buf()).into());
    }
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("creating report {}", path.display()))
}

/// One row per flagged (gene, configuration, direction).
pub fn write_flag_report(path: &Path, flags: &[Flag]) -> Result<()> {
    let file = create_report_file(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for flag in flags {
        writer.serialize(flag)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = flags.len(), "wrote flag report");
    Ok(())
}

/// One row per optimized gene, optimal and baseline values side by
/// side.
pub fn write_optimized_report(path: &Path, results: &[OptimizedResult]) -> Result<()> {
    let file = create_report_file(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for result in results {
        writer.serialize(result)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = results.len(), "wrote optimization report");
    Ok(())
}

/// One row per scored genomic window of a binned whole-genome run.
pub fn write_binned_report(path: &Path, bins: &[crate::analysis::binned::ScoredBin]) -> Result<()> {
    let file = create_report_file(path)?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record([
        "chrom", "bin", "start", "end", "low_counts", "high_counts", "log2_mi", "p", "p_fdr",
    ])?;
    for sb in bins {
        writer.write_record([
            sb.bin.chrom.clone(),
            sb.bin.bin.to_string(),
            sb.bin.start.to_string(),
            sb.bin.end.to_string(),
            sb.bin.low_counts.to_string(),
            sb.bin.high_counts.to_string(),
            sb.log2_mi.to_string(),
            sb.p.to_string(),
            sb.p_fdr.to_string(),
        ])?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = bins.len(), "wrote binned report");
    Ok(())
}

/// Drop a `params.json` next to the reports so a result directory is
/// self-describing.
pub fn write_params_json(out_dir: &Path, params: &ScreenParams) -> Result<()> {
    create_dir_all(out_dir)
        .with_context(|| format!("creating report directory {}", out_dir.display()))?;
    let file = File::create(out_dir.join("params.json"))?;
    serde_json::to_writer_pretty(file, params)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FlagDirection;

    fn flags() -> Vec<Flag> {
        vec![Flag {
            gene_name: "GENE".to_string(),
            srt_off: -500,
            end_off: 0,
            direction: FlagDirection::Start,
        }]
    }

    #[test]
    fn flag_report_has_header_and_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("flags/flags.csv");
        write_flag_report(&path, &flags()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("gene_name,srt_off,end_off,direction"));
        assert_eq!(lines.next(), Some("GENE,-500,0,start"));
    }

    #[test]
    fn existing_report_is_never_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("flags.csv");
        write_flag_report(&path, &flags()).unwrap();

        let err = write_flag_report(&path, &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalyzeError>(),
            Some(AnalyzeError::ReportExists(_))
        ));
        // The original rows survive the refused second write.
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("GENE"));
    }

    #[test]
    fn optimized_report_round_trips_columns() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("optimized.csv");
        let result = OptimizedResult {
            gene_name: "GENE".to_string(),
            screen: "screen-a".to_string(),
            mi_at_tx: 2.0,
            p_at_tx: 1e-4,
            p_fdr_at_tx: 1e-3,
            low_at_tx: 10,
            high_at_tx: 40,
            mi_opt: 5.0,
            p_opt: 1e-9,
            p_fdr_opt: 1e-8,
            low_opt: 5,
            high_opt: 80,
            srt_off_opt: -500,
            end_off_opt: 0,
            delta_log2_mi: 3.0,
            delta_log10_p: 5.0,
        };
        write_optimized_report(&path, &[result]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("gene_name,screen,mi_at_tx,"));
        assert!(content.contains("GENE,screen-a,2.0,"));
    }
}
