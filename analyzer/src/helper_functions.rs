use std::env;
use std::path::PathBuf;

/// Root of the data tree. Falls back to the current directory so the
/// binary can be run from a checkout without any setup.
pub fn project_root() -> PathBuf {
    match env::var_os("PROJECT_ROOT") {
        Some(val) => PathBuf::from(val),
        None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Flag report filename carrying the thresholds it was produced with.
pub fn flag_report_filename(slope_thr: f64, p_thr: f64) -> String {
    format!("flags_sl-thr={}_p-thr={}.csv", slope_thr, p_thr)
}

/// Optimization report filename carrying its improvement threshold.
pub fn optimized_report_filename(delta_mi_thr: f64) -> String {
    format!("optimized-mi_delta-thr={}.csv", delta_mi_thr)
}
