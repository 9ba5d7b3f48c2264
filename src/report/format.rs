//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the numeric code stays free of presentation concerns
//! - output changes are localized (tables are covered by snapshot tests)

use crate::domain::{BestCandidate, ExtremaResultSet, PosteriorResult, SolveConfig};
use crate::solve::BlindSolveSummary;

const CANDIDATE_HEADER: &str = "rule            index          z            value  model";
const CANDIDATE_RULE: &str = "------------ -------- ---------- ---------------- ------";
const EXTREMA_HEADER: &str = "   #          z            merit  lines>cut strong";
const EXTREMA_RULE: &str = "---- ---------- ---------------- ---------- -------";

/// Header block: grid, models, evidence, support.
pub fn format_run_summary(
    title: &str,
    posterior: &PosteriorResult,
    n_models: usize,
    config: &SolveConfig,
) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== zpdf - Redshift posterior ({title}) ===\n"));
    let grid = match (posterior.redshifts.first(), posterior.redshifts.last()) {
        (Some(first), Some(last)) => {
            format!("Grid: n={} | z=[{first:.5}, {last:.5}]\n", posterior.len())
        }
        _ => "Grid: empty\n".to_string(),
    };
    out.push_str(&grid);

    let cst_log = config.cst_log;
    out.push_str(&format!("Models: n={n_models} | cstLog={cst_log}\n"));
    if !config.model_priors.is_empty() {
        let priors = fmt_vec(&config.model_priors);
        out.push_str(&format!("Model priors: {priors}\n"));
    }
    let evidence = fmt_log(posterior.log_evidence);
    out.push_str(&format!("Log-evidence: {evidence}\n"));

    let supported = posterior.log_pdf.iter().filter(|v| v.is_finite()).count();
    let n = posterior.len();
    out.push_str(&format!("Support: {supported}/{n} samples\n"));
    out.push('\n');

    out
}

/// Best candidates, one row per decision rule.
pub fn format_candidates(best: &[BestCandidate]) -> String {
    let mut out = String::new();
    out.push_str("Best redshift:\n");
    push_row(&mut out, CANDIDATE_HEADER);
    push_row(&mut out, CANDIDATE_RULE);

    for b in best {
        let (rule, index, z) = (b.rule.display_name(), b.index, b.redshift);
        let value = fmt_log(b.value);
        let model = b.model.map_or_else(|| "-".to_string(), |m| m.to_string());
        let row = format!("{rule:<12} {index:>8} {z:>10.5} {value:>16} {model:>6}");
        push_row(&mut out, &row);
    }

    out
}

/// Ranked extrema with their line diagnostics.
pub fn format_extrema(extrema: &ExtremaResultSet) -> String {
    let mut out = String::new();
    out.push_str("Extrema (best first):\n");
    if extrema.is_empty() {
        out.push_str("  (none)\n");
        return out;
    }

    push_row(&mut out, EXTREMA_HEADER);
    push_row(&mut out, EXTREMA_RULE);

    for (i, e) in extrema.entries.iter().enumerate() {
        let (z, merit, lines) = (e.redshift, fmt_log(e.merit), e.strong_lines_over_cut);
        let strong = if e.strong_line_present { "yes" } else { "no" };
        let row = format!("{i:>4} {z:>10.5} {merit:>16} {lines:>10} {strong:<7}");
        push_row(&mut out, &row);
    }

    out
}

pub fn format_blind_summary(summary: &BlindSolveSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("Templates solved: {}\n", summary.solved.len()));
    for (template, reason) in &summary.skipped {
        out.push_str(&format!("  (skipped {template}) {reason}\n"));
    }
    out
}

fn push_row(out: &mut String, row: &str) {
    out.push_str(row.trim_end());
    out.push('\n');
}

fn fmt_log(v: f64) -> String {
    if v == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{v:.4}")
    }
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.6}")).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DecisionRule, ExtremaEntry};

    #[test]
    fn candidates_table_snapshot() {
        let best = vec![
            BestCandidate {
                rule: DecisionRule::BestProba,
                index: 7,
                redshift: 0.07,
                value: -7.5,
                model: None,
            },
            BestCandidate {
                rule: DecisionRule::BestChi2,
                index: 5,
                redshift: 0.05,
                value: 10.0,
                model: Some(0),
            },
        ];
        let expected = concat!(
            "Best redshift:\n",
            "rule            index          z            value  model\n",
            "------------ -------- ---------- ---------------- ------\n",
            "best-proba          7    0.07000          -7.5000      -\n",
            "best-chi2           5    0.05000          10.0000      0\n",
        );
        assert_eq!(format_candidates(&best), expected);
    }

    #[test]
    fn extrema_table_snapshot() {
        let set = ExtremaResultSet {
            entries: vec![ExtremaEntry {
                redshift: 1.2345,
                merit: 0.75,
                strong_lines_over_cut: 2,
                strong_line_present: true,
            }],
        };
        let expected = concat!(
            "Extrema (best first):\n",
            "   #          z            merit  lines>cut strong\n",
            "---- ---------- ---------------- ---------- -------\n",
            "   0    1.23450           0.7500          2 yes\n",
        );
        assert_eq!(format_extrema(&set), expected);
        let empty = format_extrema(&ExtremaResultSet::default());
        assert_eq!(empty, "Extrema (best first):\n  (none)\n");
    }

    #[test]
    fn summary_reports_support_and_evidence() {
        let posterior = PosteriorResult {
            redshifts: vec![0.0, 0.5, 1.0],
            log_pdf: vec![-1.0, f64::NEG_INFINITY, -2.0],
            log_evidence: -0.6867,
        };
        let txt = format_run_summary("demo", &posterior, 2, &SolveConfig::default());
        assert!(txt.contains("Grid: n=3 | z=[0.00000, 1.00000]"));
        assert!(txt.contains("Log-evidence: -0.6867"));
        assert!(txt.contains("Support: 2/3 samples"));
    }
}
