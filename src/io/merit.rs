//! Merit-curve text tables.
//!
//! Layout (as written by `OperatorResult::save`):
//!
//! ```text
//! #Redshifts	ChiSquare
//! 0.1	3.2e2
//! 0.2	2.9e2
//! #dTransposeD = {4	}
//! ```
//!
//! `#` lines are comments. Columns are tab-separated; plain whitespace also
//! works. Reading stops at the first row that does not parse and returns what
//! was read so far.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::domain::{MeritCurve, MeritKind};
use crate::error::EngineError;
use crate::operator::{MeritResult, OperatorResult};

/// Read a merit table from disk.
pub fn read_merit_curve(path: &Path, kind: MeritKind) -> Result<MeritCurve, EngineError> {
    let file = File::open(path).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_merit_table(file, &path.display().to_string(), kind)
}

/// Parse a merit table; `source` only labels errors and logs.
pub fn parse_merit_table<R: Read>(
    reader: R,
    source: &str,
    kind: MeritKind,
) -> Result<MeritCurve, EngineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut redshifts = Vec::new();
    let mut merits = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(source, row = idx + 1, error = %e, "unreadable row, stopping");
                break;
            }
        };

        let fields: Vec<&str> = if record.len() == 1 {
            record[0].split_whitespace().collect()
        } else {
            record.iter().collect()
        };
        if fields.is_empty() {
            continue;
        }

        match parse_row(&fields) {
            Some((z, m)) => {
                redshifts.push(z);
                merits.push(m);
            }
            None => {
                warn!(source, row = idx + 1, "unparsable row, stopping");
                break;
            }
        }
    }

    if redshifts.is_empty() {
        return Err(EngineError::Parse {
            path: source.to_string(),
            message: "no redshift samples".to_string(),
        });
    }
    debug!(source, samples = redshifts.len(), "read merit table");
    MeritCurve::new(kind, redshifts, merits)
}

fn parse_row(fields: &[&str]) -> Option<(f64, f64)> {
    let z = fields.first()?.parse::<f64>().ok()?;
    let m = fields.get(1)?.parse::<f64>().ok()?;
    Some((z, m))
}

/// Write `curve` in the table layout.
pub fn write_merit_curve(path: &Path, curve: &MeritCurve) -> Result<(), EngineError> {
    let io_err = |source| EngineError::Io {
        path: path.display().to_string(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut out = BufWriter::new(file);

    let result = MeritResult::new(curve.clone());
    let result = match curve.kind() {
        MeritKind::Correlation => OperatorResult::Correlation(result),
        MeritKind::ChiSquare => OperatorResult::ChiSquare(result),
    };
    result.save(&mut out).map_err(io_err)?;
    out.flush().map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RedshiftGrid;
    use crate::error::ErrorKind;

    #[test]
    fn parses_comments_tabs_and_spaces() {
        let text = "#Redshifts\tChiSquare\n0.1\t3.5e2\n0.2   2.0e2\n# note\n0.3\tnan\n";
        let curve = parse_merit_table(text.as_bytes(), "mem", MeritKind::ChiSquare).unwrap();
        assert_eq!(curve.redshifts(), &[0.1, 0.2, 0.3]);
        assert_eq!(curve.merits()[0], 350.0);
        assert!(curve.merits()[2].is_nan());
    }

    #[test]
    fn stops_at_first_bad_row() {
        let text = "0.1\t1.0\n0.2\t2.0\nbroken\t3.0\n0.4\t4.0\n";
        let curve = parse_merit_table(text.as_bytes(), "mem", MeritKind::ChiSquare).unwrap();
        assert_eq!(curve.len(), 2);

        let text = "0.1\n";
        let err = parse_merit_table(text.as_bytes(), "mem", MeritKind::ChiSquare).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn file_round_trip_keeps_exact_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chi2.txt");
        let grid = RedshiftGrid::new(vec![0.1, 0.30000000000000004, 1.7]).unwrap();
        let curve = MeritCurve::chi_square(&grid, vec![1.0 / 3.0, 1e300, f64::INFINITY]).unwrap();

        write_merit_curve(&path, &curve).unwrap();
        let back = read_merit_curve(&path, MeritKind::ChiSquare).unwrap();
        assert_eq!(back, curve);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_merit_curve(&dir.path().join("nope.txt"), MeritKind::ChiSquare).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
