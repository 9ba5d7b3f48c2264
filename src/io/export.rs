//! Posterior JSON export.
//!
//! The export carries everything needed to re-plot or compare a run later:
//! grid, log-posterior, evidence, both best candidates and the ranked extrema.
//!
//! JSON has no infinities, so `-inf` samples are written as `null`.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BestCandidate, ExtremaResultSet, PosteriorResult, RedshiftGrid};
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub redshifts: RedshiftGrid,
    /// `None` where the log-posterior is `-inf`.
    pub log_pdf: Vec<Option<f64>>,
    pub log_evidence: Option<f64>,
    pub best: Vec<BestCandidate>,
    #[serde(default)]
    pub extrema: ExtremaResultSet,
}

impl PosteriorFile {
    pub fn new(
        posterior: &PosteriorResult,
        best: Vec<BestCandidate>,
        extrema: ExtremaResultSet,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            tool: "zpdf".to_string(),
            generated_at: Utc::now(),
            redshifts: RedshiftGrid::new(posterior.redshifts.clone())?,
            log_pdf: posterior.log_pdf.iter().map(|&v| finite(v)).collect(),
            log_evidence: finite(posterior.log_evidence),
            best,
            extrema,
        })
    }

    pub fn posterior(&self) -> Result<PosteriorResult, EngineError> {
        if self.log_pdf.len() != self.redshifts.len() {
            return Err(EngineError::LengthMismatch {
                what: "log_pdf",
                expected: self.redshifts.len(),
                found: self.log_pdf.len(),
            });
        }
        Ok(PosteriorResult {
            redshifts: self.redshifts.as_slice().to_vec(),
            log_pdf: self.log_pdf.iter().map(|&v| or_neg_inf(v)).collect(),
            log_evidence: or_neg_inf(self.log_evidence),
        })
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn or_neg_inf(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NEG_INFINITY)
}

fn io_error(path: &Path, source: io::Error) -> EngineError {
    EngineError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Buffered write. Serializer and flush failures on the sink are reported as
/// `Io`; only a value serde cannot represent is a `Parse` error.
pub fn write_posterior_json(path: &Path, file: &PosteriorFile) -> Result<(), EngineError> {
    let out = File::create(path).map_err(|e| io_error(path, e))?;
    let mut writer = BufWriter::new(out);
    serde_json::to_writer_pretty(&mut writer, file).map_err(|e| {
        if e.is_io() {
            io_error(path, io::Error::from(e))
        } else {
            EngineError::Parse {
                path: path.display().to_string(),
                message: format!("failed to write posterior JSON: {e}"),
            }
        }
    })?;
    writer.flush().map_err(|e| io_error(path, e))
}

pub fn read_posterior_json(path: &Path) -> Result<PosteriorFile, EngineError> {
    let input = File::open(path).map_err(|e| io_error(path, e))?;
    serde_json::from_reader(input).map_err(|e| EngineError::Parse {
        path: path.display().to_string(),
        message: format!("invalid posterior JSON: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DecisionRule;
    use crate::error::AppError;

    #[test]
    fn json_round_trip_restores_negative_infinity() {
        let posterior = PosteriorResult {
            redshifts: vec![0.1, 0.2, 0.3],
            log_pdf: vec![-1.5, f64::NEG_INFINITY, -0.25],
            log_evidence: 0.125,
        };
        let best = vec![BestCandidate {
            rule: DecisionRule::BestProba,
            index: 2,
            redshift: 0.3,
            value: -0.25,
            model: None,
        }];
        let file = PosteriorFile::new(&posterior, best, ExtremaResultSet::default()).unwrap();
        assert_eq!(file.log_pdf[1], None);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posterior.json");
        write_posterior_json(&path, &file).unwrap();
        let back = read_posterior_json(&path).unwrap();

        assert_eq!(back, file);
        assert_eq!(back.posterior().unwrap(), posterior);
    }

    #[test]
    fn rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"tool\": 3}").unwrap();
        let err = read_posterior_json(&path).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Parse);

        std::fs::write(
            &path,
            r#"{"tool":"zpdf","generated_at":"2024-01-01T00:00:00Z","redshifts":[0.2,0.1],"log_pdf":[null,null],"log_evidence":null,"best":[]}"#,
        )
        .unwrap();
        assert!(read_posterior_json(&path).is_err());
    }

    #[test]
    fn full_device_reports_io_error() {
        let path = Path::new("/dev/full");
        if !path.exists() {
            return;
        }
        let posterior = PosteriorResult {
            redshifts: vec![0.1, 0.2],
            log_pdf: vec![-0.5, -1.0],
            log_evidence: 0.0,
        };
        let file = PosteriorFile::new(&posterior, vec![], ExtremaResultSet::default()).unwrap();

        let err = write_posterior_json(path, &file).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
        assert_eq!(AppError::from(err).exit_code(), 3);
    }
}
