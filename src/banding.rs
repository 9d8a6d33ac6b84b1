//! Verdict banding: maps a scalar onto an ordered set of labels.
//!
//! Every verdict in the engine (PSI stability, calibration quality, null-rate
//! quality, coverage, dropout impact, resilience) goes through one
//! [`Banding`] so that boundaries behave the same way everywhere.
//!
//! ```
//! use u_modelrisk::banding::{Banding, Closed};
//!
//! let psi = Banding::new(vec![0.1, 0.25], vec!["stable", "moderate", "significant"], Closed::Right)
//!     .unwrap();
//! assert_eq!(psi.classify(0.05), Some("stable"));
//! assert_eq!(psi.classify(0.25), Some("moderate"));
//! assert_eq!(psi.classify(0.30), Some("significant"));
//! assert_eq!(psi.classify(f64::NAN), None);
//! ```

use crate::error::RiskError;

/// Which side of each band interval contains its cutpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closed {
    /// `[c_{i-1}, c_i)`: a value equal to a cutpoint falls in the upper band.
    Left,
    /// `(c_{i-1}, c_i]`: a value equal to a cutpoint stays in the lower band.
    Right,
}

/// Ascending cutpoints with one label per resulting interval.
#[derive(Debug, Clone)]
pub struct Banding<L> {
    cutpoints: Vec<f64>,
    labels: Vec<L>,
    closed: Closed,
}

impl<L: Copy> Banding<L> {
    /// Creates a banding. Requires `labels.len() == cutpoints.len() + 1`
    /// and strictly ascending finite cutpoints.
    pub fn new(cutpoints: Vec<f64>, labels: Vec<L>, closed: Closed) -> Result<Self, RiskError> {
        if labels.len() != cutpoints.len() + 1 {
            return Err(RiskError::DimensionMismatch {
                expected: cutpoints.len() + 1,
                actual: labels.len(),
            });
        }
        if cutpoints.iter().any(|c| !c.is_finite()) || cutpoints.windows(2).any(|w| w[0] >= w[1]) {
            return Err(RiskError::InvalidParameter {
                name: "cutpoints".into(),
                message: "must be finite and strictly ascending".into(),
            });
        }
        Ok(Self {
            cutpoints,
            labels,
            closed,
        })
    }

    /// Band for `value`; `None` for NaN so undefined metrics never reach a
    /// verdict.
    pub fn classify(&self, value: f64) -> Option<L> {
        if value.is_nan() {
            return None;
        }
        let idx = self
            .cutpoints
            .iter()
            .position(|&c| match self.closed {
                Closed::Left => value < c,
                Closed::Right => value <= c,
            })
            .unwrap_or(self.cutpoints.len());
        Some(self.labels[idx])
    }

    /// Band for an optional value.
    pub fn classify_opt(&self, value: Option<f64>) -> Option<L> {
        value.and_then(|v| self.classify(v))
    }

    /// The cutpoints.
    pub fn cutpoints(&self) -> &[f64] {
        &self.cutpoints
    }
}

/// Builds a banding from compile-time constants. Only used with literal
/// tables that are known to be ascending.
pub(crate) fn fixed<L: Copy>(cutpoints: &[f64], labels: &[L], closed: Closed) -> Banding<L> {
    Banding {
        cutpoints: cutpoints.to_vec(),
        labels: labels.to_vec(),
        closed,
    }
}
