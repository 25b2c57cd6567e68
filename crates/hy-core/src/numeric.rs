use crate::CoreError;

/// Floating point type used throughout the engine
pub type Real = f64;

/// Absolute and relative tolerance pair.
///
/// Used both as a convergence test ([`Tolerances::accepts`]) and as the error
/// model of the adaptive solver ([`Tolerances::weighted_rms_error`]).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

impl Tolerances {
    pub fn new(abs: Real, rel: Real) -> Self {
        Self { abs, rel }
    }

    /// Both tolerances must be finite and non-negative.
    pub fn validate(&self) -> Result<(), CoreError> {
        ensure_finite(self.abs, "absolute tolerance")?;
        ensure_finite(self.rel, "relative tolerance")?;
        if self.abs < 0.0 || self.rel < 0.0 {
            return Err(CoreError::InvalidArg {
                what: "tolerances must be non-negative",
            });
        }
        Ok(())
    }

    /// True when a change `delta` of a quantity of size `reference` is within
    /// `abs + rel * |reference|`.
    pub fn accepts(&self, delta: Real, reference: Real) -> bool {
        delta.abs() <= self.abs + self.rel * reference.abs()
    }

    /// Error weight of one component: `abs + rel * max(|y|, |y_new|)`.
    pub fn weight(&self, y: Real, y_new: Real) -> Real {
        self.abs + self.rel * y.abs().max(y_new.abs())
    }

    /// Weighted RMS norm of a local error estimate.
    ///
    /// Components flagged in `ignored` do not contribute and do not count
    /// toward the mean. Returns 0 when every component is ignored.
    pub fn weighted_rms_error(
        &self,
        err: &[Real],
        y: &[Real],
        y_new: &[Real],
        ignored: &[bool],
    ) -> Real {
        let mut sum = 0.0;
        let mut count = 0usize;
        for i in 0..err.len() {
            if ignored.get(i).copied().unwrap_or(false) {
                continue;
            }
            let scaled = err[i] / self.weight(y[i], y_new[i]);
            sum += scaled * scaled;
            count += 1;
        }
        if count == 0 {
            0.0
        } else {
            (sum / count as Real).sqrt()
        }
    }
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Ensure a strictly positive, finite value.
pub fn ensure_positive(v: Real, what: &'static str) -> Result<Real, CoreError> {
    let v = ensure_finite(v, what)?;
    if v > 0.0 {
        Ok(v)
    } else {
        Err(CoreError::InvalidArg { what })
    }
}
