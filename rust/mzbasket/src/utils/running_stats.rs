use std::ops::AddAssign;

// Streaming aggregator used to collapse the rows of a component into a single
// representative value. It keeps the mean and the observed extent so both
// the replicate (mean) and basket (min/max) passes can share it.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingAggregatorError {
    NotEnoughData,
}

type Result<T> = std::result::Result<T, StreamingAggregatorError>;

/// Running mean and extent of a stream of numbers.
///
/// # Example
///
/// ```
/// use mzbasket::utils::RunningStats;
///
/// let mut calc = RunningStats::default();
/// calc.add(10.0);
/// calc.add(10.2);
/// calc.add(9.8);
/// assert!((calc.mean().unwrap() - 10.0).abs() < 1e-9);
/// assert_eq!(calc.min().unwrap(), 9.8);
/// assert_eq!(calc.max().unwrap(), 10.2);
/// assert_eq!(calc.count(), 3);
/// ```
///
/// # Notes
///
/// Values are folded in the order they are added, so the same sequence
/// always yields bit-identical results.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStats {
    count: u64,
    mean_n: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.count = 1;
            self.mean_n = value;
            self.min = value;
            self.max = value;
            return;
        }
        self.count += 1;
        let delta = value - self.mean_n;
        self.mean_n += delta / (self.count as f64);

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        // Rounding can push the mean a hair outside of the observed values.
        self.mean_n = self.mean_n.min(self.max).max(self.min);
    }

    pub fn mean(&self) -> Result<f64> {
        if self.count == 0 {
            return Err(StreamingAggregatorError::NotEnoughData);
        }
        Ok(self.mean_n)
    }

    pub fn min(&self) -> Result<f64> {
        if self.count == 0 {
            return Err(StreamingAggregatorError::NotEnoughData);
        }
        Ok(self.min)
    }

    pub fn max(&self) -> Result<f64> {
        if self.count == 0 {
            return Err(StreamingAggregatorError::NotEnoughData);
        }
        Ok(self.max)
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl FromIterator<f64> for RunningStats {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut out = Self::default();
        for x in iter {
            out.add(x);
        }
        out
    }
}

impl AddAssign for RunningStats {
    fn add_assign(&mut self, other: Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other;
            return;
        }
        let total = self.count + other.count;
        let delta = other.mean_n - self.mean_n;
        self.mean_n += delta * (other.count as f64 / total as f64);
        self.count = total;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.mean_n = self.mean_n.min(self.max).max(self.min);
    }
}
