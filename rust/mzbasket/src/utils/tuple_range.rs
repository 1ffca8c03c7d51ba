use thiserror::Error;

/// TupleRange represents a range defined by a tuple of two elements (T, T).
///
/// It represents a range as closed-closed [a, b], meaning both endpoints are inclusive.
/// Importantly, it ensures that the first element is always less than or equal to the second,
/// so a box built from a tolerance window can never be "inside out".
///
/// Since both ends are inclusive, two ranges that only touch at an endpoint
/// still intersect.
///
/// ```
/// use mzbasket::utils::TupleRange;
///
/// let left = TupleRange::try_new(1.0, 2.0).unwrap();
/// let right = TupleRange::try_new(2.0, 3.0).unwrap();
/// assert!(left.intersects(right));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TupleRange<T: Copy + PartialOrd>(T, T);

#[derive(Error, Debug)]
pub enum TupleRangeError<T: Copy + PartialOrd + std::fmt::Debug> {
    #[error(
        "Expected the first element to be less than or equal to the second, got ({0:?}, {1:?})"
    )]
    ExpectedOrderedRange(T, T),
}

impl<T: Copy + PartialOrd + std::fmt::Debug> TupleRange<T> {
    /// Creates a new `TupleRange` ensuring that the first element
    /// is less than or equal to the second.
    ///
    /// Note that incomparable values (NaN) are rejected as well.
    pub fn try_new(left: T, right: T) -> Result<Self, TupleRangeError<T>> {
        match left.partial_cmp(&right) {
            Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal) => {
                Ok(Self(left, right))
            }
            _ => Err(TupleRangeError::ExpectedOrderedRange(left, right)),
        }
    }

    pub fn as_tuple(&self) -> (T, T) {
        (self.0, self.1)
    }

    pub fn contains(&self, x: T) -> bool {
        self.0 <= x && x <= self.1
    }

    pub fn start(&self) -> T {
        self.0
    }

    pub fn end(&self) -> T {
        self.1
    }

    /// Closed interval overlap: `a.start <= b.end && b.start <= a.end`.
    pub fn intersects(&self, other: Self) -> bool {
        self.start() <= other.end() && other.start() <= self.end()
    }

    /// Smallest range containing both `self` and `other`.
    pub fn union(&self, other: Self) -> Self {
        let start = if other.start() < self.start() {
            other.start()
        } else {
            self.start()
        };
        let end = if other.end() > self.end() {
            other.end()
        } else {
            self.end()
        };
        Self(start, end)
    }
}

impl TupleRange<f64> {
    pub fn width(&self) -> f64 {
        self.1 - self.0
    }

    pub fn center(&self) -> f64 {
        self.0 + (self.width() / 2.0)
    }
}
