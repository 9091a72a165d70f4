//! Time-of-flight event types and traits.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single weighted event from an external event source.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Event {
    /// Time of flight (or any binned independent variable).
    pub tof: f64,
    /// Event weight.
    pub weight: f64,
    /// Standard deviation of the weight.
    pub weight_error: f64,
}

impl Event {
    /// Creates a weighted event.
    #[inline]
    #[must_use]
    pub fn new(tof: f64, weight: f64, weight_error: f64) -> Self {
        Self {
            tof,
            weight,
            weight_error,
        }
    }

    /// Creates a raw detector count: weight 1 with unit error.
    #[inline]
    #[must_use]
    pub fn unweighted(tof: f64) -> Self {
        Self::new(tof, 1.0, 1.0)
    }
}

impl From<(f64, f64, f64)> for Event {
    #[inline]
    fn from((tof, weight, weight_error): (f64, f64, f64)) -> Self {
        Self::new(tof, weight, weight_error)
    }
}

/// Trait for anything that can be binned as a weighted event.
///
/// Lets the accumulator consume loader-specific event types without
/// converting them to [`Event`] first.
pub trait WeightedEvent {
    /// Returns the binned coordinate.
    fn tof(&self) -> f64;

    /// Returns the event weight.
    #[inline]
    fn weight(&self) -> f64 {
        1.0
    }

    /// Returns the standard deviation of the weight.
    #[inline]
    fn weight_error(&self) -> f64 {
        1.0
    }

    /// Returns the variance contributed by this event.
    #[inline]
    fn variance(&self) -> f64 {
        let error = self.weight_error();
        error * error
    }
}

impl WeightedEvent for Event {
    #[inline]
    fn tof(&self) -> f64 {
        self.tof
    }

    #[inline]
    fn weight(&self) -> f64 {
        self.weight
    }

    #[inline]
    fn weight_error(&self) -> f64 {
        self.weight_error
    }
}

impl<E: WeightedEvent> WeightedEvent for &E {
    #[inline]
    fn tof(&self) -> f64 {
        (**self).tof()
    }

    #[inline]
    fn weight(&self) -> f64 {
        (**self).weight()
    }

    #[inline]
    fn weight_error(&self) -> f64 {
        (**self).weight_error()
    }
}

/// A bare time of flight is an unweighted count.
impl WeightedEvent for f64 {
    #[inline]
    fn tof(&self) -> f64 {
        *self
    }
}
