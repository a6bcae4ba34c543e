//! Recorded loop trajectories
//!
//! [`Trend`] holds the four time-aligned series a run produces. It is
//! append-only while the clock runs and is the single source of truth for
//! both the control computation and any display or export collaborator.

use serde::{Deserialize, Serialize};

/// One time-aligned sample of all four series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Time in seconds
    pub t: f64,
    /// Measured process output
    pub y: f64,
    /// Controller output
    pub co: f64,
    /// Setpoint
    pub ysp: f64,
}

/// Process trend: `t`, `y`, `co` and `ysp` series of equal length
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    t: Vec<f64>,
    y: Vec<f64>,
    co: Vec<f64>,
    ysp: Vec<f64>,
}

impl Trend {
    /// Trend holding only the initial sample
    pub fn new(initial: Sample) -> Self {
        let mut trend = Self::default();
        trend.push(initial);
        trend
    }

    /// Build a trend from recorded series
    ///
    /// Returns `None` if the series lengths differ.
    pub fn from_series(t: Vec<f64>, y: Vec<f64>, co: Vec<f64>, ysp: Vec<f64>) -> Option<Self> {
        let n = t.len();
        (y.len() == n && co.len() == n && ysp.len() == n).then_some(Self { t, y, co, ysp })
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn t(&self) -> &[f64] {
        &self.t
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn co(&self) -> &[f64] {
        &self.co
    }

    pub fn ysp(&self) -> &[f64] {
        &self.ysp
    }

    pub fn sample(&self, index: usize) -> Option<Sample> {
        self.view().sample(index)
    }

    pub fn last(&self) -> Option<Sample> {
        self.len().checked_sub(1).and_then(|i| self.sample(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        (0..self.len()).filter_map(move |i| self.sample(i))
    }

    /// Borrowed view of the whole trend
    pub fn view(&self) -> TrendView<'_> {
        TrendView {
            t: &self.t,
            y: &self.y,
            co: &self.co,
            ysp: &self.ysp,
        }
    }

    /// Trailing samples covering the last `span` seconds
    ///
    /// Includes every sample with `t >= t_last - span`.
    pub fn window(&self, span: f64) -> TrendView<'_> {
        let start = match self.t.last() {
            Some(&last) => self.t.partition_point(|&t| t < last - span.max(0.0)),
            None => 0,
        };
        TrendView {
            t: &self.t[start..],
            y: &self.y[start..],
            co: &self.co[start..],
            ysp: &self.ysp[start..],
        }
    }

    pub(crate) fn push(&mut self, sample: Sample) {
        self.t.push(sample.t);
        self.y.push(sample.y);
        self.co.push(sample.co);
        self.ysp.push(sample.ysp);
    }
}

/// Read-only view over a contiguous range of a [`Trend`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendView<'a> {
    t: &'a [f64],
    y: &'a [f64],
    co: &'a [f64],
    ysp: &'a [f64],
}

impl<'a> TrendView<'a> {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn t(&self) -> &'a [f64] {
        self.t
    }

    pub fn y(&self) -> &'a [f64] {
        self.y
    }

    pub fn co(&self) -> &'a [f64] {
        self.co
    }

    pub fn ysp(&self) -> &'a [f64] {
        self.ysp
    }

    pub fn sample(&self, index: usize) -> Option<Sample> {
        Some(Sample {
            t: *self.t.get(index)?,
            y: *self.y.get(index)?,
            co: *self.co.get(index)?,
            ysp: *self.ysp.get(index)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Sample> + 'a {
        let view = *self;
        (0..view.len()).filter_map(move |i| view.sample(i))
    }

    /// Min and max of `y` and `ysp` together, for scaling a process axis
    pub fn process_range(&self) -> Option<(f64, f64)> {
        range(self.y.iter().chain(self.ysp))
    }

    /// Min and max of `co`, for scaling an output axis
    pub fn output_range(&self) -> Option<(f64, f64)> {
        range(self.co.iter())
    }
}

fn range<'a>(values: impl Iterator<Item = &'a f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(k: usize) -> Sample {
        Sample {
            t: k as f64 * 0.5,
            y: 50.0 + k as f64,
            co: 40.0 - k as f64,
            ysp: 52.0,
        }
    }

    fn trend(n: usize) -> Trend {
        let mut trend = Trend::new(sample(0));
        for k in 1..n {
            trend.push(sample(k));
        }
        trend
    }

    #[test]
    fn test_new_holds_initial_sample() {
        let trend = Trend::new(sample(0));
        assert_eq!(trend.len(), 1);
        assert_eq!(trend.last(), Some(sample(0)));
    }

    #[test]
    fn test_series_stay_aligned() {
        let trend = trend(10);
        assert_eq!(trend.t().len(), 10);
        assert_eq!(trend.y().len(), 10);
        assert_eq!(trend.co().len(), 10);
        assert_eq!(trend.ysp().len(), 10);
        assert_eq!(trend.sample(3), Some(sample(3)));
        assert_eq!(trend.sample(10), None);
        assert_eq!(trend.iter().count(), 10);
    }

    #[test]
    fn test_window_keeps_trailing_span() {
        let trend = trend(10); // t = 0.0 ..= 4.5
        let window = trend.window(1.0);
        assert_eq!(window.t(), &[3.5, 4.0, 4.5]);
        assert_eq!(window.y(), &[57.0, 58.0, 59.0]);

        assert_eq!(trend.window(100.0).len(), 10);
        assert_eq!(trend.window(0.0).len(), 1);
    }

    #[test]
    fn test_window_ranges() {
        let trend = trend(4);
        let view = trend.window(1.0);
        assert_eq!(view.process_range(), Some((51.0, 53.0)));
        assert_eq!(view.output_range(), Some((37.0, 39.0)));
        assert_eq!(Trend::default().view().process_range(), None);
    }

    #[test]
    fn test_from_series_checks_lengths() {
        assert!(Trend::from_series(vec![0.0], vec![1.0], vec![2.0], vec![3.0]).is_some());
        assert!(Trend::from_series(vec![0.0], vec![1.0, 2.0], vec![2.0], vec![3.0]).is_none());
    }
}
