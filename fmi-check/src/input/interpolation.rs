//! Interpolation of input samples at a query time.
//!
//! Continuous reals are interpolated linearly between the bracketing rows, every other input
//! holds the value of the last sample at or before the query time. Query times must be
//! non-decreasing over a simulation run: the bracketing cursor only moves forward.

use crate::ledger::{Buffer, BufferLedger};

use super::InputData;

#[derive(Debug)]
pub struct InterpolationState {
    last_query_time: Option<f64>,
    idx1: usize,
    idx2: usize,
    discrete_index: usize,
    lambda: f64,
    /// One value per real input, in catalog order.
    reals: Buffer<f64>,
    /// The continuous subset of `reals`.
    continuous_reals: Buffer<f64>,
}

impl InterpolationState {
    /// Create the state and prime it one time unit before the first sample, so that the first
    /// real query is computed from scratch.
    pub fn new(data: &InputData, ledger: &BufferLedger) -> Self {
        let mut state = Self {
            last_query_time: None,
            idx1: 0,
            idx2: 0,
            discrete_index: 0,
            lambda: 0.0,
            reals: ledger.alloc(data.catalog.real_inputs().len()),
            continuous_reals: ledger.alloc(data.catalog.continuous_reals().len()),
        };
        if let Some(t0) = data.series.first_time() {
            state.update(data, t0 - 1.0);
        }
        state
    }

    /// Bring the interpolated values to time `t`.
    ///
    /// A repeated query for the same time is a no-op.
    pub fn update(&mut self, data: &InputData, t: f64) {
        if self.last_query_time == Some(t) {
            return;
        }
        self.last_query_time = Some(t);

        let ts = data.series.timestamps();
        let Some(last) = ts.len().checked_sub(1) else {
            return;
        };

        if t <= ts[0] {
            self.idx1 = 0;
            self.idx2 = 0;
            self.discrete_index = 0;
            self.lambda = 0.0;
        } else if t >= ts[last] {
            self.idx1 = last;
            self.idx2 = last;
            self.discrete_index = last;
            self.lambda = 1.0;
        } else {
            debug_assert!(
                self.idx2 == 0 || ts[self.idx2 - 1] < t,
                "input interpolation queried with decreasing time {t}"
            );
            while ts[self.idx2] < t {
                self.idx2 += 1;
            }
            self.discrete_index = if ts[self.idx2] == t {
                self.idx2
            } else {
                self.idx2 - 1
            };
            self.idx1 = self.idx2 - 1;
            self.lambda = (t - ts[self.idx1]) / (ts[self.idx2] - ts[self.idx1]);
        }

        self.compute_reals(data);
    }

    fn compute_reals(&mut self, data: &InputData) {
        let r1 = data.series.real_row(self.idx1);
        let r2 = data.series.real_row(self.idx2);
        let rd = data.series.real_row(self.discrete_index);

        for &i in data.catalog.continuous_reals() {
            self.reals[i] = r1[i] * (1.0 - self.lambda) + r2[i] * self.lambda;
        }
        for &i in data.catalog.discrete_reals() {
            self.reals[i] = rd[i];
        }
        for (dst, &i) in self
            .continuous_reals
            .iter_mut()
            .zip(data.catalog.continuous_reals())
        {
            *dst = self.reals[i];
        }
    }

    /// Take the discrete values from `row` instead of the held sample, leaving the continuous
    /// values as they are. Used when an external event makes a new row effective.
    pub fn hold_row(&mut self, data: &InputData, row: usize) {
        self.discrete_index = row;
        let rd = data.series.real_row(row);
        for &i in data.catalog.discrete_reals() {
            self.reals[i] = rd[i];
        }
    }

    pub fn reals(&self) -> &[f64] {
        &self.reals
    }

    pub fn continuous_reals(&self) -> &[f64] {
        &self.continuous_reals
    }

    pub fn integers<'a>(&self, data: &'a InputData) -> &'a [i32] {
        data.series.integer_row(self.discrete_index)
    }

    pub fn booleans<'a>(&self, data: &'a InputData) -> &'a [bool] {
        data.series.boolean_row(self.discrete_index)
    }

    /// The bracketing rows `(idx1, idx2)`.
    pub fn indices(&self) -> (usize, usize) {
        (self.idx1, self.idx2)
    }

    pub fn discrete_index(&self) -> usize {
        self.discrete_index
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    use super::*;
    use crate::models::{feedthrough::Feedthrough, UserModel};

    fn data(text: &str) -> InputData {
        InputData::from_text(text, &Feedthrough::model_description()).unwrap()
    }

    fn ramp() -> InputData {
        data(
            "time,Float64_continuous_input,Float64_discrete_input,Int32_input,Boolean_input\n\
             0,10,1,5,0\n\
             1,20,2,6,1\n\
             3,40,3,7,0\n",
        )
    }

    #[test]
    fn test_linear() {
        let data = data("time,Float64_continuous_input\n0,10\n1,20\n");
        let mut state = InterpolationState::new(&data, &BufferLedger::new());
        state.update(&data, 0.5);
        assert_approx_eq!(f64, state.reals()[0], 15.0);
        assert_approx_eq!(f64, state.continuous_reals()[0], 15.0);
    }

    #[rstest]
    #[case(-5.0, 10.0, 0.0)]
    #[case(0.0, 10.0, 0.0)]
    #[case(3.0, 40.0, 1.0)]
    #[case(10.0, 40.0, 1.0)]
    fn test_boundaries(#[case] t: f64, #[case] expected: f64, #[case] lambda: f64) {
        let data = ramp();
        let mut state = InterpolationState::new(&data, &BufferLedger::new());
        state.update(&data, t);
        assert_eq!(state.reals()[0], expected);
        assert_eq!(state.lambda(), lambda);
    }

    #[test]
    fn test_discrete_hold() {
        let data = ramp();
        let mut state = InterpolationState::new(&data, &BufferLedger::new());

        state.update(&data, 2.0);
        assert_approx_eq!(f64, state.reals()[0], 30.0);
        assert_eq!(state.reals()[1], 2.0);
        assert_eq!(state.integers(&data), &[6]);
        assert_eq!(state.booleans(&data), &[true]);

        // Exact hit on a sample selects that sample.
        state.update(&data, 3.0);
        assert_eq!(state.reals()[1], 3.0);
        assert_eq!(state.integers(&data), &[7]);
    }

    #[test]
    fn test_idempotent() {
        let data = ramp();
        let mut state = InterpolationState::new(&data, &BufferLedger::new());
        state.update(&data, 1.5);
        let before = (state.indices(), state.discrete_index(), state.lambda());
        state.update(&data, 1.5);
        assert_eq!(
            (state.indices(), state.discrete_index(), state.lambda()),
            before
        );
    }

    #[test]
    fn test_cursor_monotonic() {
        let data = ramp();
        let mut state = InterpolationState::new(&data, &BufferLedger::new());
        let mut last_idx2 = state.indices().1;
        for i in 0..=40 {
            state.update(&data, i as f64 * 0.1);
            let (idx1, idx2) = state.indices();
            assert!(idx2 >= last_idx2);
            assert!(idx1 == idx2.saturating_sub(1) || idx1 == idx2);
            last_idx2 = idx2;
        }
    }

    #[test]
    fn test_primed_before_first_sample() {
        let data = data("time,Float64_continuous_input\n1,10\n2,20\n");
        let mut state = InterpolationState::new(&data, &BufferLedger::new());
        assert_eq!(state.reals()[0], 10.0);
        // The priming query is at t = 0, so the first real query at 0 is a cache hit on
        // correctly computed values.
        state.update(&data, 0.0);
        assert_eq!(state.reals()[0], 10.0);
    }

    #[test]
    fn test_hold_row() {
        let data = ramp();
        let mut state = InterpolationState::new(&data, &BufferLedger::new());
        state.update(&data, 0.5);
        state.hold_row(&data, 1);
        assert_approx_eq!(f64, state.reals()[0], 15.0);
        assert_eq!(state.reals()[1], 2.0);
        assert_eq!(state.integers(&data), &[6]);
    }
}
