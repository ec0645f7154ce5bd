//! Detection of external time events in the input samples.

use super::InputData;

/// A change of a discrete input between two consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExternalEvent {
    /// Time at which the changed values become effective.
    pub time: f64,
    /// The row holding the new values.
    pub row: usize,
}

/// Forward-only scan position over the input samples.
#[derive(Debug, Default)]
pub struct EventScanState {
    last_scanned_index: usize,
}

impl EventScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look for a discrete input change between rows `k` and `k + 1` with `t[k]` in
    /// `[tcur, tnext]`.
    ///
    /// Rows checked without finding a change are not scanned again. A found event stays pending
    /// until [`Self::acknowledge`] is called, so that a step clamped to an earlier event does not
    /// lose it.
    pub fn detect(&mut self, data: &InputData, tcur: f64, tnext: f64) -> Option<ExternalEvent> {
        let ts = data.series.timestamps();
        let (first, last) = match (ts.first(), ts.last()) {
            (Some(&first), Some(&last)) if ts.len() >= 2 => (first, last),
            _ => return None,
        };
        if tnext <= first || tcur >= last {
            return None;
        }

        let mut k = self.last_scanned_index;
        while k + 1 < ts.len() {
            if ts[k] > tnext {
                return None;
            }
            if ts[k] >= tcur && data.discrete_change(k) {
                return Some(ExternalEvent {
                    time: ts[k],
                    row: k + 1,
                });
            }
            k += 1;
            self.last_scanned_index = k;
        }
        None
    }

    /// Mark `event` as handled; scanning resumes at the row holding the new values.
    pub fn acknowledge(&mut self, event: &ExternalEvent) {
        self.last_scanned_index = self.last_scanned_index.max(event.row);
    }

    pub fn last_scanned_index(&self) -> usize {
        self.last_scanned_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{feedthrough::Feedthrough, UserModel};

    fn data(text: &str) -> InputData {
        InputData::from_text(text, &Feedthrough::model_description()).unwrap()
    }

    #[test]
    fn test_boolean_change() {
        let data = data("time,Boolean_input\n0,0\n1,0\n2,1\n");
        let mut scan = EventScanState::new();
        assert_eq!(
            scan.detect(&data, 0.0, 1.5),
            Some(ExternalEvent { time: 1.0, row: 2 })
        );
        assert_eq!(scan.detect(&data, 2.5, 3.0), None);
    }

    #[test]
    fn test_out_of_span() {
        let data = data("time,Boolean_input\n1,0\n2,1\n");
        let mut scan = EventScanState::new();
        assert_eq!(scan.detect(&data, 0.0, 1.0), None);
        assert_eq!(scan.detect(&data, 2.0, 3.0), None);

        let single = self::data("time,Boolean_input\n0,0\n");
        assert_eq!(scan.detect(&single, 0.0, 1.0), None);
    }

    #[test]
    fn test_continuous_changes_ignored() {
        let data = data(
            "time,Float64_continuous_input,Float64_discrete_input\n0,0,5\n1,1,5\n2,2,6\n",
        );
        let mut scan = EventScanState::new();
        assert_eq!(scan.detect(&data, 0.0, 0.9), None);
        assert_eq!(
            scan.detect(&data, 0.9, 1.2),
            Some(ExternalEvent { time: 1.0, row: 2 })
        );
    }

    #[test]
    fn test_pending_until_acknowledged() {
        let data = data("time,Int32_input\n0,1\n1,1\n2,3\n3,3\n4,5\n");
        let mut scan = EventScanState::new();

        let event = scan.detect(&data, 0.0, 1.5).unwrap();
        assert_eq!(event.time, 1.0);
        // Not acknowledged: found again.
        assert_eq!(scan.detect(&data, 0.5, 1.5), Some(event));

        scan.acknowledge(&event);
        assert_eq!(scan.detect(&data, 1.0, 2.5), None);
        assert_eq!(
            scan.detect(&data, 2.5, 3.5),
            Some(ExternalEvent { time: 3.0, row: 4 })
        );
    }

    #[test]
    fn test_scan_position_monotonic() {
        let data = data("time,Int32_input\n0,1\n1,1\n2,1\n3,1\n");
        let mut scan = EventScanState::new();
        let mut last = 0;
        for i in 0..8 {
            let t = i as f64 * 0.5;
            assert_eq!(scan.detect(&data, t, t + 0.5), None);
            assert!(scan.last_scanned_index() >= last);
            last = scan.last_scanned_index();
        }
        assert_eq!(last, 3);
    }
}
