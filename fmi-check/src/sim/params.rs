use crate::{options::FmiCheckOptions, schema::ModelDescription, Error};

/// Output-point budget used when none is given.
pub const DEFAULT_MAX_OUTPUT_POINTS: usize = 500;

/// Stop time used when the model declares no default experiment stop time.
pub const DEFAULT_STOP_TIME: f64 = 1.0;

/// Resolved end time and step size of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSize {
    pub stop_time: f64,
    pub step_size: f64,
}

/// Derive the end time and the step size.
///
/// * The stop time is the user's if positive, otherwise the default experiment's.
/// * An explicit step size is used as given.
/// * Otherwise the step is `stop_time / max_output_points`, where a missing or zero budget
///   falls back to [`DEFAULT_MAX_OUTPUT_POINTS`].
pub fn step_size_policy(
    user_stop_time: Option<f64>,
    user_step_size: Option<f64>,
    user_max_output_points: Option<usize>,
    default_stop_time: f64,
) -> StepSize {
    let stop_time = user_stop_time
        .filter(|&t| t > 0.0)
        .unwrap_or(default_stop_time);

    let step_size = user_step_size.unwrap_or_else(|| {
        let points = user_max_output_points
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_OUTPUT_POINTS);
        stop_time / points as f64
    });

    StepSize {
        stop_time,
        step_size,
    }
}

#[derive(Debug, Clone)]
pub struct SimParams {
    pub start_time: f64,
    pub stop_time: f64,
    /// Forward Euler step (ME) or communication step (CS).
    pub step_size: f64,
    pub tolerance: Option<f64>,
    /// Output throttling budget, `0` records every step.
    pub max_output_points: usize,
    /// Record the values before event handling as well.
    pub print_left_limit: bool,
    /// Record every variable instead of only the outputs.
    pub output_all_variables: bool,
}

impl SimParams {
    pub fn new_from_options(
        md: &ModelDescription,
        options: &FmiCheckOptions,
    ) -> Result<Self, Error> {
        let de = md.default_experiment.as_ref();

        let start_time = de.and_then(|de| de.start_time).unwrap_or(0.0);

        let StepSize {
            stop_time,
            step_size,
        } = step_size_policy(
            options.stop_time,
            options.step_size,
            Some(options.num_steps),
            de.and_then(|de| de.stop_time).unwrap_or(DEFAULT_STOP_TIME),
        );

        if !(step_size > 0.0 && step_size.is_finite()) {
            return Err(Error::Experiment(format!(
                "step size must be positive, got {step_size}"
            )));
        }

        if stop_time <= start_time {
            return Err(Error::Experiment(format!(
                "stop time {stop_time} must be after the start time {start_time}"
            )));
        }

        Ok(Self {
            start_time,
            stop_time,
            step_size,
            tolerance: de.and_then(|de| de.tolerance),
            max_output_points: options.num_steps,
            print_left_limit: options.print_left_limit,
            output_all_variables: options.print_all_variables,
        })
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    use super::*;
    use crate::schema::DefaultExperiment;

    #[test]
    fn test_budget() {
        let s = step_size_policy(Some(10.0), None, Some(500), 3.0);
        assert_eq!(s.stop_time, 10.0);
        assert_approx_eq!(f64, s.step_size, 0.02);
    }

    #[test]
    fn test_user_step_wins() {
        let s = step_size_policy(Some(10.0), Some(0.5), Some(7), 3.0);
        assert_eq!(s.step_size, 0.5);
    }

    #[rstest]
    #[case(None)]
    #[case(Some(0.0))]
    #[case(Some(-1.0))]
    fn test_default_stop_time(#[case] user_stop: Option<f64>) {
        let s = step_size_policy(user_stop, None, None, 4.0);
        assert_eq!(s.stop_time, 4.0);
        assert_approx_eq!(f64, s.step_size, 4.0 / 500.0);
    }

    #[test]
    fn test_zero_budget() {
        let s = step_size_policy(Some(5.0), None, Some(0), 1.0);
        assert_approx_eq!(f64, s.step_size, 0.01);
    }

    #[test]
    fn test_params_from_options() {
        let md = ModelDescription {
            default_experiment: Some(DefaultExperiment {
                start_time: Some(0.0),
                stop_time: Some(3.0),
                tolerance: Some(1e-4),
                step_size: None,
            }),
            ..Default::default()
        };

        let params = SimParams::new_from_options(&md, &FmiCheckOptions::default()).unwrap();
        assert_eq!(params.stop_time, 3.0);
        assert_approx_eq!(f64, params.step_size, 0.006);
        assert_eq!(params.tolerance, Some(1e-4));

        let options = FmiCheckOptions {
            step_size: Some(-0.1),
            ..Default::default()
        };
        assert!(matches!(
            SimParams::new_from_options(&md, &options),
            Err(Error::Experiment(_))
        ));
    }
}
