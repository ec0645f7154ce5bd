//! Model Exchange stepping loop with a fixed-step forward Euler integrator.

use crate::{
    context::CheckContext,
    input::InputData,
    ledger::BufferLedger,
    traits::{CapabilityError, CapabilityResult, Common, EventFlags, FmuImport, ModelExchange},
    Error,
};

use super::{
    check_initialization_outputs,
    input_state::InputState,
    output::{OutputSink, Snapshot},
    params::SimParams,
    terminate_instance, SimStats, StatusExt,
};

/// Upper bound on `new_discrete_states` calls while handling a single event.
pub const MAX_EVENT_ITERATIONS: usize = 1000;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Event iteration did not converge at t = {time} after {iterations} iterations")]
pub struct ConvergenceError {
    pub time: f64,
    pub iterations: usize,
}

/// Run the discrete-state iteration until the model reports convergence or asks to terminate.
///
/// Returns whether any iteration re-initialized the continuous states. The final flags, including
/// the next time event, are left in `flags`.
fn event_iteration<M: ModelExchange>(
    inst: &mut M,
    flags: &mut EventFlags,
    time: f64,
) -> Result<bool, Error> {
    let mut states_changed = false;
    let mut iterations = 0;

    flags.reset();
    flags.discrete_states_need_update = true;

    while flags.discrete_states_need_update && !flags.terminate_simulation {
        if iterations == MAX_EVENT_ITERATIONS {
            let err = ConvergenceError { time, iterations };
            log::error!("{err}");
            return Err(err.into());
        }
        flags.reset();
        inst.new_discrete_states(flags)
            .at("new_discrete_states", time)?;
        states_changed |= flags.values_of_continuous_states_changed;
        iterations += 1;
    }

    log::trace!("Event iteration at t = {time} converged after {iterations} iterations");
    Ok(states_changed)
}

/// `Ok(false)` when the model discarded the call. A discard ends the run without an error.
fn accepted(res: CapabilityResult, operation: &'static str, time: f64) -> Result<bool, Error> {
    match res {
        Err(CapabilityError::Discard) => {
            log::warn!("{operation} returned Discard at t = {time}, ending the simulation");
            Ok(false)
        }
        res => res.map(|_| true).at(operation, time),
    }
}

/// Instantiate the Model Exchange interface of `import` and simulate it from the start to the
/// stop time of `params`, emitting a snapshot to `sink` after every accepted step.
///
/// The instance is terminated on every exit path except after a `Fatal` status, and released
/// when this function returns.
pub fn model_exchange<I: FmuImport, S: OutputSink>(
    import: &I,
    data: &InputData,
    params: &SimParams,
    context: &CheckContext,
    sink: &mut S,
) -> Result<SimStats, Error> {
    let md = import.model_description();
    let instance_name = md
        .model_exchange
        .as_ref()
        .map_or(md.model_name.as_str(), |me| me.model_identifier.as_str());

    log::info!("Instantiating {instance_name} for Model Exchange");
    context.expect_instance(instance_name);
    let mut inst = import.instantiate_me(instance_name, context.clone())?;

    let result = simulate(&mut inst, import, data, params, context.ledger(), sink);
    terminate_instance(&mut inst, &result);

    match &result {
        Ok(stats) => log::info!(
            "Model Exchange simulation finished at t = {} after {} steps and {} events",
            stats.end_time,
            stats.num_steps,
            stats.num_events
        ),
        Err(e) => log::error!("Model Exchange simulation failed: {e}"),
    }
    result
}

fn simulate<I: FmuImport, S: OutputSink>(
    inst: &mut I::ModelExchange,
    import: &I,
    data: &InputData,
    params: &SimParams,
    ledger: &BufferLedger,
    sink: &mut S,
) -> Result<SimStats, Error> {
    let md = import.model_description();
    let tstart = params.start_time;
    let tend = params.stop_time;
    let hdef = params.step_size;

    let nx = md.number_of_continuous_states();
    let nz = md.number_of_event_indicators;

    let mut states = ledger.alloc::<f64>(nx);
    let mut derivatives = ledger.alloc::<f64>(nx);
    let mut indicators = ledger.alloc::<f64>(nz);
    let mut prev_indicators = ledger.alloc::<f64>(nz);
    let mut inputs = InputState::new(data, ledger);

    let mut flags = EventFlags::default();
    let mut stats = SimStats {
        end_time: tstart,
        ..Default::default()
    };

    inputs
        .apply_initial(inst, tstart)
        .at("set inputs before initialization", tstart)?;
    inst.setup_experiment(params.tolerance, tstart, Some(tend))
        .at("setup_experiment", tstart)?;
    inst.enter_initialization_mode()
        .at("enter_initialization_mode", tstart)?;
    check_initialization_outputs(md, inst, tstart)?;
    inst.exit_initialization_mode()
        .at("exit_initialization_mode", tstart)?;

    event_iteration(inst, &mut flags, tstart)?;
    if flags.terminate_simulation {
        log::info!("Model requested termination at t = {tstart}");
        sink.emit(tstart, inst, Snapshot::Regular)?;
        stats.terminated_by_model = true;
        return Ok(stats);
    }

    inst.enter_continuous_time_mode()
        .at("enter_continuous_time_mode", tstart)?;
    inst.get_continuous_states(&mut states)
        .at("get_continuous_states", tstart)?;
    inst.get_event_indicators(&mut prev_indicators)
        .at("get_event_indicators", tstart)?;

    sink.emit(tstart, inst, Snapshot::Regular)?;

    let mut tcur = tstart;
    while tcur < tend {
        if !accepted(inst.get_derivatives(&mut derivatives), "get_derivatives", tcur)? {
            stats.discarded = true;
            break;
        }

        let mut tnext = tcur + hdef;
        if tnext > tend - hdef / 1e16 {
            tnext = tend;
        }

        let mut time_event = false;
        if let Some(te) = flags.next_event_time.filter(|&te| te <= tnext) {
            tnext = te;
            time_event = true;
        }

        let external = inputs
            .next_external_event(tcur, tnext)
            .filter(|ev| ev.time <= tnext);
        if let Some(ev) = &external {
            if ev.time < tnext {
                tnext = ev.time;
                time_event = false;
            }
            inputs.acknowledge_event(ev);
        }

        let dt = tnext - tcur;
        tcur = tnext;

        inst.set_time(tcur).at("set_time", tcur)?;
        inputs
            .apply_continuous(inst, tcur)
            .at("set continuous inputs", tcur)?;
        for (x, der) in states.iter_mut().zip(derivatives.iter()) {
            *x += dt * der;
        }
        if !accepted(
            inst.set_continuous_states(&states),
            "set_continuous_states",
            tcur,
        )? {
            stats.discarded = true;
            break;
        }

        let (step_event, mut terminate) = inst
            .completed_integrator_step(true)
            .at("completed_integrator_step", tcur)?;

        if !accepted(
            inst.get_event_indicators(&mut indicators),
            "get_event_indicators",
            tcur,
        )? {
            stats.discarded = true;
            break;
        }
        let zero_crossing = indicators
            .iter()
            .zip(prev_indicators.iter())
            .any(|(z, pz)| z * pz < 0.0);

        stats.num_steps += 1;
        stats.end_time = tcur;

        let external_event = external.is_some();
        if !terminate && (step_event || zero_crossing || time_event || external_event) {
            log::trace!(
                "Event encountered at t = {tcur}. [External: {external_event}, Time: {time_event}, State: {zero_crossing}, Step: {step_event}]"
            );
            stats.num_events += 1;

            if params.print_left_limit {
                sink.emit(tcur, inst, Snapshot::LeftLimit)?;
            }

            inst.enter_event_mode().at("enter_event_mode", tcur)?;
            if let Some(ev) = &external {
                inputs
                    .apply_event(inst, ev)
                    .at("set inputs at external event", tcur)?;
            }

            let states_changed = event_iteration(inst, &mut flags, tcur)?;
            terminate = flags.terminate_simulation;

            if !terminate {
                inst.enter_continuous_time_mode()
                    .at("enter_continuous_time_mode", tcur)?;
                if states_changed
                    && !accepted(
                        inst.get_continuous_states(&mut states),
                        "get_continuous_states",
                        tcur,
                    )?
                {
                    stats.discarded = true;
                    break;
                }
                if !accepted(
                    inst.get_event_indicators(&mut prev_indicators),
                    "get_event_indicators",
                    tcur,
                )? {
                    stats.discarded = true;
                    break;
                }
            }
        } else {
            prev_indicators.copy_from_slice(&indicators);
        }

        sink.emit(tcur, inst, Snapshot::Regular)?;

        if terminate {
            log::info!("Model requested termination at t = {tcur}");
            stats.terminated_by_model = true;
            break;
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;
    use crate::{
        models::{bouncing_ball::BouncingBall, stair::Stair, ModelImport},
        sim::output::Recorder,
    };

    fn params(stop_time: f64, step_size: f64) -> SimParams {
        SimParams {
            start_time: 0.0,
            stop_time,
            step_size,
            tolerance: None,
            max_output_points: 0,
            print_left_limit: false,
            output_all_variables: false,
        }
    }

    #[test_log::test]
    fn test_end_time_is_hit_exactly() {
        let import = ModelImport::<BouncingBall>::new();
        let params = params(1.0, 0.3);
        let ctx = CheckContext::default();
        let mut recorder = Recorder::new(import.model_description(), &params);

        let stats =
            model_exchange(&import, &InputData::empty(), &params, &ctx, &mut recorder).unwrap();
        assert_eq!(stats.end_time, 1.0);
        assert_eq!(stats.num_steps, 4);
        assert_eq!(ctx.ledger().outstanding(), 0);
    }

    #[test_log::test]
    fn test_time_events() {
        let import = ModelImport::<Stair>::new();
        let params = params(3.5, 0.2);
        let ctx = CheckContext::default();
        let mut recorder = Recorder::new(import.model_description(), &params);

        let stats =
            model_exchange(&import, &InputData::empty(), &params, &ctx, &mut recorder).unwrap();
        assert_approx_eq!(f64, stats.end_time, 3.5);
        assert_eq!(stats.num_events, 3);
        assert!(!stats.terminated_by_model);
    }

    #[test_log::test]
    fn test_left_limit_rows() {
        let import = ModelImport::<Stair>::new();
        let mut params = params(2.5, 0.5);
        params.print_left_limit = true;
        let ctx = CheckContext::default();
        let mut recorder = Recorder::new(import.model_description(), &params);

        model_exchange(&import, &InputData::empty(), &params, &ctx, &mut recorder).unwrap();
        // initial row, 5 steps and one left limit at t = 1 and t = 2
        assert_eq!(recorder.num_rows(), 8);
    }

    #[test_log::test]
    fn test_state_events() {
        let import = ModelImport::<BouncingBall>::new();
        let params = params(3.0, 1e-3);
        let ctx = CheckContext::default();
        let mut recorder = Recorder::new(import.model_description(), &params);

        let stats =
            model_exchange(&import, &InputData::empty(), &params, &ctx, &mut recorder).unwrap();
        assert!(stats.num_events >= 2);
        assert_eq!(ctx.ledger().allocations(), ctx.ledger().releases());
    }
}
