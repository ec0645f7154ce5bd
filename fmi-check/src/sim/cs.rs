//! Co-Simulation stepping loop.

use crate::{
    context::CheckContext,
    input::InputData,
    ledger::BufferLedger,
    traits::{CapabilityError, CoSimulation, Common, FmuImport},
    Error,
};

use super::{
    check_initialization_outputs,
    input_state::InputState,
    output::{OutputSink, Snapshot},
    params::SimParams,
    terminate_instance, SimStats, StatusExt,
};

/// Instantiate the Co-Simulation interface of `import` and step it with a fixed communication
/// step from the start to the stop time of `params`.
pub fn co_simulation<I: FmuImport, S: OutputSink>(
    import: &I,
    data: &InputData,
    params: &SimParams,
    context: &CheckContext,
    sink: &mut S,
) -> Result<SimStats, Error> {
    let md = import.model_description();
    let instance_name = md
        .co_simulation
        .as_ref()
        .map_or(md.model_name.as_str(), |cs| cs.model_identifier.as_str());

    log::info!("Instantiating {instance_name} for Co-Simulation");
    context.expect_instance(instance_name);
    let mut inst = import.instantiate_cs(instance_name, context.clone())?;

    let result = simulate(&mut inst, import, data, params, context.ledger(), sink);
    terminate_instance(&mut inst, &result);

    match &result {
        Ok(stats) => log::info!(
            "Co-Simulation finished at t = {} after {} steps",
            stats.end_time,
            stats.num_steps
        ),
        Err(e) => log::error!("Co-Simulation failed: {e}"),
    }
    result
}

fn simulate<I: FmuImport, S: OutputSink>(
    inst: &mut I::CoSimulation,
    import: &I,
    data: &InputData,
    params: &SimParams,
    ledger: &BufferLedger,
    sink: &mut S,
) -> Result<SimStats, Error> {
    let md = import.model_description();
    let tstart = params.start_time;
    let tend = params.stop_time;
    let mut hstep = params.step_size;
    let variable_step = md
        .co_simulation
        .as_ref()
        .is_some_and(|cs| cs.can_handle_variable_communication_step_size);

    let mut inputs = InputState::new(data, ledger);
    let mut stats = SimStats {
        end_time: tstart,
        ..Default::default()
    };

    inputs
        .apply_all(inst, tstart)
        .at("set inputs before initialization", tstart)?;
    inst.setup_experiment(params.tolerance, tstart, None)
        .at("setup_experiment", tstart)?;
    inst.enter_initialization_mode()
        .at("enter_initialization_mode", tstart)?;
    check_initialization_outputs(md, inst, tstart)?;
    inst.exit_initialization_mode()
        .at("exit_initialization_mode", tstart)?;
    log::info!("Initialized model for simulation starting at time {tstart}");

    sink.emit(tstart, inst, Snapshot::Regular)?;

    let mut tcur = tstart;
    let mut warned = false;
    while tcur < tend {
        let mut tnext = tcur + hstep;
        if tnext > tend - 1e-3 * hstep {
            if variable_step {
                hstep = tend - tcur;
                tnext = tend;
            } else if !warned {
                log::warn!(
                    "Model does not support variable communication step size. Step size may not be altered to reach the stop time exactly."
                );
                warned = true;
            }
        }

        log::debug!("Simulation step from time {tcur} until {tnext}");
        inputs.apply_all(inst, tcur).at("set inputs", tcur)?;

        match inst.do_step(tcur, hstep, true) {
            Ok(_) => {
                tcur = tnext;
                stats.num_steps += 1;
                stats.end_time = tcur;
                sink.emit(tcur, inst, Snapshot::Regular)?;
            }
            Err(CapabilityError::Discard) => {
                let last_time = inst
                    .last_successful_time()
                    .at("last_successful_time", tcur)?;
                if inst.terminated().at("terminated", tcur)? {
                    log::info!("Model requests to terminate simulation at time {last_time}");
                    stats.terminated_by_model = true;
                    stats.end_time = last_time;
                    sink.emit(last_time, inst, Snapshot::Regular)?;
                    break;
                }
                return Err(CapabilityError::Discard).at("do_step", last_time);
            }
            Err(e) => return Err(e).at("do_step", tcur),
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;
    use crate::{
        models::{dahlquist::Dahlquist, stair::Stair, ModelImport},
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
    fn test_variable_step_lands_on_stop_time() {
        let import = ModelImport::<Dahlquist>::new();
        let params = params(1.0, 0.3);
        let ctx = CheckContext::default();
        let mut recorder = Recorder::new(import.model_description(), &params);

        let stats =
            co_simulation(&import, &InputData::empty(), &params, &ctx, &mut recorder).unwrap();
        assert_eq!(stats.end_time, 1.0);
        assert_eq!(stats.num_steps, 4);
        assert_eq!(recorder.num_rows(), 5);
    }

    #[test_log::test]
    fn test_terminated_by_model() {
        let import = ModelImport::<Stair>::new();
        let params = params(20.0, 0.5);
        let ctx = CheckContext::default();
        let mut recorder = Recorder::new(import.model_description(), &params);

        let stats =
            co_simulation(&import, &InputData::empty(), &params, &ctx, &mut recorder).unwrap();
        assert!(stats.terminated_by_model);
        assert_approx_eq!(f64, stats.end_time, 9.0);
        assert_eq!(ctx.ledger().outstanding(), 0);
    }
}
