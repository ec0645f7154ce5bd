//! Built-in reference models.
//!
//! A model implements [`UserModel`]: its variables as a [`ModelDescription`], value access by
//! value reference, and its continuous and discrete dynamics. [`Instance`] wraps a model into the
//! capability interface of [`crate::traits`], enforcing the FMI 2.0 call sequence, and
//! [`ModelImport`] hands out instances the way a loaded FMU would.

use std::marker::PhantomData;

use crate::{
    context::{CheckContext, Status},
    schema::{ModelDescription, ValueReference},
    traits::{
        CapabilityError, CapabilityResult, CoSimulation, Common, EventFlags, FmuImport, Interface,
        ModelExchange, Res,
    },
    sim::me::MAX_EVENT_ITERATIONS,
    Error,
};

pub mod bouncing_ball;
pub mod dahlquist;
pub mod feedthrough;
pub mod stair;

/// Names accepted by [`crate::check`] through the binary.
pub const MODEL_NAMES: &[&str] = &["BouncingBall", "Dahlquist", "Feedthrough", "Stair"];

/// Logging category used by the wrapper itself.
const LOG_STATUS: &str = "logStatusError";

/// State handed to the model callbacks.
pub struct ModelContext {
    instance_name: String,
    time: f64,
    check: CheckContext,
}

impl ModelContext {
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Report a message to the checker.
    pub fn log(&self, status: Status, category: &str, args: std::fmt::Arguments<'_>) {
        self.check
            .log_message(&self.instance_name, status, category, &args.to_string());
    }
}

/// User-defined model behavior.
///
/// Value access is per value reference. Unknown references and references that cannot be
/// written fall through to the default implementations, which fail with
/// [`CapabilityError::Error`].
pub trait UserModel: Default + std::fmt::Debug {
    /// Internal step of the Co-Simulation solver.
    const FIXED_SOLVER_STEP: f64 = 1e-3;

    fn model_description() -> ModelDescription;

    fn get_real(&self, _context: &ModelContext, _vr: ValueReference) -> Result<f64, CapabilityError> {
        Err(CapabilityError::Error)
    }

    fn set_real(&mut self, _vr: ValueReference, _value: f64) -> Result<(), CapabilityError> {
        Err(CapabilityError::Error)
    }

    fn get_integer(&self, _vr: ValueReference) -> Result<i32, CapabilityError> {
        Err(CapabilityError::Error)
    }

    fn set_integer(&mut self, _vr: ValueReference, _value: i32) -> Result<(), CapabilityError> {
        Err(CapabilityError::Error)
    }

    fn get_boolean(&self, _vr: ValueReference) -> Result<bool, CapabilityError> {
        Err(CapabilityError::Error)
    }

    fn set_boolean(&mut self, _vr: ValueReference, _value: bool) -> Result<(), CapabilityError> {
        Err(CapabilityError::Error)
    }

    fn get_string(&self, _vr: ValueReference) -> Result<String, CapabilityError> {
        Err(CapabilityError::Error)
    }

    fn set_string(&mut self, _vr: ValueReference, _value: &str) -> Result<(), CapabilityError> {
        Err(CapabilityError::Error)
    }

    fn get_continuous_states(&self, _states: &mut [f64]) -> Result<(), CapabilityError> {
        Ok(())
    }

    fn set_continuous_states(&mut self, _states: &[f64]) -> Result<(), CapabilityError> {
        Ok(())
    }

    fn get_derivatives(
        &mut self,
        _context: &ModelContext,
        _derivatives: &mut [f64],
    ) -> Result<(), CapabilityError> {
        Ok(())
    }

    fn get_event_indicators(
        &mut self,
        _context: &ModelContext,
        _indicators: &mut [f64],
    ) -> Result<(), CapabilityError> {
        Ok(())
    }

    /// Called from `completed_integrator_step`. `Ok(true)` requests a step event.
    fn completed_integrator_step(
        &mut self,
        _context: &ModelContext,
    ) -> Result<bool, CapabilityError> {
        Ok(false)
    }

    /// One iteration of the discrete-state update. The flags are reset by the caller.
    fn event_update(
        &mut self,
        _context: &ModelContext,
        _flags: &mut EventFlags,
    ) -> Result<(), CapabilityError> {
        Ok(())
    }

    /// Called from `terminate`.
    fn terminate(&mut self, _context: &ModelContext) -> Result<(), CapabilityError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Instantiated,
    InitializationMode,
    EventMode,
    ContinuousTimeMode,
    StepMode,
    StepFailed,
    Terminated,
}

/// A model instance implementing the capability interface.
pub struct Instance<M: UserModel> {
    interface: Interface,
    state: ModelState,
    context: ModelContext,
    model: M,
    num_states: usize,

    // Co-Simulation solver
    next_event_time: Option<f64>,
    pre_z: Vec<f64>,
    cur_z: Vec<f64>,
    x: Vec<f64>,
    dx: Vec<f64>,
    last_successful_time: f64,
    terminated: bool,
}

impl<M: UserModel> Instance<M> {
    pub fn new(
        interface: Interface,
        instance_name: &str,
        md: &ModelDescription,
        check: CheckContext,
    ) -> Self {
        let num_states = md.number_of_continuous_states();
        let num_indicators = md.number_of_event_indicators;
        Self {
            interface,
            state: ModelState::Instantiated,
            context: ModelContext {
                instance_name: instance_name.to_owned(),
                time: 0.0,
                check,
            },
            model: M::default(),
            num_states,
            next_event_time: None,
            pre_z: vec![0.0; num_indicators],
            cur_z: vec![0.0; num_indicators],
            x: vec![0.0; num_states],
            dx: vec![0.0; num_states],
            last_successful_time: 0.0,
            terminated: false,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    fn assert_state(&self, operation: &str, allowed: &[ModelState]) -> Result<(), CapabilityError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            self.context.log(
                Status::Error,
                LOG_STATUS,
                format_args!("{operation}() called in invalid state {:?}", self.state),
            );
            Err(CapabilityError::Error)
        }
    }

    fn assert_interface(&self, operation: &str, interface: Interface) -> Result<(), CapabilityError> {
        if self.interface == interface {
            Ok(())
        } else {
            self.context.log(
                Status::Error,
                LOG_STATUS,
                format_args!("{operation}() is not available for {:?} instances", self.interface),
            );
            Err(CapabilityError::Error)
        }
    }

    fn check_len(&self, operation: &str, expected: usize, len: usize) -> Result<(), CapabilityError> {
        if expected == len {
            Ok(())
        } else {
            self.context.log(
                Status::Error,
                LOG_STATUS,
                format_args!("{operation}(): expected {expected} values but got {len}"),
            );
            Err(CapabilityError::Error)
        }
    }

    /// Run the discrete-state iteration of the internal Co-Simulation solver.
    ///
    /// Returns whether the model requested termination.
    fn update_discrete_states(&mut self) -> Result<bool, CapabilityError> {
        let mut flags = EventFlags::default();
        let mut iterations = 0;
        loop {
            flags.reset();
            self.model.event_update(&self.context, &mut flags)?;
            iterations += 1;
            if !flags.discrete_states_need_update || flags.terminate_simulation {
                break;
            }
            if iterations == MAX_EVENT_ITERATIONS {
                self.context.log(
                    Status::Error,
                    LOG_STATUS,
                    format_args!("Event iteration did not converge at t = {}", self.context.time),
                );
                return Err(CapabilityError::Error);
            }
        }
        self.next_event_time = flags.next_event_time;
        self.model
            .get_event_indicators(&self.context, &mut self.pre_z)?;
        Ok(flags.terminate_simulation)
    }

    /// Advance the internal forward Euler solver by one step, at most up to `end`.
    ///
    /// Returns whether a time or state event occurred at the end of the step.
    fn solver_step(&mut self, end: f64) -> Result<bool, CapabilityError> {
        let mut step_end = (self.context.time + M::FIXED_SOLVER_STEP).min(end);
        let mut time_event = false;
        if let Some(te) = self.next_event_time.filter(|&te| te <= step_end) {
            step_end = te;
            time_event = true;
        }

        let dt = step_end - self.context.time;
        self.model.get_continuous_states(&mut self.x)?;
        self.model.get_derivatives(&self.context, &mut self.dx)?;
        for (x, dx) in self.x.iter_mut().zip(&self.dx) {
            *x += dt * dx;
        }
        self.model.set_continuous_states(&self.x)?;
        self.context.time = step_end;

        self.model
            .get_event_indicators(&self.context, &mut self.cur_z)?;
        let state_event = self
            .cur_z
            .iter()
            .zip(&self.pre_z)
            .any(|(z, pz)| z * pz < 0.0);
        self.pre_z.copy_from_slice(&self.cur_z);

        Ok(time_event || state_event)
    }
}

fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

const ANY_STATE: &[ModelState] = &[
    ModelState::Instantiated,
    ModelState::InitializationMode,
    ModelState::EventMode,
    ModelState::ContinuousTimeMode,
    ModelState::StepMode,
    ModelState::StepFailed,
    ModelState::Terminated,
];

const SETTABLE: &[ModelState] = &[
    ModelState::Instantiated,
    ModelState::InitializationMode,
    ModelState::EventMode,
    ModelState::ContinuousTimeMode,
    ModelState::StepMode,
];

impl<M: UserModel> Common for Instance<M> {
    fn instance_name(&self) -> &str {
        &self.context.instance_name
    }

    fn setup_experiment(
        &mut self,
        _tolerance: Option<f64>,
        start_time: f64,
        _stop_time: Option<f64>,
    ) -> CapabilityResult {
        self.assert_state("setup_experiment", &[ModelState::Instantiated])?;
        self.context.time = start_time;
        self.last_successful_time = start_time;
        Ok(Res::OK)
    }

    fn enter_initialization_mode(&mut self) -> CapabilityResult {
        self.assert_state("enter_initialization_mode", &[ModelState::Instantiated])?;
        self.state = ModelState::InitializationMode;
        Ok(Res::OK)
    }

    fn exit_initialization_mode(&mut self) -> CapabilityResult {
        self.assert_state(
            "exit_initialization_mode",
            &[ModelState::InitializationMode],
        )?;
        match self.interface {
            Interface::ModelExchange => self.state = ModelState::EventMode,
            Interface::CoSimulation => {
                if self.update_discrete_states()? {
                    self.terminated = true;
                }
                self.state = ModelState::StepMode;
            }
        }
        Ok(Res::OK)
    }

    fn terminate(&mut self) -> CapabilityResult {
        self.assert_state(
            "terminate",
            &[
                ModelState::EventMode,
                ModelState::ContinuousTimeMode,
                ModelState::StepMode,
                ModelState::StepFailed,
            ],
        )?;
        self.model.terminate(&self.context)?;
        self.state = ModelState::Terminated;
        Ok(Res::OK)
    }

    fn get_real(&mut self, vrs: &[ValueReference], values: &mut [f64]) -> CapabilityResult {
        self.check_len("get_real", vrs.len(), values.len())?;
        for (vr, value) in vrs.iter().zip(values.iter_mut()) {
            *value = self.model.get_real(&self.context, *vr)?;
        }
        Ok(Res::OK)
    }

    fn get_integer(&mut self, vrs: &[ValueReference], values: &mut [i32]) -> CapabilityResult {
        self.check_len("get_integer", vrs.len(), values.len())?;
        for (vr, value) in vrs.iter().zip(values.iter_mut()) {
            *value = self.model.get_integer(*vr)?;
        }
        Ok(Res::OK)
    }

    fn get_boolean(&mut self, vrs: &[ValueReference], values: &mut [bool]) -> CapabilityResult {
        self.check_len("get_boolean", vrs.len(), values.len())?;
        for (vr, value) in vrs.iter().zip(values.iter_mut()) {
            *value = self.model.get_boolean(*vr)?;
        }
        Ok(Res::OK)
    }

    fn get_string(&mut self, vrs: &[ValueReference], values: &mut [String]) -> CapabilityResult {
        self.check_len("get_string", vrs.len(), values.len())?;
        for (vr, value) in vrs.iter().zip(values.iter_mut()) {
            *value = self.model.get_string(*vr)?;
        }
        Ok(Res::OK)
    }

    fn set_real(&mut self, vrs: &[ValueReference], values: &[f64]) -> CapabilityResult {
        self.assert_state("set_real", SETTABLE)?;
        self.check_len("set_real", vrs.len(), values.len())?;
        for (vr, value) in vrs.iter().zip(values) {
            self.model.set_real(*vr, *value)?;
        }
        Ok(Res::OK)
    }

    fn set_integer(&mut self, vrs: &[ValueReference], values: &[i32]) -> CapabilityResult {
        self.assert_state("set_integer", SETTABLE)?;
        self.check_len("set_integer", vrs.len(), values.len())?;
        for (vr, value) in vrs.iter().zip(values) {
            self.model.set_integer(*vr, *value)?;
        }
        Ok(Res::OK)
    }

    fn set_boolean(&mut self, vrs: &[ValueReference], values: &[bool]) -> CapabilityResult {
        self.assert_state("set_boolean", SETTABLE)?;
        self.check_len("set_boolean", vrs.len(), values.len())?;
        for (vr, value) in vrs.iter().zip(values) {
            self.model.set_boolean(*vr, *value)?;
        }
        Ok(Res::OK)
    }

    fn set_string(&mut self, vrs: &[ValueReference], values: &[String]) -> CapabilityResult {
        self.assert_state("set_string", SETTABLE)?;
        self.check_len("set_string", vrs.len(), values.len())?;
        for (vr, value) in vrs.iter().zip(values) {
            self.model.set_string(*vr, value)?;
        }
        Ok(Res::OK)
    }
}

impl<M: UserModel> ModelExchange for Instance<M> {
    fn enter_event_mode(&mut self) -> CapabilityResult {
        self.assert_state("enter_event_mode", &[ModelState::ContinuousTimeMode])?;
        self.state = ModelState::EventMode;
        Ok(Res::OK)
    }

    fn new_discrete_states(&mut self, event_flags: &mut EventFlags) -> CapabilityResult {
        self.assert_state("new_discrete_states", &[ModelState::EventMode])?;
        self.model.event_update(&self.context, event_flags)?;
        Ok(Res::OK)
    }

    fn enter_continuous_time_mode(&mut self) -> CapabilityResult {
        self.assert_state("enter_continuous_time_mode", &[ModelState::EventMode])?;
        self.state = ModelState::ContinuousTimeMode;
        Ok(Res::OK)
    }

    fn completed_integrator_step(
        &mut self,
        _no_set_fmu_state_prior_to_current_point: bool,
    ) -> Result<(bool, bool), CapabilityError> {
        self.assert_state(
            "completed_integrator_step",
            &[ModelState::ContinuousTimeMode],
        )?;
        let enter_event_mode = self.model.completed_integrator_step(&self.context)?;
        Ok((enter_event_mode, false))
    }

    fn set_time(&mut self, time: f64) -> CapabilityResult {
        self.assert_state(
            "set_time",
            &[ModelState::EventMode, ModelState::ContinuousTimeMode],
        )?;
        self.context.time = time;
        Ok(Res::OK)
    }

    fn set_continuous_states(&mut self, states: &[f64]) -> CapabilityResult {
        self.assert_state("set_continuous_states", &[ModelState::ContinuousTimeMode])?;
        self.check_len("set_continuous_states", self.num_states, states.len())?;
        self.model.set_continuous_states(states)?;
        Ok(Res::OK)
    }

    fn get_continuous_states(&mut self, states: &mut [f64]) -> CapabilityResult {
        self.assert_state("get_continuous_states", ANY_STATE)?;
        self.check_len("get_continuous_states", self.num_states, states.len())?;
        self.model.get_continuous_states(states)?;
        Ok(Res::OK)
    }

    fn get_derivatives(&mut self, derivatives: &mut [f64]) -> CapabilityResult {
        self.check_len("get_derivatives", self.num_states, derivatives.len())?;
        self.model.get_derivatives(&self.context, derivatives)?;
        Ok(Res::OK)
    }

    fn get_event_indicators(&mut self, indicators: &mut [f64]) -> CapabilityResult {
        self.check_len("get_event_indicators", self.pre_z.len(), indicators.len())?;
        self.model.get_event_indicators(&self.context, indicators)?;
        Ok(Res::OK)
    }
}

impl<M: UserModel> CoSimulation for Instance<M> {
    fn do_step(
        &mut self,
        current_communication_point: f64,
        communication_step_size: f64,
        _new_step: bool,
    ) -> CapabilityResult {
        self.assert_interface("do_step", Interface::CoSimulation)?;
        self.assert_state("do_step", &[ModelState::StepMode])?;

        if !is_close(self.context.time, current_communication_point) {
            self.context.log(
                Status::Error,
                LOG_STATUS,
                format_args!(
                    "Expected current communication point = {:.16} but was {current_communication_point:.16}",
                    self.context.time
                ),
            );
            return Err(CapabilityError::Error);
        }
        if communication_step_size <= 0.0 {
            self.context.log(
                Status::Error,
                LOG_STATUS,
                format_args!(
                    "Communication step size must be > 0 but was {communication_step_size}"
                ),
            );
            return Err(CapabilityError::Error);
        }

        let next_communication_point = current_communication_point + communication_step_size;

        while !self.terminated
            && self.context.time < next_communication_point
            && !is_close(self.context.time, next_communication_point)
        {
            if self.solver_step(next_communication_point)? && self.update_discrete_states()? {
                self.terminated = true;
            }
        }

        if self.terminated {
            self.last_successful_time = self.context.time;
            self.state = ModelState::StepFailed;
            self.context.log(
                Status::Discard,
                LOG_STATUS,
                format_args!("Model terminated at t = {}", self.context.time),
            );
            return Err(CapabilityError::Discard);
        }

        self.context.time = next_communication_point;
        self.last_successful_time = next_communication_point;
        Ok(Res::OK)
    }

    fn last_successful_time(&mut self) -> Result<f64, CapabilityError> {
        self.assert_interface("last_successful_time", Interface::CoSimulation)?;
        Ok(self.last_successful_time)
    }

    fn terminated(&mut self) -> Result<bool, CapabilityError> {
        self.assert_interface("terminated", Interface::CoSimulation)?;
        Ok(self.terminated)
    }
}

/// Hands out [`Instance`]s of a built-in model, standing in for a loaded FMU.
pub struct ModelImport<M> {
    md: ModelDescription,
    _marker: PhantomData<M>,
}

impl<M: UserModel> ModelImport<M> {
    pub fn new() -> Self {
        Self {
            md: M::model_description(),
            _marker: PhantomData,
        }
    }
}

impl<M: UserModel> Default for ModelImport<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: UserModel> FmuImport for ModelImport<M> {
    type ModelExchange = Instance<M>;
    type CoSimulation = Instance<M>;

    fn model_description(&self) -> &ModelDescription {
        &self.md
    }

    fn instantiate_me(
        &self,
        instance_name: &str,
        context: CheckContext,
    ) -> Result<Self::ModelExchange, Error> {
        if self.md.model_exchange.is_none() {
            return Err(Error::Instantiation(format!(
                "{} does not provide a Model Exchange interface",
                self.md.model_name
            )));
        }
        Ok(Instance::new(
            Interface::ModelExchange,
            instance_name,
            &self.md,
            context,
        ))
    }

    fn instantiate_cs(
        &self,
        instance_name: &str,
        context: CheckContext,
    ) -> Result<Self::CoSimulation, Error> {
        if self.md.co_simulation.is_none() {
            return Err(Error::Instantiation(format!(
                "{} does not provide a Co-Simulation interface",
                self.md.model_name
            )));
        }
        Ok(Instance::new(
            Interface::CoSimulation,
            instance_name,
            &self.md,
            context,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{dahlquist::Dahlquist, stair::Stair};

    #[test_log::test]
    fn test_call_sequence() {
        let import = ModelImport::<Dahlquist>::new();
        let ctx = CheckContext::default();
        ctx.expect_instance("test");
        let mut inst = import.instantiate_me("test", ctx.clone()).unwrap();

        assert_eq!(inst.enter_event_mode(), Err(CapabilityError::Error));
        assert_eq!(ctx.message_counts().errors, 1);

        inst.setup_experiment(None, 0.0, Some(1.0)).unwrap();
        inst.enter_initialization_mode().unwrap();
        inst.exit_initialization_mode().unwrap();
        assert_eq!(inst.state(), ModelState::EventMode);
        inst.enter_continuous_time_mode().unwrap();
        assert_eq!(inst.do_step(0.0, 0.1, true), Err(CapabilityError::Error));
        inst.terminate().unwrap();
        assert_eq!(inst.state(), ModelState::Terminated);
    }

    #[test_log::test]
    fn test_cs_time_events() {
        let import = ModelImport::<Stair>::new();
        let ctx = CheckContext::default();
        let mut inst = import.instantiate_cs("test", ctx).unwrap();

        inst.setup_experiment(None, 0.0, None).unwrap();
        inst.enter_initialization_mode().unwrap();
        inst.exit_initialization_mode().unwrap();
        inst.do_step(0.0, 2.5, true).unwrap();
        assert_eq!(inst.model().counter, 3);
        assert_eq!(inst.last_successful_time().unwrap(), 2.5);

        assert_eq!(inst.do_step(1.0, 0.5, true), Err(CapabilityError::Error));
    }

    #[test]
    fn test_missing_interface() {
        let import = ModelImport::<bouncing_ball::BouncingBall>::new();
        assert!(matches!(
            import.instantiate_cs("test", CheckContext::default()),
            Err(Error::Instantiation(_))
        ));
    }
}
