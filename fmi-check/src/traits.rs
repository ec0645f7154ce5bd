//! The capability interface the checker drives.
//!
//! These traits describe an FMI 2.0 model instance as a set of synchronous calls. Every call
//! returns `Ok(Res)` for the success statuses and `Err(CapabilityError)` otherwise, so that call
//! sites can propagate failures with `?`.

use crate::{
    context::CheckContext,
    schema::{ModelDescription, ValueReference},
};

/// The two FMI interfaces the checker drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    ModelExchange,
    CoSimulation,
}

impl std::fmt::Display for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interface::ModelExchange => write!(f, "Model Exchange"),
            Interface::CoSimulation => write!(f, "Co-Simulation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Res {
    /// All well
    OK,
    /// Things are not quite right, but the computation can continue. The model's logger was
    /// called, and it is expected that the message was shown to the user.
    Warning,
    /// Only returned from the co-simulation interface, if the slave executes the function in an
    /// asynchronous way.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// For model exchange: a smaller step size should be tried, for example because an iterative
    /// solver in the model did not converge.
    ///
    /// For co-simulation: the slave could not complete the communication step. The master can
    /// query [`CoSimulation::last_successful_time`] and [`CoSimulation::terminated`].
    #[error("Discard")]
    Discard,
    /// The simulation cannot be continued with this instance.
    #[error("Error")]
    Error,
    /// The model computations are irreparably corrupted for all instances.
    #[error("Fatal")]
    Fatal,
}

pub type CapabilityResult = Result<Res, CapabilityError>;

/// Event flags returned from [`ModelExchange::new_discrete_states`].
#[derive(Default, Debug, PartialEq)]
pub struct EventFlags {
    /// The importer must stay in Event Mode for another event iteration.
    pub discrete_states_need_update: bool,
    /// The model requests to stop the simulation and the importer must call
    /// [`Common::terminate()`].
    pub terminate_simulation: bool,
    pub nominals_of_continuous_states_changed: bool,
    /// At least one continuous state has changed its value because it was re-initialized.
    pub values_of_continuous_states_changed: bool,
    /// The absolute time of the next time event.
    pub next_event_time: Option<f64>,
}

impl EventFlags {
    /// Reset all event flags to their default state.
    pub fn reset(&mut self) {
        self.discrete_states_need_update = false;
        self.terminate_simulation = false;
        self.nominals_of_continuous_states_changed = false;
        self.values_of_continuous_states_changed = false;
        self.next_event_time = None;
    }
}

pub trait Common {
    /// The instance name given at instantiation.
    fn instance_name(&self) -> &str;

    /// Informs the instance to setup the experiment.
    fn setup_experiment(
        &mut self,
        tolerance: Option<f64>,
        start_time: f64,
        stop_time: Option<f64>,
    ) -> CapabilityResult;

    fn enter_initialization_mode(&mut self) -> CapabilityResult;

    fn exit_initialization_mode(&mut self) -> CapabilityResult;

    /// Informs the instance that the simulation run is terminated.
    fn terminate(&mut self) -> CapabilityResult;

    fn get_real(&mut self, vrs: &[ValueReference], values: &mut [f64]) -> CapabilityResult;

    fn get_integer(&mut self, vrs: &[ValueReference], values: &mut [i32]) -> CapabilityResult;

    fn get_boolean(&mut self, vrs: &[ValueReference], values: &mut [bool]) -> CapabilityResult;

    fn get_string(&mut self, vrs: &[ValueReference], values: &mut [String]) -> CapabilityResult;

    fn set_real(&mut self, vrs: &[ValueReference], values: &[f64]) -> CapabilityResult;

    fn set_integer(&mut self, vrs: &[ValueReference], values: &[i32]) -> CapabilityResult;

    fn set_boolean(&mut self, vrs: &[ValueReference], values: &[bool]) -> CapabilityResult;

    fn set_string(&mut self, vrs: &[ValueReference], values: &[String]) -> CapabilityResult;
}

pub trait ModelExchange: Common {
    /// The model enters Event Mode from Continuous-Time Mode.
    fn enter_event_mode(&mut self) -> CapabilityResult;

    /// Evaluate the discrete-time equations of one event iteration.
    fn new_discrete_states(&mut self, event_flags: &mut EventFlags) -> CapabilityResult;

    fn enter_continuous_time_mode(&mut self) -> CapabilityResult;

    /// Must be called after every completed step of the integrator.
    ///
    /// Returns `(enter_event_mode, terminate_simulation)`.
    fn completed_integrator_step(
        &mut self,
        no_set_fmu_state_prior_to_current_point: bool,
    ) -> Result<(bool, bool), CapabilityError>;

    fn set_time(&mut self, time: f64) -> CapabilityResult;

    fn set_continuous_states(&mut self, states: &[f64]) -> CapabilityResult;

    fn get_continuous_states(&mut self, states: &mut [f64]) -> CapabilityResult;

    fn get_derivatives(&mut self, derivatives: &mut [f64]) -> CapabilityResult;

    fn get_event_indicators(&mut self, indicators: &mut [f64]) -> CapabilityResult;
}

pub trait CoSimulation: Common {
    /// Compute the communication step `[current_communication_point, +communication_step_size]`.
    fn do_step(
        &mut self,
        current_communication_point: f64,
        communication_step_size: f64,
        new_step: bool,
    ) -> CapabilityResult;

    /// End time of the last successfully completed communication step. Valid after `do_step`
    /// returned [`CapabilityError::Discard`].
    fn last_successful_time(&mut self) -> Result<f64, CapabilityError>;

    /// `true` if the slave wants to terminate the simulation. Valid after `do_step` returned
    /// [`CapabilityError::Discard`].
    fn terminated(&mut self) -> Result<bool, CapabilityError>;
}

/// A loaded model that can be queried and instantiated.
///
/// Instances release their resources (`freeInstance`) when dropped.
pub trait FmuImport {
    type ModelExchange: ModelExchange;
    type CoSimulation: CoSimulation;

    fn model_description(&self) -> &ModelDescription;

    fn instantiate_me(
        &self,
        instance_name: &str,
        context: CheckContext,
    ) -> Result<Self::ModelExchange, crate::Error>;

    fn instantiate_cs(
        &self,
        instance_name: &str,
        context: CheckContext,
    ) -> Result<Self::CoSimulation, crate::Error>;
}
