use crate::{
    input::{
        events::{EventScanState, ExternalEvent},
        interpolation::InterpolationState,
        InputData,
    },
    ledger::{Buffer, BufferLedger},
    schema::{ScalarVariable, ValueReference},
    traits::{CapabilityError, Common},
};

/// Value references of a group of inputs and which of them are negated aliases.
struct InputRefs {
    vrs: Vec<ValueReference>,
    negated: Vec<bool>,
}

impl InputRefs {
    fn new<'a>(vars: impl Iterator<Item = &'a ScalarVariable>) -> Self {
        let (vrs, negated) = vars
            .map(|v| (v.value_reference, v.alias.is_negated()))
            .unzip();
        Self { vrs, negated }
    }
}

/// Pushes the input samples into a model instance.
///
/// Owns the per-run interpolation and event-scan cursors over a shared [`InputData`].
pub struct InputState<'a> {
    data: &'a InputData,
    interpolation: InterpolationState,
    scan: EventScanState,
    reals: InputRefs,
    continuous_reals: InputRefs,
    integers: InputRefs,
    booleans: InputRefs,
    real_out: Buffer<f64>,
    continuous_out: Buffer<f64>,
    integer_out: Buffer<i32>,
    boolean_out: Buffer<bool>,
}

impl<'a> InputState<'a> {
    pub fn new(data: &'a InputData, ledger: &BufferLedger) -> Self {
        let catalog = &data.catalog;
        let continuous = catalog
            .continuous_reals()
            .iter()
            .map(|&i| &catalog.real_inputs()[i]);

        Self {
            data,
            interpolation: InterpolationState::new(data, ledger),
            scan: EventScanState::new(),
            reals: InputRefs::new(catalog.real_inputs().iter()),
            continuous_reals: InputRefs::new(continuous),
            integers: InputRefs::new(catalog.integer_inputs().iter()),
            booleans: InputRefs::new(catalog.boolean_inputs().iter()),
            real_out: ledger.alloc(catalog.real_inputs().len()),
            continuous_out: ledger.alloc(catalog.continuous_reals().len()),
            integer_out: ledger.alloc(catalog.integer_inputs().len()),
            boolean_out: ledger.alloc(catalog.boolean_inputs().len()),
        }
    }

    /// Set every input to its value at `time`: reals, then booleans, then integers.
    pub fn apply_all<C: Common>(&mut self, inst: &mut C, time: f64) -> Result<(), CapabilityError> {
        if self.data.is_empty() {
            return Ok(());
        }
        self.interpolation.update(self.data, time);
        self.push_all(inst)
    }

    /// Set every input before initialization of a Model Exchange run.
    ///
    /// A discrete change at or before `time` is already in effect: the values of the row after
    /// the latest such change are held, and the event scan resumes behind it.
    pub fn apply_initial<C: Common>(
        &mut self,
        inst: &mut C,
        time: f64,
    ) -> Result<(), CapabilityError> {
        if self.data.is_empty() {
            return Ok(());
        }
        self.interpolation.update(self.data, time);

        let ts = self.data.series.timestamps();
        let latest = (0..ts.len() - 1)
            .take_while(|&k| ts[k] <= time)
            .filter(|&k| self.data.discrete_change(k))
            .last();
        if let Some(k) = latest {
            let event = ExternalEvent {
                time: ts[k],
                row: k + 1,
            };
            log::debug!(
                "Input change at t = {} is in effect at start time {time}",
                event.time
            );
            self.interpolation.hold_row(self.data, event.row);
            self.scan.acknowledge(&event);
        }
        self.push_all(inst)
    }

    /// Set only the continuous real inputs. Discrete values change at events only.
    pub fn apply_continuous<C: Common>(
        &mut self,
        inst: &mut C,
        time: f64,
    ) -> Result<(), CapabilityError> {
        if self.data.is_empty() || self.continuous_reals.vrs.is_empty() {
            return Ok(());
        }
        self.interpolation.update(self.data, time);
        translate(
            &mut self.continuous_out,
            self.interpolation.continuous_reals(),
            &self.continuous_reals.negated,
            |v| -v,
        );
        inst.set_real(&self.continuous_reals.vrs, &self.continuous_out)?;
        Ok(())
    }

    /// Set every input at an external event, taking the discrete values from the row that
    /// became effective.
    pub fn apply_event<C: Common>(
        &mut self,
        inst: &mut C,
        event: &ExternalEvent,
    ) -> Result<(), CapabilityError> {
        if self.data.is_empty() {
            return Ok(());
        }
        self.interpolation.update(self.data, event.time);
        self.interpolation.hold_row(self.data, event.row);
        self.push_all(inst)
    }

    fn push_all<C: Common>(&mut self, inst: &mut C) -> Result<(), CapabilityError> {
        if !self.reals.vrs.is_empty() {
            translate(
                &mut self.real_out,
                self.interpolation.reals(),
                &self.reals.negated,
                |v| -v,
            );
            inst.set_real(&self.reals.vrs, &self.real_out)?;
        }
        if !self.booleans.vrs.is_empty() {
            translate(
                &mut self.boolean_out,
                self.interpolation.booleans(self.data),
                &self.booleans.negated,
                |v| !v,
            );
            inst.set_boolean(&self.booleans.vrs, &self.boolean_out)?;
        }
        if !self.integers.vrs.is_empty() {
            translate(
                &mut self.integer_out,
                self.interpolation.integers(self.data),
                &self.integers.negated,
                i32::wrapping_neg,
            );
            inst.set_integer(&self.integers.vrs, &self.integer_out)?;
        }
        Ok(())
    }

    /// The next external event in `[tcur, tnext]`, if any.
    pub fn next_external_event(&mut self, tcur: f64, tnext: f64) -> Option<ExternalEvent> {
        self.scan.detect(self.data, tcur, tnext)
    }

    pub fn acknowledge_event(&mut self, event: &ExternalEvent) {
        self.scan.acknowledge(event);
    }
}

fn translate<T: Copy>(dst: &mut [T], src: &[T], negated: &[bool], negate: impl Fn(T) -> T) {
    for ((d, &s), &neg) in dst.iter_mut().zip(src).zip(negated) {
        *d = if neg { negate(s) } else { s };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::CheckContext,
        models::{feedthrough::Feedthrough, ModelImport, UserModel},
        traits::FmuImport,
    };

    fn data() -> InputData {
        InputData::from_text(
            "time,Float64_continuous_input,Float64_discrete_input,Int32_input,Boolean_input\n\
             0,0,1,1,0\n\
             1,10,2,2,1\n",
            &Feedthrough::model_description(),
        )
        .unwrap()
    }

    #[test]
    fn test_apply_all() {
        let data = data();
        let import = ModelImport::<Feedthrough>::new();
        let ctx = CheckContext::default();
        let mut inst = import.instantiate_cs("test", ctx.clone()).unwrap();
        let mut inputs = InputState::new(&data, ctx.ledger());

        inputs.apply_all(&mut inst, 0.5).unwrap();
        let model = inst.model();
        assert_eq!(model.continuous_input, 5.0);
        assert_eq!(model.discrete_input, 1.0);
        assert_eq!(model.int_input, 1);
        assert!(!model.bool_input);
    }

    #[test]
    fn test_apply_continuous_leaves_discrete() {
        let data = data();
        let import = ModelImport::<Feedthrough>::new();
        let ctx = CheckContext::default();
        let mut inst = import.instantiate_me("test", ctx.clone()).unwrap();
        let mut inputs = InputState::new(&data, ctx.ledger());

        inputs.apply_continuous(&mut inst, 1.0).unwrap();
        let model = inst.model();
        assert_eq!(model.continuous_input, 10.0);
        assert_eq!(model.discrete_input, 0.0);
        assert_eq!(model.int_input, 0);
    }

    #[test]
    fn test_apply_event_uses_new_row() {
        let data = data();
        let import = ModelImport::<Feedthrough>::new();
        let ctx = CheckContext::default();
        let mut inst = import.instantiate_cs("test", ctx.clone()).unwrap();
        let mut inputs = InputState::new(&data, ctx.ledger());

        let event = inputs.next_external_event(0.0, 0.5).unwrap();
        assert_eq!(event.time, 0.0);
        inputs.apply_event(&mut inst, &event).unwrap();
        inputs.acknowledge_event(&event);

        let model = inst.model();
        assert_eq!(model.continuous_input, 0.0);
        assert_eq!(model.discrete_input, 2.0);
        assert_eq!(model.int_input, 2);
        assert!(model.bool_input);
        assert_eq!(inputs.next_external_event(0.0, 0.5), None);
    }

    #[test]
    fn test_negated_alias() {
        let data = InputData::from_text(
            "time,Float64_continuous_input_negated\n0,3\n",
            &Feedthrough::model_description(),
        )
        .unwrap();
        let import = ModelImport::<Feedthrough>::new();
        let ctx = CheckContext::default();
        let mut inst = import.instantiate_cs("test", ctx.clone()).unwrap();
        let mut inputs = InputState::new(&data, ctx.ledger());

        inputs.apply_all(&mut inst, 0.0).unwrap();
        assert_eq!(inst.model().continuous_input, -3.0);
    }

    #[test]
    fn test_initial_change_in_effect() {
        let data = InputData::from_text(
            "time,Int32_input,Boolean_input\n-1,1,0\n0,2,0\n0.5,2,1\n1,3,1\n",
            &Feedthrough::model_description(),
        )
        .unwrap();
        let import = ModelImport::<Feedthrough>::new();
        let ctx = CheckContext::default();
        let mut inst = import.instantiate_me("test", ctx.clone()).unwrap();
        let mut inputs = InputState::new(&data, ctx.ledger());

        inputs.apply_initial(&mut inst, 0.0).unwrap();
        assert_eq!(inst.model().int_input, 2);
        assert!(inst.model().bool_input);

        // the change at t = 0 was consumed, the one at t = 0.5 is still ahead
        assert_eq!(
            inputs.next_external_event(0.0, 0.5),
            Some(ExternalEvent { time: 0.5, row: 3 })
        );
    }

    #[test]
    fn test_translate_integer_min() {
        let mut dst = [0; 3];
        translate(
            &mut dst,
            &[i32::MIN, 5, i32::MAX],
            &[true, true, false],
            i32::wrapping_neg,
        );
        assert_eq!(dst, [i32::MIN, -5, i32::MAX]);
    }

    #[test]
    fn test_empty_is_noop() {
        let data = InputData::empty();
        let import = ModelImport::<Feedthrough>::new();
        let ctx = CheckContext::default();
        let mut inst = import.instantiate_cs("test", ctx.clone()).unwrap();
        let mut inputs = InputState::new(&data, ctx.ledger());

        inputs.apply_all(&mut inst, 0.0).unwrap();
        inputs.apply_continuous(&mut inst, 0.0).unwrap();
        assert_eq!(inputs.next_external_event(0.0, 1.0), None);
        assert_eq!(inst.model().continuous_input, 0.0);
    }
}
