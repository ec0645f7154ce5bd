//! Accounting of run-scoped buffers.
//!
//! Every buffer a simulation run sizes from the model (states, derivatives, event indicators,
//! interpolated inputs) is a [`Buffer`]. Creating one bumps the allocation counter of the shared
//! [`BufferLedger`], dropping it bumps the release counter, so a run that returns on any path
//! leaves both counters equal.

use std::{
    cell::Cell,
    ops::{Deref, DerefMut},
    rc::Rc,
};

#[derive(Debug, Default)]
struct Counters {
    allocations: Cell<usize>,
    releases: Cell<usize>,
}

/// Shared allocation/release counters.
#[derive(Clone, Debug, Default)]
pub struct BufferLedger(Rc<Counters>);

impl BufferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zero-initialized buffer of `len` elements.
    pub fn alloc<T: Clone + Default>(&self, len: usize) -> Buffer<T> {
        self.track(vec![T::default(); len])
    }

    /// Take ownership of an existing vector as a tracked buffer.
    pub fn track<T>(&self, data: Vec<T>) -> Buffer<T> {
        self.0.allocations.set(self.0.allocations.get() + 1);
        Buffer {
            data,
            ledger: self.clone(),
        }
    }

    pub fn allocations(&self) -> usize {
        self.0.allocations.get()
    }

    pub fn releases(&self) -> usize {
        self.0.releases.get()
    }

    /// Number of buffers currently alive.
    pub fn outstanding(&self) -> usize {
        self.allocations() - self.releases()
    }
}

/// A vector whose lifetime is recorded in a [`BufferLedger`].
#[derive(Debug)]
pub struct Buffer<T> {
    data: Vec<T>,
    ledger: BufferLedger,
}

impl<T> Deref for Buffer<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<T> DerefMut for Buffer<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl<T> Drop for Buffer<T> {
    fn drop(&mut self) {
        let releases = &self.ledger.0.releases;
        releases.set(releases.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_balances() {
        let ledger = BufferLedger::new();
        {
            let mut a = ledger.alloc::<f64>(3);
            let b = ledger.track(vec![true, false]);
            a[1] = 2.0;
            assert_eq!(&a[..], &[0.0, 2.0, 0.0]);
            assert_eq!(b.len(), 2);
            assert_eq!(ledger.outstanding(), 2);
        }
        assert_eq!(ledger.allocations(), 2);
        assert_eq!(ledger.releases(), 2);
    }

    #[test]
    fn test_early_return_releases() {
        fn fallible(ledger: &BufferLedger) -> Result<(), ()> {
            let _x = ledger.alloc::<i32>(4);
            Err(())?;
            let _y = ledger.alloc::<i32>(4);
            Ok(())
        }

        let ledger = BufferLedger::new();
        assert!(fallible(&ledger).is_err());
        assert_eq!(ledger.allocations(), 1);
        assert_eq!(ledger.outstanding(), 0);
    }
}
