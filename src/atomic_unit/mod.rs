//! Scoped atomic units: the all-or-nothing wrapper around every attempt.
//!
//! The executor never talks to a concrete transaction manager. Instead it is
//! handed an [`AtomicUnitProvider`] and, for each attempt (and for the
//! failure handler), calls [`begin`](AtomicUnitProvider::begin), runs the
//! work, then either [`commit`](AtomicUnit::commit)s on success or
//! [`rollback`](AtomicUnit::rollback)s on failure.
//!
//! Whether a particular error should leave side effects in place is a
//! property of the provider, not of the executor: the executor always
//! commits on `Ok` and always rolls back on `Err`.

use crate::BoxError;

/// One open all-or-nothing scope.
///
/// The executor calls [`commit`](Self::commit) after successful work. If the
/// work or the commit fails it calls [`rollback`](Self::rollback) on the same
/// unit, then drops it.
pub trait AtomicUnit: Send {
    /// Makes the side effects of the scope permanent.
    fn commit(&mut self) -> Result<(), BoxError>;

    /// Discards the side effects of the scope.
    fn rollback(&mut self) -> Result<(), BoxError>;
}

/// Opens [`AtomicUnit`]s on demand.
///
/// A failing [`begin`](Self::begin) means no unit can be obtained at all
/// (e.g. no transactional context is reachable). The executor treats that as
/// a configuration failure and does not run the task.
pub trait AtomicUnitProvider: Send + Sync {
    fn begin(&self) -> Result<Box<dyn AtomicUnit>, BoxError>;
}

/// Provider for callers without a transactional resource.
///
/// Every unit it opens commits and rolls back trivially.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAtomicUnits;

struct NoopUnit;

impl AtomicUnit for NoopUnit {
    fn commit(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl AtomicUnitProvider for NoopAtomicUnits {
    fn begin(&self) -> Result<Box<dyn AtomicUnit>, BoxError> {
        Ok(Box::new(NoopUnit))
    }
}
