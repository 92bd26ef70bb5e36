//! Elements replayed by a system on every iteration.

use fs_core::UnitId;
use fs_flowsheet::Flowsheet;

use crate::error::SystemResult;
use crate::system::System;

/// Side-effecting step in a path, e.g. a design specification that
/// adjusts a feed before the next unit runs.
pub type Hook = Box<dyn FnMut(&mut Flowsheet) -> SystemResult<()> + Send>;

/// Replaces a nested system's own convergence when that system is reached
/// in its parent's path. The hook usually adjusts something and then
/// converges the system itself.
pub type SpecificationHook = Box<dyn FnMut(&mut System, &mut Flowsheet) -> SystemResult<()> + Send>;

/// One step of a path.
pub enum PathElement {
    Unit(UnitId),
    System(Box<System>),
    Hook(Hook),
}

impl PathElement {
    pub fn hook<F>(f: F) -> Self
    where
        F: FnMut(&mut Flowsheet) -> SystemResult<()> + Send + 'static,
    {
        PathElement::Hook(Box::new(f))
    }
}

impl From<UnitId> for PathElement {
    fn from(id: UnitId) -> Self {
        PathElement::Unit(id)
    }
}

impl From<System> for PathElement {
    fn from(system: System) -> Self {
        PathElement::System(Box::new(system))
    }
}

impl std::fmt::Debug for PathElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathElement::Unit(id) => write!(f, "Unit({id})"),
            PathElement::System(s) => write!(f, "System({})", s.id()),
            PathElement::Hook(_) => f.write_str("Hook"),
        }
    }
}
