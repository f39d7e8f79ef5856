use std::ops::ControlFlow;

use crate::{Expression, FactOptional};

/// Receives the leaves of a condition or effect tree, in order.
///
/// Returning `ControlFlow::Break` stops the traversal.
pub trait Visitor {
    fn fact(&mut self, fact: &FactOptional) -> ControlFlow<()>;

    fn expression(&mut self, _expression: &Expression) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Adapts a closure into a [`Visitor`] that ignores expressions.
pub struct OnFact<F>(pub F);

impl<F> Visitor for OnFact<F>
where
    F: FnMut(&FactOptional) -> ControlFlow<()>,
{
    fn fact(&mut self, fact: &FactOptional) -> ControlFlow<()> {
        (self.0)(fact)
    }
}
