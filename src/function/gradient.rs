//! Projection of child gradients into a parent's parameter space.

use super::{Graph, NodeId, ProjectionKey};
use crate::error::{MealError, Result};
use crate::value::{Value, ValueKind};

impl Graph {
    /// Add each element of a child's gradient into the parent gradient at
    /// the composite index of the corresponding child parameter.
    ///
    /// Accumulation is additive: two projections aliasing the same child
    /// sum their contributions. The caller zero-initialises `gradient`.
    pub fn project_gradient(
        &self,
        parent: NodeId,
        key: ProjectionKey,
        child_gradient: &[Value],
        gradient: &mut [Value],
    ) -> Result<()> {
        let imap = self.get_projection_imap(parent, key)?;
        if imap.len() != child_gradient.len() {
            return Err(MealError::invalid_state(
                "Graph::project_gradient",
                format!(
                    "child gradient size={} != nparam={}",
                    child_gradient.len(),
                    imap.len()
                ),
            ));
        }
        for (element, index) in child_gradient.iter().zip(imap) {
            let slot = gradient.get_mut(index).ok_or_else(|| {
                MealError::invalid_range(
                    "Graph::project_gradient",
                    format!("index={} >= gradient size", index),
                )
            })?;
            *slot = slot.try_add(element)?;
        }
        Ok(())
    }

    /// Zero the parent gradient, then project the concatenated gradients of
    /// several children in turn.
    ///
    /// Every element of `child_gradients` must be consumed; a mismatch
    /// between the total supplied and the children's parameter counts is
    /// reported as `InvalidState`.
    pub fn project_gradients(
        &self,
        parent: NodeId,
        keys: &[ProjectionKey],
        child_gradients: &[Value],
        kind: ValueKind,
        gradient: &mut Vec<Value>,
    ) -> Result<()> {
        gradient.clear();
        gradient.resize(self.nparam(parent)?, Value::zero(kind));

        let composite = self.composite(parent)?;
        let mut consumed = 0;
        for key in keys {
            let nparam = self.nparam(composite.projection(*key)?.function())?;
            let end = consumed + nparam;
            if end > child_gradients.len() {
                return Err(MealError::invalid_state(
                    "Graph::project_gradients",
                    format!("supplied={} < required={}", child_gradients.len(), end),
                ));
            }
            self.project_gradient(parent, *key, &child_gradients[consumed..end], gradient)?;
            consumed = end;
        }

        if consumed != child_gradients.len() {
            return Err(MealError::invalid_state(
                "Graph::project_gradients",
                format!("consumed={} != supplied={}", consumed, child_gradients.len()),
            ));
        }
        Ok(())
    }
}
