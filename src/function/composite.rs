//! Composite parameter spaces.
//!
//! A composite node owns no parameters of its own. Each child it composes
//! is recorded in a [`Projection`] whose `imap` translates the child's
//! local parameter indices into the flat index space of the parent.
//!
//! Mapping rules:
//!
//! 1. constants contribute no indices;
//! 2. a composite child is flattened, so that the leaves it maps are mapped
//!    directly into the parent;
//! 3. a leaf that is already mapped (same [`NodeId`]) reuses its block of
//!    indices, so shared sub-models are counted once;
//! 4. any other leaf is appended and receives the next contiguous block.
//!
//! The index tables are always rebuilt from the ordered projection list by
//! [`Graph::remap`], which is the single re-entry point after any
//! structural change.

use log::trace;
use std::cell::Cell;

use super::{Graph, NodeId, ParameterPolicy};
use crate::error::{MealError, Result};

/// Identifies one projection within the composite that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectionKey(pub(crate) usize);

/// The index map of one mapped child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    key: ProjectionKey,
    function: NodeId,
    imap: Vec<usize>,
}

impl Projection {
    pub fn key(&self) -> ProjectionKey {
        self.key
    }

    pub fn function(&self) -> NodeId {
        self.function
    }

    /// Composite index of each local parameter of the child.
    pub fn imap(&self) -> &[usize] {
        &self.imap
    }
}

/// The flattened parameter space of a composite node.
#[derive(Debug, Clone, Default)]
pub struct Composite {
    projections: Vec<Projection>,
    /// Distinct leaves in order of first appearance.
    models: Vec<NodeId>,
    nparameters: usize,
    next_key: usize,
    /// (model index, base offset) of the last lookup by [`Graph::get_function`]
    current: Cell<(usize, usize)>,
}

impl Composite {
    pub fn nparameters(&self) -> usize {
        self.nparameters
    }

    pub fn models(&self) -> &[NodeId] {
        &self.models
    }

    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    pub fn projection(&self, key: ProjectionKey) -> Result<&Projection> {
        self.projections
            .iter()
            .find(|p| p.key == key)
            .ok_or_else(|| {
                MealError::invalid_param("Composite::projection", format!("no projection {:?}", key))
            })
    }
}

struct IndexTable {
    models: Vec<NodeId>,
    nparameters: usize,
    imaps: Vec<Vec<usize>>,
}

impl Graph {
    pub fn composite(&self, id: NodeId) -> Result<&Composite> {
        match &self.node(id)?.parameters {
            ParameterPolicy::Composite(composite) => Ok(composite),
            _ => Err(MealError::invalid_state(
                "Graph::composite",
                format!("{} is not a composite", id),
            )),
        }
    }

    fn composite_mut(&mut self, id: NodeId) -> Result<&mut Composite> {
        match &mut self.node_mut(id)?.parameters {
            ParameterPolicy::Composite(composite) => Ok(composite),
            _ => Err(MealError::invalid_state(
                "Graph::composite_mut",
                format!("{} is not a composite", id),
            )),
        }
    }

    /// True when `target` is `id` or is reachable through its projections.
    fn depends_on(&self, id: NodeId, target: NodeId) -> Result<bool> {
        if id == target {
            return Ok(true);
        }
        if let ParameterPolicy::Composite(composite) = &self.node(id)?.parameters {
            for projection in &composite.projections {
                if self.depends_on(projection.function, target)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Map a child into the parameter space of a composite parent.
    ///
    /// The parent becomes an observer of the child. Returns the key of the
    /// new projection, needed to project gradients and to unmap.
    pub fn map(&mut self, parent: NodeId, child: NodeId) -> Result<ProjectionKey> {
        self.composite(parent)?;
        if self.depends_on(child, parent)? {
            return Err(MealError::invalid_param(
                "Graph::map",
                format!("mapping {} into {} would create a cycle", child, parent),
            ));
        }

        let composite = self.composite_mut(parent)?;
        let key = ProjectionKey(composite.next_key);
        composite.next_key += 1;
        composite.projections.push(Projection {
            key,
            function: child,
            imap: Vec::new(),
        });
        trace!("Graph::map {} into {} key={:?}", child, parent, key);

        self.add_observer(child, parent)?;
        self.remap(parent)?;
        Ok(key)
    }

    /// Remove a projection; remaining children are remapped.
    pub fn unmap(&mut self, parent: NodeId, key: ProjectionKey) -> Result<NodeId> {
        let composite = self.composite_mut(parent)?;
        let position = composite
            .projections
            .iter()
            .position(|p| p.key == key)
            .ok_or_else(|| {
                MealError::invalid_param("Graph::unmap", format!("no projection {:?}", key))
            })?;
        let projection = composite.projections.remove(position);
        trace!("Graph::unmap {} from {}", projection.function, parent);

        self.remove_observer(projection.function, parent)?;
        self.remap(parent)?;
        Ok(projection.function)
    }

    fn build_index(&self, projections: &[Projection]) -> Result<IndexTable> {
        let mut models: Vec<NodeId> = Vec::new();
        let mut bases: Vec<usize> = Vec::new();
        let mut nparameters = 0;
        let mut imaps = Vec::with_capacity(projections.len());

        for projection in projections {
            let leaves = match &self.node(projection.function)?.parameters {
                ParameterPolicy::Constant => Vec::new(),
                ParameterPolicy::Store(_) => vec![projection.function],
                ParameterPolicy::Composite(child) => child.models.clone(),
            };

            let mut imap = Vec::new();
            for leaf in leaves {
                let nparam = self.nparam(leaf)?;
                let base = match models.iter().position(|m| *m == leaf) {
                    Some(imodel) => bases[imodel],
                    None => {
                        models.push(leaf);
                        bases.push(nparameters);
                        nparameters += nparam;
                        nparameters - nparam
                    }
                };
                imap.extend(base..base + nparam);
            }
            imaps.push(imap);
        }

        Ok(IndexTable {
            models,
            nparameters,
            imaps,
        })
    }

    /// Rebuild every index table of a composite from its projections, then
    /// announce the (possibly) new parameter count to its observers.
    pub fn remap(&mut self, parent: NodeId) -> Result<()> {
        let projections = self.composite(parent)?.projections.clone();
        let table = self.build_index(&projections)?;

        let composite = self.composite_mut(parent)?;
        for (projection, imap) in composite.projections.iter_mut().zip(table.imaps) {
            projection.imap = imap;
        }
        composite.models = table.models;
        composite.nparameters = table.nparameters;
        composite.current.set((0, 0));
        trace!(
            "Graph::remap {} nmodel={} nparam={}",
            parent,
            composite.models.len(),
            composite.nparameters
        );

        self.notify(parent, super::Attribute::ParameterCount)
    }

    /// Composite index of local parameter `index` of the child mapped by `key`.
    pub fn get_imap(&self, parent: NodeId, key: ProjectionKey, index: usize) -> Result<usize> {
        let projection = self.composite(parent)?.projection(key)?;
        let nparam = self.nparam(projection.function)?;
        if projection.imap.len() != nparam {
            return Err(MealError::invalid_range(
                "Graph::get_imap",
                format!(
                    "imap size={} != nparam={} of {}",
                    projection.imap.len(),
                    nparam,
                    projection.function
                ),
            ));
        }
        projection.imap.get(index).copied().ok_or_else(|| {
            MealError::invalid_range(
                "Graph::get_imap",
                format!("index={} >= nparam={}", index, nparam),
            )
        })
    }

    /// The whole index map of one projection.
    pub fn get_projection_imap(&self, parent: NodeId, key: ProjectionKey) -> Result<Vec<usize>> {
        let nparam = self.nparam(self.composite(parent)?.projection(key)?.function)?;
        (0..nparam).map(|i| self.get_imap(parent, key, i)).collect()
    }

    /// The leaf owning composite parameter `index`, and its local index there.
    ///
    /// Sequential scans are served from a one-entry cache of the last model
    /// found; the cache restarts from the first model whenever `index` lies
    /// before the cached offset.
    pub fn get_function(&self, parent: NodeId, index: usize) -> Result<(NodeId, usize)> {
        let composite = self.composite(parent)?;
        if index >= composite.nparameters {
            return Err(MealError::invalid_range(
                "Graph::get_function",
                format!("index={} >= nparam={}", index, composite.nparameters),
            ));
        }

        let (mut imodel, mut base) = composite.current.get();
        if index < base || imodel >= composite.models.len() {
            imodel = 0;
            base = 0;
        }

        while imodel < composite.models.len() {
            let model = composite.models[imodel];
            let nparam = self.nparam(model)?;
            if index < base + nparam {
                composite.current.set((imodel, base));
                return Ok((model, index - base));
            }
            base += nparam;
            imodel += 1;
        }

        Err(MealError::invalid_state(
            "Graph::get_function",
            format!("index={} not found among {} models", index, composite.models.len()),
        ))
    }

    /// Composite index of the first parameter of `leaf`, if it is mapped.
    pub fn find_parameter(&self, parent: NodeId, leaf: NodeId) -> Result<Option<usize>> {
        let composite = self.composite(parent)?;
        let mut base = 0;
        for model in &composite.models {
            if *model == leaf {
                return Ok(Some(base));
            }
            base += self.nparam(*model)?;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::function::Graph;
    use crate::value::ValueKind;

    #[test]
    fn test_distinct_children_bijection() {
        let mut graph = Graph::new();
        let a = graph.scalar_value("a", 1.0).unwrap();
        let b = graph.coherency("rho", [1.0, 0.0, 0.0, 0.0]).unwrap();
        let c = graph.scalar_value("c", 3.0).unwrap();
        let sum = graph.sum(ValueKind::Scalar, &[]).unwrap();

        let ka = graph.map(sum, a).unwrap();
        let kb = graph.map(sum, b).unwrap();
        let kc = graph.map(sum, c).unwrap();
        assert_eq!(graph.nparam(sum).unwrap(), 6);

        let mut all: Vec<usize> = [ka, kb, kc]
            .iter()
            .flat_map(|k| graph.get_projection_imap(sum, *k).unwrap())
            .collect();
        all.sort();
        assert_eq!(all, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_shared_child_collapses() {
        let mut graph = Graph::new();
        let a = graph.scalar_value("a", 1.0).unwrap();
        let b = graph.scalar_value("b", 2.0).unwrap();
        let sum = graph.sum(ValueKind::Scalar, &[]).unwrap();

        let k1 = graph.map(sum, a).unwrap();
        graph.map(sum, b).unwrap();
        let k2 = graph.map(sum, a).unwrap();

        assert_eq!(graph.nparam(sum).unwrap(), 2);
        assert_eq!(
            graph.get_projection_imap(sum, k1).unwrap(),
            graph.get_projection_imap(sum, k2).unwrap()
        );
        assert_eq!(graph.observers(a).unwrap().len(), 2);
    }

    #[test]
    fn test_constant_not_mapped() {
        let mut graph = Graph::new();
        let k = graph.scalar_constant(2.0).unwrap();
        let a = graph.scalar_value("a", 1.0).unwrap();
        let product = graph.product(ValueKind::Scalar, &[k, a]).unwrap();

        assert_eq!(graph.nparam(product).unwrap(), 1);
        assert_eq!(graph.composite(product).unwrap().models().len(), 1);
        // constants still notify their parents
        assert_eq!(graph.observers(k).unwrap(), &[product]);
    }

    #[test]
    fn test_nested_composite_flattened() {
        let mut graph = Graph::new();
        let a = graph.scalar_value("a", 1.0).unwrap();
        let b = graph.scalar_value("b", 2.0).unwrap();
        let c = graph.scalar_value("c", 3.0).unwrap();
        let inner = graph.sum(ValueKind::Scalar, &[a, b]).unwrap();
        let outer = graph.product(ValueKind::Scalar, &[c, inner, b]).unwrap();

        let composite = graph.composite(outer).unwrap();
        assert_eq!(composite.models(), &[c, a, b]);
        assert_eq!(graph.nparam(outer).unwrap(), 3);

        let inner_key = composite.projections()[1].key();
        assert_eq!(graph.get_projection_imap(outer, inner_key).unwrap(), vec![1, 2]);
        let b_key = composite.projections()[2].key();
        assert_eq!(graph.get_projection_imap(outer, b_key).unwrap(), vec![2]);
    }

    #[test]
    fn test_unmap_shifts_offsets() {
        let mut graph = Graph::new();
        let a = graph.coherency("a", [1.0, 0.0, 0.0, 0.0]).unwrap();
        let b = graph.scalar_value("b", 2.0).unwrap();
        let sum = graph.sum(ValueKind::Scalar, &[]).unwrap();

        let ka = graph.map(sum, a).unwrap();
        let kb = graph.map(sum, b).unwrap();
        assert_eq!(graph.get_imap(sum, kb, 0).unwrap(), 4);

        assert_eq!(graph.unmap(sum, ka).unwrap(), a);
        assert_eq!(graph.nparam(sum).unwrap(), 1);
        assert_eq!(graph.get_imap(sum, kb, 0).unwrap(), 0);
        assert!(graph.observers(a).unwrap().is_empty());
        assert_eq!(graph.get_imap(sum, ka, 0).unwrap_err().kind(), ErrorKind::InvalidParam);
    }

    #[test]
    fn test_parameter_count_change_remaps_parents() {
        let mut graph = Graph::new();
        let x = graph.scalar_value("x", 1.0).unwrap();
        let poly = graph.polynomial("p", 2, 0.0).unwrap();
        let inner = graph.sum(ValueKind::Scalar, &[poly]).unwrap();
        let outer = graph.sum(ValueKind::Scalar, &[inner, x]).unwrap();
        let x_key = graph.composite(outer).unwrap().projections()[1].key();

        assert_eq!(graph.nparam(outer).unwrap(), 3);
        assert_eq!(graph.get_imap(outer, x_key, 0).unwrap(), 2);

        graph.set_ncoef(poly, 4).unwrap();
        assert_eq!(graph.nparam(inner).unwrap(), 4);
        assert_eq!(graph.nparam(outer).unwrap(), 5);
        assert_eq!(graph.get_imap(outer, x_key, 0).unwrap(), 4);
    }

    #[test]
    fn test_get_function_sequential_and_backwards() {
        let mut graph = Graph::new();
        let a = graph.coherency("a", [1.0, 0.1, 0.2, 0.3]).unwrap();
        let b = graph.scalar_value("b", 2.0).unwrap();
        let sum = graph.sum(ValueKind::Jones, &[a]).unwrap();
        graph.map(sum, b).unwrap();

        let forward: Vec<_> = (0..5).map(|i| graph.get_function(sum, i).unwrap()).collect();
        assert_eq!(forward[3], (a, 3));
        assert_eq!(forward[4], (b, 0));
        assert_eq!(graph.get_function(sum, 1).unwrap(), (a, 1));
        assert_eq!(graph.get_function(sum, 5).unwrap_err().kind(), ErrorKind::InvalidRange);
        assert_eq!(graph.find_parameter(sum, b).unwrap(), Some(4));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut graph = Graph::new();
        let a = graph.scalar_value("a", 1.0).unwrap();
        let inner = graph.sum(ValueKind::Scalar, &[a]).unwrap();
        let outer = graph.sum(ValueKind::Scalar, &[inner]).unwrap();
        assert_eq!(graph.map(inner, outer).unwrap_err().kind(), ErrorKind::InvalidParam);
        assert_eq!(graph.map(outer, outer).unwrap_err().kind(), ErrorKind::InvalidParam);
    }
}
