//! Parameter storage owned by a single function node.

use serde::{Deserialize, Serialize};

use super::bounds::CyclicBounds;
use super::parameter::{Estimate, Parameter};
use crate::error::{MealError, Result};

/// The parameters owned by one leaf function.
///
/// Every accessor checks the index and reports `InvalidRange` when it is
/// not less than [`ParameterStore::len`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterStore {
    params: Vec<Parameter>,
}

impl ParameterStore {
    /// A store with one parameter per name, all zero and free.
    pub fn new(names: &[&str]) -> Self {
        Self {
            params: names.iter().map(|name| Parameter::new(name, 0.0)).collect(),
        }
    }

    /// A store holding a single named parameter.
    pub fn one(name: &str, value: f64) -> Self {
        Self {
            params: vec![Parameter::new(name, value)],
        }
    }

    /// A store with no parameters.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Append a parameter, returning its index.
    pub fn push(&mut self, param: Parameter) -> usize {
        self.params.push(param);
        self.params.len() - 1
    }

    /// Remove the last parameter.
    pub fn pop(&mut self) -> Option<Parameter> {
        self.params.pop()
    }

    fn check(&self, index: usize, location: &str) -> Result<()> {
        if index >= self.params.len() {
            return Err(MealError::invalid_range(
                location,
                format!("index={} >= nparam={}", index, self.params.len()),
            ));
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<&Parameter> {
        self.check(index, "ParameterStore::get")?;
        Ok(&self.params[index])
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Parameter> {
        self.check(index, "ParameterStore::get_mut")?;
        Ok(&mut self.params[index])
    }

    pub fn get_param(&self, index: usize) -> Result<f64> {
        Ok(self.get(index)?.value())
    }

    /// Set a value; returns `true` when the stored value changed.
    pub fn set_param(&mut self, index: usize, value: f64) -> Result<bool> {
        self.check(index, "ParameterStore::set_param")?;
        Ok(self.params[index].set_value(value))
    }

    pub fn get_variance(&self, index: usize) -> Result<f64> {
        Ok(self.get(index)?.variance())
    }

    pub fn set_variance(&mut self, index: usize, variance: f64) -> Result<()> {
        self.get_mut(index)?.set_variance(variance);
        Ok(())
    }

    pub fn get_infit(&self, index: usize) -> Result<bool> {
        Ok(self.get(index)?.infit())
    }

    pub fn set_infit(&mut self, index: usize, infit: bool) -> Result<()> {
        self.get_mut(index)?.set_infit(infit);
        Ok(())
    }

    pub fn get_param_name(&self, index: usize) -> Result<&str> {
        Ok(self.get(index)?.name.as_str())
    }

    pub fn set_param_name(&mut self, index: usize, name: &str) -> Result<()> {
        self.get_mut(index)?.name = name.to_string();
        Ok(())
    }

    pub fn get_estimate(&self, index: usize) -> Result<Estimate> {
        Ok(self.get(index)?.estimate())
    }

    /// Set value and variance; returns `true` when the value changed.
    pub fn set_estimate(&mut self, index: usize, estimate: Estimate) -> Result<bool> {
        let param = self.get_mut(index)?;
        param.set_variance(estimate.variance);
        Ok(param.set_value(estimate.value))
    }

    pub fn set_cyclic(&mut self, index: usize, cyclic: Option<CyclicBounds>) -> Result<()> {
        self.get_mut(index)?.set_cyclic(cyclic);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }
}
