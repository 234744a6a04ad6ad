//! Calibration solutions stored per frequency channel.
//!
//! A [`PolnCalibratorExtension`] keeps, for each channel, the parameter
//! estimates of a fitted transformation (or nothing when the channel has no
//! valid solution). Records can be filled from a graph node, applied back to
//! one, and serialized with serde.

use serde::{Deserialize, Serialize};

use crate::error::{MealError, Result};
use crate::function::{Graph, NodeId};
use crate::parameters::Estimate;

/// Parameter estimates of one transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    names: Vec<String>,
    estimates: Vec<Estimate>,
    infit: Vec<bool>,
    /// Goodness of fit of the solution, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chisq: Option<f64>,
    #[serde(default)]
    nfree: usize,
}

impl Transformation {
    /// `nparam` free parameters named `p0`, `p1`, ...
    pub fn new(nparam: usize) -> Self {
        Self {
            names: (0..nparam).map(|i| format!("p{}", i)).collect(),
            estimates: vec![Estimate::default(); nparam],
            infit: vec![true; nparam],
            chisq: None,
            nfree: 0,
        }
    }

    /// Copy names, estimates and fit flags of every parameter of `id`.
    pub fn from_graph(graph: &Graph, id: NodeId) -> Result<Self> {
        let nparam = graph.nparam(id)?;
        let mut transformation = Self::new(nparam);
        for i in 0..nparam {
            transformation.names[i] = graph.get_param_name(id, i)?;
            transformation.estimates[i] = graph.get_estimate(id, i)?;
            transformation.infit[i] = graph.get_infit(id, i)?;
        }
        Ok(transformation)
    }

    /// Write the stored estimates and fit flags into `id`.
    pub fn apply_to(&self, graph: &mut Graph, id: NodeId) -> Result<()> {
        let nparam = graph.nparam(id)?;
        if nparam != self.nparam() {
            return Err(MealError::invalid_param(
                "Transformation::apply_to",
                format!("model nparam={} != stored nparam={}", nparam, self.nparam()),
            ));
        }
        for i in 0..nparam {
            graph.set_estimate(id, i, self.estimates[i])?;
            graph.set_infit(id, i, self.infit[i])?;
        }
        Ok(())
    }

    pub fn nparam(&self) -> usize {
        self.estimates.len()
    }

    fn check(&self, index: usize, location: &str) -> Result<()> {
        if index >= self.nparam() {
            return Err(MealError::invalid_range(
                location,
                format!("index={} >= nparam={}", index, self.nparam()),
            ));
        }
        Ok(())
    }

    pub fn get_param_name(&self, index: usize) -> Result<&str> {
        self.check(index, "Transformation::get_param_name")?;
        Ok(&self.names[index])
    }

    pub fn get_estimate(&self, index: usize) -> Result<Estimate> {
        self.check(index, "Transformation::get_estimate")?;
        Ok(self.estimates[index])
    }

    pub fn set_estimate(&mut self, index: usize, estimate: Estimate) -> Result<()> {
        self.check(index, "Transformation::set_estimate")?;
        self.estimates[index] = estimate;
        Ok(())
    }

    pub fn get_infit(&self, index: usize) -> Result<bool> {
        self.check(index, "Transformation::get_infit")?;
        Ok(self.infit[index])
    }

    pub fn set_infit(&mut self, index: usize, infit: bool) -> Result<()> {
        self.check(index, "Transformation::set_infit")?;
        self.infit[index] = infit;
        Ok(())
    }

    pub fn get_chisq(&self) -> Option<f64> {
        self.chisq
    }

    pub fn get_nfree(&self) -> usize {
        self.nfree
    }

    pub fn set_goodness(&mut self, chisq: f64, nfree: usize) {
        self.chisq = Some(chisq);
        self.nfree = nfree;
    }
}

/// Per-channel calibrator solutions of one model type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolnCalibratorExtension {
    /// Name of the model the transformations parameterize, e.g. `SingleAxis`.
    model: String,
    transformations: Vec<Option<Transformation>>,
}

impl PolnCalibratorExtension {
    pub fn new(model: &str, nchan: usize) -> Self {
        Self {
            model: model.to_string(),
            transformations: vec![None; nchan],
        }
    }

    pub fn get_model(&self) -> &str {
        &self.model
    }

    pub fn get_nchan(&self) -> usize {
        self.transformations.len()
    }

    /// New channels start without a solution.
    pub fn set_nchan(&mut self, nchan: usize) {
        self.transformations.resize(nchan, None);
    }

    fn check(&self, ichan: usize, location: &str) -> Result<()> {
        if ichan >= self.get_nchan() {
            return Err(MealError::invalid_range(
                location,
                format!("ichan={} >= nchan={}", ichan, self.get_nchan()),
            ));
        }
        Ok(())
    }

    pub fn get_valid(&self, ichan: usize) -> Result<bool> {
        self.check(ichan, "PolnCalibratorExtension::get_valid")?;
        Ok(self.transformations[ichan].is_some())
    }

    /// Marking a channel invalid discards its solution.
    pub fn set_valid(&mut self, ichan: usize, valid: bool) -> Result<()> {
        self.check(ichan, "PolnCalibratorExtension::set_valid")?;
        if !valid {
            self.transformations[ichan] = None;
        } else if self.transformations[ichan].is_none() {
            let nparam = self.get_nparam().unwrap_or(0);
            self.transformations[ichan] = Some(Transformation::new(nparam));
        }
        Ok(())
    }

    /// Parameter count of the first valid channel.
    pub fn get_nparam(&self) -> Option<usize> {
        self.transformations
            .iter()
            .flatten()
            .next()
            .map(Transformation::nparam)
    }

    pub fn get_transformation(&self, ichan: usize) -> Result<Option<&Transformation>> {
        self.check(ichan, "PolnCalibratorExtension::get_transformation")?;
        Ok(self.transformations[ichan].as_ref())
    }

    pub fn get_transformation_mut(&mut self, ichan: usize) -> Result<Option<&mut Transformation>> {
        self.check(ichan, "PolnCalibratorExtension::get_transformation_mut")?;
        Ok(self.transformations[ichan].as_mut())
    }

    pub fn set_transformation(&mut self, ichan: usize, transformation: Option<Transformation>) -> Result<()> {
        self.check(ichan, "PolnCalibratorExtension::set_transformation")?;
        self.transformations[ichan] = transformation;
        Ok(())
    }

    /// Store the current parameters of `id` as the solution of `ichan`.
    pub fn record(&mut self, ichan: usize, graph: &Graph, id: NodeId) -> Result<()> {
        let transformation = Transformation::from_graph(graph, id)?;
        self.set_transformation(ichan, Some(transformation))
    }

    /// Apply the solution of `ichan` to `id`; an invalid channel raises `InvalidState`.
    pub fn apply(&self, ichan: usize, graph: &mut Graph, id: NodeId) -> Result<()> {
        let transformation = self.get_transformation(ichan)?.ok_or_else(|| {
            MealError::invalid_state(
                "PolnCalibratorExtension::apply",
                format!("channel {} has no solution", ichan),
            )
        })?;
        transformation.apply_to(graph, id)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::SingleAxis;

    #[test]
    fn test_record_and_apply() {
        let mut graph = Graph::new();
        let source = SingleAxis::new(&mut graph).unwrap();
        source.set_gain(&mut graph, Estimate::new(2.0, 0.01)).unwrap();
        graph.set_infit(source.node(), 2, false).unwrap();

        let mut extension = PolnCalibratorExtension::new("SingleAxis", 4);
        extension.record(1, &graph, source.node()).unwrap();
        assert!(extension.get_valid(1).unwrap());
        assert!(!extension.get_valid(0).unwrap());
        assert_eq!(extension.get_nparam(), Some(3));

        let target = SingleAxis::new(&mut graph).unwrap();
        extension.apply(1, &mut graph, target.node()).unwrap();
        assert_eq!(target.get_gain(&graph).unwrap(), Estimate::new(2.0, 0.01));
        assert!(!graph.get_infit(target.node(), 2).unwrap());

        let err = extension.apply(0, &mut graph, target.node()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_parameter_count_mismatch() {
        let mut graph = Graph::new();
        let x = graph.scalar_value("x", 1.0).unwrap();
        let transformation = Transformation::new(3);
        let err = transformation.apply_to(&mut graph, x).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParam);
    }

    #[test]
    fn test_estimate_range() {
        let mut transformation = Transformation::new(2);
        transformation.set_estimate(1, Estimate::new(0.5, 0.1)).unwrap();
        assert_eq!(transformation.get_estimate(1).unwrap().value, 0.5);
        let err = transformation.set_estimate(2, Estimate::exact(0.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRange);
    }

    #[test]
    fn test_json_round_trip() {
        let mut extension = PolnCalibratorExtension::new("SingleAxis", 2);
        let mut transformation = Transformation::new(2);
        transformation.set_estimate(0, Estimate::new(1.5, 0.25)).unwrap();
        transformation.set_goodness(12.5, 10);
        extension.set_transformation(0, Some(transformation)).unwrap();

        let text = extension.to_json().unwrap();
        let restored = PolnCalibratorExtension::from_json(&text).unwrap();
        assert_eq!(restored, extension);
        assert!(restored.get_transformation(1).unwrap().is_none());

        let err = PolnCalibratorExtension::from_json("{").unwrap_err();
        assert!(matches!(err, MealError::Json(_)));
    }

    #[test]
    fn test_json_preserves_every_bit() {
        let mut transformation = Transformation::new(2);
        transformation
            .set_estimate(0, Estimate::new(4.5371413673958816e-18, 9.654713598105609e-6))
            .unwrap();
        transformation
            .set_estimate(1, Estimate::new(0.1 + 0.2, 1.0 / 3.0))
            .unwrap();
        let mut extension = PolnCalibratorExtension::new("SingleAxis", 1);
        extension.set_transformation(0, Some(transformation)).unwrap();

        let restored = PolnCalibratorExtension::from_json(&extension.to_json().unwrap()).unwrap();
        let stored = restored.get_transformation(0).unwrap().unwrap();
        let first = stored.get_estimate(0).unwrap();
        assert_eq!(first.value.to_bits(), 4.5371413673958816e-18f64.to_bits());
        assert_eq!(first.variance.to_bits(), 9.654713598105609e-6f64.to_bits());
        assert_eq!(stored.get_estimate(1).unwrap().value.to_bits(), (0.1f64 + 0.2).to_bits());
    }
}
