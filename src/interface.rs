//! Text access to named model attributes.
//!
//! A [`TextInterface`] is an explicit registry of accessors for one model
//! type. Commands of the form `name=value` or `name=value+/-error` set an
//! attribute; `get` formats its current estimate.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, multispace1},
    combinator::{all_consuming, map_res, opt, recognize},
    multi::many0,
    number::complete::double,
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};

use crate::error::{MealError, Result};
use crate::function::{Graph, NodeId};
use crate::models::{Britton2000, RotatingVectorModel, SingleAxis, VariableBackend};
use crate::parameters::Estimate;

type Getter<M> = Box<dyn Fn(&M, &mut Graph) -> Result<Estimate>>;
type Setter<M> = Box<dyn Fn(&M, &mut Graph, Estimate) -> Result<()>>;

struct Attribute<M> {
    name: String,
    description: String,
    get: Getter<M>,
    set: Option<Setter<M>>,
}

/// Named accessors for a model of type `M` whose parameters live in a [`Graph`].
pub struct TextInterface<M> {
    attributes: Vec<Attribute<M>>,
}

impl<M> Default for TextInterface<M> {
    fn default() -> Self {
        Self {
            attributes: Vec::new(),
        }
    }
}

impl<M> TextInterface<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a read-write attribute.
    pub fn add<G, S>(&mut self, name: &str, description: &str, get: G, set: S) -> &mut Self
    where
        G: Fn(&M, &mut Graph) -> Result<Estimate> + 'static,
        S: Fn(&M, &mut Graph, Estimate) -> Result<()> + 'static,
    {
        self.attributes.push(Attribute {
            name: name.to_string(),
            description: description.to_string(),
            get: Box::new(get),
            set: Some(Box::new(set)),
        });
        self
    }

    /// Register an attribute that can only be read.
    pub fn add_read_only<G>(&mut self, name: &str, description: &str, get: G) -> &mut Self
    where
        G: Fn(&M, &mut Graph) -> Result<Estimate> + 'static,
    {
        self.attributes.push(Attribute {
            name: name.to_string(),
            description: description.to_string(),
            get: Box::new(get),
            set: None,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    pub fn description(&self, name: &str) -> Result<&str> {
        Ok(self.find(name)?.description.as_str())
    }

    fn find(&self, name: &str) -> Result<&Attribute<M>> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| {
                MealError::invalid_param("TextInterface::find", format!("unknown attribute '{}'", name))
            })
    }

    pub fn get_estimate(&self, model: &M, graph: &mut Graph, name: &str) -> Result<Estimate> {
        (self.find(name)?.get)(model, graph).map_err(|e| e.context("TextInterface::get"))
    }

    /// The estimate of an attribute formatted as `value` or `value+/-error`.
    pub fn get(&self, model: &M, graph: &mut Graph, name: &str) -> Result<String> {
        Ok(self.get_estimate(model, graph, name)?.to_string())
    }

    /// Like [`get`](Self::get), but any failure reads `*error*`.
    pub fn fetch(&self, model: &M, graph: &mut Graph, name: &str) -> String {
        self.get(model, graph, name)
            .unwrap_or_else(|_| "*error*".to_string())
    }

    pub fn set_estimate(&self, model: &M, graph: &mut Graph, name: &str, value: Estimate) -> Result<()> {
        let attribute = self.find(name)?;
        let set = attribute.set.as_ref().ok_or_else(|| {
            MealError::invalid_param("TextInterface::set", format!("'{}' is read-only", name))
        })?;
        set(model, graph, value).map_err(|e| e.context("TextInterface::set"))
    }

    /// Parse `value` or `value+/-error` and set the attribute.
    pub fn set(&self, model: &M, graph: &mut Graph, name: &str, text: &str) -> Result<()> {
        let estimate = parse_estimate(text)?;
        self.set_estimate(model, graph, name, estimate)
    }

    /// Execute a `name=value` command.
    pub fn process(&self, model: &M, graph: &mut Graph, command: &str) -> Result<()> {
        let (name, estimate) = match all_consuming(assignment).parse(command) {
            Ok((_, parsed)) => parsed,
            Err(err) => {
                return Err(MealError::Parse(format!(
                    "TextInterface::process '{}': {}",
                    command, err
                )))
            }
        };
        self.set_estimate(model, graph, name, estimate)
    }

    /// One line per attribute: name, current estimate and description.
    pub fn help(&self, model: &M, graph: &mut Graph) -> String {
        let width = self.names().map(str::len).max().unwrap_or(0);
        let mut out = String::new();
        for attribute in &self.attributes {
            let value = self.fetch(model, graph, &attribute.name);
            out.push_str(&format!(
                "{:<width$} = {:<24} {}\n",
                attribute.name,
                value,
                attribute.description,
                width = width
            ));
        }
        out
    }
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

fn estimate(input: &str) -> IResult<&str, Estimate> {
    pair(double, opt(preceded(tag("+/-"), double)))
        .map(|(value, error)| Estimate::new(value, error.map_or(0.0, |e: f64| e * e)))
        .parse(input)
}

fn assignment(input: &str) -> IResult<&str, (&str, Estimate)> {
    (
        delimited(multispace0, identifier, multispace0),
        char('='),
        delimited(multispace0, estimate, multispace0),
    )
        .map(|(name, _, value)| (name, value))
        .parse(input)
}

/// `value` or `value+/-error`; the variance is the square of the error.
pub fn parse_estimate(text: &str) -> Result<Estimate> {
    match all_consuming(estimate).parse(text.trim()) {
        Ok((_, value)) => Ok(value),
        Err(err) => Err(MealError::Parse(format!("parse_estimate '{}': {}", text, err))),
    }
}

/// A line written by [`Graph::print_parameters`].
struct ParameterLine<'a> {
    index: usize,
    name: &'a str,
    estimate: Estimate,
    infit: bool,
}

fn parameter_line(input: &str) -> IResult<&str, ParameterLine<'_>> {
    (
        preceded(multispace0, map_res(digit1, |s: &str| s.parse::<usize>())),
        preceded(multispace1, take_till1(|c: char| c.is_whitespace())),
        preceded((multispace0, char('='), multispace0), estimate),
        opt(tag(" (fixed)")),
        multispace0,
    )
        .map(|(index, name, estimate, fixed, _)| ParameterLine {
            index,
            name,
            estimate,
            infit: fixed.is_none(),
        })
        .parse(input)
}

impl Graph {
    /// Read back the output of [`print_parameters`](Self::print_parameters).
    ///
    /// Every line must name the parameter at its index; estimates and fit
    /// flags are set in order.
    pub fn parse_parameters(&mut self, id: NodeId, text: &str) -> Result<()> {
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let parsed = match all_consuming(parameter_line).parse(line) {
                Ok((_, parsed)) => parsed,
                Err(err) => {
                    return Err(MealError::Parse(format!(
                        "Graph::parse_parameters '{}': {}",
                        line, err
                    )))
                }
            };
            if parsed.index >= self.nparam(id)? {
                return Err(MealError::invalid_range(
                    "Graph::parse_parameters",
                    format!("index={} >= nparam={}", parsed.index, self.nparam(id)?),
                ));
            }
            let name = self.get_param_name(id, parsed.index)?;
            if name != parsed.name {
                return Err(MealError::invalid_param(
                    "Graph::parse_parameters",
                    format!("parameter {} is '{}' not '{}'", parsed.index, name, parsed.name),
                ));
            }
            self.set_estimate(id, parsed.index, parsed.estimate)?;
            self.set_infit(id, parsed.index, parsed.infit)?;
        }
        Ok(())
    }
}

/// Gain, differential gain and differential phase.
pub fn single_axis() -> TextInterface<SingleAxis> {
    let mut interface: TextInterface<SingleAxis> = TextInterface::new();
    interface
        .add(
            "G",
            "absolute gain",
            |m: &SingleAxis, g| m.get_gain(g),
            |m, g, v| m.set_gain(g, v),
        )
        .add(
            "gamma",
            "differential gain (hyperbolic radians)",
            |m, g| m.get_diff_gain(g),
            |m, g, v| m.set_diff_gain(g, v),
        )
        .add(
            "phi",
            "differential phase (radians)",
            |m, g| m.get_diff_phase(g),
            |m, g, v| m.set_diff_phase(g, v),
        );
    interface
}

/// As [`single_axis`], reading through any installed variations.
pub fn variable_backend() -> TextInterface<VariableBackend> {
    let mut interface: TextInterface<VariableBackend> = TextInterface::new();
    interface
        .add(
            "G",
            "absolute gain",
            |m: &VariableBackend, g| m.get_gain(g),
            |m, g, v| m.set_gain(g, v),
        )
        .add(
            "gamma",
            "differential gain (hyperbolic radians)",
            |m, g| m.get_diff_gain(g),
            |m, g, v| m.set_diff_gain(g, v),
        )
        .add(
            "phi",
            "differential phase (radians)",
            |m, g| m.get_diff_phase(g),
            |m, g, v| m.set_diff_phase(g, v),
        );
    interface
}

/// Backend attributes plus the four feed angles.
pub fn britton2000() -> TextInterface<Britton2000> {
    let mut interface: TextInterface<Britton2000> = TextInterface::new();
    interface
        .add(
            "G",
            "absolute gain",
            |m: &Britton2000, g| m.get_backend().get_gain(g),
            |m, g, v| m.get_backend().set_gain(g, v),
        )
        .add(
            "gamma",
            "differential gain (hyperbolic radians)",
            |m, g| m.get_backend().get_diff_gain(g),
            |m, g, v| m.get_backend().set_diff_gain(g, v),
        )
        .add(
            "phi",
            "differential phase (radians)",
            |m, g| m.get_backend().get_diff_phase(g),
            |m, g, v| m.get_backend().set_diff_phase(g, v),
        )
        .add(
            "dtheta",
            "difference between receptor orientations (radians)",
            |m, g| m.get_delta_theta(g),
            |m, g, v| m.set_delta_theta(g, v),
        )
        .add(
            "stheta",
            "sum of receptor orientations (radians)",
            |m, g| m.get_sigma_theta(g),
            |m, g, v| m.set_sigma_theta(g, v),
        )
        .add(
            "dchi",
            "difference between receptor ellipticities (radians)",
            |m, g| m.get_delta_chi(g),
            |m, g, v| m.set_delta_chi(g, v),
        )
        .add(
            "schi",
            "sum of receptor ellipticities (radians)",
            |m, g| m.get_sigma_chi(g),
            |m, g, v| m.set_sigma_chi(g, v),
        );
    interface
}

/// The four geometric angles of the rotating vector model.
pub fn rotating_vector_model() -> TextInterface<RotatingVectorModel> {
    let mut interface: TextInterface<RotatingVectorModel> = TextInterface::new();
    interface
        .add(
            "psi0",
            "position angle at the magnetic meridian (radians)",
            |m: &RotatingVectorModel, g| m.get_reference_position_angle(g),
            |m, g, v| m.set_reference_position_angle(g, v),
        )
        .add(
            "zeta",
            "colatitude of the line of sight (radians)",
            |m, g| m.get_line_of_sight(g),
            |m, g, v| m.set_line_of_sight(g, v),
        )
        .add(
            "alpha",
            "colatitude of the magnetic axis (radians)",
            |m, g| m.get_magnetic_axis(g),
            |m, g, v| m.set_magnetic_axis(g, v),
        )
        .add(
            "phi0",
            "pulse phase of the magnetic meridian (radians)",
            |m, g| m.get_magnetic_meridian(g),
            |m, g, v| m.set_magnetic_meridian(g, v),
        )
        .add_read_only("PA", "position angle at the current phase (radians)", |m, g| {
            Ok(Estimate::exact(m.position_angle(g)?))
        });
    interface
}
