//! Describe-yourself commands for models and equations.
//!
//! Every model and equation can render the command that recreates it:
//!
//! ```text
//! COMMAND equation -device "d" -region "r" -name "PotentialEquation" ...
//! ```
//!
//! [`Command::options`] is the structured form, keyed identically.
//! Models are wrapped in `begin_<kind>_model "name"` .. `end_<kind>_model`
//! blocks; written models carry their values (`UNIFORM v` or `DATA`
//! followed by one value per line).

use std::fmt::{self, Write as _};

use indexmap::IndexMap;
use tcad_core::{DomainKind, Precision};
use tcad_model::{InterfaceModels, Model, ModelData, Region};

/// A command keyword with ordered `-option "value"` pairs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Command {
    name: String,
    options: IndexMap<String, String>,
}

impl Command {
    /// Start a command.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: IndexMap::new(),
        }
    }

    /// Append (or replace) an option.
    pub fn option(mut self, key: &str, value: impl Into<String>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    /// Append an optional model slot; unset slots render as `""`.
    pub fn slot(self, key: &str, value: Option<&str>) -> Self {
        self.option(key, value.unwrap_or_default())
    }

    /// Command keyword.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Options in order.
    pub fn options(&self) -> &IndexMap<String, String> {
        &self.options
    }

    /// One option's value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// The options map.
    pub fn into_options(self) -> IndexMap<String, String> {
        self.options
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "COMMAND {}", self.name)?;
        for (k, v) in &self.options {
            write!(f, " -{k} \"{v}\"")?;
        }
        Ok(())
    }
}

/// Wrap `body` in a `begin_<tag>` / `end_<tag>` block.
pub fn block(tag: &str, name: &str, body: &str) -> String {
    format!("begin_{tag} \"{name}\"\n{body}\nend_{tag}\n\n")
}

fn model_tag(kind: DomainKind) -> &'static str {
    match kind {
        DomainKind::Node => "node_model",
        DomainKind::Edge => "edge_model",
        DomainKind::TriangleEdge => "triangle_edge_model",
        DomainKind::TetrahedronEdge => "tetrahedron_edge_model",
    }
}

fn command_name(kind: DomainKind) -> &'static str {
    match kind {
        DomainKind::Node => "node_model",
        DomainKind::Edge => "edge_model",
        DomainKind::TriangleEdge | DomainKind::TetrahedronEdge => "element_model",
    }
}

fn data_body<T: Precision>(data: Option<&ModelData<T>>) -> String {
    match data {
        Some(d) => match d.uniform_value() {
            Some(v) => format!("UNIFORM {v}"),
            None => {
                let mut s = String::from("DATA");
                for v in d.values().iter() {
                    let _ = write!(s, "\n{v}");
                }
                s
            }
        },
        None => "DATA".to_string(),
    }
}

/// The command recreating a computed region model.
///
/// `None` for written models and for calculators without an expression.
pub fn model_command<T: Precision>(region: &Region<T>, model: &Model<T>) -> Option<Command> {
    let expression = model.expression()?;
    let command = match model.contact() {
        Some(contact) => Command::new(format!("contact_{}", command_name(model.kind())))
            .option("device", region.device())
            .option("contact", contact),
        None => Command::new(command_name(model.kind()))
            .option("device", region.device())
            .option("region", region.name()),
    };
    Some(
        command
            .option("display_type", model.display_type().as_str())
            .option("name", model.name())
            .option("equation", format!("{expression};")),
    )
}

/// Serialize one region model as a block, or `None` if it does not exist.
pub fn serialize_model<T: Precision>(region: &Region<T>, kind: DomainKind, name: &str) -> Option<String> {
    let model = region.models().get(kind, name)?;
    let body = match model_command(region, model) {
        Some(command) => command.to_string(),
        None if model.is_calculated() => "BUILTIN".to_string(),
        None => data_body(model.cached().map(|d| &**d)),
    };
    Some(block(model_tag(kind), name, &body))
}

/// Serialize every model of a region, kind by kind in declaration order.
pub fn serialize_region<T: Precision>(region: &Region<T>) -> String {
    let mut out = String::new();
    for kind in DomainKind::LOOKUP_ORDER {
        for name in region.models().names(kind) {
            if let Some(s) = serialize_model(region, kind, name) {
                out.push_str(&s);
            }
        }
    }
    out
}

/// Serialize one interface node model as a block.
pub fn serialize_interface_model<T: Precision>(
    device: &str,
    interface: &InterfaceModels<T>,
    name: &str,
) -> Option<String> {
    let model = interface.models().get(DomainKind::Node, name)?;
    let body = match model.expression() {
        Some(expression) => Command::new("interface_model")
            .option("device", device)
            .option("interface", interface.name())
            .option("name", name)
            .option("equation", format!("{expression};"))
            .to_string(),
        None => data_body(model.cached().map(|d| &**d)),
    };
    Some(block("interface_model", name, &body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tcad_mesh::Topology;

    #[test]
    fn renders_options_in_order() {
        let c = Command::new("equation")
            .option("device", "d")
            .slot("node_model", None)
            .slot("edge_model", Some("Flux"));
        assert_eq!(
            c.to_string(),
            "COMMAND equation -device \"d\" -node_model \"\" -edge_model \"Flux\""
        );
        assert_eq!(c.get("edge_model"), Some("Flux"));
        let keys: Vec<_> = c.into_options().into_keys().collect();
        assert_eq!(keys, ["device", "node_model", "edge_model"]);
    }

    #[test]
    fn data_models_carry_values() {
        let topo = Topology::line(&[0.0, 0.5]).unwrap();
        let mut r = Region::<f64>::new("d", "r", Arc::new(topo));
        r.set_uniform(DomainKind::Edge, "w", 2.5);
        assert_eq!(
            serialize_model(&r, DomainKind::Edge, "w").unwrap(),
            "begin_edge_model \"w\"\nUNIFORM 2.5\nend_edge_model\n\n"
        );
        assert_eq!(
            serialize_model(&r, DomainKind::Node, "x").unwrap(),
            "begin_node_model \"x\"\nDATA\n0\n0.5\nend_node_model\n\n"
        );
        assert!(serialize_model(&r, DomainKind::Node, "w").is_none());
    }
}
