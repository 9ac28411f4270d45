//! Domain kinds and the naming conventions for derived models.
//!
//! Models are addressed by name. Derivative and projection models follow
//! a fixed suffix grammar that the expression evaluator and the assembly
//! layer both rely on:
//!
//! - `<model>:<variable>` is the derivative of `model` with respect to `variable`
//! - `@n0` / `@n1` select an edge endpoint
//! - `@en0` .. `@en3` select an element-edge corner
//! - `@r0` / `@r1` select the side of an interface

use std::fmt;

/// The geometric entity kind a model is defined on.
///
/// The set is closed: every per-domain operation in the workspace is a
/// `match` over these four variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DomainKind {
    /// One value per node.
    Node,
    /// One value per edge.
    Edge,
    /// One value per local edge of each triangle (3 per triangle).
    TriangleEdge,
    /// One value per local edge of each tetrahedron (6 per tetrahedron).
    TetrahedronEdge,
}

impl DomainKind {
    /// All kinds, in the order names are resolved when the kind is unknown.
    pub const LOOKUP_ORDER: [DomainKind; 4] = [
        DomainKind::Node,
        DomainKind::Edge,
        DomainKind::TriangleEdge,
        DomainKind::TetrahedronEdge,
    ];

    /// Dense index for per-kind tables.
    pub fn index(self) -> usize {
        match self {
            Self::Node => 0,
            Self::Edge => 1,
            Self::TriangleEdge => 2,
            Self::TetrahedronEdge => 3,
        }
    }

    /// Lower-case name used in commands and messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Edge => "edge",
            Self::TriangleEdge => "triangle_edge",
            Self::TetrahedronEdge => "tetrahedron_edge",
        }
    }

    /// Whether this is a per-element edge domain.
    pub fn is_element_edge(self) -> bool {
        matches!(self, Self::TriangleEdge | Self::TetrahedronEdge)
    }

    /// Local edges per element for element-edge domains.
    pub fn edges_per_element(self) -> Option<usize> {
        match self {
            Self::TriangleEdge => Some(3),
            Self::TetrahedronEdge => Some(6),
            Self::Node | Self::Edge => None,
        }
    }

    /// Corners addressable with `@enN` for element-edge domains.
    pub fn corners_per_element_edge(self) -> usize {
        match self {
            Self::TriangleEdge => 3,
            Self::TetrahedronEdge => 4,
            Self::Edge => 2,
            Self::Node => 1,
        }
    }

    /// Whether data of kind `self` may be widened into `target`.
    ///
    /// Only edge data widens, and only into an element-edge domain.
    pub fn widens_to(self, target: DomainKind) -> bool {
        self == target || (self == Self::Edge && target.is_element_edge())
    }
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a model is presented by external visualization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DisplayType {
    /// Not exported.
    NoDisplay,
    /// Exported as a scalar field.
    #[default]
    Scalar,
    /// Exported as a vector component.
    Vector,
}

impl DisplayType {
    /// Keyword used in serialized commands.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoDisplay => "nodisplay",
            Self::Scalar => "scalar",
            Self::Vector => "vector",
        }
    }
}

impl fmt::Display for DisplayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the derivative of `model` with respect to `variable`.
pub fn derivative_name(model: &str, variable: &str) -> String {
    format!("{model}:{variable}")
}

/// A trailing selector on a model name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NameSuffix {
    /// `@n0` or `@n1`.
    EdgeEnd(usize),
    /// `@en0` .. `@en3`.
    ElementCorner(usize),
    /// `@r0` or `@r1`.
    InterfaceSide(usize),
}

impl NameSuffix {
    /// Append this suffix to `base`.
    pub fn apply(self, base: &str) -> String {
        format!("{base}{self}")
    }

    /// Split a trailing suffix off `name`, returning the base and suffix.
    ///
    /// Returns `None` when the name carries no recognised suffix or the
    /// base would be empty.
    pub fn split(name: &str) -> Option<(&str, NameSuffix)> {
        let at = name.rfind('@')?;
        let (base, tail) = (&name[..at], &name[at + 1..]);
        if base.is_empty() {
            return None;
        }
        let suffix = if let Some(d) = tail.strip_prefix("en") {
            match d {
                "0" | "1" | "2" | "3" => NameSuffix::ElementCorner(digit(d)),
                _ => return None,
            }
        } else if let Some(d) = tail.strip_prefix('n') {
            match d {
                "0" | "1" => NameSuffix::EdgeEnd(digit(d)),
                _ => return None,
            }
        } else if let Some(d) = tail.strip_prefix('r') {
            match d {
                "0" | "1" => NameSuffix::InterfaceSide(digit(d)),
                _ => return None,
            }
        } else {
            return None;
        };
        Some((base, suffix))
    }
}

fn digit(d: &str) -> usize {
    usize::from(d.as_bytes()[0] - b'0')
}

impl fmt::Display for NameSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EdgeEnd(i) => write!(f, "@n{i}"),
            Self::ElementCorner(i) => write!(f, "@en{i}"),
            Self::InterfaceSide(i) => write!(f, "@r{i}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivative_names_join_with_colon() {
        assert_eq!(derivative_name("Jn", "Potential"), "Jn:Potential");
    }

    #[test]
    fn split_recognises_every_suffix() {
        assert_eq!(
            NameSuffix::split("n@n1"),
            Some(("n", NameSuffix::EdgeEnd(1)))
        );
        assert_eq!(
            NameSuffix::split("Jn:Potential@en3"),
            Some(("Jn:Potential", NameSuffix::ElementCorner(3)))
        );
        assert_eq!(
            NameSuffix::split("phi@r0"),
            Some(("phi", NameSuffix::InterfaceSide(0)))
        );
    }

    #[test]
    fn split_rejects_malformed_suffixes() {
        assert_eq!(NameSuffix::split("n@n2"), None);
        assert_eq!(NameSuffix::split("n@en4"), None);
        assert_eq!(NameSuffix::split("@n0"), None);
        assert_eq!(NameSuffix::split("plain"), None);
        assert_eq!(NameSuffix::split("a@x0"), None);
    }

    #[test]
    fn suffix_display_round_trips_through_split() {
        for suffix in [
            NameSuffix::EdgeEnd(0),
            NameSuffix::ElementCorner(2),
            NameSuffix::InterfaceSide(1),
        ] {
            let name = suffix.apply("m");
            assert_eq!(NameSuffix::split(&name), Some(("m", suffix)));
        }
    }

    #[test]
    fn only_edge_widens_into_element_edges() {
        assert!(DomainKind::Edge.widens_to(DomainKind::TriangleEdge));
        assert!(DomainKind::Edge.widens_to(DomainKind::TetrahedronEdge));
        assert!(!DomainKind::TriangleEdge.widens_to(DomainKind::Edge));
        assert!(!DomainKind::Node.widens_to(DomainKind::Edge));
        assert!(!DomainKind::TriangleEdge.widens_to(DomainKind::TetrahedronEdge));
    }
}
