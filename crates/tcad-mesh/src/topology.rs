//! Node/edge/element connectivity for one region.
//!
//! Edges are stored once, oriented from the lower to the higher node
//! index. Each triangle and tetrahedron keeps the global index of each of
//! its local edges, which defines the flat element-edge numbering:
//! local edge `j` of triangle `t` is element-edge `3 * t + j`, and local
//! edge `j` of tetrahedron `t` is element-edge `6 * t + j`.

use indexmap::IndexSet;
use smallvec::SmallVec;
use tcad_core::DomainKind;

use crate::error::MeshError;

/// Local node pairs of a triangle's edges. Local edge `j` is opposite corner `j`.
pub const TRIANGLE_EDGES: [(usize, usize); 3] = [(1, 2), (0, 2), (0, 1)];

/// Local node pairs of a tetrahedron's edges.
pub const TETRAHEDRON_EDGES: [(usize, usize); 6] =
    [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// An edge between two nodes, `nodes[0] < nodes[1]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    /// Endpoint nodes `[n0, n1]`.
    pub nodes: [usize; 2],
}

/// A triangle and the global indices of its three local edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Triangle {
    /// Corner nodes.
    pub nodes: [usize; 3],
    /// Global edge index of each local edge.
    pub edges: [usize; 3],
}

/// A tetrahedron and the global indices of its six local edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tetrahedron {
    /// Corner nodes.
    pub nodes: [usize; 4],
    /// Global edge index of each local edge.
    pub edges: [usize; 6],
}

/// One local edge of one element.
///
/// `corners[0]` and `corners[1]` are the global edge's `n0` and `n1`
/// (the `@en0`/`@en1` corners); the remaining corners of the element
/// follow in local order (`@en2`, and `@en3` for tetrahedra).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementEdge {
    /// Element index.
    pub element: usize,
    /// Global edge index.
    pub edge: usize,
    /// Corner nodes in `@enN` order.
    pub corners: SmallVec<[usize; 4]>,
}

/// Geometry of one region.
#[derive(Clone, Debug)]
pub struct Topology {
    dimension: usize,
    coordinates: Vec<[f64; 3]>,
    edges: Vec<Edge>,
    triangles: Vec<Triangle>,
    tetrahedra: Vec<Tetrahedron>,
    node_edges: Vec<SmallVec<[usize; 8]>>,
}

impl Topology {
    /// A 1-D chain of nodes at `xs`, with an edge between neighbours.
    pub fn line(xs: &[f64]) -> Result<Self, MeshError> {
        if xs.len() < 2 {
            return Err(MeshError::TooFewNodes {
                count: xs.len(),
                min: 2,
            });
        }
        let coordinates = xs.iter().map(|&x| [x, 0.0, 0.0]).collect();
        let mut builder = EdgeBuilder::default();
        for i in 0..xs.len() - 1 {
            builder.edge(i, i + 1);
        }
        Ok(Self::assemble(1, coordinates, builder, Vec::new(), Vec::new()))
    }

    /// A 2-D triangulation.
    pub fn triangles(coordinates: Vec<[f64; 3]>, elements: &[[usize; 3]]) -> Result<Self, MeshError> {
        if coordinates.len() < 3 {
            return Err(MeshError::TooFewNodes {
                count: coordinates.len(),
                min: 3,
            });
        }
        let mut builder = EdgeBuilder::default();
        let mut triangles = Vec::with_capacity(elements.len());
        for (t, nodes) in elements.iter().enumerate() {
            check_element(t, nodes, coordinates.len())?;
            let mut edges = [0; 3];
            for (j, &(a, b)) in TRIANGLE_EDGES.iter().enumerate() {
                edges[j] = builder.edge(nodes[a], nodes[b]);
            }
            triangles.push(Triangle {
                nodes: *nodes,
                edges,
            });
        }
        Ok(Self::assemble(2, coordinates, builder, triangles, Vec::new()))
    }

    /// A 3-D tetrahedralization.
    pub fn tetrahedra(coordinates: Vec<[f64; 3]>, elements: &[[usize; 4]]) -> Result<Self, MeshError> {
        if coordinates.len() < 4 {
            return Err(MeshError::TooFewNodes {
                count: coordinates.len(),
                min: 4,
            });
        }
        let mut builder = EdgeBuilder::default();
        let mut tetrahedra = Vec::with_capacity(elements.len());
        for (t, nodes) in elements.iter().enumerate() {
            check_element(t, nodes, coordinates.len())?;
            let mut edges = [0; 6];
            for (j, &(a, b)) in TETRAHEDRON_EDGES.iter().enumerate() {
                edges[j] = builder.edge(nodes[a], nodes[b]);
            }
            tetrahedra.push(Tetrahedron {
                nodes: *nodes,
                edges,
            });
        }
        Ok(Self::assemble(3, coordinates, builder, Vec::new(), tetrahedra))
    }

    fn assemble(
        dimension: usize,
        coordinates: Vec<[f64; 3]>,
        builder: EdgeBuilder,
        triangles: Vec<Triangle>,
        tetrahedra: Vec<Tetrahedron>,
    ) -> Self {
        let edges: Vec<Edge> = builder
            .index
            .iter()
            .map(|&(a, b)| Edge { nodes: [a, b] })
            .collect();
        let mut node_edges = vec![SmallVec::new(); coordinates.len()];
        for (i, e) in edges.iter().enumerate() {
            node_edges[e.nodes[0]].push(i);
            node_edges[e.nodes[1]].push(i);
        }
        Self {
            dimension,
            coordinates,
            edges,
            triangles,
            tetrahedra,
            node_edges,
        }
    }

    /// Spatial dimension (1, 2 or 3).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.coordinates.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Number of tetrahedra.
    pub fn tetrahedron_count(&self) -> usize {
        self.tetrahedra.len()
    }

    /// Element count of a domain.
    pub fn domain_len(&self, kind: DomainKind) -> usize {
        match kind {
            DomainKind::Node => self.node_count(),
            DomainKind::Edge => self.edge_count(),
            DomainKind::TriangleEdge => 3 * self.triangle_count(),
            DomainKind::TetrahedronEdge => 6 * self.tetrahedron_count(),
        }
    }

    /// The element-edge domain of this region's volume elements, if any.
    pub fn element_edge_kind(&self) -> Option<DomainKind> {
        match self.dimension {
            2 => Some(DomainKind::TriangleEdge),
            3 => Some(DomainKind::TetrahedronEdge),
            _ => None,
        }
    }

    /// Initial node coordinates.
    pub fn coordinates(&self) -> &[[f64; 3]] {
        &self.coordinates
    }

    /// All edges.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// All triangles.
    pub fn triangles_list(&self) -> &[Triangle] {
        &self.triangles
    }

    /// All tetrahedra.
    pub fn tetrahedra_list(&self) -> &[Tetrahedron] {
        &self.tetrahedra
    }

    /// Edges touching `node`.
    pub fn node_edges(&self, node: usize) -> &[usize] {
        self.node_edges.get(node).map_or(&[][..], |v| v.as_slice())
    }

    /// Which end (0 or 1) of `edge` is `node`.
    pub fn edge_end(&self, edge: usize, node: usize) -> Option<usize> {
        let e = self.edges.get(edge)?;
        e.nodes.iter().position(|&n| n == node)
    }

    /// The flat element-edge `index` of domain `kind`.
    pub fn element_edge(&self, kind: DomainKind, index: usize) -> Option<ElementEdge> {
        match kind {
            DomainKind::TriangleEdge => {
                let (t, j) = (index / 3, index % 3);
                let tri = self.triangles.get(t)?;
                Some(self.local_edge(t, tri.edges[j], &tri.nodes))
            }
            DomainKind::TetrahedronEdge => {
                let (t, j) = (index / 6, index % 6);
                let tet = self.tetrahedra.get(t)?;
                Some(self.local_edge(t, tet.edges[j], &tet.nodes))
            }
            DomainKind::Node | DomainKind::Edge => None,
        }
    }

    fn local_edge(&self, element: usize, edge: usize, nodes: &[usize]) -> ElementEdge {
        let [n0, n1] = self.edges[edge].nodes;
        let mut corners: SmallVec<[usize; 4]> = SmallVec::new();
        corners.push(n0);
        corners.push(n1);
        corners.extend(nodes.iter().copied().filter(|&n| n != n0 && n != n1));
        ElementEdge {
            element,
            edge,
            corners,
        }
    }

    /// Global edge index of every element-edge of `kind`, in flat order.
    ///
    /// Empty for node and edge domains.
    pub fn element_edge_map(&self, kind: DomainKind) -> Vec<usize> {
        match kind {
            DomainKind::TriangleEdge => self.triangles.iter().flat_map(|t| t.edges).collect(),
            DomainKind::TetrahedronEdge => self.tetrahedra.iter().flat_map(|t| t.edges).collect(),
            DomainKind::Node | DomainKind::Edge => Vec::new(),
        }
    }
}

fn check_element(element: usize, nodes: &[usize], node_count: usize) -> Result<(), MeshError> {
    for (i, &n) in nodes.iter().enumerate() {
        if n >= node_count {
            return Err(MeshError::NodeOutOfRange {
                element,
                node: n,
                node_count,
            });
        }
        if nodes[..i].contains(&n) {
            return Err(MeshError::DegenerateElement { element });
        }
    }
    Ok(())
}

#[derive(Default)]
struct EdgeBuilder {
    index: IndexSet<(usize, usize)>,
}

impl EdgeBuilder {
    fn edge(&mut self, a: usize, b: usize) -> usize {
        let key = if a < b { (a, b) } else { (b, a) };
        self.index.insert_full(key).0
    }
}
