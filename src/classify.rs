//! Canonical element classes from vertex numbering.
//!
//! A fixed sorting network is applied to the vertex numbers of an element. Bit `i` of the
//! class id is set if comparison `i` of the network swapped its operands. The id therefore
//! depends only on the relative order of the vertex numbers: two elements whose vertex
//! numbers are ordered the same way end up in the same class.
use serde::{Deserialize, Serialize};

/// Comparisons of the sorting network for tetrahedra.
const TETRAHEDRON_NETWORK: [(usize, usize); 5] = [(0, 1), (2, 3), (0, 2), (1, 3), (1, 2)];

/// Comparisons of the sorting network for triangles.
const TRIANGLE_NETWORK: [(usize, usize); 3] = [(0, 1), (1, 2), (0, 1)];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementClass {
    vertex_count: u8,
    id: u8,
}

impl ElementClass {
    pub fn vertex_count(&self) -> usize {
        self.vertex_count as usize
    }

    /// The swap pattern of the sorting network.
    pub fn id(&self) -> usize {
        self.id as usize
    }

    /// Upper bound on class ids for elements with the given number of vertices.
    ///
    /// Returns `None` for element types without a sorting network.
    pub fn num_classes(vertex_count: usize) -> Option<usize> {
        network(vertex_count).map(|network| 1 << network.len())
    }
}

fn network(vertex_count: usize) -> Option<&'static [(usize, usize)]> {
    match vertex_count {
        3 => Some(&TRIANGLE_NETWORK),
        4 => Some(&TETRAHEDRON_NETWORK),
        _ => None,
    }
}

/// Compute the class of an element from its vertex numbers.
///
/// Returns `None` unless the element has 3 (triangle) or 4 (tetrahedron) vertices.
pub fn element_class(vertices: &[usize]) -> Option<ElementClass> {
    let network = network(vertices.len())?;
    let mut order = [0, 1, 2, 3];
    let mut id = 0u8;
    for (bit, &(i, j)) in network.iter().enumerate() {
        if vertices[order[i]] > vertices[order[j]] {
            order.swap(i, j);
            id |= 1 << bit;
        }
    }
    Some(ElementClass {
        vertex_count: vertices.len() as u8,
        id,
    })
}

/// Local vertex indices of an element sorted by increasing vertex number.
///
/// This is the order produced by the sorting network, so it is consistent with
/// [`element_class`].
pub fn sorted_local_vertices(vertices: &[usize]) -> Option<Vec<usize>> {
    let network = network(vertices.len())?;
    let mut order: Vec<usize> = (0..vertices.len()).collect();
    for &(i, j) in network {
        if vertices[order[i]] > vertices[order[j]] {
            order.swap(i, j);
        }
    }
    Some(order)
}
