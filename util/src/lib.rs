//! Test fixtures: small structured finite element problems given as plain element data.
use nalgebra::{DMatrix, Matrix2, Vector2};
use std::collections::BTreeMap;

/// Element-by-element description of a symmetric positive definite system on a triangle mesh.
///
/// Vertex DOFs are interface DOFs. Edge DOFs (shared by the up to two triangles of an edge)
/// and element-private interior DOFs are not.
#[derive(Debug, Clone)]
pub struct TriangleProblem {
    pub vertices: Vec<[f64; 2]>,
    pub triangles: Vec<[usize; 3]>,
    pub num_dofs: usize,
    pub element_dofs: Vec<Vec<Option<usize>>>,
    pub interface: Vec<bool>,
    pub element_matrices: Vec<DMatrix<f64>>,
}

/// Vertices and triangles of the unit square divided into `nx * ny` cells.
///
/// Every cell is split along its diagonal into two triangles.
pub fn unit_square_triangles(nx: usize, ny: usize) -> (Vec<[f64; 2]>, Vec<[usize; 3]>) {
    assert!(nx > 0 && ny > 0);
    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            vertices.push([i as f64 / nx as f64, j as f64 / ny as f64]);
        }
    }

    let v = |i: usize, j: usize| j * (nx + 1) + i;
    let mut triangles = Vec::with_capacity(2 * nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            triangles.push([v(i, j), v(i + 1, j), v(i + 1, j + 1)]);
            triangles.push([v(i, j), v(i + 1, j + 1), v(i, j + 1)]);
        }
    }
    (vertices, triangles)
}

/// Linear Lagrange stiffness matrix of a triangle together with its area.
pub fn p1_stiffness(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> (DMatrix<f64>, f64) {
    let jacobian = Matrix2::new(b[0] - a[0], c[0] - a[0], b[1] - a[1], c[1] - a[1]);
    let area = 0.5 * jacobian.determinant().abs();
    let p = [a, b, c];
    let gradient_dirs: Vec<Vector2<f64>> = (0..3)
        .map(|i| {
            let pj = p[(i + 1) % 3];
            let pk = p[(i + 2) % 3];
            Vector2::new(pj[1] - pk[1], pk[0] - pj[0])
        })
        .collect();
    let stiffness = DMatrix::from_fn(3, 3, |i, j| gradient_dirs[i].dot(&gradient_dirs[j]) / (4.0 * area));
    (stiffness, area)
}

/// A positive definite element matrix of dimension `n` with the P1 stiffness in the top left
/// corner: `blockdiag(K, 0) + area * (I + w w^T)` with `w_i = 1 / (i + 1)`.
pub fn element_matrix(stiffness: &DMatrix<f64>, area: f64, n: usize) -> DMatrix<f64> {
    let w = DMatrix::from_fn(n, 1, |i, _| 1.0 / (i as f64 + 1.0));
    let mut matrix = (DMatrix::identity(n, n) + &w * w.transpose()) * area;
    let k = stiffness.nrows().min(n);
    let mut top_left = matrix.view_mut((0, 0), (k, k));
    top_left += stiffness.view((0, 0), (k, k));
    matrix
}

/// A problem on the unit square with `nx * ny` cells.
///
/// Every triangle has DOFs `[v0, v1, v2]`, followed by one DOF for each of the edges
/// `(v0, v1), (v1, v2), (v2, v0)` if `edge_dofs` is set, followed by
/// `interior_dofs_per_element` private DOFs.
pub fn unit_square_problem(nx: usize, ny: usize, edge_dofs: bool, interior_dofs_per_element: usize) -> TriangleProblem {
    let (vertices, triangles) = unit_square_triangles(nx, ny);
    let num_vertices = vertices.len();

    let mut edge_index = BTreeMap::new();
    if edge_dofs {
        for triangle in &triangles {
            for k in 0..3 {
                let (a, b) = (triangle[k], triangle[(k + 1) % 3]);
                let key = (a.min(b), a.max(b));
                let next = num_vertices + edge_index.len();
                edge_index.entry(key).or_insert(next);
            }
        }
    }
    let num_edge_dofs = edge_index.len();

    let mut num_dofs = num_vertices + num_edge_dofs;
    let mut element_dofs = Vec::with_capacity(triangles.len());
    let mut element_matrices = Vec::with_capacity(triangles.len());
    for triangle in &triangles {
        let mut dofs: Vec<Option<usize>> = triangle.iter().copied().map(Some).collect();
        if edge_dofs {
            for k in 0..3 {
                let (a, b) = (triangle[k], triangle[(k + 1) % 3]);
                dofs.push(Some(edge_index[&(a.min(b), a.max(b))]));
            }
        }
        for _ in 0..interior_dofs_per_element {
            dofs.push(Some(num_dofs));
            num_dofs += 1;
        }

        let [a, b, c] = triangle.map(|v| vertices[v]);
        let (stiffness, area) = p1_stiffness(a, b, c);
        element_matrices.push(element_matrix(&stiffness, area, dofs.len()));
        element_dofs.push(dofs);
    }

    let interface = (0..num_dofs).map(|dof| dof < num_vertices).collect();
    TriangleProblem {
        vertices,
        triangles,
        num_dofs,
        element_dofs,
        interface,
        element_matrices,
    }
}

impl TriangleProblem {
    /// The assembled global matrix.
    pub fn dense_matrix(&self) -> DMatrix<f64> {
        let mut global = DMatrix::zeros(self.num_dofs, self.num_dofs);
        for (dofs, matrix) in self.element_dofs.iter().zip(&self.element_matrices) {
            for (i, row) in dofs.iter().enumerate() {
                for (j, col) in dofs.iter().enumerate() {
                    if let (Some(row), Some(col)) = (row, col) {
                        global[(*row, *col)] += matrix[(i, j)];
                    }
                }
            }
        }
        global
    }

    pub fn num_interface_dofs(&self) -> usize {
        self.interface.iter().filter(|&&is_interface| is_interface).count()
    }
}

/// A symmetric positive definite `n x n` matrix `B B^T + n I`, with `B` filled column by
/// column from `values` (repeated as needed).
pub fn spd_matrix(n: usize, values: &[f64]) -> DMatrix<f64> {
    assert!(!values.is_empty() || n == 0);
    let b = DMatrix::from_iterator(n, n, values.iter().copied().cycle().take(n * n));
    &b * b.transpose() + DMatrix::identity(n, n) * n as f64
}
