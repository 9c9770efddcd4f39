//! Grid geometry and flat-buffer layout
//!
//! Field components arrive as flat buffers. `MemoryOrder` says how a flat
//! index maps onto (i, j, k) on an (Nx, Ny, Nz) grid.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array3, ShapeBuilder};
use serde::Serialize;

use crate::error::{DecompError, Result};

/// Number of samples along each axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridShape {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl GridShape {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    /// Cubic grid with `n` samples per axis
    pub fn cubic(n: usize) -> Self {
        Self::new(n, n, n)
    }

    /// Total number of samples. Only meaningful for a shape that passed [`validate`](Self::validate).
    pub fn len(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Total number of samples, `None` if it does not fit in `usize`
    pub fn checked_len(&self) -> Option<usize> {
        self.nx.checked_mul(self.ny)?.checked_mul(self.nz)
    }

    /// True when any axis has no samples
    pub fn is_empty(&self) -> bool {
        self.nx == 0 || self.ny == 0 || self.nz == 0
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() || self.checked_len().is_none() {
            return Err(DecompError::InvalidGridShape {
                nx: self.nx,
                ny: self.ny,
                nz: self.nz,
            });
        }
        Ok(())
    }

    /// Check that a flat buffer holds exactly one sample per grid point
    pub fn check_len(&self, found: usize) -> Result<()> {
        self.validate()?;
        if found != self.len() {
            return Err(DecompError::ShapeMismatch {
                expected: self.len(),
                found,
            });
        }
        Ok(())
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.nx, self.ny, self.nz)
    }
}

/// Physical box lengths (Lx, Ly, Lz)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DomainExtent {
    pub lx: f64,
    pub ly: f64,
    pub lz: f64,
}

impl DomainExtent {
    pub fn new(lx: f64, ly: f64, lz: f64) -> Self {
        Self { lx, ly, lz }
    }

    pub fn validate(&self) -> Result<()> {
        for (axis, len) in [("x", self.lx), ("y", self.ly), ("z", self.lz)] {
            if !len.is_finite() || len <= 0.0 {
                return Err(DecompError::config(format!(
                    "box length along {} must be a positive finite number, got {}",
                    axis, len
                )));
            }
        }
        Ok(())
    }

    /// Cell spacing (Lx/Nx, Ly/Ny, Lz/Nz)
    pub fn cell_size(&self, shape: &GridShape) -> [f64; 3] {
        [
            self.lx / shape.nx as f64,
            self.ly / shape.ny as f64,
            self.lz / shape.nz as f64,
        ]
    }

    /// True when all three cell spacings agree within a relative tolerance
    pub fn is_isotropic(&self, shape: &GridShape) -> bool {
        let [dx, dy, dz] = self.cell_size(shape);
        let scale = dx.abs().max(dy.abs()).max(dz.abs());
        let spread = (dx - dy).abs().max((dy - dz).abs()).max((dx - dz).abs());
        spread <= 1e-12 * scale
    }
}

/// Flat-buffer element ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MemoryOrder {
    /// Row-major: last index varies fastest
    #[default]
    C,
    /// Column-major: first index varies fastest
    F,
}

impl MemoryOrder {
    /// Flat offset of sample (i, j, k)
    pub fn flat_index(&self, shape: &GridShape, i: usize, j: usize, k: usize) -> usize {
        match self {
            MemoryOrder::C => k + shape.nz * (j + shape.ny * i),
            MemoryOrder::F => i + shape.nx * (j + shape.ny * k),
        }
    }

    /// Interpret a flat buffer as an (Nx, Ny, Nz) array
    pub fn reshape(&self, shape: &GridShape, data: Vec<f64>) -> Result<Array3<f64>> {
        shape.check_len(data.len())?;
        let found = data.len();
        let dims = shape.dims();
        let array = match self {
            MemoryOrder::C => Array3::from_shape_vec(dims, data),
            MemoryOrder::F => Array3::from_shape_vec(dims.f(), data),
        };
        array.map_err(|_| DecompError::ShapeMismatch {
            expected: shape.len(),
            found,
        })
    }

    /// Write an array back out as a flat buffer in this ordering
    pub fn flatten(&self, array: &Array3<f64>) -> Vec<f64> {
        match self {
            MemoryOrder::C => array.iter().copied().collect(),
            // Iterating the transposed view in logical order makes axis 0 fastest
            MemoryOrder::F => array.t().iter().copied().collect(),
        }
    }
}

impl FromStr for MemoryOrder {
    type Err = DecompError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" | "ROW-MAJOR" | "ROW_MAJOR" => Ok(MemoryOrder::C),
            "F" | "FORTRAN" | "COLUMN-MAJOR" | "COLUMN_MAJOR" => Ok(MemoryOrder::F),
            _ => Err(DecompError::config(format!(
                "unknown array order '{}'. Use: C or F",
                s
            ))),
        }
    }
}

impl fmt::Display for MemoryOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryOrder::C => write!(f, "C"),
            MemoryOrder::F => write!(f, "F"),
        }
    }
}

/// The three Cartesian components of a sampled vector field, as flat buffers
#[derive(Debug, Clone, PartialEq)]
pub struct VectorField {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl VectorField {
    pub fn new(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Self {
        Self { x, y, z }
    }

    pub fn components(&self) -> [&[f64]; 3] {
        [&self.x, &self.y, &self.z]
    }

    /// Build a field by sampling `f(i, j, k)` at every grid point
    pub fn from_fn<F>(shape: &GridShape, order: MemoryOrder, mut f: F) -> Self
    where
        F: FnMut(usize, usize, usize) -> [f64; 3],
    {
        let n = shape.len();
        let mut x = vec![0.0; n];
        let mut y = vec![0.0; n];
        let mut z = vec![0.0; n];
        for i in 0..shape.nx {
            for j in 0..shape.ny {
                for k in 0..shape.nz {
                    let idx = order.flat_index(shape, i, j, k);
                    let v = f(i, j, k);
                    x[idx] = v[0];
                    y[idx] = v[1];
                    z[idx] = v[2];
                }
            }
        }
        Self { x, y, z }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_flat_index_orders() {
        let shape = GridShape::new(2, 3, 4);
        assert_eq!(MemoryOrder::C.flat_index(&shape, 0, 0, 1), 1);
        assert_eq!(MemoryOrder::C.flat_index(&shape, 1, 0, 0), 12);
        assert_eq!(MemoryOrder::F.flat_index(&shape, 1, 0, 0), 1);
        assert_eq!(MemoryOrder::F.flat_index(&shape, 0, 0, 1), 6);
    }

    #[test]
    fn test_reshape_matches_flat_index() {
        let shape = GridShape::new(2, 3, 4);
        let data: Vec<f64> = (0..shape.len()).map(|v| v as f64).collect();
        for order in [MemoryOrder::C, MemoryOrder::F] {
            let array = order.reshape(&shape, data.clone()).unwrap();
            for i in 0..2 {
                for j in 0..3 {
                    for k in 0..4 {
                        let expected = order.flat_index(&shape, i, j, k) as f64;
                        assert_eq!(array[[i, j, k]], expected, "order {} at ({}, {}, {})", order, i, j, k);
                    }
                }
            }
        }
    }

    #[test]
    fn test_reshape_rejects_wrong_length() {
        let shape = GridShape::cubic(2);
        let err = MemoryOrder::C.reshape(&shape, vec![0.0; 7]).unwrap_err();
        assert!(matches!(err, DecompError::ShapeMismatch { expected: 8, found: 7 }));
    }

    #[test]
    fn test_validate_rejects_zero_dimension() {
        let err = GridShape::new(4, 0, 4).validate().unwrap_err();
        assert!(matches!(err, DecompError::InvalidGridShape { ny: 0, .. }));
    }

    #[test]
    fn test_validate_rejects_overflowing_sample_count() {
        let shape = GridShape::new(usize::MAX / 2, 3, 1);
        assert_eq!(shape.checked_len(), None);
        let err = shape.validate().unwrap_err();
        assert!(matches!(err, DecompError::InvalidGridShape { ny: 3, nz: 1, .. }));
        // check_len must report the bad grid rather than multiply it out
        assert!(matches!(shape.check_len(64), Err(DecompError::InvalidGridShape { .. })));
    }

    #[test]
    fn test_order_parsing() {
        assert_eq!("c".parse::<MemoryOrder>().unwrap(), MemoryOrder::C);
        assert_eq!("F".parse::<MemoryOrder>().unwrap(), MemoryOrder::F);
        assert!(matches!("Z".parse::<MemoryOrder>(), Err(DecompError::Configuration(_))));
    }

    #[test]
    fn test_cell_size_and_isotropy() {
        let shape = GridShape::new(4, 8, 4);
        let cubic = DomainExtent::new(2.0, 4.0, 2.0);
        assert_eq!(cubic.cell_size(&shape), [0.5, 0.5, 0.5]);
        assert!(cubic.is_isotropic(&shape));
        assert!(!DomainExtent::new(2.0, 2.0, 2.0).is_isotropic(&shape));
        assert!(DomainExtent::new(-1.0, 2.0, 2.0).validate().is_err());
    }

    proptest! {
        #[test]
        fn flatten_inverts_reshape(
            nx in 1usize..5, ny in 1usize..5, nz in 1usize..5,
            fortran in any::<bool>(),
            seed in any::<u32>(),
        ) {
            let shape = GridShape::new(nx, ny, nz);
            let order = if fortran { MemoryOrder::F } else { MemoryOrder::C };
            let data: Vec<f64> = (0..shape.len())
                .map(|i| ((i as u64 * 2654435761 + seed as u64) % 1000) as f64 - 500.0)
                .collect();
            let array = order.reshape(&shape, data.clone()).unwrap();
            prop_assert_eq!(order.flatten(&array), data);
        }
    }
}
