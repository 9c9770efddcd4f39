//! 3D FFT engine built on rustfft
//!
//! Transforms `Array3<Complex64>` in place, one axis at a time. Conventions
//! match NumPy's `fftn`/`ifftn`: the forward transform is unnormalised and
//! the inverse divides by Nx·Ny·Nz.

use std::sync::Arc;

use ndarray::{Array3, Axis};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::error::{DecompError, Result};
use crate::grid::GridShape;

/// Planned forward and inverse transforms for one grid shape
pub struct Fft3d {
    shape: GridShape,
    forward: [Arc<dyn Fft<f64>>; 3],
    inverse: [Arc<dyn Fft<f64>>; 3],
}

impl Fft3d {
    pub fn new(shape: GridShape) -> Self {
        let mut planner = FftPlanner::new();
        let lens = [shape.nx, shape.ny, shape.nz];
        let forward = lens.map(|n| planner.plan_fft_forward(n));
        let inverse = lens.map(|n| planner.plan_fft_inverse(n));
        Self {
            shape,
            forward,
            inverse,
        }
    }

    /// In-place forward 3D FFT
    pub fn forward(&self, data: &mut Array3<Complex64>) -> Result<()> {
        self.check_dims(data)?;
        for (axis, plan) in self.forward.iter().enumerate() {
            transform_axis(data, Axis(axis), plan.as_ref());
        }
        Ok(())
    }

    /// In-place inverse 3D FFT (with 1/N normalisation)
    pub fn inverse(&self, data: &mut Array3<Complex64>) -> Result<()> {
        self.check_dims(data)?;
        for (axis, plan) in self.inverse.iter().enumerate() {
            transform_axis(data, Axis(axis), plan.as_ref());
        }
        let n = self.shape.len() as f64;
        data.mapv_inplace(|v| v / n);
        Ok(())
    }

    /// Lift a real array into complex space and forward-transform it
    pub fn forward_real(&self, real: &Array3<f64>) -> Result<Array3<Complex64>> {
        let mut spectrum = real.mapv(|v| Complex64::new(v, 0.0));
        self.forward(&mut spectrum)?;
        Ok(spectrum)
    }

    fn check_dims(&self, data: &Array3<Complex64>) -> Result<()> {
        if data.dim() != self.shape.dims() {
            return Err(DecompError::ShapeMismatch {
                expected: self.shape.len(),
                found: data.len(),
            });
        }
        Ok(())
    }
}

/// Run a 1D plan along every lane of `axis`
fn transform_axis(data: &mut Array3<Complex64>, axis: Axis, plan: &dyn Fft<f64>) {
    let n = data.len_of(axis);
    if n <= 1 {
        return;
    }
    let zero = Complex64::new(0.0, 0.0);
    let mut scratch = vec![zero; plan.get_inplace_scratch_len()];
    let mut buffer = vec![zero; n];

    for mut lane in data.lanes_mut(axis) {
        if let Some(slice) = lane.as_slice_mut() {
            plan.process_with_scratch(slice, &mut scratch);
            continue;
        }
        // Strided lane: gather, transform, scatter
        for (b, v) in buffer.iter_mut().zip(lane.iter()) {
            *b = *v;
        }
        plan.process_with_scratch(&mut buffer, &mut scratch);
        for (v, b) in lane.iter_mut().zip(buffer.iter()) {
            *v = *b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    /// Direct O(N²) 3D DFT for checking small grids
    fn naive_dft3(input: &Array3<Complex64>) -> Array3<Complex64> {
        let (nx, ny, nz) = input.dim();
        Array3::from_shape_fn((nx, ny, nz), |(p, q, r)| {
            let mut acc = Complex64::new(0.0, 0.0);
            for ((i, j, k), &v) in input.indexed_iter() {
                let phase = -2.0
                    * PI
                    * (p as f64 * i as f64 / nx as f64
                        + q as f64 * j as f64 / ny as f64
                        + r as f64 * k as f64 / nz as f64);
                acc += v * Complex64::new(phase.cos(), phase.sin());
            }
            acc
        })
    }

    fn sample_field(shape: GridShape) -> Array3<Complex64> {
        Array3::from_shape_fn(shape.dims(), |(i, j, k)| {
            let t = (i * 7 + j * 3 + k * 5) as f64;
            Complex64::new((0.37 * t).sin(), (0.11 * t).cos())
        })
    }

    #[test]
    fn test_forward_matches_naive_dft() {
        let shape = GridShape::new(3, 4, 5);
        let input = sample_field(shape);
        let expected = naive_dft3(&input);

        let mut output = input.clone();
        Fft3d::new(shape).forward(&mut output).unwrap();

        for (a, b) in output.iter().zip(expected.iter()) {
            assert!((a - b).norm() < 1e-10, "FFT mismatch: {} vs {}", a, b);
        }
    }

    #[test]
    fn test_forward_inverse_roundtrip() {
        let shape = GridShape::new(6, 1, 4);
        let input = sample_field(shape);
        let fft = Fft3d::new(shape);

        let mut data = input.clone();
        fft.forward(&mut data).unwrap();
        fft.inverse(&mut data).unwrap();

        for (a, b) in data.iter().zip(input.iter()) {
            assert!((a - b).norm() < 1e-12);
        }
    }

    #[test]
    fn test_delta_has_flat_spectrum() {
        let shape = GridShape::cubic(4);
        let mut delta = Array3::<f64>::zeros(shape.dims());
        delta[[0, 0, 0]] = 1.0;

        let spectrum = Fft3d::new(shape).forward_real(&delta).unwrap();
        assert!(spectrum.iter().all(|v| (v - Complex64::new(1.0, 0.0)).norm() < 1e-12));
    }

    #[test]
    fn test_rejects_wrong_dims() {
        let fft = Fft3d::new(GridShape::cubic(4));
        let mut data = Array3::<Complex64>::zeros((4, 4, 3));
        assert!(matches!(
            fft.forward(&mut data),
            Err(DecompError::ShapeMismatch { expected: 64, found: 48 })
        ));
    }
}
