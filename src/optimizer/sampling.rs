//! Latin Hypercube sampling on the unit cube.

use rand::seq::SliceRandom;
use rand::Rng;

/// Draws `n` points in `[0, 1)^dim` such that every dimension has exactly one
/// point in each of its `n` equal-width strata.
pub fn latin_hypercube<R: Rng + ?Sized>(n: usize, dim: usize, rng: &mut R) -> Vec<Vec<f64>> {
    let mut points = vec![vec![0.0; dim]; n];
    if n == 0 {
        return points;
    }

    let mut strata: Vec<usize> = (0..n).collect();
    for d in 0..dim {
        strata.shuffle(rng);
        for (point, &stratum) in points.iter_mut().zip(strata.iter()) {
            point[d] = (stratum as f64 + rng.gen::<f64>()) / n as f64;
        }
    }

    points
}
