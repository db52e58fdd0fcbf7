//! Row-reduction of the conservation matrix `W` to a linearly independent
//! subset of components and a corresponding primary/secondary species
//! partition (spec.md §S2, grounded on `Reaktoro/Math/LU.hpp` and the
//! `canonicalizer` referenced by `SmartEquilibriumSolverBase.cpp`).
//!
//! `num_dual::linalg::LU` solves square systems; canonicalizing a
//! rectangular `W` instead needs a rank-revealing echelon reduction, so this
//! performs its own partial-pivoting Gaussian elimination rather than
//! reusing `LU` directly — the Newton solves in
//! [`crate::equilibrium::setup`] and [`crate::equilibrium::solver`] are
//! where `LU` itself gets reused.

use ndarray::Array2;

/// The outcome of canonicalizing a conservation matrix: its numerical rank
/// and a partition of species (columns) into a *primary* set (one per
/// independent row, in pivot order) and the remaining *secondary* set.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    rank: usize,
    primary: Vec<usize>,
    secondary: Vec<usize>,
}

impl Canonicalizer {
    /// Canonicalize `w` (`rows x cols`, typically the conservation matrix
    /// `W_n`). Columns are candidate primary species; rows are components.
    /// Pivoting selects, at each step, the remaining row/column pair with
    /// the largest-magnitude entry (full pivoting), which is the standard
    /// way to keep a rank-revealing reduction numerically stable when the
    /// matrix is not square.
    pub fn new(w: &Array2<f64>) -> Self {
        const PIVOT_TOL: f64 = 1e-12;

        let mut a = w.clone();
        let (rows, cols) = a.dim();
        let mut row_perm: Vec<usize> = (0..rows).collect();
        let mut col_perm: Vec<usize> = (0..cols).collect();

        let max_rank = rows.min(cols);
        let mut rank = 0;
        while rank < max_rank {
            let (mut best_i, mut best_j, mut best_val) = (rank, rank, 0.0f64);
            for i in rank..rows {
                for j in rank..cols {
                    let val = a[[i, j]].abs();
                    if val > best_val {
                        best_val = val;
                        best_i = i;
                        best_j = j;
                    }
                }
            }
            if best_val < PIVOT_TOL {
                break;
            }

            if best_i != rank {
                for j in 0..cols {
                    a.swap((rank, j), (best_i, j));
                }
                row_perm.swap(rank, best_i);
            }
            if best_j != rank {
                for i in 0..rows {
                    a.swap((i, rank), (i, best_j));
                }
                col_perm.swap(rank, best_j);
            }

            let pivot = a[[rank, rank]];
            for i in (rank + 1)..rows {
                let factor = a[[i, rank]] / pivot;
                if factor != 0.0 {
                    for j in rank..cols {
                        a[[i, j]] -= factor * a[[rank, j]];
                    }
                }
            }
            rank += 1;
        }

        let primary = col_perm[..rank].to_vec();
        let secondary = col_perm[rank..].to_vec();
        Self { rank, primary, secondary }
    }

    /// The rank of the conservation matrix: the number of linearly
    /// independent components actually enforced.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Species (column) indices chosen as primary (basic) variables, one per
    /// independent row, in pivot order.
    pub fn primary_species(&self) -> &[usize] {
        &self.primary
    }

    /// The remaining species indices, not chosen as primary.
    pub fn secondary_species(&self) -> &[usize] {
        &self.secondary
    }
}
