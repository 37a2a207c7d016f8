use nalgebra::DMatrix;
use ndarray::Array2;

/// Principal components of a scan plane.
///
/// Forms the bolometer-by-bolometer covariance matrix of the time-by-
/// bolometer plane, eigendecomposes it, and projects the plane onto the
/// eigenvectors. Columns are ordered by descending eigenvalue so the output
/// is deterministic.
pub fn principal_components(plane: &Array2<f64>) -> Array2<f64> {
    let (ntime, nbolo) = plane.dim();
    let a = DMatrix::from_fn(ntime, nbolo, |i, j| plane[[i, j]]);

    let cov = a.transpose() * &a;
    let eig = cov.symmetric_eigen();

    let mut order: Vec<usize> = (0..nbolo).collect();
    order.sort_by(|&i, &j| {
        eig.eigenvalues[j]
            .partial_cmp(&eig.eigenvalues[i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut vectors = DMatrix::<f64>::zeros(nbolo, nbolo);
    for (dst, &src) in order.iter().enumerate() {
        vectors.set_column(dst, &eig.eigenvectors.column(src));
    }

    let efuncs = a * vectors;
    Array2::from_shape_fn((ntime, nbolo), |(i, j)| efuncs[(i, j)])
}
