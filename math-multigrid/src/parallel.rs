//! Parallel helpers gated on the `rayon` feature, with sequential fallbacks

/// Whether the per-row kernels run on the rayon pool
pub fn is_parallel_available() -> bool {
    cfg!(feature = "rayon")
}

/// Map `f` over `0..count`, collecting the results in index order
#[cfg(feature = "rayon")]
pub fn parallel_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    U: Send,
    F: Fn(usize) -> U + Sync + Send,
{
    use rayon::prelude::*;
    (0..count).into_par_iter().map(f).collect()
}

/// Map `f` over `0..count`, collecting the results in index order
#[cfg(not(feature = "rayon"))]
pub fn parallel_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    F: Fn(usize) -> U,
{
    (0..count).map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_indexed_keeps_order() {
        let squares = parallel_map_indexed(1000, |i| i * i);
        assert_eq!(squares.len(), 1000);
        assert!(squares.iter().enumerate().all(|(i, &s)| s == i * i));
    }
}
