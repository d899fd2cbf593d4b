//! Staged construction: level structure, termination and artifact lifetimes

use math_audio_multigrid::{
    COARSE_SOLVER, CoarseSolverKind, CsrMatrix, Hierarchy, KeepFlags, Level, LevelManager,
    MultigridError, OPERATOR, POST_SMOOTHER, PRE_SMOOTHER, PROLONGATOR, ProducerId, RESTRICTOR,
    SMOOTHER, SPLITTING,
};
use num_complex::Complex64;

fn laplacian_2d(nx: usize) -> CsrMatrix<f64> {
    let n = nx * nx;
    let mut triplets = Vec::with_capacity(5 * n);
    for iy in 0..nx {
        for ix in 0..nx {
            let row = iy * nx + ix;
            triplets.push((row, row, 4.0));
            if ix > 0 {
                triplets.push((row, row - 1, -1.0));
            }
            if ix + 1 < nx {
                triplets.push((row, row + 1, -1.0));
            }
            if iy > 0 {
                triplets.push((row, row - nx, -1.0));
            }
            if iy + 1 < nx {
                triplets.push((row, row + nx, -1.0));
            }
        }
    }
    CsrMatrix::from_triplets(n, n, triplets)
}

fn rows(level: &Level<f64>) -> usize {
    level.get_operator(OPERATOR).unwrap().unwrap().num_rows
}

#[test]
fn test_level_ids_and_parents() {
    let mut h = Hierarchy::from_operator(laplacian_2d(16));
    h.set_max_coarse_size(20);
    h.setup(&LevelManager::default(), 0, 10).unwrap();

    assert!(h.num_levels() >= 3);
    for (i, level) in h.levels().iter().enumerate() {
        assert_eq!(level.level_id(), Some(i));
        assert_eq!(level.previous(), i.checked_sub(1));
    }
    let last = h.get_level(h.num_levels() - 1).unwrap();
    assert!(rows(last) <= 20);
    let before_last = h.get_level(h.num_levels() - 2).unwrap();
    assert!(rows(before_last) > 20);
}

#[test]
fn test_level_limit_is_respected() {
    let mut h = Hierarchy::from_operator(laplacian_2d(16));
    h.set_max_coarse_size(1);
    h.setup(&LevelManager::default(), 0, 3).unwrap();

    assert_eq!(h.num_levels(), 3);
    let coarsest = h.get_level(2).unwrap();
    assert!(rows(coarsest) > 1);
    assert!(coarsest.get_smoother(PRE_SMOOTHER).unwrap().is_direct());
    assert!(!coarsest.is_available(POST_SMOOTHER));
}

#[test]
fn test_oversized_coarsest_level_is_relaxed() {
    let manager = LevelManager {
        max_direct_size: 50,
        ..LevelManager::default()
    };
    let mut h = Hierarchy::from_operator(laplacian_2d(16));
    h.set_max_coarse_size(10);
    h.setup(&manager, 0, 2).unwrap();

    assert_eq!(h.num_levels(), 2);
    let coarsest = h.get_level(1).unwrap();
    assert!(rows(coarsest) > 50);
    let solver = coarsest.get_smoother(PRE_SMOOTHER).unwrap();
    assert!(!solver.is_direct());
    assert!(!solver.description().starts_with("DenseLU"));

    // Within the bound the same level is factored
    let mut h = Hierarchy::from_operator(laplacian_2d(16));
    h.set_max_coarse_size(10);
    h.setup(&LevelManager::default(), 0, 2).unwrap();
    let coarsest = h.get_level(1).unwrap();
    assert!(coarsest.get_smoother(PRE_SMOOTHER).unwrap().is_direct());
}

#[test]
fn test_coarse_enough_fine_level_stays_alone() {
    let mut h = Hierarchy::from_operator(laplacian_2d(5));
    h.set_max_coarse_size(1000);
    h.setup(&LevelManager::default(), 0, 10).unwrap();

    assert_eq!(h.num_levels(), 1);
    let level = h.get_level(0).unwrap();
    assert!(!level.is_available(PROLONGATOR));
    assert!(!level.is_available(RESTRICTOR));
    assert!(!level.is_available(POST_SMOOTHER));
    assert!(level.get_smoother(PRE_SMOOTHER).unwrap().is_direct());

    // The speculative smoother request is never consumed
    assert_eq!(level.request_count(SMOOTHER, ProducerId::TopSmoother), 1);
    assert_eq!(level.request_count(COARSE_SOLVER, ProducerId::TopCoarseSolver), 0);
}

#[test]
fn test_final_artifacts_and_evicted_intermediates() {
    let mut h = Hierarchy::from_operator(laplacian_2d(12));
    h.set_max_coarse_size(10);
    h.setup(&LevelManager::default(), 0, 10).unwrap();

    let last = h.num_levels() - 1;
    for (i, level) in h.levels().iter().enumerate() {
        assert!(level.is_available(OPERATOR));
        assert_eq!(level.is_available(PROLONGATOR), i > 0);
        assert_eq!(level.is_available(RESTRICTOR), i > 0);
        assert_eq!(level.is_available(POST_SMOOTHER), i < last);

        assert!(!level.is_available_from(SPLITTING, ProducerId::Coarsening));
        assert!(!level.is_available_from(OPERATOR, ProducerId::Rap));
        assert!(!level.is_available_from(PROLONGATOR, ProducerId::Prolongator));
        // Speculative handles stay outstanding where they went unused
        if i < last {
            assert_eq!(level.request_count(COARSE_SOLVER, ProducerId::TopCoarseSolver), 1);
            assert_eq!(level.request_count(SMOOTHER, ProducerId::TopSmoother), 0);
        } else {
            assert_eq!(level.request_count(SMOOTHER, ProducerId::TopSmoother), 1);
        }

        for slot in level.slots() {
            assert!(
                slot.requests > 0 || !slot.keep.is_empty(),
                "level {i}: stale slot {slot:?}"
            );
        }
    }
}

#[test]
fn test_kept_splitting_survives_setup() {
    let mut h = Hierarchy::from_operator(laplacian_2d(12));
    h.set_max_coarse_size(10);
    h.keep(SPLITTING, ProducerId::Coarsening);
    h.setup(&LevelManager::default(), 0, 10).unwrap();

    // Keep flags only exist on levels present when keep() was called
    let fine = h.get_level(0).unwrap();
    assert!(fine.is_available_from(SPLITTING, ProducerId::Coarsening));
    let splitting = fine
        .get_splitting_from(SPLITTING, ProducerId::Coarsening)
        .unwrap();
    assert_eq!(splitting.point_types.len(), 144);
    assert!(!h.get_level(1).unwrap().is_available_from(SPLITTING, ProducerId::Coarsening));

    h.delete(SPLITTING, ProducerId::Coarsening);
    assert!(!h.get_level(0).unwrap().is_available_from(SPLITTING, ProducerId::Coarsening));
}

#[test]
fn test_implicit_transpose_builds_no_restrictor() {
    let mut h = Hierarchy::from_operator(laplacian_2d(12));
    h.set_max_coarse_size(10);
    h.set_implicit_transpose(true);
    h.setup(&LevelManager::default(), 0, 10).unwrap();

    assert!(h.num_levels() > 1);
    for level in h.levels().iter() {
        assert!(!level.is_available(RESTRICTOR));
        assert!(!level.was_built(ProducerId::Restrictor));
    }
}

#[test]
fn test_without_smoother_or_coarse_solver() {
    let manager = LevelManager {
        smoother: None,
        coarse_solver: None,
        ..LevelManager::default()
    };
    let mut h = Hierarchy::from_operator(laplacian_2d(10));
    h.set_max_coarse_size(10);
    h.setup(&manager, 0, 10).unwrap();

    assert!(h.num_levels() > 1);
    for level in h.levels().iter() {
        assert!(!level.is_available(PRE_SMOOTHER));
        assert!(!level.is_available(POST_SMOOTHER));
    }
}

#[test]
fn test_smoother_as_coarse_solver() {
    let manager = LevelManager {
        coarse_solver: Some(CoarseSolverKind::Smoother(Default::default())),
        ..LevelManager::default()
    };
    let mut h = Hierarchy::from_operator(laplacian_2d(4));
    h.setup(&manager, 0, 4).unwrap();

    let level = h.get_level(0).unwrap();
    assert!(!level.get_smoother(PRE_SMOOTHER).unwrap().is_direct());
}

#[test]
fn test_complex_operator() {
    let n = 120;
    let shift = Complex64::new(0.0, 0.2);
    let mut triplets = Vec::new();
    for i in 0..n {
        triplets.push((i, i, Complex64::new(2.0, 0.0) + shift));
        if i > 0 {
            triplets.push((i, i - 1, Complex64::new(-1.0, 0.0)));
        }
        if i + 1 < n {
            triplets.push((i, i + 1, Complex64::new(-1.0, 0.0)));
        }
    }
    let mut h = Hierarchy::from_operator(CsrMatrix::from_triplets(n, n, triplets));
    h.set_max_coarse_size(16);
    h.setup(&LevelManager::default(), 0, 10).unwrap();

    assert!(h.num_levels() >= 3);
    let coarsest = h.get_level(h.num_levels() - 1).unwrap();
    assert!(coarsest.get_smoother(PRE_SMOOTHER).unwrap().is_direct());
}

#[test]
fn test_setup_preconditions() {
    let mut h = Hierarchy::<f64>::new();
    assert!(matches!(
        h.setup(&LevelManager::default(), 0, 5),
        Err(MultigridError::PreconditionViolation(_))
    ));

    let mut h = Hierarchy::from_operator(laplacian_2d(4));
    assert!(matches!(
        h.setup(&LevelManager::default(), 0, 1),
        Err(MultigridError::PreconditionViolation(_))
    ));

    let bad = LevelManager {
        strong_threshold: 2.0,
        ..LevelManager::default()
    };
    assert!(h.setup(&bad, 0, 5).is_err());
}

#[test]
fn test_request_counting_on_a_level() {
    let mut level = Level::<f64>::new();
    level.request_from(PROLONGATOR, ProducerId::Prolongator);
    level.request_from(PROLONGATOR, ProducerId::Prolongator);
    assert!(level.store_from(PROLONGATOR, ProducerId::Prolongator, CsrMatrix::identity(3)));

    assert_eq!(level.release_from(PROLONGATOR, ProducerId::Prolongator).unwrap(), 1);
    assert!(level.is_available_from(PROLONGATOR, ProducerId::Prolongator));
    assert_eq!(level.release_from(PROLONGATOR, ProducerId::Prolongator).unwrap(), 0);
    assert!(!level.is_available_from(PROLONGATOR, ProducerId::Prolongator));

    assert!(matches!(
        level.release_from(PROLONGATOR, ProducerId::Prolongator),
        Err(MultigridError::PreconditionViolation(_))
    ));
}

#[test]
fn test_not_available() {
    let h = Hierarchy::from_operator(laplacian_2d(4));
    let level = h.get_level(0).unwrap();

    assert!(!level.is_available(PROLONGATOR));
    assert!(matches!(
        level.get(PROLONGATOR),
        Err(MultigridError::NotAvailable { level: Some(0), .. })
    ));
    // Looking did not create anything
    assert!(!level.is_available(PROLONGATOR));
    assert_eq!(
        level.keep_flags(OPERATOR, ProducerId::NoFactory),
        KeepFlags::USER_DATA
    );
}

#[test]
fn test_add_level_renumbers() {
    let mut h = Hierarchy::from_operator(laplacian_2d(4));
    let id = h.add_level(Level::new());
    assert_eq!(id, 1);
    assert_eq!(h.get_level(1).unwrap().previous(), Some(0));
    assert!(matches!(
        h.get_level(5),
        Err(MultigridError::PreconditionViolation(_))
    ));
    assert_eq!(h.description(), "Hierarchy{numLevels = 2}");
}
