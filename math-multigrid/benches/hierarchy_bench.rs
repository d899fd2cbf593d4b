use criterion::{Criterion, criterion_group, criterion_main};
use math_audio_multigrid::{CsrMatrix, CycleType, Hierarchy, LevelManager, Map, Vector};
use ndarray::Array1;
use std::hint::black_box;

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

fn bench_setup(c: &mut Criterion) {
    let a = laplacian_2d(64);
    let manager = LevelManager::default();

    c.bench_function("setup_laplacian_64x64", |b| {
        b.iter(|| {
            let mut h = Hierarchy::from_operator(a.clone());
            h.setup(&manager, 0, 10).unwrap();
            black_box(h.num_levels())
        })
    });
}

fn bench_cycles(c: &mut Criterion) {
    let nx = 64;
    let mut h = Hierarchy::from_operator(laplacian_2d(nx));
    h.setup(&LevelManager::for_fem(), 0, 10).unwrap();
    let b = Vector::from_values(Array1::from_elem(nx * nx, 1.0));

    for (name, cycle) in [("v_cycle_64x64", CycleType::V), ("w_cycle_64x64", CycleType::W)] {
        c.bench_function(name, |bench| {
            bench.iter(|| {
                let mut x = Vector::zeros(Map::contiguous(nx * nx));
                h.iterate(black_box(&b), 1, &mut x, true, cycle, 0).unwrap();
                black_box(x)
            })
        });
    }
}

criterion_group!(benches, bench_setup, bench_cycles);
criterion_main!(benches);
