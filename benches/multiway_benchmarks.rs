//! Benchmarks for multi-way ICP
//!
//! Measures a full registration run and a single correspondence update for a
//! growing number of objects.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use multiway_icp::core::pose_from_parts;
use multiway_icp::{AlignableGeometry, CloudGeometry, IcpObject, IcpParams, MultiwayIcp, PointCloud};
use nalgebra::{Point3, Rotation3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

/// Jittered lattice with `n³` points
fn create_cloud(n: usize, rng: &mut StdRng) -> PointCloud {
    let mut points = Vec::with_capacity(n * n * n);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                points.push(Point3::new(
                    i as f64 + rng.gen_range(-0.1..0.1),
                    j as f64 + rng.gen_range(-0.1..0.1),
                    k as f64 + rng.gen_range(-0.1..0.1),
                ));
            }
        }
    }
    PointCloud::new(points)
}

fn create_objects(num_objects: usize) -> Vec<IcpObject> {
    let mut rng = StdRng::seed_from_u64(17);
    let geometry: Arc<dyn AlignableGeometry> =
        Arc::new(CloudGeometry::new(create_cloud(12, &mut rng)).expect("valid cloud"));
    (0..num_objects)
        .map(|_| {
            let rot = Rotation3::from_euler_angles(
                rng.gen_range(-0.005..0.005),
                rng.gen_range(-0.005..0.005),
                rng.gen_range(-0.005..0.005),
            );
            let t = Vector3::new(
                rng.gen_range(-0.02..0.02),
                rng.gen_range(-0.02..0.02),
                rng.gen_range(-0.02..0.02),
            );
            IcpObject::new(geometry.clone(), pose_from_parts(rot.matrix(), t, 1.0))
        })
        .collect()
}

fn benchmark_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("multiway_icp_run");
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(20);

    for num_objects in [2usize, 4, 8] {
        let objects = create_objects(num_objects);
        group.bench_with_input(
            BenchmarkId::new("combined", num_objects),
            &objects,
            |b, objects| {
                b.iter(|| {
                    let params = IcpParams::default().with_iter_limit(10);
                    let mut icp = MultiwayIcp::with_params(objects.clone(), 1.5, params)
                        .expect("valid objects");
                    black_box(icp.run());
                });
            },
        );
    }

    group.finish();
}

fn benchmark_update_point_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_point_pairs");
    group.sample_size(20);

    for num_objects in [2usize, 4, 8] {
        let mut icp = MultiwayIcp::new(create_objects(num_objects), 0.0).expect("valid objects");
        group.bench_function(BenchmarkId::new("all_points", num_objects), |b| {
            b.iter(|| {
                icp.update_point_pairs();
                black_box(icp.num_active_pairs());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_run, benchmark_update_point_pairs);
criterion_main!(benches);
