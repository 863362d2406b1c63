//! Property tests for the verification pipeline.
//!
//! Invariants covered:
//!
//! 1. The host provider always agrees with the reference engine, for any
//!    small product shape, orientation, scalar pair, and batch count.
//! 2. The same holds for transforms across domains and placements.
//! 3. Upload/download round trips are bit-identical for arbitrary data.
//! 4. The uniformity check accepts seeded uniform fills of any size and
//!    rejects constant fills away from the midpoint.

use proptest::prelude::*;

use stridekit_common::{DataGenerator, GemmSpec, Placement, TransformDirection, TransformSpec};
use stridekit_kernels::{
    run_gemm, run_transform, uniform_mean_departure, BufferPool, GemmFill, HostKernel,
    KernelProvider,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn host_gemm_always_matches_reference(
        m in 1usize..8,
        n in 1usize..8,
        k in 1usize..8,
        ta in any::<bool>(),
        tb in any::<bool>(),
        batch in 1usize..4,
        seed in any::<u64>(),
    ) {
        let spec = GemmSpec::for_shape(m, n, k)
            .unwrap()
            .with_transpose(ta, tb)
            .with_batch_count(batch)
            .unwrap()
            .with_alpha_beta(1.25, 0.75);

        let kernel = HostKernel::new();
        let report = run_gemm(&spec, GemmFill::Uniform { seed }, &kernel).unwrap();
        prop_assert!(
            report.passed(),
            "m={m} n={n} k={k} ta={ta} tb={tb} batch={batch}: {:?}",
            report.verdict
        );
    }

    #[test]
    fn host_transform_always_matches_reference(
        extents in proptest::collection::vec(1usize..8, 1..=2),
        real in any::<bool>(),
        in_place in any::<bool>(),
        batch in 1usize..4,
        seed in any::<u64>(),
    ) {
        let spec = if real {
            TransformSpec::real_to_complex(&extents).unwrap()
        } else {
            TransformSpec::complex_to_complex(&extents, TransformDirection::Forward).unwrap()
        };
        let placement = if in_place { Placement::InPlace } else { Placement::OutOfPlace };
        let spec = spec.with_placement(placement).with_batch_count(batch).unwrap();

        let kernel = HostKernel::new();
        let report = run_transform(&spec, seed, &kernel).unwrap();
        prop_assert!(
            report.passed(),
            "extents={extents:?} real={real} in_place={in_place} batch={batch}: {:?}",
            report.verdict
        );
    }

    #[test]
    fn roundtrip_is_bit_identical(data in proptest::collection::vec(any::<f32>(), 1..256)) {
        let kernel = HostKernel::new();
        let pool = BufferPool::new(kernel.allocator());

        let mut buf = pool.acquire_f32_init(&data).unwrap();
        buf.upload().unwrap();
        buf.as_f32_mut_slice().fill(0.0);
        buf.download().unwrap();

        for (orig, back) in data.iter().zip(buf.as_f32_slice().iter()) {
            prop_assert_eq!(orig.to_bits(), back.to_bits());
        }
    }

    #[test]
    fn seeded_uniform_fills_look_uniform(seed in any::<u64>()) {
        let mut generator = DataGenerator::new(seed);
        let mut sample = vec![0.0f32; 2048];
        generator.fill_uniform(&mut sample);
        prop_assert_eq!(uniform_mean_departure(&sample, 0.0, 1.0), 0.0);
    }

    #[test]
    fn constant_fills_away_from_midpoint_fail(value in 0.0f32..0.35) {
        let sample = vec![value; 512];
        let departure = uniform_mean_departure(&sample, 0.0, 1.0);
        prop_assert!(departure != 0.0);
        prop_assert!((departure - value as f64).abs() < 1e-6);
    }
}
