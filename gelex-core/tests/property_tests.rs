//! Property-based tests using proptest.
//!
//! These check invariants that must hold for all valid inputs rather than
//! specific values:
//!   - the adjusted residual tracks `y - Xβ - Σ Z u` under every prior
//!   - mixture counts agree with the tracker; monomorphic markers stay zero
//!   - chains are reproducible from the seed
//!   - GRM symmetry and positive semi-definiteness
//!   - Wald statistic consistency
//!   - chunked decoding and allele-flipped prediction

use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use gelex_core::assoc::wald::{two_sided_p, WaldResult};
use gelex_core::bayes::{BayesModel, Mcmc, McmcConfig, ModelType, PriorConfig};
use gelex_core::data::standardize::standardize_chunk;
use gelex_core::data::{FixedDesign, Policy};
use gelex_geno::{GenotypeMatrix, GenotypeStore};

const MODELS: [&str; 14] = [
    "A", "Ad", "B", "Bd", "Bpi", "Bpid", "C", "Cd", "Cpi", "Cpid", "R", "Rd", "RR", "RRd",
];

/// Column-major counts with the last marker fixed at 2 (monomorphic).
fn raw_counts(rng: &mut ChaCha8Rng, n: usize, m: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(n * m);
    for j in 0..m {
        let p: f64 = rng.gen_range(0.15..0.5);
        for _ in 0..n {
            let x = if j + 1 == m {
                2.0
            } else {
                (rng.gen::<f64>() < p) as u8 as f64 + (rng.gen::<f64>() < p) as u8 as f64
            };
            data.push(x);
        }
    }
    data
}

fn coded(raw: &[f64], n: usize, policy: Policy) -> GenotypeMatrix {
    let mut data = raw.to_vec();
    let stats = standardize_chunk(policy, n, &mut data);
    GenotypeMatrix::new(n, data, stats)
}

fn phenotype(rng: &mut ChaCha8Rng, n: usize) -> Vec<f64> {
    (0..n)
        .map(|_| {
            let e: f64 = StandardNormal.sample(rng);
            2.0 + e
        })
        .collect()
}

// ---------------------------------------------------------------------------
// 1. Residual invariant, mixture counts and monomorphic skip for every model
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_sampler_invariants(
        model_idx in 0usize..MODELS.len(),
        seed in 0u64..1000,
    ) {
        let (n, m) = (16, 6);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let raw = raw_counts(&mut rng, n, m);
        let y = phenotype(&mut rng, n);
        let add = coded(&raw, n, Policy::AdditiveCentered);
        let dom = coded(&raw, n, Policy::DominanceCentered);
        let model_type: ModelType = MODELS[model_idx].parse().unwrap();
        let fixed = FixedDesign::intercept(n);
        let model = BayesModel::new(
            model_type,
            y.clone(),
            &fixed,
            &[],
            &add,
            Some(&dom),
            &PriorConfig::default(),
        )
        .unwrap();
        prop_assert!(add.is_monomorphic(m - 1));

        let y_norm = y.iter().map(|v| v * v).sum::<f64>().sqrt();
        let mcmc = Mcmc::new(McmcConfig { n_iters: 30, n_burnin: 10, n_thin: 1, seed }).unwrap();
        let mut failures = Vec::new();
        mcmc.run_with(&model, |iter, state| {
            let truth = state.true_residual(&model);
            let drift = truth
                .iter()
                .zip(&state.residual.y_adj)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            if drift > 1e-9 * y_norm {
                failures.push(format!("iter {}: residual drift {}", iter, drift));
            }
            let blocks = std::iter::once(&state.additive).chain(state.dominance.as_ref());
            for block in blocks {
                if block.coeffs[m - 1] != 0.0 {
                    failures.push(format!("iter {}: monomorphic effect moved", iter));
                }
                let total: usize = block.pi.count.iter().sum();
                if total != m - 1 {
                    failures.push(format!("iter {}: counts sum to {}", iter, total));
                }
                for (k, &c) in block.pi.count.iter().enumerate() {
                    let tracked = (0..m - 1).filter(|&j| block.tracker[j] == k).count();
                    if c != tracked {
                        failures.push(format!("iter {}: component {} count {} vs {}", iter, k, c, tracked));
                    }
                }
            }
            Ok(())
        })
        .unwrap();
        prop_assert!(failures.is_empty(), "{}: {:?}", MODELS[model_idx], failures);
    }
}

// ---------------------------------------------------------------------------
// 2. Same seed, same records
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn prop_chain_is_deterministic(
        model_idx in 0usize..MODELS.len(),
        seed in 0u64..1000,
    ) {
        let (n, m) = (12, 5);
        let mut rng = ChaCha8Rng::seed_from_u64(seed ^ 0x5eed);
        let raw = raw_counts(&mut rng, n, m);
        let y = phenotype(&mut rng, n);
        let add = coded(&raw, n, Policy::AdditiveStandardized);
        let dom = coded(&raw, n, Policy::DominanceStandardized);
        let model = BayesModel::new(
            MODELS[model_idx].parse().unwrap(),
            y,
            &FixedDesign::intercept(n),
            &[],
            &add,
            Some(&dom),
            &PriorConfig::default(),
        )
        .unwrap();
        let config = McmcConfig { n_iters: 20, n_burnin: 5, n_thin: 2, seed };
        let a = Mcmc::new(config.clone()).unwrap().run(&model).unwrap();
        let b = Mcmc::new(config).unwrap().run(&model).unwrap();
        for ((_, da), (_, db)) in a.params.iter().zip(b.params.iter()) {
            let bits_a: Vec<u64> = da.iter().map(|v| v.to_bits()).collect();
            let bits_b: Vec<u64> = db.iter().map(|v| v.to_bits()).collect();
            prop_assert_eq!(bits_a, bits_b);
        }
    }
}

// ---------------------------------------------------------------------------
// 3. GRM symmetry and PSD
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_grm_symmetric_psd(
        n in 5usize..25,
        m in 1usize..40,
        chunk in 1usize..16,
        seed in 0u64..1000,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("g");
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let geno: Vec<Vec<i32>> = (0..m)
            .map(|_| (0..n).map(|_| rng.gen_range(-1..3)).collect())
            .collect();
        gelex_geno::testing::write_bfile(&prefix, &geno).unwrap();
        let bfile = gelex_geno::Bfile::new(&prefix.to_string_lossy());
        let fam = gelex_geno::plink::read_fam(&bfile.fam).unwrap();
        let sm = gelex_geno::SampleManager::from_fam(&fam, false).unwrap();
        let reader = gelex_geno::BedReader::open(&bfile.bed, m, &sm).unwrap();

        let config = gelex_core::grm::GrmConfig { chunk_size: chunk, policy: Policy::AdditiveStandardized };
        let k = gelex_core::grm::compute(&reader, &[0..m], &config, &mut |_, _| {}).unwrap().k;
        for i in 0..n {
            for j in 0..n {
                prop_assert_eq!(k.get(i, j), k.get(j, i));
            }
        }
        let eig = gelex_linalg::decomposition::symmetric_eigenvalues(&k).unwrap();
        let max = eig.iter().cloned().fold(0.0, f64::max);
        let min = eig.iter().cloned().fold(f64::INFINITY, f64::min);
        prop_assert!(min >= -1e-8 * max.max(1.0), "min eigenvalue {}", min);
    }
}

// ---------------------------------------------------------------------------
// 4. Wald statistics are mutually consistent
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_wald_consistency(
        num in -50.0f64..50.0,
        den in 1e-6f64..100.0,
    ) {
        let r = WaldResult::from_score(num, den);
        let t = r.beta / r.se;
        prop_assert!((r.chisq - t * t).abs() <= 1e-12 * r.chisq.max(1.0));
        prop_assert!((r.p - two_sided_p(r.chisq.sqrt())).abs() <= 1e-12);
        prop_assert!(r.p >= 0.0 && r.p <= 1.0);
    }

    #[test]
    fn prop_wald_untestable_below_precision(num in -1.0f64..1.0, den in 0.0f64..1e-10) {
        let r = WaldResult::from_score(num, den);
        prop_assert_eq!(r.beta, 0.0);
        prop_assert!(r.se.is_nan());
        prop_assert_eq!(r.p, 1.0);
    }
}

// ---------------------------------------------------------------------------
// 5. Decoding does not depend on the chunk partition
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_chunked_decode_matches_whole(
        n in 1usize..13,
        m in 1usize..20,
        cuts in proptest::collection::vec(0usize..20, 0..5),
        seed in 0u64..1000,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("g");
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let geno: Vec<Vec<i32>> = (0..m)
            .map(|_| (0..n).map(|_| rng.gen_range(-1..3)).collect())
            .collect();
        gelex_geno::testing::write_bfile(&prefix, &geno).unwrap();
        let bfile = gelex_geno::Bfile::new(&prefix.to_string_lossy());
        let fam = gelex_geno::plink::read_fam(&bfile.fam).unwrap();
        let sm = gelex_geno::SampleManager::from_fam(&fam, false).unwrap();
        let reader = gelex_geno::BedReader::open(&bfile.bed, m, &sm).unwrap();

        let mut whole = vec![0.0; n * m];
        reader.decode_chunk(0, m, &mut whole).unwrap();

        let mut bounds: Vec<usize> = cuts.into_iter().filter(|&c| c < m).collect();
        bounds.push(0);
        bounds.push(m);
        bounds.sort_unstable();
        bounds.dedup();
        let mut pieces = Vec::with_capacity(n * m);
        for w in bounds.windows(2) {
            let mut buf = vec![0.0; n * (w[1] - w[0])];
            reader.decode_chunk(w[0], w[1], &mut buf).unwrap();
            pieces.extend_from_slice(&buf);
        }
        prop_assert_eq!(whole, pieces);
    }
}

// ---------------------------------------------------------------------------
// 6. Prediction is invariant to the allele orientation of the panel
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn prop_flipped_panel_predicts_the_same(
        n in 2usize..15,
        m in 1usize..10,
        seed in 0u64..1000,
    ) {
        use gelex_core::predict::{genetic_values, MatchPlan, SnpEffect, SnpEffects};
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let geno: Vec<Vec<i32>> = (0..m)
            .map(|_| (0..n).map(|_| rng.gen_range(0..3)).collect())
            .collect();
        let forward = dir.path().join("fwd");
        let flipped = dir.path().join("rev");
        gelex_geno::testing::write_bfile(&forward, &geno).unwrap();
        let rev: Vec<Vec<i32>> = geno.iter().map(|c| c.iter().map(|x| 2 - x).collect()).collect();
        let bf = gelex_geno::testing::write_bfile(&flipped, &rev).unwrap();
        // Swap A1/A2 in the flipped BIM.
        let mut bim = std::fs::File::create(&bf.bim).unwrap();
        for j in 0..m {
            writeln!(bim, "1\trs{}\t0\t{}\tG\tA", j, 1000 * (j + 1)).unwrap();
        }
        drop(bim);

        let effects = SnpEffects::new(
            (0..m)
                .map(|j| SnpEffect {
                    id: format!("rs{}", j),
                    a1: "A".into(),
                    a2: "G".into(),
                    freq: rng.gen_range(0.1..0.9),
                    add: rng.gen_range(-1.0..1.0),
                    dom: Some(rng.gen_range(-1.0..1.0)),
                })
                .collect(),
        )
        .unwrap();

        let predict = |prefix: &std::path::Path| {
            let bfile = gelex_geno::Bfile::new(&prefix.to_string_lossy());
            let fam = gelex_geno::plink::read_fam(&bfile.fam).unwrap();
            let markers = gelex_geno::plink::read_bim(&bfile.bim).unwrap();
            let sm = gelex_geno::SampleManager::from_fam(&fam, false).unwrap();
            let reader = gelex_geno::BedReader::open(&bfile.bed, m, &sm).unwrap();
            let plan = MatchPlan::new(&markers, &effects);
            genetic_values(&reader, &plan, &effects, Policy::AdditiveStandardized, 3).unwrap()
        };
        let a = predict(&forward);
        let b = predict(&flipped);
        for (x, y) in a.additive.iter().zip(&b.additive) {
            prop_assert!((x - y).abs() < 1e-10);
        }
        for (x, y) in a.dominant.iter().zip(&b.dominant) {
            prop_assert!((x - y).abs() < 1e-10);
        }
    }
}
