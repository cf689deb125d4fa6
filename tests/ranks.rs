use proptest::prelude::*;
use sotto::{
    ranks::{break_ties, ranks},
    sim::{FixShare, IntShare, Simulator},
    substrate::{Error, input_batch, open_batch},
};

/// Data from example 12.3 in Blæsild & Granfeldt: "Statistics with applications in biology
/// and geology".
fn reference_groups() -> Vec<Vec<i64>> {
    vec![
        vec![200, 215, 225, 229, 230, 232, 241, 253, 256, 264, 268, 288, 288],
        vec![163, 182, 188, 195, 202, 205, 212, 214, 215, 230, 235, 255, 272],
        vec![268, 271, 273, 282, 285, 299, 309, 310, 314, 320, 337, 340, 345],
        vec![201, 216, 241, 257, 259, 267, 269, 282, 283, 291, 291, 312, 326],
    ]
}

/// Fractional ranks of an already sorted slice, computed in the clear.
fn clear_ranks(sorted: &[i64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(sorted.len());
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        let mid = (i + 1 + j) as f64 / 2.0;
        out.extend(std::iter::repeat_n(mid, j - i));
        i = j;
    }
    out
}

#[tokio::test]
async fn break_ties_without_ties_is_the_identity_ranking() -> Result<(), Error> {
    let sim = Simulator::seeded(31);
    let data: Vec<i64> = (1..=10).collect();
    let sorted: Vec<IntShare> = input_batch(&sim, "data", 0, &data).await?;
    let ranked = break_ties(&sim, &sorted).await?;
    let ranked = open_batch(&sim, "ranks", &ranked).await?;
    for (i, r) in ranked.iter().enumerate() {
        assert!((r - (i + 1) as f64).abs() < 1e-2);
    }
    assert!((ranked.iter().sum::<f64>() - 55.0).abs() < 1e-2);
    Ok(())
}

#[tokio::test]
async fn break_ties_assigns_mid_ranks_to_runs() -> Result<(), Error> {
    let sim = Simulator::seeded(32);
    let sorted: Vec<IntShare> = input_batch(&sim, "data", 0, &[1, 2, 2, 2, 3]).await?;
    let ranked = break_ties(&sim, &sorted).await?;
    let ranked = open_batch(&sim, "ranks", &ranked).await?;
    for (r, expected) in ranked.iter().zip([1.0, 3.0, 3.0, 3.0, 5.0]) {
        assert!((r - expected).abs() < 1e-2);
    }
    Ok(())
}

#[tokio::test]
async fn break_ties_matches_cleartext_ranking() -> Result<(), Error> {
    let sim = Simulator::seeded(33);
    let mut data: Vec<i64> = reference_groups().into_iter().flatten().collect();
    data.sort_unstable();

    let sorted: Vec<IntShare> = input_batch(&sim, "data", 0, &data).await?;
    let ranked = break_ties(&sim, &sorted).await?;
    let ranked = open_batch(&sim, "ranks", &ranked).await?;

    for (r, expected) in ranked.iter().zip(clear_ranks(&data)) {
        assert!((r - expected).abs() < 1e-2);
    }
    Ok(())
}

#[tokio::test]
async fn break_ties_needs_two_rounds() -> Result<(), Error> {
    let sim = Simulator::seeded(34);
    let sorted: Vec<IntShare> = input_batch(&sim, "data", 0, &[1, 1, 2, 3, 5, 8]).await?;
    sim.reset_rounds();
    break_ties(&sim, &sorted).await?;
    // one equality batch over adjacent pairs, one opening of the boundary bits
    assert_eq!(sim.rounds(), 2);
    Ok(())
}

#[tokio::test]
async fn ranks_reference_dataset() -> Result<(), Error> {
    let sim = Simulator::seeded(35);
    let mut groups: Vec<Vec<IntShare>> = Vec::new();
    for group in reference_groups() {
        groups.push(input_batch(&sim, "groups", 0, &group).await?);
    }

    let test = ranks(&sim, &groups).await?;

    for (sum, expected) in test.rank_sums.iter().zip([282.0, 147.0, 549.0, 400.0]) {
        assert!((sum - expected).abs() < 0.01);
    }
    assert!((test.statistic - 29.4115).abs() < 0.01);
    assert!((test.correction - 1.000282292212767).abs() < 0.01);
    Ok(())
}

#[tokio::test]
async fn ranks_skips_empty_groups() -> Result<(), Error> {
    let sim = Simulator::seeded(36);
    let groups = vec![
        input_batch::<_, IntShare>(&sim, "groups", 0, &[10, 20]).await?,
        Vec::new(),
        input_batch::<_, IntShare>(&sim, "groups", 0, &[30]).await?,
    ];

    let test = ranks(&sim, &groups).await?;

    assert!((test.rank_sums[0] - 3.0).abs() < 1e-2);
    assert_eq!(test.rank_sums[1], 0.0);
    assert!((test.rank_sums[2] - 3.0).abs() < 1e-2);
    assert!((test.statistic - 1.5).abs() < 1e-2);
    assert!((test.correction - 1.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn ranks_with_all_values_tied() -> Result<(), Error> {
    let sim = Simulator::seeded(37);
    let groups = vec![
        input_batch::<_, IntShare>(&sim, "groups", 0, &[5, 5, 5]).await?,
        input_batch::<_, IntShare>(&sim, "groups", 0, &[5, 5, 5]).await?,
    ];

    let test = ranks(&sim, &groups).await?;

    // every element gets the mid rank 3.5, so both groups sum to 10.5
    assert!((test.rank_sums[0] - 10.5).abs() < 1e-2);
    assert!((test.rank_sums[1] - 10.5).abs() < 1e-2);
    assert!(test.statistic.abs() < 1e-2);
    assert!((test.correction - 1.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn ranks_over_fixed_point_data() -> Result<(), Error> {
    let sim = Simulator::seeded(39);
    let groups = vec![
        input_batch::<_, FixShare>(&sim, "groups", 0, &[0.5, 1.5]).await?,
        input_batch::<_, FixShare>(&sim, "groups", 0, &[2.5]).await?,
    ];

    let test = ranks(&sim, &groups).await?;

    assert!((test.rank_sums[0] - 3.0).abs() < 1e-2);
    assert!((test.rank_sums[1] - 3.0).abs() < 1e-2);
    assert!((test.statistic - 1.5).abs() < 1e-2);
    Ok(())
}

#[tokio::test]
async fn ranks_without_groups() -> Result<(), Error> {
    let sim = Simulator::seeded(38);
    let test = ranks::<Simulator, IntShare>(&sim, &[]).await?;
    assert!(test.rank_sums.is_empty());
    assert_eq!(test.statistic, 0.0);
    assert_eq!(test.correction, 1.0);
    Ok(())
}

proptest! {
    #[test]
    fn rank_sums_partition_the_total(
        groups in proptest::collection::vec(
            proptest::collection::vec(-20i64..20, 0..8),
            1..5,
        ),
    ) {
        sotto::sim::run(async {
            let sim = Simulator::new();
            let mut shared: Vec<Vec<IntShare>> = Vec::new();
            for group in &groups {
                shared.push(input_batch(&sim, "groups", 0, group).await.unwrap());
            }

            let test = ranks(&sim, &shared).await.unwrap();

            let n: usize = groups.iter().map(Vec::len).sum();
            let total: f64 = test.rank_sums.iter().sum();
            let expected = (n * (n + 1)) as f64 / 2.0;
            assert!((total - expected).abs() < 1e-2 * (n.max(1) as f64));
            for (sum, group) in test.rank_sums.iter().zip(&groups) {
                if group.is_empty() {
                    assert_eq!(*sum, 0.0);
                }
            }
        });
    }
}
