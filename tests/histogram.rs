use proptest::prelude::*;
use sotto::{
    histogram::{histogram_1d, histogram_2d},
    sim::{FixShare, IntShare, Simulator},
    substrate::{Error, input_batch, open_batch},
};

#[tokio::test]
async fn histogram_int_reference_dataset() -> Result<(), Error> {
    let sim = Simulator::seeded(21);
    let data: Vec<IntShare> =
        input_batch(&sim, "data", 0, &[1, 5, 7, 3, 9, 5, 34, 5, -1, -3]).await?;
    let edges: Vec<IntShare> = input_batch(&sim, "edges", 1, &[0, 5, 10]).await?;
    let counts = histogram_1d(&sim, &edges, &data).await?;
    let counts = open_batch(&sim, "counts", &counts).await?;
    assert_eq!(counts, vec![2, 5, 2, 1]);
    Ok(())
}

#[tokio::test]
async fn histogram_fixed_reference_dataset() -> Result<(), Error> {
    let sim = Simulator::seeded(22);
    let data: Vec<FixShare> = input_batch(
        &sim,
        "data",
        0,
        &[0.1, 0.5, 0.7, 0.3, 0.9, 0.5, 3.4, 0.5, -0.1, -0.3],
    )
    .await?;
    let edges: Vec<FixShare> = input_batch(&sim, "edges", 1, &[0.0, 0.5, 1.0]).await?;
    let counts = histogram_1d(&sim, &edges, &data).await?;
    let counts = open_batch(&sim, "counts", &counts).await?;
    assert_eq!(counts, vec![2, 5, 2, 1]);
    Ok(())
}

#[tokio::test]
async fn histogram_empty_data_is_all_zero() -> Result<(), Error> {
    let sim = Simulator::seeded(23);
    let data: Vec<IntShare> = input_batch(&sim, "data", 0, &[]).await?;
    let edges: Vec<IntShare> = input_batch(&sim, "edges", 1, &[10, 20]).await?;
    let counts = histogram_1d(&sim, &edges, &data).await?;
    let counts = open_batch(&sim, "counts", &counts).await?;
    assert_eq!(counts, vec![0, 0, 0]);
    Ok(())
}

#[tokio::test]
async fn histogram_without_edges_has_one_bin() -> Result<(), Error> {
    let sim = Simulator::seeded(24);
    let data: Vec<IntShare> = input_batch(&sim, "data", 0, &[3, 1, 4, 1, 5]).await?;
    let counts = histogram_1d(&sim, &[], &data).await?;
    let counts = open_batch(&sim, "counts", &counts).await?;
    assert_eq!(counts, vec![5]);
    Ok(())
}

#[tokio::test]
async fn duplicate_edge_collapses_a_bin() -> Result<(), Error> {
    let sim = Simulator::seeded(25);
    let data: Vec<IntShare> = input_batch(&sim, "data", 0, &[1, 2, 3, 4, 5]).await?;
    let edges: Vec<IntShare> = input_batch(&sim, "edges", 1, &[3, 3]).await?;
    let counts = histogram_1d(&sim, &edges, &data).await?;
    let counts = open_batch(&sim, "counts", &counts).await?;
    assert_eq!(counts, vec![3, 0, 2]);
    Ok(())
}

#[tokio::test]
async fn two_dim_histogram_reference_dataset() -> Result<(), Error> {
    let sim = Simulator::seeded(26);
    let x: Vec<IntShare> = input_batch(&sim, "x", 0, &[1, 3, 5, 6, 7, 8]).await?;
    let y: Vec<IntShare> = input_batch(&sim, "y", 0, &[2, 4, 5, 8, 9, 10]).await?;
    let edges: Vec<IntShare> = input_batch(&sim, "edges", 1, &[1, 4, 9]).await?;

    let counts = histogram_2d(&sim, &edges, &edges, &x, &y).await?;
    let mut opened = Vec::new();
    for row in &counts {
        opened.push(open_batch(&sim, "counts", row).await?);
    }

    assert_eq!(opened[0][0], 0);
    assert_eq!(opened[1][1], 1);
    assert_eq!(opened[2][2], 3);
    let total: i64 = opened.iter().flatten().sum();
    assert_eq!(total, 6);
    Ok(())
}

#[tokio::test]
async fn two_dim_histogram_rejects_mismatched_dimensions() -> Result<(), Error> {
    let sim = Simulator::seeded(27);
    let x: Vec<IntShare> = input_batch(&sim, "x", 0, &[1, 2, 3]).await?;
    let y: Vec<IntShare> = input_batch(&sim, "y", 0, &[1, 2]).await?;
    let edges: Vec<IntShare> = input_batch(&sim, "edges", 1, &[5]).await?;
    sim.reset_rounds();

    let err = histogram_2d(&sim, &edges, &edges, &x, &y).await.unwrap_err();
    assert!(matches!(err, Error::LengthMismatch { .. }));
    // the check fails fast, before any secure computation is issued
    assert_eq!(sim.rounds(), 0);
    Ok(())
}

proptest! {
    #[test]
    fn counts_always_sum_to_the_dataset_size(
        data in proptest::collection::vec(-50i64..50, 0..20),
        mut edges in proptest::collection::vec(-50i64..50, 0..5),
    ) {
        edges.sort_unstable();
        sotto::sim::run(async {
            let sim = Simulator::new();
            let data_in: Vec<IntShare> = input_batch(&sim, "data", 0, &data).await.unwrap();
            let edges_in: Vec<IntShare> = input_batch(&sim, "edges", 1, &edges).await.unwrap();
            let counts = histogram_1d(&sim, &edges_in, &data_in).await.unwrap();
            let counts = open_batch(&sim, "counts", &counts).await.unwrap();
            assert_eq!(counts.len(), edges.len() + 1);
            assert_eq!(counts.iter().sum::<i64>(), data.len() as i64);
            assert!(counts.iter().all(|c| *c >= 0));
        });
    }
}
