//! Rank computation with tie resolution, feeding the rank-sum (Kruskal-Wallis) statistic.
//!
//! Ranking a secret dataset obliviously is expensive; these protocols instead make one
//! audited leak — the run-boundary structure of the sorted data (see
//! [`crate::grouping::run_boundaries`]) — after which everything up to the final secure rank
//! sums is local public arithmetic. The values themselves are never revealed.
//!
//! Sorting is performed by an external collaborator ([`Sorter`]); it is a documented,
//! unchecked precondition of [`break_ties`] that its input is already sorted ascending.
//! Unsorted input yields undefined results.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    grouping::run_boundaries,
    substrate::{
        Error, ScalarOps, Sorter, Substrate, known_batch, mul_batch, open_batch, sum_of,
    },
};

/// The opened result of a rank-sum test over a grouped dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankTest {
    /// Per input group, the sum of the fractional ranks of its members. Zero for empty
    /// groups, which do not participate in the test.
    pub rank_sums: Vec<f64>,
    /// The Kruskal-Wallis statistic H = (12 / (N(N+1))) · Σ_g (R_g² / n_g) − 3(N+1), without
    /// any tie correction folded in.
    pub statistic: f64,
    /// The tie-correction factor 1 / (1 − Σ_t (t³ − t) / (N³ − N)) over the run lengths `t`
    /// of the sorted data; 1 when no ties exist. Dividing [`RankTest::statistic`] by it
    /// gives the tie-corrected statistic.
    pub correction: f64,
}

/// Public fractional ranks of an already-sorted dataset, plus the run lengths, derived from
/// the opened run boundaries. Everything here after the single comparison batch and single
/// open inside [`run_boundaries`] is local.
async fn leaky_fractional_ranks<S, T>(
    sub: &S,
    sorted: &[T],
) -> Result<(Vec<f64>, Vec<usize>), Error>
where
    S: ScalarOps<T> + ScalarOps<<S as Substrate>::Int, Clear = i64> + Sync,
    T: Clone + Send + Sync,
{
    let n = sorted.len();
    if n == 0 {
        return Ok((Vec::new(), Vec::new()));
    }
    let boundaries = run_boundaries(sub, sorted).await?;

    let mut run_lens = Vec::new();
    let mut len = 1usize;
    for differs in &boundaries {
        if *differs {
            run_lens.push(len);
            len = 1;
        } else {
            len += 1;
        }
    }
    run_lens.push(len);

    // every member of a run starting at 1-indexed position p with length k gets the
    // mid-rank p + (k-1)/2
    let mut ranks = Vec::with_capacity(n);
    let mut start = 1usize;
    for &k in &run_lens {
        let mid = start as f64 + (k as f64 - 1.0) / 2.0;
        ranks.extend(std::iter::repeat_n(mid, k));
        start += k;
    }
    Ok((ranks, run_lens))
}

/// Computes the fractional rank of every element of an already-sorted dataset, resolving
/// ties to mid-ranks: all members of a maximal equal-value run receive the arithmetic mean
/// of the integer rank positions the run spans.
///
/// Precondition (documented, unchecked): `sorted` ascends. The protocol's leak is the run
/// structure of the data — one secure equality per adjacent pair, opened in a single round —
/// after which the ranks are computed publicly and re-embedded as secret fixed-point values.
pub async fn break_ties<S, T>(sub: &S, sorted: &[T]) -> Result<Vec<S::Fix>, Error>
where
    S: ScalarOps<T>
        + ScalarOps<<S as Substrate>::Int, Clear = i64>
        + ScalarOps<<S as Substrate>::Fix, Clear = f64>
        + Sync,
    T: Clone + Send + Sync,
{
    let (ranks, _) = leaky_fractional_ranks(sub, sorted).await?;
    known_batch(sub, "rank embedding", &ranks).await
}

/// Runs the rank-sum test over a grouped dataset: fractional ranks over the concatenated,
/// externally sorted data, secure per-group rank sums, and the Kruskal-Wallis statistic over
/// the opened sums.
///
/// Group membership is public before sorting, so each element is tagged with a secret
/// one-hot row of lifted constants that the [`Sorter`] carries along; after sorting the tags
/// are secret and the per-group rank sums are computed securely (one multiplication batch,
/// one reduction per group) before being opened — the protocol's second leak, harmless
/// because the statistic derived from them is compared against a public critical value
/// anyway. Empty groups contribute a zero rank sum and are excluded from the total count N.
pub async fn ranks<S, T>(sub: &S, groups: &[Vec<T>]) -> Result<RankTest, Error>
where
    S: ScalarOps<T>
        + ScalarOps<<S as Substrate>::Int, Clear = i64>
        + ScalarOps<<S as Substrate>::Fix, Clear = f64>
        + Sorter<T>
        + Sync,
    T: Clone + Send + Sync,
{
    let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
    let n_total: usize = sizes.iter().sum();
    if n_total == 0 {
        return Ok(RankTest {
            rank_sums: vec![0.0; groups.len()],
            statistic: 0.0,
            correction: 1.0,
        });
    }
    let active: Vec<usize> = (0..groups.len()).filter(|&g| sizes[g] > 0).collect();
    debug!(n = n_total, groups = active.len(), "rank-sum test");

    // concatenate, tagging each element with a secret one-hot row over the non-empty groups
    let mut keys = Vec::with_capacity(n_total);
    let mut tags = Vec::with_capacity(n_total * active.len());
    for (slot, &g) in active.iter().enumerate() {
        for value in &groups[g] {
            keys.push(value.clone());
            for s in 0..active.len() {
                tags.push(if s == slot { 1.0 } else { 0.0 });
            }
        }
    }
    let tags: Vec<S::Fix> = known_batch(sub, "group tags", &tags).await?;
    let tag_rows: Vec<Vec<S::Fix>> = tags.chunks(active.len()).map(<[S::Fix]>::to_vec).collect();

    let (sorted_keys, sorted_tags) = <S as Sorter<T>>::sort_rows(sub, &keys, &tag_rows)
        .await
        .map_err(Error::fault("external sort"))?;

    if sorted_keys.len() != n_total
        || sorted_tags.len() != n_total
        || sorted_tags.iter().any(|row| row.len() != active.len())
    {
        return Err(Error::TruncatedBatch {
            phase: "external sort",
            expected: n_total,
            actual: sorted_keys.len().min(sorted_tags.len()),
        });
    }

    let (pub_ranks, run_lens) = leaky_fractional_ranks(sub, &sorted_keys).await?;
    let rank_handles: Vec<S::Fix> = known_batch(sub, "rank embedding", &pub_ranks).await?;

    // per-group secure rank sums: one multiplication batch across all groups, then one
    // reduction per group, opened together
    let mut lhs = Vec::with_capacity(n_total * active.len());
    let mut rhs = Vec::with_capacity(n_total * active.len());
    for slot in 0..active.len() {
        for i in 0..n_total {
            lhs.push(rank_handles[i].clone());
            rhs.push(sorted_tags[i][slot].clone());
        }
    }
    let products = mul_batch(sub, "rank-sum products", &lhs, &rhs).await?;
    let mut sums: Vec<S::Fix> = Vec::with_capacity(active.len());
    for slot in 0..active.len() {
        sums.push(sum_of(sub, "rank-sum reduction", &products[slot * n_total..(slot + 1) * n_total]).await?);
    }
    let opened = open_batch(sub, "rank sums", &sums).await?;

    let mut rank_sums = vec![0.0; groups.len()];
    for (slot, &g) in active.iter().enumerate() {
        rank_sums[g] = opened[slot];
    }

    // the statistic and the tie correction are public arithmetic over the opened sums and
    // the public run structure
    let n = n_total as f64;
    let sum_sq: f64 = active
        .iter()
        .map(|&g| rank_sums[g] * rank_sums[g] / sizes[g] as f64)
        .sum();
    let statistic = 12.0 / (n * (n + 1.0)) * sum_sq - 3.0 * (n + 1.0);
    let tie_sum: f64 = run_lens
        .iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum();
    let cubes = n * n * n - n;
    // degenerate cases (singleton data, everything tied) leave no correction to apply
    let denom = if cubes == 0.0 {
        1.0
    } else {
        1.0 - tie_sum / cubes
    };
    let correction = if denom == 0.0 { 1.0 } else { 1.0 / denom };

    Ok(RankTest {
        rank_sums,
        statistic,
        correction,
    })
}
