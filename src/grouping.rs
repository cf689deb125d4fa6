//! Equality and grouping protocols: oblivious tie detection and the leaky frequency table.
//!
//! Both operations discover which positions of a dataset hold equal values without revealing
//! the values. [`tied_groups`] is fully oblivious (nothing is opened); [`frequency_table`]
//! deliberately opens the group-size structure in exchange for avoiding an oblivious sort
//! and compaction.

use tracing::debug;

use crate::substrate::{
    Error, ScalarOps, Substrate, eq_batch, known_batch, mux_batch, open_batch, sum_of,
};

/// Secure equality bits for all unordered position pairs, stored as a symmetric matrix
/// without a diagonal. A single comparison batch: all pairs are independent.
pub(crate) struct EqMatrix<B> {
    n: usize,
    bits: Vec<B>,
}

impl<B> EqMatrix<B> {
    pub(crate) fn get(&self, i: usize, j: usize) -> &B {
        debug_assert!(i != j && i < self.n && j < self.n);
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        &self.bits[i * self.n - i * (i + 1) / 2 + (j - i - 1)]
    }
}

pub(crate) async fn pairwise_eq<S, T>(sub: &S, values: &[T]) -> Result<EqMatrix<S::Int>, Error>
where
    S: ScalarOps<T> + Sync,
    T: Clone + Send + Sync,
{
    let n = values.len();
    let mut lhs = Vec::with_capacity(n * (n - 1) / 2);
    let mut rhs = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            lhs.push(values[i].clone());
            rhs.push(values[j].clone());
        }
    }
    debug!(n, pairs = lhs.len(), "pairwise equality batch");
    let bits = eq_batch(sub, "pairwise equality", &lhs, &rhs).await?;
    Ok(EqMatrix { n, bits })
}

/// Opens the run-boundary structure of a sorted dataset: one secure equality per adjacent
/// pair (a single batch, all pairs independent), then a single open of all the bits.
/// Returns one `bool` per adjacent pair, `true` iff the pair differs.
///
/// This is the audited leak shared by the ranking protocols: it reveals the partition of a
/// sorted dataset into maximal equal-value runs, never the values themselves. The caller is
/// responsible for the input actually being sorted.
pub(crate) async fn run_boundaries<S, T>(sub: &S, sorted: &[T]) -> Result<Vec<bool>, Error>
where
    S: ScalarOps<T> + ScalarOps<<S as Substrate>::Int, Clear = i64> + Sync,
    T: Clone + Send + Sync,
{
    let n = sorted.len();
    if n <= 1 {
        return Ok(Vec::new());
    }
    let ties = eq_batch(sub, "adjacent equality", &sorted[..n - 1], &sorted[1..]).await?;
    let opened = open_batch(sub, "run boundaries", &ties).await?;
    debug!(n, runs = opened.iter().filter(|b| **b == 0).count() + 1, "opened run boundaries");
    Ok(opened.into_iter().map(|b| b == 0).collect())
}

/// Assigns a secret group id to every position such that two positions receive equal ids iff
/// they hold equal values (up to the substrate's negligible equality error).
///
/// The id is the *canonical representative* of the position's equivalence class: the value
/// at the smallest tied index, selected by folding an oblivious multiplexer over the
/// positions from last to first. One equality batch over all unordered pairs, then `n - 1`
/// multiplexer batches; O(n²) equality tests and O(n²) multiplexer calls in total. Fully
/// oblivious: nothing is opened, and the ids themselves stay secret.
pub async fn tied_groups<S, T>(sub: &S, values: &[T]) -> Result<Vec<T>, Error>
where
    S: ScalarOps<T> + Sync,
    T: Clone + Send + Sync,
{
    let n = values.len();
    if n <= 1 {
        return Ok(values.to_vec());
    }
    let eq = pairwise_eq(sub, values).await?;

    // Multiplexer fold towards the smallest tied index: after processing column j, every
    // accumulator i > j holds the value at the smallest index >= j tied with position i.
    let mut acc: Vec<T> = values.to_vec();
    for j in (0..n - 1).rev() {
        let targets: Vec<usize> = ((j + 1)..n).collect();
        let bits: Vec<S::Int> = targets.iter().map(|&i| eq.get(j, i).clone()).collect();
        let on_true: Vec<T> = vec![values[j].clone(); targets.len()];
        let on_false: Vec<T> = targets.iter().map(|&i| acc[i].clone()).collect();
        let selected = mux_batch(sub, "representative select", &bits, &on_true, &on_false).await?;
        for (&i, v) in targets.iter().zip(selected) {
            acc[i] = v;
        }
    }
    Ok(acc)
}

/// Builds a frequency table: one entry per distinct value, pairing the (still secret) value
/// with its public occurrence count.
///
/// Reuses the pairwise equality bits of [`tied_groups`]: for every position the number of
/// equal positions is counted securely, along with a first-occurrence flag (does any earlier
/// position hold an equal value?), and both are opened in a single batch.
///
/// This is the component's explicit leak: the opened counts and flags reveal, for each
/// position, the size of its group and whether it is the first member — the group-size
/// structure of the dataset — but never which value a group holds. The alternative, an
/// oblivious sort plus compaction, would cost far more; callers who cannot afford the leak
/// should not use a frequency table at all.
pub async fn frequency_table<S, T>(sub: &S, values: &[T]) -> Result<Vec<(T, usize)>, Error>
where
    S: ScalarOps<T> + ScalarOps<<S as Substrate>::Int, Clear = i64> + Sync,
    T: Clone + Send + Sync,
{
    let n = values.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    if n == 1 {
        return Ok(vec![(values[0].clone(), 1)]);
    }
    let eq = pairwise_eq(sub, values).await?;

    // Per position: the number of *other* equal positions (the diagonal is added publicly
    // after opening) and, for every position but the first, the number of *earlier* equal
    // positions. Sums are linear, so this is communication-free.
    let mut tie_counts: Vec<S::Int> = Vec::with_capacity(n);
    for i in 0..n {
        let row: Vec<S::Int> = (0..n)
            .filter(|&j| j != i)
            .map(|j| eq.get(i, j).clone())
            .collect();
        tie_counts.push(sum_of(sub, "tie count reduction", &row).await?);
    }
    let mut preceding: Vec<S::Int> = Vec::with_capacity(n - 1);
    for i in 1..n {
        let row: Vec<S::Int> = (0..i).map(|j| eq.get(j, i).clone()).collect();
        preceding.push(sum_of(sub, "first-occurrence reduction", &row).await?);
    }

    // A position is a first occurrence iff no earlier position ties with it.
    let zeros: Vec<S::Int> = known_batch(sub, "first-occurrence zeros", &vec![0i64; n - 1]).await?;
    let firsts = eq_batch(sub, "first-occurrence flags", &preceding, &zeros).await?;

    // The deliberate leak: counts and flags are opened together, in one round.
    let mut to_open = tie_counts;
    to_open.extend(firsts);
    let opened = open_batch(sub, "frequency counts", &to_open).await?;
    let (counts, flags) = opened.split_at(n);
    debug!(n, "opened frequency structure");

    let mut table = Vec::new();
    for (i, value) in values.iter().enumerate() {
        let first = i == 0 || flags[i - 1] != 0;
        if first {
            table.push((value.clone(), counts[i] as usize + 1));
        }
    }
    Ok(table)
}
