//! Bucketed histogram counting over secret data and secret bucket edges.
//!
//! The only component with zero structural leakage: bucket edges, data points, and counts
//! all stay secret, and nothing is opened internally. The caller decides when (and whether)
//! to open the counts; only then can the invariant Σ counts = |data| be checked. The price
//! of full obliviousness is O(n·k) secure comparisons (or O(n·kx·ky) products in 2D) where
//! cheaper, leaky alternatives exist for other queries.
//!
//! `k` ascending edges split the value line into `k + 1` bins that are closed at their upper
//! edge: `(-inf, e0], (e0, e1], …, (e_{k-1}, +inf)`. A point exactly equal to an edge lands
//! in the bin that edge closes. Ascending edge order is a caller invariant and is not
//! checked (a secure order check would cost comparisons and change the leakage
//! characteristics); duplicate edges simply collapse a bin to always-zero.

use tracing::debug;

use crate::substrate::{
    Error, ScalarOps, Substrate, known_batch, lt_batch, mul_batch, sub_batch, sum_of,
};

/// Per-bin membership indicator bits, `indicators[bin][point]`, for one axis.
///
/// One comparison batch of n·k secure `<` tests produces `above[j][i] = (data[i] > edges[j])`;
/// each bin indicator is the product of its two adjacent comparison outcomes (complemented
/// where the bin is upward-closed), one multiplication batch. All (point, bin) pairs are
/// mutually independent.
async fn bin_indicators<S, T>(
    sub: &S,
    edges: &[T],
    data: &[T],
) -> Result<Vec<Vec<S::Int>>, Error>
where
    S: ScalarOps<T> + ScalarOps<<S as Substrate>::Int, Clear = i64> + Sync,
    T: Clone + Send + Sync,
{
    let n = data.len();
    let k = edges.len();
    if k == 0 {
        // a single bin spanning the whole line
        let ones: Vec<S::Int> = known_batch(sub, "trivial bin", &vec![1i64; n]).await?;
        return Ok(vec![ones]);
    }

    let mut lhs = Vec::with_capacity(n * k);
    let mut rhs = Vec::with_capacity(n * k);
    for edge in edges {
        for x in data {
            lhs.push(edge.clone());
            rhs.push(x.clone());
        }
    }
    let above = lt_batch(sub, "bucket comparisons", &lhs, &rhs).await?;
    let ones: Vec<S::Int> = known_batch(sub, "indicator ones", &vec![1i64; n * k]).await?;
    let below = sub_batch(sub, "indicator complement", &ones, &above).await?;

    // middle bins: inside (e_{j-1}, e_j] iff above the lower edge and not above the upper
    let mut mul_lhs = Vec::with_capacity(n * k.saturating_sub(1));
    let mut mul_rhs = Vec::with_capacity(n * k.saturating_sub(1));
    for j in 1..k {
        mul_lhs.extend_from_slice(&above[(j - 1) * n..j * n]);
        mul_rhs.extend_from_slice(&below[j * n..(j + 1) * n]);
    }
    let middles = if k > 1 {
        mul_batch(sub, "bin indicator products", &mul_lhs, &mul_rhs).await?
    } else {
        Vec::new()
    };

    let mut indicators = Vec::with_capacity(k + 1);
    indicators.push(below[..n].to_vec());
    for j in 1..k {
        indicators.push(middles[(j - 1) * n..j * n].to_vec());
    }
    indicators.push(above[(k - 1) * n..].to_vec());
    Ok(indicators)
}

/// Counts secret data points into the `k + 1` bins bounded by `k` secret ascending edges.
///
/// Returns one secret count per bin; the counts sum to `data.len()`, which a caller can
/// verify only after opening them. Works identically for integer and fixed-point scalars.
pub async fn histogram_1d<S, T>(sub: &S, edges: &[T], data: &[T]) -> Result<Vec<S::Int>, Error>
where
    S: ScalarOps<T> + ScalarOps<<S as Substrate>::Int, Clear = i64> + Sync,
    T: Clone + Send + Sync,
{
    let bins = edges.len() + 1;
    if data.is_empty() {
        return known_batch(sub, "empty histogram", &vec![0i64; bins]).await;
    }
    debug!(n = data.len(), bins, "1d histogram");
    let indicators = bin_indicators(sub, edges, data).await?;
    let mut counts = Vec::with_capacity(bins);
    for bin in &indicators {
        counts.push(sum_of(sub, "bin count reduction", bin).await?);
    }
    Ok(counts)
}

/// Counts secret paired points `(x[i], y[i])` into a `(kx + 1) × (ky + 1)` grid of bins.
///
/// The two axis indicator computations are independent and issued concurrently; the cell
/// indicator is the secure product of the per-axis bin indicators (one extra multiplication
/// per cell per point). Returns `counts[bin_x][bin_y]`; the counts sum to the number of
/// points. Mismatched `x`/`y` lengths are rejected before any secure computation.
pub async fn histogram_2d<S, T>(
    sub: &S,
    edges_x: &[T],
    edges_y: &[T],
    x: &[T],
    y: &[T],
) -> Result<Vec<Vec<S::Int>>, Error>
where
    S: ScalarOps<T> + ScalarOps<<S as Substrate>::Int, Clear = i64> + Sync,
    T: Clone + Send + Sync,
{
    if x.len() != y.len() {
        return Err(Error::LengthMismatch {
            what: "2d histogram paired dimensions",
            left: x.len(),
            right: y.len(),
        });
    }
    let n = x.len();
    let bins_x = edges_x.len() + 1;
    let bins_y = edges_y.len() + 1;
    if n == 0 {
        let zeros: Vec<S::Int> =
            known_batch(sub, "empty histogram", &vec![0i64; bins_x * bins_y]).await?;
        return Ok(zeros.chunks(bins_y).map(<[S::Int]>::to_vec).collect());
    }
    debug!(n, bins_x, bins_y, "2d histogram");

    let (ind_x, ind_y) = futures::try_join!(
        bin_indicators(sub, edges_x, x),
        bin_indicators(sub, edges_y, y)
    )?;

    let mut lhs = Vec::with_capacity(n * bins_x * bins_y);
    let mut rhs = Vec::with_capacity(n * bins_x * bins_y);
    for jx in 0..bins_x {
        for jy in 0..bins_y {
            lhs.extend_from_slice(&ind_x[jx]);
            rhs.extend_from_slice(&ind_y[jy]);
        }
    }
    let cells = mul_batch(sub, "cell indicator products", &lhs, &rhs).await?;

    let mut counts = Vec::with_capacity(bins_x);
    for jx in 0..bins_x {
        let mut row = Vec::with_capacity(bins_y);
        for jy in 0..bins_y {
            let cell = &cells[(jx * bins_y + jy) * n..(jx * bins_y + jy + 1) * n];
            row.push(sum_of(sub, "cell count reduction", cell).await?);
        }
        counts.push(row);
    }
    Ok(counts)
}
