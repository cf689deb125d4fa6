//! The secret-sharing substrate that evaluates the engine's protocols.
//!
//! The engine never touches shares, networks, or circuits itself. It is written against the
//! traits in this module, which an external secure-computation runtime implements. Every
//! trait method is *batched*: a single call groups operations with no data dependency, so
//! the runtime can share communication latency across them (one call ≈ one communication
//! round). Sequential stages are expressed by awaiting one batch before issuing the next;
//! independent batches may run concurrently via `futures::try_join!`.
//!
//! [`ScalarOps::open`] is the sole leakage primitive: a secret scalar becomes plaintext only
//! through an explicit open, and every protocol in this crate documents which opens it
//! performs and what they reveal.

use std::{fmt, future::Future};

use thiserror::Error as ThisError;

/// A secret-sharing runtime holding scalars as distributed shares.
///
/// The handle types are opaque: the engine never compares or branches on them directly, and
/// derived facts about the underlying values come only from the protocol operations of
/// [`ScalarOps`]. Secret bits (comparison outcomes) are represented as 0/1 secret integers,
/// i.e. [`Substrate::Int`].
pub trait Substrate {
    /// The error raised by the underlying runtime, e.g. on network failure or protocol
    /// abort. Propagated unchanged by the engine, which performs no internal retry.
    type Fault: fmt::Debug + Send;
    /// Opaque handle to a secret-shared integer.
    type Int: Clone + Send + Sync;
    /// Opaque handle to a secret-shared fixed-point number.
    type Fix: Clone + Send + Sync;
}

/// Batched secure operations on one kind of secret scalar.
///
/// A substrate implements this once for its integer handles (with `Clear = i64`) and once
/// for its fixed-point handles (with `Clear = f64`). All slice arguments of a call must have
/// equal length; the operations at equal indices are independent and evaluated as one
/// parallel batch.
pub trait ScalarOps<T>: Substrate {
    /// The plaintext type that [`ScalarOps::open`] reveals and [`ScalarOps::input`] consumes.
    type Clear: Copy + Send + Sync;

    /// Secret-shares private values held by the given party.
    fn input(
        &self,
        party: usize,
        values: &[Self::Clear],
    ) -> impl Future<Output = Result<Vec<T>, Self::Fault>> + Send;

    /// Lifts public constants to secret handles. Requires no communication.
    fn known(
        &self,
        values: &[Self::Clear],
    ) -> impl Future<Output = Result<Vec<T>, Self::Fault>> + Send;

    /// Pairwise secure addition.
    fn add_each(
        &self,
        lhs: &[T],
        rhs: &[T],
    ) -> impl Future<Output = Result<Vec<T>, Self::Fault>> + Send;

    /// Pairwise secure subtraction.
    fn sub_each(
        &self,
        lhs: &[T],
        rhs: &[T],
    ) -> impl Future<Output = Result<Vec<T>, Self::Fault>> + Send;

    /// Pairwise secure multiplication.
    fn mul_each(
        &self,
        lhs: &[T],
        rhs: &[T],
    ) -> impl Future<Output = Result<Vec<T>, Self::Fault>> + Send;

    /// Divides every value by a public constant.
    fn div_pub(
        &self,
        values: &[T],
        divisor: Self::Clear,
    ) -> impl Future<Output = Result<Vec<T>, Self::Fault>> + Send;

    /// Pairwise secure comparison, `lhs < rhs`, as secret 0/1 integers.
    fn lt_each(
        &self,
        lhs: &[T],
        rhs: &[T],
    ) -> impl Future<Output = Result<Vec<Self::Int>, Self::Fault>> + Send;

    /// Pairwise secure equality as secret 0/1 integers. Equality over a bounded share field
    /// carries a negligible false-positive probability (the substrate's statistical security
    /// parameter); the engine documents but does not handle this residual risk.
    fn eq_each(
        &self,
        lhs: &[T],
        rhs: &[T],
    ) -> impl Future<Output = Result<Vec<Self::Int>, Self::Fault>> + Send;

    /// Oblivious selection: per index, `on_true` if the bit is 1, `on_false` otherwise.
    /// Control flow is fixed; nothing about the bits is revealed.
    fn mux_each(
        &self,
        bits: &[Self::Int],
        on_true: &[T],
        on_false: &[T],
    ) -> impl Future<Output = Result<Vec<T>, Self::Fault>> + Send;

    /// Secure reduction of a sequence to its sum. An empty sequence sums to zero.
    fn sum(&self, values: &[T]) -> impl Future<Output = Result<T, Self::Fault>> + Send;

    /// Reveals plaintext values by combining shares. The sole leakage primitive; called only
    /// explicitly.
    fn open(
        &self,
        values: &[T],
    ) -> impl Future<Output = Result<Vec<Self::Clear>, Self::Fault>> + Send;
}

/// The external sorting collaborator used by rank computation.
///
/// Sorts a secret key column ascending, carrying a secret fixed-point payload row per key
/// (group-membership tags). The engine trusts the output order and does not verify it;
/// ranking over a misbehaving sorter yields undefined results.
pub trait Sorter<T>: Substrate {
    /// Returns the keys and their payload rows, reordered so the keys ascend.
    fn sort_rows(
        &self,
        keys: &[T],
        payload: &[Vec<Self::Fix>],
    ) -> impl Future<Output = Result<(Vec<T>, Vec<Vec<Self::Fix>>), Self::Fault>> + Send;
}

/// A custom error type for the statistics protocols.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The substrate runtime reported a fault (e.g. a network failure or a protocol abort)
    /// during the named protocol phase. The engine holds no partial state and performs no
    /// retry; the fault is propagated as-is.
    #[error("substrate fault during {phase}: {reason}")]
    Substrate {
        /// The protocol phase during which the fault occurred.
        phase: &'static str,
        /// The substrate's own description of the fault.
        reason: String,
    },
    /// A substrate batch returned a different number of results than requested.
    #[error("substrate returned {actual} results for a batch of {expected} during {phase}")]
    TruncatedBatch {
        /// The protocol phase that issued the batch.
        phase: &'static str,
        /// The number of operations in the batch.
        expected: usize,
        /// The number of results the substrate returned.
        actual: usize,
    },
    /// Paired sequences of different lengths were passed to a protocol that requires them to
    /// match. Rejected before any secure computation is issued.
    #[error("length mismatch in {what}: {left} vs {right}")]
    LengthMismatch {
        /// The protocol input that was malformed.
        what: &'static str,
        /// Length of the first sequence.
        left: usize,
        /// Length of the second sequence.
        right: usize,
    },
}

impl Error {
    /// Wraps a substrate fault with the protocol phase it interrupted, in the manner of
    /// `res.map_err(Error::fault("pairwise equality"))`.
    pub(crate) fn fault<E: fmt::Debug>(phase: &'static str) -> impl FnOnce(E) -> Error {
        move |e| Error::Substrate {
            phase,
            reason: format!("{e:?}"),
        }
    }
}

fn expect_len<X>(phase: &'static str, expected: usize, values: Vec<X>) -> Result<Vec<X>, Error> {
    if values.len() == expected {
        Ok(values)
    } else {
        Err(Error::TruncatedBatch {
            phase,
            expected,
            actual: values.len(),
        })
    }
}

// The free functions below pin down which `ScalarOps` impl a call goes to (a substrate
// implements the trait once per scalar kind, so plain method syntax can be ambiguous), check
// result lengths, and tag faults with the calling phase.

/// Secret-shares private values of the given party. See [`ScalarOps::input`].
pub async fn input_batch<S, T>(
    sub: &S,
    phase: &'static str,
    party: usize,
    values: &[<S as ScalarOps<T>>::Clear],
) -> Result<Vec<T>, Error>
where
    S: ScalarOps<T>,
{
    let out = <S as ScalarOps<T>>::input(sub, party, values)
        .await
        .map_err(Error::fault(phase))?;
    expect_len(phase, values.len(), out)
}

/// Lifts public constants to secret handles. See [`ScalarOps::known`].
pub async fn known_batch<S, T>(
    sub: &S,
    phase: &'static str,
    values: &[<S as ScalarOps<T>>::Clear],
) -> Result<Vec<T>, Error>
where
    S: ScalarOps<T>,
{
    let out = <S as ScalarOps<T>>::known(sub, values)
        .await
        .map_err(Error::fault(phase))?;
    expect_len(phase, values.len(), out)
}

/// One batch of pairwise secure subtractions. See [`ScalarOps::sub_each`].
pub async fn sub_batch<S, T>(
    sub: &S,
    phase: &'static str,
    lhs: &[T],
    rhs: &[T],
) -> Result<Vec<T>, Error>
where
    S: ScalarOps<T>,
{
    let out = <S as ScalarOps<T>>::sub_each(sub, lhs, rhs)
        .await
        .map_err(Error::fault(phase))?;
    expect_len(phase, lhs.len(), out)
}

/// One batch of pairwise secure multiplications. See [`ScalarOps::mul_each`].
pub async fn mul_batch<S, T>(
    sub: &S,
    phase: &'static str,
    lhs: &[T],
    rhs: &[T],
) -> Result<Vec<T>, Error>
where
    S: ScalarOps<T>,
{
    let out = <S as ScalarOps<T>>::mul_each(sub, lhs, rhs)
        .await
        .map_err(Error::fault(phase))?;
    expect_len(phase, lhs.len(), out)
}

/// One batch of pairwise secure `<` comparisons. See [`ScalarOps::lt_each`].
pub async fn lt_batch<S, T>(
    sub: &S,
    phase: &'static str,
    lhs: &[T],
    rhs: &[T],
) -> Result<Vec<<S as Substrate>::Int>, Error>
where
    S: ScalarOps<T>,
{
    let out = <S as ScalarOps<T>>::lt_each(sub, lhs, rhs)
        .await
        .map_err(Error::fault(phase))?;
    expect_len(phase, lhs.len(), out)
}

/// One batch of pairwise secure equality tests. See [`ScalarOps::eq_each`].
pub async fn eq_batch<S, T>(
    sub: &S,
    phase: &'static str,
    lhs: &[T],
    rhs: &[T],
) -> Result<Vec<<S as Substrate>::Int>, Error>
where
    S: ScalarOps<T>,
{
    let out = <S as ScalarOps<T>>::eq_each(sub, lhs, rhs)
        .await
        .map_err(Error::fault(phase))?;
    expect_len(phase, lhs.len(), out)
}

/// One batch of oblivious selections. See [`ScalarOps::mux_each`].
pub async fn mux_batch<S, T>(
    sub: &S,
    phase: &'static str,
    bits: &[<S as Substrate>::Int],
    on_true: &[T],
    on_false: &[T],
) -> Result<Vec<T>, Error>
where
    S: ScalarOps<T>,
{
    let out = <S as ScalarOps<T>>::mux_each(sub, bits, on_true, on_false)
        .await
        .map_err(Error::fault(phase))?;
    expect_len(phase, bits.len(), out)
}

/// Secure reduction of a sequence to its sum. See [`ScalarOps::sum`].
pub async fn sum_of<S, T>(sub: &S, phase: &'static str, values: &[T]) -> Result<T, Error>
where
    S: ScalarOps<T>,
{
    <S as ScalarOps<T>>::sum(sub, values)
        .await
        .map_err(Error::fault(phase))
}

/// Opens secret values to plaintext. The only way anything leaves the secret domain; every
/// caller in this crate documents what the open reveals. See [`ScalarOps::open`].
pub async fn open_batch<S, T>(
    sub: &S,
    phase: &'static str,
    values: &[T],
) -> Result<Vec<<S as ScalarOps<T>>::Clear>, Error>
where
    S: ScalarOps<T>,
{
    let out = <S as ScalarOps<T>>::open(sub, values)
        .await
        .map_err(Error::fault(phase))?;
    expect_len(phase, values.len(), out)
}
