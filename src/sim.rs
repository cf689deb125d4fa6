//! An insecure, in-process simulation of the substrate, for tests and development.
//!
//! [`Simulator`] holds every scalar as additive shares over a 61-bit Mersenne prime field
//! and evaluates nonlinear operations by reconstructing internally, computing in the clear,
//! and resharing with fresh randomness. It provides no security whatsoever — a single
//! process holds all shares — but it preserves the interface and the round structure of a
//! real runtime: linear operations are local, while every nonlinear batch, input, open, and
//! sort counts as one communication round. Tests use the [`Simulator::rounds`] counter to
//! pin down the batching behavior of the protocols.
//!
//! Fixed-point values are shares of `round(v * 2^16)`, so fixed-point comparisons and
//! equality act on the scaled representation and opened values carry a `2^-16` quantization.

use std::{
    future::Future,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use crate::substrate::{ScalarOps, Sorter, Substrate};

/// Number of simulated share-holding parties.
pub const PARTIES: usize = 3;

/// The share field, the Mersenne prime 2^61 - 1.
const FIELD: u64 = (1u64 << 61) - 1;

/// Fraction bits of the fixed-point encoding.
const FRACTION_BITS: u32 = 16;
const SCALE: i128 = 1 << FRACTION_BITS;

/// Additive shares of a secret integer, one share per simulated party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntShare([u64; PARTIES]);

/// Additive shares of a secret fixed-point number (scaled by 2^16).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixShare([u64; PARTIES]);

/// The faults a [`Simulator`] can raise.
#[derive(Debug, ThisError)]
pub enum SimFault {
    /// Batch arguments had different lengths.
    #[error("batch arguments of lengths {left} and {right} passed to {op}")]
    Shape {
        /// The operation that was called.
        op: &'static str,
        /// Length of the first argument.
        left: usize,
        /// Length of the second argument.
        right: usize,
    },
    /// An input was attributed to a party that does not exist.
    #[error("no such party: {0} (the simulator has {PARTIES} parties)")]
    UnknownParty(usize),
    /// A public divisor was zero.
    #[error("division by a public zero")]
    DivideByZero,
}

/// An insecure local substrate holding additive shares for all simulated parties at once.
///
/// The counterpart of running a real runtime's protocol suite against a dummy arithmetic
/// backend: values travel behind the secret interface, but anyone holding the `Simulator`
/// can reconstruct them. Use it to validate protocol logic and round structure only.
pub struct Simulator {
    rng: Mutex<ChaCha20Rng>,
    rounds: AtomicUsize,
}

impl Simulator {
    /// Creates a simulator with an OS-seeded RNG.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::from_os_rng()),
            rounds: AtomicUsize::new(0),
        }
    }

    /// Creates a simulator with a deterministic RNG, for reproducible tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)),
            rounds: AtomicUsize::new(0),
        }
    }

    /// The number of communication rounds a real runtime would have needed so far: one per
    /// nonlinear batch (multiplication, comparison, equality, selection, truncation), input,
    /// open, and sort. Linear operations are local and free.
    pub fn rounds(&self) -> usize {
        self.rounds.load(Ordering::Relaxed)
    }

    /// Resets the round counter, e.g. after the input phase of a test.
    pub fn reset_rounds(&self) {
        self.rounds.store(0, Ordering::Relaxed);
    }

    fn round(&self) {
        self.rounds.fetch_add(1, Ordering::Relaxed);
    }

    fn share(&self, value: i128) -> [u64; PARTIES] {
        let mut rng = self.rng.lock().expect("rng lock poisoned");
        let mut shares = [0u64; PARTIES];
        let mut acc = 0u64;
        for share in shares.iter_mut().take(PARTIES - 1) {
            *share = rng.random_range(0..FIELD);
            acc = add_mod(acc, *share);
        }
        shares[PARTIES - 1] = sub_mod(to_field(value), acc);
        shares
    }

    fn lift(shares: &[u64; PARTIES]) -> i128 {
        let mut acc = 0u64;
        for share in shares {
            acc = add_mod(acc, *share);
        }
        from_field(acc)
    }

    fn zip_shares(
        op: &'static str,
        lhs: &[[u64; PARTIES]],
        rhs: &[[u64; PARTIES]],
        f: impl Fn(u64, u64) -> u64,
    ) -> Result<Vec<[u64; PARTIES]>, SimFault> {
        check_lens(op, lhs.len(), rhs.len())?;
        Ok(lhs
            .iter()
            .zip(rhs)
            .map(|(a, b)| {
                let mut out = [0u64; PARTIES];
                for p in 0..PARTIES {
                    out[p] = f(a[p], b[p]);
                }
                out
            })
            .collect())
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

fn check_lens(op: &'static str, left: usize, right: usize) -> Result<(), SimFault> {
    if left == right {
        Ok(())
    } else {
        Err(SimFault::Shape { op, left, right })
    }
}

fn add_mod(a: u64, b: u64) -> u64 {
    ((a as u128 + b as u128) % FIELD as u128) as u64
}

fn sub_mod(a: u64, b: u64) -> u64 {
    ((a as u128 + FIELD as u128 - b as u128) % FIELD as u128) as u64
}

/// Maps a (centered) integer into the field.
fn to_field(value: i128) -> u64 {
    value.rem_euclid(FIELD as i128) as u64
}

/// Centered lift: field elements above p/2 represent negative numbers.
fn from_field(value: u64) -> i128 {
    if value > FIELD / 2 {
        value as i128 - FIELD as i128
    } else {
        value as i128
    }
}

fn encode_fix(value: f64) -> i128 {
    (value * SCALE as f64).round() as i128
}

fn decode_fix(raw: i128) -> f64 {
    raw as f64 / SCALE as f64
}

/// Lifts a known constant without randomness: party 0 holds the value, everyone else zero.
fn constant(value: i128) -> [u64; PARTIES] {
    let mut shares = [0u64; PARTIES];
    shares[0] = to_field(value);
    shares
}

impl Substrate for Simulator {
    type Fault = SimFault;
    type Int = IntShare;
    type Fix = FixShare;
}

impl ScalarOps<IntShare> for Simulator {
    type Clear = i64;

    async fn input(&self, party: usize, values: &[i64]) -> Result<Vec<IntShare>, SimFault> {
        if party >= PARTIES {
            return Err(SimFault::UnknownParty(party));
        }
        self.round();
        Ok(values
            .iter()
            .map(|v| IntShare(self.share(*v as i128)))
            .collect())
    }

    async fn known(&self, values: &[i64]) -> Result<Vec<IntShare>, SimFault> {
        Ok(values
            .iter()
            .map(|v| IntShare(constant(*v as i128)))
            .collect())
    }

    async fn add_each(&self, lhs: &[IntShare], rhs: &[IntShare]) -> Result<Vec<IntShare>, SimFault> {
        let lhs: Vec<_> = lhs.iter().map(|s| s.0).collect();
        let rhs: Vec<_> = rhs.iter().map(|s| s.0).collect();
        let out = Simulator::zip_shares("add_each", &lhs, &rhs, add_mod)?;
        Ok(out.into_iter().map(IntShare).collect())
    }

    async fn sub_each(&self, lhs: &[IntShare], rhs: &[IntShare]) -> Result<Vec<IntShare>, SimFault> {
        let lhs: Vec<_> = lhs.iter().map(|s| s.0).collect();
        let rhs: Vec<_> = rhs.iter().map(|s| s.0).collect();
        let out = Simulator::zip_shares("sub_each", &lhs, &rhs, sub_mod)?;
        Ok(out.into_iter().map(IntShare).collect())
    }

    async fn mul_each(&self, lhs: &[IntShare], rhs: &[IntShare]) -> Result<Vec<IntShare>, SimFault> {
        check_lens("mul_each", lhs.len(), rhs.len())?;
        self.round();
        Ok(lhs
            .iter()
            .zip(rhs)
            .map(|(a, b)| IntShare(self.share(Self::lift(&a.0) * Self::lift(&b.0))))
            .collect())
    }

    async fn div_pub(&self, values: &[IntShare], divisor: i64) -> Result<Vec<IntShare>, SimFault> {
        if divisor == 0 {
            return Err(SimFault::DivideByZero);
        }
        self.round();
        Ok(values
            .iter()
            .map(|v| IntShare(self.share(Self::lift(&v.0) / divisor as i128)))
            .collect())
    }

    async fn lt_each(&self, lhs: &[IntShare], rhs: &[IntShare]) -> Result<Vec<IntShare>, SimFault> {
        check_lens("lt_each", lhs.len(), rhs.len())?;
        self.round();
        Ok(lhs
            .iter()
            .zip(rhs)
            .map(|(a, b)| IntShare(self.share((Self::lift(&a.0) < Self::lift(&b.0)) as i128)))
            .collect())
    }

    async fn eq_each(&self, lhs: &[IntShare], rhs: &[IntShare]) -> Result<Vec<IntShare>, SimFault> {
        check_lens("eq_each", lhs.len(), rhs.len())?;
        self.round();
        Ok(lhs
            .iter()
            .zip(rhs)
            .map(|(a, b)| IntShare(self.share((Self::lift(&a.0) == Self::lift(&b.0)) as i128)))
            .collect())
    }

    async fn mux_each(
        &self,
        bits: &[IntShare],
        on_true: &[IntShare],
        on_false: &[IntShare],
    ) -> Result<Vec<IntShare>, SimFault> {
        check_lens("mux_each", bits.len(), on_true.len())?;
        check_lens("mux_each", bits.len(), on_false.len())?;
        self.round();
        Ok(bits
            .iter()
            .zip(on_true.iter().zip(on_false))
            .map(|(bit, (t, f))| {
                let pick = if Self::lift(&bit.0) != 0 { t } else { f };
                IntShare(self.share(Self::lift(&pick.0)))
            })
            .collect())
    }

    async fn sum(&self, values: &[IntShare]) -> Result<IntShare, SimFault> {
        let mut acc = [0u64; PARTIES];
        for v in values {
            for p in 0..PARTIES {
                acc[p] = add_mod(acc[p], v.0[p]);
            }
        }
        Ok(IntShare(acc))
    }

    async fn open(&self, values: &[IntShare]) -> Result<Vec<i64>, SimFault> {
        self.round();
        Ok(values.iter().map(|v| Self::lift(&v.0) as i64).collect())
    }
}

impl ScalarOps<FixShare> for Simulator {
    type Clear = f64;

    async fn input(&self, party: usize, values: &[f64]) -> Result<Vec<FixShare>, SimFault> {
        if party >= PARTIES {
            return Err(SimFault::UnknownParty(party));
        }
        self.round();
        Ok(values
            .iter()
            .map(|v| FixShare(self.share(encode_fix(*v))))
            .collect())
    }

    async fn known(&self, values: &[f64]) -> Result<Vec<FixShare>, SimFault> {
        Ok(values
            .iter()
            .map(|v| FixShare(constant(encode_fix(*v))))
            .collect())
    }

    async fn add_each(&self, lhs: &[FixShare], rhs: &[FixShare]) -> Result<Vec<FixShare>, SimFault> {
        let lhs: Vec<_> = lhs.iter().map(|s| s.0).collect();
        let rhs: Vec<_> = rhs.iter().map(|s| s.0).collect();
        let out = Simulator::zip_shares("add_each", &lhs, &rhs, add_mod)?;
        Ok(out.into_iter().map(FixShare).collect())
    }

    async fn sub_each(&self, lhs: &[FixShare], rhs: &[FixShare]) -> Result<Vec<FixShare>, SimFault> {
        let lhs: Vec<_> = lhs.iter().map(|s| s.0).collect();
        let rhs: Vec<_> = rhs.iter().map(|s| s.0).collect();
        let out = Simulator::zip_shares("sub_each", &lhs, &rhs, sub_mod)?;
        Ok(out.into_iter().map(FixShare).collect())
    }

    async fn mul_each(&self, lhs: &[FixShare], rhs: &[FixShare]) -> Result<Vec<FixShare>, SimFault> {
        check_lens("mul_each", lhs.len(), rhs.len())?;
        self.round();
        Ok(lhs
            .iter()
            .zip(rhs)
            .map(|(a, b)| {
                // multiply the scaled representations, then truncate back to 2^16 scaling
                let product = Self::lift(&a.0) * Self::lift(&b.0);
                let rescaled = (product + product.signum() * (SCALE / 2)) / SCALE;
                FixShare(self.share(rescaled))
            })
            .collect())
    }

    async fn div_pub(&self, values: &[FixShare], divisor: f64) -> Result<Vec<FixShare>, SimFault> {
        if divisor == 0.0 {
            return Err(SimFault::DivideByZero);
        }
        self.round();
        Ok(values
            .iter()
            .map(|v| FixShare(self.share(encode_fix(decode_fix(Self::lift(&v.0)) / divisor))))
            .collect())
    }

    async fn lt_each(&self, lhs: &[FixShare], rhs: &[FixShare]) -> Result<Vec<IntShare>, SimFault> {
        check_lens("lt_each", lhs.len(), rhs.len())?;
        self.round();
        Ok(lhs
            .iter()
            .zip(rhs)
            .map(|(a, b)| IntShare(self.share((Self::lift(&a.0) < Self::lift(&b.0)) as i128)))
            .collect())
    }

    async fn eq_each(&self, lhs: &[FixShare], rhs: &[FixShare]) -> Result<Vec<IntShare>, SimFault> {
        check_lens("eq_each", lhs.len(), rhs.len())?;
        self.round();
        Ok(lhs
            .iter()
            .zip(rhs)
            .map(|(a, b)| IntShare(self.share((Self::lift(&a.0) == Self::lift(&b.0)) as i128)))
            .collect())
    }

    async fn mux_each(
        &self,
        bits: &[IntShare],
        on_true: &[FixShare],
        on_false: &[FixShare],
    ) -> Result<Vec<FixShare>, SimFault> {
        check_lens("mux_each", bits.len(), on_true.len())?;
        check_lens("mux_each", bits.len(), on_false.len())?;
        self.round();
        Ok(bits
            .iter()
            .zip(on_true.iter().zip(on_false))
            .map(|(bit, (t, f))| {
                let pick = if Self::lift(&bit.0) != 0 { t } else { f };
                FixShare(self.share(Self::lift(&pick.0)))
            })
            .collect())
    }

    async fn sum(&self, values: &[FixShare]) -> Result<FixShare, SimFault> {
        let mut acc = [0u64; PARTIES];
        for v in values {
            for p in 0..PARTIES {
                acc[p] = add_mod(acc[p], v.0[p]);
            }
        }
        Ok(FixShare(acc))
    }

    async fn open(&self, values: &[FixShare]) -> Result<Vec<f64>, SimFault> {
        self.round();
        Ok(values
            .iter()
            .map(|v| decode_fix(Self::lift(&v.0)))
            .collect())
    }
}

impl Sorter<IntShare> for Simulator {
    async fn sort_rows(
        &self,
        keys: &[IntShare],
        payload: &[Vec<FixShare>],
    ) -> Result<(Vec<IntShare>, Vec<Vec<FixShare>>), SimFault> {
        check_lens("sort_rows", keys.len(), payload.len())?;
        self.round();
        let mut order: Vec<usize> = (0..keys.len()).collect();
        order.sort_by_key(|&i| Self::lift(&keys[i].0));
        let sorted_keys = order
            .iter()
            .map(|&i| IntShare(self.share(Self::lift(&keys[i].0))))
            .collect();
        let sorted_payload = order
            .iter()
            .map(|&i| {
                payload[i]
                    .iter()
                    .map(|v| FixShare(self.share(Self::lift(&v.0))))
                    .collect()
            })
            .collect();
        Ok((sorted_keys, sorted_payload))
    }
}

impl Sorter<FixShare> for Simulator {
    async fn sort_rows(
        &self,
        keys: &[FixShare],
        payload: &[Vec<FixShare>],
    ) -> Result<(Vec<FixShare>, Vec<Vec<FixShare>>), SimFault> {
        check_lens("sort_rows", keys.len(), payload.len())?;
        self.round();
        let mut order: Vec<usize> = (0..keys.len()).collect();
        order.sort_by_key(|&i| Self::lift(&keys[i].0));
        let sorted_keys = order
            .iter()
            .map(|&i| FixShare(self.share(Self::lift(&keys[i].0))))
            .collect();
        let sorted_payload = order
            .iter()
            .map(|&i| {
                payload[i]
                    .iter()
                    .map(|v| FixShare(self.share(Self::lift(&v.0))))
                    .collect()
            })
            .collect();
        Ok((sorted_keys, sorted_payload))
    }
}

/// Runs a protocol future to completion on a fresh single-threaded tokio runtime.
pub fn run<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("Could not start tokio runtime")
        .block_on(future)
}
