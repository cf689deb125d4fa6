//! Privacy-preserving statistics over secret-shared data.
//!
//! This crate implements the grouping, counting, and ranking protocols needed for joint
//! statistical analysis of confidential data: several parties hold secret-shared values and
//! want histograms, frequency tables, or nonparametric rank tests without revealing the raw
//! values to each other or a third party.
//!
//! The protocols are built on top of an abstract secret-sharing substrate (see [`substrate`])
//! that supplies secure arithmetic, comparisons, oblivious selection, and an explicit `open`
//! primitive. The substrate itself — shares, networking, circuit evaluation — is an external
//! collaborator; this crate only declares which of its operations are independent (batchable
//! in one communication round) and which are sequenced.
//!
//! ## Main Components
//!
//! * [`grouping`]: detects equivalence classes among secret values ([`grouping::tied_groups`])
//!   and builds frequency tables with deliberately opened counts
//!   ([`grouping::frequency_table`]).
//! * [`histogram`]: bucketed counts over secret data and secret bucket edges, in one or two
//!   dimensions, with no structural leakage at all.
//! * [`ranks`]: fractional ranks with mid-rank tie resolution and per-group rank sums feeding
//!   the rank-sum (Kruskal-Wallis) statistic.
//! * [`sim`]: an openly insecure in-process substrate holding additive shares, for tests,
//!   benchmarks, and development.
//!
//! Some protocols are *leaky* by design: they reveal more than the final requested output
//! (run boundaries of a sorted dataset, the group-size structure of a frequency table) in
//! exchange for a far cheaper protocol than a fully oblivious alternative. Every such leak
//! happens through an explicit `open` call and is documented on the operation that performs
//! it.
//!
//! ## Example
//!
//! ```
//! use sotto::{
//!     histogram::histogram_1d,
//!     sim::{IntShare, Simulator},
//!     substrate::{input_batch, open_batch, Error},
//! };
//!
//! sotto::sim::run(async {
//!     let sub = Simulator::seeded(7);
//!     // Party 0 contributes the data points, party 1 the bucket edges.
//!     let data: Vec<IntShare> = input_batch(&sub, "data", 0, &[1, 5, 7, 3, 9]).await?;
//!     let edges: Vec<IntShare> = input_batch(&sub, "edges", 1, &[0, 5, 10]).await?;
//!     let counts = histogram_1d(&sub, &edges, &data).await?;
//!     let counts = open_batch(&sub, "counts", &counts).await?;
//!     assert_eq!(counts, vec![0, 3, 2, 0]);
//!     Ok::<(), Error>(())
//! })
//! .unwrap();
//! ```
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod grouping;
pub mod histogram;
pub mod ranks;
pub mod sim;
pub mod substrate;
