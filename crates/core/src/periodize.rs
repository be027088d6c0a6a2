//! Periodize — gap-free time partitioning with per-interval facts.
//!
//! Facts about a contract, a position, or a salary arrive as independently
//! maintained [`Period`]s whose boundaries never line up. The
//! [`PartitionBuilder`] cuts an observation [`Window`] at every date where
//! any of those facts changes and returns a [`Partition`]: an ordered,
//! contiguous, overlap-free sequence of closed [`PartitionUnit`]s. Within one
//! unit the combination of facts is constant.
//!
//! Each unit carries three things:
//!
//! - a [`FactStore`] of typed values valid for the whole unit,
//! - a [`LinkRegistry`] back to every source period that overlaps it,
//! - a rule registry plus result cache driving [`PartitionUnit::evaluate`].
//!
//! # Quick start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use periodize::{Period, PartitionBuilder, Spanned, Window};
//!
//! #[derive(Debug)]
//! struct Employment(Period);
//!
//! impl Spanned for Employment {
//!     fn period(&self) -> Period {
//!         self.0
//!     }
//! }
//!
//! let d = |m, day| NaiveDate::from_ymd_opt(2001, m, day).unwrap();
//! let window = Window::new(d(1, 1), d(12, 31)).unwrap();
//!
//! let partition = PartitionBuilder::new(window)
//!     .source(Employment(Period::closed(d(1, 1), d(6, 30)).unwrap()))
//!     .source(Employment(Period::open_ended(d(9, 3))))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(partition.len(), 3);
//! assert_eq!(partition.units()[1].links().count::<Employment>(), 0);
//! ```

mod builder;
mod fact_store;
mod link_registry;
mod partition;
mod period;
mod rule;
mod unit;

use chrono::NaiveDate;

pub use builder::{BuildOptions, PartitionBuilder};
pub use fact_store::FactStore;
pub use link_registry::{LinkRegistry, SourceRef, Spanned};
pub use partition::{Finding, Partition, PartitionSummary, UnitSummary};
pub use period::{Period, Window, HORIZON};
pub use rule::Rule;
pub use unit::PartitionUnit;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error("invalid period: end {end} is before start {start}")]
    InvalidPeriod { start: NaiveDate, end: NaiveDate },
    #[error("period {0} is open-ended")]
    OpenEnded(Period),
    #[error("cannot build a partition from zero source periods")]
    EmptyInput,
    #[error("inconsistent partition: {}", render_findings(.findings))]
    Inconsistent { findings: Vec<Finding> },
    #[error("required fact missing on [{start}, {end}]: {fact_type}")]
    MissingFact {
        start: NaiveDate,
        end: NaiveDate,
        fact_type: &'static str,
    },
    #[error("no {source_type} linked to [{start}, {end}]")]
    MissingLink {
        start: NaiveDate,
        end: NaiveDate,
        source_type: &'static str,
    },
    #[error("expected at most one {source_type} on [{start}, {end}], found {count}")]
    AmbiguousLink {
        start: NaiveDate,
        end: NaiveDate,
        source_type: &'static str,
        count: usize,
    },
    #[error("refusing to store optional value as a fact: {fact_type}")]
    OptionalFact { fact_type: &'static str },
    #[error("internal error: {0}")]
    Internal(String),
}

fn render_findings(findings: &[Finding]) -> String {
    findings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, PartitionError>;
