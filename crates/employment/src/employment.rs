//! Employment periodization built on periodize.
//!
//! An employment relationship is recorded as a stream of change records:
//! an opening, any number of changes (degree of employment, salary class,
//! position), and eventually a closing. Records arrive unordered and may be
//! corrected by registering a newer record for the same date.
//!
//! [`EmploymentHistory::periodize`] cuts a window at every record boundary
//! and resolves, per unit, which record is *current*: the most recently
//! registered record linked to the unit that is not a closing. The result is
//! stored on each unit as a [`CurrentRecord`] fact.
//!
//! # Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use periodize::{Period, Window};
//! use periodize_employment::{ChangeKind, CurrentRecord, EmploymentHistory};
//!
//! let d = |s: &str| s.parse::<NaiveDate>().unwrap();
//! let mut history = EmploymentHistory::new();
//! history.register(ChangeKind::Opening, Period::open_ended(d("2001-01-01")), 80_u8);
//! history.register(ChangeKind::Change, Period::open_ended(d("2001-07-01")), 100_u8);
//!
//! let window = Window::new(d("2001-01-01"), d("2001-12-31")).unwrap();
//! let partition = history.periodize(window).unwrap();
//!
//! let degree = |date| {
//!     partition
//!         .unit_at(d(date))
//!         .and_then(|unit| unit.fact::<CurrentRecord<u8>>())
//!         .map(|current| current.0.payload)
//! };
//! assert_eq!(degree("2001-03-01"), Some(80));
//! assert_eq!(degree("2001-09-01"), Some(100));
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::NaiveDate;
use periodize::{Partition, PartitionBuilder, PartitionUnit, Period, Rule, Spanned, Window};
use tracing::debug;

pub use periodize::PartitionError as Error;
pub type Result<T> = std::result::Result<T, Error>;

/// What a change record does to the relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Opening,
    Change,
    Closing,
}

/// One registered change to an employment relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord<P> {
    /// Registration order. Higher means registered later.
    pub sequence: u64,
    pub kind: ChangeKind,
    pub span: Period,
    pub payload: P,
}

impl<P> ChangeRecord<P> {
    pub fn is_closing(&self) -> bool {
        self.kind == ChangeKind::Closing
    }

    pub fn valid_from(&self) -> NaiveDate {
        self.span.start()
    }
}

impl<P: Send + Sync + 'static> Spanned for ChangeRecord<P> {
    fn period(&self) -> Period {
        self.span
    }
}

/// The record in force on a partition unit.
#[derive(Debug, Clone)]
pub struct CurrentRecord<P>(pub Arc<ChangeRecord<P>>);

/// Pick the current record among those linked to one unit: closings never
/// win, and among the rest the most recently registered does.
pub fn resolve_current<P>(linked: &[Arc<ChangeRecord<P>>]) -> Option<Arc<ChangeRecord<P>>> {
    linked
        .iter()
        .filter(|record| !record.is_closing())
        .max_by_key(|record| record.sequence)
        .cloned()
}

/// Unordered change records of one employment relationship.
#[derive(Debug, Clone)]
pub struct EmploymentHistory<P> {
    records: Vec<Arc<ChangeRecord<P>>>,
    next_sequence: u64,
}

impl<P> Default for EmploymentHistory<P> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            next_sequence: 0,
        }
    }
}

impl<P: Send + Sync + 'static> EmploymentHistory<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record and return its sequence number.
    pub fn register(&mut self, kind: ChangeKind, span: Period, payload: P) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.records.push(Arc::new(ChangeRecord {
            sequence,
            kind,
            span,
            payload,
        }));
        sequence
    }

    pub fn records(&self) -> &[Arc<ChangeRecord<P>>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Partition `window` at every record boundary and attach the current
    /// record to each unit.
    ///
    /// Units whose linked records are all closings (or that link no record
    /// at all) carry no [`CurrentRecord`].
    pub fn periodize(&self, window: Window) -> Result<Partition> {
        let partition = PartitionBuilder::new(window)
            .sources(self.records.iter().cloned())
            .build()?;

        let mut employed = 0;
        for unit in &partition {
            let current = resolve_current(&unit.linked::<ChangeRecord<P>>());
            employed += usize::from(current.is_some());
            unit.set_fact(current.map(CurrentRecord))?;
        }
        debug!(
            records = self.records.len(),
            units = partition.len(),
            employed,
            "employment periodized"
        );
        Ok(partition)
    }
}

/// Does the unit have a current, non-closing record?
pub struct Employed<P>(PhantomData<fn() -> P>);

impl<P> Default for Employed<P> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<P: Send + Sync + 'static> Rule for Employed<P> {
    type Output = bool;

    fn compute(&self, unit: &PartitionUnit) -> Result<bool> {
        Ok(unit.has_fact::<CurrentRecord<P>>())
    }
}

/// Calendar days of the unit spent employed. Depends on [`Employed`].
pub struct EmployedDays<P>(PhantomData<fn() -> P>);

impl<P> Default for EmployedDays<P> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<P: Send + Sync + 'static> Rule for EmployedDays<P> {
    type Output = i64;

    fn compute(&self, unit: &PartitionUnit) -> Result<i64> {
        if *unit.evaluate::<Employed<P>>()? {
            unit.period().length()
        } else {
            Ok(0)
        }
    }
}

/// Install [`Employed`] and [`EmployedDays`] on every unit.
pub fn install_employment_rules<P: Send + Sync + 'static>(partition: &Partition) {
    partition.install_rule(Employed::<P>::default());
    partition.install_rule(EmployedDays::<P>::default());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
