use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
#[cfg(feature = "serde")]
use serde::Serialize;
use tracing::warn;

use crate::{PartitionError, PartitionUnit, Period, Result, Rule};

/// One violation of the contiguity invariant between two adjacent units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// `cur` sorts before `prev`.
    Unsorted { prev: Period, cur: Period },
    /// `prev` and `cur` share at least one day.
    Overlap { prev: Period, cur: Period },
    /// `days` calendar days lie between `prev` and `cur` uncovered.
    Gap { prev: Period, cur: Period, days: i64 },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::Unsorted { prev, cur } => write!(f, "{cur} sorts before {prev}"),
            Finding::Overlap { prev, cur } => write!(f, "{prev} overlaps {cur}"),
            Finding::Gap { prev, cur, days } => {
                write!(f, "gap of {days} days between {prev} and {cur}")
            }
        }
    }
}

// Each detector looks at one adjacent pair and reports at most one finding.
type Detector = fn(&PartitionUnit, &PartitionUnit) -> Option<Finding>;

fn unsorted(prev: &PartitionUnit, cur: &PartitionUnit) -> Option<Finding> {
    (cur.period() < prev.period()).then(|| Finding::Unsorted {
        prev: prev.period(),
        cur: cur.period(),
    })
}

fn overlap(prev: &PartitionUnit, cur: &PartitionUnit) -> Option<Finding> {
    prev.period().overlaps(&cur.period()).then(|| Finding::Overlap {
        prev: prev.period(),
        cur: cur.period(),
    })
}

fn gap(prev: &PartitionUnit, cur: &PartitionUnit) -> Option<Finding> {
    let days = (cur.start() - prev.end()).num_days() - 1;
    (days > 0).then(|| Finding::Gap {
        prev: prev.period(),
        cur: cur.period(),
        days,
    })
}

const DETECTORS: [Detector; 3] = [unsorted, overlap, gap];

/// Run every detector over every adjacent pair and collect all findings.
fn inspect(units: &[Arc<PartitionUnit>]) -> Vec<Finding> {
    DETECTORS
        .iter()
        .flat_map(|detect| {
            units
                .windows(2)
                .filter_map(move |pair| detect(&pair[0], &pair[1]))
        })
        .collect()
}

/// An ordered, contiguous, overlap-free sequence of [`PartitionUnit`]s.
///
/// Every constructor checks that the units are sorted and that each unit
/// starts exactly one day after its predecessor ends. A partition that
/// fails the check is never returned; the error lists every violation.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    units: Vec<Arc<PartitionUnit>>,
}

impl Partition {
    /// Validate and wrap freshly built units.
    pub fn new(units: Vec<PartitionUnit>) -> Result<Self> {
        Self::from_shared(units.into_iter().map(Arc::new).collect())
    }

    /// Validate and wrap units that may already be shared elsewhere.
    pub fn from_shared(units: Vec<Arc<PartitionUnit>>) -> Result<Self> {
        let findings = inspect(&units);
        if !findings.is_empty() {
            warn!(
                units = units.len(),
                findings = findings.len(),
                "rejecting inconsistent partition"
            );
            return Err(PartitionError::Inconsistent { findings });
        }
        Ok(Self { units })
    }

    /// The partition with no units.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> &[Arc<PartitionUnit>] {
        &self.units
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<PartitionUnit>> {
        self.units.iter()
    }

    pub fn first(&self) -> Option<&Arc<PartitionUnit>> {
        self.units.first()
    }

    pub fn last(&self) -> Option<&Arc<PartitionUnit>> {
        self.units.last()
    }

    /// The period from the first unit's start to the last unit's end.
    pub fn span(&self) -> Option<Period> {
        match (self.units.first(), self.units.last()) {
            (Some(first), Some(last)) => Some(Period::from_bounds(first.start(), last.end())),
            _ => None,
        }
    }

    /// Each unit's period, in order.
    pub fn boundaries(&self) -> Vec<Period> {
        self.units.iter().map(|unit| unit.period()).collect()
    }

    /// The unit covering `date`, if any.
    pub fn unit_at(&self, date: NaiveDate) -> Option<&Arc<PartitionUnit>> {
        let idx = self.units.partition_point(|unit| unit.end() < date);
        self.units.get(idx).filter(|unit| unit.contains(date))
    }

    /// Units overlapping `period`, in order.
    pub fn overlapping<'a>(
        &'a self,
        period: &'a Period,
    ) -> impl Iterator<Item = &'a Arc<PartitionUnit>> + 'a {
        let from = self.units.partition_point(|unit| unit.end() < period.start());
        self.units[from..]
            .iter()
            .take_while(move |unit| period.end().is_none_or(|end| unit.start() <= end))
    }

    /// A partition holding only the units matching `keep`.
    ///
    /// The same contiguity checks apply: dropping an interior unit while
    /// keeping its neighbours fails with a gap finding.
    pub fn restrict(&self, keep: impl Fn(&PartitionUnit) -> bool) -> Result<Partition> {
        let units = self
            .units
            .iter()
            .filter(|unit| keep(unit))
            .cloned()
            .collect();
        Self::from_shared(units)
    }

    /// Register one shared instance of `rule` on every unit.
    pub fn install_rule<R: Rule>(&self, rule: R) {
        let rule = Arc::new(rule);
        for unit in &self.units {
            unit.register_shared_rule(Arc::clone(&rule));
        }
    }

    /// Evaluate `R` on every unit, in order. Stops at the first failure.
    pub fn evaluate_all<R: Rule>(&self) -> Result<Vec<(Period, Arc<R::Output>)>> {
        self.units
            .iter()
            .map(|unit| Ok((unit.period(), unit.evaluate::<R>()?)))
            .collect()
    }

    /// A serializable snapshot of bounds and per-type link counts.
    pub fn summary(&self) -> PartitionSummary {
        PartitionSummary {
            units: self
                .units
                .iter()
                .map(|unit| UnitSummary {
                    start: unit.start(),
                    end: unit.end(),
                    links: unit
                        .links()
                        .type_counts()
                        .map(|(name, count)| (short_type_name(name).to_string(), count))
                        .collect(),
                    facts: unit
                        .facts()
                        .type_names()
                        .into_iter()
                        .map(|name| short_type_name(name).to_string())
                        .collect(),
                })
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Partition {
    type Item = &'a Arc<PartitionUnit>;
    type IntoIter = std::slice::Iter<'a, Arc<PartitionUnit>>;

    fn into_iter(self) -> Self::IntoIter {
        self.units.iter()
    }
}

// `my_crate::module::Salary` -> `Salary`; generic arguments are kept whole.
fn short_type_name(name: &str) -> &str {
    let head = name.split('<').next().unwrap_or(name);
    match head.rfind("::") {
        Some(idx) => &name[idx + 2..],
        None => name,
    }
}

/// Snapshot of a [`Partition`] for logging and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PartitionSummary {
    pub units: Vec<UnitSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct UnitSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Link count per source type name.
    pub links: BTreeMap<String, usize>,
    /// Names of the fact types present.
    pub facts: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
