use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;
use tracing::trace;

use crate::rule::RuleRegistry;
use crate::{FactStore, LinkRegistry, PartitionError, Period, Result, Rule, SourceRef, Spanned};

type Cached = Arc<dyn Any + Send + Sync>;

/// One closed interval of a [`Partition`](crate::Partition) in which the
/// combination of facts is constant.
///
/// Boundaries are fixed at construction. Facts, links, and rules are added
/// through `&self` afterwards, so a unit can be shared behind an `Arc` while
/// it is being populated. Once population is finished the unit can be read
/// from any number of threads.
pub struct PartitionUnit {
    start: NaiveDate,
    end: NaiveDate,
    facts: RwLock<FactStore>,
    links: RwLock<LinkRegistry>,
    rules: RwLock<RuleRegistry>,
    cache: RwLock<HashMap<TypeId, Cached>>,
}

// A panicking writer cannot leave any of the maps half-updated, so a
// poisoned lock still guards consistent data.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PartitionUnit {
    /// Create an empty unit covering `[start, end]`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let period = Period::closed(start, end)?;
        Ok(Self {
            start,
            end,
            facts: RwLock::new(FactStore::new()),
            links: RwLock::new(LinkRegistry::new(period)),
            rules: RwLock::new(RuleRegistry::default()),
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// A new unit over `[start, end]` carrying this unit's facts and rules.
    ///
    /// Links and cached results are not carried over: they describe the old
    /// boundaries.
    pub fn with_bounds(&self, start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let unit = Self::new(start, end)?;
        *write(&unit.facts) = read(&self.facts).clone();
        *write(&unit.rules) = read(&self.rules).clone();
        Ok(unit)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn period(&self) -> Period {
        Period::from_bounds(self.start, self.end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    // -- facts --------------------------------------------------------------

    /// Register a fact, replacing any previous value of the same type.
    pub fn insert_fact<T: Any + Send + Sync>(&self, value: T) -> Result<()> {
        write(&self.facts).insert(value)
    }

    /// Register `Some(value)` or remove the fact on `None`.
    pub fn set_fact<T: Any + Send + Sync>(&self, value: Option<T>) -> Result<()> {
        write(&self.facts).set(value)
    }

    pub fn remove_fact<T: Any>(&self) -> bool {
        write(&self.facts).remove::<T>()
    }

    pub fn fact<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        read(&self.facts).get::<T>()
    }

    /// The fact of type `T`, or a [`PartitionError::MissingFact`] naming this
    /// unit and the type.
    pub fn require_fact<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.fact::<T>().ok_or_else(|| self.missing::<T>())
    }

    pub fn has_fact<T: Any>(&self) -> bool {
        read(&self.facts).contains::<T>()
    }

    /// Shallow-merge `other` into this unit's facts.
    pub fn merge_facts(&self, other: &FactStore) {
        write(&self.facts).merge_from(other);
    }

    /// A snapshot of the fact store. Values are shared, not copied.
    pub fn facts(&self) -> FactStore {
        read(&self.facts).clone()
    }

    // -- links --------------------------------------------------------------

    /// Link a source period to this unit. Returns `false` if it was already
    /// linked.
    pub fn link(&self, source: SourceRef) -> bool {
        write(&self.links).link(source)
    }

    /// A snapshot of the link registry.
    pub fn links(&self) -> LinkRegistry {
        read(&self.links).clone()
    }

    /// Every linked source of type `T`.
    pub fn linked<T: Spanned>(&self) -> Vec<Arc<T>> {
        read(&self.links).iter::<T>().collect()
    }

    pub fn link_count<T: Spanned>(&self) -> usize {
        read(&self.links).count::<T>()
    }

    pub fn at_most_one_link<T: Spanned>(&self) -> Result<Option<Arc<T>>> {
        read(&self.links).at_most_one::<T>()
    }

    pub fn exactly_one_link<T: Spanned>(&self) -> Result<Arc<T>> {
        read(&self.links).exactly_one::<T>()
    }

    // -- rules --------------------------------------------------------------

    /// Register `rule` under its own type, replacing any earlier instance.
    pub fn register_rule<R: Rule>(&self, rule: R) {
        self.register_shared_rule(Arc::new(rule));
    }

    /// Register a shared rule instance under its own type.
    ///
    /// Clears every cached result on this unit, including those of rules
    /// that depend on `R`.
    pub fn register_shared_rule<R: Rule>(&self, rule: Arc<R>) {
        write(&self.rules).register(rule);
        write(&self.cache).clear();
    }

    pub fn has_rule<R: Rule>(&self) -> bool {
        read(&self.rules).contains::<R>()
    }

    pub fn rule_count(&self) -> usize {
        read(&self.rules).len()
    }

    /// Evaluate the rule registered under `R` against this unit.
    ///
    /// The first successful result is cached for the lifetime of the unit;
    /// later calls return the same `Arc` without running the rule again.
    /// Failures are not cached. No lock is held while the rule runs, so a
    /// rule may evaluate other rules on the same unit.
    pub fn evaluate<R: Rule>(&self) -> Result<Arc<R::Output>> {
        let key = TypeId::of::<R>();
        let hit = read(&self.cache).get(&key).cloned();
        if let Some(hit) = hit {
            return downcast_output::<R>(hit);
        }

        let rule = read(&self.rules)
            .get::<R>()
            .ok_or_else(|| self.missing::<R>())?;
        trace!(
            rule = type_name::<R>(),
            start = %self.start,
            end = %self.end,
            "evaluating rule"
        );
        let computed: Cached = Arc::new(rule.compute(self)?);

        let stored = Arc::clone(write(&self.cache).entry(key).or_insert(computed));
        downcast_output::<R>(stored)
    }

    /// Has `R` already been evaluated on this unit?
    pub fn is_evaluated<R: Rule>(&self) -> bool {
        read(&self.cache).contains_key(&TypeId::of::<R>())
    }

    fn missing<T: ?Sized>(&self) -> PartitionError {
        PartitionError::MissingFact {
            start: self.start,
            end: self.end,
            fact_type: type_name::<T>(),
        }
    }
}

fn downcast_output<R: Rule>(value: Cached) -> Result<Arc<R::Output>> {
    value.downcast::<R::Output>().map_err(|_| {
        PartitionError::Internal(format!(
            "cached result for {} has an unexpected type",
            type_name::<R>()
        ))
    })
}

impl fmt::Debug for PartitionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionUnit")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("facts", &*read(&self.facts))
            .field("links", &read(&self.links).total())
            .field("rules", &read(&self.rules).len())
            .finish()
    }
}

impl fmt::Display for PartitionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
