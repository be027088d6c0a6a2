use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{PartitionError, Period, Result};

/// A source of facts that is valid over a [`Period`].
///
/// Salary records, contract products, positions: anything the builder should
/// cut the timeline at. The concrete type doubles as the link key, so a unit
/// can ask for "all salaries" separately from "all contracts".
pub trait Spanned: Any + Send + Sync {
    fn period(&self) -> Period;
}

impl Spanned for Period {
    fn period(&self) -> Period {
        *self
    }
}

/// A type-erased handle to one source period.
///
/// Cloning is cheap; two clones refer to the same source.
#[derive(Clone)]
pub struct SourceRef {
    period: Period,
    type_id: TypeId,
    type_name: &'static str,
    handle: Arc<dyn Any + Send + Sync>,
}

impl SourceRef {
    pub fn new<T: Spanned>(source: Arc<T>) -> Self {
        Self {
            period: source.period(),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            handle: source,
        }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Spanned>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Recover the concrete source, if it is a `T`.
    pub fn downcast<T: Spanned>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.handle).downcast::<T>().ok()
    }

    /// Do both handles point at the same source instance?
    pub fn same_source(&self, other: &SourceRef) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.handle) as *const (),
            Arc::as_ptr(&other.handle) as *const (),
        )
    }
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRef")
            .field("type", &self.type_name)
            .field("period", &self.period)
            .finish()
    }
}

/// Per-unit multi-map from source type to every source period of that type
/// overlapping the unit.
#[derive(Debug, Clone)]
pub struct LinkRegistry {
    owner: Period,
    by_type: HashMap<TypeId, Vec<SourceRef>>,
}

impl LinkRegistry {
    /// An empty registry for the unit covering `owner`. The owner's bounds
    /// are only used to describe lookup failures.
    pub fn new(owner: Period) -> Self {
        Self {
            owner,
            by_type: HashMap::new(),
        }
    }

    /// Record a link. Returns `false` if this exact source was already linked.
    pub fn link(&mut self, source: SourceRef) -> bool {
        let bucket = self.by_type.entry(source.type_id).or_default();
        if bucket.iter().any(|known| known.same_source(&source)) {
            return false;
        }
        bucket.push(source);
        true
    }

    /// All linked sources of type `T`, in link order.
    pub fn iter<T: Spanned>(&self) -> impl Iterator<Item = Arc<T>> + '_ {
        self.refs::<T>().iter().filter_map(SourceRef::downcast::<T>)
    }

    /// The type-erased handles linked under `T`.
    pub fn refs<T: Spanned>(&self) -> &[SourceRef] {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn count<T: Spanned>(&self) -> usize {
        self.refs::<T>().len()
    }

    pub fn has<T: Spanned>(&self) -> bool {
        self.count::<T>() > 0
    }

    /// Number of links across all types.
    pub fn total(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    /// `(type name, count)` for every linked type.
    pub fn type_counts(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        self.by_type
            .values()
            .filter_map(|bucket| bucket.first().map(|first| (first.type_name, bucket.len())))
    }

    /// The single linked `T`, or `None`. More than one is an error: the
    /// source data is ambiguous for this unit.
    pub fn at_most_one<T: Spanned>(&self) -> Result<Option<Arc<T>>> {
        let refs = self.refs::<T>();
        match refs {
            [] => Ok(None),
            [only] => Ok(only.downcast::<T>()),
            _ => Err(PartitionError::AmbiguousLink {
                start: self.owner.start(),
                end: self.owner.end().unwrap_or(self.owner.start()),
                source_type: type_name::<T>(),
                count: refs.len(),
            }),
        }
    }

    /// The single linked `T`. Zero or more than one is an error.
    pub fn exactly_one<T: Spanned>(&self) -> Result<Arc<T>> {
        self.at_most_one::<T>()?
            .ok_or_else(|| PartitionError::MissingLink {
                start: self.owner.start(),
                end: self.owner.end().unwrap_or(self.owner.start()),
                source_type: type_name::<T>(),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
