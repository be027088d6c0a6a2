use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{PartitionUnit, Result};

/// A computation attached to a partition unit.
///
/// A rule is registered on a unit under its own type and evaluated through
/// [`PartitionUnit::evaluate`], which memoizes the output for the lifetime of
/// the unit. `compute` must therefore be pure: the same unit must always
/// yield the same output. A rule may evaluate other rules on the same unit.
///
/// ```rust
/// use periodize::{PartitionUnit, Result, Rule};
///
/// struct Days;
///
/// impl Rule for Days {
///     type Output = i64;
///
///     fn compute(&self, unit: &PartitionUnit) -> Result<i64> {
///         unit.period().length()
///     }
/// }
///
/// let unit = PartitionUnit::new(
///     "2001-01-01".parse().unwrap(),
///     "2001-01-31".parse().unwrap(),
/// )
/// .unwrap();
/// unit.register_rule(Days);
/// assert_eq!(*unit.evaluate::<Days>().unwrap(), 31);
/// ```
pub trait Rule: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    fn compute(&self, unit: &PartitionUnit) -> Result<Self::Output>;
}

/// One rule instance per rule type.
#[derive(Clone, Default)]
pub(crate) struct RuleRegistry {
    rules: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl RuleRegistry {
    pub(crate) fn register<R: Rule>(&mut self, rule: Arc<R>) {
        self.rules.insert(TypeId::of::<R>(), rule);
    }

    pub(crate) fn get<R: Rule>(&self) -> Option<Arc<R>> {
        self.rules
            .get(&TypeId::of::<R>())
            .and_then(|rule| Arc::clone(rule).downcast::<R>().ok())
    }

    pub(crate) fn contains<R: Rule>(&self) -> bool {
        self.rules.contains_key(&TypeId::of::<R>())
    }

    pub(crate) fn len(&self) -> usize {
        self.rules.len()
    }
}
