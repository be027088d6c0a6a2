use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::{Partition, PartitionError, PartitionUnit, Result, SourceRef, Spanned, Window};

type LinkFilter = Box<dyn Fn(&SourceRef) -> bool + Send + Sync>;

/// Knobs for [`PartitionBuilder::build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Fail with [`PartitionError::EmptyInput`] when no source overlaps the
    /// window. When `false`, such a build yields an empty partition.
    pub require_sources: bool,
    /// Record every overlapping source in each unit's link registry. Turning
    /// this off computes boundaries only.
    pub link_sources: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            require_sources: true,
            link_sources: true,
        }
    }
}

/// Cuts a [`Window`] at every date where a source period starts or ends.
///
/// Each source contributes its start and the day after its end (the day
/// after the window for open-ended sources). Those change points are clipped
/// into the window, deduplicated, and sorted; every consecutive pair becomes
/// one closed unit. The resulting [`Partition`] is validated before any
/// source is linked to the units it overlaps.
pub struct PartitionBuilder {
    window: Window,
    options: BuildOptions,
    sources: Vec<SourceRef>,
    extra_points: Vec<NaiveDate>,
    link_filter: Option<LinkFilter>,
}

impl PartitionBuilder {
    pub fn new(window: Window) -> Self {
        Self {
            window,
            options: BuildOptions::default(),
            sources: Vec::new(),
            extra_points: Vec::new(),
            link_filter: None,
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Add one source period.
    pub fn source<T: Spanned>(self, source: T) -> Self {
        self.shared(Arc::new(source))
    }

    /// Add a source period that is already shared.
    pub fn shared<T: Spanned>(mut self, source: Arc<T>) -> Self {
        self.push(source);
        self
    }

    /// Add every source from `sources`.
    pub fn sources<T, I>(mut self, sources: I) -> Self
    where
        T: Spanned,
        I: IntoIterator<Item = Arc<T>>,
    {
        for source in sources {
            self.push(source);
        }
        self
    }

    /// Add one source period through a mutable reference.
    pub fn push<T: Spanned>(&mut self, source: Arc<T>) {
        self.sources.push(SourceRef::new(source));
    }

    /// Force an additional change point at `date`.
    ///
    /// Useful to keep a trailing "still running" era apart, or to align
    /// units with an external calendar. The point is clipped into the window
    /// like any other.
    pub fn split_at(mut self, date: NaiveDate) -> Self {
        self.extra_points.push(date);
        self
    }

    /// Only link sources accepted by `filter`. Rejected sources still shape
    /// the unit boundaries.
    pub fn with_link_filter(
        mut self,
        filter: impl Fn(&SourceRef) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.link_filter = Some(Box::new(filter));
        self
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn build(self) -> Result<Partition> {
        let window = self.window;
        let sources: Vec<SourceRef> = self
            .sources
            .into_iter()
            .filter(|source| window.overlaps(&source.period()))
            .collect();

        if sources.is_empty() {
            if self.options.require_sources {
                return Err(PartitionError::EmptyInput);
            }
            debug!(window = %window, "no sources overlap window, returning empty partition");
            return Ok(Partition::empty());
        }

        let points = change_points(&window, &sources, &self.extra_points);
        let units = points
            .windows(2)
            .map(|pair| {
                let end = pair[1].pred_opt().ok_or_else(|| {
                    PartitionError::Internal(format!("no day before change point {}", pair[1]))
                })?;
                PartitionUnit::new(pair[0], end)
            })
            .collect::<Result<Vec<_>>>()?;

        let partition = Partition::new(units)?;
        debug!(
            window = %window,
            sources = sources.len(),
            change_points = points.len(),
            units = partition.len(),
            "partition built"
        );

        if self.options.link_sources {
            let linked = sources
                .iter()
                .filter(|source| self.link_filter.as_ref().is_none_or(|keep| keep(*source)));
            link(&partition, linked);
        }
        Ok(partition)
    }
}

/// Sorted, deduplicated change points clipped into
/// `[window.start, window.end + 1 day]`.
fn change_points(window: &Window, sources: &[SourceRef], extra: &[NaiveDate]) -> Vec<NaiveDate> {
    let lower = window.start();
    let upper = window.end_exclusive();
    let mut points: Vec<NaiveDate> = sources
        .iter()
        .flat_map(|source| {
            let period = source.period();
            [period.start(), period.day_after_end().unwrap_or(upper)]
        })
        .chain(extra.iter().copied())
        .map(|date| date.clamp(lower, upper))
        .collect();
    points.sort_unstable();
    points.dedup();
    points
}

/// Link every source to each unit it overlaps. Units are sorted, so the
/// first candidate is found by binary search.
fn link<'a>(partition: &Partition, sources: impl Iterator<Item = &'a SourceRef>) {
    let units = partition.units();
    for source in sources {
        let period = source.period();
        let from = units.partition_point(|unit| unit.end() < period.start());
        for unit in units[from..]
            .iter()
            .take_while(|unit| period.end().is_none_or(|end| unit.start() <= end))
        {
            unit.link(source.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
