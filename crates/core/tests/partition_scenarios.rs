//! End-to-end behaviour of the builder and the partitions it produces.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use periodize::{
    Finding, Partition, PartitionBuilder, PartitionError, PartitionUnit, Period, Result, Rule,
    Spanned, Window,
};

#[derive(Debug)]
struct Employment(Period);

impl Spanned for Employment {
    fn period(&self) -> Period {
        self.0
    }
}

#[derive(Debug)]
struct Contract {
    span: Period,
    product: &'static str,
}

impl Spanned for Contract {
    fn period(&self) -> Period {
        self.span
    }
}

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn closed(a: &str, b: &str) -> Period {
    Period::closed(d(a), d(b)).unwrap()
}

fn year_2001() -> Window {
    Window::new(d("2001-01-01"), d("2001-12-31")).unwrap()
}

// Small deterministic generator so the property sweeps are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

fn random_periods(seed: u64, count: usize) -> Vec<Period> {
    let base = d("2000-07-01");
    let mut rng = Lcg(seed);
    (0..count)
        .map(|_| {
            let start = base + Days::new(rng.next(730));
            if rng.next(4) == 0 {
                Period::open_ended(start)
            } else {
                Period::closed(start, start + Days::new(rng.next(200))).unwrap()
            }
        })
        .collect()
}

fn build(window: Window, periods: &[Period]) -> Option<Partition> {
    let builder = periods
        .iter()
        .fold(PartitionBuilder::new(window), |builder, period| {
            builder.source(Employment(*period))
        });
    match builder.build() {
        Ok(partition) => Some(partition),
        Err(PartitionError::EmptyInput) => None,
        Err(other) => panic!("unexpected build failure: {other}"),
    }
}

#[test]
fn two_employments_with_a_break() {
    let partition = PartitionBuilder::new(year_2001())
        .source(Employment(closed("2001-01-01", "2001-06-30")))
        .source(Employment(Period::open_ended(d("2001-09-03"))))
        .build()
        .unwrap();

    assert_eq!(
        partition.boundaries(),
        vec![
            closed("2001-01-01", "2001-06-30"),
            closed("2001-07-01", "2001-09-02"),
            closed("2001-09-03", "2001-12-31"),
        ]
    );
    assert_eq!(partition.units()[0].link_count::<Employment>(), 1);
    assert_eq!(partition.units()[1].link_count::<Employment>(), 0);
    assert!(partition.units()[2]
        .exactly_one_link::<Employment>()
        .unwrap()
        .0
        .is_open_ended());
}

#[test]
fn overlapping_ready_made_units_are_rejected() {
    let first = closed("2001-01-01", "2001-06-30");
    let second = closed("2001-06-15", "2001-12-31");
    let err = Partition::new(vec![
        PartitionUnit::new(first.start(), d("2001-06-30")).unwrap(),
        PartitionUnit::new(second.start(), d("2001-12-31")).unwrap(),
    ])
    .unwrap_err();

    let message = err.to_string();
    match err {
        PartitionError::Inconsistent { findings } => {
            assert_eq!(findings, vec![Finding::Overlap { prev: first, cur: second }]);
        }
        other => panic!("expected Inconsistent, got {other:?}"),
    }
    assert!(message.contains("2001-06-15"), "{message}");
}

#[test]
fn gap_between_ready_made_units_is_31_days() {
    let err = Partition::new(vec![
        PartitionUnit::new(d("2001-01-01"), d("2001-06-30")).unwrap(),
        PartitionUnit::new(d("2001-08-01"), d("2001-12-31")).unwrap(),
    ])
    .unwrap_err();

    match err {
        PartitionError::Inconsistent { findings } => {
            assert_eq!(
                findings,
                vec![Finding::Gap {
                    prev: closed("2001-01-01", "2001-06-30"),
                    cur: closed("2001-08-01", "2001-12-31"),
                    days: 31,
                }]
            );
        }
        other => panic!("expected Inconsistent, got {other:?}"),
    }
}

#[test]
fn units_are_contiguous_and_inside_window() {
    let window = year_2001();
    for seed in 0..200 {
        let periods = random_periods(seed, 1 + (seed as usize % 12));
        let Some(partition) = build(window, &periods) else {
            continue;
        };
        for unit in &partition {
            assert!(unit.start() >= window.start(), "seed {seed}");
            assert!(unit.end() <= window.end(), "seed {seed}");
            assert!(unit.start() <= unit.end(), "seed {seed}");
        }
        for pair in partition.units().windows(2) {
            assert_eq!(
                pair[0].end().succ_opt().unwrap(),
                pair[1].start(),
                "seed {seed}"
            );
        }
    }
}

#[test]
fn rebuilding_yields_identical_boundaries() {
    let window = year_2001();
    for seed in 0..50 {
        let periods = random_periods(seed, 8);
        let mut reversed = periods.clone();
        reversed.reverse();

        let first = build(window, &periods).map(|p| p.boundaries());
        let again = build(window, &periods).map(|p| p.boundaries());
        let shuffled = build(window, &reversed).map(|p| p.boundaries());
        assert_eq!(first, again, "seed {seed}");
        assert_eq!(first, shuffled, "seed {seed}");
    }
}

#[test]
fn every_change_point_becomes_a_boundary() {
    let window = year_2001();
    for seed in 0..200 {
        let periods = random_periods(seed, 6);
        let Some(partition) = build(window, &periods) else {
            continue;
        };
        let upper = window.end() + Days::new(1);
        let mut cuts: Vec<NaiveDate> = partition.iter().map(|u| u.start()).collect();
        cuts.push(partition.last().unwrap().end() + Days::new(1));

        for period in periods.iter().filter(|p| window.overlaps(p)) {
            let start = period.start().max(window.start());
            assert!(cuts.contains(&start), "seed {seed}: start of {period}");

            let after = period.day_after_end().map_or(upper, |after| after.min(upper));
            assert!(cuts.contains(&after), "seed {seed}: end of {period}");
        }
    }
}

#[test]
fn every_unit_links_exactly_the_overlapping_sources() {
    let window = year_2001();
    for seed in 0..50 {
        let periods = random_periods(seed, 10);
        let Some(partition) = build(window, &periods) else {
            continue;
        };
        for unit in &partition {
            let expected = periods
                .iter()
                .filter(|p| window.overlaps(p) && p.overlaps(&unit.period()))
                .count();
            assert_eq!(unit.link_count::<Employment>(), expected, "seed {seed}");
        }
    }
}

struct ProductName {
    calls: Arc<AtomicUsize>,
}

impl Rule for ProductName {
    type Output = String;

    fn compute(&self, unit: &PartitionUnit) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let contract = unit.exactly_one_link::<Contract>()?;
        Ok(contract.product.to_uppercase())
    }
}

#[test]
fn rules_are_memoized_per_unit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let partition = PartitionBuilder::new(year_2001())
        .source(Contract {
            span: closed("2001-01-01", "2001-05-31"),
            product: "basic",
        })
        .source(Contract {
            span: Period::open_ended(d("2001-06-01")),
            product: "plus",
        })
        .build()
        .unwrap();
    partition.install_rule(ProductName {
        calls: Arc::clone(&calls),
    });

    let first = partition.evaluate_all::<ProductName>().unwrap();
    let second = partition.evaluate_all::<ProductName>().unwrap();

    let names: Vec<&str> = first.iter().map(|(_, name)| name.as_str()).collect();
    assert_eq!(names, vec!["BASIC", "PLUS"]);
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn ambiguous_links_surface_from_rules() {
    let partition = PartitionBuilder::new(year_2001())
        .source(Contract {
            span: closed("2001-01-01", "2001-12-31"),
            product: "basic",
        })
        .source(Contract {
            span: closed("2001-01-01", "2001-12-31"),
            product: "plus",
        })
        .build()
        .unwrap();
    partition.install_rule(ProductName {
        calls: Arc::new(AtomicUsize::new(0)),
    });

    let err = partition.evaluate_all::<ProductName>().unwrap_err();
    assert!(matches!(err, PartitionError::AmbiguousLink { count: 2, .. }));
}

#[cfg(feature = "serde")]
#[test]
fn summary_serializes_bounds_and_links() {
    let partition = PartitionBuilder::new(year_2001())
        .source(Employment(closed("2001-01-01", "2001-06-30")))
        .source(Employment(Period::open_ended(d("2001-09-03"))))
        .build()
        .unwrap();
    partition.units()[0].insert_fact(42_u32).unwrap();

    let json = serde_json::to_value(partition.summary()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "units": [
                { "start": "2001-01-01", "end": "2001-06-30", "links": { "Employment": 1 }, "facts": ["u32"] },
                { "start": "2001-07-01", "end": "2001-09-02", "links": {}, "facts": [] },
                { "start": "2001-09-03", "end": "2001-12-31", "links": { "Employment": 1 }, "facts": [] },
            ]
        })
    );
}
