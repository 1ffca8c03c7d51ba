use mzbasket::engine::{
    build_hyperrectangles,
    connected_components,
    AggregationConfig,
    AggregationMode,
    ClusteringEngine,
    EngineConfig,
    MatchDimensions,
    SpatialIndex,
};
use mzbasket::models::tolerance::default_tolerances;
use mzbasket::{
    FeatureRow,
    FeatureTable,
    TableSchema,
    Tolerance,
    ToleranceMap,
};

struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn schema() -> TableSchema {
    TableSchema::new(
        vec!["PrecMz".into(), "RetTime".into(), "PrecIntensity".into()],
        vec!["UniqueFiles".into()],
    )
}

fn match_columns() -> Vec<String> {
    vec!["PrecMz".into(), "RetTime".into()]
}

fn engine(tolerances: ToleranceMap, aggregation: AggregationConfig) -> ClusteringEngine {
    let config = EngineConfig::new(match_columns(), tolerances).with_aggregation(aggregation);
    ClusteringEngine::new(config, &schema()).unwrap()
}

fn min_occurrences(n: usize) -> AggregationConfig {
    AggregationConfig {
        min_occurrences: n,
        ..Default::default()
    }
}

fn table(values: &[(f64, f64)]) -> FeatureTable {
    let rows = values
        .iter()
        .enumerate()
        .map(|(i, (mz, rt))| FeatureRow::new(vec![*mz, *rt, 1e4], vec![format!("f{}.csv", i)]))
        .collect();
    FeatureTable::try_from_rows(schema(), rows).unwrap()
}

fn random_values(seed: u64, n: usize) -> Vec<(f64, f64)> {
    let mut rng = Lcg(seed);
    (0..n)
        .map(|_| (200.0 + rng.next_f64() * 2.0, rng.next_f64() * 10.0))
        .collect()
}

fn components(table: &FeatureTable, tolerances: &ToleranceMap) -> Vec<Vec<usize>> {
    let dims = MatchDimensions::resolve(table.schema(), &match_columns(), tolerances).unwrap();
    let built = build_hyperrectangles(table, &dims).unwrap();
    let index = SpatialIndex::bulk_load(&built.rects, 8).unwrap();
    connected_components(&built.rects, &index)
        .into_iter()
        .map(|c| c.members)
        .collect()
}

// Quadratic union-find reference.
fn reference_components(table: &FeatureTable, tolerances: &ToleranceMap) -> Vec<Vec<usize>> {
    let dims = MatchDimensions::resolve(table.schema(), &match_columns(), tolerances).unwrap();
    let rects: Vec<_> = table
        .rows()
        .iter()
        .enumerate()
        .map(|(i, r)| mzbasket::engine::row_hyperrectangle(r, i, &dims).unwrap())
        .collect();
    let n = rects.len();
    let mut parent: Vec<usize> = (0..n).collect();
    fn find(parent: &mut [usize], x: usize) -> usize {
        let mut x = x;
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let overlap = rects[i]
                .iter()
                .zip(rects[j].iter())
                .all(|(a, b)| a.intersects(*b));
            if overlap {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                parent[ri.max(rj)] = ri.min(rj);
            }
        }
    }
    let mut groups: std::collections::BTreeMap<usize, Vec<usize>> = Default::default();
    for i in 0..n {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(i);
    }
    let mut out: Vec<Vec<usize>> = groups.into_values().collect();
    out.sort_by_key(|g| g[0]);
    out
}

#[test]
fn test_partition_property() {
    let table = table(&random_values(1, 1500));
    let tolerances = default_tolerances();
    let comps = components(&table, &tolerances);

    let mut all: Vec<usize> = comps.iter().flatten().copied().collect();
    all.sort_unstable();
    assert_eq!(all, (0..table.len()).collect::<Vec<_>>());
    assert!(comps.iter().any(|c| c.len() > 1));
    assert!(comps.windows(2).all(|w| w[0][0] < w[1][0]));
}

#[test]
fn test_components_match_pairwise_reference() {
    for seed in [3, 5, 8] {
        let table = table(&random_values(seed, 600));
        let tolerances = default_tolerances();
        assert_eq!(
            components(&table, &tolerances),
            reference_components(&table, &tolerances)
        );
    }
}

#[test]
fn test_threshold_property() {
    // Sizes 1, 2 and 3, far apart from each other.
    let table = table(&[
        (100.0, 1.0),
        (200.0, 1.0),
        (200.0, 1.01),
        (300.0, 1.0),
        (300.0, 1.01),
        (300.0, 1.02),
    ]);
    for (min, expected) in [(1, vec![1, 2, 3]), (2, vec![2, 3]), (3, vec![3]), (4, vec![])] {
        let out = engine(default_tolerances(), min_occurrences(min))
            .run(&table)
            .unwrap();
        let sizes: Vec<usize> = out.consensus.rows.iter().map(|r| r.occurrences).collect();
        assert_eq!(sizes, expected, "min_occurrences = {}", min);
    }
}

#[test]
fn test_determinism() {
    let table = table(&random_values(11, 2000));
    let engine = engine(
        default_tolerances(),
        AggregationConfig {
            mode: AggregationMode::Range,
            ..min_occurrences(2)
        },
    );
    let first = engine.run(&table).unwrap();
    for _ in 0..3 {
        let again = engine.run(&table).unwrap();
        assert_eq!(again.consensus, first.consensus);
    }

    // Same result when many runs share the engine from different threads.
    let (engine, table) = (&engine, &table);
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(move || engine.run(table).unwrap()))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap().consensus, first.consensus);
        }
    });
}

#[test]
fn test_boundary_inclusivity() {
    let mut tolerances = ToleranceMap::new();
    tolerances.insert("PrecMz".into(), Tolerance::Window(0.5));
    tolerances.insert("RetTime".into(), Tolerance::None);
    // [99.5, 100.5] and [100.5, 101.5] touch at 100.5.
    let table = table(&[(100.0, 1.0), (101.0, 1.0)]);
    let out = engine(tolerances, min_occurrences(1)).run(&table).unwrap();
    assert_eq!(out.consensus.len(), 1);
    assert_eq!(out.consensus.rows[0].occurrences, 2);
}

#[test]
fn test_ppm_tolerance_correctness() {
    let mut tolerances = ToleranceMap::new();
    tolerances.insert("PrecMz".into(), Tolerance::Ppm(30.0));
    tolerances.insert("RetTime".into(), Tolerance::None);
    assert!((Tolerance::Ppm(30.0).half_width(100.0) - 0.003).abs() < 1e-12);

    // Every row carries its own window, so two rows merge when they are
    // within the sum of both half-widths.
    let reference = Tolerance::Ppm(30.0).range(100.0).unwrap();
    assert!(reference.contains(100.0029));
    assert!(!reference.contains(100.0031));

    let engine = engine(tolerances, min_occurrences(1));
    let near = engine.run(&table(&[(100.0, 1.0), (100.0029, 1.0)])).unwrap();
    assert_eq!(near.consensus.len(), 1);
    let far = engine.run(&table(&[(100.0, 1.0), (100.0061, 1.0)])).unwrap();
    assert_eq!(far.consensus.len(), 2);
}

#[test]
fn test_mean_mode_aggregation() {
    let table = table(&[(10.0, 1.0), (10.2, 1.0), (9.8, 1.0)]);
    let mut tolerances = ToleranceMap::new();
    tolerances.insert("PrecMz".into(), Tolerance::Window(0.5));
    tolerances.insert("RetTime".into(), Tolerance::Window(0.1));
    let out = engine(tolerances, min_occurrences(3)).run(&table).unwrap();
    assert_eq!(out.consensus.len(), 1);
    let row = &out.consensus.rows[0];
    assert!((row.numeric[0] - 10.0).abs() < 1e-9);
    assert_eq!(row.occurrences, 3);
    assert_eq!(row.text[0], "f0.csv|f1.csv|f2.csv");
}

#[test]
fn test_range_mode_aggregation() {
    let table = table(&[(10.0, 1.0), (10.2, 1.0), (9.8, 1.0)]);
    let mut tolerances = ToleranceMap::new();
    tolerances.insert("PrecMz".into(), Tolerance::Window(0.5));
    tolerances.insert("RetTime".into(), Tolerance::Window(0.1));
    let out = engine(
        tolerances,
        AggregationConfig {
            mode: AggregationMode::Range,
            ..min_occurrences(1)
        },
    )
    .run(&table)
    .unwrap();
    let row = &out.consensus.rows[0];
    assert_eq!(out.consensus.schema.range_columns, vec!["PrecMz", "RetTime"]);
    let mz = row.extents[0].unwrap();
    assert_eq!(mz.start(), 9.8);
    assert_eq!(mz.end(), 10.2);
    assert!((row.numeric[0] - 10.0).abs() < 1e-9);
}

#[test]
fn test_non_finite_guard() {
    let table = table(&[(100.0, 1.0), (f64::NAN, 1.0), (100.0, 1.0)]);
    let out = engine(default_tolerances(), min_occurrences(1))
        .run(&table)
        .unwrap();
    assert_eq!(out.rejected.len(), 1);
    assert_eq!(out.rejected[0].row(), 1);
    assert_eq!(out.consensus.len(), 1);
    assert_eq!(out.consensus.rows[0].occurrences, 2);
    assert_eq!(out.consensus.rows[0].text[0], "f0.csv|f2.csv");
}

#[test]
fn test_two_stage_consistency() {
    let mut tolerances = ToleranceMap::new();
    tolerances.insert("PrecMz".into(), Tolerance::Window(0.01));
    tolerances.insert("RetTime".into(), Tolerance::Window(0.03));
    let replicate = engine(tolerances.clone(), min_occurrences(1));
    let basket = engine(
        tolerances,
        AggregationConfig {
            mode: AggregationMode::Range,
            ..min_occurrences(1)
        },
    );

    // Within twice the tolerance of a neighbour: 0.015 <= 0.02.
    // Further than twice the tolerance from everything: 0.035 > 0.02.
    let samples = [(100.0, 2.0), (100.015, 2.0), (100.05, 2.0), (100.2, 2.0)];
    let per_sample: Vec<FeatureTable> = samples
        .iter()
        .map(|v| {
            let out = replicate.run(&table(&[*v])).unwrap();
            assert_eq!(out.consensus.len(), 1);
            assert_eq!(out.consensus.rows[0].numeric[0], v.0);
            out.consensus.into_feature_table()
        })
        .collect();

    let out = mzbasket::batch::basket_tables(per_sample, &basket).unwrap();
    let groups: Vec<(f64, f64)> = out
        .consensus
        .rows
        .iter()
        .map(|r| {
            let e = r.extents[0].unwrap();
            (e.start(), e.end())
        })
        .collect();
    assert_eq!(
        groups,
        vec![(100.0, 100.015), (100.05, 100.05), (100.2, 100.2)]
    );
}
