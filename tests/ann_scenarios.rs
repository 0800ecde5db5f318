use std::sync::Arc;
use std::time::Duration;

use annflow::error::{AnnflowError, Result};
use annflow::vector::{
    self, DistanceMetric, Evaluator, GroundTruth, IndexBuildConfig, IndexBuilder, IndexStrategy,
    IvfPqConfig, RpForestConfig, SearchEngine, SearchParams, SearchStatus, Vector, VectorStore,
};
use rand::prelude::*;
use rand::rngs::StdRng;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn square_vectors() -> Vec<Vector> {
    vec![
        Vector::new(vec![0.0, 0.0]),
        Vector::new(vec![1.0, 0.0]),
        Vector::new(vec![0.0, 1.0]),
        Vector::new(vec![10.0, 10.0]),
    ]
}

fn random_vectors(count: usize, dimension: usize, seed: u64) -> Vec<Vector> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| Vector::new((0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect()))
        .collect()
}

/// `clusters` tight gaussian-ish blobs around random centers.
fn clustered_vectors(clusters: usize, per_cluster: usize, dimension: usize, seed: u64) -> Vec<Vector> {
    let mut rng = StdRng::seed_from_u64(seed);
    let centers: Vec<Vec<f32>> = (0..clusters)
        .map(|_| (0..dimension).map(|_| rng.random_range(-10.0..10.0)).collect())
        .collect();
    let mut vectors = Vec::with_capacity(clusters * per_cluster);
    for center in &centers {
        for _ in 0..per_cluster {
            vectors.push(Vector::new(
                center
                    .iter()
                    .map(|c| c + rng.random_range(-0.5..0.5))
                    .collect(),
            ));
        }
    }
    vectors
}

fn brute_force(vectors: &[Vector], query: &Vector, k: usize, metric: DistanceMetric) -> Vec<usize> {
    let mut scored: Vec<(f32, usize)> = vectors
        .iter()
        .enumerate()
        .map(|(id, v)| (metric.distance(&query.data, &v.data).unwrap(), id))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    scored.into_iter().take(k).map(|(_, id)| id).collect()
}

fn ivf_config() -> IndexBuildConfig {
    IndexBuildConfig::new(IndexStrategy::IvfPq(IvfPqConfig {
        n_clusters: 8,
        n_subvectors: 4,
        codebook_size: 32,
        n_probe: 2,
        ..IvfPqConfig::default()
    }))
    .with_threads(4)
}

fn forest_config() -> IndexBuildConfig {
    IndexBuildConfig::new(IndexStrategy::RpForest(RpForestConfig {
        n_trees: 8,
        leaf_size: 16,
        search_k: None,
    }))
    .with_threads(4)
}

#[test]
fn exhaustive_search_breaks_ties_by_id() -> Result<()> {
    init_logging();
    let index = vector::build(square_vectors(), IndexBuildConfig::default())?;

    let result = vector::search(&index, &Vector::new(vec![0.0, 0.0]), 2, &SearchParams::default())?;
    assert_eq!(result.status, SearchStatus::Complete);
    assert_eq!(result.ids(), vec![0, 1]);
    assert_eq!(result.neighbors[0].distance, 0.0);
    assert_eq!(result.neighbors[1].distance, 1.0);
    Ok(())
}

#[test]
fn k_larger_than_store_returns_everything() -> Result<()> {
    let index = vector::build(square_vectors(), IndexBuildConfig::default())?;

    let result = vector::search(&index, &Vector::new(vec![0.0, 0.0]), 10, &SearchParams::default())?;
    assert_eq!(result.ids(), vec![0, 1, 2, 3]);
    Ok(())
}

#[test]
fn ivf_pq_k_larger_than_store_depends_on_probed_lists() -> Result<()> {
    let vectors = clustered_vectors(4, 50, 8, 21);
    let config = IndexBuildConfig::new(IndexStrategy::IvfPq(IvfPqConfig {
        n_clusters: 4,
        n_subvectors: 2,
        codebook_size: 16,
        n_probe: 1,
        ..IvfPqConfig::default()
    }));
    let index = vector::build(vectors.clone(), config)?;

    let narrow = vector::search(&index, &vectors[0], 1_000, &SearchParams::default())?;
    assert!(narrow.len() < index.size());
    assert_eq!(narrow.status, SearchStatus::Incomplete);

    let wide = SearchParams::new().with_n_probe(4);
    let result = vector::search(&index, &vectors[0], 1_000, &wide)?;
    assert_eq!(result.len(), index.size());
    assert_eq!(result.status, SearchStatus::Complete);
    Ok(())
}

#[test]
fn rp_forest_k_larger_than_store_depends_on_search_k() -> Result<()> {
    let vectors = clustered_vectors(4, 50, 8, 22);
    let index = vector::build(vectors.clone(), forest_config())?;

    // The default budget of n_trees * k covers the whole store.
    let result = vector::search(&index, &vectors[0], 1_000, &SearchParams::default())?;
    assert_eq!(result.len(), index.size());
    assert_eq!(result.status, SearchStatus::Complete);

    let small = SearchParams::new().with_search_k(10);
    let result = vector::search(&index, &vectors[0], 1_000, &small)?;
    assert!(result.len() >= 10 && result.len() < index.size());
    assert_eq!(result.status, SearchStatus::Incomplete);
    Ok(())
}

#[test]
fn cancelling_a_running_build_returns_cancelled() -> Result<()> {
    init_logging();
    let store = VectorStore::from_vectors(random_vectors(20_000, 32, 31))?;
    let configs = [
        IndexBuildConfig::new(IndexStrategy::RpForest(RpForestConfig {
            n_trees: 400,
            leaf_size: 8,
            search_k: None,
        })),
        IndexBuildConfig::new(IndexStrategy::IvfPq(IvfPqConfig {
            n_clusters: 256,
            n_subvectors: 8,
            max_iterations: 1_000,
            ..IvfPqConfig::default()
        })),
    ];

    for config in configs {
        let builder = IndexBuilder::new(config.with_threads(1))?;
        let token = builder.cancellation_token();
        let result = std::thread::scope(|scope| {
            scope.spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                token.cancel();
            });
            builder.build(&store)
        });
        assert!(matches!(result, Err(AnnflowError::Cancelled(_))));
    }
    Ok(())
}

#[test]
fn exhaustive_search_matches_brute_force() -> Result<()> {
    let vectors = random_vectors(100, 8, 7);
    let queries = random_vectors(10, 8, 8);

    for metric in [
        DistanceMetric::Euclidean,
        DistanceMetric::Cosine,
        DistanceMetric::InnerProduct,
        DistanceMetric::Manhattan,
    ] {
        let index = vector::build(vectors.clone(), IndexBuildConfig::default().with_metric(metric))?;
        for query in &queries {
            let result = vector::search(&index, query, 5, &SearchParams::default())?;
            assert_eq!(result.ids(), brute_force(&vectors, query, 5, metric), "{metric}");
            assert!(
                result
                    .neighbors
                    .windows(2)
                    .all(|w| w[0].distance <= w[1].distance)
            );
        }
    }
    Ok(())
}

#[test]
fn approximate_strategies_reach_high_recall_on_clustered_data() -> Result<()> {
    init_logging();
    let vectors = clustered_vectors(8, 100, 16, 11);
    let store = VectorStore::from_vectors(vectors.clone())?;
    let queries: Vec<Vector> = (0..40).map(|i| vectors[i * 20].clone()).collect();

    let exact = SearchEngine::new();
    exact.rebuild(&store, &IndexBuilder::new(IndexBuildConfig::default())?)?;
    let truth = GroundTruth::new(
        exact
            .search_batch(&queries, 10, &SearchParams::default())?
            .into_iter()
            .map(|r| r.ids())
            .collect(),
    );

    // Residuals inside a blob are pure noise, so rank the ADC shortlist exactly.
    let refined = IndexBuildConfig::new(IndexStrategy::IvfPq(IvfPqConfig {
        n_clusters: 8,
        n_subvectors: 4,
        codebook_size: 32,
        refine_factor: 10,
        ..IvfPqConfig::default()
    }));
    let ivf = SearchEngine::new();
    ivf.rebuild(&store, &IndexBuilder::new(refined)?)?;
    let report = Evaluator::new(10)
        .with_request_size(8)
        .with_params(SearchParams::new().with_n_probe(8))
        .evaluate(&ivf, &queries, &truth)?;
    assert!(report.recall >= 0.8, "ivf recall {}", report.recall);
    assert_eq!(report.queries, 40);

    let forest = SearchEngine::new();
    forest.rebuild(&store, &IndexBuilder::new(forest_config())?)?;
    let report = Evaluator::new(10)
        .with_request_size(8)
        .with_params(SearchParams::new().with_search_k(800))
        .evaluate(&forest, &queries, &truth)?;
    assert!(report.recall >= 0.99, "forest recall {}", report.recall);
    Ok(())
}

#[test]
fn rebuilds_with_same_seed_are_identical() -> Result<()> {
    let vectors = clustered_vectors(4, 60, 8, 3);
    let queries = random_vectors(8, 8, 4);

    for config in [ivf_config(), forest_config()] {
        let first = vector::build(vectors.clone(), config.clone())?;
        let second = vector::build(vectors.clone(), config.with_threads(1))?;
        for query in &queries {
            assert_eq!(
                vector::search(&first, query, 5, &SearchParams::default())?,
                vector::search(&second, query, 5, &SearchParams::default())?
            );
        }
    }
    Ok(())
}

#[test]
fn saved_index_answers_identically() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let vectors = clustered_vectors(4, 50, 8, 5);
    let queries = random_vectors(5, 8, 6);

    for config in [IndexBuildConfig::default(), ivf_config(), forest_config()] {
        let index = vector::build(vectors.clone(), config)?;
        let path = dir.path().join(format!("{}.idx", index.strategy_name()));
        index.save(&path)?;
        let loaded = Arc::new(annflow::vector::Index::load(&path)?);

        assert_eq!(loaded.size(), index.size());
        assert_eq!(loaded.strategy_name(), index.strategy_name());
        for query in &queries {
            assert_eq!(
                vector::search(&index, query, 4, &SearchParams::default())?,
                vector::search(&loaded, query, 4, &SearchParams::default())?
            );
        }
    }
    Ok(())
}

#[test]
fn zero_time_budget_flags_partial_result() -> Result<()> {
    let vectors = clustered_vectors(8, 40, 8, 9);
    let index = vector::build(vectors.clone(), ivf_config())?;

    let params = SearchParams::new()
        .with_n_probe(4)
        .with_time_budget(Duration::ZERO);
    let result = vector::search(&index, &vectors[0], 5, &params)?;
    assert_eq!(result.status, SearchStatus::TimedOut);
    assert!(result.is_partial());
    assert!(result.len() <= 5);
    Ok(())
}

#[test]
fn metric_override_must_match_build_metric() -> Result<()> {
    let index = vector::build(square_vectors(), IndexBuildConfig::default())?;

    let params = SearchParams::new().with_metric(DistanceMetric::Cosine);
    let result = vector::search(&index, &Vector::new(vec![0.0, 0.0]), 1, &params);
    assert!(matches!(result, Err(AnnflowError::Config(_))));

    let params = SearchParams::new().with_metric(DistanceMetric::Euclidean);
    assert!(vector::search(&index, &Vector::new(vec![0.0, 0.0]), 1, &params).is_ok());
    Ok(())
}

#[test]
fn factory_strings_select_strategies() -> Result<()> {
    let vectors = clustered_vectors(4, 50, 8, 12);

    let strategy: IndexStrategy = "IVF4,PQ2x4".parse()?;
    let index = vector::build(vectors.clone(), IndexBuildConfig::new(strategy))?;
    assert_eq!(index.strategy_name(), "ivf_pq");

    let strategy: IndexStrategy = "RP5".parse()?;
    let index = vector::build(vectors, IndexBuildConfig::new(strategy))?;
    assert_eq!(index.strategy_name(), "rp_forest");
    Ok(())
}

#[test]
fn engine_serves_latest_published_index() -> Result<()> {
    let engine = SearchEngine::new();
    let first = vector::build(square_vectors(), IndexBuildConfig::default())?;
    assert!(engine.publish(first.clone()).is_none());

    let second = vector::build(random_vectors(20, 2, 1), IndexBuildConfig::default())?;
    let previous = engine
        .publish(second)
        .ok_or_else(|| AnnflowError::not_found("previous index"))?;
    assert!(Arc::ptr_eq(&previous, &first));
    assert_eq!(engine.current()?.size(), 20);
    Ok(())
}
