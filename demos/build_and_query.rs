//! Build an IVF-PQ index from text shards on disk and measure recall.
//!
//! Run with: RUST_LOG=forge_ivfpq=debug cargo run --release --example build_and_query

use forge_ivfpq::dataset::{recall_at_k, Dataset};
use forge_ivfpq::{DirSource, IndexConfig, IvfPqIndex, IvfPqIndexBuilder, Result};
use std::time::Instant;
use tempfile::TempDir;

const DIM: usize = 32;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    println!("=== IVF-PQ Build and Query ===\n");

    println!("Generating dataset...");
    let mut dataset = Dataset::generate_clustered(20_000, 200, DIM, 64, 0.15, 7);

    println!("Computing ground truth...");
    dataset.compute_ground_truth(10)?;

    let raw = TempDir::new()?;
    dataset.write_shards(raw.path(), 8, "txt")?;
    let source = DirSource::new(raw.path(), DIM);

    for residual in [false, true] {
        println!("==============================");
        println!("=== residual = {} ===", residual);
        println!("==============================");

        let root = TempDir::new()?;
        let config = IndexConfig::new(DIM, 64, 8, 256)
            .with_residual(residual)
            .with_seed(7)
            .with_coarse_samples(64)
            .with_pq_samples(256)
            .with_iterations(50, 25);

        let report = IvfPqIndexBuilder::new(config).build(&source, root.path())?;
        println!("{}\n", report.summary());

        let index = IvfPqIndex::open(root.path())?;
        println!(
            "{:>4} | {:>12} | {:>12}",
            "k", "Recall@k", "QPS"
        );
        println!("{}", "-".repeat(34));

        for k in [1, 10] {
            let mut total_recall = 0.0f32;
            let start = Instant::now();

            for (i, query) in dataset.queries.iter().enumerate() {
                let results = index.search_top_k(query.as_slice(), k)?;
                let predicted: Vec<u64> = results.iter().map(|r| r.id.as_u64()).collect();
                total_recall += recall_at_k(&predicted, &dataset.ground_truth[i], k);
            }

            let duration = start.elapsed();
            let avg_recall = total_recall / dataset.queries.len() as f32;
            let qps = dataset.queries.len() as f64 / duration.as_secs_f64();
            println!("{:>4} | {:>11.2}% | {:>12.0}", k, avg_recall * 100.0, qps);
        }

        let (_, stats) = index.search_with_stats(dataset.queries[0].as_slice())?;
        println!("\n{}\n", stats.summary());
    }

    Ok(())
}
