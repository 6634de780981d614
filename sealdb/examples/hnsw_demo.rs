//! HNSW demo - comparing the encrypted k-d tree against the HNSW backend.
//!
//! The k-d tree returns the exact nearest neighbor but decrypts every node it
//! visits; HNSW keeps points in the clear and answers approximately.

use sealdb::prelude::*;
use std::time::Instant;

fn main() -> Result<()> {
    println!("🚀 HNSW vs Encrypted k-d Tree Demo\n");

    let num_vectors = 5_000;
    let dimension = 8;
    let queries = 100;

    println!("📊 Setup: {} vectors, {} dimensions", num_vectors, dimension);
    println!();

    let vectors: Vec<Vec<f32>> = (0..num_vectors)
        .map(|i| {
            (0..dimension)
                .map(|j| ((i * dimension + j) as f32 * 0.1).sin())
                .collect()
        })
        .collect();

    println!("🔨 Building encrypted k-d tree...");
    let start = Instant::now();
    let tree = EncryptedIndex::new(Key::generate(), dimension, num_vectors)?;
    for (i, v) in vectors.iter().enumerate() {
        tree.insert(Vector::new(i.to_string(), v))?;
    }
    tree.rebuild()?;
    println!("   ✅ Built in {:?} (depth {})", start.elapsed(), tree.depth());

    println!("🔨 Building HNSW index...");
    let config = HnswConfig {
        ef_construction: 200,
        ef_search: 100,
        ..HnswConfig::with_m(16)
    };
    let start = Instant::now();
    let mut hnsw = HnswBackend::with_capacity(dimension, config, num_vectors);
    hnsw.add_points(&vectors, 0)?;
    println!("   ✅ Built in {:?}", start.elapsed());
    println!();

    let query_set: Vec<Vec<f32>> = (0..queries)
        .map(|q| (0..dimension).map(|j| ((q * 7 + j) as f32 * 0.15).cos()).collect())
        .collect();

    println!("🔍 Exact search over sealed nodes ({} queries)...", queries);
    let start = Instant::now();
    let exact: Vec<String> = query_set
        .iter()
        .map(|q| tree.nearest(q).map(|hit| hit.vector.id().to_string()))
        .collect::<Result<_>>()?;
    let tree_time = start.elapsed();
    println!("   ⏱️  Time: {:?}", tree_time);

    println!("🔍 HNSW search ({} queries)...", queries);
    let start = Instant::now();
    let approx: Vec<String> = query_set
        .iter()
        .map(|q| {
            hnsw.search_knn(q, 1, None)
                .map(|m| m.first().map(|m| m.label.to_string()).unwrap_or_default())
        })
        .collect::<Result<_>>()?;
    let hnsw_time = start.elapsed();
    println!("   ⏱️  Time: {:?}", hnsw_time);
    println!();

    let hits = exact.iter().zip(&approx).filter(|(a, b)| a == b).count();

    println!("📈 Results:");
    println!("   k-d tree: {:?}", tree_time);
    println!("   HNSW:     {:?}", hnsw_time);
    println!("   Recall@1: {:.0}%", hits as f64 / queries as f64 * 100.0);
    println!();

    println!("✨ Done!");
    Ok(())
}
