//! Async API demo using AsyncEncryptedIndex.
//!
//! Run with: cargo run --example async_demo --features async

#[cfg(feature = "async")]
use sealdb::prelude::*;
#[cfg(feature = "async")]
use sealdb::AsyncEncryptedIndex;

#[cfg(feature = "async")]
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    println!("Async SealDB Demo\n");

    let index = EncryptedIndex::new(Key::generate(), 32, 1000).expect("Failed to create index");
    let index = AsyncEncryptedIndex::from_sync(index);

    // Insert vectors concurrently
    println!("⏳ Inserting 1000 vectors concurrently...");
    let start = std::time::Instant::now();

    let mut handles = vec![];
    for i in 0..1000 {
        let idx = index.clone();
        let handle = tokio::spawn(async move {
            let data: Vec<f32> = (0..32).map(|j| ((i * 32 + j) as f32).sin()).collect();
            idx.insert(Vector::from_vec(format!("doc-{}", i), data)).await
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    println!("   [OK] Inserted in {:?}", start.elapsed());
    println!("   Total vectors: {}", index.len());
    println!("   Depth: {}\n", index.inner().depth());

    println!("Searching...");
    let query: Vec<f32> = (0..32).map(|i| (i as f32 * 0.1).cos()).collect();
    let hit = index.nearest(query).await.unwrap();
    println!("   Nearest: {} (distance: {:.4})", hit.vector.id(), hit.distance);

    index.rebuild().await.unwrap();
    println!("   Rebuilt, depth now {}", index.inner().depth());

    println!("\nAsync demo complete!");
}

#[cfg(not(feature = "async"))]
fn main() {
    println!("Run with: cargo run --example async_demo --features async");
}
