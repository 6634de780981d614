//! Quick start example for SealDB.
//!
//! Builds an encrypted index over a few toy embeddings, runs nearest-neighbor
//! queries, and shows what happens when a sealed payload is tampered with.
//!
//! Run with: RUST_LOG=sealdb_core=debug cargo run --example quickstart

use sealdb::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("🔐 SealDB Quick Start Example\n");

    // In practice the key comes from a secret store
    let key = Key::generate();
    let config = IndexConfig::new(4).with_rebuild_policy(0.5, 4);
    let index = EncryptedIndex::with_config(key, config)?;

    let documents = [
        ("rust-intro", [0.9, 0.8, 0.1, 0.0]),
        ("rust-advanced", [0.85, 0.9, 0.15, 0.05]),
        ("python-data", [0.1, 0.2, 0.9, 0.85]),
        ("ml-basics", [0.2, 0.1, 0.7, 0.8]),
        ("rust-systems", [0.8, 0.7, 0.2, 0.1]),
        ("gardening", [0.0, 0.05, 0.1, 0.95]),
    ];

    println!("📥 Inserting {} documents...", documents.len());
    for (id, embedding) in &documents {
        index.insert(Vector::new(*id, embedding))?;
    }
    println!(
        "✅ Index contains {} vectors (depth {}, {} inserts since rebuild)\n",
        index.len(),
        index.depth(),
        index.inserts_since_rebuild()
    );

    let node = index.lookup("rust-intro")?;
    println!("🧾 Sealed payload of 'rust-intro':");
    println!("   {}\n", node.sealed());

    let query = [0.88, 0.85, 0.12, 0.03];
    println!("🔍 Nearest neighbor of {:?}...", query);
    let hit = index.nearest(&query)?;
    println!("   → {} (distance: {:.4})\n", hit.vector.id(), hit.distance);

    // Duplicates are rejected and the original entry is kept
    match index.insert(Vector::new("rust-intro", &[0.0, 0.0, 0.0, 0.0])) {
        Err(Error::DuplicateId(id)) => println!("⚠️  Rejected duplicate id '{}'", id),
        other => println!("unexpected: {:?}", other),
    }

    // A wrong key cannot open the payload
    let wrong = Key::generate();
    match sealdb::cipher::open_coordinates(node.sealed(), &wrong) {
        Err(e) => println!("🚫 Opening with the wrong key fails: {}\n", e),
        Ok(_) => println!("unexpected: wrong key opened the payload\n"),
    }

    index.rebuild()?;
    println!("♻️  Rebuilt: depth {}, consistent: {}", index.depth(), index.is_consistent());

    println!("\n✨ Quick start complete!");
    Ok(())
}
