//! forge-ivfpq: a disk-backed IVF-PQ approximate nearest neighbor index.
//!
//! Vectors arrive in shards from a [`VectorSource`]. The build pipeline
//! clusters a sample into coarse centroids, routes every vector to the shard
//! of its most similar centroid, trains a product quantizer over samples of
//! those buckets and encodes every bucket into compact code rows. A query is
//! routed to one bucket and scored against its codes through a precomputed
//! distance table.
//!
//! # Features
//!
//! - **Cosine Similarity Everywhere**: one strict similarity, larger is closer
//! - **Staged Parallel Build**: every stage runs on its own bounded pool
//! - **Residual Mode**: encode the offset from the bucket centroid
//! - **Durable Layout**: text shards plus a checksummed manifest written last
//! - **Concurrent Search**: one handle serves queries from many threads
//!
//! # Example
//!
//! ```ignore
//! use forge_ivfpq::{IndexConfig, IvfPqIndex, IvfPqIndexBuilder, MemorySource};
//!
//! let source = MemorySource::from_vectors(vectors, 4);
//! let config = IndexConfig::new(128, 64, 16, 256);
//! let report = IvfPqIndexBuilder::new(config).build(&source, "index")?;
//! println!("{}", report.summary());
//!
//! let index = IvfPqIndex::open("index")?;
//! if let Some(hit) = index.search(&query)? {
//!     println!("best match {} (score {:.4})", hit.id, hit.score);
//! }
//! ```

pub mod concurrency;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod index;
pub mod kmeans;
pub mod metrics;
pub mod persistence;
pub mod pq;
pub mod source;
pub mod types;
pub mod vector;

// Re-export commonly used types at crate root
pub use concurrency::StagePool;
pub use config::{IndexConfig, StageWidths};
pub use dataset::{recall_at_k, Dataset};
pub use error::{IvfPqError, Result};
pub use index::{CoarseQuantizer, IvfPqIndex, IvfPqIndexBuilder, SearchResult, VectorIndex};
pub use kmeans::KMeans;
pub use metrics::{BuildReport, PartitionStats, SearchStatistics, StageTimings};
pub use persistence::{IndexLayout, IndexManifest};
pub use pq::{Codebook, DistanceTable, ProductQuantizer};
pub use source::{DirSource, MemorySource, Record, ShardId, VectorSource};
pub use types::{Bucket, CodeRow, Codes, VectorId};
pub use vector::{Vector, VectorSet};
