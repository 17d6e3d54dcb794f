//! Coarse quantizer, build pipeline and query handle.

pub mod ivf;
pub mod ivf_pq;
pub mod ivf_pq_builder;
pub mod traits;

pub use ivf::CoarseQuantizer;
pub use ivf_pq::IvfPqIndex;
pub use ivf_pq_builder::IvfPqIndexBuilder;
pub use traits::{SearchResult, VectorIndex};
