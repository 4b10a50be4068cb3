//! Reads: filters, projections, pipelines and result shaping.

mod executor;
mod filter;
mod pipeline;
mod projection;
mod shape;

pub use executor::{sort_documents, QueryExecutor};
pub use filter::{like_match, validate_filter, validate_path, FilterEvaluator};
pub use pipeline::{lower, run_pipeline, PaginationPlacement, PipelineBuilder, PipelineOp};
pub use projection::{FetchPlan, ProjectionResolver, TraversalStep};
pub use shape::{shape, ProjectedDocument, ProjectedRelation};
