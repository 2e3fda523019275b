//! Vector index implementations

mod adaptive;
mod clustered;
mod flat;
pub mod snapshot;

pub use adaptive::AdaptiveIndex;
pub use clustered::ClusterLayout;
pub use flat::FlatIndex;
