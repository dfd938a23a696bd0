pub mod api;
pub mod cluster;
pub mod config;
pub mod error;
pub mod harmonics;
pub mod order;
pub mod periodic;
pub mod pmft;
pub mod query;
pub mod reduce;
pub mod search;
pub mod solliq;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

pub use cluster::{
    Bond, BondPolicy, ClusterParams, ClusterResult, DisjointSet, DotNormalization, SharedCount,
};
pub use error::{ConfigError, Error, Result};
pub use order::{
    HexaticKernel, HexaticOrder, LocalQlm, Normalization, OrderParameter, SphericalHarmonicKernel,
    TranslationalKernel, TranslationalOrder,
};
pub use periodic::PeriodicBox;
pub use pmft::PmftXyt;
pub use query::{Neighbor, NeighborQuery};
pub use reduce::NeighborKernel;
pub use search::CellList;
pub use solliq::SolidLiquid;

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `level`, which defaults to `info`.
/// Calling this again after a subscriber is installed has no effect.
pub fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_thread_ids(true)
        .try_init();
}
