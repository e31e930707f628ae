//! Health reporting for the API's backing services.

mod probes;
mod registry;

pub use probes::{
    CacheProbe, DatabaseProbe, ProviderChainProbe, ProviderProbe, CACHE_DEGRADED_UTILIZATION,
};
pub use registry::{FnProbe, HealthProbe, HealthRegistry, ProbeError, ProbeReport};
