mod settings;

pub use settings::{
    AdmissionConfig, CacheConfig, ContextConfig, DedupConfig, DegradationConfig,
    FlightdeckConfig, RetryConfig, RetryPolicyConfig, SchedulerConfig,
};
