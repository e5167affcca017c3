pub mod metrics;
pub mod provider;
pub mod sampler;
pub mod storage;
pub mod writer;
