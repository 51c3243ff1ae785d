//! Concrete data and knowledge providers for the Heartline pipeline.

mod health_data;
mod knowledge_base;

pub use health_data::{
    BloodPressure, BloodPressureReading, HeartRate, Hrv, Metric, Sleep, SleepNight, StaticHealthData, Steps,
    TrendAnalysis, UserHealthData,
};
pub use knowledge_base::{sample_library, SnippetStore};
