pub mod comparison;
pub mod encode_job;
