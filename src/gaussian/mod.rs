pub mod covariance;
pub mod f16;
pub mod rand;
pub mod record;
pub mod settings;
