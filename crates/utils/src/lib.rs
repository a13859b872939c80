pub mod api;
pub mod device;
pub mod sentry;
