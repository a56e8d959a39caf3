mod client;
mod detector;
mod discovery;
mod identity;
mod session;
mod tracking;

pub use client::{LocationClient, LocationPush, SendError};
pub use detector::{Decision, MovementDetector, Sample};
pub use discovery::{DiscoveryError, Fetch, ReqwestFetcher, Resolver};
pub use identity::device_identity;
pub use session::SessionAggregator;
pub use tracking::{Tracking, TrackingError, TrackingStatus};
