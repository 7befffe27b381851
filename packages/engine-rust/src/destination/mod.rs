//! Send targets: the registry dispatch resolves URIs against, plus the
//! built-in destinations.

pub mod log;
pub mod mock;
pub mod registry;
pub mod route;

pub use log::LogDestination;
pub use mock::MockDestination;
pub use registry::DestinationRegistry;
pub use route::RouteDestination;
