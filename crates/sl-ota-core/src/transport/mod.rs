//! Transport layer module.

pub mod btleplug;
pub mod mock;
pub mod traits;

pub use self::btleplug::{BtleplugCentral, BtleplugLink, DiscoveredDevice};
pub use mock::{MockCentral, MockLink, OpLog};
pub use traits::{DeviceFilter, GattCentral, GattLink, MatchKind, TransportError};
