//! Discovery side of the receiver: local interface selection and the SSDP
//! responder that points senders at the device description.

pub mod interface;
pub mod ssdp;

pub use interface::LocalInterface;
pub use ssdp::{is_dial_search, SsdpAdvertisement, SsdpResponder, Wakeup};
