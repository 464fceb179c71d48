pub mod collection;
pub mod contact;
pub mod dashboard;
pub mod detail;
pub mod domain;
pub mod error;
pub mod guard;
pub mod listing_form;
pub mod memory;
pub mod navigator;
pub mod ports;
pub mod profile;
pub mod session;
pub mod validation;

pub use collection::{CollectionView, ListingFilter, Selection};
pub use domain::{
    AvailabilityStatus, CertificationStatus, Condition, Listing, ListingFields, NewListing,
    Profile, ProfileFields, Session, SessionState, User, UserCredentials,
};
pub use error::{MarketError, MarketResult};
pub use navigator::{Gate, Navigator, Route};
pub use ports::{
    AccountService, EquipmentStore, PortError, PortResult, ProfileStore, SessionProvider,
};
pub use session::SessionHub;
