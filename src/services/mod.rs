pub mod cascade;
pub mod catalog;
pub mod credentials;
pub mod directory;
pub mod notifications;
pub mod roster;
pub mod tokens;

pub use cascade::CascadeCoordinator;
pub use catalog::EventCatalog;
pub use credentials::CredentialStore;
pub use directory::UserDirectory;
pub use notifications::NotificationService;
pub use roster::RosterManager;
pub use tokens::TokenIssuer;
