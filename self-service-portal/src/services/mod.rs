pub mod au10tix_client;
pub mod credentials;
pub mod metrics;
pub mod sdo_client;
pub mod verification;

pub use au10tix_client::{Au10tixClient, TokenSource, VerificationApi};
pub use credentials::CredentialStore;
pub use sdo_client::SdoClient;
pub use verification::{InMemoryVerificationStore, VerificationService, VerificationStore};
