pub mod credential;
pub mod operator;
pub mod verification;

pub use credential::Credential;
pub use operator::Operator;
pub use verification::{
    ExternalSessionRef, PolledOutcome, SubjectData, VerificationResult, VerificationSession,
    VerificationStatus,
};
