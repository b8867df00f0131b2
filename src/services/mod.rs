//! Web-service endpoint wrappers.
//!
//! Each service owns the cache keys of its reads and the matching
//! invalidations; controllers never build keys themselves.

pub mod certificate;
pub mod competency;
pub mod types;
pub mod user;

pub use certificate::CertificateService;
pub use competency::CompetencyService;
pub use user::UserService;
