pub mod use_cases;

pub use use_cases::identity::IdentityUseCase;
pub use use_cases::test_session::TestSessionUseCase;
