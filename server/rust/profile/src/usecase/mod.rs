pub mod get_health;
pub mod get_me;
pub mod list_jobs;
pub mod oidc_flow;
pub mod resolve_principal;
pub mod run_job;

pub use get_health::GetHealthUseCase;
pub use get_me::GetMeUseCase;
pub use list_jobs::ListJobsUseCase;
pub use oidc_flow::{OidcFlowSettings, OidcFlowUseCase};
pub use resolve_principal::ResolvePrincipalUseCase;
pub use run_job::RunJobUseCase;
