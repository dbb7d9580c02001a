//! Repositories: zero-sized structs with async functions over a pool or
//! connection. Each returns raw `sqlx::Error`; the store layer maps errors
//! into `CoreError`.

pub mod assignment_repo;
pub mod system_injectable_repo;
pub mod template_version_repo;

pub use assignment_repo::AssignmentRepo;
pub use system_injectable_repo::SystemInjectableRepo;
pub use template_version_repo::TemplateVersionRepo;
