// Planning phases, run in file order by the orchestrator

#[path = "01_lock.rs"]
pub mod lock;
#[path = "02_resolve.rs"]
pub mod resolve;
#[path = "03_assemble.rs"]
pub mod assemble;
#[path = "04_validate.rs"]
pub mod validate;
#[path = "05_render.rs"]
pub mod render;

pub use assemble::AssemblePhase;
pub use lock::LockPhase;
pub use render::RenderPhase;
pub use resolve::ResolvePhase;
pub use validate::ValidatePhase;
