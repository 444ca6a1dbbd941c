//! Text renderings of a build plan

pub mod dockerfile;
pub mod dockerignore;

pub use dockerfile::render as render_dockerfile;
pub use dockerignore::render as render_dockerignore;
