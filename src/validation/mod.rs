pub mod rules;
pub mod validator;

pub use rules::ValidationRule;
pub use validator::Validator;

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use tempfile::TempDir;

    use crate::config::SlimboxConfig;
    use crate::lock::{fixtures, LockDescriptor, LOCK_FILE, MANIFEST_FILE};
    use crate::plan::BuildPlan;
    use crate::stages::{self, assembly, resolver};

    /// Plan for the fixture project with default settings
    pub fn valid_plan() -> BuildPlan {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), fixtures::MANIFEST).unwrap();
        fs::write(dir.path().join(LOCK_FILE), fixtures::LOCK).unwrap();
        fs::create_dir_all(dir.path().join("src/app")).unwrap();

        let config = SlimboxConfig::default();
        let descriptor = LockDescriptor::load(dir.path()).unwrap();
        let resolver = resolver::plan(&config, &descriptor).unwrap();
        let assembly =
            assembly::plan(&config, &descriptor, resolver::STAGE_NAME, &resolver.artifact).unwrap();
        stages::compose(&config, &descriptor, resolver, assembly).unwrap()
    }
}
