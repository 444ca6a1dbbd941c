use crate::error::BuildError;
use crate::plan::BuildPlan;
use crate::validation::rules::{
    ArtifactIsolationRule, EnvironmentPathRule, NonRootUserRule, OwnershipRule,
    PortContractRule, PrivilegeWindowRule, RequiredFieldsRule, StageGraphRule, ValidationRule,
};
use tracing::debug;

pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<Box<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run every rule in order and stop at the first violation
    pub fn validate(&self, plan: &BuildPlan) -> Result<(), BuildError> {
        for rule in &self.rules {
            if let Err(e) = rule.validate(plan) {
                return Err(tag(rule.name(), e));
            }
            debug!(rule = rule.name(), "Validation rule passed");
        }
        Ok(())
    }
}

/// Prefix the failing rule's name, keeping the failure class
fn tag(rule: &str, err: BuildError) -> BuildError {
    match err {
        BuildError::Validation(msg) => BuildError::Validation(format!("[{}] {}", rule, msg)),
        BuildError::Permission(msg) => BuildError::Permission(format!("[{}] {}", rule, msg)),
        other => other,
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(RequiredFieldsRule),
                Box::new(StageGraphRule),
                Box::new(ArtifactIsolationRule),
                Box::new(OwnershipRule),
                Box::new(NonRootUserRule),
                Box::new(PrivilegeWindowRule),
                Box::new(PortContractRule),
                Box::new(EnvironmentPathRule),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Instruction;
    use crate::validation::test_support::valid_plan;

    #[test]
    fn test_validator_valid_plan() {
        let plan = valid_plan();
        let validator = Validator::new();
        assert!(validator.validate(&plan).is_ok());
        assert_eq!(validator.rule_names().len(), 8);
    }

    #[test]
    fn test_validator_invalid_plan_empty_version() {
        let mut plan = valid_plan();
        plan.version = String::new();
        let result = Validator::new().validate(&plan);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("RequiredFields"));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_validator_keeps_permission_class() {
        let mut plan = valid_plan();
        for stage in &mut plan.stages {
            stage.instructions.retain(|i| !matches!(i, Instruction::User { .. }));
        }
        let err = Validator::new().validate(&plan).unwrap_err();
        assert!(matches!(err, BuildError::Permission(_)));
        assert!(err.to_string().contains("[NonRootUser]"));
    }

    #[test]
    fn test_custom_rules() {
        let validator = Validator::with_rules(vec![Box::new(PortContractRule)]);
        assert_eq!(validator.rule_names(), vec!["PortContract"]);
        assert!(validator.validate(&valid_plan()).is_ok());
    }
}
