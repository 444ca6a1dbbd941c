//! Stage dependency graph
//!
//! Stages are nodes; an edge says "this stage copies that artifact out of
//! that stage". Rendering walks the graph in topological order, so the data
//! dependency between resolver and runtime is explicit rather than implied
//! by instruction order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use super::schema::StageRole;
use crate::error::BuildError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageNode {
    pub name: String,
    pub role: StageRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEdge {
    pub from: String,
    pub to: String,
    /// Path of the artifact inside `from`, copied to the same path in `to`
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageGraph {
    nodes: Vec<StageNode>,
    edges: Vec<ArtifactEdge>,
}

fn invalid(msg: String) -> BuildError {
    BuildError::Validation(msg)
}

impl StageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[StageNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[ArtifactEdge] {
        &self.edges
    }

    pub fn add_stage(&mut self, name: &str, role: StageRole) -> Result<(), BuildError> {
        if self.nodes.iter().any(|n| n.name == name) {
            return Err(invalid(format!("Stage '{}' declared twice", name)));
        }
        self.nodes.push(StageNode {
            name: name.to_string(),
            role,
        });
        Ok(())
    }

    /// Declare that `to` consumes `path` produced by `from`.
    ///
    /// Rejects unknown stages, self edges and any edge that would close a cycle.
    pub fn add_artifact(&mut self, from: &str, to: &str, path: &str) -> Result<(), BuildError> {
        for name in [from, to] {
            if !self.nodes.iter().any(|n| n.name == name) {
                return Err(BuildError::transfer(
                    path,
                    format!("artifact edge references unknown stage '{}'", name),
                ));
            }
        }
        if from == to {
            return Err(invalid(format!("Stage '{}' cannot consume its own output", from)));
        }
        if self.reaches(to, from) {
            return Err(invalid(format!(
                "Artifact edge {} -> {} would create a cycle",
                from, to
            )));
        }
        self.edges.push(ArtifactEdge {
            from: from.to_string(),
            to: to.to_string(),
            path: path.to_string(),
        });
        Ok(())
    }

    /// Whether `target` is reachable from `start` along existing edges
    fn reaches(&self, start: &str, target: &str) -> bool {
        let mut queue = VecDeque::from([start]);
        let mut seen = vec![start];
        while let Some(current) = queue.pop_front() {
            if current == target {
                return true;
            }
            for edge in self.edges.iter().filter(|e| e.from == current) {
                if !seen.contains(&edge.to.as_str()) {
                    seen.push(edge.to.as_str());
                    queue.push_back(edge.to.as_str());
                }
            }
        }
        false
    }

    /// Stage names in dependency order; ties keep declaration order
    pub fn topological_order(&self) -> Result<Vec<&str>, BuildError> {
        let mut in_degree: BTreeMap<&str, usize> =
            self.nodes.iter().map(|n| (n.name.as_str(), 0)).collect();
        for edge in &self.edges {
            *in_degree.entry(edge.to.as_str()).or_default() += 1;
        }

        let mut ready: VecDeque<&str> = self
            .nodes
            .iter()
            .map(|n| n.name.as_str())
            .filter(|n| in_degree[n] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(name) = ready.pop_front() {
            order.push(name);
            for edge in self.edges.iter().filter(|e| e.from == name) {
                let degree = in_degree
                    .get_mut(edge.to.as_str())
                    .ok_or_else(|| invalid(format!("Unknown stage '{}'", edge.to)))?;
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(edge.to.as_str());
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(invalid("Stage graph contains a cycle".to_string()));
        }
        Ok(order)
    }

    /// Artifacts `stage` pulls from other stages
    pub fn inputs_of<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a ArtifactEdge> + 'a {
        self.edges.iter().filter(move |e| e.to == stage)
    }

    /// Check the fixed pipeline shape: one resolver, one runtime, and a single
    /// edge running from the resolver into the runtime stage
    pub fn validate_pipeline(&self) -> Result<(), BuildError> {
        let count = |role| self.nodes.iter().filter(|n| n.role == role).count();
        if count(StageRole::Resolver) != 1 || count(StageRole::Runtime) != 1 {
            return Err(invalid(format!(
                "Expected exactly one resolver and one runtime stage, found {} nodes",
                self.nodes.len()
            )));
        }
        let role_of = |name: &str| self.nodes.iter().find(|n| n.name == name).map(|n| n.role);
        match self.edges.as_slice() {
            [edge]
                if role_of(&edge.from) == Some(StageRole::Resolver)
                    && role_of(&edge.to) == Some(StageRole::Runtime) =>
            {
                self.topological_order().map(|_| ())
            }
            [] => Err(BuildError::transfer(
                "<environment>",
                "runtime stage has no environment artifact edge",
            )),
            _ => Err(invalid(
                "Runtime stage must consume exactly one artifact from the resolver".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> StageGraph {
        let mut graph = StageGraph::new();
        graph.add_stage("resolver", StageRole::Resolver).unwrap();
        graph.add_stage("runtime", StageRole::Runtime).unwrap();
        graph
            .add_artifact("resolver", "runtime", "/app/.venv")
            .unwrap();
        graph
    }

    #[test]
    fn test_topological_order() {
        let graph = pipeline();
        assert_eq!(graph.topological_order().unwrap(), vec!["resolver", "runtime"]);
        assert!(graph.validate_pipeline().is_ok());
    }

    #[test]
    fn test_order_follows_edges_not_declaration() {
        let mut graph = StageGraph::new();
        graph.add_stage("runtime", StageRole::Runtime).unwrap();
        graph.add_stage("resolver", StageRole::Resolver).unwrap();
        graph
            .add_artifact("resolver", "runtime", "/app/.venv")
            .unwrap();
        assert_eq!(graph.topological_order().unwrap(), vec!["resolver", "runtime"]);
    }

    #[test]
    fn test_back_edge_rejected() {
        let mut graph = pipeline();
        let err = graph
            .add_artifact("runtime", "resolver", "/app")
            .unwrap_err();
        assert!(err.to_string().contains("cycle"));
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn test_self_edge_and_unknown_stage() {
        let mut graph = pipeline();
        assert!(graph.add_artifact("runtime", "runtime", "/x").is_err());
        assert!(matches!(
            graph.add_artifact("builder", "runtime", "/x"),
            Err(BuildError::Transfer { .. })
        ));
        assert!(graph.add_stage("runtime", StageRole::Runtime).is_err());
    }

    #[test]
    fn test_missing_edge_is_transfer_failure() {
        let mut graph = StageGraph::new();
        graph.add_stage("resolver", StageRole::Resolver).unwrap();
        graph.add_stage("runtime", StageRole::Runtime).unwrap();
        assert!(matches!(
            graph.validate_pipeline(),
            Err(BuildError::Transfer { .. })
        ));
    }

    #[test]
    fn test_inputs_of() {
        let graph = pipeline();
        let inputs: Vec<_> = graph.inputs_of("runtime").collect();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].path, "/app/.venv");
        assert_eq!(graph.inputs_of("resolver").count(), 0);
    }
}
