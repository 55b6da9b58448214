//! Dependency validation and cycle detection via Kahn's algorithm,
//! following `stupid-eisenbahn::config::topological_sort`.

use std::collections::{HashMap, VecDeque};

use snowcat_core::{Error, StageName};

use crate::stage::Stage;

/// Validates stage names and dependency references, collecting every
/// problem rather than failing on the first (spec.md §4.4, §7: the
/// operator sees every topology error at once).
pub fn validate(stages: &[Box<dyn Stage>]) -> Result<(), Error> {
    let mut errors = Vec::new();
    let names: std::collections::HashSet<&str> =
        stages.iter().map(|s| s.name().as_str()).collect();

    for stage in stages {
        if stage.name().as_str().trim().is_empty() {
            errors.push("stage has an empty name".to_string());
        }
        for dep in stage.dependencies() {
            if !names.contains(dep.as_str()) {
                errors.push(format!(
                    "stage '{}' depends on unknown stage '{}'",
                    stage.name(),
                    dep
                ));
            }
        }
    }

    if !errors.is_empty() {
        return Err(Error::TopologyValidation(errors));
    }

    topological_sort(stages).map(|_| ())
}

/// Returns stage names in dependency order (dependencies before
/// dependents), or `CircularDependency` if the graph is not a DAG.
pub fn topological_sort(stages: &[Box<dyn Stage>]) -> Result<Vec<StageName>, Error> {
    if stages.is_empty() {
        return Ok(Vec::new());
    }

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for stage in stages {
        in_degree.entry(stage.name().as_str()).or_insert(0);
        dependents.entry(stage.name().as_str()).or_default();
    }

    for stage in stages {
        for dep in stage.dependencies() {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(stage.name().as_str());
            *in_degree.entry(stage.name().as_str()).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&name, _)| name)
        .collect();

    let mut sorted = Vec::with_capacity(stages.len());

    while let Some(node) = queue.pop_front() {
        sorted.push(node.to_string());
        if let Some(deps) = dependents.get(node) {
            for &dep in deps {
                if let Some(deg) = in_degree.get_mut(dep) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dep);
                    }
                }
            }
        }
    }

    if sorted.len() != stages.len() {
        let remaining: Vec<&str> = in_degree
            .keys()
            .filter(|k| !sorted.contains(&k.to_string()))
            .copied()
            .collect();
        return Err(Error::CircularDependency(remaining.join(", ")));
    }

    Ok(sorted.into_iter().map(StageName::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::ProcessOutcome;
    use async_trait::async_trait;
    use snowcat_core::StreamId;

    struct FakeStage {
        name: StageName,
        deps: Vec<StageName>,
    }

    #[async_trait]
    impl Stage for FakeStage {
        fn name(&self) -> &StageName {
            &self.name
        }
        fn dependencies(&self) -> &[StageName] {
            &self.deps
        }
        async fn process(&self, _stream: &StreamId, _item: &[u8]) -> Result<ProcessOutcome, Error> {
            Ok(ProcessOutcome::Continue)
        }
    }

    fn stage(name: &str, deps: &[&str]) -> Box<dyn Stage> {
        Box::new(FakeStage {
            name: StageName::from(name),
            deps: deps.iter().map(|d| StageName::from(*d)).collect(),
        })
    }

    #[test]
    fn linear_chain_sorts_in_order() {
        let stages = vec![stage("c", &["b"]), stage("a", &[]), stage("b", &["a"])];
        let order = topological_sort(&stages).unwrap();
        assert_eq!(
            order.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn diamond_keeps_dependencies_before_dependents() {
        let stages = vec![
            stage("root", &[]),
            stage("left", &["root"]),
            stage("right", &["root"]),
            stage("join", &["left", "right"]),
        ];
        let order = topological_sort(&stages).unwrap();
        let pos = |n: &str| order.iter().position(|s| s.as_str() == n).unwrap();
        assert!(pos("root") < pos("left"));
        assert!(pos("root") < pos("right"));
        assert!(pos("left") < pos("join"));
        assert!(pos("right") < pos("join"));
    }

    #[test]
    fn cycle_is_rejected() {
        let stages = vec![stage("a", &["b"]), stage("b", &["a"])];
        assert!(topological_sort(&stages).is_err());
    }

    #[test]
    fn unknown_dependency_fails_validation() {
        let stages = vec![stage("a", &["ghost"])];
        let err = validate(&stages).unwrap_err();
        match err {
            Error::TopologyValidation(msgs) => {
                assert!(msgs.iter().any(|m| m.contains("ghost")));
            }
            other => panic!("expected TopologyValidation, got {other:?}"),
        }
    }
}
