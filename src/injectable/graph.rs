use std::collections::{HashMap, HashSet};

use super::Registry;
use crate::ConfigurationError;

/// Execution order for one render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Codes grouped so that each stage only depends on earlier stages.
    pub stages: Vec<Vec<String>>,
    /// Requested codes the registry doesn't know.
    pub unknown: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search reporting the first cycle as a closed path.
fn find_cycle<'r>(
    registry: &'r Registry,
    code: &'r str,
    marks: &mut HashMap<&'r str, Mark>,
    stack: &mut Vec<&'r str>,
) -> Result<(), ConfigurationError> {
    match marks.get(code) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = stack.iter().position(|c| *c == code).unwrap_or_default();
            let mut path = stack[start..]
                .iter()
                .map(|c| (*c).to_owned())
                .collect::<Vec<_>>();
            path.push(code.to_owned());
            return Err(ConfigurationError::Cycle { path });
        }
        None => {}
    }
    let Some(definition) = registry.get(code) else {
        return Ok(());
    };
    marks.insert(code, Mark::Visiting);
    stack.push(code);
    for dependency in &definition.dependencies {
        if !registry.contains(dependency) {
            return Err(ConfigurationError::UnknownDependency {
                code: code.to_owned(),
                dependency: dependency.clone(),
            });
        }
        find_cycle(registry, dependency, marks, stack)?;
    }
    stack.pop();
    marks.insert(code, Mark::Done);
    Ok(())
}

/// Plans the requested codes and their transitive dependencies. Fails on the first
/// cycle or unregistered dependency before anything runs.
pub fn plan(registry: &Registry, requested: &[String]) -> Result<Plan, ConfigurationError> {
    let mut unknown = Vec::new();
    let mut marks = HashMap::new();
    for code in requested {
        if !registry.contains(code) {
            if !unknown.contains(code) {
                unknown.push(code.clone());
            }
            continue;
        }
        find_cycle(registry, code, &mut marks, &mut Vec::new())?;
    }

    // Every code reached by the search, i.e. the requested ones and their dependencies.
    let mut pending = marks.keys().copied().collect::<HashSet<_>>();
    let mut done = HashSet::new();
    let mut stages = Vec::new();
    while !pending.is_empty() {
        let mut stage = pending
            .iter()
            .copied()
            .filter(|code| {
                registry
                    .get(code)
                    .is_none_or(|d| d.dependencies.iter().all(|dep| done.contains(dep.as_str())))
            })
            .collect::<Vec<_>>();
        if stage.is_empty() {
            // Unreachable after the cycle search; bail out rather than loop.
            let path = pending.iter().map(|c| (*c).to_owned()).collect();
            return Err(ConfigurationError::Cycle { path });
        }
        stage.sort_by_key(|code| registry.position(code));
        for code in &stage {
            pending.remove(code);
            done.insert(*code);
        }
        stages.push(stage.into_iter().map(str::to_owned).collect());
    }
    Ok(Plan { stages, unknown })
}
