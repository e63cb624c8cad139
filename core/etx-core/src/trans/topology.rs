//! Topology — 정의 검증, 미사용 입력 제거, row set 배선

use super::config::{HopDefinition, HopKind, StepDefinition, TransDefinition};
use crate::error::{EtxError, EtxResult};
use crate::rowset::RowSet;
use crate::step::OutputGroup;
use ahash::{AHashMap, AHashSet};
use std::collections::VecDeque;
use std::sync::Arc;

/// Row sets of one step copy.
#[derive(Debug, Default)]
pub(crate) struct CopyWiring {
    pub(crate) inputs: Vec<Arc<RowSet>>,
    pub(crate) outputs: Vec<OutputGroup>,
    pub(crate) error_output: Option<OutputGroup>,
}

#[derive(Debug)]
pub(crate) struct PlannedStep {
    pub(crate) definition: StepDefinition,
    pub(crate) has_error_hop: bool,
    /// copy 인덱스 순
    pub(crate) copies: Vec<CopyWiring>,
}

/// Materialized wiring, in topological order.
#[derive(Debug)]
pub(crate) struct Topology {
    pub(crate) steps: Vec<PlannedStep>,
    pub(crate) rowsets: Vec<Arc<RowSet>>,
    pub(crate) pruned: Vec<String>,
}

impl Topology {
    pub(crate) fn build(def: &TransDefinition, queue_size: usize) -> EtxResult<Self> {
        validate(def)?;

        let pruned = unused_inputs(def);
        for name in &pruned {
            tracing::debug!(step = %name, "removing input step with only disabled hops");
        }
        let pruned_set: AHashSet<&str> = pruned.iter().map(String::as_str).collect();

        // 비활성 hop은 없는 것으로 취급
        let hops: Vec<&HopDefinition> = def
            .hops
            .iter()
            .filter(|h| h.enabled)
            .filter(|h| !pruned_set.contains(h.from.as_str()) && !pruned_set.contains(h.to.as_str()))
            .collect();
        let steps: Vec<&StepDefinition> = def
            .steps
            .iter()
            .filter(|s| !pruned_set.contains(s.name.as_str()))
            .collect();

        check_enabled_hops(&hops)?;
        let order = topological_order(&steps, &hops)?;

        let index: AHashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        let mut planned: Vec<PlannedStep> = order
            .iter()
            .map(|s| PlannedStep {
                definition: (*s).clone(),
                has_error_hop: false,
                copies: (0..s.copies).map(|_| CopyWiring::default()).collect(),
            })
            .collect();
        let mut rowsets = Vec::new();

        for hop in &hops {
            let (from, to) = (index[hop.from.as_str()], index[hop.to.as_str()]);
            let (n, m) = (planned[from].definition.copies, planned[to].definition.copies);

            // n == m 이면 copy i → copy i, 아니면 n × m
            let mut per_source: Vec<Vec<Arc<RowSet>>> = vec![Vec::new(); n];
            for (i, targets) in per_source.iter_mut().enumerate() {
                let range = if n == m { i..i + 1 } else { 0..m };
                for j in range {
                    let rs = Arc::new(RowSet::new(
                        format!("{}.{} - {}.{}", hop.from, i, hop.to, j),
                        queue_size,
                    ));
                    planned[to].copies[j].inputs.push(Arc::clone(&rs));
                    rowsets.push(Arc::clone(&rs));
                    targets.push(rs);
                }
            }

            let source = &mut planned[from];
            for (wiring, targets) in source.copies.iter_mut().zip(per_source) {
                let group = OutputGroup::new(hop.to.clone(), targets);
                match hop.kind {
                    HopKind::Normal => wiring.outputs.push(group),
                    HopKind::Error => wiring.error_output = Some(group),
                }
            }
            if hop.kind == HopKind::Error {
                source.has_error_hop = true;
            }
        }

        Ok(Self {
            steps: planned,
            rowsets,
            pruned,
        })
    }

    pub(crate) fn copy_count(&self) -> usize {
        self.steps.iter().map(|s| s.copies.len()).sum()
    }
}

fn validate(def: &TransDefinition) -> EtxResult<()> {
    let mut names = AHashSet::new();
    for step in &def.steps {
        if step.name.is_empty() {
            return Err(EtxError::Config("step name must not be empty".to_string()));
        }
        if !names.insert(step.name.as_str()) {
            return Err(EtxError::DuplicateStep(step.name.clone()));
        }
        if step.copies == 0 {
            return Err(EtxError::Config(format!(
                "step '{}': copies must be at least 1",
                step.name
            )));
        }
    }

    for hop in &def.hops {
        for end in [&hop.from, &hop.to] {
            if !names.contains(end.as_str()) {
                return Err(EtxError::StepNotFound(end.clone()));
            }
        }
        if hop.from == hop.to {
            return Err(EtxError::Config(format!(
                "hop from '{}' to itself",
                hop.from
            )));
        }
    }
    Ok(())
}

/// 출력 hop이 모두 비활성(1개 이상)이고 입력 hop이 없는 스텝. 한 단계만 제거한다.
fn unused_inputs(def: &TransDefinition) -> Vec<String> {
    def.steps
        .iter()
        .filter(|s| {
            let out: Vec<&HopDefinition> = def.hops.iter().filter(|h| h.from == s.name).collect();
            let has_input = def.hops.iter().any(|h| h.to == s.name);
            !out.is_empty() && out.iter().all(|h| !h.enabled) && !has_input
        })
        .map(|s| s.name.clone())
        .collect()
}

fn check_enabled_hops(hops: &[&HopDefinition]) -> EtxResult<()> {
    let mut pairs = AHashSet::new();
    let mut error_sources = AHashSet::new();
    for hop in hops {
        if !pairs.insert((hop.from.as_str(), hop.to.as_str())) {
            return Err(EtxError::Config(format!(
                "duplicate hop from '{}' to '{}'",
                hop.from, hop.to
            )));
        }
        if hop.kind == HopKind::Error && !error_sources.insert(hop.from.as_str()) {
            return Err(EtxError::Config(format!(
                "step '{}' has more than one error hop",
                hop.from
            )));
        }
    }
    Ok(())
}

/// Kahn 알고리즘. 정의 순서를 최대한 유지한다.
fn topological_order<'a>(
    steps: &[&'a StepDefinition],
    hops: &[&HopDefinition],
) -> EtxResult<Vec<&'a StepDefinition>> {
    let position: AHashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; steps.len()];
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for hop in hops {
        let (from, to) = (position[hop.from.as_str()], position[hop.to.as_str()]);
        edges[from].push(to);
        in_degree[to] += 1;
    }

    let mut ready: VecDeque<usize> = (0..steps.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(steps.len());
    while let Some(i) = ready.pop_front() {
        order.push(steps[i]);
        for &next in &edges[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    if order.len() != steps.len() {
        let stuck: Vec<&str> = (0..steps.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| steps[i].name.as_str())
            .collect();
        return Err(EtxError::CycleDetected(stuck.join(", ")));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def() -> TransDefinition {
        TransDefinition::new("t")
            .step(StepDefinition::new("src", "Sequence"))
            .step(StepDefinition::new("mid", "Dummy"))
            .step(StepDefinition::new("sink", "Dummy"))
            .hop(HopDefinition::new("src", "mid"))
            .hop(HopDefinition::new("mid", "sink"))
    }

    fn planned<'a>(t: &'a Topology, name: &str) -> &'a PlannedStep {
        t.steps.iter().find(|s| s.definition.name == name).unwrap()
    }

    #[test]
    fn test_linear_wiring() {
        let t = Topology::build(&def(), 10).unwrap();
        let names: Vec<&str> = t.steps.iter().map(|s| s.definition.name.as_str()).collect();
        assert_eq!(names, vec!["src", "mid", "sink"]);
        assert_eq!(t.rowsets.len(), 2);
        assert_eq!(t.rowsets[0].name(), "src.0 - mid.0");
        assert_eq!(t.rowsets[0].capacity(), 10);

        let mid = &planned(&t, "mid").copies[0];
        assert_eq!(mid.inputs.len(), 1);
        assert_eq!(mid.outputs.len(), 1);
        assert_eq!(mid.outputs[0].target(), "sink");
        assert!(planned(&t, "src").copies[0].inputs.is_empty());
    }

    #[test]
    fn test_copy_wiring() {
        // 2 → 2: copy i → copy i
        let same = TransDefinition::new("t")
            .step(StepDefinition::new("a", "Dummy").with_copies(2))
            .step(StepDefinition::new("b", "Dummy").with_copies(2))
            .hop(HopDefinition::new("a", "b"));
        let t = Topology::build(&same, 5).unwrap();
        assert_eq!(t.rowsets.len(), 2);
        assert_eq!(planned(&t, "a").copies[1].outputs[0].rowsets().len(), 1);
        assert_eq!(planned(&t, "b").copies[1].inputs[0].name(), "a.1 - b.1");

        // 1 → 3: 전체 연결
        let fan = TransDefinition::new("t")
            .step(StepDefinition::new("a", "Dummy"))
            .step(StepDefinition::new("b", "Dummy").with_copies(3))
            .hop(HopDefinition::new("a", "b"));
        let t = Topology::build(&fan, 5).unwrap();
        assert_eq!(t.rowsets.len(), 3);
        assert_eq!(planned(&t, "a").copies[0].outputs[0].rowsets().len(), 3);
        assert_eq!(t.copy_count(), 4);
    }

    #[test]
    fn test_error_hop_wiring() {
        let d = def()
            .step(StepDefinition::new("rejects", "Dummy"))
            .hop(HopDefinition::error("mid", "rejects"));
        let t = Topology::build(&d, 10).unwrap();
        let mid = planned(&t, "mid");
        assert!(mid.has_error_hop);
        assert_eq!(mid.copies[0].outputs.len(), 1);
        assert_eq!(
            mid.copies[0].error_output.as_ref().unwrap().target(),
            "rejects"
        );
        assert_eq!(planned(&t, "rejects").copies[0].inputs.len(), 1);
    }

    #[test]
    fn test_disabled_hop_absent() {
        let d = def().hop(HopDefinition::new("src", "sink").disabled());
        let t = Topology::build(&d, 10).unwrap();
        assert_eq!(t.rowsets.len(), 2);
        assert_eq!(planned(&t, "sink").copies[0].inputs.len(), 1);
        assert!(t.pruned.is_empty());
    }

    #[test]
    fn test_prunes_unused_input_single_level() {
        let d = TransDefinition::new("t")
            .step(StepDefinition::new("dead", "Sequence"))
            .step(StepDefinition::new("orphan", "Dummy"))
            .step(StepDefinition::new("live", "Sequence"))
            .step(StepDefinition::new("sink", "Dummy"))
            .hop(HopDefinition::new("dead", "orphan").disabled())
            .hop(HopDefinition::new("live", "sink"));
        let t = Topology::build(&d, 10).unwrap();

        assert_eq!(t.pruned, vec!["dead".to_string()]);
        // 다음 단계는 제거하지 않는다
        assert!(t.steps.iter().any(|s| s.definition.name == "orphan"));
        assert!(!t.steps.iter().any(|s| s.definition.name == "dead"));
    }

    #[test]
    fn test_no_prune_with_incoming_hop() {
        // sink의 출력 hop은 모두 비활성이지만 입력 hop이 있으므로 유지
        let d = def().hop(HopDefinition::new("sink", "src").disabled());
        let t = Topology::build(&d, 10).unwrap();
        assert!(t.pruned.is_empty());
        assert_eq!(t.steps.len(), 3);
    }

    #[test]
    fn test_cycle_detected() {
        let d = def().hop(HopDefinition::new("sink", "mid"));
        assert!(matches!(
            Topology::build(&d, 10),
            Err(EtxError::CycleDetected(_))
        ));

        // 비활성 hop의 사이클은 무시
        let d = def().hop(HopDefinition::new("sink", "mid").disabled());
        assert!(Topology::build(&d, 10).is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let unknown = def().hop(HopDefinition::new("mid", "nowhere"));
        assert!(matches!(
            Topology::build(&unknown, 10),
            Err(EtxError::StepNotFound(ref s)) if s == "nowhere"
        ));

        let dup = def().step(StepDefinition::new("mid", "Dummy"));
        assert!(matches!(
            Topology::build(&dup, 10),
            Err(EtxError::DuplicateStep(_))
        ));

        let zero = TransDefinition::new("t").step(StepDefinition::new("a", "Dummy").with_copies(0));
        assert!(matches!(Topology::build(&zero, 10), Err(EtxError::Config(_))));

        let self_hop = def().hop(HopDefinition::new("mid", "mid"));
        assert!(Topology::build(&self_hop, 10).is_err());

        let two_error_hops = def()
            .hop(HopDefinition::error("mid", "sink"))
            .hop(HopDefinition::error("mid", "src"));
        assert!(Topology::build(&two_error_hops, 10).is_err());
    }
}
