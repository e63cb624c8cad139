//! Trans — 그래프 오케스트레이터
//!
//! 정의에서 row set 배선을 만들고, step copy마다 스레드 하나를 띄워
//! 독립적으로 실행시킨 뒤, 모두 종료되면 결과를 집계한다. 행 전달에는
//! 관여하지 않고 토폴로지와 생명주기만 관리한다.

use super::config::{TransConfig, TransDefinition};
use super::control::{StopReason, TransControl};
use super::topology::Topology;
use crate::error::{EtxError, EtxResult};
use crate::registry::StepRegistry;
use crate::result::{Counts, RunResult, StepCounters, StepResult};
use crate::rowset::RowSet;
use crate::step::runner::StepInstance;
use crate::step::{Canceller, StepContext, StepMeta, StepState, StepStatus};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Prepared,
    Running,
    Finished,
}

/// 모니터링용으로 남겨두는 step copy 핸들
struct Slot {
    step: String,
    copy: usize,
    status: Arc<StepStatus>,
    counters: Arc<StepCounters>,
}

/// A materialized transformation: one run of one graph.
///
/// The abort flag and error counter live in a [`TransControl`] owned by this
/// value, so they are scoped to exactly one run.
///
/// # 예제
///
/// ```rust
/// use etx_core::{HopDefinition, StepDefinition, StepRegistry, Trans, TransConfig, TransDefinition};
///
/// # fn main() -> etx_core::EtxResult<()> {
/// let def = TransDefinition::new("demo")
///     .step(StepDefinition::new("gen", "Sequence").with_param("count", "5"))
///     .step(StepDefinition::new("pass", "Dummy"))
///     .hop(HopDefinition::new("gen", "pass"));
///
/// let trans = Trans::new(&def, &StepRegistry::with_builtins(), TransConfig::default())?;
/// trans.execute()?;
/// let result = trans.wait_until_finished()?;
///
/// assert!(result.is_success());
/// assert_eq!(result.step_totals("pass").written, 5);
/// # Ok(())
/// # }
/// ```
pub struct Trans {
    name: String,
    config: TransConfig,
    control: Arc<TransControl>,
    slots: Vec<Slot>,
    rowsets: Vec<Arc<RowSet>>,
    instances: Mutex<Vec<StepInstance>>,
    cancellers: Mutex<Vec<(String, Arc<dyn Canceller>)>>,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
    phase: Mutex<Phase>,
    started: Mutex<Option<Instant>>,
    elapsed: Mutex<Option<Duration>>,
}

impl Trans {
    /// 검증, 미사용 입력 제거, 배선, 플러그인 생성. 모든 인스턴스는 CREATED.
    pub fn new(
        def: &TransDefinition,
        registry: &StepRegistry,
        config: TransConfig,
    ) -> EtxResult<Self> {
        config.validate()?;
        let topology = Topology::build(def, config.queue_size)?;
        tracing::debug!(
            trans = %def.name,
            copies = topology.copy_count(),
            "wiring built"
        );
        let Topology {
            steps,
            rowsets,
            pruned,
        } = topology;

        let control = Arc::new(TransControl::new(config.max_errors, config.row_limit));
        let mut slots = Vec::new();
        let mut instances = Vec::new();

        for planned in steps {
            let def_step = planned.definition;
            let params = Arc::new(def_step.params.clone());
            let copies = planned.copies.len();

            for (copy, wiring) in planned.copies.into_iter().enumerate() {
                let meta = StepMeta {
                    name: def_step.name.clone(),
                    copy,
                    copies,
                    params: Arc::clone(&params),
                };
                let plugin = registry.create(&def_step.plugin, &meta)?;
                if planned.has_error_hop && !plugin.capabilities().error_handling {
                    return Err(EtxError::Config(format!(
                        "step '{}' ({}) does not support error handling but has an error hop",
                        def_step.name, def_step.plugin
                    )));
                }

                let counters = Arc::new(StepCounters::new());
                let status = Arc::new(StepStatus::new());
                let mut ctx = StepContext::new(meta, Arc::clone(&control))
                    .with_counters(Arc::clone(&counters))
                    .with_inputs(wiring.inputs)
                    .with_outputs(wiring.outputs)
                    .with_timing(config.wait_timeout(), config.feedback_size);
                if let Some(group) = wiring.error_output {
                    ctx = ctx.with_error_output(group);
                }

                slots.push(Slot {
                    step: def_step.name.clone(),
                    copy,
                    status: Arc::clone(&status),
                    counters,
                });
                instances.push(StepInstance::new(plugin, ctx, status));
            }
        }

        tracing::info!(
            trans = %def.name,
            steps = slots.len(),
            rowsets = rowsets.len(),
            pruned = pruned.len(),
            "transformation built"
        );

        Ok(Self {
            name: def.name.clone(),
            config,
            control,
            slots,
            rowsets,
            instances: Mutex::new(instances),
            cancellers: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            phase: Mutex::new(Phase::Created),
            started: Mutex::new(None),
            elapsed: Mutex::new(None),
        })
    }

    /// 정의에 포함된 설정(없으면 기본값)으로 생성
    pub fn from_definition(def: &TransDefinition, registry: &StepRegistry) -> EtxResult<Self> {
        Self::new(def, registry, def.effective_config())
    }

    // ════════════════════════════════════════════
    // Lifecycle
    // ════════════════════════════════════════════

    /// Runs every init hook in parallel.
    ///
    /// 하나라도 실패하면 모든 인스턴스를 dispose하고 행이 흐르기 전에
    /// [`EtxError::InitFailed`]를 돌려준다.
    pub fn prepare_execution(&self) -> EtxResult<()> {
        let mut phase = self.phase.lock();
        if *phase != Phase::Created {
            return Err(self.invalid("prepare_execution", *phase));
        }

        let mut instances = self.instances.lock();
        let results: Vec<EtxResult<()>> =
            instances.par_iter_mut().map(StepInstance::init).collect();

        if let Some(err) = results.into_iter().find_map(Result::err) {
            if let EtxError::InitFailed { step, .. } = &err {
                self.control.stop(StopReason::StepFailed { step: step.clone() });
            }
            tracing::error!(trans = %self.name, error = %err, "unable to prepare for execution");

            for instance in instances.iter_mut() {
                instance.abandon();
            }
            instances.clear();
            *self.elapsed.lock() = Some(Duration::ZERO);
            *phase = Phase::Finished;
            return Err(err);
        }

        let mut cancellers = self.cancellers.lock();
        for instance in instances.iter() {
            if let Some(c) = instance.plugin.canceller() {
                cancellers.push((instance.ctx.step_name().to_string(), c));
            }
        }

        tracing::debug!(trans = %self.name, steps = instances.len(), "all steps initialized");
        *phase = Phase::Prepared;
        Ok(())
    }

    /// step copy마다 스레드 시작 (`<step>.<copy>` 이름)
    pub fn start_threads(&self) -> EtxResult<()> {
        let mut phase = self.phase.lock();
        if *phase != Phase::Prepared {
            return Err(self.invalid("start_threads", *phase));
        }

        let instances = std::mem::take(&mut *self.instances.lock());
        *self.started.lock() = Some(Instant::now());
        *phase = Phase::Running;

        let mut handles = self.handles.lock();
        let mut pending = instances.into_iter();
        while let Some(instance) = pending.next() {
            let thread_name = format!("{}.{}", instance.ctx.step_name(), instance.ctx.copy());
            let spawned = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || instance.run());

            match spawned {
                Ok(handle) => handles.push((thread_name, handle)),
                Err(e) => {
                    tracing::error!(thread = %thread_name, error = %e, "unable to start step thread");
                    self.control.add_errors(1);
                    self.control.stop(StopReason::StepFailed {
                        step: thread_name.clone(),
                    });
                    for mut rest in pending.by_ref() {
                        rest.abandon();
                    }
                    return Err(EtxError::Thread(format!("{thread_name}: {e}")));
                }
            }
        }

        tracing::info!(trans = %self.name, threads = handles.len(), "transformation started");
        Ok(())
    }

    /// `prepare_execution` + `start_threads`
    pub fn execute(&self) -> EtxResult<()> {
        self.prepare_execution()?;
        self.start_threads()
    }

    /// `execute` + `wait_until_finished`
    pub fn run(&self) -> EtxResult<RunResult> {
        self.execute()?;
        self.wait_until_finished()
    }

    /// 외부 중단 요청. 중단 플래그를 올리고 진행 중인 블로킹 작업을 취소한다.
    pub fn stop_all(&self) {
        if self.control.stop(StopReason::External) {
            tracing::warn!(trans = %self.name, "stopping all steps");
        }

        let cancellers = self.cancellers.lock().clone();
        for (step, canceller) in cancellers {
            if let Err(e) = canceller.cancel() {
                tracing::warn!(step = %step, error = %e, "unable to cancel running operation");
            }
        }
    }

    /// Blocks until every step copy reached DISPOSED, then aggregates.
    pub fn wait_until_finished(&self) -> EtxResult<RunResult> {
        {
            let phase = *self.phase.lock();
            if matches!(phase, Phase::Created | Phase::Prepared) {
                return Err(self.invalid("wait_until_finished", phase));
            }
        }

        // 다른 대기자는 조인이 끝날 때까지 이 잠금에서 블록된다
        {
            let mut handles = self.handles.lock();
            for (thread_name, handle) in handles.drain(..) {
                if handle.join().is_err() {
                    tracing::error!(thread = %thread_name, "step thread terminated abnormally");
                    self.control.add_errors(1);
                    self.control.stop(StopReason::StepFailed { step: thread_name });
                }
            }

            let mut phase = self.phase.lock();
            if *phase == Phase::Running {
                let started = *self.started.lock();
                *self.elapsed.lock() = Some(started.map(|t| t.elapsed()).unwrap_or_default());
                *phase = Phase::Finished;
            }
        }

        let result = self.result();
        tracing::info!(
            trans = %self.name,
            status = ?result.status,
            errors = result.errors,
            read = result.totals.read,
            written = result.totals.written,
            "transformation finished"
        );
        Ok(result)
    }

    fn invalid(&self, operation: &str, phase: Phase) -> EtxError {
        EtxError::InvalidOperation {
            message: format!("{operation} not allowed in phase {phase:?}"),
            context: format!("transformation '{}'", self.name),
        }
    }

    // ════════════════════════════════════════════
    // Monitoring
    // ════════════════════════════════════════════

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &TransConfig {
        &self.config
    }

    /// 모든 step copy가 DISPOSED에 도달했는지
    pub fn is_finished(&self) -> bool {
        match *self.phase.lock() {
            Phase::Finished => true,
            Phase::Running => self.slots.iter().all(|s| s.status.is_disposed()),
            _ => false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.control.is_stopped()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.control.stop_reason().cloned()
    }

    /// 공유 에러 카운트
    pub fn errors(&self) -> u64 {
        self.control.errors()
    }

    pub fn step_status(&self, step: &str, copy: usize) -> Option<StepState> {
        self.slots
            .iter()
            .find(|s| s.step == step && s.copy == copy)
            .map(|s| s.status.state())
    }

    pub fn step_results(&self) -> Vec<StepResult> {
        self.slots
            .iter()
            .map(|s| StepResult {
                step: s.step.clone(),
                copy: s.copy,
                state: s.status.state(),
                outcome: s.status.outcome(),
                counts: s.counters.snapshot(),
                duration: s.status.duration(),
            })
            .collect()
    }

    pub fn rowsets(&self) -> &[Arc<RowSet>] {
        &self.rowsets
    }

    /// 현재 시점의 run 결과. 종료 후에는 최종 결과.
    pub fn result(&self) -> RunResult {
        let steps = self.step_results();
        let mut totals = Counts::default();
        for s in &steps {
            totals += s.counts;
        }

        let errors = self.control.errors();
        let stop_reason = self.control.stop_reason().cloned();
        let duration = match *self.elapsed.lock() {
            Some(d) => d,
            None => self.started.lock().map(|t| t.elapsed()).unwrap_or_default(),
        };

        RunResult {
            status: RunResult::classify(errors, stop_reason.as_ref(), &steps),
            errors,
            totals,
            stop_reason,
            steps,
            duration,
        }
    }
}

impl std::fmt::Debug for Trans {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trans")
            .field("name", &self.name)
            .field("steps", &self.slots.len())
            .field("rowsets", &self.rowsets.len())
            .field("phase", &*self.phase.lock())
            .finish()
    }
}
