//! Step runner — 한 step copy의 상태 기계와 실행 루프

use super::{StepContext, StepPlugin, StepState, StepStatus};
use crate::error::{EtxError, EtxResult};
use crate::trans::StopReason;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// 플러그인 훅 호출 중 발생한 panic을 치명적 실패로 변환
fn guarded<T>(step: &str, f: impl FnOnce() -> EtxResult<T>) -> EtxResult<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(EtxError::StepFailed {
            step: step.to_string(),
            reason: format!("panicked: {reason}"),
        })
    })
}

/// One step copy: plugin, context and shared status.
pub(crate) struct StepInstance {
    pub(crate) plugin: Box<dyn StepPlugin>,
    pub(crate) ctx: StepContext,
    pub(crate) status: Arc<StepStatus>,
}

impl StepInstance {
    pub(crate) fn new(plugin: Box<dyn StepPlugin>, ctx: StepContext, status: Arc<StepStatus>) -> Self {
        Self {
            plugin,
            ctx,
            status,
        }
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!("step", name = %self.ctx.step_name(), copy = self.ctx.copy())
    }

    /// CREATED → INITIALIZED, 실패 시 곧바로 FAILED
    pub(crate) fn init(&mut self) -> EtxResult<()> {
        let span = self.span();
        let _enter = span.enter();

        let capabilities = self.plugin.capabilities();
        self.ctx.enable_error_handling(capabilities.error_handling);

        let name = self.ctx.step_name().to_string();
        let (plugin, ctx) = (&mut self.plugin, &mut self.ctx);
        let result = guarded(&name, || plugin.init(ctx));

        match result {
            Ok(()) => {
                self.status.set(StepState::Initialized);
                tracing::debug!(
                    error_handling = self.ctx.error_handling_enabled(),
                    transactional = capabilities.transactional,
                    "step initialized"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "error initializing step");
                self.ctx.add_error();
                self.ctx.set_outcome(StepState::Failed);
                self.status.set(StepState::Failed);
                Err(EtxError::InitFailed {
                    step: name,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// 스레드 본문: RUNNING → {FINISHED|STOPPED|FAILED} → DISPOSED
    pub(crate) fn run(mut self) {
        let span = self.span();
        let _enter = span.enter();

        self.status.set(StepState::Running);
        tracing::debug!("starting to run");

        let outcome = self.process_loop();
        self.finish(outcome);
        self.dispose();
    }

    fn process_loop(&mut self) -> StepState {
        loop {
            if self.ctx.is_stopped() {
                return StepState::Stopped;
            }

            let name = self.ctx.step_name().to_string();
            let (plugin, ctx) = (&mut self.plugin, &mut self.ctx);
            let result = guarded(&name, || plugin.process_row(ctx));

            match result {
                Ok(true) => {}
                Ok(false) if self.ctx.is_stopped() => return StepState::Stopped,
                Ok(false) => return StepState::Finished,
                Err(EtxError::RowFailed { row, diagnostic })
                    if self.ctx.error_handling_enabled() =>
                {
                    tracing::debug!(code = %diagnostic.code, "row sent to error hop");
                    if let Err(e) = self.ctx.put_error(*row, diagnostic) {
                        return self.fail(e);
                    }
                }
                Err(e) => return self.fail(e),
            }
        }
    }

    fn fail(&mut self, err: EtxError) -> StepState {
        if err.is_row_failure() {
            tracing::error!(error = %err, "row failure without error handling, stopping all steps");
        } else {
            tracing::error!(error = %err, "unexpected error in step, stopping all steps");
        }
        self.ctx.add_error();
        self.ctx.control().stop(StopReason::StepFailed {
            step: self.ctx.step_name().to_string(),
        });
        StepState::Failed
    }

    fn finish(&mut self, outcome: StepState) {
        // 하류가 멈추지 않도록 종료 표시는 어떤 경우에도 게시한다
        self.ctx.set_output_done();
        self.ctx.detach_inputs();
        self.ctx.set_outcome(outcome);
        self.status.set(outcome);

        let c = self.ctx.counters();
        match outcome {
            StepState::Finished => tracing::info!(
                read = c.read(),
                written = c.written(),
                errors = c.errors(),
                "finished processing (I={}, O={}, R={}, W={}, U={}, E={})",
                c.input(),
                c.output(),
                c.read(),
                c.written(),
                c.updated(),
                c.errors()
            ),
            StepState::Stopped => tracing::warn!(
                read = c.read(),
                written = c.written(),
                "step stopped"
            ),
            _ => tracing::error!(errors = c.errors(), "step failed"),
        }
    }

    /// 초기화된 뒤 실행되지 못한 인스턴스 (다른 스텝의 init 실패)
    pub(crate) fn abandon(&mut self) {
        if self.status.state() == StepState::Initialized {
            self.ctx.set_outcome(StepState::Stopped);
            self.status.set(StepState::Stopped);
        }
        self.ctx.set_output_done();
        self.dispose();
    }

    /// dispose 훅은 정확히 한 번. 실패는 로그와 에러 카운트로만 남는다.
    fn dispose(&mut self) {
        if self.status.is_disposed() {
            return;
        }
        let name = self.ctx.step_name().to_string();
        let (plugin, ctx) = (&mut self.plugin, &mut self.ctx);
        let result = guarded(&name, || plugin.dispose(ctx));

        if let Err(e) = result {
            tracing::error!(step = %name, error = %e, "error disposing step");
            self.ctx.add_error();
        }
        self.status.set(StepState::Disposed);
    }
}
