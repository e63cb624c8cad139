//! Step context — 플러그인이 보는 행 입출력 창구
//!
//! 입력 row set에서 가용한 순서대로 행을 읽고, 출력 hop마다 행을 복제해
//! 보내며 (같은 대상 스텝의 copy들 사이에서는 round-robin), 에러 hop으로
//! 거부된 행을 보낸다. 모든 블로킹 대기는 `wait_timeout` 단위로 끊어
//! 공유 중단 플래그를 다시 확인한다.

use super::{StepMeta, StepState};
use crate::error::{ErrorDiagnostic, EtxError, EtxResult};
use crate::result::StepCounters;
use crate::row::{Row, RowSchema, Value, ValueMeta, ValueType};
use crate::rowset::{Offer, Poll, RowSet};
use crate::trans::TransControl;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Duration;

/// Diagnostic fields appended to every row sent down an error hop.
pub const ERROR_FIELDS: [&str; 4] = [
    "error_count",
    "error_description",
    "error_field",
    "error_code",
];

const DEFAULT_WAIT: Duration = Duration::from_millis(20);

/// Row sets leading to the copies of one target step.
#[derive(Debug)]
pub struct OutputGroup {
    target: String,
    rowsets: SmallVec<[Arc<RowSet>; 4]>,
    next: usize,
}

impl OutputGroup {
    pub fn new(target: impl Into<String>, rowsets: Vec<Arc<RowSet>>) -> Self {
        Self {
            target: target.into(),
            rowsets: rowsets.into_iter().collect(),
            next: 0,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn rowsets(&self) -> &[Arc<RowSet>] {
        &self.rowsets
    }

    // round-robin
    fn next_rowset(&mut self) -> Option<Arc<RowSet>> {
        if self.rowsets.is_empty() {
            return None;
        }
        let rs = Arc::clone(&self.rowsets[self.next % self.rowsets.len()]);
        self.next = self.next.wrapping_add(1);
        Some(rs)
    }
}

/// Per-copy execution context handed to every plugin hook.
pub struct StepContext {
    meta: StepMeta,
    control: Arc<TransControl>,
    counters: Arc<StepCounters>,
    inputs: Vec<Arc<RowSet>>,
    pending: Vec<Arc<RowSet>>,
    next_input: usize,
    outputs: Vec<OutputGroup>,
    error_output: Option<OutputGroup>,
    error_handling: bool,
    input_schema: Option<Arc<RowSchema>>,
    error_schema: Option<(Arc<RowSchema>, Arc<RowSchema>)>,
    output_done: bool,
    wait_timeout: Duration,
    feedback_size: u64,
    outcome: Option<StepState>,
}

impl StepContext {
    pub fn new(meta: StepMeta, control: Arc<TransControl>) -> Self {
        Self {
            meta,
            control,
            counters: Arc::new(StepCounters::new()),
            inputs: Vec::new(),
            pending: Vec::new(),
            next_input: 0,
            outputs: Vec::new(),
            error_output: None,
            error_handling: false,
            input_schema: None,
            error_schema: None,
            output_done: false,
            wait_timeout: DEFAULT_WAIT,
            feedback_size: 0,
            outcome: None,
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<Arc<RowSet>>) -> Self {
        self.pending = inputs.clone();
        self.inputs = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<OutputGroup>) -> Self {
        self.outputs = outputs;
        self
    }

    /// 에러 hop 연결. 플러그인이 에러 처리 능력을 선언한 경우에만 활성화된다.
    pub fn with_error_output(mut self, group: OutputGroup) -> Self {
        self.error_output = Some(group);
        self
    }

    pub fn with_timing(mut self, wait_timeout: Duration, feedback_size: u64) -> Self {
        self.wait_timeout = wait_timeout.max(Duration::from_millis(1));
        self.feedback_size = feedback_size;
        self
    }

    pub(crate) fn with_counters(mut self, counters: Arc<StepCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub(crate) fn enable_error_handling(&mut self, supported: bool) {
        self.error_handling = supported && self.error_output.is_some();
    }

    // ════════════════════════════════════════════
    // Accessors
    // ════════════════════════════════════════════

    pub fn meta(&self) -> &StepMeta {
        &self.meta
    }

    pub fn step_name(&self) -> &str {
        &self.meta.name
    }

    pub fn copy(&self) -> usize {
        self.meta.copy
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.meta.param(key)
    }

    pub fn control(&self) -> &Arc<TransControl> {
        &self.control
    }

    pub fn counters(&self) -> &StepCounters {
        &self.counters
    }

    pub fn is_stopped(&self) -> bool {
        self.control.is_stopped()
    }

    /// 입력 hop이 없는 스텝 (소스)
    pub fn is_source(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_targets(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(OutputGroup::target)
    }

    /// 첫 입력 행의 스키마
    pub fn input_schema(&self) -> Option<&Arc<RowSchema>> {
        self.input_schema.as_ref()
    }

    pub fn error_handling_enabled(&self) -> bool {
        self.error_handling
    }

    /// dispose 시점에 확정된 종료 상태
    pub fn outcome(&self) -> Option<StepState> {
        self.outcome
    }

    pub(crate) fn set_outcome(&mut self, outcome: StepState) {
        self.outcome = Some(outcome);
    }

    pub fn errors(&self) -> u64 {
        self.counters.errors()
    }

    /// 스텝 에러와 공유 에러 카운터를 함께 증가
    pub fn add_error(&self) {
        self.counters.add_errors(1);
        self.control.add_errors(1);
    }

    // ════════════════════════════════════════════
    // Row I/O
    // ════════════════════════════════════════════

    /// Next row from any input, by availability.
    ///
    /// `None` when every input is exhausted or the run was stopped.
    pub fn get_row(&mut self) -> EtxResult<Option<Row>> {
        loop {
            if self.control.is_stopped() || self.pending.is_empty() {
                return Ok(None);
            }

            // 한 바퀴 non-blocking으로 훑는다
            let mut scanned = 0;
            while scanned < self.pending.len() {
                let idx = self.next_input % self.pending.len();
                match self.pending[idx].try_get() {
                    Poll::Row(row) => {
                        self.next_input = idx + 1;
                        return Ok(Some(self.on_row_read(row)));
                    }
                    Poll::Done => {
                        self.pending.remove(idx);
                    }
                    Poll::Pending => {
                        self.next_input = idx + 1;
                        scanned += 1;
                    }
                }
            }
            if self.pending.is_empty() {
                return Ok(None);
            }

            let idx = self.next_input % self.pending.len();
            match self.pending[idx].poll(Some(self.wait_timeout)) {
                Poll::Row(row) => {
                    self.next_input = idx + 1;
                    return Ok(Some(self.on_row_read(row)));
                }
                Poll::Done => {
                    self.pending.remove(idx);
                }
                Poll::Pending => {}
            }
        }
    }

    fn on_row_read(&mut self, row: Row) -> Row {
        self.counters.add_read(1);
        if self.input_schema.is_none() {
            self.input_schema = Some(Arc::clone(row.schema()));
        }
        row
    }

    /// Sends a row to every output hop.
    ///
    /// 대상 스텝마다 복제하고, 대상의 copy들 사이에서는 round-robin으로 분배한다.
    /// 실행이 중단된 상태면 행을 버린다.
    pub fn put_row(&mut self, row: Row) -> EtxResult<()> {
        if self.output_done {
            return Err(EtxError::InvalidOperation {
                message: "put_row after output done".to_string(),
                context: format!("step '{}' copy {}", self.meta.name, self.meta.copy),
            });
        }
        if self.control.is_stopped() {
            return Ok(());
        }

        if let Some((last, rest)) = self.outputs.split_last_mut() {
            for group in rest {
                if let Some(rs) = group.next_rowset() {
                    Self::offer_row(&self.control, self.wait_timeout, &rs, row.clone())?;
                }
            }
            if let Some(rs) = last.next_rowset() {
                Self::offer_row(&self.control, self.wait_timeout, &rs, row)?;
            }
        }

        let written = self.counters.add_written(1);
        if self.is_source() {
            self.control.record_source_rows(1);
        }
        if self.feedback_size > 0 && written % self.feedback_size == 0 {
            tracing::info!(
                step = %self.meta.name,
                copy = self.meta.copy,
                line = written,
                "linenr {}",
                written
            );
        }
        Ok(())
    }

    fn offer_row(
        control: &TransControl,
        timeout: Duration,
        rs: &RowSet,
        mut row: Row,
    ) -> EtxResult<()> {
        loop {
            match rs.offer(row, Some(timeout))? {
                Offer::Accepted | Offer::Discarded => return Ok(()),
                Offer::Full(back) => {
                    if control.is_stopped() {
                        return Ok(());
                    }
                    row = back;
                }
            }
        }
    }

    /// Sends a rejected row plus its diagnostic down the error hop.
    pub fn put_error(&mut self, row: Row, diagnostic: ErrorDiagnostic) -> EtxResult<()> {
        if !self.error_handling {
            return Err(EtxError::ErrorHandlingDisabled(self.meta.name.clone()));
        }

        let schema = self.error_schema_for(row.schema())?;
        let extra = vec![
            Value::Integer(1),
            Value::String(diagnostic.message),
            diagnostic.field.map(Value::String).unwrap_or(Value::Null),
            Value::String(diagnostic.code),
        ];
        let error_row = row.extend(schema, extra)?;

        if let Some(rs) = self.error_output.as_mut().and_then(OutputGroup::next_rowset)
            && !self.control.is_stopped()
        {
            Self::offer_row(&self.control, self.wait_timeout, &rs, error_row)?;
        }
        self.counters.add_rejected(1);
        self.add_error();
        Ok(())
    }

    fn error_schema_for(&mut self, source: &Arc<RowSchema>) -> EtxResult<Arc<RowSchema>> {
        if let Some((cached_source, extended)) = &self.error_schema
            && Arc::ptr_eq(cached_source, source)
        {
            return Ok(Arc::clone(extended));
        }
        let extended = Arc::new(source.extended([
            ValueMeta::new(ERROR_FIELDS[0], ValueType::Integer),
            ValueMeta::new(ERROR_FIELDS[1], ValueType::String),
            ValueMeta::new(ERROR_FIELDS[2], ValueType::String),
            ValueMeta::new(ERROR_FIELDS[3], ValueType::String),
        ])?);
        self.error_schema = Some((Arc::clone(source), Arc::clone(&extended)));
        Ok(extended)
    }

    /// 모든 출력 row set (에러 hop 포함)에 종료 표시를 게시. 두 번째 호출은 무시.
    pub fn set_output_done(&mut self) {
        if self.output_done {
            return;
        }
        self.output_done = true;

        let groups = self.outputs.iter().chain(self.error_output.iter());
        for rs in groups.flat_map(|g| g.rowsets.iter()) {
            if let Err(e) = rs.close() {
                tracing::debug!(step = %self.meta.name, error = %e, "row set already closed");
            }
        }
    }

    pub fn is_output_done(&self) -> bool {
        self.output_done
    }

    /// 입력 row set에서 소비자를 분리해 막혀 있는 상류 생산자를 풀어준다.
    pub(crate) fn detach_inputs(&mut self) {
        for rs in &self.inputs {
            rs.detach_consumer();
        }
        self.pending.clear();
    }
}
