//! ExecStatement — 입력 행의 필드에 담긴 문장을 행마다 실행
//!
//! | param             | 설명 |
//! |-------------------|------|
//! | `statement_field` | 실행할 문장이 담긴 필드 (필수) |
//! | `commit_size`     | N행마다 commit, 0이면 dispose 때만 (기본 0) |
//! | `read_field`      | 결과 행 수를 덧붙일 필드 이름 (선택) |
//! | `insert_field`    | 〃 |
//! | `update_field`    | 〃 |
//! | `delete_field`    | 〃 |

use crate::error::{ErrorDiagnostic, EtxError, EtxResult};
use crate::resource::{CommitPolicy, FinishAction, StatementOutcome, TransactionalResource};
use crate::row::{Row, RowSchema, Value, ValueMeta, ValueType};
use crate::step::{Canceller, Capabilities, StepContext, StepMeta, StepPlugin, StepState};
use std::sync::Arc;

/// Error code of rows rejected because their statement failed.
pub const EXEC_ERROR_CODE: &str = "EXEC001";

#[derive(Debug, Clone, Copy)]
enum ResultKind {
    Read,
    Inserted,
    Updated,
    Deleted,
}

impl ResultKind {
    fn pick(self, outcome: &StatementOutcome) -> i64 {
        let n = match self {
            ResultKind::Read => outcome.read,
            ResultKind::Inserted => outcome.inserted,
            ResultKind::Updated => outcome.updated,
            ResultKind::Deleted => outcome.deleted,
        };
        i64::try_from(n).unwrap_or(i64::MAX)
    }
}

/// Per-row statement execution against a [`TransactionalResource`].
pub struct ExecStatement {
    resource: Box<dyn TransactionalResource>,
    statement_field: String,
    result_fields: Vec<(String, ResultKind)>,
    policy: CommitPolicy,
    statement_index: Option<usize>,
    // (입력 스키마, 출력 스키마)
    schemas: Option<(Arc<RowSchema>, Arc<RowSchema>)>,
}

impl ExecStatement {
    pub const KEY: &'static str = "ExecStatement";

    pub fn new(meta: &StepMeta, resource: Box<dyn TransactionalResource>) -> EtxResult<Self> {
        let statement_field = meta.required_param("statement_field")?.to_string();
        let commit_size = meta.parse_param::<u64>("commit_size")?.unwrap_or(0);

        let result_fields = [
            ("read_field", ResultKind::Read),
            ("insert_field", ResultKind::Inserted),
            ("update_field", ResultKind::Updated),
            ("delete_field", ResultKind::Deleted),
        ]
        .into_iter()
        .filter_map(|(param, kind)| {
            meta.param(param)
                .filter(|name| !name.is_empty())
                .map(|name| (name.to_string(), kind))
        })
        .collect();

        Ok(Self {
            resource,
            statement_field,
            result_fields,
            policy: CommitPolicy::new(commit_size),
            statement_index: None,
            schemas: None,
        })
    }

    pub fn policy(&self) -> &CommitPolicy {
        &self.policy
    }

    fn output_schema(&mut self, input: &Arc<RowSchema>) -> EtxResult<Arc<RowSchema>> {
        if let Some((cached, output)) = &self.schemas
            && Arc::ptr_eq(cached, input)
        {
            return Ok(Arc::clone(output));
        }

        let index = input
            .index_of(&self.statement_field)
            .ok_or_else(|| EtxError::FieldNotFound(self.statement_field.clone()))?;
        let output = Arc::new(input.extended(
            self.result_fields
                .iter()
                .map(|(name, _)| ValueMeta::new(name.clone(), ValueType::Integer)),
        )?);

        self.statement_index = Some(index);
        self.schemas = Some((Arc::clone(input), Arc::clone(&output)));
        Ok(output)
    }

    fn reject(&self, row: Row, message: impl Into<String>) -> EtxError {
        EtxError::row_failed(row, ErrorDiagnostic::new(message, EXEC_ERROR_CODE))
    }
}

impl StepPlugin for ExecStatement {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            error_handling: true,
            transactional: true,
        }
    }

    fn init(&mut self, ctx: &mut StepContext) -> EtxResult<()> {
        tracing::debug!(
            step = %ctx.step_name(),
            statement_field = %self.statement_field,
            commit_size = self.policy.commit_size(),
            auto_commit = self.resource.is_auto_commit(),
            "statement executor ready"
        );
        Ok(())
    }

    fn process_row(&mut self, ctx: &mut StepContext) -> EtxResult<bool> {
        let Some(row) = ctx.get_row()? else {
            return Ok(false);
        };

        // 문장 필드가 없으면 행 단위가 아니라 스텝 전체의 실패
        let output = self.output_schema(row.schema())?;
        let index = self
            .statement_index
            .ok_or_else(|| EtxError::FieldNotFound(self.statement_field.clone()))?;

        let statement = match row.get(index) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            _ => return Err(self.reject(row, "empty statement")),
        };

        tracing::trace!(step = %ctx.step_name(), %statement, "executing statement");
        let outcome = match self.resource.execute(&statement) {
            Ok(outcome) => outcome,
            // stop_all이 취소한 문장은 행 실패가 아니다
            Err(e) if ctx.is_stopped() => {
                tracing::debug!(step = %ctx.step_name(), error = %e, "statement interrupted");
                return Ok(false);
            }
            Err(e) => return Err(self.reject(row, e.to_string())),
        };

        let counters = ctx.counters();
        counters.add_input(outcome.read);
        counters.add_output(outcome.inserted + outcome.updated + outcome.deleted);
        counters.add_inserted(outcome.inserted);
        counters.add_updated(outcome.updated);
        counters.add_deleted(outcome.deleted);

        // 주기적 commit 실패도 이 행의 실패로 취급
        if let Err(e) = self.policy.after_row(self.resource.as_mut()) {
            return Err(self.reject(row, e.to_string()));
        }

        let extra = self
            .result_fields
            .iter()
            .map(|(_, kind)| Value::Integer(kind.pick(&outcome)))
            .collect();
        let out_row = row.extend(output, extra)?;
        ctx.put_row(out_row)?;
        Ok(true)
    }

    fn dispose(&mut self, ctx: &mut StepContext) -> EtxResult<()> {
        let clean = ctx.outcome() == Some(StepState::Finished) && ctx.errors() == 0;
        let action = self.policy.finish(self.resource.as_mut(), clean)?;

        match action {
            FinishAction::RolledBack => tracing::warn!(
                step = %ctx.step_name(),
                rows = self.policy.rows(),
                "rolled back"
            ),
            _ => tracing::info!(
                step = %ctx.step_name(),
                rows = self.policy.rows(),
                commits = self.policy.commits(),
                "finished executing statements"
            ),
        }
        Ok(())
    }

    fn canceller(&self) -> Option<Arc<dyn Canceller>> {
        self.resource.canceller()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rowset::RowSet;
    use crate::step::OutputGroup;
    use crate::trans::TransControl;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Log {
        executed: Vec<String>,
        commits: u32,
        rollbacks: u32,
        fail_commit: bool,
    }

    struct FakeDb(Arc<Mutex<Log>>);

    impl TransactionalResource for FakeDb {
        fn execute(&mut self, statement: &str) -> EtxResult<StatementOutcome> {
            if statement.starts_with("BAD") {
                return Err(EtxError::resource("execute", "syntax error"));
            }
            self.0.lock().executed.push(statement.to_string());
            Ok(StatementOutcome {
                inserted: 1,
                ..StatementOutcome::default()
            })
        }

        fn is_auto_commit(&self) -> bool {
            false
        }

        fn commit(&mut self) -> EtxResult<()> {
            let mut log = self.0.lock();
            if log.fail_commit {
                return Err(EtxError::resource("commit", "connection lost"));
            }
            log.commits += 1;
            Ok(())
        }

        fn rollback(&mut self) -> EtxResult<()> {
            self.0.lock().rollbacks += 1;
            Ok(())
        }
    }

    fn meta(params: &[(&str, &str)]) -> StepMeta {
        let params: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StepMeta::new("exec").with_params(params)
    }

    fn input(statements: &[&str]) -> Arc<RowSet> {
        let schema = Arc::new(RowSchema::new(vec![ValueMeta::new("sql", ValueType::String)]).unwrap());
        let rs = Arc::new(RowSet::new("in", 16));
        for s in statements {
            rs.put(Row::new(Arc::clone(&schema), vec![Value::from(*s)]).unwrap())
                .unwrap();
        }
        rs.close().unwrap();
        rs
    }

    #[test]
    fn test_requires_statement_field() {
        let log = Arc::new(Mutex::new(Log::default()));
        assert!(matches!(
            ExecStatement::new(&meta(&[]), Box::new(FakeDb(log))),
            Err(EtxError::Config(_))
        ));
    }

    #[test]
    fn test_executes_and_appends_results() {
        let log = Arc::new(Mutex::new(Log::default()));
        let m = meta(&[("statement_field", "sql"), ("insert_field", "ins"), ("commit_size", "2")]);
        let mut step = ExecStatement::new(&m, Box::new(FakeDb(Arc::clone(&log)))).unwrap();

        let out = Arc::new(RowSet::new("out", 16));
        let mut ctx = StepContext::new(m, Arc::new(TransControl::unlimited()))
            .with_inputs(vec![input(&["INSERT 1", "INSERT 2", "INSERT 3"])])
            .with_outputs(vec![OutputGroup::new("next", vec![Arc::clone(&out)])]);

        while step.process_row(&mut ctx).unwrap() {}
        assert_eq!(log.lock().executed.len(), 3);
        assert_eq!(log.lock().commits, 1);
        assert_eq!(ctx.counters().inserted(), 3);
        assert_eq!(ctx.counters().output(), 3);

        let first = out.try_get();
        let crate::rowset::Poll::Row(first) = first else {
            panic!("expected a row");
        };
        assert_eq!(first.get_by_name("ins").unwrap(), &Value::Integer(1));

        ctx.set_outcome(StepState::Finished);
        step.dispose(&mut ctx).unwrap();
        assert_eq!(log.lock().commits, 2);
        assert_eq!(log.lock().rollbacks, 0);
    }

    #[test]
    fn test_failed_statement_is_row_failure() {
        let log = Arc::new(Mutex::new(Log::default()));
        let m = meta(&[("statement_field", "sql")]);
        let mut step = ExecStatement::new(&m, Box::new(FakeDb(Arc::clone(&log)))).unwrap();
        let mut ctx = StepContext::new(m, Arc::new(TransControl::unlimited()))
            .with_inputs(vec![input(&["BAD stuff"])]);

        match step.process_row(&mut ctx) {
            Err(EtxError::RowFailed { diagnostic, .. }) => {
                assert_eq!(diagnostic.code, EXEC_ERROR_CODE);
                assert!(diagnostic.message.contains("syntax error"));
            }
            other => panic!("expected row failure, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_commit_is_row_failure() {
        let log = Arc::new(Mutex::new(Log {
            fail_commit: true,
            ..Log::default()
        }));
        let m = meta(&[("statement_field", "sql"), ("commit_size", "1")]);
        let mut step = ExecStatement::new(&m, Box::new(FakeDb(Arc::clone(&log)))).unwrap();
        let out = Arc::new(RowSet::new("out", 4));
        let mut ctx = StepContext::new(m, Arc::new(TransControl::unlimited()))
            .with_inputs(vec![input(&["INSERT 1"])])
            .with_outputs(vec![OutputGroup::new("next", vec![Arc::clone(&out)])]);

        match step.process_row(&mut ctx) {
            Err(EtxError::RowFailed { row, diagnostic }) => {
                assert_eq!(diagnostic.code, EXEC_ERROR_CODE);
                assert!(diagnostic.message.contains("connection lost"));
                assert_eq!(row.get_by_name("sql").unwrap(), &Value::from("INSERT 1"));
            }
            other => panic!("expected row failure, got {other:?}"),
        }
        assert!(out.is_empty());
    }

    #[test]
    fn test_missing_statement_field_is_fatal() {
        let log = Arc::new(Mutex::new(Log::default()));
        let m = meta(&[("statement_field", "query")]);
        let mut step = ExecStatement::new(&m, Box::new(FakeDb(log))).unwrap();
        let mut ctx = StepContext::new(m, Arc::new(TransControl::unlimited()))
            .with_inputs(vec![input(&["INSERT 1"])]);

        assert!(matches!(
            step.process_row(&mut ctx),
            Err(EtxError::FieldNotFound(_))
        ));
    }

    #[test]
    fn test_dispose_rolls_back_after_errors() {
        let log = Arc::new(Mutex::new(Log::default()));
        let m = meta(&[("statement_field", "sql")]);
        let mut step = ExecStatement::new(&m, Box::new(FakeDb(Arc::clone(&log)))).unwrap();
        let mut ctx = StepContext::new(m, Arc::new(TransControl::unlimited()));

        ctx.add_error();
        ctx.set_outcome(StepState::Finished);
        step.dispose(&mut ctx).unwrap();
        assert_eq!(log.lock().rollbacks, 1);
        assert_eq!(log.lock().commits, 0);
    }
}
