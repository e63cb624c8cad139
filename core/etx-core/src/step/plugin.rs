//! Step plugin contract
//!
//! 모든 스텝 플러그인의 공통 인터페이스

use super::StepContext;
use crate::error::{EtxError, EtxResult};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

/// 플러그인이 선언하는 능력
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// 행 단위 실패를 에러 hop으로 보낼 수 있음
    pub error_handling: bool,
    /// 트랜잭션 자원을 감싸며 배치 커밋을 수행함
    pub transactional: bool,
}

/// `stopRunning` 시 진행 중인 블로킹 작업(긴 외부 호출 등)을 즉시 중단시키는 핸들
pub trait Canceller: Send + Sync {
    fn cancel(&self) -> EtxResult<()>;
}

impl<F> Canceller for F
where
    F: Fn() -> EtxResult<()> + Send + Sync,
{
    fn cancel(&self) -> EtxResult<()> {
        self()
    }
}

/// Static, already-resolved configuration of one step copy.
#[derive(Debug, Clone)]
pub struct StepMeta {
    pub name: String,
    pub copy: usize,
    pub copies: usize,
    pub params: Arc<BTreeMap<String, String>>,
}

impl StepMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            copy: 0,
            copies: 1,
            params: Arc::new(BTreeMap::new()),
        }
    }

    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = Arc::new(params);
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn required_param(&self, key: &str) -> EtxResult<&str> {
        self.param(key).filter(|v| !v.is_empty()).ok_or_else(|| {
            EtxError::Config(format!("step '{}': parameter '{}' is required", self.name, key))
        })
    }

    /// 파라미터를 파싱. 없으면 `Ok(None)`
    pub fn parse_param<T: FromStr>(&self, key: &str) -> EtxResult<Option<T>> {
        match self.param(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
                EtxError::Config(format!(
                    "step '{}': invalid value '{}' for parameter '{}'",
                    self.name, raw, key
                ))
            }),
        }
    }
}

/// Operator plugin.
///
/// The engine owns one boxed instance per step copy and calls it from that
/// copy's thread only:
///
/// 1. [`init`](StepPlugin::init) once, before any row flows. An error fails the run.
/// 2. [`process_row`](StepPlugin::process_row) repeatedly until it returns
///    `Ok(false)`, returns a fatal error, or the run is stopped. Returning
///    [`EtxError::RowFailed`] is a recoverable row failure.
/// 3. [`dispose`](StepPlugin::dispose) exactly once, whatever the outcome.
pub trait StepPlugin: Send {
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn init(&mut self, _ctx: &mut StepContext) -> EtxResult<()> {
        Ok(())
    }

    /// 한 단위의 작업을 처리. `true`면 더 처리할 작업이 있을 수 있음
    fn process_row(&mut self, ctx: &mut StepContext) -> EtxResult<bool>;

    fn dispose(&mut self, _ctx: &mut StepContext) -> EtxResult<()> {
        Ok(())
    }

    /// Called after init; the engine keeps the handle for `stop_all`.
    fn canceller(&self) -> Option<Arc<dyn Canceller>> {
        None
    }
}
