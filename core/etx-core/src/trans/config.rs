//! Transformation definition and engine settings
//!
//! 설정 값은 이미 해석된 상태로 들어온다 (변수 치환 없음).

use crate::error::{EtxError, EtxResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

// ════════════════════════════════════════════
// Engine settings
// ════════════════════════════════════════════

/// 엔진 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransConfig {
    /// Row set 용량 (행 단위)
    pub queue_size: usize,
    /// 블로킹 대기 중 중단 플래그를 다시 확인하는 주기 (ms)
    pub wait_timeout_ms: u64,
    /// N행마다 진행 로그. 0이면 끔
    pub feedback_size: u64,
    /// 공유 에러 카운트 제한
    pub max_errors: Option<u64>,
    /// 소스 스텝이 내보내는 행 수 제한
    pub row_limit: Option<u64>,
}

impl Default for TransConfig {
    fn default() -> Self {
        Self {
            queue_size: 100,
            wait_timeout_ms: 20,
            feedback_size: 50_000,
            max_errors: None,
            row_limit: None,
        }
    }
}

impl TransConfig {
    pub const ENV_QUEUE_SIZE: &'static str = "ETX_QUEUE_SIZE";
    pub const ENV_WAIT_TIMEOUT_MS: &'static str = "ETX_WAIT_TIMEOUT_MS";
    pub const ENV_FEEDBACK_SIZE: &'static str = "ETX_FEEDBACK_SIZE";
    pub const ENV_MAX_ERRORS: &'static str = "ETX_MAX_ERRORS";
    pub const ENV_ROW_LIMIT: &'static str = "ETX_ROW_LIMIT";

    pub fn with_queue_size(mut self, size: usize) -> Self {
        self.queue_size = size;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_feedback_size(mut self, rows: u64) -> Self {
        self.feedback_size = rows;
        self
    }

    pub fn with_max_errors(mut self, limit: u64) -> Self {
        self.max_errors = Some(limit);
        self
    }

    pub fn with_row_limit(mut self, limit: u64) -> Self {
        self.row_limit = Some(limit);
        self
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms.max(1))
    }

    /// 환경 변수에서 로드 (`ETX_*`)
    pub fn from_env() -> EtxResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 기본값 위에 `lookup`이 돌려주는 값을 덮어쓴다.
    pub fn from_lookup<F>(lookup: F) -> EtxResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse_var::<usize>(&lookup, Self::ENV_QUEUE_SIZE)? {
            config.queue_size = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, Self::ENV_WAIT_TIMEOUT_MS)? {
            config.wait_timeout_ms = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, Self::ENV_FEEDBACK_SIZE)? {
            config.feedback_size = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, Self::ENV_MAX_ERRORS)? {
            config.max_errors = Some(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, Self::ENV_ROW_LIMIT)? {
            config.row_limit = Some(v);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EtxResult<()> {
        if self.queue_size == 0 {
            return Err(EtxError::Config("queue_size must be at least 1".to_string()));
        }
        if self.max_errors == Some(0) {
            return Err(EtxError::Config("max_errors must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> EtxResult<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| EtxError::Config(format!("invalid value '{raw}' for {key}"))),
    }
}

// ════════════════════════════════════════════
// Graph definition
// ════════════════════════════════════════════

/// Hop 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HopKind {
    #[default]
    Normal,
    /// 거부된 행이 흐르는 에러 hop
    Error,
}

fn one() -> usize {
    1
}

fn enabled() -> bool {
    true
}

/// One step of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    /// Registry key
    pub plugin: String,
    #[serde(default = "one")]
    pub copies: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plugin: plugin.into(),
            copies: 1,
            params: BTreeMap::new(),
        }
    }

    pub fn with_copies(mut self, copies: usize) -> Self {
        self.copies = copies;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Directed edge between two steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopDefinition {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub kind: HopKind,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

impl HopDefinition {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: HopKind::Normal,
            enabled: true,
        }
    }

    pub fn error(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind: HopKind::Error,
            ..Self::new(from, to)
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// 스텝 목록 + hop 목록 (+ 선택적 엔진 설정)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransDefinition {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub hops: Vec<HopDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<TransConfig>,
}

impl TransDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    pub fn hop(mut self, hop: HopDefinition) -> Self {
        self.hops.push(hop);
        self
    }

    pub fn with_config(mut self, config: TransConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn find_step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// 정의에 포함된 설정, 없으면 기본값
    pub fn effective_config(&self) -> TransConfig {
        self.config.clone().unwrap_or_default()
    }

    pub fn from_json_str(json: &str) -> EtxResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> EtxResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 파일에서 로드
    pub fn load_from_file(path: impl AsRef<Path>) -> EtxResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// 파일에 저장
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> EtxResult<()> {
        let path = path.as_ref();
        let json = self.to_json_string()?;

        // 디렉토리 생성
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, json)?;
        Ok(())
    }
}
