//! Step registry — 플러그인 키 → 생성자
//!
//! 그래프 구성 시 [`StepDefinition::plugin`](crate::trans::StepDefinition) 키로
//! step copy마다 새 플러그인 인스턴스를 만든다.

use crate::error::{EtxError, EtxResult};
use crate::step::{StepMeta, StepPlugin};
use crate::steps::{Dummy, Sequence};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Plugin constructor. Called once per step copy.
pub type StepConstructor = dyn Fn(&StepMeta) -> EtxResult<Box<dyn StepPlugin>> + Send + Sync;

/// 플러그인 레지스트리
#[derive(Default)]
pub struct StepRegistry {
    constructors: DashMap<String, Arc<StepConstructor>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Dummy`, `Sequence` 등록
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.insert(Dummy::KEY, |_| Ok(Box::new(Dummy) as Box<dyn StepPlugin>));
        registry.insert(Sequence::KEY, |meta| {
            Ok(Box::new(Sequence::from_meta(meta)?) as Box<dyn StepPlugin>)
        });
        registry
    }

    fn insert<F>(&self, key: &str, constructor: F)
    where
        F: Fn(&StepMeta) -> EtxResult<Box<dyn StepPlugin>> + Send + Sync + 'static,
    {
        self.constructors.insert(key.to_string(), Arc::new(constructor));
    }

    /// 생성자 등록. 같은 키가 이미 있으면 에러
    pub fn register<F>(&self, key: impl Into<String>, constructor: F) -> EtxResult<()>
    where
        F: Fn(&StepMeta) -> EtxResult<Box<dyn StepPlugin>> + Send + Sync + 'static,
    {
        let key = key.into();
        match self.constructors.entry(key) {
            Entry::Occupied(e) => Err(EtxError::DuplicatePlugin(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(Arc::new(constructor));
                Ok(())
            }
        }
    }

    /// 등록 해제
    pub fn unregister(&self, key: &str) -> EtxResult<()> {
        self.constructors
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| EtxError::PluginNotFound(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.constructors.contains_key(key)
    }

    /// 새 플러그인 인스턴스 생성
    pub fn create(&self, key: &str, meta: &StepMeta) -> EtxResult<Box<dyn StepPlugin>> {
        let constructor = self
            .constructors
            .get(key)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| EtxError::PluginNotFound(key.to_string()))?;

        // 샤드 락을 잡은 채로 생성자를 부르지 않는다
        constructor(meta)
    }

    /// 등록된 키 목록 (정렬)
    pub fn list(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.constructors.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("plugins", &self.list())
            .finish()
    }
}
