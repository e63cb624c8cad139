//! Transactional resource contract and batched commits
//!
//! 연결 관리나 드라이버 세부 사항은 이 계약 뒤에 숨는다. 엔진은
//! commit/rollback 시점만 표준화한다.

use crate::error::EtxResult;
use crate::step::Canceller;
use serde::Serialize;
use std::sync::Arc;

/// Row counts reported by one executed statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatementOutcome {
    pub read: u64,
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

/// An external resource with commit/rollback semantics.
///
/// 각 step copy는 자신의 핸들을 가진다. 핸들은 copy 사이에 공유되지 않는다.
pub trait TransactionalResource: Send {
    fn execute(&mut self, statement: &str) -> EtxResult<StatementOutcome>;

    /// autocommit 모드면 명시적 commit을 하지 않는다
    fn is_auto_commit(&self) -> bool;

    fn commit(&mut self) -> EtxResult<()>;

    fn rollback(&mut self) -> EtxResult<()>;

    /// 진행 중인 `execute`를 다른 스레드에서 중단시키는 핸들
    fn canceller(&self) -> Option<Arc<dyn Canceller>> {
        None
    }
}

/// What [`CommitPolicy::finish`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishAction {
    Committed,
    RolledBack,
    /// autocommit
    Nothing,
}

/// Periodic commit every `commit_size` successful rows.
///
/// `commit_size == 0` disables periodic commits; the final decision is still
/// taken by [`finish`](CommitPolicy::finish).
#[derive(Debug, Clone, Default)]
pub struct CommitPolicy {
    commit_size: u64,
    rows: u64,
    commits: u64,
}

impl CommitPolicy {
    pub fn new(commit_size: u64) -> Self {
        Self {
            commit_size,
            rows: 0,
            commits: 0,
        }
    }

    pub fn commit_size(&self) -> u64 {
        self.commit_size
    }

    /// 성공적으로 처리된 행 수
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// 지금까지 보낸 commit 수 (최종 commit 포함)
    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Records one successful row. Returns `true` if a commit was issued.
    pub fn after_row(&mut self, resource: &mut dyn TransactionalResource) -> EtxResult<bool> {
        self.rows += 1;
        if self.commit_size == 0 || resource.is_auto_commit() {
            return Ok(false);
        }
        if self.commit_size == 1 || self.rows % self.commit_size == 0 {
            resource.commit()?;
            self.commits += 1;
            return Ok(true);
        }
        Ok(false)
    }

    /// dispose 시점의 최종 결정: 정상 종료면 commit, 아니면 rollback
    pub fn finish(
        &mut self,
        resource: &mut dyn TransactionalResource,
        clean: bool,
    ) -> EtxResult<FinishAction> {
        if resource.is_auto_commit() {
            return Ok(FinishAction::Nothing);
        }
        if clean {
            resource.commit()?;
            self.commits += 1;
            Ok(FinishAction::Committed)
        } else {
            resource.rollback()?;
            Ok(FinishAction::RolledBack)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtxError;

    #[derive(Default)]
    struct Counting {
        auto_commit: bool,
        commits_at: Vec<u64>,
        rollbacks: u64,
        executed: u64,
        fail_commit: bool,
    }

    impl TransactionalResource for Counting {
        fn execute(&mut self, _statement: &str) -> EtxResult<StatementOutcome> {
            self.executed += 1;
            Ok(StatementOutcome::default())
        }

        fn is_auto_commit(&self) -> bool {
            self.auto_commit
        }

        fn commit(&mut self) -> EtxResult<()> {
            if self.fail_commit {
                return Err(EtxError::resource("commit", "connection lost"));
            }
            self.commits_at.push(self.executed);
            Ok(())
        }

        fn rollback(&mut self) -> EtxResult<()> {
            self.rollbacks += 1;
            Ok(())
        }
    }

    fn run(policy: &mut CommitPolicy, res: &mut Counting, rows: u64) {
        for _ in 0..rows {
            res.execute("x").unwrap();
            policy.after_row(res).unwrap();
        }
    }

    #[test]
    fn test_commit_size_three_ten_rows() {
        let mut res = Counting::default();
        let mut policy = CommitPolicy::new(3);
        run(&mut policy, &mut res, 10);

        assert_eq!(res.commits_at, vec![3, 6, 9]);
        assert_eq!(policy.commits(), 3);

        assert_eq!(policy.finish(&mut res, true).unwrap(), FinishAction::Committed);
        assert_eq!(res.commits_at, vec![3, 6, 9, 10]);
        assert_eq!(policy.commits(), 4);
    }

    #[test]
    fn test_commit_every_row() {
        let mut res = Counting::default();
        let mut policy = CommitPolicy::new(1);
        run(&mut policy, &mut res, 4);
        assert_eq!(res.commits_at, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_no_periodic_commit() {
        let mut res = Counting::default();
        let mut policy = CommitPolicy::new(0);
        run(&mut policy, &mut res, 5);
        assert!(res.commits_at.is_empty());
        assert_eq!(policy.rows(), 5);
    }

    #[test]
    fn test_autocommit_never_commits() {
        let mut res = Counting {
            auto_commit: true,
            ..Counting::default()
        };
        let mut policy = CommitPolicy::new(2);
        run(&mut policy, &mut res, 6);
        assert_eq!(policy.finish(&mut res, false).unwrap(), FinishAction::Nothing);
        assert!(res.commits_at.is_empty());
        assert_eq!(res.rollbacks, 0);
    }

    #[test]
    fn test_unclean_finish_rolls_back() {
        let mut res = Counting::default();
        let mut policy = CommitPolicy::new(5);
        run(&mut policy, &mut res, 3);
        assert_eq!(policy.finish(&mut res, false).unwrap(), FinishAction::RolledBack);
        assert_eq!(res.rollbacks, 1);
        assert_eq!(policy.commits(), 0);
    }

    #[test]
    fn test_commit_failure_propagates() {
        let mut res = Counting {
            fail_commit: true,
            ..Counting::default()
        };
        let mut policy = CommitPolicy::new(1);
        assert!(policy.after_row(&mut res).is_err());
        assert!(policy.finish(&mut res, true).is_err());
    }
}
