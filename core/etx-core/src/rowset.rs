//! RowSet — bounded, blocking FIFO between two step copies
//!
//! 생산자 하나와 소비자 하나가 공유하는 유한 버퍼. 버퍼가 가득 차면 `put`이
//! 블록되어 빠른 생산자가 느린 소비자를 버퍼 크기 이상 앞지를 수 없다
//! (전체 행 수와 무관하게 메모리 상한 보장).
//!
//! 종료 표시(terminal marker)는 `close()`로 한 번만 게시되며, 이후의 `put`은
//! 에러다. 소비자는 버퍼를 모두 비운 뒤 [`Poll::Done`]을 영구적으로 받는다.

use crate::error::{EtxError, EtxResult};
use crate::row::{Row, RowSchema};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a consumer-side wait.
#[derive(Debug, PartialEq)]
pub enum Poll {
    /// 다음 행
    Row(Row),
    /// 타임아웃. 버퍼는 비었지만 아직 종료 표시가 없음
    Pending,
    /// 종료 표시를 관찰했고 버퍼도 비었음 (영구 상태)
    Done,
}

/// Result of a producer-side offer.
#[derive(Debug, PartialEq)]
pub enum Offer {
    Accepted,
    /// 타임아웃, 행을 돌려준다
    Full(Row),
    /// 소비자가 이미 중단되어 행을 버림
    Discarded,
}

struct Inner {
    buffer: VecDeque<Row>,
    closed: bool,
    consumer_detached: bool,
    schema: Option<Arc<RowSchema>>,
}

/// Bounded row channel.
pub struct RowSet {
    name: String,
    capacity: usize,
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl RowSet {
    /// `capacity`가 0이면 1로 올린다.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            inner: Mutex::new(Inner {
                buffer: VecDeque::with_capacity(capacity),
                closed: false,
                consumer_detached: false,
                schema: None,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().buffer.is_empty()
    }

    /// 종료 표시가 게시되었는지
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// 종료 표시가 게시되었고 버퍼도 비었는지
    pub fn is_done(&self) -> bool {
        let inner = self.inner.lock();
        inner.closed && inner.buffer.is_empty()
    }

    /// 첫 행이 고정한 스키마
    pub fn schema(&self) -> Option<Arc<RowSchema>> {
        self.inner.lock().schema.clone()
    }

    fn check_schema(&self, inner: &Inner, row: &Row) -> EtxResult<()> {
        if let Some(fixed) = &inner.schema
            && !Arc::ptr_eq(fixed, row.schema())
            && let Some(reason) = fixed.incompatibility(row.schema())
        {
            return Err(EtxError::IncompatibleSchema {
                rowset: self.name.clone(),
                reason,
            });
        }
        Ok(())
    }

    /// Offers a row, waiting at most `timeout` for free space (`None` waits forever).
    ///
    /// 타임아웃이면 [`Offer::Full`]로 행을 돌려주므로 호출자는 중단 플래그를
    /// 확인한 뒤 다시 시도할 수 있다.
    pub fn offer(&self, row: Row, timeout: Option<Duration>) -> EtxResult<Offer> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock();

        loop {
            if inner.closed {
                return Err(EtxError::RowSetClosed(self.name.clone()));
            }
            if inner.consumer_detached {
                return Ok(Offer::Discarded);
            }
            if inner.buffer.len() < self.capacity {
                break;
            }
            match deadline {
                Some(deadline) => {
                    if self.not_full.wait_until(&mut inner, deadline).timed_out()
                        && inner.buffer.len() >= self.capacity
                        && !inner.consumer_detached
                        && !inner.closed
                    {
                        return Ok(Offer::Full(row));
                    }
                }
                None => self.not_full.wait(&mut inner),
            }
        }

        self.check_schema(&inner, &row)?;
        if inner.schema.is_none() {
            inner.schema = Some(Arc::clone(row.schema()));
        }
        inner.buffer.push_back(row);
        drop(inner);
        self.not_empty.notify_one();
        Ok(Offer::Accepted)
    }

    /// Blocking put. 소비자가 중단된 경우 행은 조용히 버려진다.
    pub fn put(&self, mut row: Row) -> EtxResult<()> {
        loop {
            match self.offer(row, None)? {
                Offer::Accepted | Offer::Discarded => return Ok(()),
                Offer::Full(back) => row = back,
            }
        }
    }

    /// Waits at most `timeout` for a row (`None` waits forever).
    pub fn poll(&self, timeout: Option<Duration>) -> Poll {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock();

        loop {
            if let Some(row) = inner.buffer.pop_front() {
                drop(inner);
                self.not_full.notify_one();
                return Poll::Row(row);
            }
            if inner.closed {
                return Poll::Done;
            }
            match deadline {
                Some(deadline) => {
                    if self.not_empty.wait_until(&mut inner, deadline).timed_out()
                        && inner.buffer.is_empty()
                        && !inner.closed
                    {
                        return Poll::Pending;
                    }
                }
                None => self.not_empty.wait(&mut inner),
            }
        }
    }

    /// Non-blocking poll.
    pub fn try_get(&self) -> Poll {
        let mut inner = self.inner.lock();
        match inner.buffer.pop_front() {
            Some(row) => {
                drop(inner);
                self.not_full.notify_one();
                Poll::Row(row)
            }
            None if inner.closed => Poll::Done,
            None => Poll::Pending,
        }
    }

    /// Blocking get; `None` once the terminal marker is observed and the buffer drained.
    pub fn get(&self) -> Option<Row> {
        loop {
            match self.poll(None) {
                Poll::Row(row) => return Some(row),
                Poll::Done => return None,
                Poll::Pending => continue,
            }
        }
    }

    /// 종료 표시 게시. run 당 한 번만 허용되며 두 번째 호출은 에러.
    pub fn close(&self) -> EtxResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(EtxError::RowSetClosed(self.name.clone()));
        }
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        Ok(())
    }

    /// 소비자가 중단됨을 알린다. 버퍼를 비우고 대기 중인 생산자를 깨운다.
    pub fn detach_consumer(&self) {
        let mut inner = self.inner.lock();
        inner.consumer_detached = true;
        inner.buffer.clear();
        drop(inner);
        self.not_full.notify_all();
    }
}

impl std::fmt::Debug for RowSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowSet")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::{Value, ValueMeta, ValueType};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn schema() -> Arc<RowSchema> {
        Arc::new(RowSchema::new(vec![ValueMeta::new("id", ValueType::Integer)]).unwrap())
    }

    fn row(schema: &Arc<RowSchema>, id: i64) -> Row {
        Row::new(Arc::clone(schema), vec![Value::Integer(id)]).unwrap()
    }

    #[test]
    fn test_fifo_then_done() {
        let s = schema();
        let rs = RowSet::new("a.0 - b.0", 10);
        for i in 1..=5 {
            rs.put(row(&s, i)).unwrap();
        }
        rs.close().unwrap();

        let ids: Vec<i64> = std::iter::from_fn(|| rs.get())
            .map(|r| r.get(0).unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        // 종료 상태는 영구적
        assert_eq!(rs.poll(Some(Duration::from_millis(1))), Poll::Done);
        assert!(rs.get().is_none());
        assert!(rs.is_done());
    }

    #[test]
    fn test_double_close_is_error() {
        let rs = RowSet::new("rs", 4);
        rs.close().unwrap();
        assert!(matches!(rs.close(), Err(EtxError::RowSetClosed(_))));
    }

    #[test]
    fn test_put_after_close_is_error() {
        let s = schema();
        let rs = RowSet::new("rs", 4);
        rs.close().unwrap();
        assert!(matches!(rs.put(row(&s, 1)), Err(EtxError::RowSetClosed(_))));
    }

    #[test]
    fn test_put_blocks_at_capacity_until_one_get() {
        let s = schema();
        let rs = Arc::new(RowSet::new("rs", 2));
        rs.put(row(&s, 1)).unwrap();
        rs.put(row(&s, 2)).unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let producer = {
            let rs = Arc::clone(&rs);
            let done = Arc::clone(&done);
            let s = Arc::clone(&s);
            thread::spawn(move || {
                rs.put(row(&s, 3)).unwrap();
                done.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!done.load(Ordering::SeqCst), "third put must block");

        assert_eq!(rs.get().unwrap().get(0), Some(&Value::Integer(1)));
        producer.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(rs.len(), 2);
    }

    #[test]
    fn test_offer_times_out_and_returns_row() {
        let s = schema();
        let rs = RowSet::new("rs", 1);
        rs.put(row(&s, 1)).unwrap();

        match rs.offer(row(&s, 2), Some(Duration::from_millis(10))).unwrap() {
            Offer::Full(back) => assert_eq!(back.get(0), Some(&Value::Integer(2))),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(rs.len(), 1);
    }

    #[test]
    fn test_poll_pending_on_timeout() {
        let rs = RowSet::new("rs", 1);
        assert_eq!(rs.poll(Some(Duration::from_millis(5))), Poll::Pending);
        assert_eq!(rs.try_get(), Poll::Pending);
    }

    #[test]
    fn test_detach_releases_blocked_producer() {
        let s = schema();
        let rs = Arc::new(RowSet::new("rs", 1));
        rs.put(row(&s, 1)).unwrap();

        let producer = {
            let rs = Arc::clone(&rs);
            let s = Arc::clone(&s);
            thread::spawn(move || rs.offer(row(&s, 2), None).unwrap())
        };

        thread::sleep(Duration::from_millis(50));
        rs.detach_consumer();
        assert_eq!(producer.join().unwrap(), Offer::Discarded);
        assert!(rs.is_empty());
    }

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let rs = Arc::new(RowSet::new("rs", 1));
        let consumer = {
            let rs = Arc::clone(&rs);
            thread::spawn(move || rs.get())
        };
        thread::sleep(Duration::from_millis(50));
        rs.close().unwrap();
        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn test_first_row_fixes_schema() {
        let s = schema();
        let other = Arc::new(
            RowSchema::new(vec![ValueMeta::new("name", ValueType::String)]).unwrap(),
        );
        let rs = RowSet::new("rs", 4);
        rs.put(row(&s, 1)).unwrap();

        let bad = Row::new(other, vec![Value::from("x")]).unwrap();
        assert!(matches!(
            rs.put(bad),
            Err(EtxError::IncompatibleSchema { .. })
        ));

        // 이름만 다른 스키마는 호환
        let renamed = Arc::new(
            RowSchema::new(vec![ValueMeta::new("key", ValueType::Integer)]).unwrap(),
        );
        rs.put(Row::new(renamed, vec![Value::Integer(2)]).unwrap())
            .unwrap();
        assert_eq!(rs.len(), 2);
        assert!(Arc::ptr_eq(&rs.schema().unwrap(), &s));
    }
}
