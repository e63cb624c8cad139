// Property tests — row set FIFO / 보존 법칙
//
// 스레드를 띄우므로 케이스 수를 작게 유지한다.

use etx_core::steps::{FilterRows, RowCollector};
use etx_core::{
    Capabilities, ErrorDiagnostic, EtxError, EtxResult, HopDefinition, Row, RowSchema, RowSet,
    StepContext, StepDefinition, StepPlugin, StepRegistry, Trans, TransConfig, TransDefinition,
    Value, ValueMeta, ValueType,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

fn schema() -> Arc<RowSchema> {
    Arc::new(RowSchema::new(vec![ValueMeta::new("id", ValueType::Integer)]).unwrap())
}

/// `id % modulus == 0`인 행을 에러 hop으로 보낸다
#[derive(Clone)]
struct RejectMultiples {
    modulus: i64,
}

impl StepPlugin for RejectMultiples {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            error_handling: true,
            transactional: false,
        }
    }

    fn process_row(&mut self, ctx: &mut StepContext) -> EtxResult<bool> {
        let Some(row) = ctx.get_row()? else {
            return Ok(false);
        };
        let id = row.get_by_name("id")?.as_i64().unwrap_or_default();
        if id % self.modulus == 0 {
            return Err(EtxError::row_failed(row, ErrorDiagnostic::new("multiple", "PROP001")));
        }
        ctx.put_row(row)?;
        Ok(true)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn rowset_is_fifo_without_loss(capacity in 1usize..8, count in 0i64..300) {
        let rs = Arc::new(RowSet::new("prop", capacity));
        let producer = {
            let rs = Arc::clone(&rs);
            let schema = schema();
            thread::spawn(move || {
                for i in 0..count {
                    rs.put(Row::new(Arc::clone(&schema), vec![Value::Integer(i)]).unwrap()).unwrap();
                }
                rs.close().unwrap();
            })
        };

        let mut got = Vec::new();
        while let Some(row) = rs.get() {
            prop_assert!(rs.len() <= capacity);
            got.push(row.get(0).unwrap().as_i64().unwrap());
        }
        producer.join().unwrap();

        prop_assert_eq!(got, (0..count).collect::<Vec<_>>());
        prop_assert!(rs.get().is_none());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn rows_are_conserved(
        count in 0u64..400,
        drop_every in 2i64..6,
        reject_every in 2i64..7,
        copies in 1usize..4,
        queue_size in 1usize..16,
    ) {
        let registry = StepRegistry::with_builtins();
        let sink = RowCollector::new();
        let rejects = RowCollector::new();
        {
            let sink = sink.clone();
            registry.register("Sink", move |_| Ok(Box::new(sink.clone()) as Box<dyn StepPlugin>)).unwrap();
            let rejects = rejects.clone();
            registry.register("Rejects", move |_| Ok(Box::new(rejects.clone()) as Box<dyn StepPlugin>)).unwrap();
            registry.register("Filter", move |_| {
                Ok(Box::new(FilterRows::field("id", move |v| {
                    v.as_i64().is_ok_and(|n| n % drop_every != 0)
                })) as Box<dyn StepPlugin>)
            }).unwrap();
            registry.register("Reject", move |_| {
                Ok(Box::new(RejectMultiples { modulus: reject_every }) as Box<dyn StepPlugin>)
            }).unwrap();
        }

        let def = TransDefinition::new("conservation")
            .step(StepDefinition::new("source", "Sequence").with_param("count", count.to_string()))
            .step(StepDefinition::new("filter", "Filter"))
            .step(StepDefinition::new("check", "Reject").with_copies(copies))
            .step(StepDefinition::new("sink", "Sink"))
            .step(StepDefinition::new("errors", "Rejects"))
            .hop(HopDefinition::new("source", "filter"))
            .hop(HopDefinition::new("filter", "check"))
            .hop(HopDefinition::new("check", "sink"))
            .hop(HopDefinition::error("check", "errors"));

        let config = TransConfig::default().with_queue_size(queue_size);
        let result = Trans::new(&def, &registry, config).unwrap().run().unwrap();

        let source = result.step_totals("source").written;
        let filter = result.step_totals("filter");
        let dropped = filter.read - filter.written;
        let received = sink.len() as u64;
        let rejected = rejects.len() as u64;

        prop_assert_eq!(source, count);
        prop_assert_eq!(source, received + rejected + dropped);
        prop_assert_eq!(result.errors, rejected);
        prop_assert_eq!(result.step_totals("check").rejected, rejected);
    }
}
