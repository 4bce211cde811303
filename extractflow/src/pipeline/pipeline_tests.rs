//! End-to-end tests for driver, strategies and worker pool.

#[cfg(test)]
mod tests {
    use crate::core::{
        ChildLocator, Granularity, PreparedInput, ProcessingStatus, RecordId, StrategyKind,
        StructuredRecord, TransformOutput, WorkItem,
    };
    use crate::errors::{Disposition, ExtractionError, PipelineError, RegistryError, WorkItemError};
    use crate::events::{EXTRACTION_COMPLETED, STEP_FAILED};
    use crate::pipeline::{
        IncomingMessage, PipelineDriver, ProcessContext, StrategyRegistry, WorkerPool,
    };
    use crate::ports::{
        CompletionError, DocumentStoreError, MockStatusStore, ObjectStoreError, StatusStoreError,
    };
    use crate::status::{StatusKey, StatusReporter};
    use crate::strategies::{Collaborators, StepPlan, Strategy};
    use crate::testing::{
        row_item, whole_file_item, TestHarness, ROW_COLLECTION, WHOLE_FILE_COLLECTION,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    const CONTRACT_KEY: &str = "uploads/contract.pdf";

    fn parent_key(id: &str) -> StatusKey {
        StatusKey::parent(RecordId::new(id))
    }

    fn child_key(id: &str, sheet: &str, row: u64) -> StatusKey {
        StatusKey::child(RecordId::new(id), ChildLocator::new(sheet, row))
    }

    // Whole-file item with a valid input and clean output.
    #[tokio::test]
    async fn test_whole_file_success() {
        let h = TestHarness::new();
        h.seed_upload("upload-1", CONTRACT_KEY, "contract.pdf", b"%PDF-1.7");
        h.completion.push_ok(r#"{"party": "Acme", "term_months": 12}"#);

        let driver = h.driver();
        assert_ok!(driver.process(&whole_file_item("upload-1", CONTRACT_KEY)).await);

        let key = parent_key("upload-1");
        assert_eq!(
            h.statuses.updates_for(&key),
            vec![ProcessingStatus::ExtractionEndedSuccessfully]
        );
        assert_eq!(h.documents.count(WHOLE_FILE_COLLECTION), 1);

        let stored = h
            .documents
            .get(WHOLE_FILE_COLLECTION, &RecordId::new("upload-1"))
            .unwrap();
        assert_eq!(stored.get("_id"), Some(&json!("upload-1")));
        assert_eq!(stored.get("file_name_original"), Some(&json!("contract.pdf")));
        assert_eq!(stored.get("party"), Some(&json!("Acme")));

        let completed = h.events.payloads_of(EXTRACTION_COMPLETED);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0]["produced_id"], json!("upload-1"));
    }

    // Whole-file item whose completion call is throttled.
    #[tokio::test]
    async fn test_whole_file_rate_limited() {
        let h = TestHarness::new();
        h.seed_upload("upload-2", CONTRACT_KEY, "contract.pdf", b"%PDF");
        h.completion
            .push_err(CompletionError::RateLimited("429 Too Many Requests".into()));

        let err = assert_err!(h.driver().process(&whole_file_item("upload-2", CONTRACT_KEY)).await);

        assert_eq!(err.disposition(), Disposition::Redeliver);
        assert!(err.as_extraction().is_some_and(ExtractionError::is_retryable));
        assert_eq!(
            h.statuses.updates_for(&parent_key("upload-2")),
            vec![ProcessingStatus::ExtractionRetryableError]
        );
        assert_eq!(h.documents.count(WHOLE_FILE_COLLECTION), 0);
        assert_eq!(h.events.payloads_of(STEP_FAILED).len(), 1);
        assert!(h.events.payloads_of(EXTRACTION_COMPLETED).is_empty());
    }

    // Row item whose completion text is not JSON.
    #[tokio::test]
    async fn test_row_malformed_output() {
        let h = TestHarness::new();
        let raw = "Sure! The rate is {country: Spain";
        h.completion.push_ok(raw);

        let err = assert_err!(
            h.driver()
                .process(&row_item("upload-3", "Rates", 7, json!({"Country": "Spain"})))
                .await
        );

        let extraction = err.as_extraction().unwrap();
        assert!(!extraction.is_retryable());
        assert_eq!(extraction.raw_output(), Some(raw));
        assert_eq!(err.disposition(), Disposition::Acknowledge);

        let key = child_key("upload-3", "Rates", 7);
        assert_eq!(
            h.statuses.updates_for(&key),
            vec![ProcessingStatus::ExtractionNonRetryableError]
        );
        assert!(h.statuses.get(&parent_key("upload-3")).is_none());
        assert_eq!(h.documents.count(ROW_COLLECTION), 0);
    }

    // Row item that succeeds reports the minted identity under its child key.
    #[tokio::test]
    async fn test_row_success_reports_minted_identity() {
        let h = TestHarness::new();
        h.seed_upload("upload-4", "uploads/rates.xlsx", "rates.xlsx", b"");
        h.completion.push_ok(r#"{"country": "Spain", "rate": 0.21}"#);

        assert_ok!(
            h.driver()
                .process(&row_item("upload-4", "Rates", 2, json!({"Country": "Spain"})))
                .await
        );

        let entry = h.statuses.get(&child_key("upload-4", "Rates", 2)).unwrap();
        assert_eq!(entry.status, ProcessingStatus::ExtractionEndedSuccessfully);
        let produced = entry.produced_id.unwrap();
        assert_ne!(produced, RecordId::new("upload-4"));

        let stored = h.documents.get(ROW_COLLECTION, &produced).unwrap();
        assert_eq!(stored.get("country"), Some(&json!("Spain")));
        assert_eq!(stored.get("file_name_original"), Some(&json!("rates.xlsx")));
    }

    #[tokio::test]
    async fn test_first_failure_short_circuits() {
        let h = TestHarness::new();

        let err = assert_err!(h.driver().process(&whole_file_item("upload-5", "missing.pdf")).await);

        assert_eq!(err.disposition(), Disposition::Redeliver);
        assert_eq!(
            h.statuses.updates_for(&parent_key("upload-5")),
            vec![ProcessingStatus::ReadingInputError]
        );
        assert_eq!(h.completion.call_count(), 0);
        assert_eq!(h.documents.insert_count(), 0);
    }

    #[tokio::test]
    async fn test_read_timeout_is_retryable() {
        let h = TestHarness::new();
        h.seed_upload("upload-6", CONTRACT_KEY, "contract.pdf", b"%PDF");
        h.objects.fail_next(ObjectStoreError::Timeout);

        let err = assert_err!(h.driver().process(&whole_file_item("upload-6", CONTRACT_KEY)).await);

        assert_eq!(err.disposition(), Disposition::Redeliver);
        assert_eq!(
            h.statuses.updates_for(&parent_key("upload-6")),
            vec![ProcessingStatus::ReadingInputError]
        );
    }

    #[tokio::test]
    async fn test_error_marker_is_terminal() {
        let h = TestHarness::new();
        h.seed_upload("upload-7", CONTRACT_KEY, "contract.pdf", b"%PDF");
        h.completion.push_ok(r#"{"ERROR": "not a contract"}"#);

        let err = assert_err!(h.driver().process(&whole_file_item("upload-7", CONTRACT_KEY)).await);

        assert_eq!(err.disposition(), Disposition::Acknowledge);
        assert_eq!(
            h.statuses.updates_for(&parent_key("upload-7")),
            vec![ProcessingStatus::ExtractionNonRetryableError]
        );
    }

    #[tokio::test]
    async fn test_unrecorded_terminal_status_is_redelivered() {
        let h = TestHarness::new();
        h.seed_upload("upload-15", CONTRACT_KEY, "contract.pdf", b"%PDF");
        h.completion.push_ok(r#"{"ERROR": "not a contract"}"#);

        let mut store = MockStatusStore::new();
        store.expect_ensure().times(1).returning(|_, _| Ok(()));
        store
            .expect_upsert()
            .times(1)
            .returning(|_, _, _| Err(StatusStoreError::Timeout));
        let driver = PipelineDriver::new(
            StrategyRegistry::with_defaults(),
            h.config().clone(),
            h.collaborators(),
            ProcessContext::new(StatusReporter::new(Arc::new(store))),
        );

        let err = assert_err!(driver.process(&whole_file_item("upload-15", CONTRACT_KEY)).await);
        assert_eq!(err.disposition(), Disposition::Redeliver);
        assert_eq!(h.documents.count(WHOLE_FILE_COLLECTION), 0);
    }

    #[tokio::test]
    async fn test_replay_after_write_failure_does_not_duplicate() {
        let h = TestHarness::new();
        h.seed_upload("upload-8", CONTRACT_KEY, "contract.pdf", b"%PDF");
        h.completion.set_fallback(r#"{"party": "Acme"}"#);
        h.documents
            .fail_next_insert(DocumentStoreError::Timeout);

        let driver = h.driver();
        let item = whole_file_item("upload-8", CONTRACT_KEY);
        let err = assert_err!(driver.process(&item).await);
        assert_eq!(err.disposition(), Disposition::Redeliver);

        assert_ok!(driver.process(&item).await);
        assert_ok!(driver.process(&item).await);

        assert_eq!(h.documents.count(WHOLE_FILE_COLLECTION), 1);
        assert_eq!(
            h.statuses.updates_for(&parent_key("upload-8")),
            vec![
                ProcessingStatus::StructDataWritingError,
                ProcessingStatus::ExtractionEndedSuccessfully,
                ProcessingStatus::ExtractionEndedSuccessfully,
            ]
        );
    }

    #[tokio::test]
    async fn test_row_replay_reuses_identity() {
        let h = TestHarness::new();
        h.completion.set_fallback(r#"{"rate": 1}"#);
        let driver = h.driver();
        let item = row_item("upload-9", "Rates", 3, json!({"Rate": "1"}));

        assert_ok!(driver.process(&item).await);
        assert_ok!(driver.process(&item).await);

        assert_eq!(h.documents.count(ROW_COLLECTION), 1);
        assert_eq!(h.documents.insert_count(), 2);
    }

    #[tokio::test]
    async fn test_siblings_have_independent_status() {
        let h = TestHarness::new();
        h.completion.set_fallback(r#"{"rate": 0.1}"#);
        let driver = h.driver();

        let items: Vec<WorkItem> = (1..=5)
            .map(|row| {
                if row == 3 {
                    WorkItem::child(
                        StrategyKind::OneRowOneObject,
                        "upload-10",
                        ChildLocator::new("Rates", row),
                    )
                } else {
                    row_item("upload-10", "Rates", row, json!({"Row": row}))
                }
            })
            .collect();
        let results =
            futures::future::join_all(items.iter().map(|item| driver.process(item))).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 4);

        let view = driver.status(&RecordId::new("upload-10")).await.unwrap();
        assert!(view.parent.is_none());
        assert_eq!(view.children.len(), 5);
        assert_eq!(
            view.child(&ChildLocator::new("Rates", 3)).unwrap().status,
            ProcessingStatus::ExtractionNonRetryableError
        );

        let summary = view.summary();
        assert_eq!(summary.get(&ProcessingStatus::ExtractionEndedSuccessfully), Some(&4));
        assert_eq!(summary.get(&ProcessingStatus::ExtractionNonRetryableError), Some(&1));
        assert_eq!(h.documents.count(ROW_COLLECTION), 4);
    }

    #[tokio::test]
    async fn test_temp_collection_overrides_destination() {
        let h = TestHarness::with_config(
            crate::testing::sample_config().with_temp_extraction_collection("research_tmp"),
        );
        h.completion.push_ok(r#"{"rate": 2}"#);

        assert_ok!(h.driver().process(&row_item("upload-11", "S", 1, json!({}))).await);
        assert_eq!(h.documents.count("research_tmp"), 1);
        assert_eq!(h.documents.count(ROW_COLLECTION), 0);
    }

    #[tokio::test]
    async fn test_unknown_strategy_is_fatal() {
        let h = TestHarness::new();
        let driver = PipelineDriver::new(
            StrategyRegistry::new(),
            h.config().clone(),
            h.collaborators(),
            h.context(),
        );

        let err = assert_err!(driver.process(&whole_file_item("upload-12", CONTRACT_KEY)).await);
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            PipelineError::Registry(RegistryError::UnknownStrategy(StrategyKind::OneFileOneObject))
        ));
        assert!(h.statuses.is_empty());
    }

    #[tokio::test]
    async fn test_granularity_mismatch_is_rejected_before_processing() {
        let h = TestHarness::new();
        let driver = h.driver();

        let err = assert_err!(
            driver
                .process(&WorkItem::parent(StrategyKind::OneRowOneObject, "upload-13"))
                .await
        );
        assert!(matches!(
            err,
            PipelineError::WorkItem(WorkItemError::GranularityMismatch { .. })
        ));
        assert_eq!(err.disposition(), Disposition::Acknowledge);

        let child = WorkItem::child(
            StrategyKind::OneFileOneObject,
            "upload-13",
            ChildLocator::new("S", 1),
        );
        assert!(driver.process(&child).await.is_err());
        assert!(h.statuses.is_empty());
        assert_eq!(h.completion.call_count(), 0);
    }

    #[tokio::test]
    async fn test_prewarm_reports_configuration_errors() {
        let h = TestHarness::with_config(crate::testing::sample_config().with_bucket(""));
        let err = h.driver().prewarm().unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidSettings {
                kind: StrategyKind::OneFileOneObject,
                ..
            }
        ));

        assert!(TestHarness::new().driver().prewarm().is_ok());
    }

    #[tokio::test]
    async fn test_handle_flat_row_message() {
        let h = TestHarness::new();
        h.completion.push_ok(r#"{"rate": 3}"#);

        let body = json!({
            "strategy_kind": "ONE_ROW_ONE_OBJECT",
            "parent_id": "upload-14",
            "sheet": "Rates",
            "data_row": 9,
            "item": {"Country": "Chile"}
        });
        assert_ok!(h.driver().handle_message(&body).await);

        let entry = h.statuses.get(&child_key("upload-14", "Rates", 9)).unwrap();
        assert_eq!(entry.status, ProcessingStatus::ExtractionEndedSuccessfully);
    }

    #[tokio::test]
    async fn test_malformed_message_is_acknowledged() {
        let h = TestHarness::new();
        let err = assert_err!(h.driver().handle_message(&json!({"parent_id": "x"})).await);
        assert_eq!(err.disposition(), Disposition::Acknowledge);
        assert!(!err.is_fatal());
    }

    /// Records stage calls and fails at a chosen stage.
    #[derive(Debug)]
    struct ScriptedStrategy {
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail_at: Option<(&'static str, bool)>,
        plan: StepPlan,
    }

    impl ScriptedStrategy {
        fn stage(&self, name: &'static str) -> Result<(), ExtractionError> {
            self.calls.lock().push(name);
            match self.fail_at {
                Some((stage, true)) if stage == name => Err(ExtractionError::retryable(name)),
                Some((stage, false)) if stage == name => Err(ExtractionError::non_retryable(name)),
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl Strategy for ScriptedStrategy {
        fn kind(&self) -> StrategyKind {
            StrategyKind::OneFileOneObject
        }

        fn granularity(&self) -> Granularity {
            Granularity::Parent
        }

        fn step_plan(&self) -> &StepPlan {
            &self.plan
        }

        async fn prepare_input(&self, _item: &WorkItem) -> Result<PreparedInput, ExtractionError> {
            self.stage("prepare")?;
            Ok(PreparedInput::Prompt("p".to_string()))
        }

        async fn invoke_transform(
            &self,
            _input: PreparedInput,
        ) -> Result<TransformOutput, ExtractionError> {
            self.stage("transform")?;
            Ok(TransformOutput::new("{}"))
        }

        async fn shape_output(
            &self,
            _output: TransformOutput,
            item: &WorkItem,
        ) -> Result<StructuredRecord, ExtractionError> {
            self.stage("shape")?;
            Ok(StructuredRecord::default().with_id(item.parent_id.clone()))
        }

        async fn persist(
            &self,
            _record: StructuredRecord,
            item: &WorkItem,
        ) -> Result<RecordId, ExtractionError> {
            self.stage("persist")?;
            Ok(item.parent_id.clone())
        }
    }

    fn scripted_driver(
        h: &TestHarness,
        fail_at: Option<(&'static str, bool)>,
    ) -> (PipelineDriver, Arc<Mutex<Vec<&'static str>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);
        let mut registry = StrategyRegistry::new();
        registry.register(
            StrategyKind::OneFileOneObject,
            Box::new(move |_config: &crate::config::PipelineConfig, _c: &Collaborators| {
                Ok(Arc::new(ScriptedStrategy {
                    calls: Arc::clone(&recorded),
                    fail_at,
                    plan: StepPlan::with_prepare(StepPlan::TRANSFORM),
                }) as Arc<dyn Strategy>)
            }),
        );
        let driver = PipelineDriver::new(registry, h.config().clone(), h.collaborators(), h.context());
        (driver, calls)
    }

    #[tokio::test]
    async fn test_each_stage_failure_writes_exactly_once() {
        let expected: HashMap<&str, ProcessingStatus> = [
            ("prepare", ProcessingStatus::ExtractionNonRetryableError),
            ("transform", ProcessingStatus::ExtractionNonRetryableError),
            ("shape", ProcessingStatus::ExtractionNonRetryableError),
            ("persist", ProcessingStatus::StructDataWritingError),
        ]
        .into_iter()
        .collect();
        let order = ["prepare", "transform", "shape", "persist"];

        for (index, stage) in order.iter().enumerate() {
            let h = TestHarness::new();
            let (driver, calls) = scripted_driver(&h, Some((*stage, false)));
            let item = WorkItem::parent(StrategyKind::OneFileOneObject, "p");

            assert_err!(driver.process(&item).await);
            assert_eq!(calls.lock().clone(), order[..=index].to_vec());
            assert_eq!(h.statuses.updates_for(&parent_key("p")), vec![expected[stage]]);
        }
    }

    #[tokio::test]
    async fn test_retryable_stage_failure_uses_retry_code() {
        let h = TestHarness::new();
        let (driver, calls) = scripted_driver(&h, Some(("transform", true)));

        let err = assert_err!(
            driver
                .process(&WorkItem::parent(StrategyKind::OneFileOneObject, "p"))
                .await
        );
        assert_eq!(err.disposition(), Disposition::Redeliver);
        assert_eq!(calls.lock().len(), 2);
        assert_eq!(
            h.statuses.updates_for(&parent_key("p")),
            vec![ProcessingStatus::ExtractionRetryableError]
        );
    }

    #[tokio::test]
    async fn test_strategy_instances_are_memoized() {
        let h = TestHarness::new();
        let driver = h.driver();
        let first = driver.resolve(StrategyKind::OneRowOneObject).unwrap();
        let second = driver.resolve(StrategyKind::OneRowOneObject).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_worker_batch_dispositions() {
        let h = TestHarness::new();
        h.seed_upload("upload-20", CONTRACT_KEY, "contract.pdf", b"%PDF");
        h.completion.set_fallback(r#"{"party": "Acme"}"#);
        h.objects
            .fail_key("uploads/flaky.pdf", ObjectStoreError::Unavailable("reset".into()));

        let pool = WorkerPool::new(Arc::new(h.driver()), 1);
        let outcomes = pool
            .run_batch(vec![
                IncomingMessage::new(
                    "m1",
                    json!({"strategy_kind": "one_file_one_object", "parent_id": "upload-19", "payload": {"key": "uploads/flaky.pdf"}}),
                ),
                IncomingMessage::new(
                    "m2",
                    json!({"strategy_kind": "one_file_one_object", "parent_id": "upload-20", "payload": {"key": CONTRACT_KEY}}),
                ),
                IncomingMessage::new("m3", json!("not an object")),
            ])
            .await;

        let summary: Vec<_> = outcomes
            .iter()
            .map(|o| (o.message_id.as_str(), o.disposition, o.is_success()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("m1", Disposition::Redeliver, false),
                ("m2", Disposition::Acknowledge, true),
                ("m3", Disposition::Acknowledge, false),
            ]
        );
    }

    #[tokio::test]
    async fn test_worker_stream_processes_until_closed() {
        let h = TestHarness::new();
        h.completion.set_fallback(r#"{"rate": 1}"#);
        let pool = WorkerPool::from_driver(Arc::new(h.driver()));
        assert_eq!(pool.max_concurrency(), 8);

        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        for row in 1..=6 {
            in_tx
                .send(IncomingMessage::new(
                    format!("m{row}"),
                    json!({
                        "strategy_kind": "one_row_one_object",
                        "parent_id": "upload-21",
                        "child_locator": format!("Rates:{row}"),
                        "payload": {"item": {"Row": row}}
                    }),
                ))
                .await
                .unwrap();
        }
        drop(in_tx);

        pool.run(in_rx, out_tx).await;

        let mut ids = Vec::new();
        while let Some(outcome) = out_rx.recv().await {
            assert!(outcome.is_success(), "{outcome:?}");
            ids.push(outcome.message_id);
        }
        ids.sort();
        assert_eq!(ids, vec!["m1", "m2", "m3", "m4", "m5", "m6"]);
        assert_eq!(h.documents.count(ROW_COLLECTION), 6);
    }
}
