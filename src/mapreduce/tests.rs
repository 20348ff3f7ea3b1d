//! MapReduce Module Tests
//!
//! Runs whole tasks on a standalone node and on simulated clusters.
//!
//! ## Test Scopes
//! - **Word count**: local and distributed reduce produce the same counts.
//! - **Input coverage**: every entry is mapped exactly once, with and without
//!   explicit keys.
//! - **Function copies**: in-process parts map with an independent copy and
//!   emit the same keys as remote parts.
//! - **Intermediate caches**: per-task caches are removed, shared ones keep
//!   no leftovers.
//! - **Failures**: preconditions, timeouts and remote errors.
//! - **Async execution**: `TaskFuture` and cancellation of parts in flight.
//! - **Node services**: cancellation registry, lifecycle hooks, combining.

#[cfg(test)]
mod tests {
    use crate::cluster::simulated::SimulatedCluster;
    use crate::cluster::types::Address;
    use crate::config::NodeSettings;
    use crate::error::GridError;
    use crate::mapreduce::cancellation::CancellationService;
    use crate::cluster::types::RpcOptions;
    use crate::commands::factory::CommandsFactory;
    use crate::mapreduce::functions::{EmitBuffer, FunctionRegistry, MapperAdapter, ReducerAdapter};
    use crate::mapreduce::lifecycle::TaskLifecycleListener;
    use crate::mapreduce::manager::{MapCombineJob, MapCombineOutput, combine};
    use crate::mapreduce::part::{PartWork, TaskPart};
    use crate::mapreduce::task::{MapReduceTask, merge_response};
    use crate::mapreduce::types::{Collector, Mapper, PartId, TaskId};
    use crate::node::GridNode;
    use crate::security::{Permission, PermissionSet};
    use crate::storage::cache::CacheConfiguration;
    use crate::storage::manager::DEFAULT_TMP_CACHE_CONFIGURATION_NAME;
    use crate::wordcount::{self, WordCountMapper, WordCountReducer};
    use serde::{Deserialize, Serialize};
    use serde_json::{Value, json};
    use std::collections::{BTreeSet, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    type WordCountTask = MapReduceTask<String, String, String, u64>;

    const DOCUMENTS: [(&str, &str); 3] = [
        ("d1", "the cat sat"),
        ("d2", "the dog sat"),
        ("d3", "the cat ran"),
    ];

    /// Emits each input key once, so reduced counts show how often an entry
    /// was mapped.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct KeyEchoMapper;

    impl Mapper<String, String, String, u64> for KeyEchoMapper {
        const NAME: &'static str = "test.key_echo";

        fn map(&self, key: String, _value: String, collector: &mut Collector<'_, String, u64>) {
            collector.emit(key, 1);
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct PanickingMapper;

    impl Mapper<String, String, String, u64> for PanickingMapper {
        const NAME: &'static str = "test.panicking";

        fn map(&self, key: String, _value: String, _collector: &mut Collector<'_, String, u64>) {
            panic!("mapper refused {}", key);
        }
    }

    /// Blocks on every entry until the part is cancelled or `max_wait_ms`
    /// elapses.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct StallingMapper {
        max_wait_ms: u64,
    }

    impl Mapper<String, String, String, u64> for StallingMapper {
        const NAME: &'static str = "test.stalling";

        fn map(&self, key: String, _value: String, collector: &mut Collector<'_, String, u64>) {
            let started = Instant::now();
            let max_wait = Duration::from_millis(self.max_wait_ms);
            while !collector.is_cancelled() && started.elapsed() < max_wait {
                std::thread::sleep(Duration::from_millis(5));
            }
            collector.emit(key, 1);
        }
    }

    /// Emits `fan_out` values per entry, spread over the keys w0, w1, w2.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct FanOutMapper {
        fan_out: u64,
    }

    impl Mapper<String, String, String, u64> for FanOutMapper {
        const NAME: &'static str = "test.fan_out";

        fn map(&self, _key: String, _value: String, collector: &mut Collector<'_, String, u64>) {
            for i in 0..self.fan_out {
                collector.emit(format!("w{}", i % 3), 1);
            }
        }
    }

    /// Word count whose output keys carry a prefix taken from its state.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct TaggingMapper {
        tag: String,
    }

    impl Mapper<String, String, String, u64> for TaggingMapper {
        const NAME: &'static str = "test.tagging";

        fn map(&self, _key: String, value: String, collector: &mut Collector<'_, String, u64>) {
            for word in wordcount::tokenize(&value) {
                collector.emit(format!("{}:{}", self.tag, word), 1);
            }
        }
    }

    /// Counts its own `map` calls. A clone starts from the current count
    /// but keeps its own counter.
    #[derive(Debug, Default, Serialize, Deserialize)]
    struct CountingMapper {
        #[serde(skip)]
        calls: Arc<AtomicUsize>,
    }

    impl Clone for CountingMapper {
        fn clone(&self) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(self.calls.load(Ordering::SeqCst))),
            }
        }
    }

    impl Mapper<String, String, String, u64> for CountingMapper {
        const NAME: &'static str = "test.counting";

        fn map(&self, key: String, _value: String, collector: &mut Collector<'_, String, u64>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            collector.emit(key, 1);
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<String>>,
    }

    impl RecordingListener {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl TaskLifecycleListener for RecordingListener {
        fn on_pre_execute(&self, reducer: &str, cache_name: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("pre:{}:{}", reducer, cache_name));
        }

        fn on_post_execute(&self, reducer: &str) {
            self.events.lock().unwrap().push(format!("post:{}", reducer));
        }
    }

    fn register_test_functions(functions: &FunctionRegistry) {
        wordcount::register(functions);
        functions.register_mapper::<KeyEchoMapper, String, String, String, u64>();
        functions.register_mapper::<PanickingMapper, String, String, String, u64>();
        functions.register_mapper::<StallingMapper, String, String, String, u64>();
        functions.register_mapper::<FanOutMapper, String, String, String, u64>();
        functions.register_mapper::<TaggingMapper, String, String, String, u64>();
        functions.register_mapper::<CountingMapper, String, String, String, u64>();
    }

    fn expected_word_counts() -> HashMap<String, u64> {
        [("the", 3), ("cat", 2), ("sat", 2), ("dog", 1), ("ran", 1)]
            .into_iter()
            .map(|(word, count)| (word.to_string(), count))
            .collect()
    }

    async fn local_node_with_documents() -> Arc<GridNode> {
        let node = GridNode::local(NodeSettings::default());
        register_test_functions(&node.functions);
        let docs = node.caches.cache::<String, String>("docs");
        for (id, text) in DOCUMENTS {
            docs.put(id.to_string(), text.to_string()).await.unwrap();
        }
        node
    }

    async fn cluster_with_documents(size: usize, settings: NodeSettings) -> SimulatedCluster {
        let cluster = SimulatedCluster::start(size, settings);
        for node in cluster.nodes() {
            register_test_functions(&node.functions);
        }
        cluster.define_cache("docs", CacheConfiguration::distributed(2));
        let docs = cluster.node(0).caches.cache::<String, String>("docs");
        for (id, text) in DOCUMENTS {
            docs.put(id.to_string(), text.to_string()).await.unwrap();
        }
        cluster
    }

    async fn cluster_with_numbered_entries(size: usize, count: usize) -> SimulatedCluster {
        let cluster = SimulatedCluster::start(size, NodeSettings::default());
        for node in cluster.nodes() {
            register_test_functions(&node.functions);
        }
        cluster.define_cache("entries", CacheConfiguration::distributed(2));
        let entries = cluster.node(0).caches.cache::<String, String>("entries");
        for i in 0..count {
            entries
                .put(format!("k{}", i), format!("value {}", i))
                .await
                .unwrap();
        }
        cluster
    }

    async fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    // ============================================================
    // WORD COUNT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_word_count_on_standalone_node() {
        // ARRANGE
        let node = local_node_with_documents().await;

        // ACT
        let counts = WordCountTask::new(&node, "docs")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .execute()
            .await
            .unwrap();

        // ASSERT
        assert_eq!(counts, expected_word_counts());
    }

    #[tokio::test]
    async fn test_word_count_with_local_reduce_on_cluster() {
        let cluster = cluster_with_documents(3, NodeSettings::default()).await;

        let counts = WordCountTask::new(cluster.node(1), "docs")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .combined_with(WordCountReducer)
            .execute()
            .await
            .unwrap();

        assert_eq!(counts, expected_word_counts());
    }

    #[tokio::test]
    async fn test_word_count_with_distributed_reduce() {
        let cluster = cluster_with_documents(3, NodeSettings::default()).await;

        let counts = WordCountTask::with_options(cluster.node(0), "docs", true, false)
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .execute()
            .await
            .unwrap();

        assert_eq!(counts, expected_word_counts());
    }

    #[tokio::test]
    async fn test_distributed_reduce_with_combiner() {
        let cluster = cluster_with_documents(2, NodeSettings::default()).await;

        let counts = WordCountTask::with_options(cluster.node(1), "docs", true, false)
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .combined_with(WordCountReducer)
            .execute()
            .await
            .unwrap();

        assert_eq!(counts, expected_word_counts());
    }

    #[tokio::test]
    async fn test_collated_result() {
        let node = local_node_with_documents().await;

        let total_words = WordCountTask::new(&node, "docs")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .execute_collated(&|counts: HashMap<String, u64>| counts.values().sum::<u64>())
            .await
            .unwrap();

        assert_eq!(total_words, 9);
    }

    #[tokio::test]
    async fn test_execute_into_standalone_results_cache() {
        let node = local_node_with_documents().await;

        WordCountTask::new(&node, "docs")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .execute_into("counts")
            .await
            .unwrap();

        let results = node.caches.cache::<String, u64>("counts");
        assert_eq!(results.get_local(&"the".to_string()).unwrap(), Some(3));
        assert_eq!(results.get_local(&"dog".to_string()).unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_execute_into_with_distributed_reduce() {
        let cluster = cluster_with_documents(3, NodeSettings::default()).await;

        WordCountTask::with_options(cluster.node(0), "docs", true, false)
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .execute_into("counts")
            .await
            .unwrap();

        let results = cluster.node(2).caches.cache::<String, u64>("counts");
        for (word, count) in expected_word_counts() {
            assert_eq!(results.get(&word).await.unwrap(), Some(count), "word {}", word);
        }
    }

    #[tokio::test]
    async fn test_execute_into_rejects_empty_name() {
        let node = local_node_with_documents().await;

        let result = WordCountTask::new(&node, "docs")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .execute_into("")
            .await;

        assert!(matches!(result, Err(GridError::Configuration(_))));
    }

    // ============================================================
    // INPUT COVERAGE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_every_entry_mapped_once() {
        let cluster = cluster_with_numbered_entries(3, 40).await;

        for distribute in [false, true] {
            let counts = WordCountTask::with_options(cluster.node(0), "entries", distribute, false)
                .unwrap()
                .mapped_with(KeyEchoMapper)
                .reduced_with(WordCountReducer)
                .execute()
                .await
                .unwrap();

            assert_eq!(counts.len(), 40, "distribute={}", distribute);
            assert!(counts.values().all(|&count| count == 1), "distribute={}", distribute);
        }
    }

    #[tokio::test]
    async fn test_explicit_keys_are_mapped_once() {
        // ARRANGE
        let cluster = cluster_with_numbered_entries(3, 20).await;
        let keys = ["k1", "k3", "k3", "k7", "k15", "missing"].map(String::from);

        // ACT
        let counts = WordCountTask::new(cluster.node(2), "entries")
            .unwrap()
            .on_keys(keys)
            .mapped_with(KeyEchoMapper)
            .reduced_with(WordCountReducer)
            .execute()
            .await
            .unwrap();

        // ASSERT: duplicates collapse, absent keys are skipped
        let expected: HashMap<String, u64> = ["k1", "k3", "k7", "k15"]
            .into_iter()
            .map(|key| (key.to_string(), 1))
            .collect();
        assert_eq!(counts, expected);
    }

    #[tokio::test]
    async fn test_collector_flushes_keep_every_value() {
        // ARRANGE: 7 values per entry, so every node passes the 1000-value flush point
        let cluster = cluster_with_numbered_entries(3, 1000).await;
        let expected: HashMap<String, u64> = [("w0", 3000), ("w1", 2000), ("w2", 2000)]
            .into_iter()
            .map(|(key, count)| (key.to_string(), count))
            .collect();

        for (distribute, shared, with_combiner) in [
            (true, false, false),
            (true, false, true),
            (true, true, false),
            (true, true, true),
            (false, false, true),
        ] {
            // ACT
            let mut task = WordCountTask::with_options(cluster.node(0), "entries", distribute, shared)
                .unwrap()
                .mapped_with(FanOutMapper { fan_out: 7 })
                .reduced_with(WordCountReducer);
            if with_combiner {
                task = task.combined_with(WordCountReducer);
            }
            let counts = task.execute().await.unwrap();

            // ASSERT
            assert_eq!(
                counts, expected,
                "distribute={} shared={} combiner={}",
                distribute, shared, with_combiner
            );
        }
    }

    // ============================================================
    // FUNCTION COPY TESTS
    // ============================================================

    #[test]
    fn test_duplicate_does_not_share_state() {
        // ARRANGE
        let mapper = CountingMapper::default();
        let calls = mapper.calls.clone();
        let erased = MapperAdapter::<CountingMapper, String, String, String, u64>::erase(mapper);
        let copy = erased.duplicate();
        let mut buffer = EmitBuffer::new(CancellationToken::new());

        // ACT
        copy.map("k1", &json!("v"), &mut buffer).unwrap();
        copy.map("k2", &json!("v"), &mut buffer).unwrap();

        // ASSERT
        assert_eq!(buffer.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "the copy must not touch the original");

        erased.map("k1", &json!("v"), &mut buffer).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_local_part_maps_with_a_copy() {
        let node = local_node_with_documents().await;
        let mapper = CountingMapper::default();
        let calls = mapper.calls.clone();

        let counts = WordCountTask::new(&node, "docs")
            .unwrap()
            .mapped_with(mapper)
            .reduced_with(WordCountReducer)
            .execute()
            .await
            .unwrap();

        assert_eq!(counts.len(), DOCUMENTS.len());
        assert!(counts.values().all(|&count| count == 1));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_same_mapper_emits_same_keys_locally_and_remotely() {
        // ARRANGE: both nodes hold an identical local copy of the input
        let cluster = SimulatedCluster::start(2, NodeSettings::default());
        for node in cluster.nodes() {
            register_test_functions(&node.functions);
        }
        cluster.define_cache("copies", CacheConfiguration::local());
        for node in cluster.nodes() {
            let cache = node.caches.get_cache("copies").unwrap();
            for (id, text) in DOCUMENTS {
                cache.apply_put(id.to_string(), json!(text));
            }
        }
        let coordinator = cluster.node(0);
        let mapper = MapperAdapter::<TaggingMapper, String, String, String, u64>::erase(TaggingMapper {
            tag: "doc".to_string(),
        });
        let task_id = TaskId::new();
        let targets = [
            (coordinator.address().clone(), mapper.duplicate()),
            (cluster.node(1).address().clone(), mapper.clone()),
        ];

        // ACT
        let mut key_sets = Vec::new();
        for (target, function) in targets {
            let command = CommandsFactory::build_map_combine_command(
                &task_id,
                "copies",
                function.as_ref(),
                None,
                None,
            )
            .unwrap();
            let job = MapCombineJob {
                command,
                mapper: function,
                combiner: None,
            };
            let mut part = TaskPart::new(target, PartWork::Map(job));
            part.execute(coordinator, &RpcOptions::default()).unwrap();

            let output: MapCombineOutput = serde_json::from_value(part.get().await.unwrap()).unwrap();
            let keys: BTreeSet<String> = match output {
                MapCombineOutput::Grouped(grouped) => grouped.into_iter().map(|(key, _)| key).collect(),
                other => panic!("expected grouped output, got {:?}", other),
            };
            key_sets.push(keys);
        }

        // ASSERT
        let expected: BTreeSet<String> = expected_word_counts()
            .into_keys()
            .map(|word| format!("doc:{}", word))
            .collect();
        assert_eq!(key_sets[0], expected, "in-process part");
        assert_eq!(key_sets[1], expected, "remote part");
    }

    // ============================================================
    // INTERMEDIATE CACHE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_per_task_intermediate_cache_removed_after_success() {
        let cluster = cluster_with_documents(3, NodeSettings::default()).await;
        let task = WordCountTask::with_options(cluster.node(0), "docs", true, false)
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer);
        let intermediate = task.intermediate_cache_name();
        assert_eq!(intermediate, task.task_id().to_string());

        task.execute().await.unwrap();

        for node in cluster.nodes() {
            assert!(!node.caches.cache_exists(&intermediate), "left on {}", node.address());
        }
    }

    #[tokio::test]
    async fn test_per_task_intermediate_cache_removed_after_failure() {
        // ARRANGE
        let cluster = cluster_with_documents(3, NodeSettings::default()).await;
        let task = WordCountTask::with_options(cluster.node(0), "docs", true, false)
            .unwrap()
            .mapped_with(PanickingMapper)
            .reduced_with(WordCountReducer);
        let intermediate = task.intermediate_cache_name();
        let task_id = task.task_id().to_string();

        // ACT
        let result = task.execute().await;

        // ASSERT
        match result {
            Err(GridError::Task { task_id: failed, .. }) => assert_eq!(failed, task_id),
            other => panic!("expected a task failure, got {:?}", other.map(|c| c.len())),
        }
        for node in cluster.nodes() {
            assert!(!node.caches.cache_exists(&intermediate), "left on {}", node.address());
        }
    }

    #[tokio::test]
    async fn test_shared_intermediate_cache_keeps_no_entries() {
        let cluster = cluster_with_documents(3, NodeSettings::default()).await;

        for _ in 0..2 {
            let task = WordCountTask::with_distributed_reduce(cluster.node(0), "docs", true).unwrap();
            assert_eq!(task.intermediate_cache_name(), DEFAULT_TMP_CACHE_CONFIGURATION_NAME);

            let counts = task
                .mapped_with(WordCountMapper)
                .reduced_with(WordCountReducer)
                .execute()
                .await
                .unwrap();
            assert_eq!(counts, expected_word_counts());
        }

        for node in cluster.nodes() {
            let shared = node
                .caches
                .get_cache(DEFAULT_TMP_CACHE_CONFIGURATION_NAME)
                .expect("shared cache stays");
            assert_eq!(shared.local_entry_count(), 0, "entries left on {}", node.address());
        }
    }

    #[tokio::test]
    async fn test_custom_shared_intermediate_cache() {
        let cluster = cluster_with_documents(2, NodeSettings::default()).await;

        let task = WordCountTask::with_options(cluster.node(1), "docs", true, false)
            .unwrap()
            .using_shared_intermediate_cache("wordcount-staging")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer);
        assert_eq!(task.intermediate_cache_name(), "wordcount-staging");

        assert_eq!(task.execute().await.unwrap(), expected_word_counts());
        for node in cluster.nodes() {
            assert!(node.caches.cache_exists("wordcount-staging"));
        }
    }

    #[tokio::test]
    async fn test_unknown_intermediate_configuration_fails_provisioning() {
        let cluster = cluster_with_documents(2, NodeSettings::default()).await;

        let result = WordCountTask::with_options(cluster.node(0), "docs", true, false)
            .unwrap()
            .using_intermediate_cache("no-such-configuration")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .execute()
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err.root_cause(), GridError::Provisioning { .. }));
    }

    // ============================================================
    // PRECONDITION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_missing_mapper_or_reducer() {
        let node = local_node_with_documents().await;

        let no_mapper = WordCountTask::new(&node, "docs")
            .unwrap()
            .reduced_with(WordCountReducer)
            .execute()
            .await;
        assert!(matches!(no_mapper, Err(GridError::Configuration(_))));

        let no_reducer = WordCountTask::new(&node, "docs")
            .unwrap()
            .mapped_with(WordCountMapper)
            .execute()
            .await;
        assert!(matches!(no_reducer, Err(GridError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_cache_name_checks() {
        let node = local_node_with_documents().await;

        assert!(matches!(
            WordCountTask::new(&node, ""),
            Err(GridError::Configuration(_))
        ));
        assert!(matches!(
            WordCountTask::new(&node, "nowhere"),
            Err(GridError::NoSuchCache(name)) if name == "nowhere"
        ));
    }

    #[tokio::test]
    async fn test_invalidation_cache_rejected_on_cluster() {
        let cluster = SimulatedCluster::start(2, NodeSettings::default());
        cluster.define_cache("invalidated", CacheConfiguration::invalidation());

        let result = WordCountTask::new(cluster.node(0), "invalidated");

        assert!(matches!(result, Err(GridError::InvalidCacheState(_))));
    }

    #[tokio::test]
    async fn test_stopped_cache_rejected() {
        let node = local_node_with_documents().await;
        let task = WordCountTask::new(&node, "docs")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer);

        node.caches.get_cache("docs").unwrap().stop();

        // Preconditions are not wrapped into a task failure.
        assert!(matches!(task.execute().await, Err(GridError::InvalidCacheState(_))));
        assert!(matches!(
            WordCountTask::new(&node, "docs"),
            Err(GridError::InvalidCacheState(_))
        ));
    }

    #[tokio::test]
    async fn test_exec_permission_required() {
        let node = local_node_with_documents().await;
        let cache = node.caches.get_cache("docs").unwrap();

        cache.set_authorization(Arc::new(PermissionSet::new("reader", [Permission::Read])));
        assert!(matches!(
            WordCountTask::new(&node, "docs"),
            Err(GridError::Authorization { permission, .. }) if permission == "EXEC"
        ));

        cache.set_authorization(Arc::new(PermissionSet::new("admin", [Permission::Admin])));
        let counts = WordCountTask::new(&node, "docs")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .execute()
            .await
            .unwrap();
        assert_eq!(counts, expected_word_counts());
    }

    #[tokio::test]
    async fn test_builder_accessors() {
        let node = local_node_with_documents().await;
        let task = WordCountTask::new(&node, "docs")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .on_keys(["d1".to_string()])
            .timeout(Duration::ZERO);

        assert!(task.is_local_only());
        assert_eq!(task.get_timeout(), Duration::MAX);
        let rendered = task.to_string();
        assert!(rendered.contains("mapper=wordcount.mapper"));
        assert!(rendered.contains("combiner=none"));
        assert!(rendered.contains(&task.task_id().to_string()));

        let other = WordCountTask::new(&node, "docs").unwrap();
        assert!(task != other);
        assert!(matches!(
            other.using_intermediate_cache(""),
            Err(GridError::Configuration(_))
        ));
    }

    // ============================================================
    // FAILURE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_unresponsive_node_times_out() {
        // ARRANGE
        let cluster = cluster_with_documents(2, NodeSettings::default()).await;
        let silent = Address::new("node-1");
        cluster.suspend(&silent);

        // ACT
        let result = WordCountTask::new(cluster.node(0), "docs")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .timeout(Duration::from_millis(100))
            .execute()
            .await;

        // ASSERT
        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(
            err.root_cause(),
            GridError::PhaseTimeout { phase: "Map", address, .. } if *address == silent
        ));
        assert!(err.to_string().contains("node-1"));
    }

    #[tokio::test]
    async fn test_remote_mapper_failure_is_wrapped() {
        let cluster = cluster_with_documents(2, NodeSettings::default()).await;

        let err = WordCountTask::new(cluster.node(0), "docs")
            .unwrap()
            .mapped_with(PanickingMapper)
            .reduced_with(WordCountReducer)
            .execute()
            .await
            .unwrap_err();

        assert!(matches!(err, GridError::Task { .. }));
        assert!(!err.is_timeout());
    }

    #[tokio::test]
    async fn test_unregistered_function_on_remote_node() {
        let cluster = SimulatedCluster::start(2, NodeSettings::default());
        // Only the coordinator knows the word count functions.
        wordcount::register(&cluster.node(0).functions);
        cluster.define_cache("docs", CacheConfiguration::distributed(2));
        let docs = cluster.node(0).caches.cache::<String, String>("docs");
        for (id, text) in DOCUMENTS {
            docs.put(id.to_string(), text.to_string()).await.unwrap();
        }

        let err = WordCountTask::new(cluster.node(0), "docs")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .execute()
            .await
            .unwrap_err();

        match err.root_cause() {
            GridError::Remote { address, message } => {
                assert_eq!(address, &Address::new("node-1"));
                assert!(message.contains("wordcount.mapper"));
            }
            other => panic!("expected a remote failure, got {}", other),
        }
    }

    // ============================================================
    // ASYNC EXECUTION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_future_runs_once() {
        let node = local_node_with_documents().await;
        let future = WordCountTask::new(&node, "docs")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .execute_asynchronously();

        assert!(!future.is_done());
        assert_eq!(future.get().await.unwrap(), expected_word_counts());
        assert!(future.is_done());
        assert!(!future.cancel(), "a finished task can not be cancelled");
        assert!(matches!(future.get().await, Err(GridError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_collated_future() {
        let node = local_node_with_documents().await;
        let future = WordCountTask::new(&node, "docs")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .execute_asynchronously_collated(|counts: HashMap<String, u64>| counts.len());

        assert_eq!(future.get().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let node = local_node_with_documents().await;
        let future = WordCountTask::new(&node, "docs")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .execute_asynchronously();

        // no part has been registered yet, so there is nothing to cancel
        assert!(!future.cancel());
        assert!(!future.is_cancelled());

        let result = future.get().await.unwrap();
        assert_eq!(result, expected_word_counts());
        assert!(future.is_done());
        assert!(!future.is_cancelled());
        assert!(!future.cancel());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_parts_in_flight() {
        // ARRANGE
        let cluster = cluster_with_documents(2, NodeSettings::default()).await;
        let future = Arc::new(
            WordCountTask::new(cluster.node(0), "docs")
                .unwrap()
                .mapped_with(StallingMapper { max_wait_ms: 10_000 })
                .reduced_with(WordCountReducer)
                .execute_asynchronously(),
        );
        let running = future.clone();
        let outcome = tokio::spawn(async move { running.get().await });

        let started = wait_until(|| future.active_parts().len() == 2).await;
        assert!(started, "map parts were never dispatched");
        let parts = future.active_parts();

        // ACT
        let cancelled_at = Instant::now();
        assert!(future.cancel());

        // ASSERT
        assert!(future.is_cancelled());
        assert!(future.is_done());
        let result = outcome.await.unwrap();
        assert!(matches!(result, Err(GridError::TaskCancelled)));
        assert!(cancelled_at.elapsed() < Duration::from_secs(5));

        for part in parts {
            let reached = wait_until(|| {
                cluster
                    .nodes()
                    .iter()
                    .any(|node| node.cancellation.was_cancelled(&part))
            })
            .await;
            assert!(reached, "part {} never saw the cancel", part);
        }
    }

    // ============================================================
    // NODE SERVICE TESTS
    // ============================================================

    #[test]
    fn test_cancel_before_register_yields_cancelled_token() {
        let service = CancellationService::new();
        let early = PartId::new();

        assert!(!service.cancel(&early));
        let token = service.register(&early);

        assert!(token.is_cancelled());
        assert!(service.was_cancelled(&early));
    }

    #[test]
    fn test_cancel_registered_part() {
        let service = CancellationService::new();
        let part = PartId::new();

        let token = service.register(&part);
        assert!(service.is_registered(&part));
        assert!(!token.is_cancelled());

        assert!(service.cancel(&part));
        assert!(token.is_cancelled());

        service.unregister(&part);
        assert_eq!(service.active_count(), 0);
    }

    #[tokio::test]
    async fn test_lifecycle_hooks_around_local_reduce() {
        let node = local_node_with_documents().await;
        let listener = Arc::new(RecordingListener::default());
        node.lifecycle.add_listener(listener.clone());

        WordCountTask::new(&node, "docs")
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer)
            .execute()
            .await
            .unwrap();

        assert_eq!(
            listener.events(),
            vec!["pre:wordcount.reducer:docs", "post:wordcount.reducer"]
        );
    }

    #[tokio::test]
    async fn test_lifecycle_hooks_on_reducing_nodes() {
        let cluster = cluster_with_documents(2, NodeSettings::default()).await;
        let listeners: Vec<Arc<RecordingListener>> = cluster
            .nodes()
            .iter()
            .map(|node| {
                let listener = Arc::new(RecordingListener::default());
                node.lifecycle.add_listener(listener.clone());
                listener
            })
            .collect();

        let task = WordCountTask::with_options(cluster.node(0), "docs", true, false)
            .unwrap()
            .mapped_with(WordCountMapper)
            .reduced_with(WordCountReducer);
        let intermediate = task.intermediate_cache_name();
        task.execute().await.unwrap();

        let events: Vec<String> = listeners.iter().flat_map(|l| l.events()).collect();
        assert!(!events.is_empty());
        let expected_pre = format!("pre:wordcount.reducer:{}", intermediate);
        assert!(events.iter().all(|e| e == &expected_pre || e == "post:wordcount.reducer"));
        let pre_count = events.iter().filter(|e| e.starts_with("pre:")).count();
        assert_eq!(pre_count * 2, events.len());
    }

    #[tokio::test]
    async fn test_merge_response_from_concurrent_parts() {
        // ARRANGE
        let merged = Arc::new(Mutex::new(HashMap::<String, Vec<Value>>::new()));
        let parts = 8;
        let values_per_part = 50;

        // ACT
        let handles: Vec<_> = (0..parts)
            .map(|part| {
                let merged = merged.clone();
                tokio::spawn(async move {
                    let values = (0..values_per_part).map(|i| json!(part * 100 + i)).collect();
                    merge_response(&merged, vec![("shared".to_string(), values)]);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // ASSERT
        let merged = merged.lock().unwrap();
        assert_eq!(merged["shared"].len(), parts * values_per_part);
    }

    #[test]
    fn test_combine_with_and_without_combiner() {
        let grouped: HashMap<String, Vec<Value>> = HashMap::from([
            ("cat".to_string(), vec![json!(1), json!(1)]),
            ("dog".to_string(), vec![json!(1)]),
        ]);

        let summed = ReducerAdapter::<WordCountReducer, String, u64>::erase(WordCountReducer);
        let mut combined = combine(Some(summed.as_ref()), grouped.clone()).unwrap();
        combined.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            combined,
            vec![
                ("cat".to_string(), vec![json!(2)]),
                ("dog".to_string(), vec![json!(1)]),
            ]
        );

        let passed = combine(None, grouped).unwrap();
        let cat = passed.iter().find(|(key, _)| key == "cat").unwrap();
        assert_eq!(cat.1.len(), 2);
    }
}
