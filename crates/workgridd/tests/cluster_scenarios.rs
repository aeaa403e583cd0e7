//! End-to-end rebalancing scenarios on an in-process cluster.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use workgrid_cluster::{
    ClusterManager, ClusterTransport, LocalTransport, NodeExecutor, WorkloadActionsInstruction,
};
use workgrid_core::{
    ClusterMember, DispatchConfig, LifecycleConfig, RunningState, SchedulerConfig, Workload,
    WorkloadReport,
};
use workgrid_lifecycle::{CancelSignal, FnContextFactory, WorkloadContextManager, WorkloadRunnable};
use workgrid_scheduler::{
    CycleOutcome, DistributedScheduler, GreedyStrategy, LocalLock, SchedulerStrategy,
    SimpleWorkloadRepository, StaticWorkloadSource, WorkloadControl, WorkloadRepository,
};

// ── Fixtures ───────────────────────────────────────────────────

const KIND: &str = "job";

/// Runs until cancelled. The first run of any workload whose id starts
/// with `flaky` fails immediately.
struct Job {
    failed: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl WorkloadRunnable for Job {
    async fn run(&self, workload: &Workload, mut cancel: CancelSignal) -> anyhow::Result<()> {
        let first_run = self.failed.lock().unwrap().insert(workload.urn().to_string());
        if workload.id().starts_with("flaky") && first_run {
            anyhow::bail!("first run always fails");
        }
        cancel.cancelled().await;
        Ok(())
    }
}

struct TestCluster {
    transport: Arc<LocalTransport>,
    cluster: ClusterManager,
    lock: Arc<LocalLock>,
    failed: Arc<Mutex<HashSet<String>>>,
}

impl TestCluster {
    async fn new(size: usize, poll_timeout: Duration) -> Self {
        let transport = Arc::new(LocalTransport::new());
        let cluster = ClusterManager::new(transport.clone(), DispatchConfig { poll_timeout });
        let this = Self {
            transport,
            cluster,
            lock: Arc::new(LocalLock::default()),
            failed: Arc::default(),
        };
        for i in 0..size {
            this.join(&format!("node-{i}")).await;
        }
        this
    }

    async fn join(&self, id: &str) -> ClusterMember {
        let failed = Arc::clone(&self.failed);
        let factory = FnContextFactory::new(KIND, move |_: &Workload| {
            Ok(Arc::new(Job {
                failed: Arc::clone(&failed),
            }) as Arc<dyn WorkloadRunnable>)
        });
        let config = LifecycleConfig {
            stop_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(5),
        };
        let member = ClusterMember::new("test", id);
        let manager = WorkloadContextManager::new(vec![Arc::new(factory)], config);
        self.transport.join(member.clone(), NodeExecutor::new(manager)).await;
        member
    }

    fn member(id: &str) -> ClusterMember {
        ClusterMember::new("test", id)
    }

    async fn manager(&self, id: &str) -> WorkloadContextManager {
        self.transport
            .executor(&Self::member(id))
            .await
            .unwrap()
            .manager()
            .clone()
    }

    fn repository(ids: &[&str]) -> Arc<dyn WorkloadRepository> {
        let source = StaticWorkloadSource::new("test", ids.iter().map(|id| Workload::new(KIND, *id)));
        Arc::new(SimpleWorkloadRepository::new(vec![Arc::new(source)]))
    }

    fn scheduler(&self, ids: &[&str]) -> DistributedScheduler {
        self.scheduler_with(ids, Arc::new(GreedyStrategy::new()))
    }

    fn scheduler_with(&self, ids: &[&str], strategy: Arc<dyn SchedulerStrategy>) -> DistributedScheduler {
        DistributedScheduler::new(
            self.cluster.clone(),
            Self::repository(ids),
            strategy,
            self.lock.clone(),
            SchedulerConfig::default(),
        )
    }

    /// Every live member's report, read directly from its manager.
    async fn reports(&self) -> HashMap<ClusterMember, WorkloadReport> {
        let mut out = HashMap::new();
        for member in self.transport.members().await.unwrap() {
            let executor = self.transport.executor(&member).await.unwrap();
            out.insert(member, executor.report().await);
        }
        out
    }
}

fn assert_each_held_once(reports: &HashMap<ClusterMember, WorkloadReport>, ids: &[&str]) {
    for id in ids {
        let workload = Workload::new(KIND, *id);
        let holders = reports.values().filter(|r| r.contains(&workload)).count();
        assert_eq!(holders, 1, "{workload} held by {holders} members");
    }
}

fn loads(reports: &HashMap<ClusterMember, WorkloadReport>) -> Vec<usize> {
    let mut loads: Vec<_> = reports.values().map(WorkloadReport::len).collect();
    loads.sort();
    loads
}

// ── Scenarios ──────────────────────────────────────────────────

/// Wraps the greedy strategy and records how many plans run at once.
struct Overlap {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SchedulerStrategy for Overlap {
    fn schedule(
        &self,
        inventory: &HashSet<Workload>,
        reports: &HashMap<ClusterMember, WorkloadReport>,
    ) -> Vec<HashMap<ClusterMember, WorkloadActionsInstruction>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        GreedyStrategy.schedule(inventory, reports)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn only_one_member_rebalances_at_a_time() {
    let cluster = TestCluster::new(4, Duration::from_secs(2)).await;
    let overlap = Arc::new(Overlap {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });

    let mut handles = Vec::new();
    for _ in 0..4 {
        let scheduler = Arc::new(cluster.scheduler_with(&["a", "b", "c", "d"], overlap.clone()));
        for _ in 0..5 {
            let scheduler = Arc::clone(&scheduler);
            handles.push(tokio::spawn(async move { scheduler.schedule(true).await.unwrap() }));
        }
    }

    let mut completed = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), CycleOutcome::Completed { .. }) {
            completed += 1;
        }
    }

    assert!(completed >= 1);
    assert_eq!(overlap.peak.load(Ordering::SeqCst), 1);
    assert_each_held_once(&cluster.reports().await, &["a", "b", "c", "d"]);
}

#[tokio::test]
async fn three_workloads_split_over_two_members() {
    let cluster = TestCluster::new(2, Duration::from_secs(2)).await;
    let outcome = cluster.scheduler(&["a", "b", "c"]).schedule(true).await.unwrap();

    assert_eq!(outcome, CycleOutcome::Completed { removals: 0, additions: 3 });
    let reports = cluster.reports().await;
    assert_eq!(loads(&reports), vec![1, 2]);
    assert_each_held_once(&reports, &["a", "b", "c"]);
}

#[tokio::test]
async fn duplicates_and_orphans_are_cleaned_up() {
    let cluster = TestCluster::new(3, Duration::from_secs(2)).await;
    let a = Workload::new(KIND, "a");
    cluster.manager("node-0").await.start(&a).await.unwrap();
    cluster.manager("node-1").await.start(&a).await.unwrap();
    cluster
        .manager("node-2")
        .await
        .start(&Workload::new(KIND, "retired"))
        .await
        .unwrap();

    let ids = ["a", "b", "c", "d", "e", "f"];
    cluster.scheduler(&ids).schedule(true).await.unwrap();

    let reports = cluster.reports().await;
    assert_each_held_once(&reports, &ids);
    assert!(
        reports
            .values()
            .all(|r| !r.contains(&Workload::new(KIND, "retired")))
    );
    assert_eq!(loads(&reports), vec![2, 2, 2]);
}

#[tokio::test]
async fn new_member_receives_share_of_load() {
    let cluster = TestCluster::new(2, Duration::from_secs(2)).await;
    let ids = ["a", "b", "c", "d", "e", "f"];
    let scheduler = cluster.scheduler(&ids);

    scheduler.schedule(true).await.unwrap();
    assert_eq!(loads(&cluster.reports().await), vec![3, 3]);

    cluster.join("node-2").await;
    let outcome = scheduler.schedule(true).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Completed { removals: 2, additions: 2 });

    let reports = cluster.reports().await;
    assert_eq!(loads(&reports), vec![2, 2, 2]);
    assert_each_held_once(&reports, &ids);
}

#[tokio::test]
async fn departed_member_workloads_are_replaced() {
    let cluster = TestCluster::new(3, Duration::from_secs(2)).await;
    let ids = ["a", "b", "c"];
    let scheduler = cluster.scheduler(&ids);
    scheduler.schedule(true).await.unwrap();

    let gone = cluster.transport.leave(&TestCluster::member("node-2")).await.unwrap();
    gone.shutdown().await;

    scheduler.schedule(true).await.unwrap();
    let reports = cluster.reports().await;
    assert_eq!(reports.len(), 2);
    assert_each_held_once(&reports, &ids);
}

#[tokio::test]
async fn failed_workload_restarts_on_same_member() {
    let cluster = TestCluster::new(2, Duration::from_secs(2)).await;
    let ids = ["flaky-1", "steady"];
    let scheduler = cluster.scheduler(&ids);
    scheduler.schedule(true).await.unwrap();

    let flaky = Workload::new(KIND, "flaky-1");
    let holder = cluster
        .reports()
        .await
        .into_iter()
        .find(|(_, r)| r.contains(&flaky))
        .map(|(m, _)| m)
        .unwrap();
    let manager = cluster.manager(holder.id()).await;

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let report = manager.report().await;
            if report.entries.iter().any(|e| e.workload == flaky && e.state == RunningState::Error) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let outcome = scheduler.schedule(true).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Completed { removals: 0, additions: 1 });

    let contexts = manager.contexts_for(flaky.urn()).await;
    assert_eq!(contexts.len(), 1);
    tokio::time::timeout(Duration::from_secs(2), async {
        while contexts[0].running_state() != RunningState::Running {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_each_held_once(&cluster.reports().await, &ids);
}

#[tokio::test]
async fn unresponsive_member_does_not_block_the_cycle() {
    let cluster = TestCluster::new(3, Duration::from_millis(150)).await;
    cluster.transport.partition(&TestCluster::member("node-1")).await;

    let started = std::time::Instant::now();
    let reports = cluster
        .cluster
        .submit_to_all(&workgrid_cluster::ReportInstruction)
        .await
        .unwrap();
    assert_eq!(reports.len(), 2);
    assert!(started.elapsed() < Duration::from_secs(1));

    cluster.scheduler(&["a", "b"]).schedule(true).await.unwrap();
    let manager = cluster.manager("node-1").await;
    assert_eq!(manager.context_count().await, 0);
    for id in ["node-0", "node-2"] {
        assert_eq!(cluster.manager(id).await.context_count().await, 1);
    }
}

#[tokio::test]
async fn operator_stop_is_idempotent() {
    let cluster = TestCluster::new(2, Duration::from_secs(2)).await;
    cluster.scheduler(&["a"]).schedule(true).await.unwrap();

    let control = WorkloadControl::new(cluster.cluster.clone(), TestCluster::repository(&["a"]));
    let first = control.stop("urn:workload:job:a").await.unwrap();
    assert_eq!(first.len(), 1);
    let second = control.stop("urn:workload:job:a").await.unwrap();
    assert_eq!(second, first);

    let status = control.status().await.unwrap();
    let entry = &status[&first[0]].entries[0];
    assert_eq!(entry.state, RunningState::Stopped);
}
