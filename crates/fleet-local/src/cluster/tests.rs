use std::time::Duration;

use fleet_core::{CoreError, Scheduler, SchedulerConfig};
use fleet_exec::{ExecutionError, PipelineError};
use fleet_model::{CPUS, ExecutorInfo, MEM, ResourceDemand, TaskState};
use tokio_util::sync::CancellationToken;

use super::*;

/// `ok:<out>` succeeds, `fail` fails, `block` runs until cancelled.
struct FakeWork;

#[async_trait]
impl Workload for FakeWork {
    async fn perform(&self, data: &str, cancel: &CancellationToken) -> Result<String, PipelineError> {
        if let Some(out) = data.strip_prefix("ok:") {
            return Ok(out.to_string());
        }
        if data == "block" {
            cancel.cancelled().await;
            return Err(ExecutionError::Cancelled.into());
        }
        Err(ExecutionError::Stderr("boom".into()).into())
    }
}

fn fake() -> WorkloadFactory {
    Arc::new(|_node: &NodeId| Ok(Arc::new(FakeWork) as Arc<dyn Workload>))
}

fn res(cpus: f64, mem: f64) -> Resources {
    Resources::new().with(CPUS, cpus).with(MEM, mem)
}

fn config(nodes: &[(&str, f64, f64)]) -> ClusterConfig {
    let mut cfg = ClusterConfig::uniform(0, Resources::new());
    cfg.nodes = nodes
        .iter()
        .map(|(id, cpus, mem)| NodeSpec {
            node_id: NodeId::from(*id),
            resources: res(*cpus, *mem),
        })
        .collect();
    cfg.offer_interval = Duration::from_millis(20);
    cfg
}

fn demand() -> ResourceDemand {
    ResourceDemand::new(1.0, 128.0).unwrap()
}

fn assignment(id: &str, node: &str, data: &str) -> TaskAssignment {
    TaskAssignment {
        task_id: TaskId::from(id),
        name: format!("fleet-task-{id}"),
        node_id: NodeId::from(node),
        executor: ExecutorInfo::default(),
        resources: demand(),
        data: data.to_string(),
    }
}

async fn next(rx: &mut mpsc::Receiver<SchedulerEvent>) -> SchedulerEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream closed")
}

async fn next_offers(rx: &mut mpsc::Receiver<SchedulerEvent>) -> Vec<ResourceOffer> {
    loop {
        if let SchedulerEvent::ResourceOffers(offers) = next(rx).await {
            return offers;
        }
    }
}

async fn next_status(rx: &mut mpsc::Receiver<SchedulerEvent>) -> TaskStatus {
    loop {
        if let SchedulerEvent::StatusUpdate(status) = next(rx).await {
            return status;
        }
    }
}

#[test]
fn config_validation() {
    assert!(config(&[]).validate().is_err());
    assert!(config(&[("a", 1.0, 1.0), ("a", 1.0, 1.0)]).validate().is_err());
    let mut cfg = config(&[("a", 1.0, 1.0)]);
    cfg.offer_interval = Duration::ZERO;
    assert!(cfg.validate().is_err());
    assert!(config(&[("a", 1.0, 1.0)]).validate().is_ok());
}

#[test]
fn uniform_nodes_are_numbered() {
    let cfg = ClusterConfig::uniform(3, res(2.0, 512.0));
    assert_eq!(cfg.nodes.len(), 3);
    assert!(cfg.nodes[2].node_id.as_str().ends_with("-3"));
    assert_eq!(cfg.nodes[0].resources.cpus(), 2.0);
}

#[tokio::test]
async fn registers_then_offers_every_node() {
    let (cluster, mut rx) =
        LocalCluster::start_with_workload(config(&[("n1", 2.0, 256.0), ("n2", 4.0, 1024.0)]), fake())
            .unwrap();

    match next(&mut rx).await {
        SchedulerEvent::Registered { framework_id, master } => {
            assert_eq!(&framework_id, cluster.framework_id());
            assert_eq!(master, "local");
        }
        other => panic!("expected registration, got {other:?}"),
    }
    let offers = next_offers(&mut rx).await;
    assert_eq!(offers.len(), 2);
    assert_eq!(offers[0].node_id, NodeId::from("n1"));
    assert_eq!(offers[0].resources, res(2.0, 256.0));
    assert_eq!(offers[1].resources, res(4.0, 1024.0));
}

#[tokio::test]
async fn outstanding_offer_is_not_repeated_and_decline_refuses() {
    let (cluster, mut rx) =
        LocalCluster::start_with_workload(config(&[("n1", 2.0, 256.0)]), fake()).unwrap();
    let first = next_offers(&mut rx).await.remove(0);

    // Unanswered: nothing new for this node.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    cluster
        .decline_offer(&first.offer_id, Filters::refuse(0.2))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "re-offered inside the refusal window");

    let again = next_offers(&mut rx).await.remove(0);
    assert_ne!(again.offer_id, first.offer_id);
    assert_eq!(again.resources, first.resources);
}

#[tokio::test]
async fn launch_reserves_and_completion_releases() {
    let (cluster, mut rx) =
        LocalCluster::start_with_workload(config(&[("n1", 2.0, 256.0)]), fake()).unwrap();
    let offer = next_offers(&mut rx).await.remove(0);

    cluster
        .launch_tasks(
            &offer.offer_id,
            vec![assignment("1", "n1", "block")],
            Filters::refuse(0.0),
        )
        .await
        .unwrap();

    // The Running report and the next offer race; wait for both.
    let (mut running, mut reduced) = (None, None);
    while running.is_none() || reduced.is_none() {
        match next(&mut rx).await {
            SchedulerEvent::StatusUpdate(s) => running = Some(s),
            SchedulerEvent::ResourceOffers(mut o) => reduced = Some(o.remove(0)),
            _ => {}
        }
    }
    let running = running.unwrap();
    assert_eq!(running.state, TaskState::Running);
    assert_eq!(running.node_id, Some(NodeId::from("n1")));
    assert_eq!(reduced.unwrap().resources, res(1.0, 128.0));

    let n1 = NodeId::from("n1");
    assert_eq!(cluster.free_resources(&n1).await.unwrap(), res(1.0, 128.0));

    assert!(cluster.kill_task(&TaskId::from("1")).await);
    let killed = next_status(&mut rx).await;
    assert_eq!(killed.state, TaskState::Killed);
    assert_eq!(cluster.free_resources(&n1).await.unwrap(), res(2.0, 256.0));
}

#[tokio::test]
async fn finished_status_is_forwarded_with_output() {
    let (cluster, mut rx) =
        LocalCluster::start_with_workload(config(&[("n1", 1.0, 128.0)]), fake()).unwrap();
    let offer = next_offers(&mut rx).await.remove(0);
    cluster
        .launch_tasks(
            &offer.offer_id,
            vec![assignment("1", "n1", "ok:done")],
            Filters::default(),
        )
        .await
        .unwrap();

    assert_eq!(next_status(&mut rx).await.state, TaskState::Running);
    let finished = next_status(&mut rx).await;
    assert_eq!(finished.state, TaskState::Finished);
    assert_eq!(finished.data.as_deref(), Some("done"));
}

#[tokio::test]
async fn tasks_beyond_the_offer_are_lost() {
    let (cluster, mut rx) =
        LocalCluster::start_with_workload(config(&[("n1", 1.0, 128.0)]), fake()).unwrap();
    let offer = next_offers(&mut rx).await.remove(0);

    cluster
        .launch_tasks(
            &offer.offer_id,
            vec![
                assignment("1", "n1", "block"),
                assignment("2", "n1", "block"),
                assignment("3", "elsewhere", "block"),
            ],
            Filters::default(),
        )
        .await
        .unwrap();

    let mut lost = Vec::new();
    let mut running = Vec::new();
    while lost.len() < 2 || running.is_empty() {
        let s = next_status(&mut rx).await;
        match s.state {
            TaskState::Lost => lost.push(s.task_id.to_string()),
            TaskState::Running => running.push(s.task_id.to_string()),
            other => panic!("unexpected {other}"),
        }
    }
    lost.sort();
    assert_eq!(lost, vec!["2", "3"]);
    assert_eq!(running, vec!["1"]);
}

#[tokio::test]
async fn launch_against_unknown_offer_reports_lost() {
    let (cluster, mut rx) =
        LocalCluster::start_with_workload(config(&[("n1", 1.0, 128.0)]), fake()).unwrap();
    cluster
        .launch_tasks(
            &OfferId::from("stale"),
            vec![assignment("1", "n1", "ok:x")],
            Filters::default(),
        )
        .await
        .unwrap();
    let status = next_status(&mut rx).await;
    assert_eq!(status.state, TaskState::Lost);
    assert!(status.message.unwrap().contains("stale"));
}

#[tokio::test]
async fn unanswered_offers_are_rescinded() {
    let mut cfg = config(&[("n1", 1.0, 128.0)]);
    cfg.offer_timeout = Some(Duration::from_millis(50));
    let (_cluster, mut rx) = LocalCluster::start_with_workload(cfg, fake()).unwrap();
    let offer = next_offers(&mut rx).await.remove(0);

    loop {
        match next(&mut rx).await {
            SchedulerEvent::OfferRescinded(id) => {
                assert_eq!(id, offer.offer_id);
                break;
            }
            SchedulerEvent::ResourceOffers(_) => panic!("re-offered before rescind"),
            _ => {}
        }
    }
    let fresh = next_offers(&mut rx).await.remove(0);
    assert_ne!(fresh.offer_id, offer.offer_id);
}

#[tokio::test]
async fn stop_ends_offers_and_refuses_launches() {
    let (cluster, mut rx) =
        LocalCluster::start_with_workload(config(&[("n1", 1.0, 128.0)]), fake()).unwrap();
    let offer = next_offers(&mut rx).await.remove(0);
    cluster.stop().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Ok(ev) = rx.try_recv() {
        assert!(!matches!(ev, SchedulerEvent::ResourceOffers(_)));
    }
    let err = cluster
        .launch_tasks(&offer.offer_id, vec![], Filters::default())
        .await
        .unwrap_err();
    assert_eq!(err, DriverError::Closed);
}

#[tokio::test]
async fn abort_shuts_executors_down() {
    let (cluster, mut rx) =
        LocalCluster::start_with_workload(config(&[("n1", 1.0, 128.0)]), fake()).unwrap();
    let offer = next_offers(&mut rx).await.remove(0);
    cluster
        .launch_tasks(
            &offer.offer_id,
            vec![assignment("1", "n1", "block")],
            Filters::default(),
        )
        .await
        .unwrap();
    assert_eq!(next_status(&mut rx).await.state, TaskState::Running);

    cluster.abort().await.unwrap();
    let failed = next_status(&mut rx).await;
    assert_eq!(failed.state, TaskState::Failed);
    assert_eq!(failed.message.as_deref(), Some("cancelled"));

    drop(rx);
    let stats = cluster.shutdown().await;
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].1.failed, 1);
}

#[tokio::test]
async fn scheduler_completes_against_the_cluster() {
    let (cluster, mut rx) = LocalCluster::start_with_workload(
        config(&[("n1", 2.0, 256.0), ("n2", 1.0, 128.0)]),
        fake(),
    )
    .unwrap();
    let commands: Vec<String> = (0..5).map(|i| format!("ok:{i}")).collect();
    let mut scheduler = Scheduler::new(SchedulerConfig::new(demand()), commands).unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(10), scheduler.run(&mut rx, &cluster))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.finished, 5);
    assert_eq!(summary.launched, 5);

    drop(rx);
    let stats = cluster.shutdown().await;
    let finished: usize = stats.iter().map(|(_, s)| s.finished).sum();
    assert_eq!(finished, 5);
}

#[tokio::test]
async fn failing_task_aborts_the_scheduler() {
    let (cluster, mut rx) =
        LocalCluster::start_with_workload(config(&[("n1", 2.0, 256.0)]), fake()).unwrap();
    let mut scheduler =
        Scheduler::new(SchedulerConfig::new(demand()), ["ok:a", "fail"]).unwrap();

    let err = tokio::time::timeout(Duration::from_secs(10), scheduler.run(&mut rx, &cluster))
        .await
        .unwrap()
        .unwrap_err();
    match err {
        CoreError::ProtocolAbort { task_id, state, .. } => {
            assert_eq!(task_id, TaskId::from("2"));
            assert_eq!(state, TaskState::Failed);
        }
        other => panic!("unexpected {other}"),
    }
}
