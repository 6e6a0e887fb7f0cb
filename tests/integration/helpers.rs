//! Helper functions for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use slot_drift_monitor::{
    MonitoredProcess, ProbeError, ProbeResult, RetryPolicy, ScanOrchestrator, Sleeper, Slot,
    SlotProber,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn create_process(id: &str, nodes: &[&str]) -> MonitoredProcess {
    MonitoredProcess {
        id: id.to_string(),
        kind: "token".to_string(),
        nodes: nodes.iter().map(|node| node.to_string()).collect(),
    }
}

/// Records requested delays without waiting
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// In-memory prober answering from per-node scripts
///
/// The last entry of a script repeats forever.
#[derive(Default)]
pub struct ScriptedProber {
    scheduler: HashMap<String, ProbeResult<Slot>>,
    nodes: Mutex<HashMap<String, Vec<ProbeResult<Slot>>>>,
    node_calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduler(mut self, process_id: &str, slot: ProbeResult<Slot>) -> Self {
        self.scheduler.insert(process_id.to_string(), slot);
        self
    }

    pub fn node(self, node: &str, script: Vec<ProbeResult<Slot>>) -> Self {
        self.nodes.lock().unwrap().insert(node.to_string(), script);
        self
    }

    pub fn node_calls(&self, node: &str) -> usize {
        self.node_calls
            .lock()
            .unwrap()
            .get(node)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SlotProber for ScriptedProber {
    async fn scheduler_slot(&self, process_id: &str) -> ProbeResult<Slot> {
        self.scheduler
            .get(process_id)
            .cloned()
            .unwrap_or_else(|| Err(ProbeError::network("unknown process")))
    }

    async fn node_slot(&self, _process_id: &str, node: &str) -> ProbeResult<Slot> {
        *self
            .node_calls
            .lock()
            .unwrap()
            .entry(node.to_string())
            .or_default() += 1;

        let mut nodes = self.nodes.lock().unwrap();
        let Some(script) = nodes.get_mut(node) else {
            return Err(ProbeError::network(format!("unknown node {node}")));
        };

        if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        }
    }
}

pub fn orchestrator(
    prober: Arc<ScriptedProber>,
    max_retries: u32,
    threshold: u64,
) -> (ScanOrchestrator, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let orchestrator = ScanOrchestrator::new(prober, RetryPolicy::new(max_retries, threshold))
        .with_sleeper(sleeper.clone());
    (orchestrator, sleeper)
}

pub fn scheduler_path(process_id: &str) -> String {
    format!("/{process_id}~process@1.0/slot/current")
}

pub fn node_path(process_id: &str) -> String {
    format!("/{process_id}~process@1.0/compute/at-slot")
}

/// Mount a plain-text slot answer for the scheduler of `process_id`
pub async fn mount_scheduler_slot(server: &MockServer, process_id: &str, slot: Slot) {
    Mock::given(method("GET"))
        .and(path(scheduler_path(process_id)))
        .respond_with(ResponseTemplate::new(200).set_body_string(slot.to_string()))
        .mount(server)
        .await;
}
