//! Rendezvous collaborator
//!
//! Workers discover peers and agree on ranks before collective training
//! starts. The servicer proxies to this contract; the default
//! implementation tracks the process table in memory.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::info;

/// Which collective bootstrap the workers use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendezvousDialect {
    Horovod,
    Ddp,
}

impl RendezvousDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            RendezvousDialect::Horovod => "horovod",
            RendezvousDialect::Ddp => "DDP",
        }
    }
}

/// Rank assignment of one worker process
#[derive(Debug, Clone)]
pub struct HostRankInfo {
    pub dialect: RendezvousDialect,
    pub rank_id: u64,
    pub local_rank: u64,
    pub local_size: u64,
    pub cross_rank: u64,
    pub cross_size: u64,
    pub master_addr: String,
    pub master_port: u16,
}

/// Contract the servicer holds against the rendezvous subsystem
pub trait RendezvousService: Send + Sync {
    fn add_process(&self, worker_host: &str, local_process_id: u64, ddp_server_port: u16);

    fn remove_process(&self, worker_host: &str, local_process_id: u64);

    fn get_worker_host_rank(&self, worker_host: &str, local_process_id: u64)
        -> Option<HostRankInfo>;

    fn reset_sync(&self, worker_host: &str, local_process_id: u64, rendezvous_id: u64) -> bool;

    fn barrier_sync(&self, worker_host: &str, local_process_id: u64, rendezvous_id: u64) -> bool;

    fn get_size(&self) -> usize;

    fn get_rendezvous_id(&self) -> u64;

    fn get_rendezvous_port(&self) -> u16;

    fn report_prestop(&self, worker_host: &str);
}

#[derive(Default)]
struct RendezvousState {
    /// (host, local process id) -> DDP server port, in arrival order
    processes: IndexMap<(String, u64), u16>,
    rendezvous_id: u64,
    barrier_arrivals: HashMap<u64, HashSet<(String, u64)>>,
    prestop_hosts: HashSet<String>,
}

/// In-memory rendezvous server over a fixed process table
pub struct StaticRendezvousServer {
    dialect: RendezvousDialect,
    rendezvous_port: u16,
    state: Mutex<RendezvousState>,
}

impl StaticRendezvousServer {
    pub fn new(dialect: RendezvousDialect, rendezvous_port: u16) -> Self {
        Self {
            dialect,
            rendezvous_port,
            state: Mutex::new(RendezvousState::default()),
        }
    }
}

impl RendezvousService for StaticRendezvousServer {
    fn add_process(&self, worker_host: &str, local_process_id: u64, ddp_server_port: u16) {
        let mut state = self.state.lock();
        let key = (worker_host.to_string(), local_process_id);
        if state.processes.insert(key, ddp_server_port).is_none() {
            state.rendezvous_id += 1;
            info!(
                host = worker_host,
                process = local_process_id,
                rendezvous = state.rendezvous_id,
                "Process joined the rendezvous"
            );
        }
    }

    fn remove_process(&self, worker_host: &str, local_process_id: u64) {
        let mut state = self.state.lock();
        let key = (worker_host.to_string(), local_process_id);
        if state.processes.shift_remove(&key).is_some() {
            state.rendezvous_id += 1;
            info!(
                host = worker_host,
                process = local_process_id,
                rendezvous = state.rendezvous_id,
                "Process left the rendezvous"
            );
        }
    }

    fn get_worker_host_rank(
        &self,
        worker_host: &str,
        local_process_id: u64,
    ) -> Option<HostRankInfo> {
        let state = self.state.lock();
        let key = (worker_host.to_string(), local_process_id);
        let rank_id = state.processes.get_index_of(&key)? as u64;

        let same_host: Vec<_> = state
            .processes
            .keys()
            .filter(|(host, _)| host == worker_host)
            .collect();
        let local_size = same_host.len() as u64;
        let local_rank = same_host
            .iter()
            .position(|(_, pid)| *pid == local_process_id)
            .unwrap_or(0) as u64;

        let mut hosts: Vec<&String> = Vec::new();
        for (host, _) in state.processes.keys() {
            if !hosts.contains(&host) {
                hosts.push(host);
            }
        }
        let cross_size = hosts.len() as u64;
        let cross_rank = hosts
            .iter()
            .position(|h| h.as_str() == worker_host)
            .unwrap_or(0) as u64;

        let ((master_addr, _), master_port) = state.processes.first()?;

        Some(HostRankInfo {
            dialect: self.dialect,
            rank_id,
            local_rank,
            local_size,
            cross_rank,
            cross_size,
            master_addr: master_addr.clone(),
            master_port: *master_port,
        })
    }

    fn reset_sync(&self, _worker_host: &str, _local_process_id: u64, rendezvous_id: u64) -> bool {
        let mut state = self.state.lock();
        state.barrier_arrivals.remove(&rendezvous_id);
        true
    }

    fn barrier_sync(&self, worker_host: &str, local_process_id: u64, rendezvous_id: u64) -> bool {
        let mut state = self.state.lock();
        let expected = state.processes.len();
        if expected == 0 {
            return false;
        }
        let arrivals = state.barrier_arrivals.entry(rendezvous_id).or_default();
        arrivals.insert((worker_host.to_string(), local_process_id));
        arrivals.len() >= expected
    }

    fn get_size(&self) -> usize {
        self.state.lock().processes.len()
    }

    fn get_rendezvous_id(&self) -> u64 {
        self.state.lock().rendezvous_id
    }

    fn get_rendezvous_port(&self) -> u16 {
        self.rendezvous_port
    }

    fn report_prestop(&self, worker_host: &str) {
        let mut state = self.state.lock();
        state.prestop_hosts.insert(worker_host.to_string());
        info!(host = worker_host, "Worker announced pre-stop");
    }
}
