//! Local multi-party runs for tests: one tokio task per party over the
//! in-memory network, outputs collected in party order

use crate::mpc::{Job2P, JobMP, MemoryNetwork, MemoryTransport, Role};
use std::future::Future;

pub(crate) fn roster(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("party_{}", i)).collect()
}

pub(crate) async fn run_2p<F, Fut, O>(f: F) -> Vec<O>
where
    F: Fn(Job2P<MemoryTransport>) -> Fut,
    Fut: Future<Output = O> + Send + 'static,
    O: Send + 'static,
{
    let net = MemoryNetwork::new(2);
    let handles: Vec<_> = [Role::P1, Role::P2]
        .into_iter()
        .map(|role| {
            let job = Job2P::new(net.endpoint(role.index()), role, "party_0", "party_1").unwrap();
            tokio::spawn(f(job))
        })
        .collect();
    let mut out = Vec::with_capacity(2);
    for h in handles {
        out.push(h.await.unwrap());
    }
    out
}

pub(crate) async fn run_mp<F, Fut, O>(n: usize, f: F) -> Vec<O>
where
    F: Fn(JobMP<MemoryTransport>) -> Fut,
    Fut: Future<Output = O> + Send + 'static,
    O: Send + 'static,
{
    let net = MemoryNetwork::new(n);
    let handles: Vec<_> = (0..n)
        .map(|i| {
            let job = JobMP::new(net.endpoint(i), i, roster(n)).unwrap();
            tokio::spawn(f(job))
        })
        .collect();
    let mut out = Vec::with_capacity(n);
    for h in handles {
        out.push(h.await.unwrap());
    }
    out
}
