use std::{
    collections::{BTreeSet, HashSet},
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        mpsc::{self, Receiver},
        Once,
    },
    thread,
    time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use rayon::{
    prelude::{IntoParallelRefIterator, ParallelIterator},
    ThreadPoolBuilder,
};

use crate::{error::ScanError, resolver::Candidate};

pub use self::{
    method::{Connect, TcpConnect},
    probe::probe,
};

mod method;
mod probe;

const WORKER_PREFIX: &str = "probe-";

static QUIET_WORKERS: Once = Once::new();

fn worker_name(index: usize) -> String {
    format!("{}{}", WORKER_PREFIX, index)
}

fn is_worker(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.starts_with(WORKER_PREFIX))
}

// Worker panics are reported by `scan_port` through `log`; any other thread
// still goes through the hook that was installed before.
fn silence_worker_panics() {
    QUIET_WORKERS.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if is_worker(thread::current().name()) {
                log::debug!("Worker panicked: {}", info);
            } else {
                previous(info);
            }
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown cause"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortResult {
    pub port: u16,
    pub open: bool,
}

impl PortResult {
    fn new(port: u16, open: bool) -> Self {
        Self { port, open }
    }
}

#[derive(Debug)]
pub struct ScanResult {
    pub candidates: Vec<Candidate>,
    pub open_ports: BTreeSet<u16>,
    pub total: usize,
    pub started: Instant,
    pub finished: Instant,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl ScanResult {
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.finished.duration_since(self.started)
    }
}

pub struct Scanner {
    candidates: Vec<Candidate>,
    ports: Vec<u16>,
    timeout: Duration,
    concurrency: usize,
    connector: Box<dyn Connect>,
}

impl Scanner {
    pub fn new(
        candidates: Vec<Candidate>,
        ports: &[u16],
        timeout: Duration,
        concurrency: usize,
    ) -> Result<Self, ScanError> {
        if concurrency == 0 {
            return Err(ScanError::InvalidConcurrency);
        }
        if timeout.is_zero() {
            return Err(ScanError::InvalidTimeout(format!("{:?}", timeout)));
        }

        let mut ports = ports.to_vec();
        ports.sort_unstable();
        ports.dedup();

        Ok(Self {
            candidates,
            ports,
            timeout,
            concurrency,
            connector: Box::new(TcpConnect),
        })
    }

    pub fn with_connector(mut self, connector: Box<dyn Connect>) -> Self {
        self.connector = connector;
        self
    }

    #[inline]
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    #[inline]
    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    // A panicking probe would abort the whole process from inside a rayon
    // worker, so it's contained here and reported as closed.
    fn scan_port(&self, port: u16) -> PortResult {
        let open = panic::catch_unwind(AssertUnwindSafe(|| {
            probe(
                self.connector.as_ref(),
                port,
                &self.candidates,
                self.timeout,
            )
        }))
        .unwrap_or_else(|payload| {
            log::warn!(
                "Probe of port {} failed unexpectedly ({}), marking it closed",
                port,
                panic_message(payload.as_ref())
            );
            false
        });

        PortResult::new(port, open)
    }

    pub fn start(&self) -> Result<ScanResult, ScanError> {
        self.start_with(|_| {})
    }

    /// Probes every port with at most `concurrency` probes in flight and
    /// hands each result to `observer` in completion order. Returns once
    /// all ports are accounted for.
    pub fn start_with<F>(&self, observer: F) -> Result<ScanResult, ScanError>
    where
        F: FnMut(&PortResult) + Send,
    {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .thread_name(worker_name)
            .build()
            .map_err(ScanError::WorkerPoolFailed)?;

        log::debug!(
            "Scanning {} ports on {} candidates with {} workers",
            self.ports.len(),
            self.candidates.len(),
            self.concurrency
        );

        silence_worker_panics();

        let (tx, rx) = mpsc::channel();

        let started_at = Local::now();
        let started = Instant::now();
        let collected = thread::scope(|s| {
            let collector = s.spawn(move || collect(rx, observer));

            pool.install(|| {
                self.ports.par_iter().for_each_with(tx, |tx, &port| {
                    // Receiver outlives every sender, so send can't fail.
                    let _ = tx.send(self.scan_port(port));
                })
            });

            collector.join()
        });
        let finished = Instant::now();
        let finished_at = Local::now();

        let (open_ports, total) = match collected {
            Ok(summary) => summary,
            Err(e) => panic::resume_unwind(e),
        };

        log::debug!(
            "Scan finished: {} of {} ports open in {:?}",
            open_ports.len(),
            total,
            finished.duration_since(started)
        );

        Ok(ScanResult {
            candidates: self.candidates.clone(),
            open_ports,
            total,
            started,
            finished,
            started_at,
            finished_at,
        })
    }
}

fn collect<F>(rx: Receiver<PortResult>, mut observer: F) -> (BTreeSet<u16>, usize)
where
    F: FnMut(&PortResult),
{
    let mut open_ports = BTreeSet::new();
    let mut completed = HashSet::new();

    for result in rx {
        if !completed.insert(result.port) {
            log::warn!("Ignoring repeated result for port {}", result.port);
            continue;
        }

        if result.open {
            log::debug!("Port {} is open", result.port);
            open_ports.insert(result.port);
        }

        observer(&result);
    }

    (open_ports, completed.len())
}
