//! Subcommands and their reports.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Subcommand;
use corelib::Config;
use eventq::{DequeueStatus, EventQueue, Timeout, WaitCoordinator};
use handles::{Handle, HandleRegistry, Handled, OwnerTag};
use tracing::{info, warn};

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Producers enqueue into one queue while this thread polls it.
    EqStress {
        /// Requested queue capacity (rounded up to a power of two).
        #[arg(long, default_value_t = 64)]
        capacity: usize,
        /// Number of producer threads.
        #[arg(long, default_value_t = 2)]
        producers: usize,
        /// Events per producer.
        #[arg(long, default_value_t = 10_000)]
        events: usize,
        /// Poll timeout in milliseconds; 0 never blocks.
        #[arg(long, default_value_t = 100)]
        timeout_ms: u64,
    },
    /// Resolve handles from reader threads while they are torn down.
    HandleStress {
        /// Objects registered per round.
        #[arg(long, default_value_t = 1_000)]
        objects: usize,
        /// Number of reader threads.
        #[arg(long, default_value_t = 4)]
        readers: usize,
        /// Number of register/teardown rounds.
        #[arg(long, default_value_t = 10)]
        rounds: usize,
        /// Objects left registered at the end, reported by shutdown.
        #[arg(long, default_value_t = 0)]
        leak: usize,
    },
    /// Print the effective configuration as JSON.
    Config,
}

/// Outcome of an event queue stress run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EqStressReport {
    pub capacity: usize,
    pub enqueued: usize,
    pub consumed: usize,
    pub overflows: usize,
    pub missed: u64,
    pub elapsed: Duration,
}

/// Outcome of a handle stress run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleStressReport {
    pub registered: usize,
    pub resolved: usize,
    pub misses: usize,
    pub leaked: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    EqStress(EqStressReport),
    HandleStress(HandleStressReport),
    Config(String),
}

impl Command {
    pub fn execute(&self, config: &Config) -> anyhow::Result<CommandResult> {
        match *self {
            Command::EqStress {
                capacity,
                producers,
                events,
                timeout_ms,
            } => eq_stress(config, capacity, producers, events, timeout_ms)
                .map(CommandResult::EqStress),
            Command::HandleStress {
                objects,
                readers,
                rounds,
                leak,
            } => handle_stress(config, objects, readers, rounds, leak)
                .map(CommandResult::HandleStress),
            Command::Config => Ok(CommandResult::Config(config.to_json_pretty()?)),
        }
    }
}

fn eq_stress(
    config: &Config,
    capacity: usize,
    producers: usize,
    events: usize,
    timeout_ms: u64,
) -> anyhow::Result<EqStressReport> {
    let waiter = WaitCoordinator::new(config.event_queue.clone())?;
    let eq = EventQueue::<(usize, usize)>::create(&waiter, capacity, None)?;
    let timeout = Timeout::from(Duration::from_millis(timeout_ms));
    let finished = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    info!(
        capacity = eq.capacity(),
        producers, events, "starting event queue stress"
    );

    let workers: Vec<_> = (0..producers)
        .map(|id| {
            let eq = Arc::clone(&eq);
            let finished = Arc::clone(&finished);
            thread::spawn(move || {
                let produced = produce(&eq, id, events);
                finished.fetch_add(1, Ordering::Release);
                produced
            })
        })
        .collect();

    let mut consumed = 0;
    let mut overflows = 0;
    let mut missed = 0;
    loop {
        // Sampled before the sweep so a `None` afterwards means drained.
        let all_done = finished.load(Ordering::Acquire) == producers;
        match waiter.poll(&[Some(&*eq)], timeout)? {
            Some(polled) => {
                consumed += 1;
                if let DequeueStatus::Overflow { missed: lost } = polled.status {
                    overflows += 1;
                    missed += lost;
                }
            }
            None if all_done => break,
            None => {}
        }
    }

    for worker in workers {
        worker
            .join()
            .map_err(|_| anyhow::anyhow!("producer thread panicked"))??;
    }
    eq.destroy()?;

    Ok(EqStressReport {
        capacity: eq.capacity(),
        enqueued: producers * events,
        consumed,
        overflows,
        missed,
        elapsed: start.elapsed(),
    })
}

fn produce(eq: &Arc<EventQueue<(usize, usize)>>, id: usize, events: usize) -> corelib::Result<()> {
    let _held = eq.hold()?;
    for n in 0..events {
        eq.enqueue((id, n))?;
    }
    Ok(())
}

struct Session {
    handle: Handle,
}

impl Handled for Session {
    fn handle(&self) -> &Handle {
        &self.handle
    }
}

fn handle_stress(
    config: &Config,
    objects: usize,
    readers: usize,
    rounds: usize,
    leak: usize,
) -> anyhow::Result<HandleStressReport> {
    let registry = HandleRegistry::new(&config.registry)?;
    let tag = OwnerTag::new("session");
    let resolved = AtomicUsize::new(0);
    let misses = AtomicUsize::new(0);
    let start = Instant::now();

    info!(objects, readers, rounds, "starting handle stress");

    for _ in 0..rounds {
        let sessions: Vec<_> = (0..objects)
            .map(|_| {
                Arc::new(Session {
                    handle: Handle::new(),
                })
            })
            .collect();
        let cookies = sessions
            .iter()
            .map(|s| registry.register(s, tag))
            .collect::<corelib::Result<Vec<_>>>()?;
        let done = AtomicBool::new(false);

        thread::scope(|scope| {
            for _ in 0..readers {
                scope.spawn(|| {
                    while !done.load(Ordering::Acquire) {
                        for cookie in &cookies {
                            match registry.resolve_as::<Session>(*cookie, tag) {
                                Ok(_) => resolved.fetch_add(1, Ordering::Relaxed),
                                Err(_) => misses.fetch_add(1, Ordering::Relaxed),
                            };
                        }
                    }
                });
            }

            for session in &sessions {
                registry.unregister(session.handle());
                session.handle().put();
            }
            done.store(true, Ordering::Release);
        });
    }

    let kept: Vec<_> = (0..leak)
        .map(|_| {
            Arc::new(Session {
                handle: Handle::new(),
            })
        })
        .collect();
    for session in &kept {
        registry.register(session, tag)?;
    }

    let leaked = registry.shutdown();
    if leaked != 0 {
        warn!(leaked, "handles still registered at shutdown");
    }

    Ok(HandleStressReport {
        registered: objects * rounds + leak,
        resolved: resolved.into_inner(),
        misses: misses.into_inner(),
        leaked,
        elapsed: start.elapsed(),
    })
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::EqStress(r) => write!(
                f,
                "capacity={} enqueued={} consumed={} overflows={} missed={} elapsed={:?}",
                r.capacity, r.enqueued, r.consumed, r.overflows, r.missed, r.elapsed
            ),
            CommandResult::HandleStress(r) => write!(
                f,
                "registered={} resolved={} misses={} leaked={} elapsed={:?}",
                r.registered, r.resolved, r.misses, r.leaked, r.elapsed
            ),
            CommandResult::Config(json) => f.write_str(json),
        }
    }
}
