//! Kernel integration tests
//!
//! Every scenario runs as the init task on real OS threads through
//! `StdHal`. Results travel back to the test thread through init's exit
//! status or a channel, and every wait on the kernel is bounded so a
//! protocol bug fails the test instead of hanging it.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tos_hal::ContextEntry;
use tos_kernel::{
    task, Kernel, KernelConfig, KernelError, Pid, ProcInfo, ShutdownMode, StdHal, Sys, Task,
    HalError, HAL, NOPORT, PROCINFO_RECORD_SIZE,
};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Long enough for another context to reach its blocking call
const SETTLE: Duration = Duration::from_millis(100);

// ============================================================================
// Helpers
// ============================================================================

fn job<F>(f: F) -> Task<StdHal>
where
    F: Fn(&Sys<StdHal>, &[u8]) -> i32 + Send + Sync + 'static,
{
    task(f)
}

fn run_init_with<F>(config: KernelConfig, init: F) -> (Kernel<StdHal>, i32)
where
    F: Fn(&Sys<StdHal>, &[u8]) -> i32 + Send + Sync + 'static,
{
    let kernel = Kernel::boot(StdHal::new(), config, job(init), &[]).unwrap();
    let status = kernel
        .wait_for_init_timeout(TIMEOUT)
        .expect("init did not exit in time");
    (kernel, status)
}

fn run_init<F>(init: F) -> (Kernel<StdHal>, i32)
where
    F: Fn(&Sys<StdHal>, &[u8]) -> i32 + Send + Sync + 'static,
{
    run_init_with(KernelConfig::default(), init)
}

fn small_pipes() -> KernelConfig {
    KernelConfig {
        pipe_buffer_size: 16,
        ..KernelConfig::default()
    }
}

/// After init exits only idle and the init zombie remain
fn assert_quiescent(kernel: &Kernel<StdHal>) {
    let violations = kernel.check_invariants();
    assert!(violations.is_empty(), "invariant violations: {:?}", violations);
    assert_eq!(kernel.process_count(), 2);
    assert_eq!(kernel.live_threads(), 0);
    assert_eq!(kernel.open_pipes(), 0);
    assert_eq!(kernel.open_sockets(), 0);
    assert_eq!(kernel.pending_requests(), 0);
}

// ============================================================================
// Mock HALs
// ============================================================================

/// Refuses every execution context
struct FailingHal;

impl HAL for FailingHal {
    fn spawn_context(&self, _name: &str, _entry: ContextEntry) -> Result<(), HalError> {
        Err(HalError::ContextSpawnFailed)
    }

    fn exit_context(&self) -> ! {
        panic!("no context was ever spawned")
    }
}

/// Grants a fixed number of contexts, then refuses
struct LimitedHal {
    remaining: AtomicUsize,
    inner: StdHal,
}

impl HAL for LimitedHal {
    fn spawn_context(&self, name: &str, entry: ContextEntry) -> Result<(), HalError> {
        let granted = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !granted {
            return Err(HalError::ContextSpawnFailed);
        }
        self.inner.spawn_context(name, entry)
    }

    fn exit_context(&self) -> ! {
        self.inner.exit_context()
    }
}

// ============================================================================
// Boot
// ============================================================================

#[test]
fn test_init_status_is_reported() {
    let (kernel, status) = run_init(|sys, _| {
        assert_eq!(sys.get_pid(), Pid::INIT);
        assert_eq!(sys.get_ppid(), None);
        17
    });
    assert_eq!(status, 17);
    assert_quiescent(&kernel);
}

#[test]
fn test_boot_rejects_invalid_config() {
    let config = KernelConfig {
        max_proc: 1,
        ..KernelConfig::default()
    };
    let result = Kernel::boot(StdHal::new(), config, job(|_, _| 0), &[]);
    assert!(matches!(result, Err(KernelError::InvalidConfig(_))));
}

#[test]
#[should_panic(expected = "failed to start init")]
fn test_boot_panics_without_contexts() {
    let _ = Kernel::boot(FailingHal, KernelConfig::default(), task(|_, _| 0), &[]);
}

#[test]
fn test_init_receives_boot_args() {
    let kernel = Kernel::boot(
        StdHal::new(),
        KernelConfig::default(),
        job(|_, args| args.len() as i32),
        b"boot",
    )
    .unwrap();
    assert_eq!(kernel.wait_for_init_timeout(TIMEOUT), Some(4));
}

// ============================================================================
// Processes
// ============================================================================

#[test]
fn test_exec_args_sum_to_exit_status() {
    let (kernel, status) = run_init(|sys, _| {
        let summer = job(|_, args| args.iter().map(|b| *b as i32).sum());
        let child = sys.exec(Some(summer), &[1, 2, 3, 4]).unwrap();
        let (pid, status) = sys.wait_child(Some(child)).unwrap();
        assert_eq!(pid, child);
        status
    });
    assert_eq!(status, 10);
    assert_quiescent(&kernel);
}

#[test]
fn test_wait_child_errors_and_any_child() {
    let (tx, rx) = mpsc::channel();
    let (kernel, _) = run_init(move |sys, _| {
        tx.send(sys.wait_child(None).map(|_| ())).unwrap();
        tx.send(sys.wait_child(Some(Pid(5))).map(|_| ())).unwrap();

        let a = sys.exec(Some(job(|_, _| 3)), &[]).unwrap();
        let b = sys.exec(Some(job(|_, _| 4)), &[]).unwrap();
        let mut seen = BTreeSet::new();
        for _ in 0..2 {
            let (pid, status) = sys.wait_child(None).unwrap();
            seen.insert((pid, status));
        }
        let expected: BTreeSet<_> = [(a, 3), (b, 4)].into_iter().collect();
        assert_eq!(seen, expected);

        tx.send(sys.wait_child(None).map(|_| ())).unwrap();
        0
    });

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Err(KernelError::NoChildren));
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Err(KernelError::NotAChild));
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Err(KernelError::NoChildren));
    assert_quiescent(&kernel);
}

#[test]
fn test_wait_for_specific_child_skips_others() {
    let (kernel, status) = run_init(|sys, _| {
        let fast = sys.exec(Some(job(|_, _| 1)), &[]).unwrap();
        let slow = sys
            .exec(
                Some(job(|_, _| {
                    thread::sleep(SETTLE);
                    2
                })),
                &[],
            )
            .unwrap();
        let (pid, status) = sys.wait_child(Some(slow)).unwrap();
        assert_eq!(pid, slow);
        // The fast child is still waiting to be collected
        assert_eq!(sys.wait_child(Some(fast)).unwrap(), (fast, 1));
        status
    });
    assert_eq!(status, 2);
    assert_quiescent(&kernel);
}

#[test]
fn test_orphans_are_reparented_to_init() {
    let (tx, rx) = mpsc::channel();
    let (kernel, _) = run_init(move |sys, _| {
        let tx = tx.clone();
        let parent = job(move |sys, _| {
            let tx = tx.clone();
            let orphan = job(move |sys, _| {
                thread::sleep(SETTLE);
                tx.send(sys.get_ppid()).unwrap();
                9
            });
            sys.exec(Some(orphan), &[]).unwrap();
            0
        });
        let p = sys.exec(Some(parent), &[]).unwrap();
        assert_eq!(sys.wait_child(Some(p)).unwrap(), (p, 0));

        // The grandchild now belongs to init
        let (_, status) = sys.wait_child(None).unwrap();
        status
    });

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Some(Pid::INIT));
    assert_quiescent(&kernel);
}

#[test]
fn test_init_collects_children_before_exiting() {
    let (kernel, status) = run_init(|sys, _| {
        for _ in 0..4 {
            sys.exec(
                Some(job(|_, _| {
                    thread::sleep(SETTLE);
                    0
                })),
                &[],
            )
            .unwrap();
        }
        5
    });
    assert_eq!(status, 5);
    assert_quiescent(&kernel);
}

#[test]
fn test_exit_from_nested_call() {
    fn bail(sys: &Sys<StdHal>) -> ! {
        sys.exit(5)
    }

    let (kernel, status) = run_init(|sys, _| {
        let child = sys.exec(Some(job(|sys, _| bail(sys))), &[]).unwrap();
        sys.wait_child(Some(child)).unwrap().1
    });
    assert_eq!(status, 5);
    assert_quiescent(&kernel);
}

#[test]
fn test_exec_rolls_back_when_spawn_fails() {
    let hal = LimitedHal {
        remaining: AtomicUsize::new(1),
        inner: StdHal::new(),
    };
    let init = task(|sys: &Sys<LimitedHal>, _: &[u8]| {
        assert_eq!(
            sys.exec(Some(task(|_, _| 0)), &[]),
            Err(KernelError::SpawnFailed)
        );
        assert_eq!(
            sys.create_thread(task(|_, _| 0), &[]),
            Err(KernelError::SpawnFailed)
        );
        assert_eq!(sys.wait_child(None), Err(KernelError::NoChildren));
        0
    });

    let kernel = Kernel::boot(hal, KernelConfig::default(), init, &[]).unwrap();
    assert_eq!(kernel.wait_for_init_timeout(TIMEOUT), Some(0));
    assert!(kernel.check_invariants().is_empty());
    assert_eq!(kernel.process_count(), 2);
}

// ============================================================================
// Threads
// ============================================================================

#[test]
fn test_thread_join_returns_value_then_unknown() {
    let (tx, rx) = mpsc::channel();
    let (kernel, _) = run_init(move |sys, _| {
        let tid = sys.create_thread(job(|_, _| 42), &[]).unwrap();
        tx.send(sys.thread_join(tid)).unwrap();
        tx.send(sys.thread_join(tid)).unwrap();
        0
    });

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Ok(42));
    assert_eq!(
        rx.recv_timeout(TIMEOUT).unwrap(),
        Err(KernelError::UnknownThread)
    );
    assert_quiescent(&kernel);
}

#[test]
fn test_join_self_fails() {
    let (kernel, status) = run_init(|sys, _| {
        match sys.thread_join(sys.thread_self()) {
            Err(KernelError::JoinSelf) => 0,
            _ => 1,
        }
    });
    assert_eq!(status, 0);
    assert_quiescent(&kernel);
}

#[test]
fn test_thread_exit_value_reaches_joiner() {
    let (kernel, status) = run_init(|sys, _| {
        let tid = sys.create_thread(job(|sys, _| sys.thread_exit(3)), &[]).unwrap();
        sys.thread_join(tid).unwrap()
    });
    assert_eq!(status, 3);
    assert_quiescent(&kernel);
}

#[test]
fn test_concurrent_joiners_see_same_value() {
    let (tx, rx) = mpsc::channel();
    let (kernel, _) = run_init(move |sys, _| {
        let worker = sys
            .create_thread(
                job(|_, _| {
                    thread::sleep(SETTLE * 3);
                    7
                }),
                &[],
            )
            .unwrap();

        let mut joiners = Vec::new();
        for _ in 0..2 {
            let tx = tx.clone();
            let joiner = job(move |sys, _| {
                tx.send(sys.thread_join(worker)).unwrap();
                0
            });
            joiners.push(sys.create_thread(joiner, &[]).unwrap());
        }
        for joiner in joiners {
            sys.thread_join(joiner).unwrap();
        }
        0
    });

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Ok(7));
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Ok(7));
    assert_quiescent(&kernel);
}

#[test]
fn test_detach_fails_pending_joins() {
    let (tx, rx) = mpsc::channel();
    let (kernel, _) = run_init(move |sys, _| {
        let worker = sys
            .create_thread(
                job(|_, _| {
                    thread::sleep(SETTLE * 3);
                    1
                }),
                &[],
            )
            .unwrap();

        let mut joiners = Vec::new();
        for _ in 0..2 {
            let tx = tx.clone();
            let joiner = job(move |sys, _| {
                tx.send(sys.thread_join(worker)).unwrap();
                0
            });
            joiners.push(sys.create_thread(joiner, &[]).unwrap());
        }

        thread::sleep(SETTLE);
        sys.thread_detach(worker).unwrap();
        for joiner in joiners {
            sys.thread_join(joiner).unwrap();
        }
        tx.send(sys.thread_join(worker)).unwrap();
        0
    });

    for _ in 0..3 {
        assert_eq!(
            rx.recv_timeout(TIMEOUT).unwrap(),
            Err(KernelError::ThreadDetached)
        );
    }
    assert_quiescent(&kernel);
}

#[test]
fn test_detach_after_exit_fails() {
    let (kernel, status) = run_init(|sys, _| {
        let tid = sys.create_thread(job(|_, _| 0), &[]).unwrap();
        thread::sleep(SETTLE);
        let detached = sys.thread_detach(tid);
        sys.thread_join(tid).unwrap();
        match detached {
            Err(KernelError::ThreadExited) => 0,
            _ => 1,
        }
    });
    assert_eq!(status, 0);
    assert_quiescent(&kernel);
}

#[test]
fn test_process_outlives_main_thread() {
    let (tx, rx) = mpsc::channel();
    let (kernel, status) = run_init(move |sys, _| {
        let tx = tx.clone();
        let child = job(move |sys, _| {
            let tx = tx.clone();
            let worker = job(move |_, _| {
                thread::sleep(SETTLE);
                tx.send("worker done").unwrap();
                0
            });
            sys.create_thread(worker, &[]).unwrap();
            4
        });
        let pid = sys.exec(Some(child), &[]).unwrap();
        sys.wait_child(Some(pid)).unwrap().1
    });

    // The child only became a zombie after its last thread exited
    assert_eq!(rx.try_recv(), Ok("worker done"));
    assert_eq!(status, 4);
    assert_quiescent(&kernel);
}

// ============================================================================
// Pipes
// ============================================================================

#[test]
fn test_pipe_is_fifo() {
    let (kernel, status) = run_init(|sys, _| {
        let p = sys.pipe().unwrap();
        assert_eq!(sys.write(p.write, b"hello ").unwrap(), 6);
        assert_eq!(sys.write(p.write, b"world").unwrap(), 5);

        let mut buf = [0u8; 64];
        let n = sys.read(p.read, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello world");

        sys.close(p.write).unwrap();
        let eof = sys.read(p.read, &mut buf).unwrap();
        sys.close(p.read).unwrap();
        eof as i32
    });
    assert_eq!(status, 0);
    assert_quiescent(&kernel);
}

#[test]
fn test_blocked_writer_drains_through_reader() {
    let (tx, rx) = mpsc::channel();
    let (kernel, _) = run_init_with(small_pipes(), move |sys, _| {
        let p = sys.pipe().unwrap();
        let tx = tx.clone();
        let reader = job(move |sys, _| {
            let mut received = Vec::new();
            let mut buf = [0u8; 7];
            loop {
                let n = sys.read(p.read, &mut buf).unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            let total = received.len() as i32;
            tx.send(received).unwrap();
            total
        });
        let tid = sys.create_thread(reader, &[]).unwrap();

        let data: Vec<u8> = (0..100u8).collect();
        let mut sent = 0;
        while sent < data.len() {
            sent += sys.write(p.write, &data[sent..]).unwrap();
        }
        sys.close(p.write).unwrap();
        let total = sys.thread_join(tid).unwrap();
        sys.close(p.read).unwrap();
        total
    });

    let expected: Vec<u8> = (0..100u8).collect();
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), expected);
    assert_quiescent(&kernel);
}

#[test]
fn test_reader_close_unblocks_writer() {
    let (kernel, status) = run_init_with(small_pipes(), |sys, _| {
        let p = sys.pipe().unwrap();
        let writer = job(move |sys, _| {
            assert_eq!(sys.write(p.write, &[1u8; 15]).unwrap(), 15);
            match sys.write(p.write, &[2u8; 4]) {
                Err(KernelError::BrokenPipe) => 0,
                _ => 1,
            }
        });
        let tid = sys.create_thread(writer, &[]).unwrap();
        thread::sleep(SETTLE);
        sys.close(p.read).unwrap();
        let status = sys.thread_join(tid).unwrap();
        sys.close(p.write).unwrap();
        status
    });
    assert_eq!(status, 0);
    assert_quiescent(&kernel);
}

#[test]
fn test_writer_close_unblocks_reader() {
    let (kernel, status) = run_init(|sys, _| {
        let p = sys.pipe().unwrap();
        let reader = job(move |sys, _| {
            let mut buf = [0u8; 8];
            sys.read(p.read, &mut buf).map_or(-1, |n| n as i32)
        });
        let tid = sys.create_thread(reader, &[]).unwrap();
        thread::sleep(SETTLE);
        sys.close(p.write).unwrap();
        let status = sys.thread_join(tid).unwrap();
        sys.close(p.read).unwrap();
        status
    });
    assert_eq!(status, 0);
    assert_quiescent(&kernel);
}

#[test]
fn test_pipe_endpoints_are_one_way() {
    let (kernel, status) = run_init(|sys, _| {
        let p = sys.pipe().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(sys.write(p.read, b"x"), Err(KernelError::NotWritable));
        assert_eq!(sys.read(p.write, &mut buf), Err(KernelError::NotReadable));
        sys.close(p.read).unwrap();
        assert_eq!(sys.close(p.read), Err(KernelError::BadDescriptor));
        assert_eq!(sys.write(p.write, b"x"), Err(KernelError::BrokenPipe));
        sys.close(p.write).unwrap();
        0
    });
    assert_eq!(status, 0);
    assert_quiescent(&kernel);
}

#[test]
fn test_child_shares_parent_pipe() {
    let (kernel, status) = run_init(|sys, _| {
        let p = sys.pipe().unwrap();
        let child = job(move |sys, _| {
            sys.close(p.read).unwrap();
            sys.write(p.write, b"from child").unwrap() as i32
        });
        let pid = sys.exec(Some(child), &[]).unwrap();
        sys.close(p.write).unwrap();

        let mut got = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = sys.read(p.read, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, b"from child");
        sys.close(p.read).unwrap();
        sys.wait_child(Some(pid)).unwrap().1
    });
    assert_eq!(status, 10);
    assert_quiescent(&kernel);
}

// ============================================================================
// Sockets
// ============================================================================

#[test]
fn test_accept_unblocks_pending_connect() {
    let (kernel, status) = run_init(|sys, _| {
        let a = sys.socket(7).unwrap();
        sys.listen(a).unwrap();

        let client = job(|sys, _| {
            let b = sys.socket(NOPORT).unwrap();
            sys.connect(b, 7, None).unwrap();
            let mut buf = [0u8; 2];
            let n = sys.read(b, &mut buf).unwrap();
            if &buf[..n] == b"hi" {
                0
            } else {
                1
            }
        });
        let pid = sys.exec(Some(client), &[]).unwrap();

        // Let the client block in connect before accepting
        thread::sleep(SETTLE);
        let c = sys.accept(a).unwrap();
        assert_eq!(sys.write(c, b"hi").unwrap(), 2);
        sys.wait_child(Some(pid)).unwrap().1
    });
    assert_eq!(status, 0);
    assert_quiescent(&kernel);
}

#[test]
fn test_peer_directions_are_independent() {
    let (kernel, status) = run_init(|sys, _| {
        let a = sys.socket(80).unwrap();
        sys.listen(a).unwrap();

        let client = job(|sys, _| {
            let b = sys.socket(NOPORT).unwrap();
            sys.connect(b, 80, Some(TIMEOUT)).unwrap();
            sys.write(b, b"ping").unwrap();
            sys.shutdown(b, ShutdownMode::Write).unwrap();
            assert_eq!(sys.write(b, b"more"), Err(KernelError::NotWritable));

            let mut buf = [0u8; 8];
            let n = sys.read(b, &mut buf).unwrap();
            assert_eq!(&buf[..n], b"pong");
            0
        });
        let pid = sys.exec(Some(client), &[]).unwrap();

        let c = sys.accept(a).unwrap();
        let mut buf = [0u8; 8];
        let n = sys.read(c, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        // Client shut its write side down
        assert_eq!(sys.read(c, &mut buf).unwrap(), 0);
        sys.write(c, b"pong").unwrap();

        sys.wait_child(Some(pid)).unwrap().1
    });
    assert_eq!(status, 0);
    assert_quiescent(&kernel);
}

#[test]
fn test_shutdown_read_wakes_local_reader() {
    let (kernel, status) = run_init(|sys, _| {
        let a = sys.socket(7).unwrap();
        sys.listen(a).unwrap();
        let gate = sys.pipe().unwrap();

        // Stays connected without writing until init closes the gate
        let client = job(move |sys, _| {
            sys.close(gate.write).unwrap();
            let b = sys.socket(NOPORT).unwrap();
            sys.connect(b, 7, Some(TIMEOUT)).unwrap();
            let mut buf = [0u8; 1];
            sys.read(gate.read, &mut buf).map_or(1, |_| 0)
        });
        let pid = sys.exec(Some(client), &[]).unwrap();
        let c = sys.accept(a).unwrap();

        let reader = job(move |sys, _| {
            let mut buf = [0u8; 4];
            match sys.read(c, &mut buf) {
                Err(KernelError::NotReadable) => 0,
                _ => 1,
            }
        });
        let tid = sys.create_thread(reader, &[]).unwrap();
        thread::sleep(SETTLE);
        sys.shutdown(c, ShutdownMode::Read).unwrap();
        let status = sys.thread_join(tid).unwrap();

        sys.close(gate.write).unwrap();
        assert_eq!(sys.wait_child(Some(pid)).unwrap().1, 0);
        status
    });
    assert_eq!(status, 0);
    assert_quiescent(&kernel);
}

#[test]
fn test_shutdown_write_wakes_local_writer() {
    let (kernel, status) = run_init_with(small_pipes(), |sys, _| {
        let a = sys.socket(7).unwrap();
        sys.listen(a).unwrap();
        let gate = sys.pipe().unwrap();

        // Drains the connection only after init closes the gate
        let client = job(move |sys, _| {
            sys.close(gate.write).unwrap();
            let b = sys.socket(NOPORT).unwrap();
            sys.connect(b, 7, Some(TIMEOUT)).unwrap();
            let mut buf = [0u8; 32];
            sys.read(gate.read, &mut buf).unwrap();
            let mut total = 0;
            loop {
                match sys.read(b, &mut buf) {
                    Ok(0) => return total,
                    Ok(n) => total += n as i32,
                    Err(_) => return -1,
                }
            }
        });
        let pid = sys.exec(Some(client), &[]).unwrap();
        let c = sys.accept(a).unwrap();

        let writer = job(move |sys, _| {
            assert_eq!(sys.write(c, &[1u8; 15]).unwrap(), 15);
            match sys.write(c, &[2u8; 4]) {
                Err(KernelError::NotWritable) => 0,
                _ => 1,
            }
        });
        let tid = sys.create_thread(writer, &[]).unwrap();
        thread::sleep(SETTLE);
        sys.shutdown(c, ShutdownMode::Write).unwrap();
        let status = sys.thread_join(tid).unwrap();

        // Bytes written before the shutdown still reach the peer
        sys.close(gate.write).unwrap();
        assert_eq!(sys.wait_child(Some(pid)).unwrap().1, 15);
        status
    });
    assert_eq!(status, 0);
    assert_quiescent(&kernel);
}

#[test]
fn test_connect_without_listener_fails_immediately() {
    let (kernel, status) = run_init(|sys, _| {
        let s = sys.socket(NOPORT).unwrap();
        match sys.connect(s, 9, None) {
            Err(KernelError::NoListener) => 0,
            _ => 1,
        }
    });
    assert_eq!(status, 0);
    assert_quiescent(&kernel);
}

#[test]
fn test_connect_timeout_leaves_no_request() {
    let (tx, rx) = mpsc::channel();
    let (kernel, status) = run_init(move |sys, _| {
        let a = sys.socket(7).unwrap();
        sys.listen(a).unwrap();
        let b = sys.socket(NOPORT).unwrap();

        let timed_out = sys.connect(b, 7, Some(Duration::from_millis(50)));
        tx.send((timed_out, sys.kernel().pending_requests())).unwrap();

        // The listener is still usable by the next client
        let retry = job(|sys, _| {
            let b = sys.socket(NOPORT).unwrap();
            sys.connect(b, 7, None).map_or(1, |_| 0)
        });
        let pid = sys.exec(Some(retry), &[]).unwrap();
        sys.accept(a).unwrap();
        sys.wait_child(Some(pid)).unwrap().1
    });

    assert_eq!(
        rx.recv_timeout(TIMEOUT).unwrap(),
        (Err(KernelError::Timeout), 0)
    );
    assert_eq!(status, 0);
    assert_quiescent(&kernel);
}

#[test]
fn test_closing_listener_refuses_connect() {
    let (kernel, status) = run_init(|sys, _| {
        let a = sys.socket(7).unwrap();
        sys.listen(a).unwrap();

        let client = job(move |sys, _| {
            // Drop the inherited listener descriptor so init's close is the last
            sys.close(a).unwrap();
            let b = sys.socket(NOPORT).unwrap();
            match sys.connect(b, 7, None) {
                Err(KernelError::ConnectionRefused) => 0,
                _ => 1,
            }
        });
        let pid = sys.exec(Some(client), &[]).unwrap();
        thread::sleep(SETTLE);
        sys.close(a).unwrap();
        sys.wait_child(Some(pid)).unwrap().1
    });
    assert_eq!(status, 0);
    assert_quiescent(&kernel);
}

#[test]
fn test_closing_listener_fails_pending_accept() {
    let (kernel, status) = run_init(|sys, _| {
        let a = sys.socket(7).unwrap();
        sys.listen(a).unwrap();

        let acceptor = job(move |sys, _| match sys.accept(a) {
            Err(KernelError::ListenerClosed) => 0,
            _ => 1,
        });
        let tid = sys.create_thread(acceptor, &[]).unwrap();
        thread::sleep(SETTLE);
        sys.close(a).unwrap();
        sys.thread_join(tid).unwrap()
    });
    assert_eq!(status, 0);
    assert_quiescent(&kernel);
}

#[test]
fn test_second_listener_on_port_fails() {
    let (kernel, status) = run_init(|sys, _| {
        let a = sys.socket(7).unwrap();
        sys.listen(a).unwrap();
        let b = sys.socket(7).unwrap();
        assert_eq!(sys.listen(b), Err(KernelError::PortInUse));
        assert_eq!(sys.listen(a), Err(KernelError::WrongSocketState));
        let unbound = sys.socket(NOPORT).unwrap();
        assert_eq!(sys.listen(unbound), Err(KernelError::InvalidPort));
        assert_eq!(sys.socket(5000), Err(KernelError::InvalidPort));
        0
    });
    assert_eq!(status, 0);
    assert_quiescent(&kernel);
}

// ============================================================================
// Process introspection
// ============================================================================

#[test]
fn test_info_stream_lists_live_processes() {
    let (tx, rx) = mpsc::channel();
    let (kernel, _) = run_init(move |sys, _| {
        let p = sys.pipe().unwrap();
        let child = job(move |sys, _| {
            sys.close(p.write).unwrap();
            let mut buf = [0u8; 1];
            sys.read(p.read, &mut buf).unwrap() as i32
        });
        let pid = sys.exec(Some(child), b"abc").unwrap();

        let info = sys.open_info().unwrap();
        let mut records = Vec::new();
        let mut buf = [0u8; PROCINFO_RECORD_SIZE];
        loop {
            let n = sys.read(info, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            records.push(ProcInfo::decode(&buf[..n]).unwrap());
        }
        assert_eq!(sys.write(info, b"x"), Err(KernelError::NotWritable));
        sys.close(info).unwrap();
        tx.send(records).unwrap();

        sys.close(p.write).unwrap();
        sys.close(p.read).unwrap();
        sys.wait_child(Some(pid)).unwrap().1
    });

    let records = rx.recv_timeout(TIMEOUT).unwrap();
    let pids: Vec<Pid> = records.iter().map(|r| r.pid).collect();
    assert_eq!(pids, vec![Pid::IDLE, Pid::INIT, Pid(2)]);

    let idle = &records[0];
    assert_eq!((idle.ppid, idle.thread_count, idle.main_task), (None, 0, None));

    let init = &records[1];
    assert!(init.alive);
    assert_eq!(init.thread_count, 1);
    assert!(init.main_task.is_some());

    let child = &records[2];
    assert_eq!(child.ppid, Some(Pid::INIT));
    assert_eq!(child.argl, 3);
    assert_eq!(child.args, b"abc");

    let json = serde_json::to_string(child).unwrap();
    assert!(json.contains("\"argl\":3"));
    assert_quiescent(&kernel);
}
