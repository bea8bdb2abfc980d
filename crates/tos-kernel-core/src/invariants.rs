//! Formal invariants for kernel verification
//!
//! Runtime-checkable properties that must hold whenever the kernel lock is
//! released. Tests assert the list is empty after every scenario.
//!
//! # Invariants
//!
//! 1. **Free List Consistency**: A slot is free iff it is on the free list
//! 2. **Hierarchy Symmetry**: `q` is in `children(p)` iff `parent(q) == p`
//! 3. **Zombie Queue**: Exited-children entries are zombie children
//! 4. **Single Root**: Exactly one non-idle process has no parent
//! 5. **Thread Ownership**: Bridges and process thread lists agree
//! 6. **Pipe Liveness**: Every stored pipe has an open endpoint
//! 7. **Port Map**: Every mapped port names a listener on that port
//! 8. **Reference Counts**: Live sockets and control blocks are referenced
//! 9. **Descriptor Validity**: Every descriptor names a live control block

use alloc::string::String;
use alloc::vec::Vec;

use crate::file::Stream;
use crate::socket::SocketKind;
use crate::state::KernelState;
use crate::types::{Pid, ProcessState};

/// An invariant violation with details
#[derive(Clone, Debug)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: &'static str,
    /// Description of what went wrong
    pub description: String,
}

/// Check all kernel invariants.
///
/// Returns a list of violations (empty if all invariants hold).
pub fn check_all_invariants(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    violations.extend(check_free_list(state));
    violations.extend(check_hierarchy(state));
    violations.extend(check_zombie_queue(state));
    violations.extend(check_single_root(state));
    violations.extend(check_thread_ownership(state));
    violations.extend(check_pipe_liveness(state));
    violations.extend(check_port_map(state));
    violations.extend(check_refcounts(state));
    violations.extend(check_descriptors(state));

    violations
}

fn violation(invariant: &'static str, description: String) -> InvariantViolation {
    InvariantViolation {
        invariant,
        description,
    }
}

/// Invariant 1: state == Free iff on the free list
fn check_free_list(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (pid, entry) in state.processes.slots() {
        let is_free = entry.state == ProcessState::Free;
        if is_free != state.processes.is_on_free_list(pid) {
            violations.push(violation(
                "free_list_consistency",
                alloc::format!("Process {} is {:?} but free-listed={}", pid, entry.state, !is_free),
            ));
        }
    }

    violations
}

/// Invariant 2: children lists and parent links mirror each other
fn check_hierarchy(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (pid, entry) in state.processes.iter() {
        for child in &entry.children {
            if state.get_ppid(*child) != Some(pid) {
                violations.push(violation(
                    "hierarchy_symmetry",
                    alloc::format!("Process {} lists {} as child but it is not its parent", pid, child),
                ));
            }
        }
        if let Some(parent) = entry.parent {
            let listed = state
                .processes
                .get(parent)
                .map_or(false, |p| p.children.contains(&pid));
            if !listed {
                violations.push(violation(
                    "hierarchy_symmetry",
                    alloc::format!("Process {} has parent {} which does not list it", pid, parent),
                ));
            }
        }
    }

    violations
}

/// Invariant 3: exited lists only hold zombie children
fn check_zombie_queue(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (pid, entry) in state.processes.iter() {
        for child in &entry.exited {
            let ok = state
                .processes
                .get(*child)
                .map_or(false, |c| c.state == ProcessState::Zombie && c.parent == Some(pid));
            if !ok {
                violations.push(violation(
                    "zombie_queue",
                    alloc::format!("Process {} has non-zombie {} on its exited list", pid, child),
                ));
            }
        }
    }

    violations
}

/// Invariant 4: init is the only parentless process besides idle
fn check_single_root(state: &KernelState) -> Vec<InvariantViolation> {
    let roots: Vec<Pid> = state
        .processes
        .iter()
        .filter(|(pid, entry)| *pid != Pid::IDLE && entry.parent.is_none())
        .map(|(pid, _)| pid)
        .collect();

    if state.processes.get(Pid::INIT).is_some() && roots.len() != 1 {
        return alloc::vec![violation(
            "single_root",
            alloc::format!("Expected exactly one root, found {:?}", roots),
        )];
    }
    Vec::new()
}

/// Invariant 5: every bridge is listed by its owner and vice versa
fn check_thread_ownership(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (tid, bridge) in &state.threads {
        let listed = state
            .processes
            .get(bridge.owner)
            .map_or(false, |p| p.threads.contains(tid));
        if !listed {
            violations.push(violation(
                "thread_ownership",
                alloc::format!("Thread {} not listed by owner {}", tid, bridge.owner),
            ));
        }
        if tid.0 >= state.next_tid() {
            violations.push(violation(
                "thread_ownership",
                alloc::format!("Thread {} is ahead of the id allocator", tid),
            ));
        }
    }

    for (pid, entry) in state.processes.iter() {
        for tid in &entry.threads {
            if state.threads.get(tid).map(|b| b.owner) != Some(pid) {
                violations.push(violation(
                    "thread_ownership",
                    alloc::format!("Process {} lists thread {} it does not own", pid, tid),
                ));
            }
        }
        let live = entry
            .threads
            .iter()
            .filter(|t| state.threads.get(*t).map_or(false, |b| !b.exited))
            .count();
        if live != entry.thread_count {
            violations.push(violation(
                "thread_ownership",
                alloc::format!(
                    "Process {} counts {} threads but {} bridges are running",
                    pid,
                    entry.thread_count,
                    live
                ),
            ));
        }
    }

    violations
}

/// Invariant 6: pipes are freed exactly when both endpoints are closed
fn check_pipe_liveness(state: &KernelState) -> Vec<InvariantViolation> {
    state
        .pipes
        .iter()
        .filter(|(_, pipe)| pipe.is_closed())
        .map(|(id, _)| {
            violation(
                "pipe_liveness",
                alloc::format!("Pipe {} has no endpoints but was not freed", id.0),
            )
        })
        .collect()
}

/// Invariant 7: the port map only names listeners bound to that port
fn check_port_map(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (port, sid) in &state.ports {
        let ok = state.sockets.get(sid).map_or(false, |s| {
            s.port == *port && matches!(s.kind, SocketKind::Listener { .. })
        });
        if !ok {
            violations.push(violation(
                "port_map",
                alloc::format!("Port {} maps to socket {} which is not its listener", port, sid.0),
            ));
        }
    }

    violations
}

/// Invariant 8: nothing live has a zero reference count
fn check_refcounts(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (sid, socket) in &state.sockets {
        if socket.refcount == 0 {
            violations.push(violation(
                "refcounts",
                alloc::format!("Socket {} is live with refcount 0", sid.0),
            ));
        }
    }
    for (id, fcb) in state.files.iter() {
        if fcb.refcount == 0 {
            violations.push(violation(
                "refcounts",
                alloc::format!("File control block {} is live with refcount 0", id.0),
            ));
        }
    }

    violations
}

/// Invariant 9: descriptors and streams point at live objects
fn check_descriptors(state: &KernelState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (pid, entry) in state.processes.iter() {
        for fcb in entry.fids.iter().flatten() {
            if state.files.get(*fcb).is_none() {
                violations.push(violation(
                    "descriptor_validity",
                    alloc::format!("Process {} holds closed control block {}", pid, fcb.0),
                ));
            }
        }
    }

    for (id, fcb) in state.files.iter() {
        let live = match fcb.stream {
            Stream::PipeReader(p) => state.pipes.get(&p).map_or(false, |p| p.reader_open),
            Stream::PipeWriter(p) => state.pipes.get(&p).map_or(false, |p| p.writer_open),
            Stream::Socket(s) => state.sockets.contains_key(&s),
            Stream::ProcInfo { .. } => true,
        };
        if !live {
            violations.push(violation(
                "descriptor_validity",
                alloc::format!("Control block {} is bound to a closed stream", id.0),
            ));
        }
    }

    violations
}
