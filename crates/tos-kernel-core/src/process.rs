//! Process table
//!
//! Fixed-capacity arena of process entries indexed by [`Pid`]. Free slots
//! sit on a LIFO free list; the initial order hands out pid 0, then 1, and
//! so on, which is what pins the idle and init processes at boot.

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;
use core::mem;

use crate::error::KernelError;
use crate::state::KernelState;
use crate::thread::ThreadBridge;
use crate::types::{FcbId, Pid, ProcessState, TaskId, Tid};
use crate::wait::{Step, WaitKey};

/// One process table slot
#[derive(Clone, Debug)]
pub struct ProcessEntry {
    pub state: ProcessState,
    /// `None` only for the idle and init processes
    pub parent: Option<Pid>,
    pub exit_value: i32,
    pub main_thread: Option<Tid>,
    pub main_task: Option<TaskId>,
    /// Owned copy of the argument buffer
    pub args: Vec<u8>,
    /// Live and zombie children, most recent first
    pub children: Vec<Pid>,
    /// Zombie children not yet collected, most recent first
    pub exited: VecDeque<Pid>,
    /// Descriptor table
    pub fids: Vec<Option<FcbId>>,
    /// Every thread bridge this process still owns
    pub threads: Vec<Tid>,
    /// Threads that have not exited yet
    pub thread_count: usize,
}

impl ProcessEntry {
    fn free(max_fileid: usize) -> Self {
        Self {
            state: ProcessState::Free,
            parent: None,
            exit_value: 0,
            main_thread: None,
            main_task: None,
            args: Vec::new(),
            children: Vec::new(),
            exited: VecDeque::new(),
            fids: vec![None; max_fileid],
            threads: Vec::new(),
            thread_count: 0,
        }
    }
}

/// Process table arena
#[derive(Clone, Debug)]
pub struct ProcessTable {
    entries: Vec<ProcessEntry>,
    free: Vec<Pid>,
    count: usize,
}

impl ProcessTable {
    pub fn new(max_proc: usize, max_fileid: usize) -> Self {
        let entries = (0..max_proc).map(|_| ProcessEntry::free(max_fileid)).collect();
        // Stack order: the lowest pid is popped first
        let free = (0..max_proc as u32).rev().map(Pid).collect();
        Self {
            entries,
            free,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of non-free entries
    pub fn count(&self) -> usize {
        self.count
    }

    /// Take a slot off the free list and mark it alive
    pub fn acquire(&mut self) -> Option<Pid> {
        let pid = self.free.pop()?;
        let entry = &mut self.entries[pid.index()];
        entry.state = ProcessState::Alive;
        self.count += 1;
        Some(pid)
    }

    /// Reset a slot and push it back on the free list
    pub fn release(&mut self, pid: Pid) {
        let max_fileid = self.entries[pid.index()].fids.len();
        self.entries[pid.index()] = ProcessEntry::free(max_fileid);
        self.free.push(pid);
        self.count -= 1;
    }

    /// Entry for `pid` if it is in range and not free
    pub fn get(&self, pid: Pid) -> Option<&ProcessEntry> {
        self.entries
            .get(pid.index())
            .filter(|e| e.state != ProcessState::Free)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut ProcessEntry> {
        self.entries
            .get_mut(pid.index())
            .filter(|e| e.state != ProcessState::Free)
    }

    /// Iterate all slots, free ones included, in pid order
    pub fn slots(&self) -> impl Iterator<Item = (Pid, &ProcessEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (Pid(i as u32), e))
    }

    /// Iterate live and zombie entries in pid order
    pub fn iter(&self) -> impl Iterator<Item = (Pid, &ProcessEntry)> {
        self.slots().filter(|(_, e)| e.state != ProcessState::Free)
    }

    pub fn is_on_free_list(&self, pid: Pid) -> bool {
        self.free.contains(&pid)
    }
}

// ============================================================================
// Process lifecycle
// ============================================================================

impl KernelState {
    /// Allocate and initialize a process entry.
    ///
    /// The first two pids (idle and init) are parentless. Every later
    /// process becomes a child of `caller`, shares its open descriptors and
    /// gets its own copy of `args`. With a task, a main thread bridge is
    /// created; the runtime releases it to run once this returns.
    pub fn create_process(
        &mut self,
        caller: Option<Pid>,
        task: Option<TaskId>,
        args: &[u8],
    ) -> Result<(Pid, Option<Tid>), KernelError> {
        let parent = caller.filter(|p| self.processes.get(*p).is_some());
        let pid = self.processes.acquire().ok_or(KernelError::ProcessTableFull)?;

        if pid > Pid::INIT {
            let Some(parent) = parent else {
                self.processes.release(pid);
                return Err(KernelError::InvalidPid);
            };
            let mut fids = Vec::new();
            if let Some(p) = self.processes.get_mut(parent) {
                p.children.insert(0, pid);
                fids = p.fids.clone();
            }
            for fcb in fids.iter().flatten() {
                self.files.incref(*fcb);
            }
            if let Some(entry) = self.processes.get_mut(pid) {
                entry.parent = Some(parent);
                entry.fids = fids;
            }
        }

        let main_thread = task.map(|_| self.alloc_tid());
        if let (Some(tid), Some(task)) = (main_thread, task) {
            self.threads.insert(tid, ThreadBridge::new(pid, task));
        }

        let entry = self.processes.get_mut(pid).ok_or(KernelError::InvalidPid)?;
        entry.args = args.to_vec();
        entry.main_task = task;
        entry.main_thread = main_thread;
        if let Some(tid) = main_thread {
            entry.threads.push(tid);
            entry.thread_count = 1;
        }
        Ok((pid, main_thread))
    }

    /// Undo `create_process` for a process whose main thread never started
    pub fn abandon_process(&mut self, pid: Pid) {
        let Some(entry) = self.processes.get(pid) else {
            return;
        };
        let parent = entry.parent;
        let threads = entry.threads.clone();

        if let Some(p) = parent.and_then(|p| self.processes.get_mut(p)) {
            p.children.retain(|c| *c != pid);
        }
        self.close_all(pid);
        for tid in threads {
            self.threads.remove(&tid);
        }
        self.processes.release(pid);
    }

    pub fn get_ppid(&self, pid: Pid) -> Option<Pid> {
        self.processes.get(pid)?.parent
    }

    pub fn set_exit_value(&mut self, pid: Pid, code: i32) {
        if let Some(entry) = self.processes.get_mut(pid) {
            entry.exit_value = code;
        }
    }

    /// Collect a zombie child of `caller`.
    ///
    /// With `Some(child)`, waits for that direct child. With `None`, takes
    /// the most recently exited child, or fails with `NoChildren` when the
    /// caller has no children at all.
    pub fn wait_child(
        &mut self,
        caller: Pid,
        target: Option<Pid>,
    ) -> Result<Step<(Pid, i32)>, KernelError> {
        let entry = self.processes.get(caller).ok_or(KernelError::InvalidPid)?;

        let zombie = match target {
            Some(cpid) => {
                let child = self
                    .processes
                    .get(cpid)
                    .filter(|c| c.parent == Some(caller))
                    .ok_or(KernelError::NotAChild)?;
                if child.state != ProcessState::Zombie {
                    return Ok(Step::Blocked(WaitKey::ChildExit(caller)));
                }
                cpid
            }
            None => {
                if entry.children.is_empty() {
                    return Err(KernelError::NoChildren);
                }
                match entry.exited.front() {
                    Some(cpid) => *cpid,
                    None => return Ok(Step::Blocked(WaitKey::ChildExit(caller))),
                }
            }
        };

        Ok(Step::Ready(self.reap_zombie(caller, zombie)))
    }

    fn reap_zombie(&mut self, parent: Pid, child: Pid) -> (Pid, i32) {
        let code = self.processes.get(child).map_or(0, |c| c.exit_value);
        if let Some(p) = self.processes.get_mut(parent) {
            p.children.retain(|c| *c != child);
            p.exited.retain(|c| *c != child);
        }
        self.processes.release(child);
        (child, code)
    }

    /// Turn a process whose last thread just exited into a zombie.
    ///
    /// Children move to init, already exited children go straight onto
    /// init's exited list, and the parent is told. Init itself must have
    /// collected all its children before its last thread exits.
    pub(crate) fn teardown(&mut self, pid: Pid) {
        let Some(entry) = self.processes.get_mut(pid) else {
            return;
        };
        let parent = entry.parent;

        if pid != Pid::INIT {
            let children = mem::take(&mut entry.children);
            let exited = mem::take(&mut entry.exited);

            for child in &children {
                if let Some(c) = self.processes.get_mut(*child) {
                    c.parent = Some(Pid::INIT);
                }
            }
            if let Some(init) = self.processes.get_mut(Pid::INIT) {
                for child in children {
                    init.children.insert(0, child);
                }
                if !exited.is_empty() {
                    init.exited.extend(exited);
                    self.wakeups.broadcast(WaitKey::ChildExit(Pid::INIT));
                }
            }

            if let Some(ppid) = parent {
                if let Some(p) = self.processes.get_mut(ppid) {
                    p.exited.push_front(pid);
                }
                self.wakeups.broadcast(WaitKey::ChildExit(ppid));
            }
        }

        let Some(entry) = self.processes.get_mut(pid) else {
            return;
        };
        assert!(
            entry.children.is_empty() && entry.exited.is_empty(),
            "process {} torn down with children still attached",
            pid
        );
        entry.args = Vec::new();
        entry.main_thread = None;
        let threads = mem::take(&mut entry.threads);

        self.close_all(pid);
        for tid in threads {
            self.threads.remove(&tid);
        }

        if let Some(entry) = self.processes.get_mut(pid) {
            entry.state = ProcessState::Zombie;
        }
        if pid == Pid::INIT {
            self.wakeups.broadcast(WaitKey::InitExit);
        }
    }
}
