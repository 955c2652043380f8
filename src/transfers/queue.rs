// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A multi-queue task dispatcher.

Tasks wait in four FIFO sub-queues.  Sub-queues are drained in groups: the upload and download
sub-queues by a background worker, the copy and event sub-queues by whoever calls
[TransferQueue::dequeue].

An [Item] may carry a successor.  The successor is only enqueued after the item's callback
returned, and before the item stops counting as running, so [TransferQueue::wait] never observes a
chain that is half-way between two groups.

If a callback fails, the error is recorded on the [Chain] and every later item of the chain is
still delivered but skipped.  A caller that plans to drain the copy group for step two of a
chain therefore never blocks on a step that will not come.
*/

use crate::error::{Error, Result};
use crate::transfers::task::{TaskKind, TransferTask};
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubQueue {
    Upload,
    Download,
    Copy,
    Event,
}

impl SubQueue {
    pub const ALL: [SubQueue; 4] = [
        SubQueue::Upload,
        SubQueue::Download,
        SubQueue::Copy,
        SubQueue::Event,
    ];

    pub const fn group(self) -> Group {
        match self {
            SubQueue::Upload | SubQueue::Download => Group::UploadDownload,
            SubQueue::Copy => Group::Copy,
            SubQueue::Event => Group::Event,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Sub-queues that are drained together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    /// Host-side memory traffic; drained by the worker thread.
    UploadDownload,
    /// GPU-side copies; drained by the caller.
    Copy,
    /// Completion notifications; drained by the caller.
    Event,
}

impl Group {
    pub const fn sub_queues(self) -> &'static [SubQueue] {
        match self {
            Group::UploadDownload => &[SubQueue::Upload, SubQueue::Download],
            Group::Copy => &[SubQueue::Copy],
            Group::Event => &[SubQueue::Event],
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Handles one kind of task.
pub type Callback = Arc<dyn Fn(TransferTask) -> Result<()> + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct ChainStatus {
    error: Mutex<Option<Error>>,
    failed: std::sync::atomic::AtomicBool,
}

impl ChainStatus {
    fn failed(&self) -> bool {
        self.failed.load(std::sync::atomic::Ordering::Acquire)
    }

    fn fail(&self, error: Error) {
        let mut slot = lock(&self.error);
        // keep the first
        if !self.failed() {
            *slot = Some(error);
            self.failed.store(true, std::sync::atomic::Ordering::Release);
        }
    }
}

/// A submitted chain of items.
#[derive(Debug, Clone)]
pub struct Chain(Arc<ChainStatus>);

impl Chain {
    /// Whether some item of the chain has failed so far.
    pub fn failed(&self) -> bool {
        self.0.failed()
    }

    /// The first error the chain recorded, if any.  The error is handed out once.
    pub fn result(&self) -> Result<()> {
        match lock(&self.0.error).take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// A task addressed to a sub-queue, plus whatever must run after it.
#[derive(Debug)]
pub struct Item {
    queue: SubQueue,
    /// `None` asks the draining loop to stop.
    task: Option<TransferTask>,
    next: Option<Box<Item>>,
    status: Option<Arc<ChainStatus>>,
}

impl Item {
    pub fn new(queue: SubQueue, task: TransferTask) -> Self {
        Item {
            queue,
            task: Some(task),
            next: None,
            status: None,
        }
    }

    fn stop(queue: SubQueue) -> Self {
        Item {
            queue,
            task: None,
            next: None,
            status: None,
        }
    }

    /// Appends `next` to the end of this chain.
    pub fn then(mut self, next: Item) -> Self {
        self.push_back(next);
        self
    }

    fn push_back(&mut self, next: Item) {
        if let Some(tail) = self.next.as_mut() {
            tail.push_back(next);
        } else {
            self.next = Some(Box::new(next));
        }
    }

    fn attach(&mut self, status: &Arc<ChainStatus>) {
        self.status = Some(status.clone());
        if let Some(next) = self.next.as_mut() {
            next.attach(status);
        }
    }

    fn cancel(self) {
        if let Some(task) = self.task {
            task.cancel();
        }
        if let Some(next) = self.next {
            next.cancel();
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Worker {
    #[default]
    NotStarted,
    Running,
    Stopped,
}

#[derive(Debug, Default)]
struct State {
    queues: [VecDeque<Item>; 4],
    running: [usize; 3],
    worker: Worker,
}

impl State {
    fn idle(&self, group: Group) -> bool {
        self.running[group.index()] == 0
            && group
                .sub_queues()
                .iter()
                .all(|q| self.queues[q.index()].is_empty())
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    changed: Condvar,
    callbacks: Mutex<HashMap<(SubQueue, TaskKind), Callback>>,
}

impl Shared {
    fn push(&self, item: Item) {
        logwise::trace_sync!(
            "enqueue {kind} on {queue}",
            kind = logwise::privacy::LogIt(&item.task.as_ref().map(TransferTask::kind)),
            queue = logwise::privacy::LogIt(&item.queue)
        );
        lock(&self.state).queues[item.queue.index()].push_back(item);
        self.changed.notify_all();
    }

    fn pop(&self, group: Group, blocking: bool) -> Option<Item> {
        let mut state = lock(&self.state);
        loop {
            for queue in group.sub_queues() {
                if let Some(item) = state.queues[queue.index()].pop_front() {
                    state.running[group.index()] += 1;
                    return Some(item);
                }
            }
            if !blocking {
                return None;
            }
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Runs one popped item.  Returns false for a stop sentinel.
    fn process(&self, mut item: Item) -> bool {
        let group = item.queue.group();
        let keep_going = match item.task.take() {
            Some(task) => {
                self.run(item.queue, task, item.status.as_deref());
                true
            }
            None => false,
        };
        if let Some(next) = item.next.take() {
            self.push(*next);
        }
        lock(&self.state).running[group.index()] -= 1;
        self.changed.notify_all();
        keep_going
    }

    fn run(&self, queue: SubQueue, task: TransferTask, status: Option<&ChainStatus>) {
        let kind = task.kind();
        if status.is_some_and(ChainStatus::failed) {
            logwise::trace_sync!(
                "skipping {kind}, an earlier step failed",
                kind = logwise::privacy::LogIt(&kind)
            );
            task.cancel();
            return;
        }
        let callback = lock(&self.callbacks).get(&(queue, kind)).cloned();
        let result = match callback {
            Some(callback) => std::panic::catch_unwind(AssertUnwindSafe(|| callback(task)))
                .unwrap_or(Err(Error::TaskPanicked(kind))),
            None => {
                task.cancel();
                Err(Error::MissingCallback { queue, kind })
            }
        };
        if let Err(error) = result {
            logwise::error_sync!(
                "{kind} on {queue} failed: {error}",
                kind = logwise::privacy::LogIt(&kind),
                queue = logwise::privacy::LogIt(&queue),
                error = logwise::privacy::LogIt(&error)
            );
            if let Some(status) = status {
                status.fail(error);
            }
        }
    }

    fn dequeue_loop(&self, group: Group) {
        while let Some(item) = self.pop(group, true) {
            if !self.process(item) {
                break;
            }
        }
    }
}

/// The transfer task queue.
pub struct TransferQueue {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for TransferQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("TransferQueue")
            .field("queued", &state.queues.each_ref().map(VecDeque::len))
            .field("running", &state.running)
            .field("worker", &state.worker)
            .finish()
    }
}

impl Default for TransferQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferQueue {
    /// A queue with no callbacks and no worker.
    pub fn new() -> Self {
        TransferQueue {
            shared: Arc::new(Shared::default()),
            worker: None,
        }
    }

    /// Registers the handler for `kind` tasks arriving on `queue`, replacing any previous one.
    pub fn callback<F>(&self, queue: SubQueue, kind: TaskKind, f: F)
    where
        F: Fn(TransferTask) -> Result<()> + Send + Sync + 'static,
    {
        lock(&self.shared.callbacks).insert((queue, kind), Arc::new(f));
    }

    /// Enqueues the first item of a chain.
    pub fn submit(&self, mut item: Item) -> Result<Chain> {
        if item.queue.group() == Group::UploadDownload
            && lock(&self.shared.state).worker == Worker::Stopped
        {
            item.cancel();
            return Err(Error::WorkerStopped);
        }
        let status = Arc::new(ChainStatus::default());
        item.attach(&status);
        self.shared.push(item);
        Ok(Chain(status))
    }

    /// Processes items of `group` on the calling thread.
    ///
    /// When `blocking`, waits until at least one item is available.  Then processes items until
    /// the group is empty, including successors that land in the same group.  Returns the number of
    /// items processed.
    pub fn dequeue(&self, group: Group, blocking: bool) -> usize {
        let mut processed = 0;
        let mut next = self.shared.pop(group, blocking);
        while let Some(item) = next {
            processed += 1;
            if !self.shared.process(item) {
                break;
            }
            next = self.shared.pop(group, false);
        }
        processed
    }

    /// Processes items of `group` until a stop sentinel arrives, blocking while the group is
    /// empty.  See [TransferQueue::stop_loop].
    pub fn dequeue_loop(&self, group: Group) {
        self.shared.dequeue_loop(group);
    }

    /// Enqueues a stop sentinel on every sub-queue of `group`.  The first one a draining loop
    /// reaches ends it; items queued before it are processed first.
    pub fn stop_loop(&self, group: Group) {
        for queue in group.sub_queues() {
            self.shared.push(Item::stop(*queue));
        }
    }

    /// Blocks until every sub-queue of `group` is empty and nothing in it is running.
    ///
    /// Fails instead of blocking forever if `group` is the worker's and the worker is gone.
    pub fn wait(&self, group: Group) -> Result<()> {
        let _interval = logwise::perfwarn_begin!("TransferQueue::wait");
        let mut state = lock(&self.shared.state);
        loop {
            if state.idle(group) {
                return Ok(());
            }
            if group == Group::UploadDownload && state.worker != Worker::Running {
                return Err(Error::WorkerStopped);
            }
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Number of items waiting in `group`.
    pub fn pending(&self, group: Group) -> usize {
        let state = lock(&self.shared.state);
        group
            .sub_queues()
            .iter()
            .map(|q| state.queues[q.index()].len())
            .sum()
    }

    /// Starts the thread that drains the upload/download group.
    pub fn spawn_worker(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        lock(&self.shared.state).worker = Worker::Running;
        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name("dats_and_texs_transfers".to_string())
            .spawn(move || {
                logwise::info_sync!("transfer worker started");
                shared.dequeue_loop(Group::UploadDownload);
                lock(&shared.state).worker = Worker::Stopped;
                shared.changed.notify_all();
                logwise::info_sync!("transfer worker stopped");
            });
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(error) => {
                lock(&self.shared.state).worker = Worker::NotStarted;
                Err(Error::WorkerSpawn(error))
            }
        }
    }

    /// Stops and joins the worker.  Pending upload/download work is finished first.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        if let Err(error) = self.wait(Group::UploadDownload) {
            logwise::warn_sync!(
                "stopping transfers: {error}",
                error = logwise::privacy::LogIt(&error)
            );
        }
        self.stop_loop(Group::UploadDownload);
        if handle.join().is_err() {
            logwise::error_sync!("transfer worker panicked");
        }
        // the worker exits at the first sentinel it sees
        let leftovers: Vec<Item> = {
            let mut state = lock(&self.shared.state);
            Group::UploadDownload
                .sub_queues()
                .iter()
                .flat_map(|q| std::mem::take(&mut state.queues[q.index()]))
                .collect()
        };
        leftovers.into_iter().for_each(Item::cancel);
    }
}

impl Drop for TransferQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;

    fn done_task() -> (TransferTask, impl Future<Output = bool>) {
        let (done, receiver) = r#continue::continuation();
        (TransferTask::DownloadDone { size: 0, done }, receiver)
    }

    fn recording(
        queue: &TransferQueue,
        log: &Arc<Mutex<Vec<SubQueue>>>,
        sub_queue: SubQueue,
    ) {
        let log = log.clone();
        queue.callback(sub_queue, TaskKind::DownloadDone, move |task| {
            log.lock().unwrap().push(sub_queue);
            if let TransferTask::DownloadDone { done, .. } = task {
                done.send(true);
            }
            Ok(())
        });
    }

    #[test]
    fn chain_runs_in_order_across_groups() {
        let mut queue = TransferQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for q in SubQueue::ALL {
            recording(&queue, &log, q);
        }
        queue.spawn_worker().unwrap();

        let (upload, _r1) = done_task();
        let (copy, _r2) = done_task();
        let (event, r3) = done_task();
        let chain = queue
            .submit(
                Item::new(SubQueue::Upload, upload)
                    .then(Item::new(SubQueue::Copy, copy))
                    .then(Item::new(SubQueue::Event, event)),
            )
            .unwrap();
        assert_eq!(queue.dequeue(Group::Copy, true), 1);
        queue.wait(Group::UploadDownload).unwrap();
        assert_eq!(queue.dequeue(Group::Event, true), 1);
        queue.wait(Group::Event).unwrap();
        assert!(test_executors::sleep_on(r3));
        chain.result().unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![SubQueue::Upload, SubQueue::Copy, SubQueue::Event]
        );
    }

    #[test]
    fn failure_cancels_successors() {
        let queue = TransferQueue::new();
        queue.callback(SubQueue::Copy, TaskKind::DownloadDone, |task| {
            if let TransferTask::DownloadDone { done, .. } = task {
                done.send(true);
            }
            Err(Error::StaleRegion)
        });
        let (first, _r1) = done_task();
        let (second, r2) = done_task();
        let chain = queue
            .submit(Item::new(SubQueue::Copy, first).then(Item::new(SubQueue::Event, second)))
            .unwrap();
        assert_eq!(queue.dequeue(Group::Copy, false), 1);
        // delivered, even though nothing handles it
        assert_eq!(queue.dequeue(Group::Event, false), 1);
        assert!(!test_executors::sleep_on(r2));
        assert!(chain.failed());
        assert!(matches!(chain.result(), Err(Error::StaleRegion)));
    }

    #[test]
    fn missing_callback_is_an_error() {
        let queue = TransferQueue::new();
        let (task, r) = done_task();
        let chain = queue.submit(Item::new(SubQueue::Event, task)).unwrap();
        queue.dequeue(Group::Event, false);
        assert!(!test_executors::sleep_on(r));
        assert!(matches!(
            chain.result(),
            Err(Error::MissingCallback {
                queue: SubQueue::Event,
                kind: TaskKind::DownloadDone
            })
        ));
    }

    #[test]
    fn panicking_callback_does_not_hang() {
        let mut queue = TransferQueue::new();
        queue.callback(SubQueue::Upload, TaskKind::DownloadDone, |task| {
            if let TransferTask::DownloadDone { done, .. } = task {
                done.send(true);
            }
            panic!("callback exploded")
        });
        queue.spawn_worker().unwrap();
        let (task, _r) = done_task();
        let chain = queue.submit(Item::new(SubQueue::Upload, task)).unwrap();
        queue.wait(Group::UploadDownload).unwrap();
        assert!(matches!(chain.result(), Err(Error::TaskPanicked(_))));
    }

    #[test]
    fn dequeue_loop_runs_until_stopped() {
        let queue = Arc::new(TransferQueue::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        recording(&queue, &log, SubQueue::Copy);
        let drainer = {
            let queue = queue.clone();
            thread::spawn(move || queue.dequeue_loop(Group::Copy))
        };

        let (first, r1) = done_task();
        let (second, r2) = done_task();
        queue.submit(Item::new(SubQueue::Copy, first)).unwrap();
        queue.submit(Item::new(SubQueue::Copy, second)).unwrap();
        assert!(test_executors::sleep_on(r1));
        assert!(test_executors::sleep_on(r2));

        queue.stop_loop(Group::Copy);
        drainer.join().unwrap();
        assert_eq!(*log.lock().unwrap(), vec![SubQueue::Copy, SubQueue::Copy]);
        assert!(queue.wait(Group::Copy).is_ok());
    }

    #[test]
    fn stop_joins_worker() {
        let mut queue = TransferQueue::new();
        queue.spawn_worker().unwrap();
        queue.stop();
        assert_eq!(queue.pending(Group::UploadDownload), 0);
        assert!(queue.wait(Group::UploadDownload).is_ok());
        let (task, _r) = done_task();
        assert!(matches!(
            queue.submit(Item::new(SubQueue::Download, task)),
            Err(Error::WorkerStopped)
        ));
    }
}
