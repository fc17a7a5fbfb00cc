//! Utilities for multithreading.

use anyhow::{Error, anyhow};
use std::{
    any::Any,
    collections::HashMap,
    fmt,
    num::NonZeroUsize,
    ops::Range,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex,
        mpsc::{self, Receiver, Sender},
    },
    thread::{self, JoinHandle},
};

/// A self-contained unit of work that can be executed by the worker threads
/// in a [`ThreadPool`].
///
/// The task value carries all the data needed for its execution and is moved
/// into the worker that executes it, so no state is shared implicitly between
/// the submitting thread and the workers.
pub trait Task: Send + 'static {
    /// The type of value produced by executing the task.
    type Output: Send + 'static;

    /// Executes the task and returns its output.
    fn execute(self) -> Self::Output;
}

/// A computation that can be performed independently on any contiguous
/// sub-range of a range of indices.
///
/// Implementors are plain descriptions of the computation (typically a few
/// `Copy` parameters). A copy of the description is sent along with each
/// sub-range when the range is partitioned over the workers of a
/// [`ThreadPool`].
pub trait RangeTask: Clone + Send + 'static {
    /// The type of value produced for a sub-range.
    type Output: Send + 'static;

    /// Performs the computation for all indices in the given range.
    fn execute_range(&self, range: Range<usize>) -> Self::Output;
}

/// A [`Task`] applying a [`RangeTask`] to one sub-range of a partitioned
/// index range.
#[derive(Clone, Debug)]
pub struct RangeTaskChunk<R> {
    task: R,
    range: Range<usize>,
}

/// A set of worker threads executing [`Task`]s of type `T` on request.
///
/// Tasks are submitted by value through a queue shared between the workers,
/// so the first available worker picks up the next task. Outputs are sent
/// back to the submitting thread, which reassembles them in submission order.
///
/// # Examples
/// ```no_run
/// # use impact_reflectance_lut::thread::{Task, ThreadPool};
/// # use std::num::NonZeroUsize;
/// #
/// #[derive(Debug)]
/// struct Square(u64);
///
/// impl Task for Square {
///     type Output = u64;
///
///     fn execute(self) -> u64 {
///         self.0 * self.0
///     }
/// }
///
/// let mut pool = ThreadPool::new(NonZeroUsize::new(2).unwrap());
/// let squares = pool.execute_and_wait((1..=4).map(Square)).unwrap();
/// assert_eq!(squares, vec![1, 4, 9, 16]);
/// ```
#[derive(Debug)]
pub struct ThreadPool<T: Task> {
    n_workers: NonZeroUsize,
    instruction_sender: Sender<WorkerInstruction<T>>,
    outcome_receiver: Receiver<TaskOutcome<T::Output>>,
    workers: Vec<Worker>,
}

/// An instruction that can be sent to threads in a [`ThreadPool`] to make
/// them execute the given task, or to terminate so that they can be joined.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WorkerInstruction<T> {
    Execute(TaskID, T),
    Terminate,
}

/// The type of ID used for worker threads in a [`ThreadPool`].
pub type WorkerID = usize;

/// Type of ID used for identifying tasks submitted to a [`ThreadPool`]. The
/// ID of a task is its position in the sequence of tasks submitted together.
pub type TaskID = u64;

/// Type of error produced by failed task executions in a [`ThreadPool`].
pub type TaskError = Error;

/// [`Result`] returned by execution of a set of tasks in a [`ThreadPool`].
/// On success, it holds the task outputs in submission order.
pub type ThreadPoolResult<O> = Result<Vec<O>, ThreadPoolTaskErrors>;

/// Container for a non-empty set of [`TaskError`]s produced by execution of
/// a set of tasks in a [`ThreadPool`]. The errors can be looked up by
/// [`TaskID`].
#[derive(Debug)]
pub struct ThreadPoolTaskErrors {
    errors: HashMap<TaskID, TaskError>,
}

#[derive(Debug)]
struct TaskOutcome<O> {
    task_id: TaskID,
    result: Result<O, TaskError>,
}

/// The ends of the [`ThreadPool`]'s channels held by a worker thread.
#[derive(Debug)]
struct WorkerChannel<T: Task> {
    owning_worker_id: WorkerID,
    instruction_receiver: Arc<Mutex<Receiver<WorkerInstruction<T>>>>,
    outcome_sender: Sender<TaskOutcome<T::Output>>,
}

#[derive(Debug)]
struct Worker {
    id: WorkerID,
    handle: JoinHandle<()>,
}

impl<T: Task> ThreadPool<T> {
    /// Creates a new thread pool containing the given number of worker
    /// threads.
    pub fn new(n_workers: NonZeroUsize) -> Self {
        let (instruction_sender, instruction_receiver) = mpsc::channel();
        let (outcome_sender, outcome_receiver) = mpsc::channel();
        let instruction_receiver = Arc::new(Mutex::new(instruction_receiver));

        let workers = (0..n_workers.get())
            .map(|worker_id| {
                Worker::spawn(WorkerChannel {
                    owning_worker_id: worker_id,
                    instruction_receiver: Arc::clone(&instruction_receiver),
                    outcome_sender: outcome_sender.clone(),
                })
            })
            .collect();

        Self {
            n_workers,
            instruction_sender,
            outcome_receiver,
            workers,
        }
    }

    /// Returns the number of worker threads in the thread pool (this does not
    /// include the calling thread).
    pub fn n_workers(&self) -> NonZeroUsize {
        self.n_workers
    }

    /// Instructs worker threads in the pool to execute the given tasks, and
    /// blocks until all of them have been executed.
    ///
    /// # Returns
    /// The outputs of the tasks, in the order the tasks were given.
    ///
    /// # Errors
    /// A [`ThreadPoolTaskErrors`] containing a [`TaskError`] for each task
    /// that panicked or could not be executed.
    pub fn execute_and_wait(&mut self, tasks: impl IntoIterator<Item = T>) -> ThreadPoolResult<T::Output> {
        let mut n_tasks = 0;
        for task in tasks {
            self.send_instruction(WorkerInstruction::Execute(n_tasks as TaskID, task));
            n_tasks += 1;
        }

        with_debug_logging!("Waiting for {} tasks", n_tasks; self.collect_outputs(n_tasks))
    }

    fn send_instruction(&self, instruction: WorkerInstruction<T>) {
        // The receiving end lives as long as any worker, and failing to send
        // is detected when collecting outcomes
        if self.instruction_sender.send(instruction).is_err() {
            log::debug!("No workers available to receive instruction");
        }
    }

    fn collect_outputs(&self, n_tasks: usize) -> ThreadPoolResult<T::Output> {
        let mut outputs: Vec<Option<T::Output>> = (0..n_tasks).map(|_| None).collect();
        let mut errors = HashMap::new();

        for _ in 0..n_tasks {
            match self.outcome_receiver.recv() {
                Ok(TaskOutcome {
                    task_id,
                    result: Ok(output),
                }) => {
                    outputs[task_id as usize] = Some(output);
                }
                Ok(TaskOutcome {
                    task_id,
                    result: Err(error),
                }) => {
                    log::debug!("Task {} failed: {}", task_id, &error);
                    errors.insert(task_id, error);
                }
                Err(_) => {
                    for (task_id, output) in outputs.iter().enumerate() {
                        let task_id = task_id as TaskID;
                        if output.is_none() && !errors.contains_key(&task_id) {
                            errors.insert(
                                task_id,
                                anyhow!("Task {} was not executed: all workers have terminated", task_id),
                            );
                        }
                    }
                    break;
                }
            }
        }

        if errors.is_empty() {
            Ok(outputs.into_iter().flatten().collect())
        } else {
            Err(ThreadPoolTaskErrors::new(errors))
        }
    }
}

impl<R: RangeTask> ThreadPool<RangeTaskChunk<R>> {
    /// Partitions the given index range into contiguous sub-ranges of
    /// `grain_size` indices (the last one may be shorter) and executes the
    /// given range task for each sub-range on the workers.
    ///
    /// # Returns
    /// The outputs for the sub-ranges, in the order of the sub-ranges.
    ///
    /// # Errors
    /// See [`execute_and_wait`](Self::execute_and_wait).
    pub fn for_each_range(
        &mut self,
        task: &R,
        range: Range<usize>,
        grain_size: NonZeroUsize,
    ) -> ThreadPoolResult<R::Output> {
        self.execute_and_wait(partition_range(range, grain_size).map(|range| RangeTaskChunk {
            task: task.clone(),
            range,
        }))
    }

    /// Like [`for_each_range`](Self::for_each_range), but reduces the outputs
    /// for the sub-ranges into a single value with the given associative
    /// `combine` function, using [`combine_pairwise`]. The result only
    /// depends on the partition, not on the number of workers or the order in
    /// which the sub-ranges are executed.
    ///
    /// # Errors
    /// See [`execute_and_wait`](Self::execute_and_wait).
    pub fn reduce_range(
        &mut self,
        task: &R,
        range: Range<usize>,
        grain_size: NonZeroUsize,
        combine: fn(R::Output, R::Output) -> R::Output,
    ) -> Result<R::Output, ThreadPoolTaskErrors>
    where
        R::Output: Default,
    {
        let partial_outputs = self.for_each_range(task, range, grain_size)?;
        Ok(combine_pairwise(partial_outputs, combine))
    }
}

impl<T: Task> Drop for ThreadPool<T> {
    fn drop(&mut self) {
        // Send a termination instruction for each of the workers
        for _ in 0..self.workers.len() {
            self.send_instruction(WorkerInstruction::Terminate);
        }

        // Join each worker as soon as it has terminated
        for worker in self.workers.drain(..) {
            worker.join();
        }
    }
}

impl<R: RangeTask> Task for RangeTaskChunk<R> {
    type Output = R::Output;

    fn execute(self) -> Self::Output {
        self.task.execute_range(self.range)
    }
}

impl ThreadPoolTaskErrors {
    fn new(task_errors: HashMap<TaskID, TaskError>) -> Self {
        assert!(!task_errors.is_empty());
        Self {
            errors: task_errors,
        }
    }

    /// Returns the number of errors present from executed tasks that failed.
    /// Calling [`take_result_of`](Self::take_result_of) may reduce this
    /// number.
    pub fn n_errors(&self) -> usize {
        self.errors.len()
    }

    /// Returns a reference to the [`TaskError`] produced by the task with the
    /// given ID if the task failed, otherwise returns [`None`].
    pub fn get_error_of(&self, task_id: TaskID) -> Option<&TaskError> {
        self.errors.get(&task_id)
    }

    /// Returns a [`Result`] that is either [`Ok`] if the task with the given
    /// ID succeeded, or [`Err`] containing the resulting [`TaskError`] if it
    /// failed. In the latter case, the record of the error is removed from
    /// this object.
    pub fn take_result_of(&mut self, task_id: TaskID) -> Result<(), TaskError> {
        match self.errors.remove(&task_id) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl fmt::Display for ThreadPoolTaskErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut task_ids: Vec<_> = self.errors.keys().copied().collect();
        task_ids.sort_unstable();
        write!(f, "{} task(s) failed", task_ids.len())?;
        for task_id in task_ids {
            write!(f, "; task {}: {}", task_id, &self.errors[&task_id])?;
        }
        Ok(())
    }
}

impl std::error::Error for ThreadPoolTaskErrors {}

impl<T: Task> WorkerChannel<T> {
    /// Blocks until an instruction arrives in the queue shared between the
    /// workers. Returns [`None`] if the queue has been disconnected.
    fn wait_for_next_instruction(&self) -> Option<WorkerInstruction<T>> {
        let receiver = self.instruction_receiver.lock().ok()?;
        receiver.recv().ok()
    }

    fn send_outcome(&self, outcome: TaskOutcome<T::Output>) {
        if self.outcome_sender.send(outcome).is_err() {
            log::debug!(
                "Worker {} could not report outcome: thread pool is gone",
                self.owning_worker_id
            );
        }
    }
}

impl Worker {
    /// Spawns a new worker thread executing tasks received through the given
    /// channel.
    fn spawn<T: Task>(channel: WorkerChannel<T>) -> Self {
        let id = channel.owning_worker_id;

        let handle = thread::spawn(move || {
            log::debug!("Worker {} spawned", id);

            loop {
                match channel.wait_for_next_instruction() {
                    Some(WorkerInstruction::Execute(task_id, task)) => {
                        let result = panic::catch_unwind(AssertUnwindSafe(|| task.execute()))
                            .map_err(|payload| {
                                anyhow!("Task {} panicked: {}", task_id, panic_message(&*payload))
                            });
                        channel.send_outcome(TaskOutcome { task_id, result });
                    }
                    Some(WorkerInstruction::Terminate) | None => {
                        log::debug!("Worker {} terminating", id);
                        return;
                    }
                }
            }
        });

        Self { id, handle }
    }

    fn join(self) {
        if self.handle.join().is_err() {
            log::warn!("Worker {} terminated abnormally", self.id);
        }
    }
}

/// Splits the given index range into consecutive sub-ranges of `grain_size`
/// indices. The last sub-range holds the remainder and may be shorter. An
/// empty range yields no sub-ranges.
pub fn partition_range(
    range: Range<usize>,
    grain_size: NonZeroUsize,
) -> impl Iterator<Item = Range<usize>> + Clone {
    let grain_size = grain_size.get();
    let end = range.end;
    range
        .step_by(grain_size)
        .map(move |start| start..usize::min(start.saturating_add(grain_size), end))
}

/// Executes the given range task on the calling thread for each sub-range of
/// the same partition as [`ThreadPool::reduce_range`] uses, and reduces the
/// outputs with the same pairwise combination tree. The result is therefore
/// bitwise identical to the one obtained with a thread pool.
pub fn reduce_range_sequentially<R: RangeTask>(
    task: &R,
    range: Range<usize>,
    grain_size: NonZeroUsize,
    combine: fn(R::Output, R::Output) -> R::Output,
) -> R::Output
where
    R::Output: Default,
{
    let partial_outputs = partition_range(range, grain_size)
        .map(|range| task.execute_range(range))
        .collect();
    combine_pairwise(partial_outputs, combine)
}

/// Reduces the given values into one with a balanced binary tree of
/// applications of `combine`, where each node combines the reductions of the
/// first and second halves of its values. The shape of the tree only depends
/// on the number of values. Returns the default value if there are no values.
pub fn combine_pairwise<A: Default>(mut values: Vec<A>, combine: fn(A, A) -> A) -> A {
    match values.len() {
        0 => A::default(),
        1 => values.pop().unwrap_or_default(),
        n_values => {
            let second_half = values.split_off(n_values / 2);
            combine(
                combine_pairwise(values, combine),
                combine_pairwise(second_half, combine),
            )
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
