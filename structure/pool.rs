use super::StructureError;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::thread::Scope;

/// Fixed-size worker pool that never holds more than `capacity` tasks in flight.
///
/// Workers live inside a caller-owned [`std::thread::scope`], so tasks may borrow
/// from the enclosing stack frame. Once the pool is saturated, [`submit`](Self::submit)
/// blocks until exactly one task has completed and hands that result back to the
/// caller before dispatching the new task. Results arrive in completion order, so
/// tasks should carry whatever tag the caller needs to place them.
pub struct BoundedPool<J, R> {
    capacity: usize,
    in_flight: usize,
    jobs: Option<Sender<J>>,
    results: Receiver<R>,
}

impl<J: Send, R: Send> BoundedPool<J, R> {
    /// Spawns `threads` workers on `scope`, each running `work` on every job it receives.
    pub fn start<'scope, 'env, F>(
        scope: &'scope Scope<'scope, 'env>,
        threads: usize,
        work: &'scope F,
    ) -> Result<Self, StructureError>
    where
        F: Fn(J) -> R + Sync,
        J: 'scope,
        R: 'scope,
    {
        if threads == 0 {
            return Err(StructureError::ZeroThreads);
        }
        // In-flight tasks never exceed `threads`, so neither channel can fill up.
        let (job_tx, job_rx) = bounded::<J>(threads);
        let (result_tx, result_rx) = bounded::<R>(threads);

        for _ in 0..threads {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for job in job_rx.iter() {
                    if result_tx.send(work(job)).is_err() {
                        break;
                    }
                }
            });
        }

        Ok(Self {
            capacity: threads,
            in_flight: 0,
            jobs: Some(job_tx),
            results: result_rx,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Dispatches `job`. When the pool is saturated, first waits for one task to
    /// finish and returns its result.
    pub fn submit(&mut self, job: J) -> Result<Option<R>, StructureError> {
        let completed = if self.in_flight == self.capacity {
            Some(self.wait_one()?)
        } else {
            None
        };

        let sender = self.jobs.as_ref().ok_or(StructureError::WorkerDisconnected)?;
        sender
            .send(job)
            .map_err(|_| StructureError::WorkerDisconnected)?;
        self.in_flight += 1;

        Ok(completed)
    }

    /// Closes the job queue and collects every outstanding result. Workers exit
    /// once the queue is drained, which lets the enclosing scope join them.
    pub fn drain(mut self) -> Result<Vec<R>, StructureError> {
        self.jobs = None;
        let mut remaining = Vec::with_capacity(self.in_flight);
        while self.in_flight > 0 {
            remaining.push(self.wait_one()?);
        }
        Ok(remaining)
    }

    fn wait_one(&mut self) -> Result<R, StructureError> {
        let result = self
            .results
            .recv()
            .map_err(|_| StructureError::WorkerDisconnected)?;
        self.in_flight -= 1;
        Ok(result)
    }
}

impl<J, R> Drop for BoundedPool<J, R> {
    fn drop(&mut self) {
        // Dropping the sender lets idle workers leave their receive loop.
        self.jobs = None;
    }
}
