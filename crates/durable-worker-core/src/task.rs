use durable_worker_types::FailureDetails;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// One-shot settlement state for a [`Task`].
#[derive(Clone, Debug)]
enum TaskState<T> {
    Pending,
    Complete(T),
    Failed(FailureDetails),
}

/// A single completable unit of suspension: the Rust analogue of a
/// generator `yield` point.
///
/// `create_timer`, `call_activity`, `call_sub_orchestrator` and
/// `wait_for_external_event` all return a `Task`. Awaiting it inside an
/// orchestrator body suspends the orchestrator's future until the
/// [`crate::executor::OrchestrationExecutor`] settles it from a matching
/// history event (see `resolve`/`reject`). Settlement is monotonic: a
/// second `resolve`/`reject` on an already-settled task is a no-op, mirroring
/// the source's early-return in `set_complete`/`set_failed`.
///
/// Backed by `Rc<RefCell<_>>` rather than an `Arc<Mutex<_>>` because a
/// single orchestration's execution is strictly single-threaded and
/// synchronous (§5) — there is never cross-thread access to a `Task`.
#[derive(Clone)]
pub struct Task<T> {
    state: Rc<RefCell<TaskState<T>>>,
}

impl<T: Clone> Task<T> {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(TaskState::Pending)),
        }
    }

    pub fn resolve(&self, value: T) {
        let mut state = self.state.borrow_mut();
        if matches!(*state, TaskState::Pending) {
            *state = TaskState::Complete(value);
        }
    }

    pub fn reject(&self, failure: FailureDetails) {
        let mut state = self.state.borrow_mut();
        if matches!(*state, TaskState::Pending) {
            *state = TaskState::Failed(failure);
        }
    }

    pub fn is_complete(&self) -> bool {
        !matches!(*self.state.borrow(), TaskState::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(*self.state.borrow(), TaskState::Failed(_))
    }
}

impl<T> Default for Task<T>
where
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Future for Task<T> {
    type Output = Result<T, FailureDetails>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &*self.state.borrow() {
            TaskState::Pending => Poll::Pending,
            TaskState::Complete(value) => Poll::Ready(Ok(value.clone())),
            TaskState::Failed(failure) => Poll::Ready(Err(failure.clone())),
        }
    }
}

/// Completes once every child task has settled, or fails as soon as any
/// child fails (first observed failure wins). Does not allocate a sequence
/// id of its own — it only observes tasks already recorded by the context.
pub struct WhenAll<T> {
    children: Vec<Task<T>>,
}

impl<T: Clone> WhenAll<T> {
    pub fn new(children: Vec<Task<T>>) -> Self {
        Self { children }
    }
}

impl<T: Clone + Unpin> Future for WhenAll<T> {
    type Output = Result<Vec<T>, FailureDetails>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut results = Vec::with_capacity(this.children.len());
        for child in &mut this.children {
            match Pin::new(child).poll(cx) {
                Poll::Ready(Ok(value)) => results.push(value),
                Poll::Ready(Err(failure)) => return Poll::Ready(Err(failure)),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(results))
    }
}

/// Completes as soon as the first child task settles (complete or failed),
/// returning that child's own index and outcome.
pub struct WhenAny<T> {
    children: Vec<Task<T>>,
}

impl<T: Clone> WhenAny<T> {
    pub fn new(children: Vec<Task<T>>) -> Self {
        Self { children }
    }
}

impl<T: Clone + Unpin> Future for WhenAny<T> {
    type Output = (usize, Result<T, FailureDetails>);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        for (index, child) in this.children.iter_mut().enumerate() {
            if let Poll::Ready(outcome) = Pin::new(child).poll(cx) {
                return Poll::Ready((index, outcome));
            }
        }
        Poll::Pending
    }
}
