use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use async_executor::Executor;
use async_task::Task;
use eframe::egui;
use futures_lite::{Future, FutureExt, future};
use log::trace;

use super::AppFn;

/// Futures spawned by the app (file dialogs, preview extraction). Each one resolves to an optional [`AppFn`] that is
/// run against the app on the UI thread.
pub struct AppExecutor {
    executor: Arc<Executor<'static>>,
    run_loop: Pin<Box<dyn Future<Output = ()> + Send>>,
    repaint_waker: Waker,
    ctx: egui::Context,
    pending: Vec<Task<Option<AppFn>>>,
}

impl AppExecutor {
    pub fn new(ctx: egui::Context) -> Self {
        let executor = Arc::new(Executor::new());
        let run_loop = {
            let executor = Arc::clone(&executor);
            Box::pin(async move { executor.run(future::pending::<()>()).await })
        };
        let repaint_waker = {
            let ctx = ctx.clone();
            waker_fn::waker_fn(move || ctx.request_repaint())
        };

        Self {
            executor,
            run_loop,
            repaint_waker,
            ctx,
            pending: Vec::new(),
        }
    }

    /// Lets ready tasks run, then hands back the callbacks of the ones that completed.
    #[must_use]
    pub fn tick(&mut self) -> Vec<AppFn> {
        let mut cx = Context::from_waker(&self.repaint_waker);
        // Never resolves
        let _ = self.run_loop.poll(&mut cx);

        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(Task::is_finished);
        self.pending = pending;
        if !done.is_empty() {
            trace!("{} task(s) done on frame {}", done.len(), self.ctx.cumulative_pass_nr());
        }

        done.into_iter()
            .filter_map(|mut task| match task.poll(&mut cx) {
                Poll::Ready(callback) => callback,
                Poll::Pending => None,
            })
            .collect()
    }

    pub fn spawn(&mut self, future: impl Future<Output = Option<AppFn>> + Send + 'static) {
        self.pending.push(self.executor.spawn(future));
        trace!("{} task(s) pending", self.pending.len());
        self.ctx.request_repaint();
    }
}
