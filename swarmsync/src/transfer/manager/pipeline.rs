//! Worker jobs and how their results get back into the manager.
//!
//! A job captures the manager epoch when it is queued. Before its result is
//! applied under the lock, the epoch is compared again; if the manager was
//! aborted, broke or completed in the meantime the result is dropped. The
//! same check runs from the progress callbacks so stale jobs stop early.
//!
//! A job that panics breaks the transfer instead of taking the pool thread
//! (or, on rayon, the process) down with it.

use std::any::Any;
use std::fs::File;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error};

use super::inner::WorkerJob;
use super::Shared;
use crate::delta::{copy_matches, find_matches, verify_file_digest, Digest256, FilePartsRecord};
use crate::transfer::error::TransferProblem;
use crate::transfer::phase::TransferPhase;

/// Queue `job` on the manager's worker pool.
pub(super) fn submit(shared: &Arc<Shared>, job: WorkerJob) {
    let task_shared = Arc::clone(shared);
    shared.pool.execute(Box::new(move || run(task_shared, job)));
}

fn run(shared: Arc<Shared>, job: WorkerJob) {
    let _enter = shared.span.enter();
    let epoch = job.epoch();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_job(&shared, job)));
    if let Err(payload) = outcome {
        let message = panic_message(payload.as_ref());
        error!(epoch, %message, "Worker job panicked");
        shared.apply(epoch, |state, env| {
            state.set_broken(
                env,
                TransferProblem::General,
                format!("worker job panicked: {}", message),
            )
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_job(shared: &Arc<Shared>, job: WorkerJob) {
    match job {
        WorkerJob::MatchAndCopy {
            epoch,
            record,
            candidate,
            temp,
        } => match_and_copy(shared, epoch, &record, &candidate, temp),
        WorkerJob::Verify { epoch, digest } => verify(shared, epoch, &digest),
    }
}

fn match_and_copy(
    shared: &Arc<Shared>,
    epoch: u64,
    record: &FilePartsRecord,
    candidate: &Path,
    mut temp: File,
) {
    let matches = {
        let mut progress = stage_progress(shared, epoch, TransferPhase::Matching);
        find_matches(candidate, record, &mut progress)
    };
    let matches = match matches {
        Ok(matches) => matches,
        Err(err) => {
            shared.apply(epoch, |state, env| state.delta_finished(env, Err(err)));
            return;
        }
    };
    debug!(
        matches = matches.len(),
        blocks = record.parts().len(),
        "Matching finished"
    );

    if !shared.apply(epoch, |state, _| state.set_phase(TransferPhase::Copying)) {
        return;
    }

    let result = {
        let mut progress = stage_progress(shared, epoch, TransferPhase::Copying);
        copy_matches(
            candidate,
            &mut temp,
            &shared.env.temp_path,
            record,
            &matches,
            &mut progress,
        )
    };
    drop(temp);
    shared.apply(epoch, |state, env| state.delta_finished(env, result));
}

fn verify(shared: &Arc<Shared>, epoch: u64, digest: &Digest256) {
    let result = {
        let mut progress = stage_progress(shared, epoch, TransferPhase::Verifying);
        verify_file_digest(&shared.env.temp_path, digest, &mut progress)
    };
    shared.apply(epoch, |state, env| state.verification_finished(env, result));
}

/// Progress callback reporting to the observer and cancelling stale jobs.
fn stage_progress(
    shared: &Shared,
    epoch: u64,
    phase: TransferPhase,
) -> impl FnMut(u8) -> bool + '_ {
    let mut last = None;
    move |percent| {
        if last != Some(percent) {
            last = Some(percent);
            shared
                .observer
                .stage_progress(&shared.env.file, phase, percent);
        }
        shared.state.lock().epoch() == epoch
    }
}
