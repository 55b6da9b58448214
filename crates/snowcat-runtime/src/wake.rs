//! `runIfNotRunning`, shared by the Stage Runner's "wake children" step
//! and the Ingress Dispatcher's post-append fan-out (spec.md §4.5,
//! §4.6): schedule a stage activation only if its lease is not already
//! held, so duplicate wakeups collapse into the activation already in
//! flight.

use snowcat_core::{Error, StageName, StreamId};
use snowcat_lease::LeaseManager;

use crate::dispatcher::TaskDispatcher;

pub async fn run_if_not_running(
    lease: &LeaseManager,
    dispatcher: &dyn TaskDispatcher,
    stage: &StageName,
    stream: &StreamId,
) -> Result<(), Error> {
    let lock_key = format!("{stage}:{stream}:lock");
    if !lease.is_held(&lock_key).await? {
        dispatcher.schedule(stage.clone(), stream.clone()).await;
    }
    Ok(())
}
