//! Single lifecycle operation execution with timing, metrics, and logging.

use crate::metrics::TransitionMetrics;
use pageflow_core::context::PageContext;
use pageflow_core::error::{Phase, TransitionError};
use pageflow_core::page::PageHandle;
use std::time::Instant;

/// Run one lifecycle operation of `page`.
///
/// State markers are the caller's concern; this only invokes the operation,
/// records its duration under the phase name, and tags a failure with the page
/// id and phase.
pub(crate) async fn run(
    page: &PageHandle,
    phase: Phase,
    ctx: &PageContext,
) -> Result<(), TransitionError> {
    tracing::debug!(page = page.id(), %phase, "phase started");
    let started = Instant::now();

    let result = match phase {
        Phase::Init => page.init(ctx).await,
        Phase::Handle => page.handle(ctx).await,
        Phase::Render => page.render(ctx).await,
        Phase::Unrender => page.unrender(ctx).await,
        Phase::Unhandle => page.unhandle(ctx).await,
    };

    let elapsed = started.elapsed();
    ctx.response().timings().record(phase.as_str(), elapsed);
    TransitionMetrics::record_phase(phase, elapsed);

    match result {
        Ok(()) => {
            tracing::debug!(page = page.id(), %phase, elapsed_ms = elapsed.as_millis(), "phase finished");
            Ok(())
        }
        Err(source) => {
            TransitionMetrics::record_phase_error(phase);
            tracing::debug!(page = page.id(), %phase, error = %source, "phase failed");
            Err(TransitionError::new(page.id(), phase, source))
        }
    }
}
