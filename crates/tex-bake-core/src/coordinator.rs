//! Run coordinator: drives every pack of a project through the pipeline
//! and reports progress outward. One pack failing never aborts its
//! siblings; results always come back in submission order.

use std::path::Path;

use tracing::info;

use crate::codec::process_encoder;
use crate::config::{PackDefinition, ProjectSettings};
use crate::error::PipelineError;
use crate::events::{PackEvent, ProgressSink};
use crate::layout::LayoutProvider;
use crate::node::{ProcessingNode, ProcessingResult};
use crate::pipeline::{process_pack, CancelToken, PipelineContext};
use crate::processor::{standard_processors, PackProcessor};

pub struct RunCoordinator {
    processors: Vec<Box<dyn PackProcessor>>,
    ctx: PipelineContext,
}

impl RunCoordinator {
    /// Coordinator for the current platform, backed by the production
    /// codec bridge. All coordinators built this way share the one
    /// process-wide encoder handle, so codec exclusion holds across
    /// coordinators, not just within one.
    pub fn new(settings: &ProjectSettings) -> Self {
        Self::with_context(PipelineContext::new(process_encoder(), settings))
    }

    /// Coordinator over a caller-supplied context. This is how callers
    /// swap in a different encoder or simulate a foreign platform.
    pub fn with_context(ctx: PipelineContext) -> Self {
        Self {
            processors: standard_processors(),
            ctx,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Runs every pack and returns one terminal result per pack, in
    /// submission order. Cancellation keeps pending packs from starting;
    /// packs already in flight run to their own terminal state.
    pub fn run_all(
        &self,
        packs: Vec<PackDefinition>,
        settings: &ProjectSettings,
        layout: &dyn LayoutProvider,
        out_dir: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Vec<ProcessingResult> {
        info!(packs = packs.len(), parallel = settings.parallel, "run started");

        #[cfg(feature = "parallel")]
        if settings.parallel {
            use rayon::prelude::*;
            return packs
                .into_par_iter()
                .map(|pack| self.run_one(pack, settings, layout, out_dir, sink, cancel))
                .collect();
        }

        packs
            .into_iter()
            .map(|pack| self.run_one(pack, settings, layout, out_dir, sink, cancel))
            .collect()
    }

    fn run_one(
        &self,
        pack: PackDefinition,
        settings: &ProjectSettings,
        layout: &dyn LayoutProvider,
        out_dir: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> ProcessingResult {
        if cancel.is_cancelled() {
            let mut node = ProcessingNode::new(pack);
            node.set_running();
            node.finish_err(PipelineError::Cancelled);
            let result = node.into_result();
            sink.on_event(PackEvent::finished(&result));
            return result;
        }

        sink.on_event(PackEvent::started(pack.canonical_name()));
        let result = process_pack(
            pack,
            settings,
            &self.processors,
            layout,
            out_dir,
            &self.ctx,
            cancel,
        );
        sink.on_event(PackEvent::finished(&result));
        result
    }
}
