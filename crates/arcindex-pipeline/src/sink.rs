//! Routes mined records to the bulk engine or straight to the store.

use arcindex_core::document::Document;
use arcindex_core::error::IndexerError;

use crate::bulk::BatchRouter;
use crate::context::PipelineContext;
use crate::miner::WorkKind;

#[derive(Clone)]
pub struct RecordSink {
    ctx: PipelineContext,
    router: Option<BatchRouter>,
}

impl RecordSink {
    /// A sink that writes every record directly.
    pub fn direct(ctx: &PipelineContext) -> Self {
        Self {
            ctx: ctx.clone(),
            router: None,
        }
    }

    /// A sink that hands bulk-mode records of batched kinds to `router`.
    pub fn bulk(ctx: &PipelineContext, router: BatchRouter) -> Self {
        Self {
            ctx: ctx.clone(),
            router: Some(router),
        }
    }

    /// Write one record.
    ///
    /// Only a closed bulk engine is reported as an error. Failed direct writes
    /// are logged and the record is dropped.
    pub async fn write(&self, mode: WorkKind, doc: Document) -> Result<(), IndexerError> {
        if mode == WorkKind::Bulk {
            if let Some(router) = self.router.as_ref().filter(|r| r.handles(doc.kind())) {
                return router.add(doc).await;
            }
        }
        self.insert(&doc).await;
        Ok(())
    }

    async fn insert(&self, doc: &Document) {
        let kind = doc.kind();
        if let Err(e) = self.ctx.store.insert(self.ctx.index(kind), doc).await {
            tracing::error!(kind = %kind, id = doc.id(), error = %e, "Failed to write record");
        }
    }
}
