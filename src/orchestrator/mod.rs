//! Pipeline Orchestrator: the two entry points (`analyze_global`,
//! `analyze_page`) and the per-page agent graph between them.
//!
//! Holds `Arc` handles to every gateway/store/router it composes, no owned
//! mutable state beyond what it threads through the agent calls, following
//! the teacher's immutable-driver-struct shape.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agents::{
    checker::Checker, expander::Expander, gap_finder::GapFinder, global_structure::GlobalStructureAgent,
    knowledge_clustering::KnowledgeClusteringAgent, noter::Noter, organizer::Organizer, page_clusterer::PageClusterer,
    retriever::Retriever,
};
use crate::ai::LlmGateway;
use crate::config::Config;
use crate::retrieval::Router;
use crate::storage::SharedDatabase;
use crate::types::{
    CheckStatus, Document, DocumentId, ExpandedContent, GlobalAnalysis, KnowledgeGap, Page, PageAnalysis,
    PipelineError, ProgressEvent, Reference, Result, Stage,
};
use crate::vectorstore::VectorStore;

/// A `tokio::sync::mpsc::Receiver` adapted into a `Stream`, so callers can
/// drive `analyze_page_streaming`'s progress feed with `futures::StreamExt`.
pub struct ProgressEventStream {
    rx: mpsc::Receiver<ProgressEvent>,
}

impl Stream for ProgressEventStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[derive(Clone)]
pub struct PipelineOrchestrator {
    db: SharedDatabase,
    llm: Arc<LlmGateway>,
    vector_store: Arc<VectorStore>,
    router: Arc<Router>,
    config: Config,
}

impl PipelineOrchestrator {
    pub fn new(db: SharedDatabase, llm: Arc<LlmGateway>, vector_store: Arc<VectorStore>, router: Arc<Router>, config: Config) -> Self {
        Self { db, llm, vector_store, router, config }
    }

    fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.config.llm.timeout_secs)
    }

    fn retrieval_timeout(&self) -> Duration {
        let secs = self.config.retrieval.timeout_secs.max(self.config.embedding.timeout_secs);
        Duration::from_secs(secs)
    }

    /// `GlobalStructure → KnowledgeClustering`, persisted atomically. Returns
    /// the cached analysis unless `force`.
    pub async fn analyze_global(&self, document: &Document, force: bool, cancel: &CancellationToken) -> Result<GlobalAnalysis> {
        if !force
            && let Some(cached) = self.db.get_global_analysis(&document.id)?
        {
            return Ok(cached);
        }
        check_cancel(cancel)?;

        let global_structure = GlobalStructureAgent::new(self.llm.clone());
        let base = with_timeout(self.llm_timeout(), "global_structure", global_structure.run(document)).await?;
        check_cancel(cancel)?;

        let clustering = KnowledgeClusteringAgent::new(self.llm.clone());
        let knowledge_units = with_timeout(self.llm_timeout(), "knowledge_clustering", clustering.run(document, &base)).await?;
        check_cancel(cancel)?;

        let analysis = GlobalAnalysis { knowledge_units, ..base };

        check_cancel(cancel)?;
        self.db.upsert_global_analysis(&document.id, &analysis)?;
        Ok(analysis)
    }

    /// Non-streaming entry point: drives the full graph internally and
    /// returns only the final result, per `streaming.enabled = false`.
    pub async fn analyze_page(&self, document: &Document, page_number: u32, force: bool, cancel: CancellationToken) -> Result<PageAnalysis> {
        self.run_page_graph(document, page_number, force, &cancel, None).await
    }

    /// Streaming entry point: spawns the graph on a background task and
    /// returns a live `ProgressEvent` feed alongside a handle resolving to
    /// the final `PageAnalysis`.
    pub fn analyze_page_streaming(
        &self,
        document: Document,
        page_number: u32,
        force: bool,
        cancel: CancellationToken,
    ) -> (ProgressEventStream, JoinHandle<Result<PageAnalysis>>) {
        let (tx, rx) = mpsc::channel(32);
        let orchestrator = self.clone();
        let handle = tokio::spawn(async move {
            orchestrator.run_page_graph(&document, page_number, force, &cancel, Some(&tx)).await
        });
        (ProgressEventStream { rx }, handle)
    }

    async fn run_page_graph(
        &self,
        document: &Document,
        page_number: u32,
        force: bool,
        cancel: &CancellationToken,
        events: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> Result<PageAnalysis> {
        if !force
            && let Some(cached) = self.db.get_page_analysis(&document.id, page_number)?
        {
            emit(events, ProgressEvent::complete(&cached));
            return Ok(cached);
        }
        check_cancel(cancel)?;

        let page = document
            .page(page_number)
            .ok_or_else(|| PipelineError::InvariantViolation(format!("no such page: {page_number}")))?;
        let global = document.global_analysis.as_ref();

        let page_clusterer = PageClusterer::new(self.llm.clone());
        let clusters = with_timeout(self.llm_timeout(), "page_clusterer", page_clusterer.run(page, global)).await?;
        check_cancel(cancel)?;
        emit(events, ProgressEvent::new(Stage::Clustering, serde_json::to_value(&clusters).unwrap_or_default(), "concepts clustered"));

        let noter = Noter::new(self.llm.clone());
        let (notes, structure) = with_timeout(self.llm_timeout(), "noter", noter.run(page, global)).await?;
        check_cancel(cancel)?;
        emit(
            events,
            ProgressEvent::new(Stage::Understanding, serde_json::to_value(&structure).unwrap_or_default(), "page understood"),
        );

        let gap_finder = GapFinder::new(self.llm.clone());
        let gaps = with_timeout(self.llm_timeout(), "gap_finder", gap_finder.run(page, global)).await?;
        check_cancel(cancel)?;
        emit(events, ProgressEvent::new(Stage::Gaps, serde_json::to_value(&gaps).unwrap_or_default(), "knowledge gaps identified"));

        let (mut expansions, mut references) = self.run_expansion_and_retrieval(page, &gaps, &[], events).await?;
        check_cancel(cancel)?;

        let checker = Checker::new(self.llm.clone());
        let mut check_result = with_timeout(self.llm_timeout(), "checker", checker.run(page, &expansions, &references)).await?;
        check_cancel(cancel)?;

        let mut revision_count = 0u32;
        while check_result.status == CheckStatus::Revise && revision_count < self.config.expansion.max_revisions {
            revision_count += 1;
            warn!(revision_count, issues = ?check_result.issues, "checker requested a revision");

            let rerun_retrieval = check_result.suggests_retrieval_change();
            let previous_references = if rerun_retrieval { vec![] } else { references.clone() };

            let (new_expansions, new_references) = if rerun_retrieval {
                self.run_expansion_and_retrieval(page, &gaps, &previous_references, events).await?
            } else {
                let expander = Expander::new(self.llm.clone(), self.config.expansion.min_gap_priority);
                let expansions = with_timeout(self.llm_timeout(), "expander", expander.run(page, &gaps)).await?;
                emit(events, ProgressEvent::new(Stage::Expansion, serde_json::to_value(&expansions).unwrap_or_default(), "expansions revised"));
                (expansions, references.clone())
            };
            expansions = new_expansions;
            references = new_references;
            check_cancel(cancel)?;

            check_result = with_timeout(self.llm_timeout(), "checker", checker.run(page, &expansions, &references)).await?;
            check_cancel(cancel)?;
        }

        let organizer = Organizer::new(self.llm.clone());
        let final_notes = with_timeout(self.llm_timeout(), "organizer", organizer.run(&notes, &expansions)).await?;

        check_cancel(cancel)?;

        let analysis = PageAnalysis {
            page_number,
            clusters,
            notes,
            gaps,
            expansions,
            references,
            check_result,
            final_notes,
            revision_count,
        };

        self.db.upsert_page_analysis(&document.id, page_number, &analysis)?;
        emit(events, ProgressEvent::complete(&analysis));
        info!(document_id = %document.id, page_number, revision_count, "page analysis complete");
        Ok(analysis)
    }

    /// `Expander` and `Retriever` run concurrently; both outputs feed
    /// `Checker`. Events are emitted in canonical order once both resolve.
    async fn run_expansion_and_retrieval(
        &self,
        page: &Page,
        gaps: &[KnowledgeGap],
        previous_local_hits: &[Reference],
        events: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> Result<(Vec<ExpandedContent>, Vec<Reference>)> {
        let expander = Expander::new(self.llm.clone(), self.config.expansion.min_gap_priority);
        let retriever = Retriever::new(
            self.vector_store.clone(),
            self.router.clone(),
            self.config.retrieval.max_results,
            self.config.retrieval.min_score,
            self.config.retrieval.local_rag_priority,
        );

        let expand_fut = with_timeout(self.llm_timeout(), "expander", expander.run(page, gaps));
        let retrieve_fut = with_timeout(
            self.retrieval_timeout(),
            "retriever",
            retriever.run(page, gaps, &self.config.retrieval.preferred_sources, previous_local_hits),
        );

        let (expansions, references) = tokio::join!(expand_fut, retrieve_fut);
        let expansions = expansions?;
        let references = references?;

        emit(events, ProgressEvent::new(Stage::Expansion, serde_json::to_value(&expansions).unwrap_or_default(), "content expanded"));
        emit(events, ProgressEvent::new(Stage::Retrieval, serde_json::to_value(&references).unwrap_or_default(), "references retrieved"));

        Ok((expansions, references))
    }

    pub fn document_id_for_hash(&self, content_hash: &str) -> Result<Option<DocumentId>> {
        self.db.find_document_id_by_hash(content_hash)
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled("cancelled by caller".into()))
    } else {
        Ok(())
    }
}

fn emit(events: Option<&mpsc::Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = events
        && let Err(e) = tx.try_send(event)
    {
        warn!(error = %e, "dropped progress event, receiver lagging or closed");
    }
}

async fn with_timeout<T>(duration: Duration, label: &str, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::timeout(label, duration)),
    }
}
